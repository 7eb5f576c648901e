use derive_more::Display;

pub type Result<T> = core::result::Result<T, TrackerError>;

#[derive(Debug, Display, Clone, PartialEq)]
#[display("{self:?}")]
pub enum TrackerError {
    NonInvertiblePose,
    EmptyVolume,
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },
    InvalidConfig(&'static str),
}

impl std::error::Error for TrackerError {}

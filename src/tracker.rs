use bevy::prelude::Resource;
use nalgebra::{Matrix4, Matrix6, Vector6};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, warn};

use crate::{
    energy::compute_per_pixel_energy,
    error::{Result, TrackerError},
    field::DistanceField,
    jacobian::{Rejection, compute_per_pixel_jacobian},
    types::{HomPoint, Pose, PoseJacobian, Value},
};

/// Runtime configuration for frame evaluation.
///
/// Inserted as a resource by [`RenTrackerPlugin`](crate::plugin::RenTrackerPlugin);
/// also usable on its own with [`evaluate_frame`].
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    /// World-space edge length of one voxel. Default: `0.005` (5 mm).
    pub voxel_size: Value,
    /// Frames whose fraction of usable pixels falls below this are flagged
    /// as poorly tracked. Default: `0.1`.
    pub min_valid_fraction: f32,
    /// Maximum number of background tracking passes started per frame. Default: `4`.
    pub max_passes_per_frame: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.005,
            min_valid_fraction: 0.1,
            max_passes_per_frame: 4,
        }
    }
}

impl TrackingConfig {
    #[inline]
    pub fn one_over_voxel_size(&self) -> Value {
        1.0 / self.voxel_size
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<()> {
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return Err(TrackerError::InvalidConfig("voxel_size must be positive and finite"));
        }
        if !(0.0..=1.0).contains(&self.min_valid_fraction) {
            return Err(TrackerError::InvalidConfig("min_valid_fraction must be within [0, 1]"));
        }
        if self.max_passes_per_frame == 0 {
            return Err(TrackerError::InvalidConfig("max_passes_per_frame must be at least 1"));
        }
        Ok(())
    }
}

/// Energy and Jacobian of one sampled point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelResult {
    /// Tracking energy in `[0, 1]`; `0` for missing or truncated samples.
    pub energy: Value,
    /// Pose Jacobian, or the reason the pixel is excluded this iteration.
    pub jacobian: core::result::Result<PoseJacobian, Rejection>,
}

impl PixelResult {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.jacobian.is_ok()
    }
}

/// Evaluates the energy and Jacobian of one reference-space point.
#[inline]
pub fn evaluate_pixel<F: DistanceField>(
    point: &HomPoint,
    field: &F,
    one_over_voxel_size: Value,
    inv_pose: &Matrix4<Value>,
) -> PixelResult {
    PixelResult {
        energy: compute_per_pixel_energy(point, field, one_over_voxel_size, inv_pose),
        jacobian: compute_per_pixel_jacobian(point, field, one_over_voxel_size, inv_pose),
    }
}

/// Per-frame sums handed to the pose solver.
///
/// `hessian` is `Σ JJᵀ` and `gradient` is `Σ J` over valid pixels. Partial
/// sums from different workers combine with [`merge`](NormalEquations::merge)
/// in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub hessian: Matrix6<f64>,
    pub gradient: Vector6<f64>,
    /// Total energy over all pixels, valid or not.
    pub energy: f64,
    pub valid: usize,
    pub missing: usize,
    pub truncated: usize,
    pub gradient_invalid: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::zeros()
    }
}

impl NormalEquations {
    pub fn zeros() -> Self {
        Self {
            hessian: Matrix6::zeros(),
            gradient: Vector6::zeros(),
            energy: 0.0,
            valid: 0,
            missing: 0,
            truncated: 0,
            gradient_invalid: 0,
        }
    }

    /// Adds one pixel's contribution.
    pub fn add(&mut self, pixel: &PixelResult) {
        self.energy += pixel.energy as f64;
        match pixel.jacobian {
            Ok(j) => {
                let j = j.cast::<f64>();
                self.hessian += j * j.transpose();
                self.gradient += j;
                self.valid += 1;
            }
            Err(Rejection::Missing) => self.missing += 1,
            Err(Rejection::Truncated) => self.truncated += 1,
            Err(Rejection::GradientInvalid) => self.gradient_invalid += 1,
        }
    }

    /// Combines two partial sums.
    pub fn merge(mut self, other: Self) -> Self {
        self.hessian += other.hessian;
        self.gradient += other.gradient;
        self.energy += other.energy;
        self.valid += other.valid;
        self.missing += other.missing;
        self.truncated += other.truncated;
        self.gradient_invalid += other.gradient_invalid;
        self
    }

    /// Number of pixels seen, valid or not.
    pub fn total(&self) -> usize {
        self.valid + self.missing + self.truncated + self.gradient_invalid
    }

    pub fn rejected(&self) -> usize {
        self.total() - self.valid
    }

    /// Fraction of pixels that produced a Jacobian; `0` for an empty frame.
    pub fn valid_fraction(&self) -> f32 {
        match self.total() {
            0 => 0.0,
            total => self.valid as f32 / total as f32,
        }
    }
}

/// Tracking-quality signal for one evaluated frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingQuality {
    pub valid_fraction: f32,
    /// `false` when too few pixels were usable for a reliable pose update.
    pub acceptable: bool,
}

/// Everything computed for one frame at one pose hypothesis.
#[derive(Debug, Clone)]
pub struct FrameEvaluation {
    /// Per-point results, in input order.
    pub pixels: Vec<PixelResult>,
    pub normal_equations: NormalEquations,
    pub quality: TrackingQuality,
}

/// Evaluates every sampled point against the field at the given pose.
///
/// Points are processed in parallel with Rayon; `pixels` keeps the input
/// order. A frame with too few usable pixels is flagged through
/// [`TrackingQuality`] and logged, never treated as fatal.
pub fn evaluate_frame<F: DistanceField>(
    points: &[HomPoint],
    field: &F,
    pose: &Pose,
    config: &TrackingConfig,
) -> FrameEvaluation {
    let one_over_voxel_size = config.one_over_voxel_size();
    let inv_pose = pose.inverse;

    let pixels: Vec<PixelResult> = points
        .par_iter()
        .map(|p| evaluate_pixel(p, field, one_over_voxel_size, &inv_pose))
        .collect();

    let normal_equations = pixels
        .par_iter()
        .fold(NormalEquations::zeros, |mut acc, pixel| {
            acc.add(pixel);
            acc
        })
        .reduce(NormalEquations::zeros, NormalEquations::merge);

    let valid_fraction = normal_equations.valid_fraction();
    let quality = TrackingQuality {
        valid_fraction,
        acceptable: normal_equations.valid > 0 && valid_fraction >= config.min_valid_fraction,
    };

    debug!(
        points = points.len(),
        valid = normal_equations.valid,
        missing = normal_equations.missing,
        truncated = normal_equations.truncated,
        gradient_invalid = normal_equations.gradient_invalid,
        energy = normal_equations.energy,
        "evaluated frame"
    );
    if !quality.acceptable {
        warn!(
            valid_fraction,
            min_valid_fraction = config.min_valid_fraction,
            "poor tracking quality: too few usable pixels"
        );
    }

    FrameEvaluation {
        pixels,
        normal_equations,
        quality,
    }
}

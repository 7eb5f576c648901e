use nalgebra::{Isometry3, Matrix4, Vector3, Vector4, Vector6};

use crate::error::{Result, TrackerError};

/// Scalar SDF / energy value.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Vector3<Value>;

/// A homogeneous 3D point. Affine points carry `w = 1`.
pub type HomPoint = Vector4<Value>;

/// Integer voxel coordinate in volume space.
pub type VoxelIndex = Vector3<i32>;

/// Sensitivity of one pixel's energy to an infinitesimal pose change,
/// ordered `[tx, ty, tz, rx, ry, rz]`.
pub type PoseJacobian = Vector6<Value>;

/// SDF value that marks a sample as truncated or unknown.
///
/// A voxel pinned at the edge of the truncation band carries no usable
/// gradient, so it is treated the same as a missing voxel.
pub const TRUNCATED_SDF: Value = 1.0;

/// Builds an affine homogeneous point (`w = 1`).
#[inline]
pub fn hom(x: Value, y: Value, z: Value) -> HomPoint {
    HomPoint::new(x, y, z, 1.0)
}

/// A rigid transform together with its inverse.
///
/// The tracker only ever reads [`Pose::inverse`], which maps reference
/// points into the volume's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Volume frame to reference frame.
    pub matrix: Matrix4<Value>,
    /// Reference frame to volume frame.
    pub inverse: Matrix4<Value>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            inverse: Matrix4::identity(),
        }
    }

    /// Creates a pose from a 4×4 transform, computing its inverse.
    ///
    /// Returns [`TrackerError::NonInvertiblePose`] for singular matrices.
    pub fn from_matrix(matrix: Matrix4<Value>) -> Result<Self> {
        let inverse = matrix
            .try_inverse()
            .ok_or(TrackerError::NonInvertiblePose)?;
        Ok(Self { matrix, inverse })
    }

    /// Creates a pose from a rigid isometry. Always invertible.
    pub fn from_isometry(isometry: &Isometry3<Value>) -> Self {
        Self {
            matrix: isometry.to_homogeneous(),
            inverse: isometry.inverse().to_homogeneous(),
        }
    }
}

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: Value,
    pub fy: Value,
    pub cx: Value,
    pub cy: Value,
}

impl Intrinsics {
    pub fn new(fx: Value, fy: Value, cx: Value, cy: Value) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Packs the intrinsics as `(fx, fy, cx, cy)`.
    pub fn to_vector(&self) -> Vector4<Value> {
        Vector4::new(self.fx, self.fy, self.cx, self.cy)
    }

    /// Back-projection parameters `(1/fx, 1/fy, -cx/fx, -cy/fy)`.
    ///
    /// Fed to [`unproject_with_intrinsics`](crate::unproject::unproject_with_intrinsics)
    /// together with a `(u·z, v·z, z)` pixel sample, this yields the
    /// camera-space point seen at pixel `(u, v)` with depth `z`.
    pub fn inverse(&self) -> Vector4<Value> {
        Vector4::new(
            1.0 / self.fx,
            1.0 / self.fy,
            -self.cx / self.fx,
            -self.cy / self.fy,
        )
    }
}

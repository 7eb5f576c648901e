//! Per-pixel tracking energy.
//!
//! The energy is a logistic bump of the SDF value: it peaks at `1` on the
//! modelled surface and decays smoothly away from it, giving the pose solver
//! a differentiable stand-in for "distance to the predicted surface".

use nalgebra::Matrix4;

use crate::{
    field::DistanceField,
    types::{HomPoint, Point, TRUNCATED_SDF, Value},
};

/// Sharpness of the energy bump. Controls the basin of attraction.
pub const SHARPNESS: Value = 6.0;

/// Energy of a single SDF sample, in `[0, 1]`.
///
/// ```text
/// s = exp(-sdf · K)
/// E = 4s / (s + 1)²
/// ```
///
/// The truncated sentinel contributes nothing.
#[inline]
pub fn energy_from_sdf(sdf: Value) -> Value {
    if sdf == TRUNCATED_SDF {
        return 0.0;
    }
    let s = (-sdf * SHARPNESS).exp();
    4.0 * s / ((s + 1.0) * (s + 1.0))
}

/// Derivative of [`energy_from_sdf`] with respect to the SDF value.
///
/// ```text
/// d = s + 1
/// dE/dsdf = 4K · (2·exp(-2·sdf·K) / d³ − s / d²)
/// ```
#[inline]
pub fn energy_derivative(sdf: Value) -> Value {
    let s = (-sdf * SHARPNESS).exp();
    let d = s + 1.0;
    4.0 * SHARPNESS * (2.0 * (-sdf * 2.0 * SHARPNESS).exp() / (d * d * d) - s / (d * d))
}

/// Maps a reference-space point into volume (voxel) coordinates.
#[inline]
pub fn to_volume(
    point: &HomPoint,
    one_over_voxel_size: Value,
    inv_pose: &Matrix4<Value>,
) -> Point {
    (inv_pose * point * one_over_voxel_size).xyz()
}

/// Tracking energy of one reference-space point against the field.
///
/// Missing voxels and the truncated sentinel both yield `0`, as do points
/// too far out to index.
pub fn compute_per_pixel_energy<F: DistanceField>(
    point: &HomPoint,
    field: &F,
    one_over_voxel_size: Value,
    inv_pose: &Matrix4<Value>,
) -> Value {
    let p = to_volume(point, one_over_voxel_size, inv_pose);
    match field.lookup(&p) {
        Some(sdf) => energy_from_sdf(sdf),
        None => 0.0,
    }
}

//! Analytic pose Jacobian of the per-pixel tracking energy.
//!
//! Chain rule over the SDF:
//!
//! ```text
//! dE/dT = dE/dsdf · dsdf/dx · dx/dT
//! ```
//!
//! `dsdf/dx` comes from central differences on the field, and `dx/dT` is the
//! infinitesimal twist generator at the camera-space point.

use derive_more::Display;
use nalgebra::Matrix4;

use crate::{
    energy::energy_derivative,
    field::DistanceField,
    gradient::compute_sdf_gradient,
    types::{HomPoint, PoseJacobian, TRUNCATED_SDF, Value},
};

/// Why a pixel was left out of the optimisation.
///
/// None of these are errors: they are the normal steady state near scene
/// edges and unobserved regions.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// The centre voxel is not allocated or observed, or the point is too
    /// far out to index.
    #[display("missing")]
    Missing,
    /// The centre voxel holds the truncated sentinel.
    #[display("truncated")]
    Truncated,
    /// One of the six gradient neighbours is missing or truncated.
    #[display("gradient invalid")]
    GradientInvalid,
}

/// Jacobian of the tracking energy with respect to a 6-DoF pose twist,
/// ordered `[tx, ty, tz, rx, ry, rz]`.
///
/// ```text
/// cp = invPose · point                 camera-space point
/// p  = cp · oneOverVoxelSize           volume-space point
/// g  = dE/dsdf(sdf(p)) · ∇sdf(p)
/// J  = [ g.x, g.y, g.z,
///        4(g.z·cp.y − g.y·cp.z),
///        4(g.x·cp.z − g.z·cp.x),
///        4(g.y·cp.x − g.x·cp.y) ]
/// ```
///
/// The rotational rows keep the historical factor of `4` on top of the
/// already scaled gradient.
pub fn compute_per_pixel_jacobian<F: DistanceField>(
    point: &HomPoint,
    field: &F,
    one_over_voxel_size: Value,
    inv_pose: &Matrix4<Value>,
) -> Result<PoseJacobian, Rejection> {
    let cp = (inv_pose * point).xyz();
    let p = cp * one_over_voxel_size;

    let sdf = field.lookup(&p).ok_or(Rejection::Missing)?;
    if sdf == TRUNCATED_SDF {
        return Err(Rejection::Truncated);
    }

    let gradient = compute_sdf_gradient(&p, field).ok_or(Rejection::GradientInvalid)?;
    let g = gradient * energy_derivative(sdf);

    Ok(PoseJacobian::new(
        g.x,
        g.y,
        g.z,
        4.0 * (g.z * cp.y - g.y * cp.z),
        4.0 * (g.x * cp.z - g.z * cp.x),
        4.0 * (g.y * cp.x - g.x * cp.y),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        energy::{compute_per_pixel_energy, energy_from_sdf},
        types::{Point, VoxelIndex, hom},
        volume::{DenseVolume, FnField},
    };
    use approx::assert_abs_diff_eq;

    fn tilted_plane(i: VoxelIndex) -> Option<Value> {
        let sdf = 0.04 * i.x as Value + 0.02 * i.y as Value + 0.03 * i.z as Value - 0.1;
        Some(sdf.clamp(-0.99, 0.99))
    }

    #[test]
    fn test_missing_center() {
        let field = FnField::new(|_: VoxelIndex| None);
        let r = compute_per_pixel_jacobian(&hom(0.0, 0.0, 0.0), &field, 1.0, &Matrix4::identity());
        assert_eq!(r, Err(Rejection::Missing));
    }

    #[test]
    fn test_truncated_center_rejected_even_when_found() {
        let field = FnField::new(|i: VoxelIndex| {
            Some(if i == VoxelIndex::zeros() { TRUNCATED_SDF } else { 0.0 })
        });
        let r = compute_per_pixel_jacobian(&hom(0.1, -0.1, 0.2), &field, 1.0, &Matrix4::identity());
        assert_eq!(r, Err(Rejection::Truncated));
    }

    #[test]
    fn test_invalid_gradient_rejected() {
        let field = FnField::new(|i: VoxelIndex| if i.z == -1 { None } else { Some(0.2) });
        let r = compute_per_pixel_jacobian(&hom(0.0, 0.0, 0.0), &field, 1.0, &Matrix4::identity());
        assert_eq!(r, Err(Rejection::GradientInvalid));
    }

    #[test]
    fn test_translation_rows_are_scaled_gradient() {
        let field = FnField::new(tilted_plane);
        let point = hom(2.0, 1.0, 3.0);
        let j = compute_per_pixel_jacobian(&point, &field, 1.0, &Matrix4::identity()).unwrap();

        let sdf = tilted_plane(VoxelIndex::new(2, 1, 3)).unwrap();
        let prefix = energy_derivative(sdf);
        assert_abs_diff_eq!(j[0], prefix * 0.04, epsilon = 1e-5);
        assert_abs_diff_eq!(j[1], prefix * 0.02, epsilon = 1e-5);
        assert_abs_diff_eq!(j[2], prefix * 0.03, epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_rows_use_camera_point() {
        let field = FnField::new(tilted_plane);
        let mut inv_pose = Matrix4::identity();
        inv_pose[(0, 3)] = 1.0;
        let point = hom(1.0, 1.0, 3.0);
        // Voxel scale 2: cp = (2, 1, 3), p = (4, 2, 6).
        let j = compute_per_pixel_jacobian(&point, &field, 2.0, &inv_pose).unwrap();

        let cp = Point::new(2.0, 1.0, 3.0);
        let g = Point::new(j[0], j[1], j[2]);
        let expected = cp.cross(&g) * 4.0;
        assert_abs_diff_eq!(j[3], expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(j[4], expected.y, epsilon = 1e-5);
        assert_abs_diff_eq!(j[5], expected.z, epsilon = 1e-5);
    }

    #[test]
    fn test_translation_matches_numeric_energy_derivative() {
        // sdf(x) = 0.05·x + 0.1, so sdf = 0.15 at the sample and ∇sdf = (0.05, 0, 0).
        let field = FnField::new(|i: VoxelIndex| Some(0.05 * i.x as Value + 0.1));
        let point = hom(1.0, 0.0, 0.0);
        let j = compute_per_pixel_jacobian(&point, &field, 1.0, &Matrix4::identity()).unwrap();

        let sdf = 0.15;
        let h = 1e-3;
        let numeric = (energy_from_sdf(sdf + h) - energy_from_sdf(sdf - h)) / (2.0 * h) * 0.05;
        assert_abs_diff_eq!(j[0], numeric, epsilon = 1e-3);
        assert!(compute_per_pixel_energy(&point, &field, 1.0, &Matrix4::identity()) > 0.0);
    }

    #[test]
    fn test_zero_on_surface() {
        let field = FnField::new(|i: VoxelIndex| Some(0.1 * i.x as Value));
        let origin = hom(0.0, 0.0, 0.0);
        let j = compute_per_pixel_jacobian(&origin, &field, 1.0, &Matrix4::identity()).unwrap();
        // dE/dsdf vanishes at the peak.
        for v in j.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_far_point_is_missing() {
        let field = FnField::new(|_: VoxelIndex| Some(0.25));
        let mut volume = DenseVolume::new(8, 8, 8)
            .unwrap()
            .with_origin(VoxelIndex::new(-4, -4, -4));
        volume.fill(&|p: Point| p.x);
        let id = Matrix4::identity();

        for point in [hom(1.0e8, 0.0, 0.0), hom(0.0, 0.0, -1.0e8)] {
            assert_eq!(
                compute_per_pixel_jacobian(&point, &field, 200.0, &id),
                Err(Rejection::Missing)
            );
            assert_eq!(
                compute_per_pixel_jacobian(&point, &volume, 200.0, &id),
                Err(Rejection::Missing)
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let field = FnField::new(tilted_plane);
        let point = hom(3.2, 1.7, 2.9);
        let a = compute_per_pixel_jacobian(&point, &field, 1.0, &Matrix4::identity());
        let b = compute_per_pixel_jacobian(&point, &field, 1.0, &Matrix4::identity());
        assert_eq!(a, b);
    }
}

use nalgebra::Vector4;
use ndarray::ArrayView2;

use crate::types::{HomPoint, Intrinsics, Point, Value};

/// Applies a 4-component intrinsics vector `(fx, fy, cx, cy)` to a point whose
/// first two components lie in the pixel plane and whose third is depth.
///
/// ```text
/// x' = fx·x + cx·z
/// y' = fy·y + cy·z
/// z' = z
/// w' = 1
/// ```
#[inline]
pub fn unproject_with_intrinsics(intrinsics: &Vector4<Value>, p: &Point) -> HomPoint {
    HomPoint::new(
        intrinsics.x * p.x + intrinsics.z * p.z,
        intrinsics.y * p.y + intrinsics.w * p.z,
        p.z,
        1.0,
    )
}

/// Back-projects every `stride`-th pixel of a depth image into camera space.
///
/// `depth` is indexed `[v][u]` (row, column). Pixels with a non-finite or
/// non-positive depth are skipped. A `stride` of `0` is treated as `1`.
pub fn unproject_depth(
    depth: ArrayView2<Value>,
    intrinsics: &Intrinsics,
    stride: usize,
) -> Vec<HomPoint> {
    let stride = stride.max(1);
    let inv = intrinsics.inverse();
    let (rows, cols) = depth.dim();

    let mut points = Vec::with_capacity((rows / stride + 1) * (cols / stride + 1));
    for v in (0..rows).step_by(stride) {
        for u in (0..cols).step_by(stride) {
            let z = depth[[v, u]];
            if !z.is_finite() || z <= 0.0 {
                continue;
            }
            let sample = Point::new(u as Value * z, v as Value * z, z);
            points.push(unproject_with_intrinsics(&inv, &sample));
        }
    }
    points
}

use crate::{
    field::{DistanceField, nearest_voxel, offset_voxel},
    types::{Point, TRUNCATED_SDF, Value, VoxelIndex},
};

/// Decoded SDF at `center + step`, or `None` if it is missing or truncated.
#[inline]
fn usable_sdf<F: DistanceField>(
    field: &F,
    center: VoxelIndex,
    step: VoxelIndex,
) -> Option<Value> {
    let index = offset_voxel(center, step)?;
    field.sdf_at(index).filter(|&sdf| sdf != TRUNCATED_SDF)
}

/// Central-difference SDF gradient at a volume-space point.
///
/// The point is rounded to its nearest voxel and each axis component is
/// `(sdf[+1] - sdf[-1]) / 2`. The six neighbour reads must all succeed:
/// the first missing or truncated neighbour invalidates the whole estimate
/// and the remaining reads are skipped. A point that cannot be indexed has
/// no gradient.
pub fn compute_sdf_gradient<F: DistanceField>(point: &Point, field: &F) -> Option<Point> {
    let center = nearest_voxel(point)?;
    let mut gradient = Point::zeros();
    // X, then Y, then Z.
    for axis in 0..3 {
        let step = VoxelIndex::ith(axis, 1);
        let plus = usable_sdf(field, center, step)?;
        let minus = usable_sdf(field, center, -step)?;
        gradient[axis] = (plus - minus) * 0.5;
    }
    Some(gradient)
}

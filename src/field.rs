use crate::types::{Point, Value, VoxelIndex};

/// Largest voxel coordinate magnitude a point may round to.
///
/// Leaves headroom below `i32::MAX` for neighbour steps and block origins.
pub const MAX_VOXEL_COORD: i32 = 1 << 30;

/// Read-only access to a volumetric signed distance field.
///
/// Values are normalised so `0` is on the surface and `±1` is at or beyond
/// the truncation band; [`TRUNCATED_SDF`](crate::types::TRUNCATED_SDF) means
/// "no usable information". A voxel that was never allocated or observed
/// reads as `None`.
///
/// The tracking kernels are written once against this trait, so storage
/// strategies plug in without dynamic dispatch. Implementations must not
/// rely on interior mutability: the kernels call them concurrently from
/// many workers.
pub trait DistanceField: Sync {
    /// Raw stored voxel representation.
    type Voxel;

    /// Reads the voxel at an integer index, or `None` when unallocated or unobserved.
    fn read_voxel(&self, index: VoxelIndex) -> Option<Self::Voxel>;

    /// Converts a raw voxel into a normalised SDF value.
    fn decode_raw(voxel: &Self::Voxel) -> Value;

    /// Non-interpolated lookup: reads the voxel nearest to `point`.
    ///
    /// Points that cannot be indexed read as `None`.
    #[inline]
    fn lookup(&self, point: &Point) -> Option<Value> {
        nearest_voxel(point).and_then(|index| self.sdf_at(index))
    }

    /// Decoded SDF at an integer index.
    #[inline]
    fn sdf_at(&self, index: VoxelIndex) -> Option<Value> {
        self.read_voxel(index).map(|voxel| Self::decode_raw(&voxel))
    }
}

/// Rounds a volume-space point to the nearest voxel index.
///
/// Halves round away from zero. Returns `None` for non-finite points and for
/// points beyond [`MAX_VOXEL_COORD`] on any axis.
#[inline]
pub fn nearest_voxel(point: &Point) -> Option<VoxelIndex> {
    let limit = MAX_VOXEL_COORD as Value;
    point
        .iter()
        .all(|c| c.is_finite() && c.abs() <= limit)
        .then(|| point.map(|c| c.round() as i32))
}

/// Component-wise `index + offset`, or `None` on overflow.
#[inline]
pub fn offset_voxel(index: VoxelIndex, offset: VoxelIndex) -> Option<VoxelIndex> {
    Some(VoxelIndex::new(
        index.x.checked_add(offset.x)?,
        index.y.checked_add(offset.y)?,
        index.z.checked_add(offset.z)?,
    ))
}

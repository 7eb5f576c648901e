use ndarray::Array3;

use crate::{
    error::{Result, TrackerError},
    field::DistanceField,
    types::{Point, TRUNCATED_SDF, Value, VoxelIndex},
};

/// Quantisation scale of the stored SDF: `raw = sdf · SDF_SCALE`.
pub const SDF_SCALE: Value = i16::MAX as Value;

/// A signed distance function over volume-space points (voxel units).
pub type SdfFunction = dyn Fn(Point) -> Value + Sync;

/// One stored voxel: quantised SDF plus an integration weight.
///
/// Fresh voxels hold the truncated sentinel with zero weight. A voxel with
/// zero weight has never been observed and reads as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voxel {
    pub sdf: i16,
    pub weight: u8,
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            sdf: i16::MAX,
            weight: 0,
        }
    }
}

impl Voxel {
    #[inline]
    pub fn encode(sdf: Value) -> i16 {
        (sdf.clamp(-1.0, 1.0) * SDF_SCALE).round() as i16
    }

    #[inline]
    pub fn decode(raw: i16) -> Value {
        raw as Value / SDF_SCALE
    }

    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0
    }
}

/// A dense block of voxels holding a quantised SDF.
///
/// Voxels are stored as `voxels[[z, y, x]]`; `origin` is the volume-space
/// index of `voxels[[0, 0, 0]]`. Anything outside the block, and any voxel
/// that was never observed, reads as missing.
#[derive(Debug, Clone)]
pub struct DenseVolume {
    /// Volume-space index of the first stored voxel.
    pub origin: VoxelIndex,
    /// Truncation band, in voxels, used when filling from a distance function.
    pub truncation: Value,
    /// Stored voxels, indexed `[z, y, x]`.
    pub voxels: Array3<Voxel>,
}

impl DenseVolume {
    /// Creates a block of `size_x × size_y × size_z` unobserved voxels at the origin.
    ///
    /// Returns [`TrackerError::EmptyVolume`] if any dimension is zero.
    pub fn new(size_x: usize, size_y: usize, size_z: usize) -> Result<Self> {
        if size_x == 0 || size_y == 0 || size_z == 0 {
            return Err(TrackerError::EmptyVolume);
        }
        Ok(Self {
            origin: VoxelIndex::zeros(),
            truncation: 4.0,
            voxels: Array3::default((size_z, size_y, size_x)),
        })
    }

    /// Builds a block from decoded SDF values indexed `[z, y, x]`.
    ///
    /// Every voxel is marked observed.
    pub fn from_values(origin: VoxelIndex, values: &Array3<Value>) -> Result<Self> {
        if values.is_empty() {
            return Err(TrackerError::EmptyVolume);
        }
        Ok(Self {
            origin,
            truncation: 4.0,
            voxels: values.mapv(|v| Voxel {
                sdf: Voxel::encode(v),
                weight: 1,
            }),
        })
    }

    /// Moves the block so its first voxel sits at `origin`.
    pub fn with_origin(mut self, origin: VoxelIndex) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the truncation band used by [`fill`](DenseVolume::fill).
    pub fn with_truncation(mut self, truncation: Value) -> Self {
        self.truncation = truncation;
        self
    }

    /// Returns `[size_x, size_y, size_z]`.
    pub fn dims(&self) -> [usize; 3] {
        let (z, y, x) = self.voxels.dim();
        [x, y, z]
    }

    /// Replaces the voxel block, keeping the current shape.
    ///
    /// Returns [`TrackerError::ShapeMismatch`] if `voxels` has a different shape.
    pub fn with_voxels(mut self, voxels: Array3<Voxel>) -> Result<Self> {
        let (z, y, x) = voxels.dim();
        if [x, y, z] != self.dims() {
            return Err(TrackerError::ShapeMismatch {
                expected: self.dims(),
                found: [x, y, z],
            });
        }
        self.voxels = voxels;
        Ok(self)
    }

    #[inline]
    fn local(&self, index: VoxelIndex) -> Option<[usize; 3]> {
        let [sx, sy, sz] = self.dims();
        let axis = |c: i32, origin: i32, size: usize| -> Option<usize> {
            let rel = usize::try_from(c.checked_sub(origin)?).ok()?;
            (rel < size).then_some(rel)
        };
        Some([
            axis(index.z, self.origin.z, sz)?,
            axis(index.y, self.origin.y, sy)?,
            axis(index.x, self.origin.x, sx)?,
        ])
    }

    /// Returns the stored voxel at a volume-space index, observed or not.
    pub fn get(&self, index: VoxelIndex) -> Option<Voxel> {
        self.local(index).map(|i| self.voxels[i])
    }

    /// Stores a decoded SDF value and marks the voxel observed.
    ///
    /// Indices outside the block are ignored.
    pub fn set(&mut self, index: VoxelIndex, sdf: Value) {
        if let Some(i) = self.local(index) {
            self.voxels[i] = Voxel {
                sdf: Voxel::encode(sdf),
                weight: 1,
            };
        }
    }

    /// Fills the block by evaluating `function` at every voxel centre.
    ///
    /// `function` returns a signed distance in voxels; it is normalised by
    /// [`truncation`](DenseVolume::truncation) and clamped to `[-1, 1]`.
    pub fn fill(&mut self, function: &SdfFunction) {
        let origin = self.origin;
        let band = self.truncation;
        for ((z, y, x), voxel) in self.voxels.indexed_iter_mut() {
            let p = Point::new(
                origin.x as Value + x as Value,
                origin.y as Value + y as Value,
                origin.z as Value + z as Value,
            );
            *voxel = Voxel {
                sdf: Voxel::encode(function(p) / band),
                weight: 1,
            };
        }
    }

    /// Counts observed voxels holding a value inside the truncation band.
    pub fn band_voxel_count(&self) -> usize {
        self.voxels
            .iter()
            .filter(|v| v.is_observed() && Voxel::decode(v.sdf) != TRUNCATED_SDF)
            .count()
    }
}

impl DistanceField for DenseVolume {
    type Voxel = Voxel;

    #[inline]
    fn read_voxel(&self, index: VoxelIndex) -> Option<Voxel> {
        self.get(index).filter(Voxel::is_observed)
    }

    #[inline]
    fn decode_raw(voxel: &Voxel) -> Value {
        Voxel::decode(voxel.sdf)
    }
}

/// A field backed by a closure over voxel indices.
///
/// The closure returns `None` for unallocated voxels. Handy for synthetic
/// scenes with an exact analytic SDF.
pub struct FnField<F> {
    function: F,
}

impl<F> FnField<F>
where
    F: Fn(VoxelIndex) -> Option<Value> + Sync,
{
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F> DistanceField for FnField<F>
where
    F: Fn(VoxelIndex) -> Option<Value> + Sync,
{
    type Voxel = Value;

    #[inline]
    fn read_voxel(&self, index: VoxelIndex) -> Option<Value> {
        (self.function)(index)
    }

    #[inline]
    fn decode_raw(voxel: &Value) -> Value {
        *voxel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_encode_decode_exact_at_surface_and_sentinel() {
        assert_eq!(Voxel::decode(Voxel::encode(0.0)), 0.0);
        assert_eq!(Voxel::decode(Voxel::encode(1.0)), TRUNCATED_SDF);
        assert_eq!(Voxel::decode(Voxel::encode(3.0)), TRUNCATED_SDF);
        assert_eq!(Voxel::decode(Voxel::encode(-1.0)), -1.0);
    }

    #[test]
    fn test_unobserved_voxels_read_as_missing() {
        let mut volume = DenseVolume::new(2, 2, 2).unwrap();
        let index = VoxelIndex::new(1, 1, 1);
        assert_eq!(volume.get(index), Some(Voxel::default()));
        assert_eq!(volume.sdf_at(index), None);
        assert_eq!(volume.band_voxel_count(), 0);

        volume.set(index, TRUNCATED_SDF);
        assert_eq!(volume.lookup(&Point::new(1.0, 1.0, 1.0)), Some(TRUNCATED_SDF));
        assert_eq!(volume.band_voxel_count(), 0);

        volume.set(index, 0.5);
        assert_eq!(volume.band_voxel_count(), 1);
    }

    #[test]
    fn test_outside_block_is_missing() {
        let mut volume = DenseVolume::new(4, 4, 4)
            .unwrap()
            .with_origin(VoxelIndex::new(-2, -2, -2));
        volume.fill(&|p: Point| p.x);
        assert!(volume.sdf_at(VoxelIndex::new(-2, -2, -2)).is_some());
        assert!(volume.sdf_at(VoxelIndex::new(1, 1, 1)).is_some());
        assert!(volume.sdf_at(VoxelIndex::new(2, 0, 0)).is_none());
        assert!(volume.sdf_at(VoxelIndex::new(0, -3, 0)).is_none());
    }

    #[test]
    fn test_extreme_indices_are_missing() {
        let mut volume = DenseVolume::new(8, 8, 8)
            .unwrap()
            .with_origin(VoxelIndex::new(-4, -4, -4));
        volume.fill(&|p: Point| p.x);

        for index in [
            VoxelIndex::new(i32::MAX, 0, 0),
            VoxelIndex::new(0, i32::MIN, 0),
            VoxelIndex::new(0, 0, i32::MAX),
        ] {
            assert_eq!(volume.sdf_at(index), None, "{index:?}");
        }
        assert_eq!(volume.lookup(&Point::new(2.0e10, 0.0, 0.0)), None);
        assert_eq!(volume.lookup(&Point::new(0.0, -2.0e10, 0.0)), None);

        let far = DenseVolume::new(2, 2, 2)
            .unwrap()
            .with_origin(VoxelIndex::new(i32::MAX - 1, 0, 0));
        assert!(far.get(VoxelIndex::new(i32::MIN, 0, 0)).is_none());
        assert!(far.get(VoxelIndex::new(i32::MAX, 1, 1)).is_some());
    }

    #[test]
    fn test_from_values() {
        let mut values = Array3::<Value>::zeros((2, 3, 4));
        values[[1, 2, 3]] = -0.5;
        values[[0, 0, 0]] = 2.0;
        let volume = DenseVolume::from_values(VoxelIndex::new(10, 0, -1), &values).unwrap();

        assert_eq!(volume.dims(), [4, 3, 2]);
        assert_eq!(volume.band_voxel_count(), 23);
        assert_eq!(volume.sdf_at(VoxelIndex::new(10, 0, -1)), Some(TRUNCATED_SDF));
        assert_abs_diff_eq!(
            volume.sdf_at(VoxelIndex::new(13, 2, 0)).unwrap(),
            -0.5,
            epsilon = 1e-4
        );
        assert_eq!(volume.sdf_at(VoxelIndex::new(11, 1, -1)), Some(0.0));
        assert_eq!(volume.sdf_at(VoxelIndex::new(9, 0, -1)), None);

        let empty = Array3::<Value>::zeros((0, 3, 4));
        assert_eq!(
            DenseVolume::from_values(VoxelIndex::zeros(), &empty).unwrap_err(),
            TrackerError::EmptyVolume
        );
    }

    #[test]
    fn test_fill_sphere() {
        let mut volume = DenseVolume::new(16, 16, 16).unwrap().with_truncation(4.0);
        let center = Point::new(8.0, 8.0, 8.0);
        volume.fill(&move |p: Point| (p - center).norm() - 4.0);

        assert_abs_diff_eq!(
            volume.lookup(&Point::new(12.0, 8.0, 8.0)).unwrap(),
            0.0,
            epsilon = 1e-4
        );
        assert_abs_diff_eq!(
            volume.lookup(&Point::new(8.0, 8.0, 8.0)).unwrap(),
            -1.0,
            epsilon = 1e-4
        );
        assert_eq!(volume.lookup(&Point::new(0.0, 0.0, 0.0)), Some(TRUNCATED_SDF));
        assert!(volume.band_voxel_count() > 0);
    }

    #[test]
    fn test_set_and_lookup_rounds_to_nearest() {
        let mut volume = DenseVolume::new(3, 3, 3).unwrap();
        volume.set(VoxelIndex::new(1, 2, 0), -0.5);
        assert_abs_diff_eq!(
            volume.lookup(&Point::new(1.3, 1.6, -0.4)).unwrap(),
            -0.5,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_shape_checks() {
        assert_eq!(DenseVolume::new(0, 1, 1).unwrap_err(), TrackerError::EmptyVolume);
        let volume = DenseVolume::new(2, 3, 4).unwrap();
        assert_eq!(volume.dims(), [2, 3, 4]);
        let err = volume
            .with_voxels(Array3::default((1, 1, 1)))
            .unwrap_err();
        assert_eq!(
            err,
            TrackerError::ShapeMismatch {
                expected: [2, 3, 4],
                found: [1, 1, 1]
            }
        );
    }

    #[test]
    fn test_fn_field() {
        let field = FnField::new(|i: VoxelIndex| (i.x >= 0).then_some(0.25));
        assert_eq!(field.lookup(&Point::new(0.2, 5.0, 5.0)), Some(0.25));
        assert_eq!(field.lookup(&Point::new(-0.6, 5.0, 5.0)), None);
    }
}

use crate::error::FluidError;

/// Edge length of the compute thread groups all volume kernels are written for.
pub const COMPUTE_LOCAL_SIZE_VOLUME: u32 = 8;

/// Largest grid edge length, wgpu's guaranteed `max_texture_dimension_3d`.
pub const MAX_GRID_RESOLUTION: u32 = 2048;

/// Side length of the cubic simulation grid. Fixed for the lifetime of a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridResolution(u32);

impl GridResolution {
    pub fn new(resolution: u32) -> Result<Self, FluidError> {
        if resolution == 0 {
            return Err(FluidError::InvalidGridResolution(resolution));
        }
        if resolution % COMPUTE_LOCAL_SIZE_VOLUME != 0 {
            warn!(
                "grid resolution {} is not a multiple of {}, border thread groups will be partially idle",
                resolution, COMPUTE_LOCAL_SIZE_VOLUME
            );
        }
        Ok(GridResolution(resolution))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Scales grid indices to [0, 1] texture space.
    pub fn inverse(self) -> f32 {
        1.0 / self.0 as f32
    }

    /// Cell count, `None` if it doesn't fit into `usize`.
    pub fn num_cells(self) -> Option<usize> {
        let n = self.0 as usize;
        n.checked_mul(n)?.checked_mul(n)
    }

    pub fn extent(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.0,
            height: self.0,
            depth_or_array_layers: self.0,
        }
    }

    /// Linear texel index, x varying fastest.
    pub fn index(self, x: u32, y: u32, z: u32) -> usize {
        debug_assert_lt!(x, self.0);
        debug_assert_lt!(y, self.0);
        debug_assert_lt!(z, self.0);
        let n = self.0 as usize;
        x as usize + n * (y as usize + n * z as usize)
    }

    pub fn cells(self) -> impl Iterator<Item = [u32; 3]> {
        let n = self.0;
        (0..n).flat_map(move |z| (0..n).flat_map(move |y| (0..n).map(move |x| [x, y, z])))
    }

    /// Number of thread groups needed to cover the grid.
    pub fn workgroups(self) -> WorkgroupCount {
        let groups = self.0.div_ceil(COMPUTE_LOCAL_SIZE_VOLUME);
        WorkgroupCount {
            x: groups,
            y: groups,
            z: groups,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkgroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupCount {
    /// Total thread count per axis for the volume thread group size.
    pub fn threads(self) -> [u32; 3] {
        [
            self.x * COMPUTE_LOCAL_SIZE_VOLUME,
            self.y * COMPUTE_LOCAL_SIZE_VOLUME,
            self.z * COMPUTE_LOCAL_SIZE_VOLUME,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_resolution_is_rejected() {
        assert!(matches!(GridResolution::new(0), Err(FluidError::InvalidGridResolution(0))));
    }

    #[test]
    fn workgroups_cover_grid() {
        for n in [1, 7, 8, 9, 63, 64, 65, 512] {
            let threads = GridResolution::new(n).unwrap().workgroups().threads();
            for axis in threads {
                assert_ge!(axis, n);
                assert_lt!(axis - n, COMPUTE_LOCAL_SIZE_VOLUME);
            }
            if n % COMPUTE_LOCAL_SIZE_VOLUME == 0 {
                assert_eq!(threads, [n, n, n]);
            }
        }
    }

    #[test]
    fn index_is_x_fastest() {
        let grid = GridResolution::new(4).unwrap();
        assert_eq!(grid.index(1, 0, 0), 1);
        assert_eq!(grid.index(0, 1, 0), 4);
        assert_eq!(grid.index(0, 0, 1), 16);
        assert_eq!(Some(grid.cells().count()), grid.num_cells());
        assert!(grid.cells().enumerate().all(|(i, [x, y, z])| grid.index(x, y, z) == i));
    }
}

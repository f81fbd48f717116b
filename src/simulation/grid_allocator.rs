use crate::backend::{ComputeBackend, TexelUpload, VolumeDescriptor};
use crate::error::FluidError;
use crate::format_info;
use crate::grid::GridResolution;
use crate::ping_pong::PingPong;
use crate::volume::VolumeResource;

/// Creates volumes for one fixed grid resolution.
pub struct GridAllocator {
    resolution: GridResolution,
}

impl GridAllocator {
    pub fn new(resolution: GridResolution) -> Self {
        GridAllocator { resolution }
    }

    /// Allocates a volume, optionally filled with tightly packed texels (x fastest, then y, then z).
    ///
    /// Without initial data the content is whatever the device provides.
    pub fn allocate<B: ComputeBackend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        format: wgpu::TextureFormat,
        initial_data: Option<&[u8]>,
    ) -> Result<VolumeResource<B::View>, FluidError> {
        let n = self.resolution.get();
        if format_info::bytes_per_texel(format) == 0 {
            return Err(FluidError::UnsupportedFormat {
                format,
                usage: "grid volumes",
            });
        }
        let oversized = || FluidError::ResourceCreation {
            label: label.to_owned(),
            message: format!("a {}^3 volume of {:?} exceeds the addressable size", n, format),
        };
        let (bytes_per_row, bytes_per_image) = format_info::upload_pitches(format, n).ok_or_else(oversized)?;

        let upload = match initial_data {
            Some(data) => {
                let expected = (bytes_per_image as usize).checked_mul(n as usize).ok_or_else(oversized)?;
                if data.len() != expected {
                    return Err(FluidError::InitialDataSize {
                        label: label.to_owned(),
                        expected,
                        actual: data.len(),
                    });
                }
                Some(TexelUpload {
                    data,
                    bytes_per_row,
                    bytes_per_image,
                })
            }
            None => None,
        };

        let volume = backend.create_volume(
            &VolumeDescriptor {
                label,
                resolution: self.resolution,
                format,
            },
            upload,
        )?;
        debug!("allocated {:?}", volume);
        Ok(volume)
    }

    /// Allocates both volumes of a double-buffered quantity. Initial data only goes into the current volume.
    pub fn allocate_pair<B: ComputeBackend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        format: wgpu::TextureFormat,
        initial_data: Option<&[u8]>,
    ) -> Result<PingPong<VolumeResource<B::View>>, FluidError> {
        let current = self.allocate(backend, &format!("{} 0", label), format, initial_data)?;
        let next = self.allocate(backend, &format!("{} 1", label), format, None)?;
        Ok(PingPong::new(current, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;

    #[test]
    fn allocations_are_independent() {
        let mut backend = CpuBackend::new();
        let resolution = GridResolution::new(4).unwrap();
        let allocator = GridAllocator::new(resolution);
        let a = allocator.allocate(&mut backend, "a", wgpu::TextureFormat::Rgba32Float, None).unwrap();
        let b = allocator.allocate(&mut backend, "b", wgpu::TextureFormat::Rgba32Float, None).unwrap();
        assert_ne!(a.id(), b.id());

        CpuBackend::write_texel(&a, [1, 2, 3], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(CpuBackend::read_texels(&a)[resolution.index(1, 2, 3)], [1.0, 2.0, 3.0, 4.0]);
        assert!(CpuBackend::read_texels(&b).iter().all(|texel| *texel == [0.0; 4]));
    }

    #[test]
    fn initial_data_size_is_checked() {
        let mut backend = CpuBackend::new();
        let allocator = GridAllocator::new(GridResolution::new(2).unwrap());
        let data = vec![0u8; 8 * 4 - 1];
        assert!(matches!(
            allocator.allocate(&mut backend, "p", wgpu::TextureFormat::R32Float, Some(&data)),
            Err(FluidError::InitialDataSize {
                expected: 32,
                actual: 31,
                ..
            })
        ));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn initial_data_reaches_the_volume() {
        let mut backend = CpuBackend::new();
        let resolution = GridResolution::new(2).unwrap();
        let allocator = GridAllocator::new(resolution);
        let data: Vec<u8> = (0..8).flat_map(|i| (i as f32).to_le_bytes()).collect();
        let volume = allocator.allocate(&mut backend, "p", wgpu::TextureFormat::R32Float, Some(&data)).unwrap();
        let texels = CpuBackend::read_texels(&volume);
        assert_eq!(texels[resolution.index(1, 1, 1)][0], 7.0);
    }

    #[test]
    fn formats_without_pitch_are_rejected() {
        let mut backend = CpuBackend::new();
        let allocator = GridAllocator::new(GridResolution::new(4).unwrap());
        assert!(matches!(
            allocator.allocate(&mut backend, "bc", wgpu::TextureFormat::Depth24Plus, None),
            Err(FluidError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn oversized_volumes_are_rejected() {
        let mut backend = CpuBackend::new();
        let allocator = GridAllocator::new(GridResolution::new(16384).unwrap());
        assert!(matches!(
            allocator.allocate(&mut backend, "Velocity", wgpu::TextureFormat::Rgba32Float, None),
            Err(FluidError::ResourceCreation { .. })
        ));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn device_rejection_propagates() {
        let mut backend = CpuBackend::new().with_max_resolution(8);
        let allocator = GridAllocator::new(GridResolution::new(16).unwrap());
        assert!(matches!(
            allocator.allocate_pair(&mut backend, "Velocity", wgpu::TextureFormat::Rgba32Float, None),
            Err(FluidError::ResourceCreation { .. })
        ));
    }
}

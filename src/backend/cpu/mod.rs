//! Host backend: runs every kernel on the CPU and keeps a log of everything it was asked to do.
//!
//! Mainly used for tests, but also handy to inspect simulation results since the GPU backend has no readback.

mod kernels;
mod raymarch;

pub use raymarch::CpuRenderTarget;

use super::{
    Access, BindingState, ComputeBackend, RenderBackend, RenderState, SamplerKind, TexelUpload, VolumeDescriptor,
};
use crate::error::FluidError;
use crate::format_info;
use crate::grid::{GridResolution, WorkgroupCount};
use crate::kernel::{names, Kernel, KernelStage, ParameterValue};
use crate::volume::{VolumeId, VolumeResource};
pub use kernels::Texel;
use std::cell::RefCell;
use std::rc::Rc;

pub type CpuView = Rc<RefCell<CpuVolume>>;

/// Texel storage of a host volume. Single channel formats only use the first component.
pub struct CpuVolume {
    resolution: GridResolution,
    channels: usize,
    texels: Vec<Texel>,
}

impl CpuVolume {
    fn from_texels(resolution: GridResolution, channels: usize, texels: Vec<Texel>) -> Self {
        assert_eq!(Some(texels.len()), resolution.num_cells());
        CpuVolume {
            resolution,
            channels,
            texels,
        }
    }

    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn texel(&self, cell: [u32; 3]) -> Texel {
        self.texels[self.resolution.index(cell[0], cell[1], cell[2])]
    }

    fn store(&mut self, index: usize, value: Texel) {
        let mut masked = [0.0; 4];
        masked[..self.channels].copy_from_slice(&value[..self.channels]);
        self.texels[index] = masked;
    }

    fn load_clamped(&self, x: i64, y: i64, z: i64) -> Texel {
        let max = self.resolution.get() as i64 - 1;
        let clamp = |v: i64| v.clamp(0, max) as u32;
        self.texel([clamp(x), clamp(y), clamp(z)])
    }

    /// Samples at texture space coordinates like a clamp-to-edge sampler would.
    pub fn sample(&self, sampler: SamplerKind, uvw: [f32; 3]) -> Texel {
        let n = self.resolution.get() as f32;
        match sampler {
            SamplerKind::PointClamp => self.load_clamped(
                (uvw[0] * n).floor() as i64,
                (uvw[1] * n).floor() as i64,
                (uvw[2] * n).floor() as i64,
            ),
            SamplerKind::LinearClamp => {
                // Everything outside [-1, n] samples the border texels anyway.
                let t = [uvw[0], uvw[1], uvw[2]].map(|c| (c * n - 0.5).clamp(-1.0, n));
                let base = [t[0].floor(), t[1].floor(), t[2].floor()];
                let frac = [t[0] - base[0], t[1] - base[1], t[2] - base[2]];
                let [bx, by, bz] = [base[0] as i64, base[1] as i64, base[2] as i64];

                let lerp = |a: Texel, b: Texel, f: f32| -> Texel {
                    [
                        a[0] * (1.0 - f) + b[0] * f,
                        a[1] * (1.0 - f) + b[1] * f,
                        a[2] * (1.0 - f) + b[2] * f,
                        a[3] * (1.0 - f) + b[3] * f,
                    ]
                };
                let row = |y: i64, z: i64| lerp(self.load_clamped(bx, y, z), self.load_clamped(bx + 1, y, z), frac[0]);
                let slice = |z: i64| lerp(row(by, z), row(by + 1, z), frac[1]);
                lerp(slice(bz), slice(bz + 1), frac[2])
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendEvent {
    CreateVolume {
        id: VolumeId,
        label: String,
        format: wgpu::TextureFormat,
        initialized: bool,
    },
    SetKernel(Kernel),
    UploadParameters {
        kernel: Kernel,
        values: Vec<(&'static str, ParameterValue)>,
    },
    Dispatch {
        kernel: Kernel,
        workgroups: WorkgroupCount,
        reads: Vec<(&'static str, VolumeId)>,
        write: (&'static str, VolumeId),
        texels_written: usize,
    },
    Draw {
        kernel: Kernel,
        vertex_count: u32,
        render_state: RenderState,
        reads: Vec<(&'static str, VolumeId)>,
        pixels_covered: usize,
    },
    UnbindAll {
        released: usize,
    },
    SetRenderState(RenderState),
}

/// The largest 3D texture size wgpu guarantees.
const DEFAULT_MAX_RESOLUTION: u32 = 2048;

pub struct CpuBackend {
    bindings: BindingState<CpuView>,
    events: Vec<BackendEvent>,
    render_state: RenderState,
    render_target: Option<CpuRenderTarget>,
    max_resolution: u32,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend {
            bindings: BindingState::new(),
            events: Vec::new(),
            render_state: RenderState::default(),
            render_target: None,
            max_resolution: DEFAULT_MAX_RESOLUTION,
        }
    }

    /// Emulates a device that refuses volumes above the given edge length.
    pub fn with_max_resolution(mut self, max_resolution: u32) -> Self {
        self.max_resolution = max_resolution;
        self
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_render_target(&mut self, target: CpuRenderTarget) {
        self.render_target = Some(target);
    }

    pub fn render_target(&self) -> Option<&CpuRenderTarget> {
        self.render_target.as_ref()
    }

    pub fn take_render_target(&mut self) -> Option<CpuRenderTarget> {
        self.render_target.take()
    }

    /// Copy of all texels of a volume.
    pub fn read_texels(volume: &VolumeResource<CpuView>) -> Vec<Texel> {
        volume.read_view().borrow().texels().to_vec()
    }

    /// Overwrites a single texel through the write view.
    pub fn write_texel(volume: &VolumeResource<CpuView>, cell: [u32; 3], value: Texel) {
        let mut storage = volume.write_view().borrow_mut();
        let index = storage.resolution.index(cell[0], cell[1], cell[2]);
        storage.store(index, value);
    }

    fn channels(format: wgpu::TextureFormat) -> Result<usize, FluidError> {
        match format {
            wgpu::TextureFormat::Rgba32Float | wgpu::TextureFormat::R32Float => Ok(format_info::channel_count(format) as usize),
            _ => Err(FluidError::UnsupportedFormat {
                format,
                usage: "host volumes",
            }),
        }
    }

    fn decode(desc: &VolumeDescriptor<'_>, channels: usize, num_cells: usize, upload: &TexelUpload<'_>) -> Result<Vec<Texel>, FluidError> {
        let n = desc.resolution.get() as usize;
        let row_size = n * channels * std::mem::size_of::<f32>();
        let required = upload.bytes_per_image as usize * (n - 1) + upload.bytes_per_row as usize * (n - 1) + row_size;
        if (upload.bytes_per_row as usize) < row_size || upload.data.len() < required {
            return Err(FluidError::ResourceCreation {
                label: desc.label.to_owned(),
                message: format!("{} bytes of initial data don't cover the volume", upload.data.len()),
            });
        }

        let mut texels = Vec::with_capacity(num_cells);
        for z in 0..n {
            for y in 0..n {
                let row_start = z * upload.bytes_per_image as usize + y * upload.bytes_per_row as usize;
                let row = &upload.data[row_start..row_start + row_size];
                for texel_bytes in row.chunks_exact(channels * std::mem::size_of::<f32>()) {
                    let mut texel = [0.0; 4];
                    for (c, component) in texel_bytes.chunks_exact(std::mem::size_of::<f32>()).enumerate() {
                        texel[c] = bytemuck::pod_read_unaligned::<f32>(component);
                    }
                    texels.push(texel);
                }
            }
        }
        Ok(texels)
    }
}

impl ComputeBackend for CpuBackend {
    type View = CpuView;

    fn create_volume(
        &mut self,
        desc: &VolumeDescriptor<'_>,
        initial_data: Option<TexelUpload<'_>>,
    ) -> Result<VolumeResource<CpuView>, FluidError> {
        let channels = Self::channels(desc.format)?;
        if desc.resolution.get() > self.max_resolution {
            return Err(FluidError::ResourceCreation {
                label: desc.label.to_owned(),
                message: format!(
                    "resolution {} exceeds the maximum of {}",
                    desc.resolution.get(),
                    self.max_resolution
                ),
            });
        }
        let num_cells = desc.resolution.num_cells().ok_or_else(|| FluidError::ResourceCreation {
            label: desc.label.to_owned(),
            message: format!("{}^3 cells don't fit into host memory", desc.resolution.get()),
        })?;

        // Uninitialized host memory is zeroed.
        let texels = match &initial_data {
            Some(upload) => Self::decode(desc, channels, num_cells, upload)?,
            None => vec![[0.0; 4]; num_cells],
        };
        let storage: CpuView = Rc::new(RefCell::new(CpuVolume::from_texels(desc.resolution, channels, texels)));
        let volume = VolumeResource::new(desc.label, desc.format, desc.resolution, storage.clone(), storage);

        self.events.push(BackendEvent::CreateVolume {
            id: volume.id(),
            label: desc.label.to_owned(),
            format: desc.format,
            initialized: initial_data.is_some(),
        });
        Ok(volume)
    }

    fn bindings(&mut self) -> &mut BindingState<CpuView> {
        &mut self.bindings
    }

    fn set_kernel(&mut self, kernel: Kernel) {
        self.bindings.set_kernel(kernel);
        self.events.push(BackendEvent::SetKernel(kernel));
    }

    fn upload_parameters(&mut self) -> Result<(), FluidError> {
        let uploaded = self.bindings.upload_parameters()?;
        self.events.push(BackendEvent::UploadParameters {
            kernel: uploaded.kernel,
            values: uploaded.values.clone(),
        });
        Ok(())
    }

    fn dispatch(&mut self, workgroups: WorkgroupCount) -> Result<(), FluidError> {
        let resolved = self.bindings.resolve(KernelStage::Compute)?;
        let kernel = resolved.kernel;
        let parameters = resolved.parameters;
        let output = resolved.output().ok_or(FluidError::MissingBinding {
            kernel,
            name: names::OUTPUT_FIELD,
        })?;
        let resolution = output.resolution();

        let [threads_x, threads_y, threads_z] = workgroups.threads();
        let n = resolution.get();
        let cells = (0..threads_z.min(n))
            .flat_map(|z| (0..threads_y.min(n)).flat_map(move |y| (0..threads_x.min(n)).map(move |x| [x, y, z])));

        let mut results: Vec<(usize, Texel)> = Vec::new();
        match kernel {
            Kernel::Advect => {
                let field = resolved.volume(names::INPUT_FIELD)?.read_view().borrow();
                let velocity = resolved.volume(names::VELOCITY_FIELD)?.read_view().borrow();
                let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
                let delta_time = parameters.float(names::DELTA_TIME)?;
                let inv = parameters.float(names::INV_GRID_RESOLUTION)?;
                results.extend(cells.map(|cell| {
                    (
                        resolution.index(cell[0], cell[1], cell[2]),
                        kernels::advect(cell, &field, &velocity, sampler, delta_time, inv),
                    )
                }));
            }
            Kernel::Divergence => {
                let velocity = resolved.volume(names::VELOCITY_FIELD)?.read_view().borrow();
                let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
                let inv = parameters.float(names::INV_GRID_RESOLUTION)?;
                results.extend(cells.map(|cell| {
                    (
                        resolution.index(cell[0], cell[1], cell[2]),
                        kernels::divergence(cell, &velocity, sampler, inv),
                    )
                }));
            }
            Kernel::PressureSolve => {
                let divergence = resolved.volume(names::DIVERGENCE_FIELD)?.read_view().borrow();
                let pressure = resolved.volume(names::PRESSURE_FIELD)?.read_view().borrow();
                let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
                let inv = parameters.float(names::INV_GRID_RESOLUTION)?;
                results.extend(cells.map(|cell| {
                    (
                        resolution.index(cell[0], cell[1], cell[2]),
                        kernels::pressure_solve(cell, &divergence, &pressure, sampler, inv),
                    )
                }));
            }
            Kernel::PressureProject => {
                let velocity = resolved.volume(names::VELOCITY_FIELD)?.read_view().borrow();
                let pressure = resolved.volume(names::PRESSURE_FIELD)?.read_view().borrow();
                let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
                let inv = parameters.float(names::INV_GRID_RESOLUTION)?;
                results.extend(cells.map(|cell| {
                    (
                        resolution.index(cell[0], cell[1], cell[2]),
                        kernels::pressure_project(cell, &velocity, &pressure, sampler, inv),
                    )
                }));
            }
            Kernel::Clear => {
                let value = parameters.vec4(names::CLEAR_VALUE)?;
                results.extend(cells.map(|cell| (resolution.index(cell[0], cell[1], cell[2]), value)));
            }
            Kernel::InjectSource => {
                let field = resolved.volume(names::INPUT_FIELD)?.read_view().borrow();
                let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
                let source = kernels::Source {
                    position: parameters.vec3(names::SOURCE_POSITION)?,
                    radius: parameters.float(names::SOURCE_RADIUS)?,
                    value: parameters.vec4(names::SOURCE_VALUE)?,
                };
                let delta_time = parameters.float(names::DELTA_TIME)?;
                let inv = parameters.float(names::INV_GRID_RESOLUTION)?;
                results.extend(cells.map(|cell| {
                    (
                        resolution.index(cell[0], cell[1], cell[2]),
                        kernels::inject_source(cell, &field, sampler, &source, delta_time, inv),
                    )
                }));
            }
            Kernel::Raymarch => {
                return Err(FluidError::WrongKernelStage {
                    kernel,
                    requested: KernelStage::Compute,
                })
            }
        }

        let mut storage = output.write_view().borrow_mut();
        for (index, value) in results.iter() {
            storage.store(*index, *value);
        }
        drop(storage);

        let reads = self
            .bindings
            .volumes()
            .iter()
            .filter(|bound| bound.access == Access::Read)
            .map(|bound| (bound.name, bound.volume.id()))
            .collect();
        let write = self
            .bindings
            .volumes()
            .iter()
            .find(|bound| bound.access == Access::Write)
            .map(|bound| (bound.name, bound.volume.id()))
            .ok_or(FluidError::MissingBinding {
                kernel,
                name: names::OUTPUT_FIELD,
            })?;
        self.events.push(BackendEvent::Dispatch {
            kernel,
            workgroups,
            reads,
            write,
            texels_written: results.len(),
        });
        Ok(())
    }

    fn unbind_all(&mut self) {
        let released = self.bindings.unbind_all();
        self.events.push(BackendEvent::UnbindAll { released });
    }
}

impl RenderBackend for CpuBackend {
    fn render_state(&self) -> RenderState {
        self.render_state
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.render_state = state;
        self.events.push(BackendEvent::SetRenderState(state));
    }

    fn draw(&mut self, vertex_count: u32) -> Result<(), FluidError> {
        let resolved = self.bindings.resolve(KernelStage::Render)?;
        let kernel = resolved.kernel;
        let target = self.render_target.as_mut().ok_or(FluidError::NoRenderTarget)?;
        let density = resolved.volume(names::DENSITY_FIELD)?;
        let sampler = resolved.sampler(names::FIELD_SAMPLER)?;
        let pixels_covered = raymarch::draw(
            target,
            resolved.parameters,
            &density.read_view().borrow(),
            sampler,
            self.render_state,
        )?;

        let reads = self
            .bindings
            .volumes()
            .iter()
            .map(|bound| (bound.name, bound.volume.id()))
            .collect();
        self.events.push(BackendEvent::Draw {
            kernel,
            vertex_count,
            render_state: self.render_state,
            reads,
            pixels_covered,
        });
        Ok(())
    }
}

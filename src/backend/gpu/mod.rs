//! wgpu backend. Kernels are WGSL programs from the shader directory, compiled lazily per output format and render state.

use super::{
    BindingState, ComputeBackend, RenderBackend, RenderState, ResolvedBinding, ResolvedBindings, SamplerKind, TexelUpload,
    VolumeDescriptor,
};
use crate::backend::{BlendMode, CullMode};
use crate::error::FluidError;
use crate::grid::WorkgroupCount;
use crate::kernel::{names, BindingKind, Kernel, KernelStage};
use crate::volume::{VolumeId, VolumeResource};
use crate::wgpu_utils::binding_builder::{clamped_sampler, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc};
use crate::wgpu_utils::binding_types;
use crate::wgpu_utils::pipelines::{
    color_state, depth_state, ComputePipelineCreationDesc, ComputePipelineHandle, PipelineManager, RenderPipelineCreationDesc,
    RenderPipelineHandle,
};
use crate::wgpu_utils::shader::{ShaderDefines, ShaderDirectory};
use crate::wgpu_utils::uniformbuffer::UniformBuffer;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

pub type GpuView = Rc<wgpu::TextureView>;

/// Where render kernels draw to. Contents are loaded and stored, clearing is up to the caller.
pub struct GpuRenderTarget {
    pub color: wgpu::TextureView,
    pub color_format: wgpu::TextureFormat,
    pub depth: Option<(Rc<wgpu::TextureView>, wgpu::TextureFormat)>,
}

// Bind groups reference volumes by id, dropped volumes would otherwise linger forever.
const MAX_CACHED_BIND_GROUPS: usize = 256;

/// Kernel plus the format of its output volume (compute only).
type VariantKey = (Kernel, Option<wgpu::TextureFormat>);

struct KernelVariant {
    bind_group_layout: BindGroupLayoutWithDesc,
    pipeline_layout: Rc<wgpu::PipelineLayout>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum BindGroupResource {
    Read(VolumeId),
    Write(VolumeId),
    Sampler(SamplerKind),
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct BindGroupKey {
    variant: VariantKey,
    resources: Vec<BindGroupResource>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct RenderPipelineKey {
    kernel: Kernel,
    state: RenderState,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
}

struct GpuResources {
    device: Rc<wgpu::Device>,
    queue: Rc<wgpu::Queue>,
    shader_dir: ShaderDirectory,
    pipeline_manager: PipelineManager,
    variants: HashMap<VariantKey, KernelVariant>,
    compute_pipelines: HashMap<VariantKey, ComputePipelineHandle>,
    render_pipelines: HashMap<RenderPipelineKey, RenderPipelineHandle>,
    parameter_buffers: HashMap<Kernel, UniformBuffer>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,
    linear_sampler: wgpu::Sampler,
    point_sampler: wgpu::Sampler,
    encoder: Option<wgpu::CommandEncoder>,
}

fn pop_error_scope(device: &wgpu::Device) -> Option<wgpu::Error> {
    futures::executor::block_on(device.pop_error_scope())
}

fn lazy_encoder<'a>(device: &wgpu::Device, encoder: &'a mut Option<wgpu::CommandEncoder>) -> &'a mut wgpu::CommandEncoder {
    encoder.get_or_insert_with(|| {
        // Popped on submit, catches everything recorded in between.
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Encoder: Fluid"),
        })
    })
}

impl GpuResources {
    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        lazy_encoder(&self.device, &mut self.encoder)
    }

    fn create_variant(device: &wgpu::Device, (kernel, output_format): VariantKey) -> Result<KernelVariant, FluidError> {
        let layout = kernel.layout();
        let label: &'static str = kernel.into();
        let visibility = match layout.stage {
            KernelStage::Compute => wgpu::ShaderStages::COMPUTE,
            KernelStage::Render => wgpu::ShaderStages::VERTEX_FRAGMENT,
        };

        let mut builder = BindGroupLayoutBuilder::new().next_binding(visibility, binding_types::uniform());
        for desc in layout.bindings.iter() {
            let ty = match desc.kind {
                BindingKind::ReadVolume => binding_types::texture_3d(),
                BindingKind::Sampler => binding_types::sampler(),
                BindingKind::WriteVolume => {
                    binding_types::texture_storage_3d(output_format.ok_or(FluidError::MissingBinding { kernel, name: desc.name })?)
                }
            };
            builder = builder.next_binding(visibility, ty);
        }
        let bind_group_layout = builder.create(device, &format!("BindGroupLayout: {}", label));
        let pipeline_layout = Rc::new(device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("PipelineLayout: {}", label)),
            bind_group_layouts: &[&bind_group_layout.layout],
            push_constant_ranges: &[],
        }));

        Ok(KernelVariant {
            bind_group_layout,
            pipeline_layout,
        })
    }

    fn variant(&mut self, key: VariantKey) -> Result<&KernelVariant, FluidError> {
        Ok(match self.variants.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Self::create_variant(&self.device, key)?),
        })
    }

    fn compute_pipeline(&mut self, key: VariantKey) -> Result<ComputePipelineHandle, FluidError> {
        if let Some(handle) = self.compute_pipelines.get(&key) {
            return Ok(handle.clone());
        }

        let (kernel, output_format) = key;
        let label: &'static str = kernel.into();
        let output_format = output_format.ok_or(FluidError::MissingBinding {
            kernel,
            name: names::OUTPUT_FIELD,
        })?;
        let wgsl_format = binding_types::wgsl_storage_format(output_format).ok_or(FluidError::UnsupportedFormat {
            format: output_format,
            usage: "kernel outputs",
        })?;
        let defines: ShaderDefines = vec![("OUTPUT_FORMAT", wgsl_format.to_owned())];

        let pipeline_layout = self.variant(key)?.pipeline_layout.clone();
        let desc = ComputePipelineCreationDesc::new(
            &format!("ComputePipeline: {} -> {:?}", label, output_format),
            pipeline_layout,
            Path::new(kernel.layout().programs[0]),
            defines,
        );
        let handle = self.pipeline_manager.create_compute_pipeline(&self.device, &self.shader_dir, desc)?;
        info!("created compute pipeline for {} writing {:?}", label, output_format);
        self.compute_pipelines.insert(key, handle.clone());
        Ok(handle)
    }

    fn render_pipeline(&mut self, key: RenderPipelineKey) -> Result<RenderPipelineHandle, FluidError> {
        if let Some(handle) = self.render_pipelines.get(&key) {
            return Ok(handle.clone());
        }

        let label: &'static str = key.kernel.into();
        let programs = key.kernel.layout().programs;
        let pipeline_layout = self.variant((key.kernel, None))?.pipeline_layout.clone();
        let mut desc = RenderPipelineCreationDesc::new(
            &format!("RenderPipeline: {} {:?}", label, key.state),
            pipeline_layout,
            Path::new(programs[0]),
            Path::new(programs[1]),
            key.color_format,
            key.depth_format,
        );
        desc.primitive.cull_mode = match key.state.cull {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        };
        desc.color_targets = vec![Some(match key.state.blend {
            BlendMode::Opaque => color_state::write_all(key.color_format),
            BlendMode::PremultipliedAlpha => color_state::premultiplied_alpha(key.color_format),
        })];
        desc.depth_stencil = key.depth_format.map(|format| match (key.state.depth_test, key.state.depth_write) {
            (true, true) => depth_state::default_read_write(format),
            (true, false) => depth_state::read_only(format),
            (false, _) => depth_state::disabled(format),
        });

        let handle = self.pipeline_manager.create_render_pipeline(&self.device, &self.shader_dir, desc)?;
        info!("created render pipeline for {} with {:?}", label, key.state);
        self.render_pipelines.insert(key, handle.clone());
        Ok(handle)
    }

    fn upload_parameters(&mut self, kernel: Kernel, block: &[u8]) {
        let device = &self.device;
        let buffer = self.parameter_buffers.entry(kernel).or_insert_with(|| {
            let label: &'static str = kernel.into();
            UniformBuffer::new(device, block.len() as u64, label)
        });
        let encoder = lazy_encoder(device, &mut self.encoder);
        buffer.update_content(encoder, device, block);
    }

    /// Makes sure a bind group for the resolved bindings exists and returns its key.
    fn bind_group(&mut self, variant_key: VariantKey, resolved: &ResolvedBindings<'_, GpuView>) -> Result<BindGroupKey, FluidError> {
        let key = BindGroupKey {
            variant: variant_key,
            resources: resolved
                .bindings
                .iter()
                .map(|(_, binding)| match binding {
                    ResolvedBinding::Read(volume) => BindGroupResource::Read(volume.id()),
                    ResolvedBinding::Write(volume) => BindGroupResource::Write(volume.id()),
                    ResolvedBinding::Sampler(kind) => BindGroupResource::Sampler(*kind),
                })
                .collect(),
        };
        if self.bind_groups.contains_key(&key) {
            return Ok(key);
        }
        if self.bind_groups.len() >= MAX_CACHED_BIND_GROUPS {
            debug!("bind group cache full, clearing {} entries", self.bind_groups.len());
            self.bind_groups.clear();
        }

        self.variant(variant_key)?;
        let kernel = resolved.kernel;
        let variant = self.variants.get(&variant_key).ok_or(FluidError::NoKernel)?;
        let parameters = self
            .parameter_buffers
            .get(&kernel)
            .ok_or(FluidError::ParametersNotUploaded(kernel))?;

        let mut builder = BindGroupBuilder::new(&variant.bind_group_layout).uniform_buffer(parameters.buffer());
        for (_, binding) in resolved.bindings.iter() {
            builder = match binding {
                ResolvedBinding::Read(volume) => builder.volume(volume.read_view()),
                ResolvedBinding::Write(volume) => builder.volume(volume.write_view()),
                ResolvedBinding::Sampler(SamplerKind::LinearClamp) => builder.sampler(&self.linear_sampler),
                ResolvedBinding::Sampler(SamplerKind::PointClamp) => builder.sampler(&self.point_sampler),
            };
        }
        let label: &'static str = kernel.into();
        let bind_group = builder.create(&self.device, &format!("BindGroup: {}", label));
        self.bind_groups.insert(key.clone(), bind_group);
        Ok(key)
    }

    fn record_dispatch(
        &mut self,
        kernel: Kernel,
        pipeline: &ComputePipelineHandle,
        bind_group: &BindGroupKey,
        workgroups: WorkgroupCount,
    ) -> Result<(), FluidError> {
        let bind_group = self.bind_groups.get(bind_group).ok_or(FluidError::ParametersNotUploaded(kernel))?;
        let pipeline = self.pipeline_manager.get_compute(pipeline);
        let device = &self.device;
        let encoder = lazy_encoder(device, &mut self.encoder);

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.into()),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroups.x, workgroups.y, workgroups.z);
        Ok(())
    }

    fn record_draw(
        &mut self,
        kernel: Kernel,
        pipeline: &RenderPipelineHandle,
        bind_group: &BindGroupKey,
        target: &GpuRenderTarget,
        vertex_count: u32,
    ) -> Result<(), FluidError> {
        let bind_group = self.bind_groups.get(bind_group).ok_or(FluidError::ParametersNotUploaded(kernel))?;
        let pipeline = self.pipeline_manager.get_render(pipeline);
        let device = &self.device;
        let encoder = lazy_encoder(device, &mut self.encoder);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(kernel.into()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: target.depth.as_ref().map(|(view, _)| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..vertex_count, 0..1);
        Ok(())
    }
}

pub struct GpuBackend {
    bindings: BindingState<GpuView>,
    resources: GpuResources,
    render_state: RenderState,
    render_target: Option<GpuRenderTarget>,
}

impl GpuBackend {
    /// Features the kernels rely on: all volumes are sampled with filtering, including 32 bit float formats.
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::FLOAT32_FILTERABLE
    }

    pub fn new(device: Rc<wgpu::Device>, queue: Rc<wgpu::Queue>, shader_directory: &Path) -> Result<Self, FluidError> {
        let missing_features = Self::required_features() - device.features();
        if !missing_features.is_empty() {
            return Err(FluidError::MissingFeatures(missing_features));
        }

        let linear_sampler = device.create_sampler(&clamped_sampler(wgpu::FilterMode::Linear, "Sampler: linear clamp"));
        let point_sampler = device.create_sampler(&clamped_sampler(wgpu::FilterMode::Nearest, "Sampler: point clamp"));
        let shader_dir = ShaderDirectory::new(shader_directory)?;

        Ok(GpuBackend {
            bindings: BindingState::new(),
            resources: GpuResources {
                device,
                queue,
                shader_dir,
                pipeline_manager: PipelineManager::new(),
                variants: HashMap::new(),
                compute_pipelines: HashMap::new(),
                render_pipelines: HashMap::new(),
                parameter_buffers: HashMap::new(),
                bind_groups: HashMap::new(),
                linear_sampler,
                point_sampler,
                encoder: None,
            },
            render_state: RenderState::default(),
            render_target: None,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.resources.device
    }

    /// Command encoder everything is currently recorded into, e.g. for clearing the render target.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.resources.encoder()
    }

    pub fn set_render_target(&mut self, target: Option<GpuRenderTarget>) {
        self.render_target = target;
    }

    /// Submits all recorded work and reports validation errors that occurred while recording.
    pub fn submit(&mut self) -> Result<(), FluidError> {
        if let Some(encoder) = self.resources.encoder.take() {
            self.resources.queue.submit(Some(encoder.finish()));
            if let Some(err) = pop_error_scope(&self.resources.device) {
                return Err(FluidError::Device(err.to_string()));
            }
        }
        Ok(())
    }

    /// Recompiles all pipelines if anything in the shader directory changed.
    pub fn reload_shaders_if_changed(&mut self) -> bool {
        if !self.resources.shader_dir.detected_change() {
            return false;
        }
        self.reload_shaders();
        true
    }

    /// Recompiles all pipelines. Pipelines that fail to compile keep their previous version.
    pub fn reload_shaders(&mut self) {
        info!("reloading shaders");
        self.resources
            .pipeline_manager
            .reload_all(&self.resources.device, &self.resources.shader_dir);
    }
}

impl ComputeBackend for GpuBackend {
    type View = GpuView;

    fn create_volume(
        &mut self,
        desc: &VolumeDescriptor<'_>,
        initial_data: Option<TexelUpload<'_>>,
    ) -> Result<VolumeResource<GpuView>, FluidError> {
        let device = &self.resources.device;
        let required_usages = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING;
        if !desc
            .format
            .guaranteed_format_features(device.features())
            .allowed_usages
            .contains(required_usages)
            || binding_types::wgsl_storage_format(desc.format).is_none()
        {
            return Err(FluidError::UnsupportedFormat {
                format: desc.format,
                usage: "volumes that are read and written",
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Texture: {}", desc.label)),
            size: desc.resolution.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: desc.format,
            usage: required_usages | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(upload) = initial_data {
            self.resources.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                upload.data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(upload.bytes_per_row),
                    rows_per_image: Some(upload.bytes_per_image / upload.bytes_per_row.max(1)),
                },
                desc.resolution.extent(),
            );
        }
        if let Some(err) = pop_error_scope(device) {
            return Err(FluidError::ResourceCreation {
                label: desc.label.to_owned(),
                message: err.to_string(),
            });
        }

        let read_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("TextureView: {} (read)", desc.label)),
            ..Default::default()
        });
        let write_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("TextureView: {} (write)", desc.label)),
            ..Default::default()
        });
        Ok(VolumeResource::new(
            desc.label,
            desc.format,
            desc.resolution,
            Rc::new(read_view),
            Rc::new(write_view),
        ))
    }

    fn bindings(&mut self) -> &mut BindingState<GpuView> {
        &mut self.bindings
    }

    fn upload_parameters(&mut self) -> Result<(), FluidError> {
        let uploaded = self.bindings.upload_parameters()?;
        self.resources.upload_parameters(uploaded.kernel, &uploaded.block);
        Ok(())
    }

    fn dispatch(&mut self, workgroups: WorkgroupCount) -> Result<(), FluidError> {
        let resolved = self.bindings.resolve(KernelStage::Compute)?;
        let kernel = resolved.kernel;
        let output = resolved.output().ok_or(FluidError::MissingBinding {
            kernel,
            name: names::OUTPUT_FIELD,
        })?;
        let variant_key = (kernel, Some(output.format()));

        let pipeline = self.resources.compute_pipeline(variant_key)?;
        let bind_group = self.resources.bind_group(variant_key, &resolved)?;
        self.resources.record_dispatch(kernel, &pipeline, &bind_group, workgroups)
    }
}

impl RenderBackend for GpuBackend {
    fn render_state(&self) -> RenderState {
        self.render_state
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.render_state = state;
    }

    fn draw(&mut self, vertex_count: u32) -> Result<(), FluidError> {
        let resolved = self.bindings.resolve(KernelStage::Render)?;
        let kernel = resolved.kernel;
        let target = self.render_target.as_ref().ok_or(FluidError::NoRenderTarget)?;
        let variant_key = (kernel, None);

        let pipeline = self.resources.render_pipeline(RenderPipelineKey {
            kernel,
            state: self.render_state,
            color_format: target.color_format,
            depth_format: target.depth.as_ref().map(|(_, format)| *format),
        })?;
        let bind_group = self.resources.bind_group(variant_key, &resolved)?;
        self.resources.record_draw(kernel, &pipeline, &bind_group, target, vertex_count)
    }
}

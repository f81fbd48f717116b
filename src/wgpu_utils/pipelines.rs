use super::shader::{ShaderDefines, ShaderDirectory, SHADER_ENTRY_POINT_NAME};
use crate::error::FluidError;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

pub type ComputePipelineHandle = Rc<usize>;
pub type RenderPipelineHandle = Rc<usize>;

fn pop_validation_scope(device: &wgpu::Device, label: &str) -> Result<(), FluidError> {
    match futures::executor::block_on(device.pop_error_scope()) {
        None => Ok(()),
        Some(err) => Err(FluidError::ResourceCreation {
            label: label.to_owned(),
            message: err.to_string(),
        }),
    }
}

pub struct ComputePipelineCreationDesc {
    pub label: String,
    pub layout: Rc<wgpu::PipelineLayout>,
    pub compute_shader_relative_path: PathBuf,
    pub defines: ShaderDefines,
}

impl ComputePipelineCreationDesc {
    pub fn new(label: &str, layout: Rc<wgpu::PipelineLayout>, compute_shader_relative_path: &Path, defines: ShaderDefines) -> Self {
        ComputePipelineCreationDesc {
            label: label.to_owned(),
            layout,
            compute_shader_relative_path: PathBuf::from(compute_shader_relative_path),
            defines,
        }
    }

    fn try_create_pipeline(&self, device: &wgpu::Device, shader_dir: &ShaderDirectory) -> Result<wgpu::ComputePipeline, FluidError> {
        let module = shader_dir.load_shader_module(device, &self.compute_shader_relative_path, &self.defines)?;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&self.label),
            layout: Some(&self.layout),
            module: &module,
            entry_point: SHADER_ENTRY_POINT_NAME,
            compilation_options: Default::default(),
            cache: None,
        });
        pop_validation_scope(device, &self.label)?;
        Ok(pipeline)
    }
}

pub struct RenderPipelineCreationDesc {
    pub label: String,

    /// The layout of bind groups for this pipeline.
    pub layout: Rc<wgpu::PipelineLayout>,

    pub vertex_shader_relative_path: PathBuf,
    pub fragment_shader_relative_path: PathBuf,
    pub defines: ShaderDefines,

    /// Topology, culling & co.
    pub primitive: wgpu::PrimitiveState,

    /// The effect of draw calls on the depth and stencil aspects of the output target, if any.
    pub depth_stencil: Option<wgpu::DepthStencilState>,

    /// The effect of draw calls on the color aspect of the output target.
    pub color_targets: Vec<Option<wgpu::ColorTargetState>>,
}

impl RenderPipelineCreationDesc {
    pub fn new(
        label: &str,
        layout: Rc<wgpu::PipelineLayout>,
        vertex_shader_relative_path: &Path,
        fragment_shader_relative_path: &Path,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        RenderPipelineCreationDesc {
            label: label.to_owned(),
            layout,
            vertex_shader_relative_path: PathBuf::from(vertex_shader_relative_path),
            fragment_shader_relative_path: PathBuf::from(fragment_shader_relative_path),
            defines: ShaderDefines::new(),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: depth_format.map(depth_state::default_read_write),
            color_targets: vec![Some(color_state::write_all(color_format))],
        }
    }

    fn try_create_pipeline(&self, device: &wgpu::Device, shader_dir: &ShaderDirectory) -> Result<wgpu::RenderPipeline, FluidError> {
        let vs_module = shader_dir.load_shader_module(device, &self.vertex_shader_relative_path, &self.defines)?;
        let fs_module = shader_dir.load_shader_module(device, &self.fragment_shader_relative_path, &self.defines)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.label),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &vs_module,
                entry_point: SHADER_ENTRY_POINT_NAME,
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fs_module,
                entry_point: SHADER_ENTRY_POINT_NAME,
                compilation_options: Default::default(),
                targets: &self.color_targets,
            }),
            primitive: self.primitive,
            depth_stencil: self.depth_stencil.clone(),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        pop_validation_scope(device, &self.label)?;
        Ok(pipeline)
    }
}

struct ReloadableComputePipeline {
    desc: ComputePipelineCreationDesc,
    pipeline: wgpu::ComputePipeline,
    handle: Weak<usize>,
}

struct ReloadableRenderPipeline {
    desc: RenderPipelineCreationDesc,
    pipeline: wgpu::RenderPipeline,
    handle: Weak<usize>,
}

pub struct PipelineManager {
    compute_pipelines: Vec<ReloadableComputePipeline>,
    render_pipelines: Vec<ReloadableRenderPipeline>,
}

impl PipelineManager {
    pub fn new() -> Self {
        PipelineManager {
            compute_pipelines: Vec::new(),
            render_pipelines: Vec::new(),
        }
    }

    fn first_free_slot(handles: impl Iterator<Item = usize>) -> usize {
        let mut first_free_slot = 0;
        for strong_count in handles {
            if strong_count == 0 {
                break;
            }
            first_free_slot += 1;
        }
        first_free_slot
    }

    pub fn create_compute_pipeline(
        &mut self,
        device: &wgpu::Device,
        shader_dir: &ShaderDirectory,
        desc: ComputePipelineCreationDesc,
    ) -> Result<ComputePipelineHandle, FluidError> {
        let pipeline = desc.try_create_pipeline(device, shader_dir)?;
        let slot = Self::first_free_slot(self.compute_pipelines.iter().map(|p| p.handle.strong_count()));

        let handle = Rc::new(slot);
        let new_reloadable_pipeline = ReloadableComputePipeline {
            desc,
            pipeline,
            handle: Rc::downgrade(&handle),
        };
        if slot == self.compute_pipelines.len() {
            self.compute_pipelines.push(new_reloadable_pipeline);
        } else {
            self.compute_pipelines[slot] = new_reloadable_pipeline;
        }
        Ok(handle)
    }

    pub fn create_render_pipeline(
        &mut self,
        device: &wgpu::Device,
        shader_dir: &ShaderDirectory,
        desc: RenderPipelineCreationDesc,
    ) -> Result<RenderPipelineHandle, FluidError> {
        let pipeline = desc.try_create_pipeline(device, shader_dir)?;
        let slot = Self::first_free_slot(self.render_pipelines.iter().map(|p| p.handle.strong_count()));

        let handle = Rc::new(slot);
        let new_reloadable_pipeline = ReloadableRenderPipeline {
            desc,
            pipeline,
            handle: Rc::downgrade(&handle),
        };
        if slot == self.render_pipelines.len() {
            self.render_pipelines.push(new_reloadable_pipeline);
        } else {
            self.render_pipelines[slot] = new_reloadable_pipeline;
        }
        Ok(handle)
    }

    /// Recreates all live pipelines. Pipelines that fail to compile keep their previous version.
    pub fn reload_all(&mut self, device: &wgpu::Device, shader_dir: &ShaderDirectory) {
        for reloadable_pipeline in self.compute_pipelines.iter_mut().filter(|p| p.handle.strong_count() > 0) {
            match reloadable_pipeline.desc.try_create_pipeline(device, shader_dir) {
                Ok(new_wgpu_pipeline) => reloadable_pipeline.pipeline = new_wgpu_pipeline,
                Err(err) => error!("failed to reload {}: {}", reloadable_pipeline.desc.label, err),
            }
        }
        for reloadable_pipeline in self.render_pipelines.iter_mut().filter(|p| p.handle.strong_count() > 0) {
            match reloadable_pipeline.desc.try_create_pipeline(device, shader_dir) {
                Ok(new_wgpu_pipeline) => reloadable_pipeline.pipeline = new_wgpu_pipeline,
                Err(err) => error!("failed to reload {}: {}", reloadable_pipeline.desc.label, err),
            }
        }
    }

    pub fn get_compute(&self, handle: &ComputePipelineHandle) -> &wgpu::ComputePipeline {
        let i: usize = **handle;
        assert!(self.compute_pipelines[i].handle.ptr_eq(&Rc::downgrade(handle)));
        &self.compute_pipelines[i].pipeline
    }

    pub fn get_render(&self, handle: &RenderPipelineHandle) -> &wgpu::RenderPipeline {
        let i: usize = **handle;
        assert!(self.render_pipelines[i].handle.ptr_eq(&Rc::downgrade(handle)));
        &self.render_pipelines[i].pipeline
    }
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

pub mod color_state {
    pub fn write_all(format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        }
    }

    pub fn premultiplied_alpha(format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

pub mod depth_state {
    pub fn default_read_write(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        }
    }

    pub fn read_only(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            depth_write_enabled: false,
            ..default_read_write(format)
        }
    }

    pub fn disabled(format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            ..default_read_write(format)
        }
    }
}

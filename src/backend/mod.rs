//! Device abstraction the simulation and renderer are written against.
//!
//! Kernels are opaque programs invoked through a fixed contract:
//! set kernel, set parameters, upload parameter block, bind resources, dispatch/draw, unbind.

mod bindings;
pub mod cpu;
pub mod gpu;

pub use bindings::*;

use crate::error::FluidError;
use crate::grid::{GridResolution, WorkgroupCount};
use crate::kernel::{Kernel, ParameterValue};
use crate::volume::VolumeResource;
use std::ops::{Deref, DerefMut};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Trilinear filtering, clamp to edge.
    LinearClamp,
    /// Nearest texel, clamp to edge.
    PointClamp,
}

pub struct VolumeDescriptor<'a> {
    pub label: &'a str,
    pub resolution: GridResolution,
    pub format: wgpu::TextureFormat,
}

/// Tightly packed initial texel data with its row and slice pitch.
pub struct TexelUpload<'a> {
    pub data: &'a [u8],
    pub bytes_per_row: u32,
    pub bytes_per_image: u32,
}

pub trait ComputeBackend {
    type View: Clone;

    /// Creates a 3D volume with a read and a write view.
    /// Without initial data the content is undefined.
    fn create_volume(
        &mut self,
        desc: &VolumeDescriptor<'_>,
        initial_data: Option<TexelUpload<'_>>,
    ) -> Result<VolumeResource<Self::View>, FluidError>;

    fn bindings(&mut self) -> &mut BindingState<Self::View>;

    fn set_kernel(&mut self, kernel: Kernel) {
        self.bindings().set_kernel(kernel);
    }

    fn set_parameter(&mut self, name: &'static str, value: ParameterValue) {
        self.bindings().set_parameter(name, value);
    }

    fn upload_parameters(&mut self) -> Result<(), FluidError>;

    fn bind_read(&mut self, name: &'static str, volume: &VolumeResource<Self::View>) {
        self.bindings().bind_volume(name, Access::Read, volume);
    }

    fn bind_write(&mut self, name: &'static str, volume: &VolumeResource<Self::View>) {
        self.bindings().bind_volume(name, Access::Write, volume);
    }

    fn bind_sampler(&mut self, name: &'static str, sampler: SamplerKind) {
        self.bindings().bind_sampler(name, sampler);
    }

    fn dispatch(&mut self, workgroups: WorkgroupCount) -> Result<(), FluidError>;

    fn unbind_all(&mut self) {
        self.bindings().unbind_all();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    PremultipliedAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub cull: CullMode,
}

impl RenderState {
    pub const OPAQUE: RenderState = RenderState {
        depth_test: true,
        depth_write: true,
        blend: BlendMode::Opaque,
        cull: CullMode::Back,
    };

    /// Depth tested but not written, blended, back faces only so the volume stays visible from inside.
    pub const TRANSLUCENT_VOLUME: RenderState = RenderState {
        depth_test: true,
        depth_write: false,
        blend: BlendMode::PremultipliedAlpha,
        cull: CullMode::Front,
    };
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState::OPAQUE
    }
}

pub trait RenderBackend: ComputeBackend {
    fn render_state(&self) -> RenderState;
    fn set_render_state(&mut self, state: RenderState);
    /// Draws `vertex_count` vertices without vertex buffers using the current render kernel.
    fn draw(&mut self, vertex_count: u32) -> Result<(), FluidError>;
}

/// Scoped kernel invocation. All resource bindings are released when the pass goes out of scope,
/// whether the dispatch succeeded or not.
pub struct KernelPass<'a, B: ComputeBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: ComputeBackend + ?Sized> KernelPass<'a, B> {
    pub fn new(backend: &'a mut B, kernel: Kernel) -> Self {
        backend.set_kernel(kernel);
        KernelPass { backend }
    }

    pub fn parameter(&mut self, name: &'static str, value: impl Into<ParameterValue>) -> &mut Self {
        self.backend.set_parameter(name, value.into());
        self
    }

    pub fn upload_parameters(&mut self) -> Result<&mut Self, FluidError> {
        self.backend.upload_parameters()?;
        Ok(self)
    }

    pub fn read(&mut self, name: &'static str, volume: &VolumeResource<B::View>) -> &mut Self {
        self.backend.bind_read(name, volume);
        self
    }

    pub fn write(&mut self, name: &'static str, volume: &VolumeResource<B::View>) -> &mut Self {
        self.backend.bind_write(name, volume);
        self
    }

    pub fn sampler(&mut self, name: &'static str, sampler: SamplerKind) -> &mut Self {
        self.backend.bind_sampler(name, sampler);
        self
    }

    pub fn dispatch(&mut self, workgroups: WorkgroupCount) -> Result<(), FluidError> {
        self.backend.dispatch(workgroups)
    }
}

impl<B: RenderBackend + ?Sized> KernelPass<'_, B> {
    pub fn draw(&mut self, vertex_count: u32) -> Result<(), FluidError> {
        self.backend.draw(vertex_count)
    }
}

impl<B: ComputeBackend + ?Sized> Drop for KernelPass<'_, B> {
    fn drop(&mut self) {
        self.backend.unbind_all();
    }
}

/// Sets a render state and restores the previous one when dropped.
pub struct RenderStateGuard<'a, B: RenderBackend + ?Sized> {
    backend: &'a mut B,
    previous: RenderState,
}

impl<'a, B: RenderBackend + ?Sized> RenderStateGuard<'a, B> {
    pub fn new(backend: &'a mut B, state: RenderState) -> Self {
        let previous = backend.render_state();
        backend.set_render_state(state);
        RenderStateGuard { backend, previous }
    }
}

impl<B: RenderBackend + ?Sized> Deref for RenderStateGuard<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> DerefMut for RenderStateGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> Drop for RenderStateGuard<'_, B> {
    fn drop(&mut self) {
        self.backend.set_render_state(self.previous);
    }
}

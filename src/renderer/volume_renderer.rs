use crate::backend::{KernelPass, RenderBackend, RenderState, RenderStateGuard, SamplerKind};
use crate::camera::Camera;
use crate::config::RenderConfig;
use crate::error::FluidError;
use crate::kernel::{names, Kernel};
use crate::simulation::FluidField;
use cgmath::{Matrix4, Point3, SquareMatrix, Vector3};

/// Raymarches the density of a fluid field inside a cube that bounds the simulation grid.
pub struct VolumeRenderer {
    pub tint: [f32; 4],
    pub sample_count: u32,
    world: Matrix4<f32>,
    inverse_world: Matrix4<f32>,
}

impl VolumeRenderer {
    /// The bounding cube is drawn as a triangle list generated in the vertex program.
    pub const CUBE_VERTEX_COUNT: u32 = 36;

    pub fn new(config: &RenderConfig) -> Result<Self, FluidError> {
        config.validate()?;
        let mut renderer = VolumeRenderer {
            tint: config.tint,
            sample_count: config.sample_count,
            world: Matrix4::identity(),
            inverse_world: Matrix4::identity(),
        };
        renderer.set_bounds(config.position, config.scale)?;
        Ok(renderer)
    }

    /// Places the unit cube [-0.5, 0.5]^3 at `position`, with edge length `scale`.
    pub fn set_bounds(&mut self, position: Point3<f32>, scale: f32) -> Result<(), FluidError> {
        let world = Matrix4::from_translation(Vector3::new(position.x, position.y, position.z)) * Matrix4::from_scale(scale);
        self.inverse_world = world
            .invert()
            .ok_or_else(|| FluidError::InvalidConfig(format!("volume scale {} is not invertible", scale)))?;
        self.world = world;
        Ok(())
    }

    pub fn world(&self) -> Matrix4<f32> {
        self.world
    }

    /// Draws the latest density with depth test, no depth write, premultiplied alpha and front face culling.
    /// The previous render state is restored afterwards, also on failure.
    pub fn render_fluid<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        fluid: &FluidField<B::View>,
        camera: &dyn Camera,
    ) -> Result<(), FluidError> {
        let mut backend = RenderStateGuard::new(backend, RenderState::TRANSLUCENT_VOLUME);
        KernelPass::new(&mut *backend, Kernel::Raymarch)
            .parameter(names::WORLD, self.world)
            .parameter(names::INVERSE_WORLD, self.inverse_world)
            .parameter(names::VIEW, camera.view())
            .parameter(names::PROJECTION, camera.projection())
            .parameter(names::CAMERA_POSITION, camera.position())
            .parameter(names::SAMPLE_COUNT, self.sample_count)
            .parameter(names::TINT, self.tint)
            .upload_parameters()?
            .read(names::DENSITY_FIELD, fluid.density().current())
            .sampler(names::FIELD_SAMPLER, SamplerKind::LinearClamp)
            .draw(Self::CUBE_VERTEX_COUNT)?;
        Ok(())
    }
}

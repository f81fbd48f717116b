use super::grid_allocator::GridAllocator;
use crate::backend::{ComputeBackend, KernelPass, SamplerKind};
use crate::config::{validate_time_step, FluidConfig, SimulationParameters, SmokeSource};
use crate::error::FluidError;
use crate::grid::GridResolution;
use crate::kernel::{names, Kernel};
use crate::ping_pong::PingPong;
use crate::simulation::FieldInit;
use crate::volume::VolumeResource;

/// Binds the kernel and sets the parameters every simulation kernel shares.
fn simulation_pass<B: ComputeBackend + ?Sized>(
    backend: &mut B,
    kernel: Kernel,
    resolution: GridResolution,
    delta_time: f32,
) -> KernelPass<'_, B> {
    let mut pass = KernelPass::new(backend, kernel);
    pass.parameter(names::DELTA_TIME, delta_time)
        .parameter(names::INV_GRID_RESOLUTION, resolution.inverse())
        .parameter(names::GRID_RESOLUTION, resolution.get());
    pass
}

/// Eulerian smoke simulation on a fixed cubic grid.
///
/// Velocity, density and pressure are double buffered, divergence is recomputed from scratch every tick.
/// After every tick the `current` volume of each pair holds the latest values.
pub struct FluidField<V> {
    resolution: GridResolution,
    parameters: SimulationParameters,
    sources: Vec<SmokeSource>,

    velocity: PingPong<VolumeResource<V>>,
    density: PingPong<VolumeResource<V>>,
    pressure: PingPong<VolumeResource<V>>,
    divergence: VolumeResource<V>,

    tick_count: u64,
    simulated_time: f64,
}

impl<V: Clone> FluidField<V> {
    /// Allocates all volumes. The resolution is fixed from here on, a different one needs a new field.
    pub fn new<B: ComputeBackend<View = V> + ?Sized>(backend: &mut B, config: &FluidConfig) -> Result<Self, FluidError> {
        let resolution = config.validate()?;
        let allocator = GridAllocator::new(resolution);

        let velocity_format = config.velocity_format.into();
        let density_format = config.density_format.into();
        let pressure_format = config.pressure_format.into();

        let velocity_data = config.initial_velocity.texel_data("Velocity", resolution, velocity_format)?;
        let velocity = allocator.allocate_pair(backend, "Velocity", velocity_format, velocity_data.as_deref())?;
        let density_data = config.initial_density.texel_data("Density", resolution, density_format)?;
        let density = allocator.allocate_pair(backend, "Density", density_format, density_data.as_deref())?;
        // Pressure is warm started from the previous tick, the very first solve starts at zero.
        let pressure_data = FieldInit::Zero.texel_data("Pressure", resolution, pressure_format)?;
        let pressure = allocator.allocate_pair(backend, "Pressure", pressure_format, pressure_data.as_deref())?;
        let divergence = allocator.allocate(backend, "Divergence", pressure_format, None)?;

        info!(
            "created fluid field with {0}x{0}x{0} cells, {1} pressure iterations, {2} sources",
            resolution.get(),
            config.simulation.pressure_iterations,
            config.sources.len()
        );

        Ok(FluidField {
            resolution,
            parameters: config.simulation,
            sources: config.sources.clone(),
            velocity,
            density,
            pressure,
            divergence,
            tick_count: 0,
            simulated_time: 0.0,
        })
    }

    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut SimulationParameters {
        &mut self.parameters
    }

    pub fn sources(&self) -> &[SmokeSource] {
        &self.sources
    }

    pub fn velocity(&self) -> &PingPong<VolumeResource<V>> {
        &self.velocity
    }

    pub fn density(&self) -> &PingPong<VolumeResource<V>> {
        &self.density
    }

    pub fn pressure(&self) -> &PingPong<VolumeResource<V>> {
        &self.pressure
    }

    pub fn divergence(&self) -> &VolumeResource<V> {
        &self.divergence
    }

    /// Read view of the latest density, for whoever wants to composite the smoke.
    pub fn density_view(&self) -> &V {
        self.density.current().read_view()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Sum of all time steps since creation or the last clear, in seconds.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Advances the simulation by `delta_time` seconds.
    ///
    /// A failing pass leaves the field partially advanced, there is no rollback.
    pub fn tick<B: ComputeBackend<View = V> + ?Sized>(&mut self, backend: &mut B, delta_time: f32) -> Result<(), FluidError> {
        self.parameters.validate()?;
        validate_time_step(delta_time)?;
        let resolution = self.resolution;
        let workgroups = resolution.workgroups();
        trace!("fluid tick {} with dt {}", self.tick_count, delta_time);

        for source in self.sources.iter() {
            if source.density != [0.0; 4] {
                Self::inject(backend, &mut self.density, resolution, delta_time, source, source.density)?;
            }
            if source.velocity != cgmath::Vector3::new(0.0, 0.0, 0.0) {
                let impulse = source.velocity.extend(0.0).into();
                Self::inject(backend, &mut self.velocity, resolution, delta_time, source, impulse)?;
            }
        }

        // Velocity advects itself. It is not swapped yet, projection writes the final result back into the current slot.
        simulation_pass(backend, Kernel::Advect, resolution, delta_time)
            .upload_parameters()?
            .read(names::INPUT_FIELD, self.velocity.current())
            .read(names::VELOCITY_FIELD, self.velocity.current())
            .sampler(names::FIELD_SAMPLER, SamplerKind::LinearClamp)
            .write(names::OUTPUT_FIELD, self.velocity.next())
            .dispatch(workgroups)?;

        simulation_pass(backend, Kernel::Advect, resolution, delta_time)
            .upload_parameters()?
            .read(names::INPUT_FIELD, self.density.current())
            .read(names::VELOCITY_FIELD, self.velocity.current())
            .sampler(names::FIELD_SAMPLER, SamplerKind::LinearClamp)
            .write(names::OUTPUT_FIELD, self.density.next())
            .dispatch(workgroups)?;

        simulation_pass(backend, Kernel::Divergence, resolution, delta_time)
            .upload_parameters()?
            .read(names::VELOCITY_FIELD, self.velocity.next())
            .sampler(names::FIELD_SAMPLER, SamplerKind::PointClamp)
            .write(names::OUTPUT_FIELD, &self.divergence)
            .dispatch(workgroups)?;

        for _ in 0..self.parameters.pressure_iterations {
            simulation_pass(backend, Kernel::PressureSolve, resolution, delta_time)
                .upload_parameters()?
                .read(names::DIVERGENCE_FIELD, &self.divergence)
                .read(names::PRESSURE_FIELD, self.pressure.current())
                .sampler(names::FIELD_SAMPLER, SamplerKind::PointClamp)
                .write(names::OUTPUT_FIELD, self.pressure.next())
                .dispatch(workgroups)?;
            self.pressure.swap();
        }

        simulation_pass(backend, Kernel::PressureProject, resolution, delta_time)
            .upload_parameters()?
            .read(names::VELOCITY_FIELD, self.velocity.next())
            .read(names::PRESSURE_FIELD, self.pressure.current())
            .sampler(names::FIELD_SAMPLER, SamplerKind::PointClamp)
            .write(names::OUTPUT_FIELD, self.velocity.current())
            .dispatch(workgroups)?;

        self.density.swap();

        self.tick_count += 1;
        self.simulated_time += delta_time as f64;
        Ok(())
    }

    // Reads current, writes next, swaps.
    fn inject<B: ComputeBackend<View = V> + ?Sized>(
        backend: &mut B,
        quantity: &mut PingPong<VolumeResource<V>>,
        resolution: GridResolution,
        delta_time: f32,
        source: &SmokeSource,
        value: [f32; 4],
    ) -> Result<(), FluidError> {
        simulation_pass(backend, Kernel::InjectSource, resolution, delta_time)
            .parameter(names::SOURCE_POSITION, source.position)
            .parameter(names::SOURCE_RADIUS, source.radius)
            .parameter(names::SOURCE_VALUE, value)
            .upload_parameters()?
            .read(names::INPUT_FIELD, quantity.current())
            .sampler(names::FIELD_SAMPLER, SamplerKind::PointClamp)
            .write(names::OUTPUT_FIELD, quantity.next())
            .dispatch(resolution.workgroups())?;
        quantity.swap();
        Ok(())
    }

    /// Resets every volume to zero and restarts the tick count. The resolution stays the same.
    pub fn clear<B: ComputeBackend<View = V> + ?Sized>(&mut self, backend: &mut B) -> Result<(), FluidError> {
        let volumes = self
            .velocity
            .iter()
            .chain(self.density.iter())
            .chain(self.pressure.iter())
            .chain(std::iter::once(&self.divergence));
        for volume in volumes {
            KernelPass::new(backend, Kernel::Clear)
                .parameter(names::CLEAR_VALUE, [0.0f32; 4])
                .parameter(names::GRID_RESOLUTION, self.resolution.get())
                .upload_parameters()?
                .write(names::OUTPUT_FIELD, volume)
                .dispatch(self.resolution.workgroups())?;
        }

        info!("cleared fluid field after {} ticks", self.tick_count);
        self.tick_count = 0;
        self.simulated_time = 0.0;
        Ok(())
    }
}

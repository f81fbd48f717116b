#[macro_use]
extern crate more_asserts;

use plume::backend::cpu::{BackendEvent, CpuBackend, CpuView};
use plume::backend::ComputeBackend;
use plume::config::{FluidConfig, SimulationParameters, SmokeSource};
use plume::kernel::{names, Kernel};
use plume::simulation::{FieldInit, FluidField};
use plume::volume::VolumeId;
use plume::FluidError;
use std::rc::Rc;

fn config(grid_resolution: u32) -> FluidConfig {
    FluidConfig {
        grid_resolution,
        ..Default::default()
    }
}

struct Dispatch<'a> {
    kernel: Kernel,
    reads: &'a [(&'static str, VolumeId)],
    write: VolumeId,
    threads: [u32; 3],
    texels_written: usize,
}

fn dispatches(events: &[BackendEvent]) -> Vec<Dispatch<'_>> {
    events
        .iter()
        .filter_map(|event| match event {
            BackendEvent::Dispatch {
                kernel,
                workgroups,
                reads,
                write,
                texels_written,
            } => Some(Dispatch {
                kernel: *kernel,
                reads,
                write: write.1,
                threads: workgroups.threads(),
                texels_written: *texels_written,
            }),
            _ => None,
        })
        .collect()
}

fn ids(fluid: &FluidField<CpuView>) -> [VolumeId; 7] {
    [
        fluid.velocity().current().id(),
        fluid.velocity().next().id(),
        fluid.density().current().id(),
        fluid.density().next().id(),
        fluid.pressure().current().id(),
        fluid.pressure().next().id(),
        fluid.divergence().id(),
    ]
}

#[test]
fn tick_runs_passes_in_order() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    let [v0, v1, d0, d1, p0, p1, div] = ids(&fluid);
    backend.take_events();

    fluid.tick(&mut backend, 0.016).unwrap();
    let events = backend.take_events();
    let dispatches = dispatches(&events);
    assert_eq!(dispatches.len(), 2 + 1 + 20 + 1);

    let velocity_advection = &dispatches[0];
    assert_eq!(velocity_advection.kernel, Kernel::Advect);
    assert_eq!(velocity_advection.reads, &[(names::INPUT_FIELD, v0), (names::VELOCITY_FIELD, v0)]);
    assert_eq!(velocity_advection.write, v1);

    let density_advection = &dispatches[1];
    assert_eq!(density_advection.kernel, Kernel::Advect);
    assert_eq!(density_advection.reads, &[(names::INPUT_FIELD, d0), (names::VELOCITY_FIELD, v0)]);
    assert_eq!(density_advection.write, d1);

    let divergence = &dispatches[2];
    assert_eq!(divergence.kernel, Kernel::Divergence);
    assert_eq!(divergence.reads, &[(names::VELOCITY_FIELD, v1)]);
    assert_eq!(divergence.write, div);

    for (i, solve) in dispatches[3..23].iter().enumerate() {
        let (read, write) = if i % 2 == 0 { (p0, p1) } else { (p1, p0) };
        assert_eq!(solve.kernel, Kernel::PressureSolve);
        assert_eq!(solve.reads, &[(names::DIVERGENCE_FIELD, div), (names::PRESSURE_FIELD, read)]);
        assert_eq!(solve.write, write);
    }

    let projection = &dispatches[23];
    assert_eq!(projection.kernel, Kernel::PressureProject);
    assert_eq!(projection.reads, &[(names::VELOCITY_FIELD, v1), (names::PRESSURE_FIELD, p0)]);
    assert_eq!(projection.write, v0);
}

#[test]
fn current_volumes_hold_latest_writes() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();

    for _ in 0..3 {
        backend.take_events();
        fluid.tick(&mut backend, 0.016).unwrap();
        let events = backend.take_events();
        let dispatches = dispatches(&events);

        let last_write_to = |pair: [VolumeId; 2]| dispatches.iter().rev().find(|d| pair.contains(&d.write)).map(|d| d.write);
        let velocity = [fluid.velocity().current().id(), fluid.velocity().next().id()];
        let density = [fluid.density().current().id(), fluid.density().next().id()];
        let pressure = [fluid.pressure().current().id(), fluid.pressure().next().id()];
        assert_eq!(last_write_to(velocity), Some(velocity[0]));
        assert_eq!(last_write_to(density), Some(density[0]));
        assert_eq!(last_write_to(pressure), Some(pressure[0]));
    }
    assert_eq!(fluid.tick_count(), 3);
}

#[test]
fn every_pressure_iteration_uploads_and_swaps() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();

    for iterations in [20, 5] {
        fluid.parameters_mut().pressure_iterations = iterations;
        let pressure_before = fluid.pressure().current().id();
        backend.take_events();
        fluid.tick(&mut backend, 0.016).unwrap();
        let events = backend.take_events();

        let mut solves = 0;
        let mut uploaded_since_dispatch = false;
        for event in events.iter() {
            match event {
                BackendEvent::UploadParameters { .. } => uploaded_since_dispatch = true,
                BackendEvent::Dispatch { kernel, .. } => {
                    assert!(uploaded_since_dispatch, "{} dispatched without a fresh upload", kernel);
                    uploaded_since_dispatch = false;
                    if *kernel == Kernel::PressureSolve {
                        solves += 1;
                    }
                }
                _ => {}
            }
        }
        assert_eq!(solves, iterations);

        // one swap per iteration
        let swapped = fluid.pressure().current().id() != pressure_before;
        assert_eq!(swapped, iterations % 2 == 1);
    }
}

#[test]
fn zero_iterations_are_rejected() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    *fluid.parameters_mut() = SimulationParameters {
        pressure_iterations: 0,
        ..Default::default()
    };
    assert!(matches!(fluid.tick(&mut backend, 0.016), Err(FluidError::InvalidConfig(_))));
    assert_eq!(fluid.tick_count(), 0);
}

#[test]
fn dispatches_cover_the_grid() {
    for n in [8, 12, 16] {
        let mut backend = CpuBackend::new();
        let mut fluid = FluidField::new(&mut backend, &config(n)).unwrap();
        fluid.tick(&mut backend, 0.016).unwrap();

        let events = backend.take_events();
        for dispatch in dispatches(&events) {
            for threads in dispatch.threads {
                assert_ge!(threads, n);
                if n % 8 == 0 {
                    assert_eq!(threads, n);
                } else {
                    assert_lt!(threads, n + 8);
                }
            }
            assert_eq!(dispatch.texels_written, (n * n * n) as usize);
        }
    }
}

#[test]
fn bindings_are_released_after_every_pass() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    backend.take_events();
    fluid.tick(&mut backend, 0.016).unwrap();
    let events = backend.take_events();

    for (i, event) in events.iter().enumerate() {
        match event {
            BackendEvent::Dispatch { reads, .. } => {
                // reads, the write target and the sampler
                assert_eq!(events[i + 1], BackendEvent::UnbindAll { released: reads.len() + 2 });
            }
            BackendEvent::SetKernel(_) if i > 0 => {
                assert!(matches!(events[i - 1], BackendEvent::UnbindAll { .. }));
            }
            _ => {}
        }
    }
    assert_eq!(backend.bindings().bound_count(), 0);
}

#[test]
fn quantities_use_separate_storage() {
    let mut backend = CpuBackend::new();
    let fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    let mut all = ids(&fluid).to_vec();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 7);
}

#[test]
fn zero_velocity_keeps_density() {
    let mut backend = CpuBackend::new();
    let fluid_config = FluidConfig {
        initial_density: FieldInit::Constant { value: [0.7, 0.0, 0.0, 0.0] },
        ..config(8)
    };
    let mut fluid = FluidField::new(&mut backend, &fluid_config).unwrap();
    fluid.tick(&mut backend, 0.016).unwrap();

    assert!(CpuBackend::read_texels(fluid.density().current())
        .iter()
        .all(|texel| *texel == [0.7, 0.0, 0.0, 0.0]));
    assert!(CpuBackend::read_texels(fluid.velocity().current())
        .iter()
        .all(|texel| *texel == [0.0; 4]));
    let pressure = CpuBackend::read_texels(fluid.pressure().current());
    assert!(pressure.iter().all(|texel| texel[0] == pressure[0][0]));
}

#[test]
fn constant_velocity_moves_density() {
    let mut backend = CpuBackend::new();
    let resolution = plume::grid::GridResolution::new(8).unwrap();
    let mut texels = vec![[0.0; 4]; resolution.num_cells().unwrap()];
    texels[resolution.index(3, 4, 4)] = [1.0, 0.0, 0.0, 0.0];
    let fluid_config = FluidConfig {
        initial_velocity: FieldInit::Constant { value: [1.0, 0.0, 0.0, 0.0] },
        initial_density: FieldInit::Texels { texels },
        ..config(8)
    };
    let mut fluid = FluidField::new(&mut backend, &fluid_config).unwrap();

    // one cell per second
    fluid.tick(&mut backend, 1.0).unwrap();

    let density = CpuBackend::read_texels(fluid.density().current());
    assert_eq!(density[resolution.index(4, 4, 4)][0], 1.0);
    assert_eq!(density[resolution.index(3, 4, 4)][0], 0.0);
    assert_eq!(density.iter().map(|texel| texel[0]).sum::<f32>(), 1.0);
    assert!(CpuBackend::read_texels(fluid.velocity().current())
        .iter()
        .all(|texel| *texel == [1.0, 0.0, 0.0, 0.0]));
}

#[test]
fn resolution_is_fixed_per_field() {
    let mut backend = CpuBackend::new();
    let mut small = FluidField::new(&mut backend, &config(8)).unwrap();
    let large = FluidField::new(&mut backend, &config(16)).unwrap();

    assert_eq!(small.resolution().get(), 8);
    assert_eq!(large.resolution().get(), 16);
    assert_eq!(large.density().current().resolution().get(), 16);

    small.tick(&mut backend, 0.016).unwrap();
    assert_eq!(small.resolution().get(), 8);
    assert_eq!(small.density().current().resolution().get(), 8);

    assert!(matches!(
        FluidField::new(&mut backend, &config(0)),
        Err(FluidError::InvalidGridResolution(0))
    ));
}

#[test]
fn device_rejection_fails_construction() {
    let mut backend = CpuBackend::new().with_max_resolution(8);
    assert!(matches!(
        FluidField::new(&mut backend, &config(16)),
        Err(FluidError::ResourceCreation { .. })
    ));
}

#[test]
fn sources_inject_before_advection() {
    let mut backend = CpuBackend::new();
    let fluid_config = FluidConfig {
        sources: vec![SmokeSource {
            position: cgmath::Point3::new(0.5, 0.5, 0.5),
            radius: 0.25,
            density: [2.0, 0.0, 0.0, 0.0],
            velocity: cgmath::Vector3::new(0.0, 3.0, 0.0),
        }],
        ..config(8)
    };
    let mut fluid = FluidField::new(&mut backend, &fluid_config).unwrap();
    backend.take_events();
    fluid.tick(&mut backend, 0.5).unwrap();
    let events = backend.take_events();

    let kernels: Vec<Kernel> = dispatches(&events).iter().map(|d| d.kernel).collect();
    assert_eq!(&kernels[..4], &[Kernel::InjectSource, Kernel::InjectSource, Kernel::Advect, Kernel::Advect]);

    let resolution = fluid.resolution();
    let density = CpuBackend::read_texels(fluid.density().current());
    assert_gt!(density[resolution.index(4, 4, 4)][0], 0.0);
    assert_eq!(density[resolution.index(0, 0, 0)][0], 0.0);

    let last_density_write = dispatches(&events)
        .iter()
        .rev()
        .find(|d| d.write == fluid.density().current().id() || d.write == fluid.density().next().id())
        .map(|d| d.write);
    assert_eq!(last_density_write, Some(fluid.density().current().id()));
}

#[test]
fn clear_zeroes_all_quantities() {
    let mut backend = CpuBackend::new();
    let fluid_config = FluidConfig {
        initial_velocity: FieldInit::RandomUnitVectors { seed: 3 },
        initial_density: FieldInit::Constant { value: [1.0; 4] },
        ..config(8)
    };
    let mut fluid = FluidField::new(&mut backend, &fluid_config).unwrap();
    fluid.tick(&mut backend, 0.016).unwrap();
    backend.take_events();

    fluid.clear(&mut backend).unwrap();
    let events = backend.take_events();
    assert_eq!(dispatches(&events).iter().filter(|d| d.kernel == Kernel::Clear).count(), 7);
    assert_eq!(fluid.tick_count(), 0);
    assert_eq!(fluid.simulated_time(), 0.0);

    let volumes = fluid
        .velocity()
        .iter()
        .chain(fluid.density().iter())
        .chain(fluid.pressure().iter())
        .chain(std::iter::once(fluid.divergence()));
    for volume in volumes {
        assert!(CpuBackend::read_texels(volume).iter().all(|texel| *texel == [0.0; 4]), "{}", volume.label());
    }
}

#[test]
fn density_view_follows_the_current_density() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    assert!(Rc::ptr_eq(fluid.density_view(), fluid.density().current().read_view()));

    let before = fluid.density_view().clone();
    fluid.tick(&mut backend, 0.016).unwrap();
    assert!(Rc::ptr_eq(fluid.density_view(), fluid.density().current().read_view()));
    assert!(!Rc::ptr_eq(fluid.density_view(), &before));
}

#[test]
fn invalid_time_steps_are_rejected() {
    let mut backend = CpuBackend::new();
    let mut fluid = FluidField::new(&mut backend, &config(8)).unwrap();
    backend.take_events();

    for delta_time in [-0.016, f32::NAN, f32::INFINITY] {
        assert!(matches!(fluid.tick(&mut backend, delta_time), Err(FluidError::InvalidConfig(_))));
    }
    assert!(backend.events().is_empty());
    assert_eq!(fluid.tick_count(), 0);
    fluid.tick(&mut backend, 0.0).unwrap();
    assert_eq!(fluid.tick_count(), 1);
}

#[test]
fn huge_velocities_clamp_at_the_border() {
    let mut backend = CpuBackend::new();
    let fluid_config = FluidConfig {
        initial_velocity: FieldInit::Constant { value: [-1.0e30, 0.0, 0.0, 0.0] },
        initial_density: FieldInit::Constant { value: [0.5, 0.0, 0.0, 0.0] },
        ..config(8)
    };
    let mut fluid = FluidField::new(&mut backend, &fluid_config).unwrap();
    fluid.tick(&mut backend, 1.0).unwrap();

    // uniform density back-traced anywhere stays uniform
    assert!(CpuBackend::read_texels(fluid.density().current())
        .iter()
        .all(|texel| *texel == [0.5, 0.0, 0.0, 0.0]));
}

#[test]
fn oversized_grids_are_rejected() {
    let mut backend = CpuBackend::new();
    assert!(matches!(
        FluidField::new(&mut backend, &config(16384)),
        Err(FluidError::InvalidConfig(_))
    ));
    assert!(backend.events().is_empty());
}

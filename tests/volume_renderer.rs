#[macro_use]
extern crate more_asserts;

use cgmath::Point3;
use plume::backend::cpu::{BackendEvent, CpuBackend, CpuRenderTarget, CpuView};
use plume::backend::{ComputeBackend, RenderBackend, RenderState};
use plume::camera::OrbitCamera;
use plume::config::{FluidConfig, RenderConfig};
use plume::kernel::{names, Kernel};
use plume::renderer::VolumeRenderer;
use plume::simulation::FluidField;
use plume::volume::VolumeResource;
use plume::FluidError;

const SIZE: u32 = 32;
const CLEAR: [f32; 4] = [0.1, 0.2, 0.3, 1.0];

fn setup() -> (CpuBackend, FluidField<CpuView>, VolumeRenderer) {
    let mut backend = CpuBackend::new();
    let fluid_config = FluidConfig {
        grid_resolution: 8,
        ..Default::default()
    };
    let fluid = FluidField::new(&mut backend, &fluid_config).unwrap();
    let renderer = VolumeRenderer::new(&RenderConfig {
        tint: [1.0; 4],
        sample_count: 64,
        ..Default::default()
    })
    .unwrap();
    (backend, fluid, renderer)
}

fn outside_camera() -> OrbitCamera {
    OrbitCamera::new(Point3::new(0.0, 0.0, 0.0), 2.5, 1.0)
}

fn fill(volume: &VolumeResource<CpuView>, value: f32) {
    for cell in volume.resolution().cells() {
        CpuBackend::write_texel(volume, cell, [value, 0.0, 0.0, 0.0]);
    }
}

fn render(backend: &mut CpuBackend, fluid: &FluidField<CpuView>, renderer: &VolumeRenderer, camera: &OrbitCamera) -> CpuRenderTarget {
    backend.set_render_target(CpuRenderTarget::new(SIZE, SIZE, CLEAR));
    renderer.render_fluid(backend, fluid, camera).unwrap();
    backend.take_render_target().unwrap()
}

#[test]
fn draws_the_current_density() {
    let (mut backend, mut fluid, renderer) = setup();
    fluid.tick(&mut backend, 0.016).unwrap();
    fill(fluid.density().current(), 4.0);
    fill(fluid.density().next(), 0.0);
    backend.take_events();

    let image = render(&mut backend, &fluid, &renderer, &outside_camera());
    let draw_reads = backend.events().iter().find_map(|event| match event {
        BackendEvent::Draw { reads, .. } => Some(reads.clone()),
        _ => None,
    });
    assert_eq!(draw_reads, Some(vec![(names::DENSITY_FIELD, fluid.density().current().id())]));

    let center = image.pixel(SIZE / 2, SIZE / 2);
    assert_gt!(center[0], 0.9);
    assert_eq!(image.pixel(0, 0), CLEAR);
}

#[test]
fn stale_density_is_not_drawn() {
    let (mut backend, mut fluid, renderer) = setup();
    fluid.tick(&mut backend, 0.016).unwrap();
    fill(fluid.density().current(), 0.0);
    fill(fluid.density().next(), 4.0);

    let image = render(&mut backend, &fluid, &renderer, &outside_camera());
    assert!(image.pixels().iter().all(|pixel| *pixel == CLEAR));
}

#[test]
fn follows_the_density_across_ticks() {
    let (mut backend, mut fluid, renderer) = setup();
    let mut rendered_ids = Vec::new();
    for _ in 0..3 {
        fluid.tick(&mut backend, 0.016).unwrap();
        backend.take_events();
        render(&mut backend, &fluid, &renderer, &outside_camera());
        let id = backend.events().iter().find_map(|event| match event {
            BackendEvent::Draw { reads, .. } => reads.first().map(|read| read.1),
            _ => None,
        });
        assert_eq!(id, Some(fluid.density().current().id()));
        rendered_ids.push(id);
    }
    assert_ne!(rendered_ids[0], rendered_ids[1]);
    assert_eq!(rendered_ids[0], rendered_ids[2]);
}

#[test]
fn render_state_is_restored() {
    let (mut backend, fluid, renderer) = setup();
    backend.take_events();
    render(&mut backend, &fluid, &renderer, &outside_camera());

    let events = backend.take_events();
    let draw = events
        .iter()
        .position(|event| matches!(event, BackendEvent::Draw { .. }))
        .unwrap();
    assert_eq!(events[0], BackendEvent::SetRenderState(RenderState::TRANSLUCENT_VOLUME));
    assert_eq!(events[1], BackendEvent::SetKernel(Kernel::Raymarch));
    match &events[draw] {
        BackendEvent::Draw {
            kernel,
            vertex_count,
            render_state,
            ..
        } => {
            assert_eq!(*kernel, Kernel::Raymarch);
            assert_eq!(*vertex_count, VolumeRenderer::CUBE_VERTEX_COUNT);
            assert_eq!(*render_state, RenderState::TRANSLUCENT_VOLUME);
        }
        _ => unreachable!(),
    }
    assert_eq!(events[draw + 1], BackendEvent::UnbindAll { released: 2 });
    assert_eq!(events[draw + 2], BackendEvent::SetRenderState(RenderState::OPAQUE));
    assert_eq!(events.len(), draw + 3);
    assert_eq!(backend.render_state(), RenderState::OPAQUE);
}

#[test]
fn failed_draw_restores_state() {
    let (mut backend, fluid, renderer) = setup();
    let result = renderer.render_fluid(&mut backend, &fluid, &outside_camera());
    assert!(matches!(result, Err(FluidError::NoRenderTarget)));
    assert_eq!(backend.render_state(), RenderState::OPAQUE);
    assert_eq!(backend.bindings().bound_count(), 0);
}

#[test]
fn camera_inside_the_volume_sees_every_pixel() {
    let (mut backend, fluid, renderer) = setup();
    fill(fluid.density().current(), 1.0);
    backend.take_events();
    let camera = OrbitCamera::new(Point3::new(0.0, 0.0, 0.0), 0.1, 1.0);
    let image = render(&mut backend, &fluid, &renderer, &camera);

    let covered = backend.events().iter().find_map(|event| match event {
        BackendEvent::Draw { pixels_covered, .. } => Some(*pixels_covered),
        _ => None,
    });
    assert_eq!(covered, Some((SIZE * SIZE) as usize));
    assert!(image.pixels().iter().all(|pixel| *pixel != CLEAR));
}

#[test]
fn empty_volume_leaves_the_image() {
    let (mut backend, fluid, renderer) = setup();
    let image = render(&mut backend, &fluid, &renderer, &outside_camera());
    assert!(image.pixels().iter().all(|pixel| *pixel == CLEAR));
}

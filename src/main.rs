#[macro_use]
extern crate log;

use anyhow::{anyhow, Context};
use plume::backend::gpu::{GpuBackend, GpuRenderTarget, GpuView};
use plume::camera::OrbitCamera;
use plume::config::AppConfig;
use plume::renderer::VolumeRenderer;
use plume::simulation::FluidField;
use plume::simulation_controller::SimulationController;
use plume::FluidError;
use std::{path::PathBuf, rc::Rc, sync::Arc};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAction {
    Exit,
    TogglePause,
    Restart,
    ReloadShaders,
}

fn key_action(key: KeyCode) -> Option<KeyAction> {
    match key {
        KeyCode::Escape => Some(KeyAction::Exit),
        KeyCode::Space => Some(KeyAction::TogglePause),
        KeyCode::KeyR => Some(KeyAction::Restart),
        KeyCode::F5 => Some(KeyAction::ReloadShaders),
        _ => None,
    }
}

struct Application {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_view: Rc<wgpu::TextureView>,

    backend: GpuBackend,
    fluid: FluidField<GpuView>,
    renderer: VolumeRenderer,
    camera: OrbitCamera,
    controller: SimulationController,
}

impl Application {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig) -> anyhow::Result<Self> {
        let window = Arc::new(event_loop.create_window(
            Window::default_attributes()
                .with_title("plume")
                .with_inner_size(winit::dpi::PhysicalSize::new(1280, 720)),
        )?);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = futures::executor::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(FluidError::NoAdapter)?;
        info!("using adapter {:?}", adapter.get_info());

        let missing_features = GpuBackend::required_features() - adapter.features();
        if !missing_features.is_empty() {
            return Err(FluidError::MissingFeatures(missing_features).into());
        }
        let (device, queue) = futures::executor::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: GpuBackend::required_features(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(FluidError::from)?;
        let device = Rc::new(device);
        let queue = Rc::new(queue);

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface is not compatible with the adapter"))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        let depth_view = Self::create_depth_view(&device, &surface_config);

        let mut backend = GpuBackend::new(device, queue, &config.shader_directory)
            .with_context(|| format!("failed to set up shaders from {:?}", config.shader_directory))?;
        let fluid = FluidField::new(&mut backend, &config.fluid)?;
        backend.submit()?;
        let renderer = VolumeRenderer::new(&config.rendering)?;
        let camera = OrbitCamera::new(
            config.rendering.position,
            config.rendering.scale * 2.5,
            surface_config.width as f32 / surface_config.height as f32,
        );

        Ok(Application {
            window,
            surface,
            surface_config,
            depth_view,
            backend,
            fluid,
            renderer,
            camera,
            controller: SimulationController::new(config.steps_per_second),
        })
    }

    fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> Rc<wgpu::TextureView> {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Texture: Depth"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Rc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(self.backend.device(), &self.surface_config);
        self.depth_view = Self::create_depth_view(self.backend.device(), &self.surface_config);
        self.camera.set_aspect_ratio(width as f32 / height as f32);
    }

    fn handle_key(&mut self, key: KeyCode, event_loop: &ActiveEventLoop) {
        match key_action(key) {
            Some(KeyAction::Exit) => event_loop.exit(),
            Some(KeyAction::TogglePause) => self.controller.toggle_pause(),
            Some(KeyAction::Restart) => self.controller.schedule_restart(),
            Some(KeyAction::ReloadShaders) => self.backend.reload_shaders(),
            None => {}
        }
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        self.backend.reload_shaders_if_changed();
        self.controller.handle_scheduled_restart(&mut self.fluid, &mut self.backend)?;
        self.controller.frame_steps(&mut self.fluid, &mut self.backend)?;

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.backend.device(), &self.surface_config);
                self.backend.submit()?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        {
            let depth_view = self.depth_view.clone();
            self.backend.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.backend.set_render_target(Some(GpuRenderTarget {
            color: view,
            color_format: self.surface_config.format,
            depth: Some((self.depth_view.clone(), DEPTH_FORMAT)),
        }));
        let render_result = self.renderer.render_fluid(&mut self.backend, &self.fluid, &self.camera);
        self.backend.set_render_target(None);
        self.backend.submit()?;
        frame.present();
        self.controller.on_frame_submitted();
        render_result.map_err(|err| err.into())
    }
}

struct App {
    config: AppConfig,
    application: Option<Application>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.application.is_some() {
            return;
        }
        match Application::new(event_loop, &self.config) {
            Ok(application) => self.application = Some(application),
            Err(err) => {
                error!("failed to start: {:#}", err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(application) = &mut self.application else {
            return;
        };
        if window_id != application.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => application.resize(size.width, size.height),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => application.handle_key(key, event_loop),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => application.camera.set_dragging(state == ElementState::Pressed),
            WindowEvent::CursorMoved { position, .. } => application.camera.on_cursor_moved(position.x, position.y),
            WindowEvent::MouseWheel { delta, .. } => application.camera.on_scroll(match delta {
                MouseScrollDelta::LineDelta(_, y) => y,
                MouseScrollDelta::PixelDelta(position) => position.y as f32 / 50.0,
            }),
            WindowEvent::RedrawRequested => {
                // A failed frame is dropped, the next one starts from whatever state the field is in.
                if let Err(err) = application.draw() {
                    error!("frame failed: {:#}", err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(application) = &self.application {
            application.window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/default.json"));
    let config = AppConfig::load(&config_path).with_context(|| format!("failed to load configuration {:?}", config_path))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App {
        config,
        application: None,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

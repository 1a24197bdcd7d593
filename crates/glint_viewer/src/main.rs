use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use glint_math::Camera;
use glint_scene::{load_scene, LoadedScene, Scene, SceneDescription};
use glint_tracer::{ImageBuffer, ProgressiveRenderer, RenderConfig, RenderState};
use glint_viewport::{PanelAction, PanelStats, Renderer, TextureTarget};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const DEMO_SCENE: &str = include_str!("../../../scenes/cornell.json");

/// Application state
struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    progressive: Option<ProgressiveRenderer<TextureTarget>>,

    scene: Scene,
    camera: Camera,
    config: RenderConfig,

    // Input state
    left_mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    last_frame_time: Instant,
}

impl App {
    fn new(loaded: LoadedScene) -> Self {
        let config = RenderConfig {
            background: loaded.background,
            ..Default::default()
        };
        Self {
            window: None,
            renderer: None,
            progressive: None,
            scene: loaded.scene,
            camera: loaded.camera,
            config,
            left_mouse_pressed: false,
            last_mouse_pos: None,
            last_frame_time: Instant::now(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = Window::default_attributes()
            .with_title(format!("Glint - {}", self.scene.name))
            .with_inner_size(winit::dpi::PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let renderer = pollster::block_on(Renderer::new(window.clone()))?;

        let size = window.inner_size();
        let config = RenderConfig {
            width: size.width,
            height: size.height,
            ..self.config.clone()
        };
        self.camera.set_aspect(size.width.max(1) as f32 / size.height.max(1) as f32);

        let target = renderer.create_target((config.width, config.height));
        let mut progressive = ProgressiveRenderer::new(config, target);
        progressive.reset();

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.progressive = Some(progressive);
        Ok(())
    }

    /// Restart accumulation after the camera or scene changed.
    fn restart(&mut self) {
        if let Some(progressive) = &mut self.progressive {
            progressive.reset();
        }
    }

    fn toggle_pause(&mut self) {
        if let Some(progressive) = &mut self.progressive {
            let next = match progressive.state() {
                RenderState::Running => RenderState::Paused,
                _ => RenderState::Running,
            };
            progressive.set_state(next);
            log::info!("Render {:?}", next);
        }
    }

    fn save_snapshot(&self) {
        let Some(progressive) = &self.progressive else {
            return;
        };
        let snapshot = progressive.display().snapshot();
        if snapshot.width() == 0 || snapshot.height() == 0 {
            log::warn!("Nothing to save yet");
            return;
        }

        let path = PathBuf::from(format!("{}_{:05}spp.png", self.scene.name, progressive.sample_count()));
        match ImageBuffer::from_transfer(snapshot).save_png(&path) {
            Ok(()) => log::info!("Saved {:?}", path),
            Err(e) => log::error!("Failed to save {:?}: {}", path, e),
        }
    }

    fn apply(&mut self, action: PanelAction) {
        match action {
            PanelAction::Pause | PanelAction::Resume => self.toggle_pause(),
            PanelAction::Reset => self.restart(),
            PanelAction::SetBackground(color) => {
                if let Some(progressive) = &mut self.progressive {
                    progressive.set_background_color(color);
                    progressive.reset();
                }
            }
            PanelAction::SaveSnapshot => self.save_snapshot(),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let delta_time = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let (Some(renderer), Some(progressive), Some(window)) =
            (&mut self.renderer, &mut self.progressive, &self.window)
        else {
            return;
        };

        renderer.update_fps(delta_time);
        progressive.render(&self.scene, &self.camera);

        let stats = PanelStats {
            state: progressive.state(),
            sample_count: progressive.sample_count(),
            progress: progressive.progress(),
            fps: renderer.fps,
            resolution: progressive.size(),
            background: progressive.background_color(),
        };

        let actions = match renderer.render(window, progressive.output(), &stats) {
            Ok(actions) => actions,
            Err(e) => {
                // Check if it's a surface error we can handle
                if let Some(surface_err) = e.downcast_ref::<wgpu::SurfaceError>() {
                    match surface_err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            renderer.resize(renderer.size);
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            log::error!("Out of memory!");
                            event_loop.exit();
                        }
                        _ => {
                            log::error!("Surface error: {:?}", surface_err);
                        }
                    }
                } else {
                    log::error!("Render error: {:?}", e);
                }
                Vec::new()
            }
        };

        for action in actions {
            self.apply(action);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match self.init(event_loop) {
                Ok(()) => log::info!("Window and renderer initialized"),
                Err(e) => {
                    log::error!("Failed to initialize viewer: {:?}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        // Let egui handle the event first
        if let (Some(renderer), Some(window)) = (&mut self.renderer, &self.window) {
            if renderer.handle_egui_event(window, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                let (width, height) = (physical_size.width, physical_size.height);
                if width == 0 || height == 0 {
                    return;
                }
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize((width, height));
                }
                self.camera.set_aspect(width as f32 / height as f32);
                if let Some(progressive) = &mut self.progressive {
                    progressive.resize(width, height);
                }
                log::info!("Resized to {}x{}", width, height);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.left_mouse_pressed = state == ElementState::Pressed;
                if !self.left_mouse_pressed {
                    self.last_mouse_pos = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.left_mouse_pressed {
                    if let Some(last_pos) = self.last_mouse_pos {
                        let delta_x = position.x - last_pos.0;
                        let delta_y = position.y - last_pos.1;
                        let sensitivity = 0.005;
                        self.camera
                            .orbit(-delta_x as f32 * sensitivity, delta_y as f32 * sensitivity);
                        self.restart();
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_amount = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                let distance = (self.camera.position - self.camera.target).length();
                self.camera.dolly(-scroll_amount * distance * 0.1);
                self.restart();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(keycode),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match keycode {
                KeyCode::Space => self.toggle_pause(),
                KeyCode::KeyR => self.restart(),
                KeyCode::KeyP => self.save_snapshot(),
                KeyCode::Tab => {
                    if let Some(renderer) = &mut self.renderer {
                        renderer.show_ui = !renderer.show_ui;
                    }
                }
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);

                // Request next frame
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Scene from the command line, or the built-in Cornell box.
fn load(arg: Option<String>) -> Result<LoadedScene> {
    match arg {
        Some(path) => Ok(load_scene(&path)?),
        None => {
            log::info!("No scene given, using the built-in Cornell box");
            Ok(SceneDescription::from_json(DEMO_SCENE)?.instantiate(Path::new("."))?)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Glint Viewer");

    let loaded = load(std::env::args().nth(1))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(loaded);

    log::info!("Running event loop");
    event_loop.run_app(&mut app)?;

    Ok(())
}

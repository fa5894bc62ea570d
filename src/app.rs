//! Interactive loop: window events, edit panel, frame, present.

use std::path::Path;

use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::backend::wgpu_backend::WgpuBackend;
use crate::backend::GraphicsBackend;
use crate::error::{RaycastError, RaycastResult};
use crate::panel::ControlPanel;
use crate::renderer::Renderer;
use crate::scene::SceneStore;
use crate::window::Window;
use crate::{RendererConfig, WgpuEguiIntegration};

/// Open the window and render until it is closed or `max_frames` is reached
pub fn run(config: RendererConfig) -> RaycastResult<()> {
    let event_loop = EventLoop::new().map_err(|e| RaycastError::EventLoop(e.to_string()))?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;

    let backend = WgpuBackend::new(window.window_arc(), config.vsync)
        .map_err(|e| RaycastError::WindowCreation(format!("surface: {e}")))?;
    log::info!("Using {}", backend.name());

    let mut egui = WgpuEguiIntegration::new(&backend, window.window());
    let mut renderer = Renderer::new(
        backend,
        SceneStore::default(),
        &config.kernel,
        config.width,
        config.height,
    )?;
    let (surface_width, surface_height) = renderer.backend().surface_size();
    let (window_width, window_height) = window.drawable_size();
    egui.set_surface_scale(window_width, window_height, surface_width, surface_height);

    let mut panel = ControlPanel::new(config.show_panel);
    let mut frames: u64 = 0;
    let mut failure: Option<RaycastError> = None;

    event_loop
        .run(|event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    if is_panel_trigger(&event) && !egui.wants_keyboard_input() {
                        panel.reveal();
                    }
                    egui.on_window_event(window.window(), &event);
                    window.handle_event(&event);
                }
                Event::AboutToWait => {
                    if !window.is_live() {
                        elwt.exit();
                        return;
                    }

                    if window.was_resized() {
                        let (width, height) = window.drawable_size();
                        renderer.resize(width, height);
                        let (surface_width, surface_height) = renderer.backend().surface_size();
                        egui.set_surface_scale(width, height, surface_width, surface_height);
                        window.clear_resize_flag();
                    }

                    match frame(&mut renderer, &mut egui, &mut panel, &window) {
                        Ok(true) => frames += 1,
                        Ok(false) => {}
                        Err(err) => {
                            failure = Some(err);
                            elwt.exit();
                            return;
                        }
                    }

                    if config.max_frames.is_some_and(|max| frames >= max) {
                        log::info!("Rendered {frames} frames, stopping");
                        elwt.exit();
                    }
                }
                _ => {}
            }
        })
        .map_err(|e| RaycastError::EventLoop(e.to_string()))?;

    if let Some(err) = failure {
        return Err(err);
    }

    if let Some(path) = &config.screenshot {
        let (width, height) = renderer.image_size();
        let pixels = renderer.read_output()?;
        save_png(path, width, height, &pixels)?;
        log::info!("Saved {}", path.display());
    }

    drop(egui);
    renderer.shutdown();
    Ok(())
}

/// One loop iteration. Returns false when the surface had to be skipped.
fn frame(
    renderer: &mut Renderer<WgpuBackend>,
    egui: &mut WgpuEguiIntegration,
    panel: &mut ControlPanel,
    window: &Window,
) -> RaycastResult<bool> {
    let edits = egui.run(window.window(), |ctx| panel.show(ctx, renderer.scene()));
    if let Err(err) = renderer.apply_edits(&edits) {
        log::warn!("Some edits were not applied: {err}");
    }

    let Some(frame) = renderer.try_render()? else {
        return Ok(false);
    };

    egui.render(renderer.backend_mut(), frame.width, frame.height);
    renderer.present()?;
    Ok(true)
}

/// Tab reveals the edit panel
fn is_panel_trigger(event: &WindowEvent) -> bool {
    matches!(
        event,
        WindowEvent::KeyboardInput {
            event: KeyEvent {
                physical_key: PhysicalKey::Code(KeyCode::Tab),
                state: ElementState::Pressed,
                repeat: false,
                ..
            },
            ..
        }
    )
}

/// Write tightly packed RGBA8 rows as a PNG
pub fn save_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> RaycastResult<()> {
    image::save_buffer(path, rgba, width, height, image::ColorType::Rgba8)?;
    Ok(())
}

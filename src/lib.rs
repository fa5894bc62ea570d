//! Sphere ray caster - a compute kernel renders a small sphere scene while the
//! camera, lights and materials are edited live
//!
//! The renderer drives any [`GraphicsBackend`]:
//! - **wgpu**: the interactive window path
//! - **dummy**: a CPU emulation of the same interface for tests and headless runs
//!
//! # Features
//! - Whole-collection upload of edited scene data, tracked by dirty flags
//! - One kernel invocation per output pixel, barriered before presentation
//! - egui edit panel producing explicit change-sets

pub mod app;
pub mod backend;
pub mod egui_integration;
pub mod error;
pub mod math;
pub mod panel;
pub mod pipeline;
pub mod renderer;
pub mod scene;
pub mod shader;
pub mod window;

pub use backend::dummy::DummyBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use backend::GraphicsBackend;
pub use egui_integration::WgpuEguiIntegration;
pub use error::{RaycastError, RaycastResult};
pub use panel::ControlPanel;
pub use renderer::Renderer;
pub use scene::{EditSet, SceneStore};
pub use shader::KernelSourceId;
pub use window::Window;

use std::path::PathBuf;

/// Configuration for the interactive renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Output image width, also the initial window width
    pub width: u32,
    /// Output image height, also the initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Kernel source
    pub kernel: KernelSourceId,
    /// Show the edit panel from the first frame instead of waiting for Tab
    pub show_panel: bool,
    /// Stop after this many presented frames
    pub max_frames: Option<u64>,
    /// Write the last image here as PNG on exit
    pub screenshot: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "uboSample".to_string(),
            width: 960,
            height: 540,
            vsync: true,
            kernel: KernelSourceId::Embedded,
            show_panel: false,
            max_frames: None,
            screenshot: None,
        }
    }
}

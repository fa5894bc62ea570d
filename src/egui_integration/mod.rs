//! egui overlay for the wgpu backend
//!
//! Draws the edit panel on top of the blitted image, inside the same frame.

mod wgpu;

pub use self::wgpu::WgpuEguiIntegration;

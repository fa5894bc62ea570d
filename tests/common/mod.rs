//! Shared helpers for the frame protocol tests.

use sphere_raycast::backend::dummy::{Command, CpuKernel, DummyBackend};
use sphere_raycast::{KernelSourceId, Renderer, SceneStore};

/// Image size of the sample scene
pub const WIDTH: u32 = 960;
pub const HEIGHT: u32 = 540;

/// Background colour as the kernel writes it
pub const BACKGROUND_RGBA8: [u8; 4] = [26, 26, 31, 255];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renderer over a dummy backend whose surface matches the image
pub fn renderer_with(kernel: CpuKernel, width: u32, height: u32) -> Renderer<DummyBackend> {
    init_logging();
    Renderer::new(
        DummyBackend::with_kernel(width, height, kernel),
        SceneStore::default(),
        &KernelSourceId::Embedded,
        width,
        height,
    )
    .expect("renderer should build on the dummy backend")
}

/// RGBA8 pixel at (x, y) of tightly packed rows
pub fn pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let at = ((y * width + x) * 4) as usize;
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

/// Invocation id written by `CpuKernel::stamp_coordinates`
pub fn stamped(rgba: [u8; 4]) -> (u32, u32) {
    let x = u32::from(rgba[0]) | (u32::from(rgba[1]) << 8);
    let y = u32::from(rgba[2]) | (u32::from(rgba[3]) << 8);
    (x, y)
}

/// Recorded uploads, as (buffer id, offset, len)
pub fn writes(commands: &[Command]) -> Vec<(u64, u64, usize)> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::WriteBuffer {
                buffer,
                offset,
                len,
            } => Some((buffer.id(), *offset, *len)),
            _ => None,
        })
        .collect()
}

//! Per-frame GPU stages
//!
//! 1. [`SceneBuffers`] - re-sends dirty scene collections
//! 2. [`ComputeDispatcher`] - runs the ray-cast kernel once per pixel
//! 3. [`PresentationBlit`] - copies the image into the surface

pub mod bindings;
pub mod buffer_sync;
pub mod compute_dispatch;
pub mod present_blit;

pub use bindings::{BindingPoint, KernelParams, OUTPUT_IMAGE_UNIT};
pub use buffer_sync::{SceneBuffers, UploadPolicy};
pub use compute_dispatch::{ComputeDispatcher, DispatchState};
pub use present_blit::{filter_for, PresentationBlit};

//! Backend abstraction layer
//!
//! Provides common traits and types that the wgpu backend and the
//! CPU-emulated dummy backend implement.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;

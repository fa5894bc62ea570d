//! Top-level error type.

use thiserror::Error;

use crate::backend::BackendError;
use crate::scene::SceneError;

/// Errors surfaced by the renderer and the interactive loop.
#[derive(Error, Debug)]
pub enum RaycastError {
    /// The window or its surface could not be created.
    #[error("failed to create window: {0}")]
    WindowCreation(String),
    /// The compute kernel could not be read, validated or compiled.
    #[error("failed to load kernel {source_id}: {message}")]
    KernelLoad { source_id: String, message: String },
    /// The renderer was used after `shutdown`.
    #[error("renderer has been shut down")]
    ShutDown,
    /// The event loop could not be created or stopped abnormally.
    #[error("event loop failed: {0}")]
    EventLoop(String),
    #[error("failed to write screenshot: {0}")]
    Screenshot(#[from] image::ImageError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl RaycastError {
    /// Startup failures that end the process
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            RaycastError::WindowCreation(_) | RaycastError::KernelLoad { .. }
        )
    }
}

pub type RaycastResult<T> = Result<T, RaycastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaycastError::WindowCreation("no display".to_string());
        assert_eq!(err.to_string(), "failed to create window: no display");

        let err = RaycastError::KernelLoad {
            source_id: "embedded raycast.wgsl".to_string(),
            message: "unresolved placeholder".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to load kernel embedded raycast.wgsl: unresolved placeholder"
        );
    }

    #[test]
    fn only_window_and_kernel_failures_are_fatal() {
        assert!(RaycastError::WindowCreation(String::new()).is_fatal_startup());
        assert!(!RaycastError::ShutDown.is_fatal_startup());
        assert!(!RaycastError::from(BackendError::SurfaceLost).is_fatal_startup());
    }
}

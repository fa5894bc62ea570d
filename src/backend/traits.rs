//! Core backend abstraction traits
//!
//! The interface the renderer drives every frame. The wgpu backend implements
//! it on the GPU and the dummy backend emulates it on the CPU for tests.

use crate::backend::types::*;
use crate::pipeline::bindings::{BindingPoint, KernelParams, OUTPUT_IMAGE_UNIT};
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Write of {len} bytes at offset {offset} overruns buffer of {size} bytes")]
    WriteOutOfBounds { offset: u64, len: usize, size: u64 },
    #[error("Dispatch with incomplete bindings: {0}")]
    MissingBinding(String),
    #[error("Image {0} read before a barrier made the kernel's writes visible")]
    UnbarrieredImage(u64),
    #[error("No frame in flight")]
    NoFrame,
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Timed out acquiring the next surface image")]
    Timeout,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    /// The surface image is unavailable for now; skip the frame and retry
    pub fn skips_frame(&self) -> bool {
        matches!(self, BackendError::SurfaceLost | BackendError::Timeout)
    }
}

/// Image unit named by `params`, which must be the kernel's output unit
pub fn kernel_image_unit(params: &KernelParams) -> BackendResult<u32> {
    u32::try_from(params.image_unit)
        .ok()
        .filter(|unit| *unit == OUTPUT_IMAGE_UNIT)
        .ok_or_else(|| {
            BackendError::MissingBinding(format!(
                "image unit {} is not the output unit {OUTPUT_IMAGE_UNIT}",
                params.image_unit
            ))
        })
}

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineHandle(pub(crate) u64);

impl BufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl TextureHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl ComputePipelineHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Compute pipeline descriptor
///
/// The pipeline layout is the fixed kernel interface from
/// [`crate::pipeline::bindings`]; only the source varies.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub entry_point: String,
}

/// Frame context returned when beginning a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub width: u32,
    pub height: u32,
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Resize the swapchain
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<FrameContext>;

    /// Submit recorded work and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    // Resources

    /// Create a buffer holding `data`
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Overwrite part of a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()>;

    /// Copy a buffer's whole contents back to the host
    fn read_buffer(&mut self, buffer: BufferHandle) -> BackendResult<Vec<u8>>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Copy a texture back to the host as tightly packed rows
    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle>;

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineHandle);

    // Kernel state

    /// Attach a buffer to one of the kernel's buffer binding points
    fn bind_buffer(&mut self, point: BindingPoint, buffer: BufferHandle) -> BackendResult<()>;

    fn unbind_buffer(&mut self, point: BindingPoint);

    /// Attach a texture to an image unit
    fn bind_image(
        &mut self,
        unit: u32,
        texture: TextureHandle,
        access: StorageAccess,
    ) -> BackendResult<()>;

    fn unbind_image(&mut self, unit: u32);

    /// Select the kernel for subsequent dispatches, `None` to clear
    fn set_compute_pipeline(&mut self, pipeline: Option<ComputePipelineHandle>) -> BackendResult<()>;

    fn set_kernel_params(&mut self, params: &KernelParams);

    // Execution

    /// Run the bound kernel over an `x * y * z` grid
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> BackendResult<()>;

    /// Make earlier kernel writes visible to later stages
    fn memory_barrier(&mut self, scope: BarrierScope);

    /// Copy `src` of `texture` into `dst` of the current surface image
    fn blit_to_surface(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        filter: FilterMode,
    ) -> BackendResult<()>;
}

//! One kernel dispatch per frame over the output image.
//!
//! Each frame walks the same strictly ordered sequence:
//!
//! ```text
//! Idle -> Bound -> Dispatched -> Barriered -> Unbound -> Idle
//! ```
//!
//! The barrier guarantees the blit that follows never sees a partially
//! written image.

use crate::backend::{
    BackendResult, BarrierScope, ComputePipelineHandle, GraphicsBackend, StorageAccess,
    TextureHandle,
};
use crate::pipeline::bindings::{KernelParams, OUTPUT_IMAGE_UNIT};
use crate::pipeline::buffer_sync::SceneBuffers;

/// Where the dispatcher is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Bound,
    Dispatched,
    Barriered,
    Unbound,
}

impl DispatchState {
    fn next(self) -> DispatchState {
        match self {
            DispatchState::Idle => DispatchState::Bound,
            DispatchState::Bound => DispatchState::Dispatched,
            DispatchState::Dispatched => DispatchState::Barriered,
            DispatchState::Barriered => DispatchState::Unbound,
            DispatchState::Unbound => DispatchState::Idle,
        }
    }
}

pub struct ComputeDispatcher {
    kernel: ComputePipelineHandle,
    image: TextureHandle,
    width: u32,
    height: u32,
    state: DispatchState,
    dispatches: u64,
}

impl ComputeDispatcher {
    /// Dispatcher running `kernel` over a `width` x `height` `image`
    pub fn new(kernel: ComputePipelineHandle, image: TextureHandle, width: u32, height: u32) -> Self {
        Self {
            kernel,
            image,
            width,
            height,
            state: DispatchState::Idle,
            dispatches: 0,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Completed dispatches so far
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// One invocation per output pixel, depth fixed at 1
    pub fn grid(&self) -> [u32; 3] {
        [self.width, self.height, 1]
    }

    fn advance(&mut self, to: DispatchState) {
        debug_assert_eq!(self.state.next(), to, "out of order dispatch step");
        self.state = to;
    }

    /// Run the full sequence once.
    ///
    /// Bindings are released even when binding or dispatch fails, so a
    /// failed frame leaves the dispatcher idle.
    pub fn run<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buffers: &SceneBuffers,
        params: KernelParams,
    ) -> BackendResult<()> {
        let result = self
            .bind(backend, buffers, params)
            .and_then(|()| self.dispatch(backend))
            .map(|()| self.barrier(backend));
        self.unbind(backend);
        if result.is_ok() {
            self.dispatches += 1;
        }
        result
    }

    fn bind<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buffers: &SceneBuffers,
        params: KernelParams,
    ) -> BackendResult<()> {
        buffers.bind_all(backend)?;
        backend.set_compute_pipeline(Some(self.kernel))?;
        backend.set_kernel_params(&params);
        backend.bind_image(OUTPUT_IMAGE_UNIT, self.image, StorageAccess::WriteOnly)?;
        self.advance(DispatchState::Bound);
        Ok(())
    }

    fn dispatch<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> BackendResult<()> {
        let [x, y, z] = self.grid();
        log::trace!("Dispatching raycast kernel over {x}x{y}x{z}");
        backend.dispatch_compute(x, y, z)?;
        self.advance(DispatchState::Dispatched);
        Ok(())
    }

    fn barrier<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        backend.memory_barrier(BarrierScope::ImageAccess);
        self.advance(DispatchState::Barriered);
    }

    fn unbind<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        backend.unbind_image(OUTPUT_IMAGE_UNIT);
        // Clearing the pipeline after a failed set is harmless.
        let _ = backend.set_compute_pipeline(None);
        SceneBuffers::unbind_all(backend);
        if self.state == DispatchState::Barriered {
            self.advance(DispatchState::Unbound);
        } else {
            self.state = DispatchState::Unbound;
        }
        self.advance(DispatchState::Idle);
    }
}

//! Renderer: owns the scene, the backend and every GPU resource.
//!
//! A frame runs the stages in a fixed order:
//!
//! 1. apply pending edits to the [`SceneStore`]
//! 2. re-send dirty collections ([`SceneBuffers`])
//! 3. run the kernel once ([`ComputeDispatcher`])
//! 4. copy the image into the surface ([`PresentationBlit`])
//! 5. present
//!
//! [`Renderer::render`] covers 2 to 4 so callers can draw an overlay before
//! [`Renderer::present`].

use crate::backend::{
    BackendError, ComputePipelineHandle, FrameContext, GraphicsBackend, TextureDescriptor,
    TextureFormat, TextureHandle, TextureUsage,
};
use crate::error::{RaycastError, RaycastResult};
use crate::pipeline::{
    ComputeDispatcher, KernelParams, PresentationBlit, SceneBuffers, OUTPUT_IMAGE_UNIT,
};
use crate::scene::{Collection, EditSet, SceneStore};
use crate::shader::{load_kernel, KernelSourceId};

/// Every device object the renderer created, in creation order
struct GpuResources {
    kernel: ComputePipelineHandle,
    buffers: SceneBuffers,
    image: TextureHandle,
    dispatcher: ComputeDispatcher,
    blit: PresentationBlit,
}

pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    scene: SceneStore,
    width: u32,
    height: u32,
    frame: Option<FrameContext>,
    resources: Option<GpuResources>,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Load the kernel, upload the scene and allocate the `width` x `height`
    /// output image.
    ///
    /// On failure everything created so far is released again.
    pub fn new(
        mut backend: B,
        scene: SceneStore,
        kernel_source: &KernelSourceId,
        width: u32,
        height: u32,
    ) -> RaycastResult<Self> {
        let kernel = load_kernel(&mut backend, kernel_source)?;

        let buffers = match SceneBuffers::create(&mut backend, &scene) {
            Ok(buffers) => buffers,
            Err(err) => {
                backend.destroy_compute_pipeline(kernel);
                return Err(err.into());
            }
        };

        let image = match backend.create_texture(&TextureDescriptor {
            label: Some("Raycast Output".to_string()),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::STORAGE_BINDING
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        }) {
            Ok(image) => image,
            Err(err) => {
                buffers.destroy(&mut backend);
                backend.destroy_compute_pipeline(kernel);
                return Err(err.into());
            }
        };

        log::info!(
            "Renderer ready on {}: {width}x{height} image, {} spheres, {} lights, {} materials",
            backend.name(),
            scene.sphere_count(),
            scene.light_count(),
            scene.material_count()
        );

        Ok(Self {
            backend,
            scene,
            width,
            height,
            frame: None,
            resources: Some(GpuResources {
                kernel,
                buffers,
                image,
                dispatcher: ComputeDispatcher::new(kernel, image, width, height),
                blit: PresentationBlit::new(image, width, height),
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneStore {
        &mut self.scene
    }

    /// Size of the offscreen image
    pub fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_shut_down(&self) -> bool {
        self.resources.is_none()
    }

    /// Completed kernel dispatches
    pub fn dispatches(&self) -> u64 {
        self.resources
            .as_ref()
            .map_or(0, |resources| resources.dispatcher.dispatches())
    }

    fn resources(&self) -> RaycastResult<&GpuResources> {
        self.resources.as_ref().ok_or(RaycastError::ShutDown)
    }

    /// Apply a change-set from the edit panel
    pub fn apply_edits(&mut self, edits: &EditSet) -> RaycastResult<()> {
        if !edits.is_empty() {
            log::debug!("Applying {} scene edits", edits.len());
        }
        self.scene.apply(edits)?;
        Ok(())
    }

    /// Re-send every dirty collection; returns how many were sent
    pub fn sync(&mut self) -> RaycastResult<usize> {
        let resources = self.resources.as_ref().ok_or(RaycastError::ShutDown)?;
        Ok(resources.buffers.sync_all(&mut self.backend, &mut self.scene)?)
    }

    /// Run the kernel over the whole image
    pub fn dispatch(&mut self) -> RaycastResult<()> {
        let params = KernelParams::new(
            self.scene.light_count(),
            self.scene.sphere_count(),
            OUTPUT_IMAGE_UNIT,
        );
        let resources = self.resources.as_mut().ok_or(RaycastError::ShutDown)?;
        resources
            .dispatcher
            .run(&mut self.backend, &resources.buffers, params)?;
        Ok(())
    }

    /// Sync, dispatch and blit into a freshly acquired surface image.
    ///
    /// The frame stays open until [`Renderer::present`].
    pub fn render(&mut self) -> RaycastResult<FrameContext> {
        self.sync()?;
        self.dispatch()?;

        let frame = self.backend.begin_frame()?;
        self.frame = Some(frame);
        let blit = self.resources()?.blit;
        blit.run(&mut self.backend, frame.width, frame.height)?;
        Ok(frame)
    }

    /// [`Renderer::render`], but `None` when the surface image is unavailable
    /// for now (lost or timed out). The kernel has still run; the next call
    /// retries the acquire.
    pub fn try_render(&mut self) -> RaycastResult<Option<FrameContext>> {
        match self.render() {
            Ok(frame) => Ok(Some(frame)),
            Err(RaycastError::Backend(err)) if err.skips_frame() => {
                log::warn!("{err}, skipping frame");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Submit and present the open frame
    pub fn present(&mut self) -> RaycastResult<()> {
        if self.frame.take().is_none() {
            return Err(BackendError::NoFrame.into());
        }
        self.backend.end_frame()?;
        Ok(())
    }

    /// One whole iteration: apply `edits`, render, present.
    ///
    /// `None` when the surface image was unavailable and nothing was presented.
    pub fn frame(&mut self, edits: &EditSet) -> RaycastResult<Option<FrameContext>> {
        self.apply_edits(edits)?;
        let Some(frame) = self.try_render()? else {
            return Ok(None);
        };
        self.present()?;
        Ok(Some(frame))
    }

    /// Forward a window resize to the surface. The image keeps its size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// RGBA8 bytes of the offscreen image, tightly packed rows
    pub fn read_output(&mut self) -> RaycastResult<Vec<u8>> {
        let image = self.resources()?.image;
        Ok(self.backend.read_texture(image)?)
    }

    /// Device copy of one collection
    pub fn read_collection(&mut self, collection: Collection) -> RaycastResult<Vec<u8>> {
        let buffer = self.resources()?.buffers.handle(collection);
        Ok(self.backend.read_buffer(buffer)?)
    }

    /// Release every device object, newest first. Safe to call twice.
    pub fn shutdown(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        self.backend.destroy_texture(resources.image);
        resources.buffers.destroy(&mut self.backend);
        self.backend.destroy_compute_pipeline(resources.kernel);
        log::info!("Renderer shut down");
    }
}

impl<B: GraphicsBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! wgpu backend implementation

mod blit;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::bindings::{
    BindingPoint, KernelParams, BUFFER_GROUP, IMAGE_GROUP, OUTPUT_IMAGE_UNIT, PARAMS_GROUP,
};
use static_assertions::const_assert_eq;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use wgpu::util::DeviceExt;

use blit::BlitPipeline;

// the pipeline layout lists the kernel's bind groups in this order
const_assert_eq!(BUFFER_GROUP, 0);
const_assert_eq!(IMAGE_GROUP, 1);
const_assert_eq!(PARAMS_GROUP, 2);

/// Buffered compute pass command
enum ComputeCommand {
    SetPipeline(u64),
    SetBindGroup { index: u32, bind_group: wgpu::BindGroup },
    Dispatch { x: u32, y: u32, z: u32 },
}

/// Pending compute pass with buffered commands
///
/// Recorded into the frame encoder when a barrier closes it.
struct PendingComputePass {
    commands: Vec<ComputeCommand>,
}

/// Bind group layouts of the kernel interface
struct KernelLayouts {
    buffers: wgpu::BindGroupLayout,
    image: wgpu::BindGroupLayout,
    params: wgpu::BindGroupLayout,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    current_view: Option<wgpu::TextureView>,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    compute_pipelines: HashMap<u64, wgpu::ComputePipeline>,

    // Handle counters
    next_buffer_id: u64,
    next_texture_id: u64,
    next_compute_pipeline_id: u64,

    // Kernel state
    layouts: KernelLayouts,
    params_buffer: wgpu::Buffer,
    bound_buffers: BTreeMap<BindingPoint, BufferHandle>,
    bound_images: HashMap<u32, (TextureHandle, StorageAccess)>,
    pipeline: Option<ComputePipelineHandle>,
    params: KernelParams,
    unbarriered: HashSet<u64>,

    blit: BlitPipeline,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pending_compute_pass: Option<PendingComputePass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        if usage.contains(BufferUsage::STORAGE) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::STORAGE_BINDING) {
            result |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        result
    }

    fn buffer(&self, handle: BufferHandle) -> BackendResult<&wgpu::Buffer> {
        self.buffers.get(&handle.0).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            id: handle.0,
        })
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&wgpu::Texture> {
        self.textures.get(&handle.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: handle.0,
        })
    }

    /// Run `create` inside validation and out-of-memory error scopes
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_surface_size(&self, width: u32, height: u32) -> (u32, u32) {
        let max_size = self.device.limits().max_texture_dimension_2d;
        clamp_to_limit(width, height, max_size)
    }

    fn create_kernel_layouts(device: &wgpu::Device) -> KernelLayouts {
        let buffer_entries: Vec<wgpu::BindGroupLayoutEntry> = BindingPoint::ALL
            .iter()
            .map(|point| wgpu::BindGroupLayoutEntry {
                binding: point.index(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: if point.is_storage() {
                        wgpu::BufferBindingType::Storage { read_only: true }
                    } else {
                        wgpu::BufferBindingType::Uniform
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let buffers = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Buffers Layout"),
            entries: &buffer_entries,
        });

        let image = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Image Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: OUTPUT_IMAGE_UNIT,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
        });

        let params = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        KernelLayouts {
            buffers,
            image,
            params,
        }
    }

    fn ensure_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        })
    }

    /// Record the pending compute pass into the encoder
    fn end_compute_pass(&mut self) {
        let Some(pending) = self.pending_compute_pass.take() else {
            return;
        };

        let compute_pipelines = &self.compute_pipelines;
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ray Cast Pass"),
            timestamp_writes: None,
        });

        for cmd in &pending.commands {
            match cmd {
                ComputeCommand::SetPipeline(id) => {
                    if let Some(pipeline) = compute_pipelines.get(id) {
                        compute_pass.set_pipeline(pipeline);
                    }
                }
                ComputeCommand::SetBindGroup { index, bind_group } => {
                    compute_pass.set_bind_group(*index, bind_group, &[]);
                }
                ComputeCommand::Dispatch { x, y, z } => {
                    compute_pass.dispatch_workgroups(*x, *y, *z);
                }
            }
        }
    }

    /// Submit everything recorded so far
    fn flush(&mut self) {
        self.end_compute_pass();
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Map a COPY_DST | MAP_READ staging buffer and wait for the copy
    fn map_staging(&self, staging: &wgpu::Buffer) -> BackendResult<Vec<u8>> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn kernel_bind_groups(&self) -> BackendResult<[wgpu::BindGroup; 3]> {
        let mut buffer_entries = Vec::with_capacity(BindingPoint::ALL.len());
        for point in BindingPoint::ALL {
            let handle = self
                .bound_buffers
                .get(&point)
                .ok_or_else(|| BackendError::MissingBinding(format!("binding point {point:?}")))?;
            buffer_entries.push(wgpu::BindGroupEntry {
                binding: point.index(),
                resource: self.buffer(*handle)?.as_entire_binding(),
            });
        }

        let unit = kernel_image_unit(&self.params)?;
        let (image, access) = self
            .bound_images
            .get(&unit)
            .copied()
            .ok_or_else(|| BackendError::MissingBinding(format!("image unit {unit}")))?;
        // the image layout declares the output unit write-only
        if access != StorageAccess::WriteOnly {
            return Err(BackendError::MissingBinding(format!(
                "image unit {unit} must be bound write-only"
            )));
        }
        let image_view = self
            .texture(image)?
            .create_view(&wgpu::TextureViewDescriptor::default());

        let buffers = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Buffers"),
            layout: &self.layouts.buffers,
            entries: &buffer_entries,
        });
        let image = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Image"),
            layout: &self.layouts.image,
            entries: &[wgpu::BindGroupEntry {
                binding: unit,
                resource: wgpu::BindingResource::TextureView(&image_view),
            }],
        });
        let params = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Params"),
            layout: &self.layouts.params,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: self.params_buffer.as_entire_binding(),
            }],
        });

        Ok([buffers, image, params])
    }
}

fn clamp_to_limit(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width > max_size || height > max_size {
        let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        (new_width, new_height)
    } else {
        (width.max(1), height.max(1))
    }
}

/// Bytes per row of a texture copy, padded to wgpu's copy alignment
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl WgpuBackend {
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("Uncaptured wgpu error: {error}");
        }));

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // the blit copies bytes as-is, so avoid an implicit sRGB encode
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no supported formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let max_size = device.limits().max_texture_dimension_2d;
        let (clamped_width, clamped_height) = clamp_to_limit(size.width, size.height, max_size);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: clamped_width,
            height: clamped_height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &surface_config);
        log::info!(
            "Surface configured: {}x{} {:?}",
            clamped_width,
            clamped_height,
            surface_format
        );

        let layouts = Self::create_kernel_layouts(&device);
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Params"),
            contents: bytemuck::bytes_of(&KernelParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let blit = BlitPipeline::new(&device, surface_format);

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            current_view: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            compute_pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_compute_pipeline_id: 1,
            layouts,
            params_buffer,
            bound_buffers: BTreeMap::new(),
            bound_images: HashMap::new(),
            pipeline: None,
            params: KernelParams::default(),
            unbarriered: HashSet::new(),
            blit,
            encoder: None,
            pending_compute_pass: None,
        })
    }

    /// Native initialization
    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        // On Windows, try Vulkan first to avoid D3D12 debug layer validation errors
        let backends = if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all())
        } else {
            #[cfg(target_os = "windows")]
            {
                wgpu::Backends::VULKAN
            }
            #[cfg(not(target_os = "windows"))]
            {
                wgpu::Backends::all()
            }
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await;

        // If no adapter found with preferred backend, try with all backends
        let (instance, surface, adapter) = if adapter.is_none() && backends != wgpu::Backends::all() {
            log::warn!("Preferred backend not available, falling back to all backends");
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let surface = instance
                .create_surface(window.clone())
                .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: Some(&surface),
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| {
                    BackendError::InitializationFailed("No suitable adapter found".into())
                })?;
            (instance, surface, adapter)
        } else {
            let adapter = adapter.ok_or_else(|| {
                BackendError::InitializationFailed("No suitable adapter found".into())
            })?;
            (instance, surface, adapter)
        };

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Ray Cast Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (clamped_width, clamped_height) = self.clamp_surface_size(width, height);
            self.surface_config.width = clamped_width;
            self.surface_config.height = clamped_height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(BackendError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };

        self.current_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.current_texture = Some(output);
        self.ensure_encoder();

        Ok(FrameContext {
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.flush();
        self.current_view = None;

        match self.current_texture.take() {
            Some(texture) => {
                texture.present();
                Ok(())
            }
            None => Err(BackendError::NoFrame),
        }
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        if data.len() as u64 != desc.size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: {} bytes of data for a {} byte buffer",
                desc.label,
                data.len(),
                desc.size
            )));
        }

        let max_size = self.device.limits().max_buffer_size;
        if desc.size > max_size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: {} bytes exceeds the device limit of {max_size}",
                desc.label, desc.size
            )));
        }

        let buffer = self
            .scoped(|device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: desc.label.as_deref(),
                    contents: data,
                    usage: Self::convert_buffer_usage(desc.usage),
                })
            })
            .map_err(|e| BackendError::BufferCreationFailed(format!("{:?}: {e}", desc.label)))?;

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);

        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let buf = self.buffer(buffer)?;
        if offset + data.len() as u64 > buf.size() {
            return Err(BackendError::WriteOutOfBounds {
                offset,
                len: data.len(),
                size: buf.size(),
            });
        }
        self.queue.write_buffer(buf, offset, data);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> BackendResult<Vec<u8>> {
        // earlier queue writes and recorded passes must land first
        self.flush();

        let source = self.buffer(buffer)?;
        let size = source.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        self.map_staging(&staging)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        desc.check_extent(self.device.limits().max_texture_dimension_2d)?;

        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: Self::convert_texture_format(desc.format),
                    usage: Self::convert_texture_usage(desc.usage),
                    view_formats: &[],
                })
            })
            .map_err(|e| BackendError::TextureCreationFailed(format!("{:?}: {e}", desc.label)))?;

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, texture);

        Ok(TextureHandle(id))
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>> {
        if self.unbarriered.contains(&texture.0) {
            return Err(BackendError::UnbarrieredImage(texture.0));
        }
        self.flush();

        let source = self.texture(texture)?;
        let (width, height) = (source.width(), source.height());
        let padded = padded_bytes_per_row(width);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback Staging"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: source,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded_rows = self.map_staging(&staging)?;
        let row_len = (width * 4) as usize;
        Ok(padded_rows
            .chunks_exact(padded as usize)
            .flat_map(|row| &row[..row_len])
            .copied()
            .collect())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.unbarriered.remove(&texture.0);
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.destroy();
        }
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        let layouts = &self.layouts;
        let pipeline = self
            .scoped(|device| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: desc.label.as_deref(),
                    source: wgpu::ShaderSource::Wgsl(desc.shader.as_str().into()),
                });

                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Ray Cast Pipeline Layout"),
                    bind_group_layouts: &[&layouts.buffers, &layouts.image, &layouts.params],
                    push_constant_ranges: &[],
                });

                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: &desc.entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                })
            })
            .map_err(|e| BackendError::PipelineCreationFailed(e.to_string()))?;

        let id = self.next_compute_pipeline_id;
        self.next_compute_pipeline_id += 1;
        self.compute_pipelines.insert(id, pipeline);

        Ok(ComputePipelineHandle(id))
    }

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.compute_pipelines.remove(&pipeline.0);
    }

    fn bind_buffer(&mut self, point: BindingPoint, buffer: BufferHandle) -> BackendResult<()> {
        self.buffer(buffer)?;
        self.bound_buffers.insert(point, buffer);
        Ok(())
    }

    fn unbind_buffer(&mut self, point: BindingPoint) {
        self.bound_buffers.remove(&point);
    }

    fn bind_image(
        &mut self,
        unit: u32,
        texture: TextureHandle,
        access: StorageAccess,
    ) -> BackendResult<()> {
        self.texture(texture)?;
        self.bound_images.insert(unit, (texture, access));
        Ok(())
    }

    fn unbind_image(&mut self, unit: u32) {
        self.bound_images.remove(&unit);
    }

    fn set_compute_pipeline(&mut self, pipeline: Option<ComputePipelineHandle>) -> BackendResult<()> {
        if let Some(handle) = pipeline {
            if !self.compute_pipelines.contains_key(&handle.0) {
                return Err(BackendError::InvalidHandle {
                    kind: "compute pipeline",
                    id: handle.0,
                });
            }
        }
        self.pipeline = pipeline;
        Ok(())
    }

    fn set_kernel_params(&mut self, params: &KernelParams) {
        self.params = *params;
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> BackendResult<()> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| BackendError::MissingBinding("no compute pipeline".into()))?;
        let [buffers, image, params] = self.kernel_bind_groups()?;
        let image_texture = self
            .bound_images
            .get(&OUTPUT_IMAGE_UNIT)
            .map(|(texture, _)| texture.0);

        let pending = self
            .pending_compute_pass
            .get_or_insert_with(|| PendingComputePass { commands: Vec::new() });
        pending.commands.push(ComputeCommand::SetPipeline(pipeline.0));
        pending.commands.push(ComputeCommand::SetBindGroup {
            index: BUFFER_GROUP,
            bind_group: buffers,
        });
        pending.commands.push(ComputeCommand::SetBindGroup {
            index: IMAGE_GROUP,
            bind_group: image,
        });
        pending.commands.push(ComputeCommand::SetBindGroup {
            index: PARAMS_GROUP,
            bind_group: params,
        });
        pending.commands.push(ComputeCommand::Dispatch { x, y, z });

        if let Some(id) = image_texture {
            self.unbarriered.insert(id);
        }
        log::trace!("Dispatched {x}x{y}x{z} kernel invocations");
        Ok(())
    }

    fn memory_barrier(&mut self, scope: BarrierScope) {
        // closing the pass orders its storage writes before any later pass
        self.end_compute_pass();
        if scope.covers_images() {
            self.unbarriered.clear();
        }
    }

    fn blit_to_surface(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        filter: FilterMode,
    ) -> BackendResult<()> {
        if self.unbarriered.contains(&texture.0) {
            return Err(BackendError::UnbarrieredImage(texture.0));
        }
        if src.is_empty() || dst.is_empty() {
            return Ok(());
        }

        let source = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let target = self.current_view.as_ref().ok_or(BackendError::NoFrame)?;
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });

        self.blit.encode(
            &self.device,
            &self.queue,
            encoder,
            source,
            target,
            src,
            dst,
            filter,
        );
        Ok(())
    }
}

// Additional methods for egui integration
impl WgpuBackend {
    /// Get reference to the wgpu device (for egui-wgpu Renderer creation)
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the surface format as wgpu type (for egui-wgpu Renderer creation)
    pub fn wgpu_surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Get device, queue, and encoder together for operations that need all three.
    /// This avoids borrow checker issues when calling external libraries like egui.
    pub fn device_queue_encoder(
        &mut self,
    ) -> (&wgpu::Device, &wgpu::Queue, Option<&mut wgpu::CommandEncoder>) {
        (&self.device, &self.queue, self.encoder.as_mut())
    }

    /// Render egui on top of the current surface image
    pub fn render_egui(
        &mut self,
        renderer: &egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let Some(view) = self.current_view.as_ref() else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Preserve existing content
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderer.render(&mut render_pass, paint_jobs, screen_descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_aspect_ratio() {
        assert_eq!(clamp_to_limit(960, 540, 8192), (960, 540));
        assert_eq!(clamp_to_limit(16384, 8192, 8192), (8192, 4096));
        assert_eq!(clamp_to_limit(0, 0, 8192), (1, 1));
    }

    #[test]
    fn readback_rows_are_aligned() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(960), 3840);
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }
}

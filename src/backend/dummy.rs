//! Dummy GPU backend for testing and development.
//!
//! Keeps every buffer and texture in host memory, runs a CPU kernel closure
//! over the dispatch grid and copies into an in-memory surface. It applies
//! the same binding and barrier rules the GPU path relies on and records
//! every call in a command log, so the per-frame protocol can be checked
//! without GPU hardware.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;
use glam::{Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::math::{dot, normalize};
use crate::pipeline::bindings::{BindingPoint, KernelParams};
use crate::scene::{CameraFrame, Light, Material, Sphere, LIGHT_CAPACITY, MATERIAL_CAPACITY};

/// Largest texture edge, matching wgpu's default device limits
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Colour written where no sphere is hit
pub const BACKGROUND: Vec4 = Vec4::new(0.1, 0.1, 0.12, 1.0);

/// Decoded kernel inputs for one dispatch
#[derive(Debug, Clone)]
pub struct KernelInputs {
    pub spheres: Vec<Sphere>,
    pub camera: CameraFrame,
    pub lights: Vec<Light>,
    pub materials: Vec<Material>,
    pub params: KernelParams,
    /// Size of the image bound to the output unit
    pub image_size: (u32, u32),
}

type KernelFn = dyn Fn([u32; 3], &KernelInputs) -> [u8; 4] + Send + Sync;

/// Host-side stand-in for a compiled compute kernel
#[derive(Clone)]
pub struct CpuKernel {
    name: &'static str,
    body: Arc<KernelFn>,
}

impl std::fmt::Debug for CpuKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuKernel").field("name", &self.name).finish()
    }
}

impl CpuKernel {
    pub fn new(
        name: &'static str,
        body: impl Fn([u32; 3], &KernelInputs) -> [u8; 4] + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Host port of `shaders/raycast.wgsl`
    pub fn raycast() -> Self {
        Self::new("raycast", raycast_pixel)
    }

    /// Writes its own invocation id: `[x lo, x hi, y lo, y hi]`
    pub fn stamp_coordinates() -> Self {
        Self::new("stamp_coordinates", |[x, y, _z], _| {
            [x as u8, (x >> 8) as u8, y as u8, (y >> 8) as u8]
        })
    }

    fn run(&self, id: [u32; 3], inputs: &KernelInputs) -> [u8; 4] {
        (self.body)(id, inputs)
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    CreateBuffer { buffer: BufferHandle, size: u64 },
    WriteBuffer { buffer: BufferHandle, offset: u64, len: usize },
    DestroyBuffer(BufferHandle),
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    DestroyTexture(TextureHandle),
    CreatePipeline(ComputePipelineHandle),
    DestroyPipeline(ComputePipelineHandle),
    BindBuffer { point: BindingPoint, buffer: BufferHandle },
    UnbindBuffer(BindingPoint),
    BindImage { unit: u32, texture: TextureHandle, access: StorageAccess },
    UnbindImage(u32),
    SetPipeline(Option<ComputePipelineHandle>),
    SetKernelParams(KernelParams),
    Dispatch { x: u32, y: u32, z: u32 },
    Barrier(BarrierScope),
    Blit { texture: TextureHandle, src: Rect, dst: Rect, filter: FilterMode },
}

struct DummyBuffer {
    data: Vec<u8>,
}

struct DummyTexture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// CPU-emulated backend
pub struct DummyBackend {
    surface_width: u32,
    surface_height: u32,
    surface: Vec<u8>,
    frame_in_flight: bool,
    frames_presented: u64,
    failing_acquires: u32,

    kernel: CpuKernel,
    buffers: HashMap<u64, DummyBuffer>,
    textures: HashMap<u64, DummyTexture>,
    pipelines: HashMap<u64, CpuKernel>,
    next_buffer_id: u64,
    next_texture_id: u64,
    next_pipeline_id: u64,

    bound_buffers: BTreeMap<BindingPoint, BufferHandle>,
    bound_images: HashMap<u32, (TextureHandle, StorageAccess)>,
    pipeline: Option<ComputePipelineHandle>,
    params: KernelParams,
    unbarriered: HashSet<u64>,

    invocations: u64,
    commands: Vec<Command>,
}

impl DummyBackend {
    /// Backend with a `width` x `height` surface running the ray-cast kernel
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_kernel(width, height, CpuKernel::raycast())
    }

    /// Pipelines created on this backend run `kernel`
    pub fn with_kernel(width: u32, height: u32, kernel: CpuKernel) -> Self {
        Self {
            surface_width: width,
            surface_height: height,
            surface: vec![0; (width as usize) * (height as usize) * 4],
            frame_in_flight: false,
            frames_presented: 0,
            failing_acquires: 0,
            kernel,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_pipeline_id: 1,
            bound_buffers: BTreeMap::new(),
            bound_images: HashMap::new(),
            pipeline: None,
            params: KernelParams::default(),
            unbarriered: HashSet::new(),
            invocations: 0,
            commands: Vec::new(),
        }
    }

    /// Let the next `count` surface acquires time out
    pub fn fail_next_acquires(&mut self, count: u32) {
        self.failing_acquires = count;
    }

    /// Every call recorded so far
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Kernel invocations executed since creation
    pub fn invocation_count(&self) -> u64 {
        self.invocations
    }

    /// RGBA8 contents of the surface
    pub fn surface_pixels(&self) -> &[u8] {
        &self.surface
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn bound_buffer(&self, point: BindingPoint) -> Option<BufferHandle> {
        self.bound_buffers.get(&point).copied()
    }

    pub fn bound_image(&self, unit: u32) -> Option<TextureHandle> {
        self.bound_images.get(&unit).map(|(texture, _)| *texture)
    }

    pub fn current_pipeline(&self) -> Option<ComputePipelineHandle> {
        self.pipeline
    }

    fn buffer_bytes(&self, point: BindingPoint) -> BackendResult<&[u8]> {
        let handle = self
            .bound_buffers
            .get(&point)
            .ok_or_else(|| BackendError::MissingBinding(format!("binding point {point:?}")))?;
        self.buffers
            .get(&handle.0)
            .map(|b| b.data.as_slice())
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: handle.0,
            })
    }

    fn decode_inputs(&self, image_size: (u32, u32)) -> BackendResult<KernelInputs> {
        let camera_bytes = self.buffer_bytes(BindingPoint::Camera)?;
        let camera = decode_records::<CameraFrame>(camera_bytes)
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MissingBinding("camera buffer too small".into()))?;

        Ok(KernelInputs {
            spheres: decode_records(self.buffer_bytes(BindingPoint::Spheres)?),
            camera,
            lights: decode_records(self.buffer_bytes(BindingPoint::Lights)?),
            materials: decode_records(self.buffer_bytes(BindingPoint::Materials)?),
            params: self.params,
            image_size,
        })
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&DummyTexture> {
        self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })
    }
}

/// Byte offset of pixel (x, y) in tightly packed RGBA8 rows
fn pixel_offset(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

fn decode_records<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

impl GraphicsBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_width = width;
            self.surface_height = height;
            self.surface = vec![0; (width as usize) * (height as usize) * 4];
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if self.failing_acquires > 0 {
            self.failing_acquires -= 1;
            return Err(BackendError::Timeout);
        }
        self.frame_in_flight = true;
        self.commands.push(Command::BeginFrame);
        Ok(FrameContext {
            width: self.surface_width,
            height: self.surface_height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if !self.frame_in_flight {
            return Err(BackendError::NoFrame);
        }
        self.frame_in_flight = false;
        self.frames_presented += 1;
        self.commands.push(Command::EndFrame);
        Ok(())
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
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );

        let buffer = BufferHandle(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(buffer.0, DummyBuffer { data: data.to_vec() });
        self.commands.push(Command::CreateBuffer {
            buffer,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let target = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })?;

        let size = target.data.len() as u64;
        let end = offset + data.len() as u64;
        if end > size {
            return Err(BackendError::WriteOutOfBounds {
                offset,
                len: data.len(),
                size,
            });
        }
        target.data[offset as usize..end as usize].copy_from_slice(data);
        self.commands.push(Command::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> BackendResult<Vec<u8>> {
        self.buffers
            .get(&buffer.0)
            .map(|b| b.data.clone())
            .ok_or(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            })
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            self.commands.push(Command::DestroyBuffer(buffer));
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        desc.check_extent(MAX_TEXTURE_DIMENSION)?;
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );

        let texture = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        let len = (desc.width as usize) * (desc.height as usize) * desc.format.bytes_per_pixel() as usize;
        self.textures.insert(
            texture.0,
            DummyTexture {
                width: desc.width,
                height: desc.height,
                data: vec![0; len],
            },
        );
        self.commands.push(Command::CreateTexture {
            texture,
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn read_texture(&mut self, texture: TextureHandle) -> BackendResult<Vec<u8>> {
        if self.unbarriered.contains(&texture.0) {
            return Err(BackendError::UnbarrieredImage(texture.0));
        }
        Ok(self.texture(texture)?.data.clone())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.unbarriered.remove(&texture.0);
            self.commands.push(Command::DestroyTexture(texture));
        }
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        log::trace!(
            "DummyBackend: creating compute pipeline {:?} ({} via {})",
            desc.label,
            desc.entry_point,
            self.kernel.name()
        );
        let pipeline = ComputePipelineHandle(self.next_pipeline_id);
        self.next_pipeline_id += 1;
        self.pipelines.insert(pipeline.0, self.kernel.clone());
        self.commands.push(Command::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        if self.pipelines.remove(&pipeline.0).is_some() {
            self.commands.push(Command::DestroyPipeline(pipeline));
        }
    }

    fn bind_buffer(&mut self, point: BindingPoint, buffer: BufferHandle) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "buffer",
                id: buffer.0,
            });
        }
        self.bound_buffers.insert(point, buffer);
        self.commands.push(Command::BindBuffer { point, buffer });
        Ok(())
    }

    fn unbind_buffer(&mut self, point: BindingPoint) {
        self.bound_buffers.remove(&point);
        self.commands.push(Command::UnbindBuffer(point));
    }

    fn bind_image(
        &mut self,
        unit: u32,
        texture: TextureHandle,
        access: StorageAccess,
    ) -> BackendResult<()> {
        self.texture(texture)?;
        self.bound_images.insert(unit, (texture, access));
        self.commands.push(Command::BindImage {
            unit,
            texture,
            access,
        });
        Ok(())
    }

    fn unbind_image(&mut self, unit: u32) {
        self.bound_images.remove(&unit);
        self.commands.push(Command::UnbindImage(unit));
    }

    fn set_compute_pipeline(&mut self, pipeline: Option<ComputePipelineHandle>) -> BackendResult<()> {
        if let Some(handle) = pipeline {
            if !self.pipelines.contains_key(&handle.0) {
                return Err(BackendError::InvalidHandle {
                    kind: "compute pipeline",
                    id: handle.0,
                });
            }
        }
        self.pipeline = pipeline;
        self.commands.push(Command::SetPipeline(pipeline));
        Ok(())
    }

    fn set_kernel_params(&mut self, params: &KernelParams) {
        self.params = *params;
        self.commands.push(Command::SetKernelParams(*params));
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> BackendResult<()> {
        let kernel = self
            .pipeline
            .and_then(|handle| self.pipelines.get(&handle.0))
            .cloned()
            .ok_or_else(|| BackendError::MissingBinding("no compute pipeline".into()))?;

        let unit = kernel_image_unit(&self.params)?;
        let (texture, access) = self
            .bound_images
            .get(&unit)
            .copied()
            .ok_or_else(|| BackendError::MissingBinding(format!("image unit {unit}")))?;
        if !access.writes() {
            return Err(BackendError::MissingBinding(format!(
                "image unit {unit} is bound read-only"
            )));
        }

        let (width, height) = {
            let image = self.texture(texture)?;
            (image.width, image.height)
        };
        let inputs = self.decode_inputs((width, height))?;

        let image = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;
        for gz in 0..z {
            for gy in 0..y {
                for gx in 0..x {
                    let pixel = kernel.run([gx, gy, gz], &inputs);
                    if gx < width && gy < height {
                        let at = pixel_offset(gx, gy, width);
                        image.data[at..at + 4].copy_from_slice(&pixel);
                    }
                }
            }
        }

        self.invocations += u64::from(x) * u64::from(y) * u64::from(z);
        self.unbarriered.insert(texture.0);
        self.commands.push(Command::Dispatch { x, y, z });
        Ok(())
    }

    fn memory_barrier(&mut self, scope: BarrierScope) {
        if scope.covers_images() {
            self.unbarriered.clear();
        }
        self.commands.push(Command::Barrier(scope));
    }

    fn blit_to_surface(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        filter: FilterMode,
    ) -> BackendResult<()> {
        if !self.frame_in_flight {
            return Err(BackendError::NoFrame);
        }
        if self.unbarriered.contains(&texture.0) {
            return Err(BackendError::UnbarrieredImage(texture.0));
        }

        let image = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let source = Sampler {
            data: &image.data,
            width: image.width,
            height: image.height,
            rect: src,
        };

        let mut surface = std::mem::take(&mut self.surface);
        if !src.is_empty() {
            let x_end = (dst.x + dst.width).min(self.surface_width);
            let y_end = (dst.y + dst.height).min(self.surface_height);
            for sy in dst.y..y_end {
                for sx in dst.x..x_end {
                    // destination pixel centre in source pixels
                    let u = src.x as f32
                        + ((sx - dst.x) as f32 + 0.5) * src.width as f32 / dst.width as f32;
                    let v = src.y as f32
                        + ((sy - dst.y) as f32 + 0.5) * src.height as f32 / dst.height as f32;
                    let pixel = match filter {
                        FilterMode::Nearest => source.nearest(u, v),
                        FilterMode::Linear => source.bilinear(u, v),
                    };
                    let at = pixel_offset(sx, sy, self.surface_width);
                    surface[at..at + 4].copy_from_slice(&pixel);
                }
            }
        }
        self.surface = surface;

        self.commands.push(Command::Blit {
            texture,
            src,
            dst,
            filter,
        });
        Ok(())
    }
}

/// Clamp-to-edge reads restricted to a source rectangle
struct Sampler<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    rect: Rect,
}

impl Sampler<'_> {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let max_x = (self.rect.x + self.rect.width).min(self.width) as i64 - 1;
        let max_y = (self.rect.y + self.rect.height).min(self.height) as i64 - 1;
        let x = x.clamp(self.rect.x as i64, max_x.max(0)) as usize;
        let y = y.clamp(self.rect.y as i64, max_y.max(0)) as usize;
        let at = (y * self.width as usize + x) * 4;
        let mut out = [0.0; 4];
        for (o, b) in out.iter_mut().zip(&self.data[at..at + 4]) {
            *o = *b as f32;
        }
        out
    }

    fn nearest(&self, u: f32, v: f32) -> [u8; 4] {
        self.texel(u.floor() as i64, v.floor() as i64).map(|c| c as u8)
    }

    fn bilinear(&self, u: f32, v: f32) -> [u8; 4] {
        let x = u - 0.5;
        let y = v - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);

        let mut out = [0u8; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

const HIT_EPSILON: f32 = 1e-4;

/// Distance along `dir` to the first hit of `sphere` in front of `origin`
fn intersect(origin: Vec3, dir: Vec3, sphere: &Sphere) -> Option<f32> {
    let oc = origin - sphere.center;
    let b = dot(oc, dir);
    let c = dot(oc, oc) - sphere.radius * sphere.radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    let near = -b - s;
    let t = if near > HIT_EPSILON { near } else { -b + s };
    (t > HIT_EPSILON).then_some(t)
}

fn raycast_pixel([x, y, _]: [u32; 3], inputs: &KernelInputs) -> [u8; 4] {
    let (width, height) = inputs.image_size;
    let camera = &inputs.camera;

    let aspect = width as f32 / height as f32;
    let u = (2.0 * (x as f32 + 0.5) / width as f32 - 1.0) * aspect;
    let v = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
    let point = camera.origin + camera.right * u + camera.up * v;
    let dir = normalize(point - camera.position);

    let sphere_count = (inputs.params.sphere_count.max(0) as usize).min(inputs.spheres.len());
    let hit = inputs.spheres[..sphere_count]
        .iter()
        .filter_map(|sphere| intersect(camera.position, dir, sphere).map(|t| (t, sphere)))
        .min_by(|a, b| a.0.total_cmp(&b.0));

    let Some((t, sphere)) = hit else {
        return to_rgba8(BACKGROUND);
    };
    if inputs.materials.is_empty() {
        return to_rgba8(BACKGROUND);
    }

    let point = camera.position + dir * t;
    let normal = normalize(point - sphere.center);
    let view = -dir;
    let index = (sphere.material_index.max(0) as usize)
        .min(MATERIAL_CAPACITY - 1)
        .min(inputs.materials.len() - 1);
    let material = &inputs.materials[index];

    let light_count = (inputs.params.light_count.max(0) as usize)
        .min(LIGHT_CAPACITY)
        .min(inputs.lights.len());
    let mut color = Vec3::ZERO;
    for light in &inputs.lights[..light_count] {
        let to_light = normalize(light.position.truncate() - point * light.position.w);
        color += light.ambient.truncate() * material.ambient.truncate();

        let diffuse = dot(normal, to_light).max(0.0);
        color += light.diffuse.truncate() * material.diffuse.truncate() * diffuse;

        if diffuse > 0.0 {
            let half = normalize(to_light + view);
            let specular = dot(normal, half).max(0.0).powf(material.shininess);
            color += light.specular.truncate() * material.specular.truncate() * specular;
        }
    }

    to_rgba8(color.extend(1.0))
}

fn to_rgba8(color: Vec4) -> [u8; 4] {
    color
        .to_array()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_image(kernel: CpuKernel, width: u32, height: u32) -> (DummyBackend, TextureHandle) {
        let mut backend = DummyBackend::with_kernel(width, height, kernel);
        let texture = backend
            .create_texture(&TextureDescriptor {
                label: None,
                width,
                height,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::STORAGE_BINDING | TextureUsage::COPY_SRC,
            })
            .unwrap();
        (backend, texture)
    }

    #[test]
    fn write_buffer_rejects_overrun() {
        let mut backend = DummyBackend::new(4, 4);
        let desc = BufferDescriptor {
            label: None,
            size: 16,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        };
        let buffer = backend.create_buffer_init(&desc, &[0; 16]).unwrap();

        backend.write_buffer(buffer, 8, &[1; 8]).unwrap();
        assert!(matches!(
            backend.write_buffer(buffer, 12, &[1; 8]),
            Err(BackendError::WriteOutOfBounds { .. })
        ));
        assert_eq!(backend.read_buffer(buffer).unwrap()[8..], [1; 8]);
    }

    #[test]
    fn dispatch_without_bindings_fails() {
        let (mut backend, texture) = backend_with_image(CpuKernel::stamp_coordinates(), 2, 2);
        let pipeline = backend
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: None,
                shader: String::new(),
                entry_point: "main".into(),
            })
            .unwrap();

        assert!(matches!(
            backend.dispatch_compute(2, 2, 1),
            Err(BackendError::MissingBinding(_))
        ));

        backend.set_compute_pipeline(Some(pipeline)).unwrap();
        backend.bind_image(0, texture, StorageAccess::WriteOnly).unwrap();
        let err = backend.dispatch_compute(2, 2, 1).unwrap_err();
        assert!(err.to_string().contains("Camera"), "{err}");
    }

    #[test]
    fn blit_copies_and_scales() {
        let (mut backend, texture) = backend_with_image(CpuKernel::stamp_coordinates(), 2, 1);
        backend.textures.get_mut(&texture.0).unwrap().data = vec![0, 0, 0, 255, 200, 100, 50, 255];

        backend.begin_frame().unwrap();
        backend
            .blit_to_surface(texture, Rect::from_size(2, 1), Rect::from_size(2, 1), FilterMode::Nearest)
            .unwrap();
        assert_eq!(&backend.surface_pixels()[..8], &[0, 0, 0, 255, 200, 100, 50, 255]);

        backend.resize(4, 1);
        backend
            .blit_to_surface(texture, Rect::from_size(2, 1), Rect::from_size(4, 1), FilterMode::Linear)
            .unwrap();
        let row = backend.surface_pixels();
        // outer pixels clamp to the edge texels, inner ones blend
        assert_eq!(&row[0..4], &[0, 0, 0, 255]);
        assert_eq!(&row[12..16], &[200, 100, 50, 255]);
        assert_eq!(&row[4..8], &[50, 25, 13, 255]);
    }

    #[test]
    fn blit_outside_frame_fails() {
        let (mut backend, texture) = backend_with_image(CpuKernel::stamp_coordinates(), 2, 2);
        assert!(matches!(
            backend.blit_to_surface(texture, Rect::from_size(2, 2), Rect::from_size(2, 2), FilterMode::Nearest),
            Err(BackendError::NoFrame)
        ));
    }

    #[test]
    fn dispatch_rejects_foreign_image_unit() {
        let (mut backend, texture) = backend_with_image(CpuKernel::stamp_coordinates(), 2, 2);
        let pipeline = backend
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: None,
                shader: String::new(),
                entry_point: "main".into(),
            })
            .unwrap();
        backend.set_compute_pipeline(Some(pipeline)).unwrap();
        backend.bind_image(3, texture, StorageAccess::WriteOnly).unwrap();
        backend.set_kernel_params(&KernelParams::new(2, 2, 3));

        let err = backend.dispatch_compute(2, 2, 1).unwrap_err();
        assert!(matches!(err, BackendError::MissingBinding(_)));
        assert!(err.to_string().contains("output unit"), "{err}");
        assert_eq!(backend.invocation_count(), 0);
    }

    #[test]
    fn oversized_texture_is_refused() {
        let mut backend = DummyBackend::new(4, 4);
        let err = backend
            .create_texture(&TextureDescriptor {
                label: None,
                width: MAX_TEXTURE_DIMENSION + 1,
                height: 4,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, BackendError::TextureCreationFailed(_)));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn timed_out_acquire_opens_no_frame() {
        let mut backend = DummyBackend::new(4, 4);
        backend.fail_next_acquires(1);

        let err = backend.begin_frame().unwrap_err();
        assert!(err.skips_frame());
        assert!(matches!(backend.end_frame(), Err(BackendError::NoFrame)));

        backend.begin_frame().unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.frames_presented(), 1);
    }

    #[test]
    fn pixel_offsets_do_not_wrap_on_large_extents() {
        assert_eq!(pixel_offset(3, 2, 10), 92);
        assert_eq!(pixel_offset(0, 70_000, 70_000), 70_000 * 70_000 * 4);
    }

    #[test]
    fn intersect_reports_nearest_front_hit() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0, 0);
        let t = intersect(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), &sphere).unwrap();
        assert!((t - 4.0).abs() < 1e-5);

        // origin inside the sphere hits the far side
        let t = intersect(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, -1.0), &sphere).unwrap();
        assert!((t - 1.0).abs() < 1e-5);

        assert!(intersect(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0), &sphere).is_none());
        assert!(intersect(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), &sphere).is_none());
    }
}

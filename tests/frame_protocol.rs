//! Per-frame protocol tests against the CPU-emulated backend.
//!
//! Each test drives a [`Renderer`] over [`DummyBackend`], which keeps buffer
//! and image bytes in host memory, runs a CPU kernel over the dispatch grid
//! and records every backend call.
//!
//! ```bash
//! cargo test --test frame_protocol
//! ```

mod common;

use glam::Vec4;
use rstest::{fixture, rstest};

use common::{pixel, renderer_with, stamped, writes, BACKGROUND_RGBA8, HEIGHT, WIDTH};
use sphere_raycast::backend::dummy::{Command, CpuKernel, DummyBackend, MAX_TEXTURE_DIMENSION};
use sphere_raycast::backend::{
    BarrierScope, BackendError, FilterMode, GraphicsBackend, Rect, StorageAccess,
};
use sphere_raycast::pipeline::{BindingPoint, OUTPUT_IMAGE_UNIT};
use sphere_raycast::scene::{
    CameraEdit, Collection, EditSet, LightEdit, MaterialEdit, SceneError,
};
use sphere_raycast::{KernelSourceId, RaycastError, Renderer, SceneStore};

#[fixture]
fn renderer() -> Renderer<DummyBackend> {
    renderer_with(CpuKernel::raycast(), WIDTH, HEIGHT)
}

// ============================================================================
// Dispatch
// ============================================================================

/// Every pixel is written exactly by the invocation with its own coordinate.
#[rstest]
#[case::sample_size(WIDTH, HEIGHT)]
#[case::single_pixel(1, 1)]
#[case::odd_size(17, 3)]
fn test_dispatch_covers_every_pixel_once(#[case] width: u32, #[case] height: u32) {
    let mut renderer = renderer_with(CpuKernel::stamp_coordinates(), width, height);
    renderer.frame(&EditSet::new()).unwrap();

    assert_eq!(
        renderer.backend().invocation_count(),
        u64::from(width) * u64::from(height)
    );
    assert!(renderer.backend().commands().contains(&Command::Dispatch {
        x: width,
        y: height,
        z: 1
    }));

    let image = renderer.read_output().unwrap();
    assert_eq!(image.len(), (width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            assert_eq!(stamped(pixel(&image, width, x, y)), (x, y));
        }
    }
}

/// Bind, dispatch, barrier and unbind happen in that order, before the blit.
#[rstest]
fn test_frame_command_order(mut renderer: Renderer<DummyBackend>) {
    renderer.backend_mut().take_commands();
    renderer.frame(&EditSet::new()).unwrap();

    let commands = renderer.backend_mut().take_commands();
    let kinds: Vec<&str> = commands
        .iter()
        .map(|c| match c {
            Command::BindBuffer { .. } => "bind_buffer",
            Command::SetPipeline(Some(_)) => "set_pipeline",
            Command::SetPipeline(None) => "clear_pipeline",
            Command::SetKernelParams(_) => "params",
            Command::BindImage { .. } => "bind_image",
            Command::Dispatch { .. } => "dispatch",
            Command::Barrier(_) => "barrier",
            Command::UnbindImage(_) => "unbind_image",
            Command::UnbindBuffer(_) => "unbind_buffer",
            Command::BeginFrame => "begin_frame",
            Command::Blit { .. } => "blit",
            Command::EndFrame => "end_frame",
            other => panic!("unexpected command {other:?}"),
        })
        .collect();

    assert_eq!(
        kinds,
        [
            "bind_buffer",
            "bind_buffer",
            "bind_buffer",
            "bind_buffer",
            "set_pipeline",
            "params",
            "bind_image",
            "dispatch",
            "barrier",
            "unbind_image",
            "clear_pipeline",
            "unbind_buffer",
            "unbind_buffer",
            "unbind_buffer",
            "unbind_buffer",
            "begin_frame",
            "blit",
            "end_frame",
        ]
    );

    assert!(commands.contains(&Command::Barrier(BarrierScope::ImageAccess)));
    assert!(commands.iter().any(|c| matches!(
        c,
        Command::BindImage {
            unit: OUTPUT_IMAGE_UNIT,
            access: StorageAccess::WriteOnly,
            ..
        }
    )));
    let params = commands.iter().find_map(|c| match c {
        Command::SetKernelParams(params) => Some(*params),
        _ => None,
    });
    let params = params.unwrap();
    assert_eq!(params.light_count, 2);
    assert_eq!(params.sphere_count, 2);
    assert_eq!(params.image_unit, OUTPUT_IMAGE_UNIT as i32);
}

/// Each binding point holds the buffer mirroring its collection.
#[rstest]
fn test_buffers_bound_to_kernel_slots(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();

    let bound: Vec<_> = renderer
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::BindBuffer { point, buffer } => Some((*point, *buffer)),
            _ => None,
        })
        .collect();
    assert_eq!(bound.len(), BindingPoint::ALL.len());

    for collection in Collection::ALL {
        let point = BindingPoint::from(collection);
        let (_, buffer) = bound
            .iter()
            .find(|(p, _)| *p == point)
            .unwrap_or_else(|| panic!("{point:?} not bound"));
        let device = renderer.backend_mut().read_buffer(*buffer).unwrap();
        assert_eq!(device, renderer.scene().bytes(collection), "{collection:?}");
    }
}

// ============================================================================
// Barrier
// ============================================================================

/// An image written by a dispatch cannot be read or blitted before a barrier.
#[test]
fn test_unbarriered_image_is_refused() {
    common::init_logging();
    let mut renderer = renderer_with(CpuKernel::raycast(), 8, 8);
    renderer.frame(&EditSet::new()).unwrap();

    // Re-run the dispatch by hand, leaving out the barrier.
    let backend = renderer.backend_mut();
    let commands = backend.take_commands();
    let image = commands
        .iter()
        .find_map(|c| match c {
            Command::BindImage { texture, .. } => Some(*texture),
            _ => None,
        })
        .unwrap();
    let pipeline = commands
        .iter()
        .find_map(|c| match c {
            Command::SetPipeline(Some(pipeline)) => Some(*pipeline),
            _ => None,
        })
        .unwrap();
    let buffers: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::BindBuffer { point, buffer } => Some((*point, *buffer)),
            _ => None,
        })
        .collect();

    for (point, buffer) in &buffers {
        backend.bind_buffer(*point, *buffer).unwrap();
    }
    backend.set_compute_pipeline(Some(pipeline)).unwrap();
    backend
        .bind_image(OUTPUT_IMAGE_UNIT, image, StorageAccess::WriteOnly)
        .unwrap();
    backend.dispatch_compute(8, 8, 1).unwrap();

    assert!(matches!(
        backend.read_texture(image),
        Err(BackendError::UnbarrieredImage(_))
    ));
    backend.begin_frame().unwrap();
    let full = Rect::from_size(8, 8);
    assert!(matches!(
        backend.blit_to_surface(image, full, full, FilterMode::Nearest),
        Err(BackendError::UnbarrieredImage(_))
    ));

    backend.memory_barrier(BarrierScope::ImageAccess);
    assert!(backend.read_texture(image).is_ok());
}

// ============================================================================
// Buffer synchronisation
// ============================================================================

/// With no edits, two frames produce the same image and surface bytes.
#[rstest]
fn test_frames_without_edits_are_identical(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    let first_image = renderer.read_output().unwrap();
    let first_surface = renderer.backend().surface_pixels().to_vec();

    renderer.backend_mut().take_commands();
    renderer.frame(&EditSet::new()).unwrap();
    let second_image = renderer.read_output().unwrap();

    assert_eq!(first_image, second_image);
    assert_eq!(first_surface, renderer.backend().surface_pixels());
    assert!(writes(renderer.backend().commands()).is_empty());
}

/// Editing one light field re-sends the lights and nothing else.
#[rstest]
fn test_light_edit_only_touches_lights(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    let camera_before = renderer.read_collection(Collection::Camera).unwrap();
    let materials_before = renderer.read_collection(Collection::Materials).unwrap();
    let spheres_before = renderer.read_collection(Collection::Spheres).unwrap();

    let mut edits = EditSet::new();
    edits.light(1, LightEdit::Diffuse(Vec4::new(0.0, 1.0, 0.0, 0.0)));
    renderer.apply_edits(&edits).unwrap();

    let dirty = renderer.scene().dirty();
    assert!(dirty.lights);
    assert!(!dirty.camera);
    assert!(!dirty.materials);

    renderer.backend_mut().take_commands();
    renderer.frame(&EditSet::new()).unwrap();

    let uploads = writes(renderer.backend().commands());
    let lights_len = renderer.scene().bytes(Collection::Lights).len();
    assert_eq!(uploads.len(), 1);
    assert_eq!((uploads[0].1, uploads[0].2), (0, lights_len));

    assert_eq!(renderer.read_collection(Collection::Camera).unwrap(), camera_before);
    assert_eq!(renderer.read_collection(Collection::Materials).unwrap(), materials_before);
    assert_eq!(renderer.read_collection(Collection::Spheres).unwrap(), spheres_before);
    assert!(!renderer.scene().dirty().any());
}

/// A shininess edit re-sends the whole material array, which then reads back
/// equal to the host copy.
#[rstest]
fn test_material_edit_resends_whole_collection(mut renderer: Renderer<DummyBackend>) {
    renderer.backend_mut().take_commands();

    let mut edits = EditSet::new();
    edits.material(1, MaterialEdit::Shininess(32.0));
    renderer.frame(&edits).unwrap();

    let materials = renderer.scene().bytes(Collection::Materials).to_vec();
    let uploads = writes(renderer.backend().commands());
    assert_eq!(uploads.len(), 1);
    assert_eq!((uploads[0].1, uploads[0].2), (0, materials.len()));

    assert_eq!(renderer.read_collection(Collection::Materials).unwrap(), materials);
    assert_eq!(renderer.scene().materials()[1].shininess, 32.0);
}

/// Camera edits reach the kernel on the next frame.
#[rstest]
fn test_camera_edit_changes_image(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    let before = renderer.read_output().unwrap();

    let mut edits = EditSet::new();
    edits.camera(CameraEdit::Eye(glam::Vec3::new(0.0, 0.0, 6.0)));
    renderer.frame(&edits).unwrap();

    assert_eq!(
        renderer.read_collection(Collection::Camera).unwrap(),
        renderer.scene().bytes(Collection::Camera)
    );
    assert_ne!(renderer.read_output().unwrap(), before);
}

/// Rejected edits leave the scene clean and the device untouched.
#[rstest]
fn test_rejected_edits_do_not_upload(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    renderer.backend_mut().take_commands();

    let mut edits = EditSet::new();
    edits.light(7, LightEdit::Ambient(Vec4::ONE));
    let err = renderer.frame(&edits).unwrap_err();
    assert!(matches!(
        err,
        RaycastError::Scene(SceneError::IndexOutOfRange { index: 7, .. })
    ));

    let mut edits = EditSet::new();
    edits.camera(CameraEdit::Up(glam::Vec3::new(0.0, 0.0, -1.0)));
    assert!(matches!(
        renderer.apply_edits(&edits),
        Err(RaycastError::Scene(SceneError::DegenerateCamera { .. }))
    ));

    assert!(!renderer.scene().dirty().any());
    renderer.frame(&EditSet::new()).unwrap();
    assert!(writes(renderer.backend().commands()).is_empty());
}

// ============================================================================
// Image contents
// ============================================================================

/// Corners miss both spheres; a ray through the near sphere's centre hits it.
#[rstest]
fn test_sample_scene_shading(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    let image = renderer.read_output().unwrap();

    assert_eq!(pixel(&image, WIDTH, 0, 0), BACKGROUND_RGBA8);
    assert_eq!(pixel(&image, WIDTH, WIDTH - 1, 0), BACKGROUND_RGBA8);

    // Screen position of the near sphere's centre, material 1 (blue).
    let hit = pixel(&image, WIDTH, 324, 270);
    assert_ne!(hit, BACKGROUND_RGBA8);
    assert!(hit[2] > hit[0], "expected a blue sphere, got {hit:?}");

    let mut edits = EditSet::new();
    edits.material(1, MaterialEdit::Ambient(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    edits.material(1, MaterialEdit::Diffuse(Vec4::new(1.0, 0.0, 0.0, 0.0)));
    renderer.frame(&edits).unwrap();
    let image = renderer.read_output().unwrap();
    let recoloured = pixel(&image, WIDTH, 324, 270);
    assert!(recoloured[0] > recoloured[2], "expected a red sphere, got {recoloured:?}");
}

// ============================================================================
// Presentation
// ============================================================================

#[rstest]
#[case::same_size(WIDTH, HEIGHT, FilterMode::Nearest)]
#[case::larger_window(1280, 720, FilterMode::Linear)]
#[case::smaller_window(480, 270, FilterMode::Linear)]
fn test_blit_filter_follows_surface_size(
    mut renderer: Renderer<DummyBackend>,
    #[case] surface_width: u32,
    #[case] surface_height: u32,
    #[case] filter: FilterMode,
) {
    renderer.resize(surface_width, surface_height);
    renderer.backend_mut().take_commands();
    renderer.frame(&EditSet::new()).unwrap();

    assert!(renderer.backend().commands().iter().any(|c| matches!(
        c,
        Command::Blit { src, dst, filter: f, .. }
            if *src == Rect::from_size(WIDTH, HEIGHT)
                && *dst == Rect::from_size(surface_width, surface_height)
                && *f == filter
    )));
    assert_eq!(renderer.image_size(), (WIDTH, HEIGHT));
}

/// A 1:1 blit copies the image into the surface unchanged.
#[rstest]
fn test_same_size_blit_copies_image(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    let image = renderer.read_output().unwrap();
    assert_eq!(renderer.backend().surface_pixels(), image.as_slice());
}

/// A timed-out acquire skips presentation for that frame only.
#[rstest]
fn test_timed_out_acquire_skips_one_frame(mut renderer: Renderer<DummyBackend>) {
    renderer.backend_mut().fail_next_acquires(1);

    assert_eq!(renderer.frame(&EditSet::new()).unwrap(), None);
    assert_eq!(renderer.backend().frames_presented(), 0);
    assert_eq!(renderer.dispatches(), 1);
    assert!(renderer.present().is_err());

    for _ in 0..3 {
        let frame = renderer.frame(&EditSet::new()).unwrap();
        assert_eq!(frame.map(|f| (f.width, f.height)), Some((WIDTH, HEIGHT)));
    }
    assert_eq!(renderer.backend().frames_presented(), 3);
    assert_eq!(renderer.dispatches(), 4);
    let image = renderer.read_output().unwrap();
    assert_eq!(renderer.backend().surface_pixels(), image.as_slice());
}

// ============================================================================
// Startup
// ============================================================================

/// An image beyond the device's texture limit fails startup with a device error.
#[rstest]
#[case::too_wide(20_000, HEIGHT)]
#[case::too_tall(WIDTH, MAX_TEXTURE_DIMENSION + 1)]
fn test_oversized_image_is_a_device_error(#[case] width: u32, #[case] height: u32) {
    common::init_logging();
    let result = Renderer::new(
        DummyBackend::new(WIDTH, HEIGHT),
        SceneStore::default(),
        &KernelSourceId::Embedded,
        width,
        height,
    );
    assert!(matches!(
        result,
        Err(RaycastError::Backend(BackendError::TextureCreationFailed(_)))
    ));
}

// ============================================================================
// Shutdown
// ============================================================================

/// Shutdown releases every device object, newest first, and only once.
#[rstest]
fn test_shutdown_releases_everything(mut renderer: Renderer<DummyBackend>) {
    renderer.frame(&EditSet::new()).unwrap();
    renderer.backend_mut().take_commands();

    renderer.shutdown();
    let commands = renderer.backend_mut().take_commands();
    let order: Vec<&str> = commands
        .iter()
        .map(|c| match c {
            Command::DestroyTexture(_) => "texture",
            Command::DestroyBuffer(_) => "buffer",
            Command::DestroyPipeline(_) => "kernel",
            other => panic!("unexpected command {other:?}"),
        })
        .collect();
    assert_eq!(order, ["texture", "buffer", "buffer", "buffer", "buffer", "kernel"]);

    let backend = renderer.backend();
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_pipelines(), 0);

    renderer.shutdown();
    assert!(renderer.backend().commands().is_empty());
    assert!(matches!(
        renderer.frame(&EditSet::new()),
        Err(RaycastError::ShutDown)
    ));
}

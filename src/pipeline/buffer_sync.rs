//! Host to device synchronisation of the scene collections.
//!
//! One device buffer per [`Collection`], created once with the full initial
//! contents. After that a collection is re-sent only while its dirty flag is
//! set, and then always as a whole.

use crate::backend::{BackendResult, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::pipeline::bindings::BindingPoint;
use crate::scene::{Collection, SceneStore, Sphere};

/// How much of a dirty collection is sent to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Overwrite the whole buffer on any change
    #[default]
    WholeCollection,
}

impl UploadPolicy {
    /// Byte offset and payload to write for `bytes`
    pub fn upload_range<'a>(&self, bytes: &'a [u8]) -> (u64, &'a [u8]) {
        match self {
            UploadPolicy::WholeCollection => (0, bytes),
        }
    }
}

/// Device buffers mirroring the scene collections
#[derive(Debug)]
pub struct SceneBuffers {
    camera: BufferHandle,
    lights: BufferHandle,
    materials: BufferHandle,
    spheres: BufferHandle,
    policy: UploadPolicy,
}

/// Creation order; destruction runs in reverse
const CREATION_ORDER: [Collection; 4] = [
    Collection::Camera,
    Collection::Lights,
    Collection::Materials,
    Collection::Spheres,
];

impl SceneBuffers {
    /// Allocate and fill one buffer per collection
    pub fn create<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        scene: &SceneStore,
    ) -> BackendResult<Self> {
        let mut created: Vec<BufferHandle> = Vec::with_capacity(CREATION_ORDER.len());
        for collection in CREATION_ORDER {
            match Self::create_buffer(backend, scene, collection) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    for handle in created.into_iter().rev() {
                        backend.destroy_buffer(handle);
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self {
            camera: created[0],
            lights: created[1],
            materials: created[2],
            spheres: created[3],
            policy: UploadPolicy::default(),
        })
    }

    /// Allocate a buffer sized to `collection` and upload its bytes
    pub fn create_buffer<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        scene: &SceneStore,
        collection: Collection,
    ) -> BackendResult<BufferHandle> {
        let point = BindingPoint::from(collection);
        let block = if point.is_storage() {
            BufferUsage::STORAGE
        } else {
            BufferUsage::UNIFORM
        };
        let usage = block | BufferUsage::COPY_DST | BufferUsage::COPY_SRC;

        // A storage binding cannot be empty; an empty sphere list still gets
        // one zeroed record, and the kernel's sphere count keeps it unread.
        let placeholder = [0u8; std::mem::size_of::<Sphere>()];
        let bytes = match scene.bytes(collection) {
            [] if collection == Collection::Spheres => &placeholder[..],
            bytes => bytes,
        };

        let handle = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{collection:?} Buffer")),
                size: bytes.len() as u64,
                usage,
            },
            bytes,
        )?;
        log::debug!(
            "Created {collection:?} buffer {} ({} bytes, binding {})",
            handle.id(),
            bytes.len(),
            point.index()
        );
        Ok(handle)
    }

    pub fn handle(&self, collection: Collection) -> BufferHandle {
        match collection {
            Collection::Camera => self.camera,
            Collection::Lights => self.lights,
            Collection::Materials => self.materials,
            Collection::Spheres => self.spheres,
        }
    }

    /// Re-send `collection` if it changed since the last upload.
    ///
    /// The dirty flag is cleared only once the write succeeded. Returns
    /// whether an upload happened.
    pub fn sync_if_dirty<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        scene: &mut SceneStore,
        collection: Collection,
    ) -> BackendResult<bool> {
        if !scene.is_dirty(collection) {
            return Ok(false);
        }

        let (offset, bytes) = self.policy.upload_range(scene.bytes(collection));
        backend.write_buffer(self.handle(collection), offset, bytes)?;
        log::debug!("Uploaded {collection:?} ({} bytes)", bytes.len());
        scene.clear_dirty(collection);
        Ok(true)
    }

    /// Sync every dirty collection, returning how many were uploaded
    pub fn sync_all<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        scene: &mut SceneStore,
    ) -> BackendResult<usize> {
        let mut uploaded = 0;
        for collection in Collection::ALL {
            if self.sync_if_dirty(backend, scene, collection)? {
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }

    pub fn bind<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        collection: Collection,
    ) -> BackendResult<()> {
        backend.bind_buffer(BindingPoint::from(collection), self.handle(collection))
    }

    pub fn unbind<B: GraphicsBackend + ?Sized>(backend: &mut B, collection: Collection) {
        backend.unbind_buffer(BindingPoint::from(collection));
    }

    /// Attach all four buffers to their binding points
    pub fn bind_all<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<()> {
        for point in BindingPoint::ALL {
            backend.bind_buffer(point, self.handle_at(point))?;
        }
        Ok(())
    }

    pub fn unbind_all<B: GraphicsBackend + ?Sized>(backend: &mut B) {
        for point in BindingPoint::ALL {
            backend.unbind_buffer(point);
        }
    }

    fn handle_at(&self, point: BindingPoint) -> BufferHandle {
        match point {
            BindingPoint::Spheres => self.spheres,
            BindingPoint::Camera => self.camera,
            BindingPoint::Lights => self.lights,
            BindingPoint::Materials => self.materials,
        }
    }

    /// Release every buffer, newest first
    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for collection in CREATION_ORDER.into_iter().rev() {
            let handle = self.handle(collection);
            backend.destroy_buffer(handle);
            log::debug!("Destroyed {collection:?} buffer {}", handle.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{Command, DummyBackend};
    use crate::scene::{LightEdit, MaterialEdit};
    use glam::Vec4;

    fn setup() -> (DummyBackend, SceneStore, SceneBuffers) {
        let mut backend = DummyBackend::new(8, 8);
        let scene = SceneStore::default();
        let buffers = SceneBuffers::create(&mut backend, &scene).unwrap();
        (backend, scene, buffers)
    }

    #[test]
    fn test_create_uploads_initial_contents() {
        let (mut backend, scene, buffers) = setup();
        assert_eq!(backend.live_buffers(), 4);
        for collection in Collection::ALL {
            let device = backend.read_buffer(buffers.handle(collection)).unwrap();
            assert_eq!(device, scene.bytes(collection), "{collection:?}");
        }
    }

    #[test]
    fn test_clean_collection_is_not_sent() {
        let (mut backend, mut scene, buffers) = setup();
        backend.take_commands();
        assert_eq!(buffers.sync_all(&mut backend, &mut scene).unwrap(), 0);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_dirty_collection_is_sent_whole() {
        let (mut backend, mut scene, buffers) = setup();
        scene
            .edit_material(1, MaterialEdit::Shininess(12.0))
            .unwrap();
        backend.take_commands();

        assert!(buffers
            .sync_if_dirty(&mut backend, &mut scene, Collection::Materials)
            .unwrap());
        assert_eq!(
            backend.commands(),
            &[Command::WriteBuffer {
                buffer: buffers.handle(Collection::Materials),
                offset: 0,
                len: scene.bytes(Collection::Materials).len(),
            }]
        );
        assert!(!scene.is_dirty(Collection::Materials));
    }

    #[test]
    fn test_failed_upload_keeps_flag() {
        let (mut backend, mut scene, buffers) = setup();
        scene
            .edit_light(0, LightEdit::Ambient(Vec4::ONE))
            .unwrap();
        let handle = buffers.handle(Collection::Lights);
        backend.destroy_buffer(handle);

        assert!(buffers
            .sync_if_dirty(&mut backend, &mut scene, Collection::Lights)
            .is_err());
        assert!(scene.is_dirty(Collection::Lights));
    }

    #[test]
    fn test_empty_sphere_list_gets_a_placeholder_record() {
        let mut backend = DummyBackend::new(8, 8);
        let defaults = SceneStore::default();
        let scene = SceneStore::new(
            *defaults.camera_params(),
            *defaults.lights(),
            *defaults.materials(),
            Vec::new(),
        )
        .unwrap();
        let buffers = SceneBuffers::create(&mut backend, &scene).unwrap();
        let device = backend.read_buffer(buffers.handle(Collection::Spheres)).unwrap();
        assert_eq!(device.len(), std::mem::size_of::<Sphere>());
    }

    #[test]
    fn test_destroy_releases_in_reverse_order() {
        let (mut backend, _scene, buffers) = setup();
        let expected: Vec<_> = CREATION_ORDER
            .iter()
            .rev()
            .map(|c| Command::DestroyBuffer(buffers.handle(*c)))
            .collect();
        backend.take_commands();
        buffers.destroy(&mut backend);
        assert_eq!(backend.commands(), expected.as_slice());
        assert_eq!(backend.live_buffers(), 0);
    }
}

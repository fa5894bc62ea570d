//! CPU-side owner of the scene collections and their dirty state

use thiserror::Error;

use super::camera::{CameraFrame, CameraParams};
use super::edit::{CameraEdit, EditSet, LightEdit, MaterialEdit, SceneEdit};
use super::light::{default_lights, Light, LIGHT_CAPACITY};
use super::material::{default_materials, Material, MATERIAL_CAPACITY};
use super::sphere::{default_spheres, Sphere};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("{collection:?} index {index} out of range (capacity {capacity})")]
    IndexOutOfRange {
        collection: Collection,
        index: usize,
        capacity: usize,
    },
    #[error("sphere {sphere} references material {material_index}, expected 0..{capacity}")]
    InvalidMaterialIndex {
        sphere: usize,
        material_index: i32,
        capacity: usize,
    },
    #[error("sphere {sphere} has radius {radius}, expected a finite value above 0")]
    InvalidSphere { sphere: usize, radius: f32 },
    #[error(
        "material {material} has shininess {shininess}, expected {}..={}",
        Material::MIN_SHININESS,
        Material::MAX_SHININESS
    )]
    InvalidMaterial { material: usize, shininess: f32 },
    #[error("camera frame is degenerate (eye {eye:?}, target {target:?}, up {up:?})")]
    DegenerateCamera {
        eye: glam::Vec3,
        target: glam::Vec3,
        up: glam::Vec3,
    },
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Device-mirrored collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Spheres,
    Camera,
    Lights,
    Materials,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Spheres,
        Collection::Camera,
        Collection::Lights,
        Collection::Materials,
    ];
}

/// One "changed since last upload" bit per editable collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub camera: bool,
    pub lights: bool,
    pub materials: bool,
}

impl DirtyFlags {
    pub fn get(&self, collection: Collection) -> bool {
        match collection {
            Collection::Camera => self.camera,
            Collection::Lights => self.lights,
            Collection::Materials => self.materials,
            // spheres are uploaded once and never edited
            Collection::Spheres => false,
        }
    }

    fn set(&mut self, collection: Collection, value: bool) {
        match collection {
            Collection::Camera => self.camera = value,
            Collection::Lights => self.lights = value,
            Collection::Materials => self.materials = value,
            Collection::Spheres => {}
        }
    }

    pub fn any(&self) -> bool {
        self.camera || self.lights || self.materials
    }
}

/// Scene state: camera, fixed-capacity lights and materials, flat sphere list.
///
/// Out-of-range light or material indices fail fast with
/// [`SceneError::IndexOutOfRange`] and leave the store untouched.
#[derive(Debug, Clone)]
pub struct SceneStore {
    camera_params: CameraParams,
    camera: CameraFrame,
    lights: [Light; LIGHT_CAPACITY],
    materials: [Material; MATERIAL_CAPACITY],
    spheres: Vec<Sphere>,
    dirty: DirtyFlags,
}

impl Default for SceneStore {
    /// The two-sphere, two-light sample scene
    fn default() -> Self {
        let camera_params = CameraParams::default();
        Self {
            camera: camera_params.frame(),
            camera_params,
            lights: default_lights(),
            materials: default_materials(),
            spheres: default_spheres(),
            dirty: DirtyFlags::default(),
        }
    }
}

impl SceneStore {
    /// Store over explicit collections.
    ///
    /// Fails fast on the first record outside its domain: shininess in
    /// `[MIN_SHININESS, MAX_SHININESS]`, a finite radius above zero, a material
    /// index below `MATERIAL_CAPACITY`, and a camera that yields a proper frame.
    pub fn new(
        camera_params: CameraParams,
        lights: [Light; LIGHT_CAPACITY],
        materials: [Material; MATERIAL_CAPACITY],
        spheres: Vec<Sphere>,
    ) -> SceneResult<Self> {
        for (i, material) in materials.iter().enumerate() {
            if !shininess_in_domain(material.shininess) {
                return Err(SceneError::InvalidMaterial {
                    material: i,
                    shininess: material.shininess,
                });
            }
        }

        for (i, sphere) in spheres.iter().enumerate() {
            if !(sphere.radius.is_finite() && sphere.radius > 0.0) {
                return Err(SceneError::InvalidSphere {
                    sphere: i,
                    radius: sphere.radius,
                });
            }
            let in_range = usize::try_from(sphere.material_index)
                .map(|index| index < MATERIAL_CAPACITY)
                .unwrap_or(false);
            if !in_range {
                return Err(SceneError::InvalidMaterialIndex {
                    sphere: i,
                    material_index: sphere.material_index,
                    capacity: MATERIAL_CAPACITY,
                });
            }
        }

        let camera = checked_frame(&camera_params)?;

        Ok(Self {
            camera_params,
            camera,
            lights,
            materials,
            spheres,
            dirty: DirtyFlags::default(),
        })
    }

    pub fn camera_params(&self) -> &CameraParams {
        &self.camera_params
    }

    pub fn camera(&self) -> &CameraFrame {
        &self.camera
    }

    pub fn lights(&self) -> &[Light; LIGHT_CAPACITY] {
        &self.lights
    }

    pub fn materials(&self) -> &[Material; MATERIAL_CAPACITY] {
        &self.materials
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn light(&self, index: usize) -> SceneResult<&Light> {
        self.lights
            .get(index)
            .ok_or_else(|| out_of_range(Collection::Lights, index, LIGHT_CAPACITY))
    }

    pub fn material(&self, index: usize) -> SceneResult<&Material> {
        self.materials
            .get(index)
            .ok_or_else(|| out_of_range(Collection::Materials, index, MATERIAL_CAPACITY))
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn is_dirty(&self, collection: Collection) -> bool {
        self.dirty.get(collection)
    }

    /// Only the buffer sync stage clears flags, after a successful upload
    pub(crate) fn clear_dirty(&mut self, collection: Collection) {
        self.dirty.set(collection, false);
    }

    /// Raw bytes of a collection, laid out exactly as the kernel reads them
    pub fn bytes(&self, collection: Collection) -> &[u8] {
        match collection {
            Collection::Spheres => bytemuck::cast_slice(&self.spheres),
            Collection::Camera => bytemuck::bytes_of(&self.camera),
            Collection::Lights => bytemuck::cast_slice(&self.lights),
            Collection::Materials => bytemuck::cast_slice(&self.materials),
        }
    }

    /// Rebuild the camera frame after one parameter change.
    ///
    /// A change that would collapse the basis is rejected and the previous
    /// camera kept.
    pub fn edit_camera(&mut self, edit: CameraEdit) -> SceneResult<()> {
        let mut params = self.camera_params;
        match edit {
            CameraEdit::Eye(eye) => params.eye = eye,
            CameraEdit::Target(target) => params.target = target,
            CameraEdit::Up(up) => params.up = up,
            CameraEdit::FovY(fovy) => {
                params.fovy_degrees = fovy.clamp(CameraParams::MIN_FOVY, CameraParams::MAX_FOVY)
            }
        }

        let frame = checked_frame(&params).inspect_err(|err| log::warn!("Rejected camera edit: {err}"))?;

        self.camera_params = params;
        self.camera = frame;
        self.dirty.camera = true;
        Ok(())
    }

    pub fn edit_light(&mut self, index: usize, edit: LightEdit) -> SceneResult<()> {
        let light = self
            .lights
            .get_mut(index)
            .ok_or_else(|| out_of_range(Collection::Lights, index, LIGHT_CAPACITY))
            .inspect_err(|err| log::warn!("Rejected light edit: {err}"))?;

        match edit {
            LightEdit::Ambient(v) => light.ambient = v,
            LightEdit::Diffuse(v) => light.diffuse = v,
            LightEdit::Specular(v) => light.specular = v,
            LightEdit::Position(v) => light.position = v,
        }
        self.dirty.lights = true;
        Ok(())
    }

    pub fn edit_material(&mut self, index: usize, edit: MaterialEdit) -> SceneResult<()> {
        let material = self
            .materials
            .get_mut(index)
            .ok_or_else(|| out_of_range(Collection::Materials, index, MATERIAL_CAPACITY))
            .inspect_err(|err| log::warn!("Rejected material edit: {err}"))?;

        match edit {
            MaterialEdit::Ambient(v) => material.ambient = v,
            MaterialEdit::Diffuse(v) => material.diffuse = v,
            MaterialEdit::Specular(v) => material.specular = v,
            MaterialEdit::Shininess(s) if s.is_nan() => {
                let err = SceneError::InvalidMaterial {
                    material: index,
                    shininess: s,
                };
                log::warn!("Rejected material edit: {err}");
                return Err(err);
            }
            MaterialEdit::Shininess(s) => {
                material.shininess = s.clamp(Material::MIN_SHININESS, Material::MAX_SHININESS)
            }
        }
        self.dirty.materials = true;
        Ok(())
    }

    pub fn edit(&mut self, edit: &SceneEdit) -> SceneResult<()> {
        match *edit {
            SceneEdit::Camera(edit) => self.edit_camera(edit),
            SceneEdit::Light { index, edit } => self.edit_light(index, edit),
            SceneEdit::Material { index, edit } => self.edit_material(index, edit),
        }
    }

    /// Apply a change-set in order, stopping at the first rejected edit.
    /// Edits before the failing one stay applied.
    pub fn apply(&mut self, edits: &EditSet) -> SceneResult<()> {
        for edit in edits {
            self.edit(edit)?;
        }
        Ok(())
    }
}

fn out_of_range(collection: Collection, index: usize, capacity: usize) -> SceneError {
    SceneError::IndexOutOfRange {
        collection,
        index,
        capacity,
    }
}

fn shininess_in_domain(shininess: f32) -> bool {
    (Material::MIN_SHININESS..=Material::MAX_SHININESS).contains(&shininess)
}

fn checked_frame(params: &CameraParams) -> SceneResult<CameraFrame> {
    let frame = params.frame();
    if frame.is_degenerate() {
        return Err(SceneError::DegenerateCamera {
            eye: params.eye,
            target: params.target,
            up: params.up,
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use rstest::rstest;

    fn store_with(
        materials: [Material; MATERIAL_CAPACITY],
        spheres: Vec<Sphere>,
    ) -> SceneResult<SceneStore> {
        SceneStore::new(CameraParams::default(), default_lights(), materials, spheres)
    }

    #[test]
    fn fresh_store_is_clean() {
        let store = SceneStore::default();
        assert_eq!(store.dirty(), DirtyFlags::default());
        assert_eq!(store.light_count(), 2);
        assert_eq!(store.sphere_count(), 2);
        assert_eq!(store.bytes(Collection::Camera).len(), 64);
        assert_eq!(store.bytes(Collection::Lights).len(), 128);
        assert_eq!(store.bytes(Collection::Materials).len(), 128);
        assert_eq!(store.bytes(Collection::Spheres).len(), 64);
    }

    #[test]
    fn light_edit_sets_only_light_flag() {
        let mut store = SceneStore::default();
        store
            .edit_light(1, LightEdit::Position(Vec4::new(0.0, 2.0, 0.0, 1.0)))
            .unwrap();

        assert!(store.is_dirty(Collection::Lights));
        assert!(!store.is_dirty(Collection::Camera));
        assert!(!store.is_dirty(Collection::Materials));
        assert_eq!(store.lights()[1].position, Vec4::new(0.0, 2.0, 0.0, 1.0));
    }

    #[test]
    fn reading_does_not_clear_flags() {
        let mut store = SceneStore::default();
        store.edit_material(0, MaterialEdit::Shininess(20.0)).unwrap();

        let _ = store.bytes(Collection::Materials);
        let _ = store.material(0).unwrap();
        assert!(store.is_dirty(Collection::Materials));

        store.clear_dirty(Collection::Materials);
        assert!(!store.dirty().any());
    }

    #[test]
    fn out_of_range_index_fails_fast() {
        let mut store = SceneStore::default();
        let before = store.bytes(Collection::Lights).to_vec();

        let err = store
            .edit_light(LIGHT_CAPACITY, LightEdit::Ambient(Vec4::ONE))
            .unwrap_err();
        assert_eq!(
            err,
            SceneError::IndexOutOfRange {
                collection: Collection::Lights,
                index: LIGHT_CAPACITY,
                capacity: LIGHT_CAPACITY,
            }
        );
        assert_eq!(store.bytes(Collection::Lights), before.as_slice());
        assert!(!store.is_dirty(Collection::Lights));

        assert!(store.edit_material(7, MaterialEdit::Shininess(5.0)).is_err());
        assert!(store.material(MATERIAL_CAPACITY).is_err());
    }

    #[test]
    fn shininess_and_fovy_are_clamped() {
        let mut store = SceneStore::default();
        store.edit_material(1, MaterialEdit::Shininess(5000.0)).unwrap();
        assert_eq!(store.materials()[1].shininess, Material::MAX_SHININESS);
        store.edit_material(1, MaterialEdit::Shininess(0.0)).unwrap();
        assert_eq!(store.materials()[1].shininess, Material::MIN_SHININESS);

        store.edit_camera(CameraEdit::FovY(400.0)).unwrap();
        assert_eq!(store.camera_params().fovy_degrees, CameraParams::MAX_FOVY);
    }

    #[test]
    fn camera_edit_rebuilds_whole_frame() {
        let mut store = SceneStore::default();
        store.edit_camera(CameraEdit::Eye(Vec3::new(2.0, 0.0, 2.0))).unwrap();

        let expected = CameraParams {
            eye: Vec3::new(2.0, 0.0, 2.0),
            ..CameraParams::default()
        }
        .frame();
        assert_eq!(*store.camera(), expected);
        assert!(store.is_dirty(Collection::Camera));
        assert!(!store.is_dirty(Collection::Lights));
    }

    #[test]
    fn degenerate_camera_edit_is_rejected() {
        let mut store = SceneStore::default();
        let before = *store.camera();

        let err = store.edit_camera(CameraEdit::Up(Vec3::new(0.0, 0.0, 1.0)));
        assert!(matches!(err, Err(SceneError::DegenerateCamera { .. })));
        assert_eq!(*store.camera(), before);
        assert_eq!(store.camera_params().up, Vec3::Y);
        assert!(!store.is_dirty(Collection::Camera));
    }

    #[test]
    fn new_rejects_bad_material_index() {
        let spheres = vec![
            Sphere::new(Vec3::ZERO, 1.0, 0),
            Sphere::new(Vec3::ONE, 0.5, MATERIAL_CAPACITY as i32),
        ];
        let err = SceneStore::new(
            CameraParams::default(),
            default_lights(),
            default_materials(),
            spheres,
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::InvalidMaterialIndex { sphere: 1, .. }));

        let negative = vec![Sphere::new(Vec3::ZERO, 1.0, -1)];
        assert!(SceneStore::new(
            CameraParams::default(),
            default_lights(),
            default_materials(),
            negative,
        )
        .is_err());
    }

    #[rstest]
    #[case::negative(-1.0)]
    #[case::zero(0.0)]
    #[case::nan(f32::NAN)]
    #[case::infinite(f32::INFINITY)]
    fn new_rejects_bad_radius(#[case] radius: f32) {
        let spheres = vec![
            Sphere::new(Vec3::ZERO, 1.0, 0),
            Sphere::new(Vec3::ONE, radius, 1),
        ];
        let err = store_with(default_materials(), spheres).unwrap_err();
        assert!(matches!(err, SceneError::InvalidSphere { sphere: 1, .. }), "{err}");
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::below_domain(0.5)]
    #[case::above_domain(1000.5)]
    #[case::nan(f32::NAN)]
    #[case::infinite(f32::INFINITY)]
    fn new_rejects_shininess_outside_domain(#[case] shininess: f32) {
        let mut materials = default_materials();
        materials[1].shininess = shininess;
        let err = store_with(materials, default_spheres()).unwrap_err();
        assert!(matches!(err, SceneError::InvalidMaterial { material: 1, .. }), "{err}");
    }

    #[rstest]
    #[case::lower_bound(Material::MIN_SHININESS)]
    #[case::upper_bound(Material::MAX_SHININESS)]
    fn new_accepts_shininess_domain_bounds(#[case] shininess: f32) {
        let mut materials = default_materials();
        materials[0].shininess = shininess;
        assert!(store_with(materials, default_spheres()).is_ok());
    }

    #[test]
    fn nan_shininess_edit_is_rejected() {
        let mut store = SceneStore::default();
        let before = store.materials()[0];

        let err = store.edit_material(0, MaterialEdit::Shininess(f32::NAN));
        assert!(matches!(err, Err(SceneError::InvalidMaterial { material: 0, .. })));
        assert_eq!(store.materials()[0], before);
        assert!(!store.is_dirty(Collection::Materials));
    }

    #[rstest]
    #[case::eye(CameraEdit::Eye(Vec3::new(f32::NAN, 0.0, 2.0)))]
    #[case::target(CameraEdit::Target(Vec3::new(0.0, f32::NAN, 0.0)))]
    #[case::up(CameraEdit::Up(Vec3::new(0.0, f32::NAN, 0.0)))]
    #[case::infinite_eye(CameraEdit::Eye(Vec3::new(0.0, 0.0, f32::INFINITY)))]
    #[case::fovy(CameraEdit::FovY(f32::NAN))]
    fn non_finite_camera_edit_is_rejected(#[case] edit: CameraEdit) {
        let mut store = SceneStore::default();
        let before = *store.camera();

        let err = store.edit_camera(edit);
        assert!(matches!(err, Err(SceneError::DegenerateCamera { .. })));
        assert_eq!(*store.camera(), before);
        assert!(!store.is_dirty(Collection::Camera));
    }

    #[test]
    fn apply_stops_at_first_rejected_edit() {
        let mut store = SceneStore::default();
        let mut edits = EditSet::new();
        edits.light(0, LightEdit::Diffuse(Vec4::new(0.5, 0.5, 0.5, 0.0)));
        edits.material(9, MaterialEdit::Shininess(3.0));
        edits.camera(CameraEdit::FovY(30.0));

        assert!(store.apply(&edits).is_err());
        assert_eq!(store.lights()[0].diffuse, Vec4::new(0.5, 0.5, 0.5, 0.0));
        assert!(store.is_dirty(Collection::Lights));
        assert!(!store.is_dirty(Collection::Camera));
        assert_eq!(store.camera_params().fovy_degrees, 60.0);
    }
}

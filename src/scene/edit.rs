//! Scene edits collected from the panel and consumed by the store

use glam::{Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraEdit {
    Eye(Vec3),
    Target(Vec3),
    Up(Vec3),
    /// Vertical field of view in degrees
    FovY(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightEdit {
    Ambient(Vec4),
    Diffuse(Vec4),
    Specular(Vec4),
    Position(Vec4),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialEdit {
    Ambient(Vec4),
    Diffuse(Vec4),
    Specular(Vec4),
    Shininess(f32),
}

/// A single field change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneEdit {
    Camera(CameraEdit),
    Light { index: usize, edit: LightEdit },
    Material { index: usize, edit: MaterialEdit },
}

impl From<CameraEdit> for SceneEdit {
    fn from(edit: CameraEdit) -> Self {
        SceneEdit::Camera(edit)
    }
}

/// Ordered change-set produced by one pass over the edit panel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSet {
    edits: Vec<SceneEdit>,
}

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: impl Into<SceneEdit>) {
        self.edits.push(edit.into());
    }

    pub fn camera(&mut self, edit: CameraEdit) {
        self.push(SceneEdit::Camera(edit));
    }

    pub fn light(&mut self, index: usize, edit: LightEdit) {
        self.push(SceneEdit::Light { index, edit });
    }

    pub fn material(&mut self, index: usize, edit: MaterialEdit) {
        self.push(SceneEdit::Material { index, edit });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneEdit> {
        self.edits.iter()
    }
}

impl FromIterator<SceneEdit> for EditSet {
    fn from_iter<I: IntoIterator<Item = SceneEdit>>(iter: I) -> Self {
        Self {
            edits: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a EditSet {
    type Item = &'a SceneEdit;
    type IntoIter = std::slice::Iter<'a, SceneEdit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

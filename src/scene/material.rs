//! Material records for the kernel's material uniform block

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use static_assertions::const_assert_eq;
use std::mem::{align_of, offset_of, size_of};

/// Number of material slots in the material uniform block
pub const MATERIAL_CAPACITY: usize = 2;

/// Phong material
///
/// `shininess` is the trailing scalar; the explicit tail pads the record to
/// the 16-byte array stride the uniform block uses.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Material {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    _pad: [f32; 3],
}

const_assert_eq!(size_of::<Material>(), 64);
const_assert_eq!(align_of::<Material>(), 16);
const_assert_eq!(offset_of!(Material, ambient), 0);
const_assert_eq!(offset_of!(Material, diffuse), 16);
const_assert_eq!(offset_of!(Material, specular), 32);
const_assert_eq!(offset_of!(Material, shininess), 48);

impl Material {
    pub const MIN_SHININESS: f32 = 1.0;
    pub const MAX_SHININESS: f32 = 1000.0;

    pub fn new(ambient: Vec4, diffuse: Vec4, specular: Vec4, shininess: f32) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            shininess,
            _pad: [0.0; 3],
        }
    }
}

/// Red and blue materials of the sample scene
pub fn default_materials() -> [Material; MATERIAL_CAPACITY] {
    [
        Material::new(
            Vec4::new(0.6, 0.1, 0.1, 1.0),
            Vec4::new(0.6, 0.1, 0.1, 0.0),
            Vec4::new(0.3, 0.3, 0.3, 0.0),
            100.0,
        ),
        Material::new(
            Vec4::new(0.1, 0.1, 0.6, 1.0),
            Vec4::new(0.1, 0.1, 0.6, 0.0),
            Vec4::new(0.3, 0.3, 0.3, 0.0),
            100.0,
        ),
    ]
}

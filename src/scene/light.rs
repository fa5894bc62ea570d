//! Light records for the kernel's light uniform block

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use static_assertions::const_assert_eq;
use std::mem::{align_of, offset_of, size_of};

/// Number of light slots in the light uniform block
pub const LIGHT_CAPACITY: usize = 2;

/// Phong light as the kernel reads it
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    /// rgb = colour, a = weight
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// Homogeneous: w = 1 for a point light, w = 0 for a directional light
    pub position: Vec4,
}

const_assert_eq!(size_of::<Light>(), 64);
const_assert_eq!(align_of::<Light>(), 16);
const_assert_eq!(offset_of!(Light, ambient), 0);
const_assert_eq!(offset_of!(Light, diffuse), 16);
const_assert_eq!(offset_of!(Light, specular), 32);
const_assert_eq!(offset_of!(Light, position), 48);

impl Light {
    pub fn new(ambient: Vec4, diffuse: Vec4, specular: Vec4, position: Vec4) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            position,
        }
    }
}

/// The two lights of the sample scene
pub fn default_lights() -> [Light; LIGHT_CAPACITY] {
    [
        Light::new(
            Vec4::new(0.2, 0.2, 0.2, 1.0),
            Vec4::new(1.0, 1.0, 1.0, 0.0),
            Vec4::new(1.0, 1.0, 1.0, 0.0),
            Vec4::new(3.0, 4.0, 5.0, 1.0),
        ),
        Light::new(
            Vec4::new(0.1, 0.1, 0.0, 1.0),
            Vec4::new(0.5, 0.5, 0.0, 0.0),
            Vec4::new(0.5, 0.5, 0.0, 0.0),
            Vec4::new(-5.0, 1.0, 3.0, 1.0),
        ),
    ]
}

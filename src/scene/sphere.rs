//! Sphere records for the kernel's storage block

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::const_assert_eq;
use std::mem::{align_of, offset_of, size_of};

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    /// Index into the material collection
    pub material_index: i32,
    _pad: [i32; 3],
}

const_assert_eq!(size_of::<Sphere>(), 32);
const_assert_eq!(align_of::<Sphere>(), 16);
const_assert_eq!(offset_of!(Sphere, center), 0);
const_assert_eq!(offset_of!(Sphere, radius), 12);
const_assert_eq!(offset_of!(Sphere, material_index), 16);

impl Sphere {
    pub fn new(center: Vec3, radius: f32, material_index: i32) -> Self {
        Self {
            center,
            radius,
            material_index,
            _pad: [0; 3],
        }
    }
}

pub fn default_spheres() -> Vec<Sphere> {
    vec![
        Sphere::new(Vec3::new(1.0, 0.0, -2.0), 1.0, 0),
        Sphere::new(Vec3::new(-1.0, 0.0, -1.0), 1.0, 1),
    ]
}

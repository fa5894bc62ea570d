//! Host side of the ray-cast kernel interface.
//!
//! Binding numbers, the output image unit and the scalar parameter block live
//! here and are substituted into the kernel source by the shader loader, so the
//! WGSL never carries its own copy of these numbers.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

use crate::scene::{Collection, LIGHT_CAPACITY, MATERIAL_CAPACITY};

/// Bind group holding the four scene buffers
pub const BUFFER_GROUP: u32 = 0;
/// Bind group holding the output image units
pub const IMAGE_GROUP: u32 = 1;
/// Bind group holding [`KernelParams`]
pub const PARAMS_GROUP: u32 = 2;

/// Image unit the kernel writes its output to
pub const OUTPUT_IMAGE_UNIT: u32 = 0;

/// Buffer binding slots inside [`BUFFER_GROUP`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingPoint {
    /// Read-only storage block, array of spheres
    Spheres = 0,
    /// Uniform block, one camera frame
    Camera = 1,
    /// Uniform block, fixed array of lights
    Lights = 2,
    /// Uniform block, fixed array of materials
    Materials = 3,
}

impl BindingPoint {
    pub const ALL: [BindingPoint; 4] = [
        BindingPoint::Spheres,
        BindingPoint::Camera,
        BindingPoint::Lights,
        BindingPoint::Materials,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Storage blocks are sized by element count; the rest are uniform blocks
    pub fn is_storage(self) -> bool {
        matches!(self, BindingPoint::Spheres)
    }
}

impl From<Collection> for BindingPoint {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::Spheres => BindingPoint::Spheres,
            Collection::Camera => BindingPoint::Camera,
            Collection::Lights => BindingPoint::Lights,
            Collection::Materials => BindingPoint::Materials,
        }
    }
}

/// Scalar kernel parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct KernelParams {
    pub light_count: i32,
    pub sphere_count: i32,
    pub image_unit: i32,
    _pad: i32,
}

const_assert_eq!(size_of::<KernelParams>(), 16);

impl KernelParams {
    pub fn new(light_count: usize, sphere_count: usize, image_unit: u32) -> Self {
        Self {
            light_count: saturating_i32(light_count),
            sphere_count: saturating_i32(sphere_count),
            image_unit: image_unit as i32,
            _pad: 0,
        }
    }
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// `${NAME}` placeholders understood by the kernel source
pub fn template_constants() -> Vec<(&'static str, String)> {
    vec![
        ("BUFFER_GROUP", BUFFER_GROUP.to_string()),
        ("SPHERE_BINDING", BindingPoint::Spheres.index().to_string()),
        ("CAMERA_BINDING", BindingPoint::Camera.index().to_string()),
        ("LIGHT_BINDING", BindingPoint::Lights.index().to_string()),
        ("MATERIAL_BINDING", BindingPoint::Materials.index().to_string()),
        ("IMAGE_GROUP", IMAGE_GROUP.to_string()),
        ("IMAGE_UNIT", OUTPUT_IMAGE_UNIT.to_string()),
        ("PARAMS_GROUP", PARAMS_GROUP.to_string()),
        ("LIGHT_CAPACITY", LIGHT_CAPACITY.to_string()),
        ("MATERIAL_CAPACITY", MATERIAL_CAPACITY.to_string()),
    ]
}

//! Camera rig: eye/target/up/field-of-view to a device-ready screen frame.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::const_assert_eq;
use std::mem::{align_of, offset_of, size_of};

use crate::math::{cross, length, normalize};

/// Operator-facing camera description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fovy_degrees: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fovy_degrees: 60.0,
        }
    }
}

impl CameraParams {
    pub const MIN_FOVY: f32 = 1.0;
    pub const MAX_FOVY: f32 = 180.0;

    /// Build the screen frame for these parameters.
    pub fn frame(&self) -> CameraFrame {
        set_camera(self.eye, self.target, self.up, self.fovy_degrees)
    }
}

/// Screen frame read by the kernel's camera uniform block.
///
/// The screen plane is two units tall and sits `focal` units in front of the
/// eye, so `origin` is the screen centre and `right`/`up` span it.
/// Every vector member starts on a 16-byte boundary.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraFrame {
    pub origin: Vec3,
    _pad0: f32,
    pub right: Vec3,
    _pad1: f32,
    pub up: Vec3,
    _pad2: f32,
    pub position: Vec3,
    _pad3: f32,
}

const_assert_eq!(size_of::<CameraFrame>(), 64);
const_assert_eq!(align_of::<CameraFrame>(), 16);
const_assert_eq!(offset_of!(CameraFrame, origin), 0);
const_assert_eq!(offset_of!(CameraFrame, right), 16);
const_assert_eq!(offset_of!(CameraFrame, up), 32);
const_assert_eq!(offset_of!(CameraFrame, position), 48);

impl CameraFrame {
    pub fn new(origin: Vec3, right: Vec3, up: Vec3, position: Vec3) -> Self {
        Self {
            origin,
            _pad0: 0.0,
            right,
            _pad1: 0.0,
            up,
            _pad2: 0.0,
            position,
            _pad3: 0.0,
        }
    }

    /// Viewing direction, recovered from the frame.
    pub fn forward(&self) -> Vec3 {
        normalize(self.origin - self.position)
    }

    /// Distance from the eye to the screen plane.
    pub fn focal_length(&self) -> f32 {
        length(self.origin - self.position)
    }

    /// True when the basis collapsed: `up` parallel to the view direction
    /// (zero `right`), or a non-finite eye, target or up poisoned the frame.
    pub fn is_degenerate(&self) -> bool {
        let forward = self.origin - self.position;
        let finite = self.right.is_finite() && self.up.is_finite() && forward.is_finite();
        !finite || length(self.right) < f32::EPSILON
    }
}

/// Compute the screen frame for an eye looking at `target`.
///
/// Pure; callers rebuild the whole frame on any parameter change. When `up` is
/// parallel to the view direction `right` and `up` come back as zero vectors
/// (see [`CameraFrame::is_degenerate`]).
pub fn set_camera(eye: Vec3, target: Vec3, up: Vec3, fovy_degrees: f32) -> CameraFrame {
    let forward = normalize(target - eye);
    let right = normalize(cross(forward, up));
    // right and forward are orthonormal, so this is already unit length
    let up = cross(right, forward);
    let focal = 1.0 / (fovy_degrees.to_radians() * 0.5).tan();

    CameraFrame::new(eye + forward * focal, right, up, eye)
}

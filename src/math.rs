//! 3-vector helpers used by the camera rig.
//!
//! Thin wrappers over `glam` so the zero-length behaviour of [`normalize`] is
//! explicit: a vector shorter than `f32::EPSILON` is returned unchanged instead
//! of turning into NaNs.

use glam::Vec3;

/// Sum of component-wise products.
pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Right-handed cross product. `cross(a, b) == -cross(b, a)`.
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// Euclidean length.
pub fn length(a: Vec3) -> f32 {
    dot(a, a).sqrt()
}

/// Unit vector in the direction of `a`.
///
/// Near-zero input (length below `f32::EPSILON`) is passed through unchanged.
pub fn normalize(a: Vec3) -> Vec3 {
    let len = length(a);
    if len.abs() < f32::EPSILON {
        return a;
    }
    a / len
}

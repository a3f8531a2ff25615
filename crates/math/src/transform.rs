use glam::{Mat3, Mat4, Vec3};
use std::f32::consts::PI;

/// Errors from validating projection parameters.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("near plane must be positive, got {0}")]
    NonPositiveNear(f32),
    #[error("far plane ({far}) must lie beyond near plane ({near})")]
    FarNotBeyondNear { near: f32, far: f32 },
    #[error("aspect ratio must be positive, got {0}")]
    NonPositiveAspect(f32),
    #[error("field of view must be in (0, pi) radians, got {0}")]
    FieldOfView(f32),
}

/// The multiplicative identity.
pub fn identity() -> Mat4 {
    Mat4::IDENTITY
}

/// Translation by `v`, stored in the last column.
pub fn translate(v: Vec3) -> Mat4 {
    Mat4::from_translation(v)
}

/// Non-uniform scale by `v` along the diagonal.
pub fn scale(v: Vec3) -> Mat4 {
    Mat4::from_scale(v)
}

/// Rotation about +X. Positive angles turn counter-clockwise when looking
/// down +X toward the origin (right-handed).
pub fn rotate_x(angle: f32) -> Mat4 {
    Mat4::from_rotation_x(angle)
}

/// Rotation about +Y, same sign convention as [`rotate_x`].
pub fn rotate_y(angle: f32) -> Mat4 {
    Mat4::from_rotation_y(angle)
}

/// Rotation about +Z, same sign convention as [`rotate_x`].
pub fn rotate_z(angle: f32) -> Mat4 {
    Mat4::from_rotation_z(angle)
}

/// Right-handed perspective projection with depth mapped to `[0, 1]`.
///
/// A point on the view axis at `z = -near` lands on depth 0 and one at
/// `z = -far` on depth 1. `fov` is the vertical field of view in radians.
///
/// # Errors
/// Rejects `near <= 0`, `far <= near`, `aspect <= 0` and a field of view
/// outside `(0, pi)`. NaN in any parameter is rejected as well.
pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Result<Mat4, MathError> {
    if fov.is_nan() || fov <= 0.0 || fov >= PI {
        return Err(MathError::FieldOfView(fov));
    }
    if aspect.is_nan() || aspect <= 0.0 {
        return Err(MathError::NonPositiveAspect(aspect));
    }
    if near.is_nan() || near <= 0.0 {
        return Err(MathError::NonPositiveNear(near));
    }
    if far.is_nan() || far <= near {
        return Err(MathError::FarNotBeyondNear { near, far });
    }
    Ok(Mat4::perspective_rh(fov, aspect, near, far))
}

/// Component-wise sum.
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    a + b
}

pub fn identity3() -> Mat3 {
    Mat3::IDENTITY
}

pub fn scale3(v: Vec3) -> Mat3 {
    Mat3::from_diagonal(v)
}

pub fn rotate_x3(angle: f32) -> Mat3 {
    Mat3::from_rotation_x(angle)
}

pub fn rotate_y3(angle: f32) -> Mat3 {
    Mat3::from_rotation_y(angle)
}

pub fn rotate_z3(angle: f32) -> Mat3 {
    Mat3::from_rotation_z(angle)
}

/// Upper-left 3x3 block of `m`, i.e. `m` with its translation discarded.
/// For rotations combined with uniform scale this is the normal matrix.
pub fn upper_left3(m: Mat4) -> Mat3 {
    Mat3::from_mat4(m)
}

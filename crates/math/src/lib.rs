//! Transform math: pure constructors for the matrices the scene update composes.
//!
//! All matrices are column-major `glam` types. Vectors are transformed as
//! column vectors, so in `a * b` the matrix `b` is applied first.
//!
//! # Invariants
//! - Every function is side-effect-free.
//! - Only `perspective` validates its input; everything else is total and lets
//!   NaN/Inf propagate per IEEE-754.

mod transform;

pub use glam::{Mat3, Mat4, Vec3, Vec4};
pub use transform::{
    MathError, add, identity, identity3, perspective, rotate_x, rotate_x3, rotate_y, rotate_y3,
    rotate_z, rotate_z3, scale, scale3, translate, upper_left3,
};

//! Scene update: computes one frame's instance records and uniforms.
//!
//! # Invariants
//! - State is a pure function of the config and the tick count.
//! - An update writes only into the slot it is handed; it never reads back
//!   what earlier frames wrote.
//! - Every instance record is rewritten in full every tick.

mod geometry;
mod records;
mod update;

pub use geometry::{CubeMesh, TriangleMesh, cube_mesh, triangle_mesh};
pub use records::{AngleData, CameraData, FrameUniforms, InstanceRecord, UniformBlock};
pub use update::{FrameSink, Scene, SceneError, instance_color, instance_offset};

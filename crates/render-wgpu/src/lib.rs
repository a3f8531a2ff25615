//! wgpu backend for the frame pipeline.
//!
//! Each frame slot gets one bind group (uniforms at binding 0, instance
//! storage at binding 1). The indirect stage additionally binds the resource
//! table as group 1. Completion callbacks are driven by a poll thread that
//! waits on each submission index.
//!
//! # Invariants
//! - Every per-frame write goes through `Queue::write_buffer` before the
//!   submission that reads it.
//! - Creation failures are caught with error scopes and surfaced as
//!   [`lumen_render::RenderError`]; nothing is retried.

mod gpu;
mod poll;
mod shaders;

pub use gpu::{WgpuBackend, WgpuPipeline};
pub use shaders::{INDIRECT_SHADER, INSTANCED_SHADER, source_for};

//! Submission pipeline: backend-agnostic frame loop.
//!
//! # Invariants
//! - A tick never writes a slot whose previous submission is still in flight.
//! - Completion handlers only release the permit; they touch no scene or ring state.
//! - Geometry and the resource table are built once and never written again.
//!
//! [`HeadlessBackend`] runs the whole loop in host memory. The GPU backend
//! lives in `lumen-render-wgpu` and implements the same [`Backend`] trait.

mod backend;
mod headless;
mod pipeline;
mod table;

pub use backend::{
    Backend, BufferDesc, BufferUsage, CompletionHandler, DrawCommand, DrawKind, PipelineDesc,
    RenderError,
};
pub use headless::{
    BufferId, CompletionMode, HeadlessBackend, HeadlessOptions, HeadlessPipeline,
    HeadlessSlotBinding, HeadlessTable, HostBuffer, SubmittedFrame,
};
pub use pipeline::{FramePipeline, FrameSlot, Geometry, TickReport, TickState};
pub use table::{IndirectResourceTable, TableEntry, TableLayout};

/// Package name and version, as reported by `lumen-cli info`.
pub fn crate_info() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_info_reports_package_version() {
        assert_eq!(
            crate_info(),
            format!("lumen-render v{}", env!("CARGO_PKG_VERSION"))
        );
    }
}

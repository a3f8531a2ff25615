use crate::pipeline::FrameSlot;
use crate::table::{IndirectResourceTable, TableLayout};
use lumen_common::{ConfigError, Stage};
use lumen_frame::FrameError;
use lumen_scene::SceneError;

/// Continuation run by the backend once the GPU has finished a submission.
/// May be invoked on any thread.
pub type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

/// Errors from building the pipeline. All of them are fatal at startup; the
/// steady-state tick has no error path.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("GPU buffer allocation failed for {label} ({size} bytes): {reason}")]
    BufferAllocation {
        label: String,
        size: u64,
        reason: String,
    },
    #[error("shader program compilation failed: {0}")]
    ProgramCompilation(String),
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),
    #[error("resource table layout has {expected} entries but {got} buffers were given")]
    TableLayout { expected: usize, got: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Read-only storage in the vertex stage.
    Storage,
}

/// Description of one GPU-visible allocation.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub size: u64,
    /// Initial contents; `size` must equal `contents.len()` when present.
    pub contents: Option<&'a [u8]>,
}

impl<'a> BufferDesc<'a> {
    /// A buffer created with `contents` and never written again.
    pub fn init(label: &'a str, usage: BufferUsage, contents: &'a [u8]) -> Self {
        Self {
            label,
            usage,
            size: contents.len() as u64,
            contents: Some(contents),
        }
    }

    /// A zero-filled buffer that is rewritten every frame.
    pub fn zeroed(label: &'a str, usage: BufferUsage, size: u64) -> Self {
        Self {
            label,
            usage,
            size,
            contents: None,
        }
    }
}

/// Everything the backend needs to build the pipeline-state object for a stage.
/// The program itself is opaque and owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub stage: Stage,
    pub depth_test: bool,
    pub cull_back_faces: bool,
}

impl PipelineDesc<'static> {
    pub fn for_stage(stage: Stage) -> Self {
        let instanced = stage.uses_instances();
        Self {
            label: match stage {
                Stage::Indirect => "indirect_pipeline",
                Stage::Instanced => "instanced_pipeline",
                Stage::Camera => "camera_pipeline",
            },
            stage,
            depth_test: instanced,
            cull_back_faces: instanced,
        }
    }
}

/// Shape of the draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// Indexed draw with 16-bit indices.
    Indexed { index_count: u32 },
    NonIndexed { vertex_count: u32 },
}

/// One frame's encoded draw, borrowing everything it references.
pub struct DrawCommand<'a, B: Backend> {
    /// 1-based frame number.
    pub frame: u64,
    pub slot_index: usize,
    pub stage: Stage,
    pub pipeline: &'a B::Pipeline,
    pub slot: &'a FrameSlot<B>,
    pub vertex_buffer: Option<&'a B::Buffer>,
    pub index_buffer: Option<&'a B::Buffer>,
    pub table: Option<&'a IndirectResourceTable<B>>,
    pub draw: DrawKind,
    pub instance_count: u32,
}

/// The graphics backend the pipeline drives.
///
/// Handles are plain owned values released when dropped. A backend runs a
/// single in-order queue: completion handlers fire in submission order.
pub trait Backend: Sized {
    type Buffer;
    type Pipeline;
    /// Per-slot binding of the slot's uniform and instance storage.
    type SlotBinding;
    type ResourceTable;
    /// What a frame is drawn into (a swapchain view, or nothing when headless).
    type Target;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, RenderError>;

    /// Overwrite `data.len()` bytes at `offset`. Out-of-range writes are a
    /// programming error and abort like any other backend validation failure.
    fn write_buffer(&self, buffer: &mut Self::Buffer, offset: u64, data: &[u8]);

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<Self::Pipeline, RenderError>;

    fn create_slot_binding(
        &self,
        pipeline: &Self::Pipeline,
        uniforms: &Self::Buffer,
        instances: Option<&Self::Buffer>,
    ) -> Result<Self::SlotBinding, RenderError>;

    /// Encode references to `buffers` at the indices given by `layout`.
    fn create_resource_table(
        &self,
        pipeline: &Self::Pipeline,
        layout: &TableLayout,
        buffers: &[&Self::Buffer],
    ) -> Result<Self::ResourceTable, RenderError>;

    /// Encode and commit `draw`, then arrange for `on_complete` to run once
    /// the GPU has finished with it.
    fn submit(&self, target: &Self::Target, draw: &DrawCommand<'_, Self>, on_complete: CompletionHandler);
}

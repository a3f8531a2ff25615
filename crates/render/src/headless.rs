//! Host-memory backend. Runs the full frame loop without a GPU and records
//! what would have been drawn, so the pipeline can be inspected and tested.

use crate::backend::{
    Backend, BufferDesc, BufferUsage, CompletionHandler, DrawCommand, DrawKind, PipelineDesc,
    RenderError,
};
use crate::table::TableLayout;
use crossbeam_channel::{Sender, unbounded};
use lumen_common::Stage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// A buffer living in host memory.
#[derive(Debug)]
pub struct HostBuffer {
    id: BufferId,
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

impl HostBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug)]
pub struct HeadlessPipeline {
    pub label: String,
    pub stage: Stage,
}

#[derive(Debug)]
pub struct HeadlessSlotBinding {
    pub uniforms: BufferId,
    pub instances: Option<BufferId>,
}

#[derive(Debug)]
pub struct HeadlessTable {
    references: Vec<BufferId>,
}

impl HeadlessTable {
    /// Buffer ids in table-index order.
    pub fn references(&self) -> &[BufferId] {
        &self.references
    }
}

/// When completion handlers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Inside `submit`, before it returns.
    #[default]
    Immediate,
    /// Only when the owner calls [`HeadlessBackend::complete_next`].
    Manual,
    /// On a worker thread, `latency` after submission, in submission order.
    Worker { latency: Duration },
}

/// Submission snapshots kept by default.
pub const DEFAULT_HISTORY: usize = 64;

#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub completion: CompletionMode,
    /// Total bytes the backend may allocate before buffer creation fails.
    pub memory_limit: Option<u64>,
    /// Fail every pipeline creation with a compilation error.
    pub fail_program_compilation: bool,
    /// Most recent submissions to keep as snapshots. 0 disables recording.
    pub history: usize,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            completion: CompletionMode::default(),
            memory_limit: None,
            fail_program_compilation: false,
            history: DEFAULT_HISTORY,
        }
    }
}

/// Snapshot of one submitted frame.
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub frame: u64,
    pub slot: usize,
    pub stage: Stage,
    pub draw: DrawKind,
    pub instance_count: u32,
    pub uniforms: Vec<u8>,
    pub instances: Vec<u8>,
    pub uniform_buffer: BufferId,
    pub instance_buffer: Option<BufferId>,
    pub table: Vec<BufferId>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    allocated: u64,
    submissions: VecDeque<SubmittedFrame>,
    submitted: usize,
    pending: VecDeque<CompletionHandler>,
    completed: u64,
}

struct Shared {
    options: HeadlessOptions,
    state: Mutex<State>,
    worker: Option<Sender<(Instant, CompletionHandler)>>,
    worker_thread: Option<JoinHandle<()>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.worker.take();
        if let Some(thread) = self.worker_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Backend that keeps every buffer in host memory. Cloning shares state, so a
/// test can keep a handle while the pipeline owns another.
#[derive(Clone)]
pub struct HeadlessBackend {
    shared: Arc<Shared>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(HeadlessOptions::default())
    }
}

impl HeadlessBackend {
    pub fn new(options: HeadlessOptions) -> Self {
        let (worker, worker_thread) = match options.completion {
            CompletionMode::Worker { latency } => {
                let (tx, rx) = unbounded::<(Instant, CompletionHandler)>();
                let thread = std::thread::Builder::new()
                    .name("headless-completion".into())
                    .spawn(move || {
                        for (submitted, handler) in rx {
                            let due = submitted + latency;
                            let now = Instant::now();
                            if due > now {
                                std::thread::sleep(due - now);
                            }
                            handler();
                        }
                    })
                    .ok();
                match thread {
                    Some(thread) => (Some(tx), Some(thread)),
                    None => {
                        tracing::warn!("completion worker failed to start, completing inline");
                        (None, None)
                    }
                }
            }
            _ => (None, None),
        };
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(State::default()),
                worker,
                worker_thread,
            }),
        }
    }

    pub fn with_completion(completion: CompletionMode) -> Self {
        Self::new(HeadlessOptions {
            completion,
            ..HeadlessOptions::default()
        })
    }

    pub fn options(&self) -> &HeadlessOptions {
        &self.shared.options
    }

    /// Run the oldest pending completion handler. Returns false if none.
    pub fn complete_next(&self) -> bool {
        let handler = self.shared.state.lock().pending.pop_front();
        match handler {
            Some(handler) => {
                handler();
                self.shared.state.lock().completed += 1;
                true
            }
            None => false,
        }
    }

    /// Run every pending completion handler, oldest first.
    pub fn complete_all(&self) -> usize {
        let mut n = 0;
        while self.complete_next() {
            n += 1;
        }
        n
    }

    /// Handlers waiting for [`complete_next`](Self::complete_next).
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Handlers that have run, in manual and immediate modes.
    pub fn completed(&self) -> u64 {
        self.shared.state.lock().completed
    }

    /// The most recent submissions, oldest first, at most
    /// [`HeadlessOptions::history`] of them.
    pub fn submissions(&self) -> Vec<SubmittedFrame> {
        self.shared.state.lock().submissions.iter().cloned().collect()
    }

    pub fn last_submission(&self) -> Option<SubmittedFrame> {
        self.shared.state.lock().submissions.back().cloned()
    }

    /// Frames submitted so far, including those no longer retained.
    pub fn submission_count(&self) -> usize {
        self.shared.state.lock().submitted
    }

    /// Bytes currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.shared.state.lock().allocated
    }
}

impl Backend for HeadlessBackend {
    type Buffer = HostBuffer;
    type Pipeline = HeadlessPipeline;
    type SlotBinding = HeadlessSlotBinding;
    type ResourceTable = HeadlessTable;
    type Target = ();

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<HostBuffer, RenderError> {
        let mut state = self.shared.state.lock();
        if let Some(limit) = self.shared.options.memory_limit {
            if state.allocated + desc.size > limit {
                return Err(RenderError::BufferAllocation {
                    label: desc.label.to_string(),
                    size: desc.size,
                    reason: format!("{} of {limit} bytes already allocated", state.allocated),
                });
            }
        }
        let data = match desc.contents {
            Some(contents) => contents.to_vec(),
            None => vec![0; desc.size as usize],
        };
        let id = BufferId(state.next_id);
        state.next_id += 1;
        state.allocated += desc.size;
        tracing::trace!(label = desc.label, size = desc.size, id = id.0, "host buffer created");
        Ok(HostBuffer {
            id,
            label: desc.label.to_string(),
            usage: desc.usage,
            data,
        })
    }

    fn write_buffer(&self, buffer: &mut HostBuffer, offset: u64, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        assert!(
            end <= buffer.data.len(),
            "write of {} bytes at {offset} overruns buffer {} ({} bytes)",
            data.len(),
            buffer.label,
            buffer.data.len()
        );
        buffer.data[start..end].copy_from_slice(data);
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<HeadlessPipeline, RenderError> {
        if self.shared.options.fail_program_compilation {
            return Err(RenderError::ProgramCompilation(format!(
                "{}: compilation disabled on this backend",
                desc.label
            )));
        }
        Ok(HeadlessPipeline {
            label: desc.label.to_string(),
            stage: desc.stage,
        })
    }

    fn create_slot_binding(
        &self,
        pipeline: &HeadlessPipeline,
        uniforms: &HostBuffer,
        instances: Option<&HostBuffer>,
    ) -> Result<HeadlessSlotBinding, RenderError> {
        if pipeline.stage.uses_instances() && instances.is_none() {
            return Err(RenderError::PipelineCreation(format!(
                "{} reads instance storage but none was bound",
                pipeline.label
            )));
        }
        Ok(HeadlessSlotBinding {
            uniforms: uniforms.id,
            instances: instances.map(HostBuffer::id),
        })
    }

    fn create_resource_table(
        &self,
        _pipeline: &HeadlessPipeline,
        layout: &TableLayout,
        buffers: &[&HostBuffer],
    ) -> Result<HeadlessTable, RenderError> {
        if buffers.len() != layout.len() {
            return Err(RenderError::TableLayout {
                expected: layout.len(),
                got: buffers.len(),
            });
        }
        Ok(HeadlessTable {
            references: buffers.iter().map(|b| b.id).collect(),
        })
    }

    fn submit(&self, _target: &(), draw: &DrawCommand<'_, Self>, on_complete: CompletionHandler) {
        let history = self.shared.options.history;
        let record = (history > 0).then(|| snapshot(draw));

        let mut state = self.shared.state.lock();
        state.submitted += 1;
        if let Some(record) = record {
            while state.submissions.len() >= history {
                state.submissions.pop_front();
            }
            state.submissions.push_back(record);
        }
        match self.shared.options.completion {
            CompletionMode::Manual => state.pending.push_back(on_complete),
            CompletionMode::Worker { .. } if self.shared.worker.is_some() => {
                drop(state);
                if let Some(worker) = &self.shared.worker {
                    if let Err(err) = worker.send((Instant::now(), on_complete)) {
                        // Worker is gone; complete here rather than leak the permit.
                        (err.into_inner().1)();
                    }
                }
            }
            _ => {
                state.completed += 1;
                drop(state);
                on_complete();
            }
        }
    }
}

fn snapshot(draw: &DrawCommand<'_, HeadlessBackend>) -> SubmittedFrame {
    let slot = draw.slot;
    SubmittedFrame {
        frame: draw.frame,
        slot: draw.slot_index,
        stage: draw.stage,
        draw: draw.draw,
        instance_count: draw.instance_count,
        uniforms: slot.uniforms.data.clone(),
        instances: slot
            .instances
            .as_ref()
            .map(|b| b.data.clone())
            .unwrap_or_default(),
        uniform_buffer: slot.binding.uniforms,
        instance_buffer: slot.binding.instances,
        table: draw
            .table
            .map(|t| t.raw().references.clone())
            .unwrap_or_default(),
    }
}

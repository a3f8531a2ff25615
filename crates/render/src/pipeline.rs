use crate::backend::{
    Backend, BufferDesc, BufferUsage, DrawCommand, DrawKind, PipelineDesc, RenderError,
};
use crate::table::{IndirectResourceTable, TableLayout};
use lumen_common::{PipelineConfig, Stage};
use lumen_frame::{FrameRing, InFlightSemaphore};
use lumen_scene::{FrameSink, Scene, cube_mesh, triangle_mesh};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Storage owned by one slot of the frame ring. Only the tick that holds the
/// slot writes to it.
pub struct FrameSlot<B: Backend> {
    pub index: usize,
    pub uniforms: B::Buffer,
    /// Absent for stages that draw without per-instance data.
    pub instances: Option<B::Buffer>,
    pub binding: B::SlotBinding,
}

impl<B: Backend> FrameSlot<B> {
    fn allocate(
        backend: &B,
        pipeline: &B::Pipeline,
        scene: &Scene,
        index: usize,
    ) -> Result<Self, RenderError> {
        let uniforms = backend.create_buffer(&BufferDesc::zeroed(
            &format!("frame_uniforms_{index}"),
            BufferUsage::Uniform,
            scene.uniform_bytes() as u64,
        ))?;
        let instances = match scene.instance_bytes() {
            0 => None,
            size => Some(backend.create_buffer(&BufferDesc::zeroed(
                &format!("frame_instances_{index}"),
                BufferUsage::Storage,
                size as u64,
            ))?),
        };
        let binding = backend.create_slot_binding(pipeline, &uniforms, instances.as_ref())?;
        Ok(Self {
            index,
            uniforms,
            instances,
            binding,
        })
    }
}

/// Writes one tick's scene data into a slot through the backend.
struct SlotWriter<'a, B: Backend> {
    backend: &'a B,
    slot: &'a mut FrameSlot<B>,
}

impl<B: Backend> FrameSink for SlotWriter<'_, B> {
    fn write_uniforms(&mut self, bytes: &[u8]) {
        self.backend.write_buffer(&mut self.slot.uniforms, 0, bytes);
    }

    fn write_instances(&mut self, bytes: &[u8]) {
        if let Some(instances) = self.slot.instances.as_mut() {
            self.backend.write_buffer(instances, 0, bytes);
        }
    }
}

/// Immutable meshes shared by every frame.
pub struct Geometry<B: Backend> {
    pub vertex_buffer: Option<B::Buffer>,
    pub index_buffer: Option<B::Buffer>,
    /// Buffers reached only through the resource table, in layout order.
    pub table_buffers: Vec<B::Buffer>,
    pub draw: DrawKind,
}

impl<B: Backend> Geometry<B> {
    pub fn build(backend: &B, stage: Stage) -> Result<Self, RenderError> {
        match stage {
            Stage::Indirect => {
                let mesh = triangle_mesh();
                let positions = backend.create_buffer(&BufferDesc::init(
                    "triangle_positions",
                    BufferUsage::Storage,
                    bytemuck::cast_slice(&mesh.positions),
                ))?;
                let colors = backend.create_buffer(&BufferDesc::init(
                    "triangle_colors",
                    BufferUsage::Storage,
                    bytemuck::cast_slice(&mesh.colors),
                ))?;
                Ok(Self {
                    vertex_buffer: None,
                    index_buffer: None,
                    table_buffers: vec![positions, colors],
                    draw: DrawKind::NonIndexed {
                        vertex_count: mesh.vertex_count(),
                    },
                })
            }
            Stage::Instanced | Stage::Camera => {
                let mesh = cube_mesh();
                let vertices = backend.create_buffer(&BufferDesc::init(
                    "cube_vertices",
                    BufferUsage::Vertex,
                    bytemuck::cast_slice(&mesh.positions),
                ))?;
                let indices = backend.create_buffer(&BufferDesc::init(
                    "cube_indices",
                    BufferUsage::Index,
                    bytemuck::cast_slice(&mesh.indices),
                ))?;
                Ok(Self {
                    vertex_buffer: Some(vertices),
                    index_buffer: Some(indices),
                    table_buffers: Vec::new(),
                    draw: DrawKind::Indexed {
                        index_count: mesh.indices.len() as u32,
                    },
                })
            }
        }
    }
}

/// Where the current tick is. A tick runs Idle to Submitted; Completed is
/// reached when the backend runs the frame's completion handler, which
/// happens on the backend's thread and only releases the permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    SlotAcquired,
    Encoded,
    Submitted,
    /// The last submitted frame, and every one before it, has completed.
    Completed,
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// 1-based frame number.
    pub frame: u64,
    pub slot: usize,
    /// Time spent blocked waiting for a free slot.
    pub waited: Duration,
    /// Frames in flight after this submission.
    pub in_flight: usize,
}

/// Drives the per-frame loop: wait for a free slot, rotate the ring, update
/// the scene into that slot, submit, and release the slot on completion.
pub struct FramePipeline<B: Backend> {
    scene: Scene,
    ring: FrameRing<FrameSlot<B>>,
    semaphore: Arc<InFlightSemaphore>,
    table: Option<IndirectResourceTable<B>>,
    geometry: Geometry<B>,
    pipeline: B::Pipeline,
    state: TickState,
    total_wait: Duration,
    backend: B,
}

impl<B: Backend> FramePipeline<B> {
    /// Build every GPU object the loop needs. Any failure here is fatal.
    pub fn new(backend: B, config: &PipelineConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let scene = Scene::new(config.scene.clone())?;
        let stage = scene.stage();

        let pipeline = backend.create_pipeline(&PipelineDesc::for_stage(stage))?;
        let geometry = Geometry::build(&backend, stage)?;
        let table = if stage.uses_resource_table() {
            let refs: Vec<&B::Buffer> = geometry.table_buffers.iter().collect();
            Some(IndirectResourceTable::construct(
                &backend,
                &pipeline,
                TableLayout::geometry(),
                &refs,
            )?)
        } else {
            None
        };

        let frames = config.frames_in_flight;
        let ring = FrameRing::try_from_fn(frames, |index| {
            FrameSlot::allocate(&backend, &pipeline, &scene, index)
        })?;
        let semaphore = InFlightSemaphore::new(frames)?;

        tracing::info!(
            %stage,
            frames_in_flight = frames,
            instances = scene.instances().len(),
            "frame pipeline ready"
        );

        Ok(Self {
            scene,
            ring,
            semaphore,
            table,
            geometry,
            pipeline,
            state: TickState::Idle,
            total_wait: Duration::ZERO,
            backend,
        })
    }

    /// Run one frame. Blocks while every slot is in flight.
    pub fn tick(&mut self, target: &B::Target) -> TickReport {
        let _span = tracing::info_span!("frame_tick", frame = self.ring.frame() + 1).entered();
        self.state = TickState::Idle;

        let start = Instant::now();
        let permit = self.semaphore.acquire();
        let waited = start.elapsed();
        self.total_wait += waited;
        self.transition(TickState::SlotAcquired);

        let slot_index = self.ring.advance();
        let mut writer = SlotWriter {
            backend: &self.backend,
            slot: self.ring.current_mut(),
        };
        self.scene.update(&mut writer);
        self.transition(TickState::Encoded);

        let frame = self.ring.frame();
        let draw = DrawCommand {
            frame,
            slot_index,
            stage: self.scene.stage(),
            pipeline: &self.pipeline,
            slot: self.ring.current(),
            vertex_buffer: self.geometry.vertex_buffer.as_ref(),
            index_buffer: self.geometry.index_buffer.as_ref(),
            table: self.table.as_ref(),
            draw: self.geometry.draw,
            instance_count: self.scene.instances().len().max(1) as u32,
        };
        self.backend
            .submit(target, &draw, Box::new(move || permit.complete()));
        self.transition(TickState::Submitted);

        let report = TickReport {
            frame,
            slot: slot_index,
            waited,
            in_flight: self.semaphore.in_flight(),
        };
        tracing::debug!(
            slot = report.slot,
            in_flight = report.in_flight,
            waited_us = waited.as_micros() as u64,
            "frame submitted"
        );
        report
    }

    fn transition(&mut self, next: TickState) {
        tracing::trace!(from = ?self.state, to = ?next, "tick state");
        self.state = next;
    }

    /// Block until every submitted frame has completed.
    pub fn wait_idle(&self) {
        self.semaphore.wait_idle();
    }

    /// Completions arrive in submission order, so the last frame is complete
    /// exactly when nothing is in flight.
    pub fn state(&self) -> TickState {
        match self.state {
            TickState::Submitted if self.semaphore.in_flight() == 0 => TickState::Completed,
            state => state,
        }
    }

    /// Frames submitted so far.
    pub fn frame(&self) -> u64 {
        self.ring.frame()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    pub fn in_flight(&self) -> usize {
        self.semaphore.in_flight()
    }

    /// Total time ticks have spent blocked on the semaphore.
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    pub fn stage(&self) -> Stage {
        self.scene.stage()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Change the camera aspect ratio; takes effect on the next tick.
    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), RenderError> {
        self.scene.set_aspect(aspect)?;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn slots(&self) -> impl Iterator<Item = &FrameSlot<B>> {
        self.ring.iter()
    }

    pub fn table(&self) -> Option<&IndirectResourceTable<B>> {
        self.table.as_ref()
    }
}

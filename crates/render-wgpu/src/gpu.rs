use crate::poll::Poller;
use crate::shaders;
use lumen_render::{
    Backend, BufferDesc, BufferUsage, CompletionHandler, DrawCommand, DrawKind, PipelineDesc,
    RenderError, TableLayout,
};
use parking_lot::Mutex;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Compiled pipeline plus the bind group layouts its bindings must match.
pub struct WgpuPipeline {
    raw: wgpu::RenderPipeline,
    slot_layout: wgpu::BindGroupLayout,
    table_layout: Option<wgpu::BindGroupLayout>,
    reads_instances: bool,
    depth_test: bool,
}

/// wgpu implementation of [`Backend`]. Draws into a caller-provided texture
/// view, with a depth buffer it owns.
pub struct WgpuBackend {
    // Dropped first: joins the poll thread and flushes pending callbacks.
    poller: Poller,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    color_format: wgpu::TextureFormat,
    clear_color: wgpu::Color,
    depth: Mutex<wgpu::TextureView>,
}

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        clear_color: [f64; 4],
    ) -> Self {
        let depth = create_depth_texture(&device, width, height);
        let poller = Poller::spawn(Arc::clone(&device));
        let [r, g, b, a] = clear_color;
        Self {
            poller,
            device,
            queue,
            color_format,
            clear_color: wgpu::Color { r, g, b, a },
            depth: Mutex::new(depth),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Recreate the depth buffer for a new surface size.
    pub fn resize(&self, width: u32, height: u32) {
        *self.depth.lock() = create_depth_texture(&self.device, width, height);
    }

    /// Run `f` and return the first out-of-memory or validation error it raised.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = f();
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        (value, oom.or(validation))
    }

    fn slot_layout(&self, reads_instances: bool) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        if reads_instances {
            entries.push(storage_entry(1));
        }
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("frame_slot_layout"),
                entries: &entries,
            })
    }

    fn table_layout(&self, layout: &TableLayout) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = layout
            .entries()
            .iter()
            .map(|entry| storage_entry(entry.index))
            .collect();
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("resource_table_layout"),
                entries: &entries,
            })
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    match usage {
        BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
        BufferUsage::Index => wgpu::BufferUsages::INDEX,
        BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        BufferUsage::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    }
}

impl Backend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Pipeline = WgpuPipeline;
    type SlotBinding = wgpu::BindGroup;
    type ResourceTable = wgpu::BindGroup;
    type Target = wgpu::TextureView;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer, RenderError> {
        let max = self.device.limits().max_buffer_size;
        if desc.size > max {
            return Err(RenderError::BufferAllocation {
                label: desc.label.to_string(),
                size: desc.size,
                reason: format!("exceeds device limit of {max} bytes"),
            });
        }
        let usage = buffer_usages(desc.usage);
        let (buffer, error) = self.scoped(|| match desc.contents {
            Some(contents) => self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label),
                    contents,
                    usage,
                }),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size,
                usage,
                mapped_at_creation: false,
            }),
        });
        match error {
            Some(e) => Err(RenderError::BufferAllocation {
                label: desc.label.to_string(),
                size: desc.size,
                reason: e.to_string(),
            }),
            None => Ok(buffer),
        }
    }

    fn write_buffer(&self, buffer: &mut wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<WgpuPipeline, RenderError> {
        let (module, error) = self.scoped(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.label),
                    source: wgpu::ShaderSource::Wgsl(shaders::source_for(desc.stage).into()),
                })
        });
        if let Some(e) = error {
            return Err(RenderError::ProgramCompilation(e.to_string()));
        }

        let reads_instances = desc.stage.uses_instances();
        let slot_layout = self.slot_layout(reads_instances);
        let table_layout = desc
            .stage
            .uses_resource_table()
            .then(|| self.table_layout(&TableLayout::geometry()));

        let mut group_layouts = vec![&slot_layout];
        if let Some(table) = &table_layout {
            group_layouts.push(table);
        }
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("frame_pipeline_layout"),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });

        let cube_vertex = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x3],
        }];
        let vertex_buffers: &[wgpu::VertexBufferLayout] = if reads_instances {
            &cube_vertex
        } else {
            &[]
        };

        let (raw, error) = self.scoped(|| {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(desc.label),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &module,
                        entry_point: Some("vs_main"),
                        compilation_options: Default::default(),
                        buffers: vertex_buffers,
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some("fs_main"),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.color_format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: desc.cull_back_faces.then_some(wgpu::Face::Back),
                        ..Default::default()
                    },
                    depth_stencil: desc.depth_test.then(|| wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: Default::default(),
                    multiview: None,
                    cache: None,
                })
        });
        if let Some(e) = error {
            return Err(RenderError::PipelineCreation(e.to_string()));
        }

        tracing::info!(label = desc.label, stage = %desc.stage, "render pipeline created");
        Ok(WgpuPipeline {
            raw,
            slot_layout,
            table_layout,
            reads_instances,
            depth_test: desc.depth_test,
        })
    }

    fn create_slot_binding(
        &self,
        pipeline: &WgpuPipeline,
        uniforms: &wgpu::Buffer,
        instances: Option<&wgpu::Buffer>,
    ) -> Result<wgpu::BindGroup, RenderError> {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }];
        match (pipeline.reads_instances, instances) {
            (true, Some(buffer)) => entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: buffer.as_entire_binding(),
            }),
            (true, None) => {
                return Err(RenderError::PipelineCreation(
                    "pipeline reads instance storage but none was bound".into(),
                ));
            }
            (false, _) => {}
        }
        let (group, error) = self.scoped(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("frame_slot_bind_group"),
                layout: &pipeline.slot_layout,
                entries: &entries,
            })
        });
        match error {
            Some(e) => Err(RenderError::PipelineCreation(e.to_string())),
            None => Ok(group),
        }
    }

    fn create_resource_table(
        &self,
        pipeline: &WgpuPipeline,
        layout: &TableLayout,
        buffers: &[&wgpu::Buffer],
    ) -> Result<wgpu::BindGroup, RenderError> {
        let Some(group_layout) = &pipeline.table_layout else {
            return Err(RenderError::TableLayout {
                expected: 0,
                got: buffers.len(),
            });
        };
        if buffers.len() != layout.len() {
            return Err(RenderError::TableLayout {
                expected: layout.len(),
                got: buffers.len(),
            });
        }
        let entries: Vec<_> = layout
            .entries()
            .iter()
            .zip(buffers)
            .map(|(entry, buffer)| wgpu::BindGroupEntry {
                binding: entry.index,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let (group, error) = self.scoped(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("resource_table"),
                layout: group_layout,
                entries: &entries,
            })
        });
        match error {
            Some(e) => Err(RenderError::PipelineCreation(e.to_string())),
            None => Ok(group),
        }
    }

    fn submit(
        &self,
        target: &wgpu::TextureView,
        draw: &DrawCommand<'_, Self>,
        on_complete: CompletionHandler,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        {
            let depth = self.depth.lock();
            let depth_stencil_attachment =
                draw.pipeline
                    .depth_test
                    .then(|| wgpu::RenderPassDepthStencilAttachment {
                        view: &*depth,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment,
                ..Default::default()
            });

            pass.set_pipeline(&draw.pipeline.raw);
            pass.set_bind_group(0, &draw.slot.binding, &[]);
            if let Some(table) = draw.table {
                pass.set_bind_group(1, table.raw(), &[]);
            }
            if let Some(vertices) = draw.vertex_buffer {
                pass.set_vertex_buffer(0, vertices.slice(..));
            }
            let instances = 0..draw.instance_count;
            match (draw.draw, draw.index_buffer) {
                (DrawKind::Indexed { index_count }, Some(indices)) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..index_count, 0, instances);
                }
                (DrawKind::Indexed { .. }, None) => {
                    tracing::error!(frame = draw.frame, "indexed draw without an index buffer");
                }
                (DrawKind::NonIndexed { vertex_count }, _) => {
                    pass.draw(0..vertex_count, instances);
                }
            }
        }

        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(on_complete);
        self.poller.watch(index);
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

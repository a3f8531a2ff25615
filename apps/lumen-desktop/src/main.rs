use anyhow::{Context, Result, anyhow};
use clap::Parser;
use lumen_common::{ConfigOverrides, EngineConfig, Stage};
use lumen_render::FramePipeline;
use lumen_render_wgpu::WgpuBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "lumen-desktop", about = "Frame-pipelined instanced renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stage to run (indirect, instanced, camera)
    #[arg(long)]
    stage: Option<Stage>,

    /// Number of frames the CPU may run ahead of the GPU
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Number of instances
    #[arg(long)]
    instances: Option<usize>,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        ConfigOverrides {
            stage: self.stage,
            frames_in_flight: self.frames_in_flight,
            instances: self.instances,
        }
        .apply(&mut config)?;
        Ok(config)
    }
}

/// Everything that exists only while a window is open.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: FramePipeline<WgpuBackend>,
}

impl Gpu {
    fn new(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(config.window.title.clone())
            .with_inner_size(PhysicalSize::new(config.window.width, config.window.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no compatible GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: config.pipeline.frames_in_flight as u32,
        };
        surface.configure(&device, &surface_config);

        let backend = WgpuBackend::new(
            Arc::clone(&device),
            queue,
            format,
            surface_config.width,
            surface_config.height,
            config.window.clear_color,
        );
        let mut pipeline =
            FramePipeline::new(backend, &config.pipeline).context("building frame pipeline")?;
        pipeline.set_aspect(aspect(&surface_config))?;

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            format = ?format,
            "GPU initialized"
        );

        Ok(Self {
            window,
            surface,
            device,
            surface_config,
            pipeline,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface_config.width = size.width.max(1);
        self.surface_config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.pipeline
            .backend()
            .resize(self.surface_config.width, self.surface_config.height);
        if let Err(e) = self.pipeline.set_aspect(aspect(&self.surface_config)) {
            tracing::warn!("keeping previous projection: {e}");
        }
    }

    fn redraw(&mut self) {
        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.pipeline.tick(&view);
        output.present();
    }
}

fn aspect(config: &wgpu::SurfaceConfiguration) -> f32 {
    config.width as f32 / config.height.max(1) as f32
}

struct App {
    config: EngineConfig,
    gpu: Option<Gpu>,
    error: Option<anyhow::Error>,
    started: Instant,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            gpu: None,
            error: None,
            started: Instant::now(),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.pipeline.wait_idle();
            let frames = gpu.pipeline.frame();
            let secs = self.started.elapsed().as_secs_f64();
            tracing::info!(
                frames,
                fps = frames as f64 / secs.max(f64::EPSILON),
                blocked_ms = gpu.pipeline.total_wait().as_millis() as u64,
                "shutting down"
            );
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.config) {
            Ok(gpu) => {
                self.started = Instant::now();
                self.gpu = Some(gpu);
            }
            Err(e) => {
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.redraw();
                    gpu.window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = cli.engine_config()?;
    tracing::info!(
        stage = %config.pipeline.scene.stage,
        frames_in_flight = config.pipeline.frames_in_flight,
        "lumen-desktop starting"
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lumen_common::{ConfigOverrides, EngineConfig, Stage};
use lumen_render::{CompletionMode, FramePipeline, HeadlessBackend, HeadlessOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "Headless driver for the lumen frame pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file; defaults are used when omitted
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

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<EngineConfig> {
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
        .apply(&mut config)
        .context("applying command-line overrides")?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Tick the pipeline against a simulated GPU and report stats
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Number of ticks to run
        #[arg(short, long, default_value = "300")]
        ticks: u64,
        /// Simulated GPU time per frame, in milliseconds
        #[arg(long, default_value = "5")]
        latency_ms: u64,
    },
    /// Print the instance records after a number of ticks as JSON
    Dump {
        #[command(flatten)]
        config: ConfigArgs,
        /// Number of ticks to apply before dumping
        #[arg(short, long, default_value = "1")]
        ticks: u64,
    },
    /// Load and validate a config file
    CheckConfig { path: PathBuf },
    /// Write the default config to a file
    InitConfig { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Info => info(),
        Commands::Run {
            config,
            ticks,
            latency_ms,
        } => run(&config.load()?, ticks, Duration::from_millis(latency_ms)),
        Commands::Dump { config, ticks } => dump(&config.load()?, ticks),
        Commands::CheckConfig { path } => check_config(&path),
        Commands::InitConfig { path } => {
            EngineConfig::default()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn info() -> anyhow::Result<()> {
    let defaults = EngineConfig::default();
    println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("common: {}", lumen_common::crate_info());
    println!("render: {}", lumen_render::crate_info());
    println!(
        "defaults: stage={} frames_in_flight={} instances={} increment={}",
        defaults.pipeline.scene.stage,
        defaults.pipeline.frames_in_flight,
        defaults.pipeline.scene.instance_count,
        defaults.pipeline.scene.phase_increment,
    );
    println!("stages: {}", Stage::ALL.map(|s| s.as_str()).join(", "));
    Ok(())
}

fn run(config: &EngineConfig, ticks: u64, latency: Duration) -> anyhow::Result<()> {
    let backend = HeadlessBackend::new(HeadlessOptions {
        completion: CompletionMode::Worker { latency },
        history: 0,
        ..HeadlessOptions::default()
    });
    let mut pipeline = FramePipeline::new(backend.clone(), &config.pipeline)
        .context("building frame pipeline")?;

    tracing::debug!(ticks, latency_ms = latency.as_millis() as u64, "starting headless run");
    let start = Instant::now();
    let mut max_in_flight = 0;
    let mut blocked_ticks = 0u64;
    for _ in 0..ticks {
        let report = pipeline.tick(&());
        max_in_flight = max_in_flight.max(report.in_flight);
        if !report.waited.is_zero() {
            blocked_ticks += 1;
        }
    }
    pipeline.wait_idle();
    let elapsed = start.elapsed();

    let frames = pipeline.frame();
    tracing::info!(
        stage = %pipeline.stage(),
        frames,
        max_in_flight,
        blocked_ticks,
        blocked_ms = pipeline.total_wait().as_millis() as u64,
        "run finished"
    );
    println!("stage:            {}", pipeline.stage());
    println!("frames submitted: {frames}");
    println!(
        "frames in flight: {} (max observed {max_in_flight})",
        pipeline.frames_in_flight()
    );
    println!("elapsed:          {:.1?}", elapsed);
    if frames > 0 {
        println!("frame time:       {:.2?} avg", elapsed / frames as u32);
        println!(
            "cpu blocked:      {blocked_ticks} ticks, {:.1?} total",
            pipeline.total_wait()
        );
    }
    println!("final phase:      {:.4}", pipeline.scene().phase());
    println!("gpu submissions:  {}", backend.submission_count());
    Ok(())
}

fn dump(config: &EngineConfig, ticks: u64) -> anyhow::Result<()> {
    let mut pipeline = FramePipeline::new(HeadlessBackend::default(), &config.pipeline)
        .context("building frame pipeline")?;
    for _ in 0..ticks {
        pipeline.tick(&());
    }
    let scene = pipeline.scene();
    let out = serde_json::json!({
        "stage": scene.stage().as_str(),
        "ticks": scene.ticks(),
        "phase": scene.phase(),
        "instances": scene.instances(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config =
        EngineConfig::load(path).with_context(|| format!("invalid config {}", path.display()))?;
    let pipeline = &config.pipeline;
    println!(
        "{}: ok (stage={}, frames_in_flight={}, instances={})",
        path.display(),
        pipeline.scene.stage,
        pipeline.frames_in_flight,
        pipeline.scene.instance_count
    );
    Ok(())
}

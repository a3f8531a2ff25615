//! Shared configuration for the lumen frame pipeline.
//!
//! Every knob the pipeline reads at startup lives here: frames in flight,
//! the tutorial stage, instance layout and camera parameters. Configuration is
//! plain data, loaded once and handed to constructors; nothing here is global.

mod config;

pub use config::{
    CameraConfig, ConfigError, ConfigOverrides, EngineConfig, MAX_FRAMES_IN_FLIGHT, PipelineConfig,
    SceneConfig, Stage, WindowConfig,
};

pub fn crate_info() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"))
}

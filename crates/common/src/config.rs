use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Upper bound accepted for `frames_in_flight`. Deeper pipelines only add latency.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frames_in_flight must be in 1..={max}, got {got}")]
    FramesInFlight { got: usize, max: usize },
    #[error("stage {stage} needs at least one instance")]
    NoInstances { stage: Stage },
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },
    #[error("unknown stage {0:?} (expected indirect, instanced or camera)")]
    UnknownStage(String),
}

/// Which stage of the renderer to run. Later stages are supersets of earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Single triangle, angle-only uniforms, geometry read through the resource table.
    Indirect,
    /// Instanced cubes drawn straight into clip space.
    Instanced,
    /// Instanced cubes behind a perspective camera.
    #[default]
    Camera,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Indirect, Stage::Instanced, Stage::Camera];

    /// Whether per-slot instance storage exists for this stage.
    pub fn uses_instances(self) -> bool {
        !matches!(self, Stage::Indirect)
    }

    /// Whether geometry is bound through the indirect resource table.
    pub fn uses_resource_table(self) -> bool {
        matches!(self, Stage::Indirect)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Indirect => "indirect",
            Stage::Instanced => "instanced",
            Stage::Camera => "camera",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownStage(s.to_string()))
    }
}

/// Perspective camera parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            aspect: 1.0,
            near: 0.03,
            far: 500.0,
        }
    }
}

/// Scene update parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub stage: Stage,
    /// Number of instances, fixed for the lifetime of the pipeline.
    pub instance_count: usize,
    /// Phase angle (radians) before the first tick.
    pub phase_start: f32,
    /// Phase added per tick. Deterministic, not wall-clock based.
    pub phase_increment: f32,
    /// Uniform scale applied to every instance.
    pub instance_scale: f32,
    /// Pivot the instance row orbits around.
    pub object_position: Vec3,
    pub camera: CameraConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            instance_count: 32,
            phase_start: 0.0,
            phase_increment: 0.01,
            instance_scale: 0.1,
            object_position: Vec3::new(0.0, 0.0, -5.0),
            camera: CameraConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Defaults tuned for `stage`: without a camera the instance row is kept
    /// inside the unit depth range instead of five units down -Z.
    pub fn for_stage(stage: Stage) -> Self {
        let object_position = match stage {
            Stage::Camera => Vec3::new(0.0, 0.0, -5.0),
            Stage::Instanced | Stage::Indirect => Vec3::new(0.0, 0.0, 0.5),
        };
        Self {
            stage,
            object_position,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stage.uses_instances() && self.instance_count == 0 {
            return Err(ConfigError::NoInstances { stage: self.stage });
        }
        let scalars = [
            ("phase_start", self.phase_start),
            ("phase_increment", self.phase_increment),
            ("instance_scale", self.instance_scale),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
        }
        if !self.object_position.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "object_position",
            });
        }
        Ok(())
    }
}

/// Frame pipeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of frames the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,
    pub scene: SceneConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            scene: SceneConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::FramesInFlight {
                got: self.frames_in_flight,
                max: MAX_FRAMES_IN_FLIGHT,
            });
        }
        self.scene.validate()
    }
}

/// Desktop window parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Clear color, linear RGBA.
    pub clear_color: [f64; 4],
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "lumen".into(),
            width: 1280,
            height: 720,
            clear_color: [1.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,
    pub window: WindowConfig,
}

impl EngineConfig {
    /// Load and validate a JSON configuration file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()
    }
}

/// Command-line overrides applied on top of a loaded config.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverrides {
    pub stage: Option<Stage>,
    pub frames_in_flight: Option<usize>,
    pub instances: Option<usize>,
}

impl ConfigOverrides {
    /// Apply the overrides and re-validate. Switching stage also moves the
    /// instance row to that stage's default position.
    pub fn apply(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        let pipeline = &mut config.pipeline;
        if let Some(stage) = self.stage {
            if stage != pipeline.scene.stage {
                pipeline.scene.stage = stage;
                pipeline.scene.object_position = SceneConfig::for_stage(stage).object_position;
            }
        }
        if let Some(frames) = self.frames_in_flight {
            pipeline.frames_in_flight = frames;
        }
        if let Some(instances) = self.instances {
            pipeline.scene.instance_count = instances;
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scene() {
        let config = EngineConfig::default();
        assert_eq!(config.pipeline.frames_in_flight, 3);
        assert_eq!(config.pipeline.scene.instance_count, 32);
        assert_eq!(config.pipeline.scene.phase_increment, 0.01);
        assert_eq!(config.pipeline.scene.stage, Stage::Camera);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let config = PipelineConfig {
            frames_in_flight: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FramesInFlight { got: 0, .. })
        ));
    }

    #[test]
    fn instanced_stage_needs_instances() {
        let scene = SceneConfig {
            instance_count: 0,
            ..SceneConfig::for_stage(Stage::Instanced)
        };
        assert!(matches!(
            scene.validate(),
            Err(ConfigError::NoInstances {
                stage: Stage::Instanced
            })
        ));

        let indirect = SceneConfig {
            instance_count: 0,
            ..SceneConfig::for_stage(Stage::Indirect)
        };
        assert!(indirect.validate().is_ok());
    }

    #[test]
    fn non_finite_increment_is_rejected() {
        let scene = SceneConfig {
            phase_increment: f32::INFINITY,
            ..SceneConfig::default()
        };
        assert!(matches!(
            scene.validate(),
            Err(ConfigError::NotFinite {
                field: "phase_increment"
            })
        ));
    }

    #[test]
    fn stage_parses_case_insensitively() {
        assert_eq!("Camera".parse::<Stage>().unwrap(), Stage::Camera);
        assert_eq!("indirect".parse::<Stage>().unwrap(), Stage::Indirect);
        assert!("deferred".parse::<Stage>().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "pipeline": { "frames_in_flight": 2, "scene": { "stage": "instanced" } } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pipeline.frames_in_flight, 2);
        assert_eq!(config.pipeline.scene.stage, Stage::Instanced);
        assert_eq!(config.pipeline.scene.instance_count, 32);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn load_and_save_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumen.json");

        let mut config = EngineConfig::default();
        config.pipeline.frames_in_flight = 2;
        config.window.title = "bench".into();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "pipeline": { "frames_in_flight": 0 } }"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::FramesInFlight { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(EngineConfig::load(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn overrides_replace_only_what_is_set() {
        let mut config = EngineConfig::default();
        let overrides = ConfigOverrides {
            frames_in_flight: Some(2),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config).unwrap();
        assert_eq!(config.pipeline.frames_in_flight, 2);
        assert_eq!(config.pipeline.scene, SceneConfig::default());
    }

    #[test]
    fn stage_override_moves_the_instance_row() {
        let mut config = EngineConfig::default();
        let overrides = ConfigOverrides {
            stage: Some(Stage::Instanced),
            instances: Some(8),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config).unwrap();
        assert_eq!(config.pipeline.scene.stage, Stage::Instanced);
        assert_eq!(config.pipeline.scene.object_position, Vec3::new(0.0, 0.0, 0.5));
        assert_eq!(config.pipeline.scene.instance_count, 8);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = EngineConfig::default();
        let overrides = ConfigOverrides {
            frames_in_flight: Some(MAX_FRAMES_IN_FLIGHT + 1),
            ..ConfigOverrides::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }
}

use crate::records::{FrameUniforms, InstanceRecord};
use bytemuck::Zeroable;
use lumen_common::{ConfigError, SceneConfig, Stage};
use lumen_math::{
    MathError, Mat4, Vec3, Vec4, add, identity, perspective, rotate_y, rotate_z, scale, translate,
};
use std::f32::consts::TAU;

/// Errors from building a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("invalid scene config: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid camera: {0}")]
    Camera(#[from] MathError),
}

/// Destination for one tick's data: the storage of the current frame slot.
pub trait FrameSink {
    fn write_uniforms(&mut self, bytes: &[u8]);
    fn write_instances(&mut self, bytes: &[u8]);
}

/// Deterministic scene state advanced once per tick.
///
/// The phase is derived from the tick count (`start + increment * ticks`)
/// rather than summed tick by tick, so long runs do not drift and two runs
/// with the same config are bit-identical.
#[derive(Debug, Clone)]
pub struct Scene {
    config: SceneConfig,
    projection: Mat4,
    ticks: u64,
    instances: Vec<InstanceRecord>,
    uniforms: FrameUniforms,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Result<Self, SceneError> {
        config.validate()?;
        let projection = camera_projection(&config)?;
        let instance_count = if config.stage.uses_instances() {
            config.instance_count
        } else {
            0
        };
        tracing::info!(
            stage = %config.stage,
            instances = instance_count,
            increment = config.phase_increment,
            "scene initialized"
        );
        let mut scene = Self {
            projection,
            ticks: 0,
            instances: vec![InstanceRecord::zeroed(); instance_count],
            uniforms: FrameUniforms::Angle(config.phase_start),
            config,
        };
        scene.recompute();
        Ok(scene)
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.config.stage
    }

    /// Ticks applied so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Phase angle of the current state.
    pub fn phase(&self) -> f32 {
        self.phase_at(self.ticks)
    }

    /// Phase angle after `ticks` ticks.
    pub fn phase_at(&self, ticks: u64) -> f32 {
        (self.config.phase_start as f64 + self.config.phase_increment as f64 * ticks as f64) as f32
    }

    /// Instance records of the current state (empty for the indirect stage).
    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    pub fn uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    /// Byte size of one frame's instance storage.
    pub fn instance_bytes(&self) -> usize {
        std::mem::size_of_val(self.instances.as_slice())
    }

    /// Byte size of one frame's uniform storage.
    pub fn uniform_bytes(&self) -> usize {
        self.uniforms.byte_size()
    }

    /// Change the camera aspect ratio, e.g. after a window resize.
    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), SceneError> {
        let mut config = self.config.clone();
        config.camera.aspect = aspect;
        self.projection = camera_projection(&config)?;
        self.config = config;
        self.recompute();
        Ok(())
    }

    /// Advance one tick and recompute every instance and the uniforms.
    pub fn step(&mut self) {
        self.ticks += 1;
        self.recompute();
    }

    /// Advance one tick and write the result into `slot`.
    ///
    /// Only `slot` is touched; which slot that is is the caller's business.
    pub fn update(&mut self, slot: &mut impl FrameSink) {
        self.step();
        self.write(slot);
    }

    /// Write the current state into `slot` without advancing.
    pub fn write(&self, slot: &mut impl FrameSink) {
        slot.write_uniforms(self.uniforms.encode().as_bytes());
        if !self.instances.is_empty() {
            slot.write_instances(bytemuck::cast_slice(&self.instances));
        }
    }

    fn recompute(&mut self) {
        let phase = self.phase();
        self.uniforms = match self.config.stage {
            Stage::Indirect => FrameUniforms::Angle(phase),
            Stage::Instanced => FrameUniforms::Camera {
                perspective_transform: identity(),
                world_transform: identity(),
            },
            Stage::Camera => FrameUniforms::Camera {
                perspective_transform: self.projection,
                world_transform: identity(),
            },
        };

        let count = self.instances.len();
        if count == 0 {
            return;
        }

        let object = self.config.object_position;
        let parent = translate(object) * rotate_y(-phase) * translate(-object);
        let child_scale = scale(Vec3::splat(self.config.instance_scale));
        let child_rotation = rotate_y(phase) * rotate_z(phase);

        for (i, record) in self.instances.iter_mut().enumerate() {
            let offset = instance_offset(i, count, phase);
            let child_translate = translate(add(object, offset));
            let transform = parent * child_translate * child_rotation * child_scale;
            *record = InstanceRecord::new(transform, instance_color(i, count));
        }
        tracing::trace!(ticks = self.ticks, phase, "scene recomputed");
    }
}

fn camera_projection(config: &SceneConfig) -> Result<Mat4, MathError> {
    match config.stage {
        Stage::Camera => {
            let cam = &config.camera;
            perspective(cam.fov_degrees.to_radians(), cam.aspect, cam.near, cam.far)
        }
        Stage::Instanced | Stage::Indirect => Ok(identity()),
    }
}

/// Offset of instance `index` from the object position at `phase`.
///
/// Instances are spread evenly across `x in [-1, 1]` and bob on a sine wave
/// that repeats every 1.0 of phase.
pub fn instance_offset(index: usize, count: usize, phase: f32) -> Vec3 {
    let t = index as f32 / count as f32;
    let xoff = (t * 2.0 - 1.0) + 1.0 / count as f32;
    let yoff = ((t + phase) * TAU).sin();
    Vec3::new(xoff, yoff, 0.0)
}

/// Color of instance `index`: red ramps up, green down, blue follows one sine period.
pub fn instance_color(index: usize, count: usize) -> Vec4 {
    let t = index as f32 / count as f32;
    Vec4::new(t, 1.0 - t, (TAU * t).sin(), 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_common::CameraConfig;
    use lumen_math::Mat3;

    #[derive(Default)]
    struct RecordingSink {
        uniforms: Vec<u8>,
        instances: Vec<u8>,
        instance_writes: usize,
    }

    impl FrameSink for RecordingSink {
        fn write_uniforms(&mut self, bytes: &[u8]) {
            self.uniforms = bytes.to_vec();
        }

        fn write_instances(&mut self, bytes: &[u8]) {
            self.instances = bytes.to_vec();
            self.instance_writes += 1;
        }
    }

    #[test]
    fn first_state_is_phase_start() {
        let scene = Scene::new(SceneConfig::default()).unwrap();
        assert_eq!(scene.ticks(), 0);
        assert_eq!(scene.phase(), 0.0);
        assert_eq!(scene.instances().len(), 32);
    }

    #[test]
    fn phase_advances_by_fixed_increment() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        scene.step();
        scene.step();
        assert_eq!(scene.ticks(), 2);
        assert!((scene.phase() - 0.02).abs() < 1e-7);
    }

    #[test]
    fn zero_phase_transform_is_translate_then_scale() {
        let config = SceneConfig::default();
        let scene = Scene::new(config.clone()).unwrap();
        for (i, rec) in scene.instances().iter().enumerate() {
            let offset = instance_offset(i, 32, 0.0);
            let expected = translate(config.object_position + offset)
                * scale(Vec3::splat(config.instance_scale));
            assert!(rec.transform().abs_diff_eq(expected, 1e-6), "instance {i}");
        }
    }

    #[test]
    fn instances_are_spread_across_unit_x() {
        let first = instance_offset(0, 32, 0.0);
        let last = instance_offset(31, 32, 0.0);
        assert!((first.x - (-1.0 + 1.0 / 32.0)).abs() < 1e-6);
        assert!((last.x - (1.0 - 1.0 / 32.0)).abs() < 1e-6);
        assert_eq!(first.y, 0.0);
    }

    #[test]
    fn colors_ramp_with_index() {
        assert_eq!(instance_color(0, 32), Vec4::new(0.0, 1.0, 0.0, 1.0));
        let mid = instance_color(16, 32);
        assert_eq!(mid.x, 0.5);
        assert_eq!(mid.y, 0.5);
        assert!(mid.z.abs() < 1e-6);
        let quarter = instance_color(8, 32);
        assert!((quarter.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn update_writes_uniforms_and_instances() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let mut sink = RecordingSink::default();
        scene.update(&mut sink);

        assert_eq!(scene.ticks(), 1);
        assert_eq!(sink.uniforms.len(), scene.uniform_bytes());
        assert_eq!(sink.instances.len(), scene.instance_bytes());
        assert_eq!(sink.instances.len(), 32 * 80);

        let written: Vec<InstanceRecord> = bytemuck::pod_collect_to_vec(&sink.instances);
        assert_eq!(written, scene.instances());
    }

    #[test]
    fn indirect_stage_writes_only_the_angle() {
        let mut scene = Scene::new(SceneConfig::for_stage(Stage::Indirect)).unwrap();
        let mut sink = RecordingSink::default();
        for _ in 0..3 {
            scene.update(&mut sink);
        }
        assert!(scene.instances().is_empty());
        assert_eq!(sink.instance_writes, 0);
        assert_eq!(*scene.uniforms(), FrameUniforms::Angle(scene.phase_at(3)));
        assert_eq!(sink.uniforms.len(), 16);
    }

    #[test]
    fn instanced_stage_has_identity_camera() {
        let scene = Scene::new(SceneConfig::for_stage(Stage::Instanced)).unwrap();
        assert_eq!(
            *scene.uniforms(),
            FrameUniforms::Camera {
                perspective_transform: Mat4::IDENTITY,
                world_transform: Mat4::IDENTITY,
            }
        );
    }

    #[test]
    fn camera_stage_uses_configured_projection() {
        let scene = Scene::new(SceneConfig::default()).unwrap();
        let expected = perspective(45f32.to_radians(), 1.0, 0.03, 500.0).unwrap();
        match scene.uniforms() {
            FrameUniforms::Camera {
                perspective_transform,
                world_transform,
            } => {
                assert_eq!(*perspective_transform, expected);
                assert_eq!(*world_transform, Mat4::IDENTITY);
            }
            other => panic!("unexpected uniforms {other:?}"),
        }
    }

    #[test]
    fn invalid_camera_is_rejected() {
        let config = SceneConfig {
            camera: CameraConfig {
                near: 0.0,
                ..CameraConfig::default()
            },
            ..SceneConfig::default()
        };
        assert!(matches!(
            Scene::new(config),
            Err(SceneError::Camera(MathError::NonPositiveNear(_)))
        ));
    }

    #[test]
    fn set_aspect_keeps_old_projection_on_error() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let before = *scene.uniforms();
        assert!(scene.set_aspect(0.0).is_err());
        assert_eq!(*scene.uniforms(), before);
        assert_eq!(scene.config().camera.aspect, 1.0);

        scene.set_aspect(16.0 / 9.0).unwrap();
        assert_ne!(*scene.uniforms(), before);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SceneConfig {
            instance_count: 0,
            ..SceneConfig::default()
        };
        assert!(matches!(Scene::new(config), Err(SceneError::Config(_))));
    }

    #[test]
    fn transform_composes_pivot_orbit_then_local_spin() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        for _ in 0..37 {
            scene.step();
        }
        let phase = scene.phase();
        assert!((phase - 0.37).abs() < 1e-6);

        let config = scene.config().clone();
        let object = config.object_position;
        let count = config.instance_count;
        for (i, rec) in scene.instances().iter().enumerate() {
            let offset = instance_offset(i, count, phase);
            let expected = Mat4::from_translation(object)
                * Mat4::from_rotation_y(-phase)
                * Mat4::from_translation(-object)
                * Mat4::from_translation(object + offset)
                * Mat4::from_rotation_y(phase)
                * Mat4::from_rotation_z(phase)
                * Mat4::from_scale(Vec3::splat(config.instance_scale));
            assert!(rec.transform().abs_diff_eq(expected, 1e-5), "instance {i}");
        }

        // Walk one cube corner through the chain, rightmost matrix first.
        let i = 5;
        let corner = Vec3::new(1.0, -1.0, 1.0);
        let mut p = corner * config.instance_scale;
        p = Mat3::from_rotation_z(phase) * p;
        p = Mat3::from_rotation_y(phase) * p;
        p += object + instance_offset(i, count, phase);
        p -= object;
        p = Mat3::from_rotation_y(-phase) * p;
        p += object;
        let got = scene.instances()[i].transform().transform_point3(corner);
        assert!(got.abs_diff_eq(p, 1e-5), "{got} vs {p}");

        // Swapping the local spin order moves the corner elsewhere.
        let swapped = Mat3::from_rotation_y(phase) * Mat3::from_rotation_z(phase);
        let reordered = Mat3::from_rotation_z(phase) * Mat3::from_rotation_y(phase);
        assert!(!(swapped * corner).abs_diff_eq(reordered * corner, 1e-3));
    }

    fn run(config: &SceneConfig, ticks: u64) -> Vec<Vec<InstanceRecord>> {
        let mut scene = Scene::new(config.clone()).unwrap();
        (0..ticks)
            .map(|_| {
                scene.step();
                scene.instances().to_vec()
            })
            .collect()
    }

    fn as_bits(records: &[InstanceRecord]) -> Vec<u32> {
        bytemuck::cast_slice::<InstanceRecord, u32>(records).to_vec()
    }

    #[test]
    fn independent_runs_are_bit_identical() {
        let config = SceneConfig::default();
        let a = run(&config, 750);
        let b = run(&config, 750);
        assert_eq!(a.len(), b.len());
        for (tick, (x, y)) in a.iter().zip(&b).enumerate() {
            assert_eq!(as_bits(x), as_bits(y), "diverged at tick {tick}");
        }
    }

    #[test]
    fn different_increments_diverge() {
        let slow = SceneConfig {
            phase_increment: 0.005,
            ..SceneConfig::default()
        };
        let a = run(&SceneConfig::default(), 10);
        let b = run(&slow, 10);
        assert_ne!(as_bits(&a[9]), as_bits(&b[9]));
    }

    #[test]
    fn bobbing_repeats_every_unit_of_phase() {
        let scene = Scene::new(SceneConfig::default()).unwrap();
        let count = scene.config().instance_count;
        let start = instance_offset(0, count, scene.phase_at(0)).y;

        // 0.01 per tick: one full period every 100 ticks.
        for ticks in [100, 300, 600, 1000] {
            let y = instance_offset(0, count, scene.phase_at(ticks)).y;
            assert!((y - start).abs() < 1e-3, "ticks {ticks}: {y} vs {start}");
        }

        let half = instance_offset(0, count, scene.phase_at(25)).y;
        assert!((half - 1.0).abs() < 1e-3);
    }

    #[test]
    fn long_runs_do_not_drift() {
        let scene = Scene::new(SceneConfig::default()).unwrap();
        let expected = 0.01_f64 * 100_000.0;
        assert!((scene.phase_at(100_000) as f64 - expected).abs() < 1e-3);
    }

    #[test]
    fn every_stage_is_deterministic() {
        for stage in Stage::ALL {
            let mut a = Scene::new(SceneConfig::for_stage(stage)).unwrap();
            let mut b = Scene::new(SceneConfig::for_stage(stage)).unwrap();
            for _ in 0..50 {
                a.step();
                b.step();
            }
            assert_eq!(a.uniforms(), b.uniforms(), "stage {stage}");
            assert_eq!(as_bits(a.instances()), as_bits(b.instances()));
        }
    }

    #[test]
    fn instance_records_serialize_for_inspection() {
        let scene = Scene::new(SceneConfig::default()).unwrap();
        let json = serde_json::to_value(&scene.instances()[0]).unwrap();
        assert_eq!(json["color"], serde_json::json!([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(json["transform"].as_array().unwrap().len(), 4);
    }
}

use bytemuck::{Pod, Zeroable};
use lumen_math::{Mat4, Vec4};
use serde::Serialize;

/// Per-instance data as the vertex stage reads it.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable, Serialize)]
pub struct InstanceRecord {
    /// Column-major model transform.
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl InstanceRecord {
    pub fn new(transform: Mat4, color: Vec4) -> Self {
        Self {
            transform: transform.to_cols_array_2d(),
            color: color.to_array(),
        }
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }

    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }
}

/// Camera block for the instanced stages.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CameraData {
    pub perspective_transform: [[f32; 4]; 4],
    pub world_transform: [[f32; 4]; 4],
}

/// Angle block for the indirect stage, padded to a 16-byte uniform.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct AngleData {
    pub angle: f32,
    pub _pad: [f32; 3],
}

/// Uniforms recomputed once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameUniforms {
    Camera {
        perspective_transform: Mat4,
        world_transform: Mat4,
    },
    Angle(f32),
}

impl FrameUniforms {
    /// Size in bytes of the uniform block the GPU reads for this variant.
    pub fn byte_size(&self) -> usize {
        match self {
            FrameUniforms::Camera { .. } => std::mem::size_of::<CameraData>(),
            FrameUniforms::Angle(_) => std::mem::size_of::<AngleData>(),
        }
    }

    pub fn encode(&self) -> UniformBlock {
        match *self {
            FrameUniforms::Camera {
                perspective_transform,
                world_transform,
            } => UniformBlock::Camera(CameraData {
                perspective_transform: perspective_transform.to_cols_array_2d(),
                world_transform: world_transform.to_cols_array_2d(),
            }),
            FrameUniforms::Angle(angle) => UniformBlock::Angle(AngleData {
                angle,
                _pad: [0.0; 3],
            }),
        }
    }
}

/// GPU layout of [`FrameUniforms`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformBlock {
    Camera(CameraData),
    Angle(AngleData),
}

impl UniformBlock {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformBlock::Camera(data) => bytemuck::bytes_of(data),
            UniformBlock::Angle(data) => bytemuck::bytes_of(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::{Vec3, translate};

    #[test]
    fn instance_record_layout() {
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 80);
        assert_eq!(std::mem::size_of::<CameraData>(), 128);
        assert_eq!(std::mem::size_of::<AngleData>(), 16);
    }

    #[test]
    fn instance_record_keeps_column_major_order() {
        let m = translate(Vec3::new(1.0, 2.0, 3.0));
        let rec = InstanceRecord::new(m, Vec4::new(0.1, 0.2, 0.3, 1.0));
        assert_eq!(rec.transform[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(rec.transform(), m);
        assert_eq!(rec.color(), Vec4::new(0.1, 0.2, 0.3, 1.0));
    }

    #[test]
    fn encoded_uniforms_match_declared_size() {
        let camera = FrameUniforms::Camera {
            perspective_transform: Mat4::IDENTITY,
            world_transform: Mat4::IDENTITY,
        };
        assert_eq!(camera.encode().as_bytes().len(), camera.byte_size());

        let angle = FrameUniforms::Angle(0.5);
        let block = angle.encode();
        assert_eq!(block.as_bytes().len(), angle.byte_size());
        let decoded: &AngleData = bytemuck::from_bytes(block.as_bytes());
        assert_eq!(decoded.angle, 0.5);
    }
}

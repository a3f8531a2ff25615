use lumen_common::Stage;

/// WGSL for the indirect stage: one triangle whose vertices are fetched
/// through the resource table and spun by the per-frame angle.
pub const INDIRECT_SHADER: &str = r#"
struct AngleData {
    angle: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
};

@group(0) @binding(0)
var<uniform> frame: AngleData;

@group(1) @binding(0)
var<storage, read> positions: array<vec4<f32>>;
@group(1) @binding(1)
var<storage, read> colors: array<vec4<f32>>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_id: u32) -> VertexOutput {
    let a = frame.angle;
    let rotation = mat3x3<f32>(
        vec3<f32>(cos(a), sin(a), 0.0),
        vec3<f32>(-sin(a), cos(a), 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
    );
    var out: VertexOutput;
    out.clip_position = vec4<f32>(rotation * positions[vertex_id].xyz, 1.0);
    out.color = colors[vertex_id].rgb;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

/// WGSL for the instanced stages. Without a camera the uniforms hold
/// identity matrices, so one program serves both.
pub const INSTANCED_SHADER: &str = r#"
struct CameraData {
    perspective_transform: mat4x4<f32>,
    world_transform: mat4x4<f32>,
};

struct InstanceData {
    transform: mat4x4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: CameraData;
@group(0) @binding(1)
var<storage, read> instances: array<InstanceData>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @builtin(instance_index) instance_id: u32,
) -> VertexOutput {
    let instance = instances[instance_id];
    var pos = instance.transform * vec4<f32>(position, 1.0);
    pos = camera.perspective_transform * camera.world_transform * pos;

    var out: VertexOutput;
    out.clip_position = pos;
    out.color = instance.color.rgb;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

pub fn source_for(stage: Stage) -> &'static str {
    match stage {
        Stage::Indirect => INDIRECT_SHADER,
        Stage::Instanced | Stage::Camera => INSTANCED_SHADER,
    }
}

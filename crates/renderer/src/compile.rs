use std::borrow::Cow;

use wgpu::naga;

use crate::error::{InitError, ShaderStage};

/// Pass-through vertex stage: position and texture coordinate go out
/// unmodified.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_tex_coord;
layout(location = 0) out vec2 v_tex_coord;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
    v_tex_coord = a_tex_coord;
}
";

/// Dual-channel decode: alpha from the red channel of the left half, colour
/// from the right half, both sampled from the same texture.
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_tex_coord;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D u_frame;
layout(set = 0, binding = 1) uniform sampler u_frame_sampler;

void main() {
    vec2 left_uv = vec2(v_tex_coord.x * 0.5, v_tex_coord.y);
    vec2 right_uv = vec2(0.5 + v_tex_coord.x * 0.5, v_tex_coord.y);

    vec3 color = texture(sampler2D(u_frame, u_frame_sampler), right_uv).rgb;
    float alpha = texture(sampler2D(u_frame, u_frame_sampler), left_uv).r;

    out_color = vec4(color, alpha);
}
";

/// Vertex and fragment sources of one program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

impl ProgramSource<'static> {
    /// The dual-channel alpha program.
    pub fn dual_channel() -> Self {
        Self {
            vertex: VERTEX_SHADER_GLSL,
            fragment: FRAGMENT_SHADER_GLSL,
        }
    }
}

/// Compiles one GLSL stage, turning driver diagnostics into an [`InitError`].
pub(crate) fn compile_shader(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &str,
) -> Result<wgpu::ShaderModule, InitError> {
    let (label, naga_stage) = match stage {
        ShaderStage::Vertex => ("dual-channel vertex", naga::ShaderStage::Vertex),
        ShaderStage::Fragment => ("dual-channel fragment", naga::ShaderStage::Fragment),
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage: naga_stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        tracing::debug!(%stage, "shader compilation rejected by driver");
        return Err(InitError::ShaderCompile {
            stage,
            log: err.to_string(),
        });
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_samples_both_halves() {
        let source = ProgramSource::dual_channel();
        assert!(source.fragment.contains("v_tex_coord.x * 0.5"));
        assert!(source.fragment.contains("0.5 + v_tex_coord.x * 0.5"));
        assert!(source.fragment.contains(".r;"));
    }

    #[test]
    fn vertex_declares_fixed_attribute_locations() {
        let source = ProgramSource::dual_channel();
        assert!(source
            .vertex
            .contains("layout(location = 0) in vec2 a_position"));
        assert!(source
            .vertex
            .contains("layout(location = 1) in vec2 a_tex_coord"));
    }
}

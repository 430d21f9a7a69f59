// ============================================================================
// GPU SHADERS — WGSL compute kernels for filter fragment programs
// ============================================================================
//
// Every filter ships a GLSL ES fragment source.  The wgpu backend runs an
// equivalent WGSL compute kernel per filter type with a fixed binding layout:
//
//   @binding(0)  input texture            (previous pass output)
//   @binding(1)  output storage texture
//   @binding(2)  PassParams uniform       (width, height)
//   @binding(3)  filter uniform block     (reflected from the GLSL uniforms)

/// A compute kernel plus the entry point to build a pipeline from.
#[derive(Debug, Clone, Copy)]
pub struct FilterKernel {
    pub label: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
}

/// Ink kernel.  The fragment program samples `uTexture` and writes it back
/// untouched, so this is a straight copy; `uMyParameter` lives in slot 0 of
/// `filter_uniforms` and is never read.
pub const INK_KERNEL_SHADER: &str = r#"
struct PassParams {
    width:  u32,
    height: u32,
    _pad0:  u32,
    _pad1:  u32,
};

@group(0) @binding(0) var input_tex:  texture_2d<f32>;
@group(0) @binding(1) var output_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<uniform> params: PassParams;
@group(0) @binding(3) var<storage, read> filter_uniforms: array<f32>;

@compute @workgroup_size(16, 16)
fn cs_ink(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) { return; }

    let color = textureLoad(input_tex, vec2<u32>(gid.x, gid.y), 0);
    textureStore(output_tex, vec2<u32>(gid.x, gid.y), color);
}
"#;

/// Look up the kernel that implements `filter_type`'s fragment program.
pub fn kernel_for(filter_type: &str) -> Option<FilterKernel> {
    match filter_type {
        "Ink" => Some(FilterKernel {
            label: "ink_kernel",
            source: INK_KERNEL_SHADER,
            entry_point: "cs_ink",
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ink_kernel_is_registered() {
        let kernel = kernel_for("Ink").unwrap();
        assert!(kernel.source.contains(&format!("fn {}(", kernel.entry_point)));
        assert!(kernel_for("Sepia").is_none());
    }
}

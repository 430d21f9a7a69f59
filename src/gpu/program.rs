// ============================================================================
// SHADER PROGRAMS — uniform reflection + the GL-style uniform upload surface
// ============================================================================
//
// Filters describe their GPU side the way a WebGL filter does: a GLSL ES
// fragment source, a "get uniform location" query and `uniform1f` uploads.
// wgpu has no named uniforms, so a `ShaderProgram` reflects the `uniform`
// declarations of both stages into slots of a flat f32 block.  The
// block is bound to the filter's compute kernel as a storage buffer.

use std::collections::HashMap;

use crate::filters::FilterError;
use crate::log_warn;

/// What a reflected uniform holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    /// `vec2` / `vec3` / `vec4`; the payload is the component count.
    Vector(u32),
    Sampler2d,
}

impl UniformKind {
    fn from_glsl(ty: &str) -> Option<Self> {
        match ty {
            "float" => Some(UniformKind::Float),
            "vec2" => Some(UniformKind::Vector(2)),
            "vec3" => Some(UniformKind::Vector(3)),
            "vec4" => Some(UniformKind::Vector(4)),
            "sampler2D" => Some(UniformKind::Sampler2d),
            _ => None,
        }
    }

    /// Number of f32 slots occupied in the uniform block.
    fn slot_width(self) -> u32 {
        match self {
            UniformKind::Float => 1,
            UniformKind::Vector(n) => n,
            UniformKind::Sampler2d => 0,
        }
    }
}

/// Handle to one uniform inside a linked [`ShaderProgram`].
///
/// For samplers `slot` is the texture unit in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub kind: UniformKind,
    pub slot: u32,
}

/// A linked vertex/fragment pair whose uniforms have been reflected.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    uniforms: HashMap<String, UniformLocation>,
    block_len: u32,
}

impl ShaderProgram {
    /// Reflect a vertex/fragment pair.  Fails when either stage has no `main`
    /// entry point or declares a uniform this host cannot lay out.  A uniform
    /// declared in both stages shares one location, and the declarations
    /// must agree on its type.
    pub fn link(vertex_source: &str, fragment_source: &str) -> Result<Self, FilterError> {
        let mut program = Self {
            uniforms: HashMap::new(),
            block_len: 0,
        };
        let mut texture_unit = 0u32;
        for (stage, source) in [("vertex", vertex_source), ("fragment", fragment_source)] {
            if !declares_main(source) {
                return Err(FilterError::ShaderLink(format!("{} source has no `void main()`", stage)));
            }
            program.reflect_uniforms(source, &mut texture_unit)?;
        }
        Ok(program)
    }

    fn reflect_uniforms(&mut self, source: &str, texture_unit: &mut u32) -> Result<(), FilterError> {
        for statement in source.split(';') {
            let mut tokens = statement.split_whitespace().peekable();
            if tokens.peek() != Some(&"uniform") {
                continue;
            }
            tokens.next();

            let mut ty = tokens.next();
            if matches!(ty, Some("lowp" | "mediump" | "highp")) {
                ty = tokens.next();
            }
            let ty = ty.ok_or_else(|| {
                FilterError::ShaderLink(format!("incomplete uniform declaration `{}`", statement.trim()))
            })?;
            let kind = UniformKind::from_glsl(ty).ok_or_else(|| {
                FilterError::ShaderLink(format!("unsupported uniform type `{}`", ty))
            })?;

            let names: String = tokens.collect::<Vec<_>>().join("");
            for name in names.split(',').filter(|n| !n.is_empty()) {
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(FilterError::ShaderLink(format!(
                        "unsupported uniform declarator `{}`",
                        name
                    )));
                }
                if let Some(existing) = self.uniforms.get(name) {
                    if existing.kind != kind {
                        return Err(FilterError::ShaderLink(format!(
                            "uniform `{}` declared as both {:?} and {:?}",
                            name, existing.kind, kind
                        )));
                    }
                    continue;
                }
                let slot = match kind {
                    UniformKind::Sampler2d => {
                        *texture_unit += 1;
                        *texture_unit - 1
                    }
                    _ => {
                        self.block_len += kind.slot_width();
                        self.block_len - kind.slot_width()
                    }
                };
                self.uniforms.insert(name.to_string(), UniformLocation { kind, slot });
            }
        }
        Ok(())
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Names of every reflected uniform, sorted.
    pub fn uniform_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.uniforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of f32 slots the program's non-sampler uniforms need.
    pub fn block_len(&self) -> u32 {
        self.block_len
    }
}

fn declares_main(source: &str) -> bool {
    let squashed: String = source.split_whitespace().collect();
    squashed.contains("voidmain(")
}

/// The GL-flavoured surface a filter talks to when it binds its uniforms.
///
/// Mirrors WebGL: a missing uniform resolves to `None`, and uploading to a
/// `None` location is a silent no-op.
pub trait GlContext {
    fn get_uniform_location(&self, program: &ShaderProgram, name: &str) -> Option<UniformLocation>;

    fn uniform1f(&mut self, location: Option<UniformLocation>, value: f32);
}

/// CPU-side staging for one program's uniform values.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    values: Vec<f32>,
}

/// Storage buffers may not be empty; keep at least one vec4 worth of slots.
const MIN_BLOCK_LEN: usize = 4;

impl UniformBlock {
    pub fn new(program: &ShaderProgram) -> Self {
        Self {
            values: vec![0.0; (program.block_len() as usize).max(MIN_BLOCK_LEN)],
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }
}

impl GlContext for UniformBlock {
    fn get_uniform_location(&self, program: &ShaderProgram, name: &str) -> Option<UniformLocation> {
        program.uniform_location(name)
    }

    fn uniform1f(&mut self, location: Option<UniformLocation>, value: f32) {
        let Some(location) = location else { return };
        match location.kind {
            UniformKind::Float => {
                if let Some(v) = self.values.get_mut(location.slot as usize) {
                    *v = value;
                }
            }
            other => {
                log_warn!("[GPU] uniform1f ignored for {:?} uniform at slot {}", other, location.slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::DEFAULT_VERTEX_SOURCE;

    fn link_fragment(fragment_source: &str) -> Result<ShaderProgram, FilterError> {
        ShaderProgram::link(DEFAULT_VERTEX_SOURCE, fragment_source)
    }

    #[test]
    fn link_reflects_samplers_and_floats() {
        let program = link_fragment(
            "precision highp float;\n\
             uniform sampler2D uTexture;\n\
             uniform float uA, uB;\n\
             uniform highp vec2 uStep;\n\
             void main() {}",
        )
        .unwrap();

        assert_eq!(program.uniform_names(), vec!["uA", "uB", "uStep", "uTexture"]);
        assert_eq!(
            program.uniform_location("uTexture"),
            Some(UniformLocation { kind: UniformKind::Sampler2d, slot: 0 })
        );
        assert_eq!(program.uniform_location("uB").map(|l| l.slot), Some(1));
        assert_eq!(program.uniform_location("uStep").map(|l| l.slot), Some(2));
        assert_eq!(program.block_len(), 4);
        assert_eq!(program.uniform_location("uStepW"), None);
    }

    #[test]
    fn link_rejects_source_without_main() {
        let err = link_fragment("uniform float uX;").unwrap_err();
        assert!(matches!(err, FilterError::ShaderLink(_)));
        assert!(err.to_string().contains("fragment"));

        let err = ShaderProgram::link("attribute vec2 aPosition;", "void main() {}").unwrap_err();
        assert!(err.to_string().contains("vertex"));
    }

    #[test]
    fn link_rejects_unsupported_types() {
        let err = link_fragment("uniform mat3 uM;\nvoid main() {}").unwrap_err();
        assert!(err.to_string().contains("mat3"));
        assert!(link_fragment("uniform float uK[9];\nvoid main() {}").is_err());
    }

    #[test]
    fn uniforms_shared_between_stages_get_one_location() {
        let vertex = "uniform float uScale;\nuniform vec2 uOffset;\nvoid main() {}";
        let program = ShaderProgram::link(vertex, "uniform float uScale;\nuniform float uK;\nvoid main() {}").unwrap();
        assert_eq!(program.uniform_names(), vec!["uK", "uOffset", "uScale"]);
        assert_eq!(program.uniform_location("uScale").map(|l| l.slot), Some(0));
        assert_eq!(program.uniform_location("uK").map(|l| l.slot), Some(3));
        assert_eq!(program.block_len(), 4);

        let err = ShaderProgram::link(vertex, "uniform vec4 uScale;\nvoid main() {}").unwrap_err();
        assert!(err.to_string().contains("uScale"));
    }

    #[test]
    fn uniform_block_writes_float_slots_only() {
        let program =
            link_fragment("uniform sampler2D uT;\nuniform float uA;\nuniform float uB;\nvoid main(){}")
                .unwrap();
        let mut block = UniformBlock::new(&program);
        assert_eq!(block.values().len(), MIN_BLOCK_LEN);

        let b = block.get_uniform_location(&program, "uB");
        block.uniform1f(b, 0.25);
        block.uniform1f(None, 9.0);
        let sampler = block.get_uniform_location(&program, "uT");
        block.uniform1f(sampler, 7.0);

        assert_eq!(block.values(), &[0.0, 0.25, 0.0, 0.0]);
        assert_eq!(block.as_bytes().len(), MIN_BLOCK_LEN * 4);
    }
}

// ============================================================================
// IMAGE FILTERS — the filter capability set and the host-side glue
// ============================================================================
//
// A filter exposes two execution paths:
//   * Canvas2d — `apply_to_2d` mutates an RGBA8 buffer in place (CPU).
//   * GPU      — `uniform_locations` + `send_uniform_data` feed the filter's
//                fragment program, which the GPU backend dispatches.
//
// Filters are plain values: construct them, push them into a
// `FilterPipeline`, and the pipeline picks the path.
// ============================================================================

pub mod ink;
pub mod pipeline;

use std::collections::HashMap;

use image::RgbaImage;

use crate::gpu::backend::GpuPass;
use crate::gpu::program::{GlContext, ShaderProgram, UniformLocation};

pub use ink::{InkFilter, InkOptions};
pub use pipeline::{init_filter_backend, AppliedOn, FilterBackend, FilterPipeline};

/// Uniform name → location, as returned by [`Filter::uniform_locations`].
/// A `None` location means the program does not declare that uniform.
pub type UniformLocations = HashMap<String, Option<UniformLocation>>;

/// Pass-through vertex stage every filter program is paired with.
pub const DEFAULT_VERTEX_SOURCE: &str = "attribute vec2 aPosition;\n\
varying vec2 vTexCoord;\n\
void main() {\n\
vTexCoord = aPosition;\n\
gl_Position = vec4(aPosition * 2.0 - 1.0, 0.0, 1.0);\n\
}";

/// The capability set a filter host dispatches through.
pub trait Filter: std::fmt::Debug {
    /// Fixed type tag, e.g. `"Ink"`.  Also the program-cache key.
    fn filter_type(&self) -> &'static str;

    /// Name of the tunable attribute, if the filter has one.
    fn main_parameter(&self) -> Option<&'static str>;

    fn main_parameter_value(&self) -> Option<f64>;

    fn set_main_parameter_value(&mut self, value: Option<f64>);

    /// True when applying the filter would change nothing, so hosts may skip it.
    fn is_neutral_state(&self) -> bool;

    /// GLSL ES fragment program for the shader path.
    fn fragment_source(&self) -> &'static str;

    /// GLSL ES vertex program linked with [`Filter::fragment_source`].
    fn vertex_source(&self) -> &'static str {
        DEFAULT_VERTEX_SOURCE
    }

    /// Raster path: mutate `image_data` in place.
    fn apply_to_2d(&self, image_data: &mut RgbaImage);

    /// Shader path: resolve this filter's uniforms inside `program`.
    fn uniform_locations(&self, gl: &dyn GlContext, program: &ShaderProgram) -> UniformLocations;

    /// Shader path: upload the current parameter values.
    fn send_uniform_data(&self, gl: &mut dyn GlContext, locations: &UniformLocations);

    /// Serializable description, `{"type": ..., <main parameter>: ...}`.
    fn to_object(&self) -> serde_json::Value;

    fn to_json(&self) -> String {
        self.to_object().to_string()
    }
}

/// Where a single filter application lands.
pub enum FilterTarget<'a, 'b> {
    Canvas2d(&'a mut RgbaImage),
    Gpu(&'a mut GpuPass<'b>),
}

/// Apply `filter` on whichever path `target` selects.
pub fn apply_to(filter: &dyn Filter, target: &mut FilterTarget<'_, '_>) -> Result<(), FilterError> {
    match target {
        FilterTarget::Canvas2d(image) => {
            filter.apply_to_2d(image);
            Ok(())
        }
        FilterTarget::Gpu(pass) => pass.run(filter),
    }
}

/// Rebuild a filter from its [`Filter::to_object`] form.
pub fn from_object(object: &serde_json::Value) -> Result<Box<dyn Filter>, FilterError> {
    let filter_type = object
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| FilterError::InvalidObject("missing \"type\" tag".to_string()))?;

    match filter_type {
        InkFilter::TYPE => Ok(Box::new(InkFilter::from_object(object)?)),
        other => Err(FilterError::UnknownType(other.to_string())),
    }
}

/// Errors raised by the filter host.  Filters themselves never fail.
#[derive(Debug)]
pub enum FilterError {
    UnknownType(String),
    InvalidObject(String),
    ShaderLink(String),
    Gpu(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::UnknownType(t) => write!(f, "Unknown filter type: {}", t),
            FilterError::InvalidObject(e) => write!(f, "Invalid filter object: {}", e),
            FilterError::ShaderLink(e) => write!(f, "Shader link error: {}", e),
            FilterError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::InvalidObject(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_object_dispatches_on_type() {
        let filter = from_object(&json!({"type": "Ink", "ink": 200})).unwrap();
        assert_eq!(filter.filter_type(), "Ink");
        assert_eq!(filter.main_parameter_value(), Some(200.0));
    }

    #[test]
    fn from_object_rejects_unknown_and_untagged() {
        assert!(matches!(
            from_object(&json!({"type": "Sepia"})),
            Err(FilterError::UnknownType(t)) if t == "Sepia"
        ));
        assert!(matches!(from_object(&json!({"ink": 1})), Err(FilterError::InvalidObject(_))));
    }

    #[test]
    fn apply_to_canvas2d_runs_raster_path() {
        let filter = InkFilter::new(Some(InkOptions { ink: Some(7.0) }));
        let mut image = RgbaImage::from_raw(1, 1, vec![1, 2, 3, 4]).unwrap();
        apply_to(&filter, &mut FilterTarget::Canvas2d(&mut image)).unwrap();
        assert_eq!(image.as_raw(), &vec![7, 7, 7, 4]);
    }

    #[test]
    fn default_vertex_source_links_with_ink_fragment() {
        let filter = InkFilter::new(None);
        assert!(filter.vertex_source().contains("varying vec2 vTexCoord;"));
        let program = ShaderProgram::link(filter.vertex_source(), filter.fragment_source()).unwrap();
        assert_eq!(program.uniform_names(), vec!["uMyParameter", "uTexture"]);
    }
}

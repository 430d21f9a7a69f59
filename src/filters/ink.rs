// ============================================================================
// INK FILTER — flood R, G and B with a constant, alpha untouched
// ============================================================================

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::{Filter, FilterError, UniformLocations};
use crate::gpu::program::{GlContext, ShaderProgram};

/// Fragment program for the shader path.  It declares `uMyParameter` but
/// passes the sampled colour straight through.
pub const INK_FRAGMENT_SOURCE: &str = "precision highp float;\n\
uniform sampler2D uTexture;\n\
uniform float uMyParameter;\n\
varying vec2 vTexCoord;\n\
void main() {\n\
vec4 color = texture2D(uTexture, vTexCoord);\n\
gl_FragColor = color;\n\
}";

/// Construction options.  Every field is optional and stored as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InkOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ink: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InkFilter {
    /// Raster domain is roughly -255..=255.  `None` when constructed without one.
    pub ink: Option<f64>,
}

impl InkFilter {
    pub const TYPE: &'static str = "Ink";
    pub const MAIN_PARAMETER: &'static str = "ink";
    pub const UNIFORM_NAME: &'static str = "uMyParameter";

    /// Neutral value of `ink`; the raster path is a no-op at this value.
    pub const NEUTRAL: f64 = 0.0;

    /// Store `options.ink` as-is.  No default, no clamping.
    pub fn new(options: Option<InkOptions>) -> Self {
        let options = options.unwrap_or_default();
        Self { ink: options.ink }
    }

    /// Rebuild from `{"type": "Ink", "ink": v}`.  The `type` tag is not checked.
    pub fn from_object(object: &serde_json::Value) -> Result<Self, FilterError> {
        let options: InkOptions = serde_json::from_value(object.clone())?;
        Ok(Self::new(Some(options)))
    }

    fn is_neutral(&self) -> bool {
        self.ink == Some(Self::NEUTRAL)
    }

    /// Raster path over a raw interleaved RGBA8 slice.  A trailing partial
    /// pixel (length not a multiple of 4) is left alone.
    pub fn apply_to_raw(&self, data: &mut [u8]) {
        if self.is_neutral() {
            return;
        }
        let value = clamp_to_channel(self.ink);
        for px in data.chunks_exact_mut(4) {
            px[0] = value;
            px[1] = value;
            px[2] = value;
        }
    }
}

impl Default for InkFilter {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Coerce a parameter into an 8-bit channel with clamped-byte semantics:
/// absent or NaN becomes 0, the range clamps to 0..=255, and fractions round
/// half to even.
pub fn clamp_to_channel(value: Option<f64>) -> u8 {
    match value {
        Some(v) if !v.is_nan() => v.clamp(0.0, 255.0).round_ties_even() as u8,
        _ => 0,
    }
}

impl Filter for InkFilter {
    fn filter_type(&self) -> &'static str {
        Self::TYPE
    }

    fn main_parameter(&self) -> Option<&'static str> {
        Some(Self::MAIN_PARAMETER)
    }

    fn main_parameter_value(&self) -> Option<f64> {
        self.ink
    }

    fn set_main_parameter_value(&mut self, value: Option<f64>) {
        self.ink = value;
    }

    fn is_neutral_state(&self) -> bool {
        self.is_neutral()
    }

    fn fragment_source(&self) -> &'static str {
        INK_FRAGMENT_SOURCE
    }

    fn apply_to_2d(&self, image_data: &mut RgbaImage) {
        self.apply_to_raw(image_data);
    }

    fn uniform_locations(&self, gl: &dyn GlContext, program: &ShaderProgram) -> UniformLocations {
        UniformLocations::from([(
            Self::UNIFORM_NAME.to_string(),
            gl.get_uniform_location(program, Self::UNIFORM_NAME),
        )])
    }

    /// Uploads on every call, including the neutral value.  An absent `ink`
    /// uploads NaN.
    fn send_uniform_data(&self, gl: &mut dyn GlContext, locations: &UniformLocations) {
        let location = locations.get(Self::UNIFORM_NAME).copied().flatten();
        gl.uniform1f(location, self.ink.map_or(f32::NAN, |v| v as f32));
    }

    fn to_object(&self) -> serde_json::Value {
        let mut object = serde_json::json!({ "type": Self::TYPE });
        if let Some(ink) = self.ink {
            object[Self::MAIN_PARAMETER] = serde_json::json!(ink);
        }
        object
    }
}

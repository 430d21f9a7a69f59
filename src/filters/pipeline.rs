// ============================================================================
// FILTER PIPELINE — ordered filter list + backend selection
// ============================================================================
//
// The host side of the filter contract: it owns the filters, skips the ones
// in their neutral state and runs the rest on the selected backend.  A GPU
// run that cannot complete is retried on Canvas2d; the GPU path never
// touches the caller's image before its readback succeeds.

use image::RgbaImage;

use super::{apply_to, Filter, FilterError, FilterTarget};
use crate::config::BackendPreference;
use crate::gpu::backend::GpuFilterBackend;
use crate::{log_info, log_warn};

/// Which path filters run on.
pub enum FilterBackend {
    Canvas2d,
    Gpu(Box<GpuFilterBackend>),
}

impl FilterBackend {
    pub fn name(&self) -> &'static str {
        match self {
            FilterBackend::Canvas2d => "canvas2d",
            FilterBackend::Gpu(_) => "gpu",
        }
    }
}

impl std::fmt::Debug for FilterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterBackend::Canvas2d => write!(f, "Canvas2d"),
            FilterBackend::Gpu(gpu) => write!(f, "Gpu({})", gpu.adapter_name()),
        }
    }
}

/// Pick a backend.  `Auto` and `Gpu` try wgpu first; both settle for
/// Canvas2d when no adapter can be created.
pub fn init_filter_backend(preference: BackendPreference, preferred_gpu: &str) -> FilterBackend {
    if preference == BackendPreference::Cpu {
        log_info!("[filters] Canvas2d backend (forced)");
        return FilterBackend::Canvas2d;
    }

    match GpuFilterBackend::new(preferred_gpu) {
        Some(gpu) => {
            log_info!("[filters] GPU backend on {}", gpu.adapter_name());
            FilterBackend::Gpu(Box::new(gpu))
        }
        None if preference == BackendPreference::Gpu => {
            log_warn!("[filters] GPU backend requested but no adapter found — using Canvas2d");
            FilterBackend::Canvas2d
        }
        None => {
            log_info!("[filters] no GPU adapter — Canvas2d backend");
            FilterBackend::Canvas2d
        }
    }
}

/// Where a call to [`FilterPipeline::apply_filters`] actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedOn {
    /// Every filter was neutral (or there were none).
    Nothing,
    Canvas2d,
    Gpu,
}

#[derive(Debug)]
pub struct FilterPipeline {
    backend: FilterBackend,
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new(backend: FilterBackend) -> Self {
        Self {
            backend,
            filters: Vec::new(),
        }
    }

    pub fn canvas_2d() -> Self {
        Self::new(FilterBackend::Canvas2d)
    }

    pub fn with_filters(mut self, filters: Vec<Box<dyn Filter>>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Box<dyn Filter>] {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut Vec<Box<dyn Filter>> {
        &mut self.filters
    }

    pub fn backend(&self) -> &FilterBackend {
        &self.backend
    }

    /// Run every non-neutral filter over `image`, in order.
    pub fn apply_filters(&mut self, image: &mut RgbaImage) -> Result<AppliedOn, FilterError> {
        let active: Vec<&dyn Filter> = self
            .filters
            .iter()
            .map(|f| &**f)
            .filter(|f| !f.is_neutral_state())
            .collect();
        if active.is_empty() {
            return Ok(AppliedOn::Nothing);
        }

        if let FilterBackend::Gpu(gpu) = &mut self.backend {
            let (w, h) = image.dimensions();
            if gpu.supports_size(w, h) {
                match gpu.apply_filters(&active, image) {
                    Ok(()) => return Ok(AppliedOn::Gpu),
                    Err(e) => {
                        log_warn!("[filters] GPU run failed ({}) — retrying on Canvas2d", e);
                    }
                }
            } else {
                log_warn!("[filters] {}x{} too large for the GPU — using Canvas2d", w, h);
            }
        }

        for filter in active {
            apply_to(filter, &mut FilterTarget::Canvas2d(&mut *image))?;
        }
        Ok(AppliedOn::Canvas2d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{InkFilter, InkOptions, UniformLocations};
    use crate::gpu::context::GpuContext;
    use crate::gpu::program::{GlContext, ShaderProgram};
    use pretty_assertions::assert_eq;

    /// Inverts RGB on the raster path.  Has no GPU kernel, so any GPU run
    /// that reaches it fails.
    #[derive(Debug)]
    struct InvertRgb;

    impl Filter for InvertRgb {
        fn filter_type(&self) -> &'static str {
            "InvertRgb"
        }

        fn main_parameter(&self) -> Option<&'static str> {
            None
        }

        fn main_parameter_value(&self) -> Option<f64> {
            None
        }

        fn set_main_parameter_value(&mut self, _value: Option<f64>) {}

        fn is_neutral_state(&self) -> bool {
            false
        }

        fn fragment_source(&self) -> &'static str {
            "uniform sampler2D uTexture;\nvoid main() {}"
        }

        fn apply_to_2d(&self, image_data: &mut RgbaImage) {
            for px in image_data.pixels_mut() {
                px[0] = 255 - px[0];
                px[1] = 255 - px[1];
                px[2] = 255 - px[2];
            }
        }

        fn uniform_locations(&self, _gl: &dyn GlContext, _program: &ShaderProgram) -> UniformLocations {
            UniformLocations::new()
        }

        fn send_uniform_data(&self, _gl: &mut dyn GlContext, _locations: &UniformLocations) {}

        fn to_object(&self) -> serde_json::Value {
            serde_json::json!({ "type": "InvertRgb" })
        }
    }

    fn ink(value: Option<f64>) -> Box<dyn Filter> {
        Box::new(InkFilter::new(Some(InkOptions { ink: value })))
    }

    fn two_pixel_image() -> RgbaImage {
        RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 40, 50, 60, 128]).unwrap()
    }

    #[test]
    fn neutral_filters_are_skipped() {
        let mut pipeline = FilterPipeline::canvas_2d().with_filters(vec![ink(Some(0.0)), ink(Some(0.0))]);
        let mut image = two_pixel_image();
        assert_eq!(pipeline.apply_filters(&mut image).unwrap(), AppliedOn::Nothing);
        assert_eq!(image, two_pixel_image());
    }

    #[test]
    fn empty_pipeline_does_nothing() {
        let mut image = two_pixel_image();
        assert_eq!(FilterPipeline::canvas_2d().apply_filters(&mut image).unwrap(), AppliedOn::Nothing);
        assert_eq!(image, two_pixel_image());
    }

    #[test]
    fn canvas2d_runs_filters_in_order() {
        let mut pipeline = FilterPipeline::canvas_2d();
        pipeline.push(ink(Some(200.0)));
        pipeline.push(ink(Some(0.0)));
        pipeline.push(ink(Some(90.0)));

        let mut image = two_pixel_image();
        assert_eq!(pipeline.apply_filters(&mut image).unwrap(), AppliedOn::Canvas2d);
        assert_eq!(image.as_raw(), &vec![90, 90, 90, 255, 90, 90, 90, 128]);
    }

    #[test]
    fn consumer_can_retune_between_applications() {
        let mut pipeline = FilterPipeline::canvas_2d().with_filters(vec![ink(Some(0.0))]);
        pipeline.filters_mut()[0].set_main_parameter_value(Some(200.0));

        let mut image = two_pixel_image();
        pipeline.apply_filters(&mut image).unwrap();
        assert_eq!(image.as_raw(), &vec![200, 200, 200, 255, 200, 200, 200, 128]);
        assert_eq!(pipeline.filters().len(), 1);
    }

    #[test]
    fn forced_cpu_backend_is_canvas2d() {
        let backend = init_filter_backend(BackendPreference::Cpu, "");
        assert_eq!(backend.name(), "canvas2d");
        assert_eq!(format!("{:?}", backend), "Canvas2d");
    }

    /// Needs a wgpu adapter; skipped when none exists.
    #[test]
    fn failed_gpu_run_is_redone_on_canvas2d() {
        let Some(gpu) = GpuFilterBackend::new("") else {
            eprintln!("skipping: no wgpu adapter available");
            return;
        };
        let mut pipeline = FilterPipeline::new(FilterBackend::Gpu(Box::new(gpu)))
            .with_filters(vec![ink(Some(200.0)), Box::new(InvertRgb)]);

        let mut image = two_pixel_image();
        assert_eq!(pipeline.apply_filters(&mut image).unwrap(), AppliedOn::Canvas2d);
        // Both filters ran once, on the original pixels.
        assert_eq!(image.as_raw(), &vec![55, 55, 55, 255, 55, 55, 55, 128]);
    }

    /// Needs a wgpu adapter; skipped when none exists.
    #[test]
    fn image_over_device_limits_runs_on_canvas2d() {
        let Some(mut ctx) = GpuContext::new("") else {
            eprintln!("skipping: no wgpu adapter available");
            return;
        };
        ctx.max_texture_dim = 1;
        let gpu = GpuFilterBackend::from_context(ctx);
        assert!(!gpu.supports_size(2, 1));

        let mut pipeline = FilterPipeline::new(FilterBackend::Gpu(Box::new(gpu))).with_filters(vec![ink(Some(200.0))]);
        let mut image = two_pixel_image();
        assert_eq!(pipeline.apply_filters(&mut image).unwrap(), AppliedOn::Canvas2d);
        assert_eq!(image.as_raw(), &vec![200, 200, 200, 255, 200, 200, 200, 128]);
    }

    /// Needs a wgpu adapter; skipped when none exists.
    #[test]
    fn readback_over_buffer_limit_runs_on_canvas2d() {
        let Some(mut ctx) = GpuContext::new("") else {
            eprintln!("skipping: no wgpu adapter available");
            return;
        };
        // One padded row is 256 bytes; two rows no longer fit.
        ctx.max_buffer_size = 256;
        let gpu = GpuFilterBackend::from_context(ctx);

        let mut pipeline = FilterPipeline::new(FilterBackend::Gpu(Box::new(gpu))).with_filters(vec![ink(Some(9.0))]);
        let mut image = RgbaImage::from_raw(1, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(pipeline.apply_filters(&mut image).unwrap(), AppliedOn::Canvas2d);
        assert_eq!(image.as_raw(), &vec![9, 9, 9, 4, 9, 9, 9, 8]);
    }
}

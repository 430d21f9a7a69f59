// ============================================================================
// GPU FILTER BACKEND — runs a filter chain on wgpu compute pipelines
// ============================================================================
//
// The image is uploaded once, every filter runs as one compute pass that
// ping-pongs between two textures, and the last output is read back once.
// The caller's image is only overwritten after a successful readback.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use super::context::{aligned_bytes_per_row, readback_buffer_size, GpuContext};
use super::program::{GlContext, ShaderProgram, UniformBlock};
use super::shaders;
use crate::filters::{apply_to, Filter, FilterError, FilterTarget, UniformLocations};
use crate::log_info;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PassParams {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
}

/// A filter type's linked program, built pipeline and cached uniform locations.
struct CompiledFilter {
    program: ShaderProgram,
    pipeline: wgpu::ComputePipeline,
    uniform_locations: UniformLocations,
}

pub struct GpuFilterBackend {
    ctx: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// Keyed by filter type, so every instance of a type shares one program.
    program_cache: HashMap<&'static str, CompiledFilter>,
}

impl GpuFilterBackend {
    /// Create a backend on a fresh [`GpuContext`], or `None` if no adapter exists.
    pub fn new(preferred_gpu: &str) -> Option<Self> {
        GpuContext::new(preferred_gpu).map(Self::from_context)
    }

    pub fn from_context(ctx: GpuContext) -> Self {
        let bind_group_layout = filter_bgl(&ctx.device);
        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("filter_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Self {
            ctx,
            bind_group_layout,
            pipeline_layout,
            program_cache: HashMap::new(),
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        self.ctx.supports_size(width, height)
    }

    /// Number of filter programs compiled so far.
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }

    /// Run `filters` in order over `image`.
    ///
    /// wgpu validation and out-of-memory errors raised during the run are
    /// captured and returned as [`FilterError::Gpu`]; `image` is left as it
    /// was in that case.
    pub fn apply_filters(&mut self, filters: &[&dyn Filter], image: &mut RgbaImage) -> Result<(), FilterError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 || filters.is_empty() {
            return Ok(());
        }
        if !self.supports_size(w, h) {
            return Err(FilterError::Gpu(format!(
                "{}x{} exceeds the device limits (max dimension {}, max buffer {} bytes)",
                w, h, self.ctx.max_texture_dim, self.ctx.max_buffer_size
            )));
        }

        let device = Arc::clone(&self.ctx.device);
        let pixels = with_error_scope(&device, || self.run_chain(filters, image.as_raw(), w, h))?;
        let result = RgbaImage::from_raw(w, h, pixels)
            .ok_or_else(|| FilterError::Gpu("readback returned a short buffer".to_string()))?;
        *image = result;
        Ok(())
    }

    /// Upload, one pass per filter, read back.
    fn run_chain(&mut self, filters: &[&dyn Filter], rgba: &[u8], w: u32, h: u32) -> Result<Vec<u8>, FilterError> {
        let textures = [
            create_pass_texture(&self.ctx.device, w, h, "filter_ping"),
            create_pass_texture(&self.ctx.device, w, h, "filter_pong"),
        ];
        upload_rgba(&self.ctx.queue, &textures[0], rgba, w, h);

        let mut pass = GpuPass {
            backend: self,
            textures,
            current: 0,
            width: w,
            height: h,
        };
        for filter in filters {
            apply_to(*filter, &mut FilterTarget::Gpu(&mut pass))?;
        }

        readback_texture(&pass.backend.ctx, &pass.textures[pass.current], w, h)
    }

    /// Compile and cache the program for `filter`'s type if it is not cached yet.
    /// A program that fails validation is not cached.
    fn retrieve_shader(&mut self, filter: &dyn Filter) -> Result<(), FilterError> {
        let filter_type = filter.filter_type();
        if self.program_cache.contains_key(filter_type) {
            return Ok(());
        }

        let kernel = shaders::kernel_for(filter_type)
            .ok_or_else(|| FilterError::Gpu(format!("no GPU kernel for filter type \"{}\"", filter_type)))?;
        let program = ShaderProgram::link(filter.vertex_source(), filter.fragment_source())?;
        let uniform_locations = filter.uniform_locations(&UniformBlock::new(&program), &program);

        let device = Arc::clone(&self.ctx.device);
        let pipeline = with_error_scope(&device, || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.label),
                source: wgpu::ShaderSource::Wgsl(kernel.source.into()),
            });
            Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.label),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: kernel.entry_point,
                compilation_options: Default::default(),
            }))
        })?;

        log_info!(
            "[GPU] compiled program for \"{}\" (uniforms: {:?})",
            filter_type,
            program.uniform_names()
        );
        self.program_cache.insert(
            filter_type,
            CompiledFilter {
                program,
                pipeline,
                uniform_locations,
            },
        );
        Ok(())
    }
}

/// Run `f` inside validation and out-of-memory error scopes.  A captured wgpu
/// error takes precedence over `f`'s own result.
fn with_error_scope<T>(
    device: &wgpu::Device,
    f: impl FnOnce() -> Result<T, FilterError>,
) -> Result<T, FilterError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(e) => Err(FilterError::Gpu(e.to_string())),
        None => result,
    }
}

/// One in-flight chain: the backend plus the two ping-pong textures.
pub struct GpuPass<'a> {
    backend: &'a mut GpuFilterBackend,
    textures: [wgpu::Texture; 2],
    current: usize,
    width: u32,
    height: u32,
}

impl GpuPass<'_> {
    /// Run one filter: bind its uniforms, dispatch its kernel, swap textures.
    pub fn run(&mut self, filter: &dyn Filter) -> Result<(), FilterError> {
        self.backend.retrieve_shader(filter)?;
        let backend = &*self.backend;
        let Some(compiled) = backend.program_cache.get(filter.filter_type()) else {
            return Err(FilterError::Gpu(format!("program for \"{}\" missing from cache", filter.filter_type())));
        };
        let device = &backend.ctx.device;

        let mut block = UniformBlock::new(&compiled.program);
        // Host-owned uniforms; filters that don't declare them resolve to None.
        let step_w = block.get_uniform_location(&compiled.program, "uStepW");
        block.uniform1f(step_w, 1.0 / self.width as f32);
        let step_h = block.get_uniform_location(&compiled.program, "uStepH");
        block.uniform1f(step_h, 1.0 / self.height as f32);
        filter.send_uniform_data(&mut block, &compiled.uniform_locations);

        let params = PassParams {
            width: self.width,
            height: self.height,
            _pad0: 0,
            _pad1: 0,
        };
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let uniforms_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter_uniforms"),
            contents: block.as_bytes(),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let src_view = self.textures[self.current].create_view(&wgpu::TextureViewDescriptor::default());
        let dst_view = self.textures[1 - self.current].create_view(&wgpu::TextureViewDescriptor::default());

        let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter_bg"),
            layout: &backend.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&dst_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniforms_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("filter_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("filter_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(self.width.div_ceil(16), self.height.div_ceil(16), 1);
        }
        backend.ctx.submit_one(encoder);

        self.current = 1 - self.current;
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn create_pass_texture(device: &wgpu::Device, w: u32, h: u32, label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn upload_rgba(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &[u8], w: u32, h: u32) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * w),
            rows_per_image: Some(h),
        },
        wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
    );
}

/// Bind group layout shared by every filter kernel: input tex, output storage
/// tex, pass params, filter uniform block.
fn filter_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("filter_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Copy `texture` into a staging buffer and return tightly packed RGBA rows.
fn readback_texture(ctx: &GpuContext, texture: &wgpu::Texture, width: u32, height: u32) -> Result<Vec<u8>, FilterError> {
    let device = &ctx.device;
    // Row pitch fits u32 for any width the texture limit admits.
    let bytes_per_row = aligned_bytes_per_row(width) as u32;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size: readback_buffer_size(width, height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.submit_one(encoder);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(FilterError::Gpu(format!("readback map error: {:?}", e))),
        Err(e) => return Err(FilterError::Gpu(format!("readback channel error: {:?}", e))),
    }

    let mapped = slice.get_mapped_range();
    let actual_row = (width * 4) as usize;
    let mut result = Vec::with_capacity(actual_row * height as usize);
    for y in 0..height as usize {
        let start = y * bytes_per_row as usize;
        result.extend_from_slice(&mapped[start..start + actual_row]);
    }
    drop(mapped);
    staging.unmap();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ink::{InkFilter, InkOptions};

    /// Needs a wgpu adapter (hardware or software); skipped when none exists.
    #[test]
    fn ink_kernel_passes_pixels_through() {
        let Some(mut backend) = GpuFilterBackend::new("") else {
            eprintln!("skipping: no wgpu adapter available");
            return;
        };
        let mut image = RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 40, 50, 60, 128]).unwrap();
        let ink = InkFilter::new(Some(InkOptions { ink: Some(200.0) }));
        let other = InkFilter::new(Some(InkOptions { ink: Some(0.5) }));

        let filters: [&dyn Filter; 2] = [&ink, &other];
        backend.apply_filters(&filters, &mut image).unwrap();

        assert_eq!(image.as_raw(), &vec![10, 20, 30, 255, 40, 50, 60, 128]);
        assert_eq!(backend.cached_programs(), 1);
    }
}

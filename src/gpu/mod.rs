// ============================================================================
// GPU MODULE — wgpu backend for the filter shader path
// ============================================================================
//
// Architecture:
//   context.rs — wgpu Device, Queue, adapter init
//   program.rs — uniform reflection, GlContext surface, uniform staging block
//   shaders.rs — WGSL compute kernels, one per filter type
//   backend.rs — GpuFilterBackend: program cache, ping-pong passes, readback
// ============================================================================

pub mod backend;
pub mod context;
pub mod program;
pub mod shaders;

pub use backend::GpuFilterBackend;
pub use context::GpuContext;
pub use program::{GlContext, ShaderProgram, UniformBlock, UniformKind, UniformLocation};

//! Ink image filter: a constant RGB flood with a Canvas2d (CPU) path and a
//! wgpu shader path, plus the minimal host needed to run it on files.

pub mod cli;
pub mod config;
pub mod filters;
pub mod gpu;
pub mod io;
pub mod logger;

pub use filters::{Filter, FilterError, FilterPipeline, InkFilter, InkOptions};

// ============================================================================
// ink-filter CLI — headless batch filtering via command-line arguments
// ============================================================================
//
// Usage examples:
//   ink-filter --input photo.png --ink 200 --output result.png
//   ink-filter -i shots/*.jpg --ink 120 --output-dir inked/ --format png
//   ink-filter -i photo.png --config filters.json --backend cpu -o out.png
//
// Filters come from `--config` (a HostConfig JSON file) followed by one Ink
// filter per `--ink` value.  The backend is chosen once for the whole batch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::config::{BackendPreference, HostConfig};
use crate::filters::{init_filter_backend, Filter, FilterPipeline, InkFilter, InkOptions};
use crate::io::{encode_and_write, load_rgba, SaveFormat};
use crate::{log_err, log_info};

/// ink-filter headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "ink-filter",
    about = "Apply the Ink filter to image files",
    long_about = "Flood the RGB channels of every pixel with a constant ink value,\n\
                  keeping alpha, on the GPU when an adapter is available.\n\n\
                  Example:\n  \
                  ink-filter --input photo.png --ink 200 --output result.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Ink value for an Ink filter appended after any configured filters.
    /// May be repeated; 0 is neutral and skipped.
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub ink: Vec<f64>,

    /// Host configuration file (JSON): backend, preferred GPU, filter list.
    #[arg(long, value_name = "FILE.json")]
    pub config: Option<PathBuf>,

    /// Filter backend; overrides the config file.
    #[arg(long, value_enum)]
    pub backend: Option<BackendPreference>,

    /// Print per-file timing and the backend each file ran on.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let config = match &args.config {
        Some(path) => match HostConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: could not read config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => HostConfig::default(),
    };

    let filters = match build_filters(&config, &args.ink) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!(
            "error: could not create output directory '{}': {}",
            dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let preference = args.backend.unwrap_or(config.backend);
    let backend = init_filter_backend(preference, &config.preferred_gpu);
    if args.verbose {
        println!("backend: {:?}", backend);
    }
    let mut pipeline = FilterPipeline::new(backend).with_filters(filters);

    let save_format = SaveFormat::resolve(args.format.as_deref(), args.output.as_deref());
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&mut pipeline, input_path, &output_path, save_format, args.quality) {
            Ok(applied) => {
                log_info!("{} → {} ({:?})", input_path.display(), output_path.display(), applied);
                if args.verbose || multi {
                    println!(
                        "  → {} [{:?}] ({:.0}ms)",
                        output_path.display(),
                        applied,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    pipeline: &mut FilterPipeline,
    input: &Path,
    output: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<crate::filters::AppliedOn, String> {
    let mut image = load_rgba(input).map_err(|e| format!("load failed: {}", e))?;

    let applied = pipeline
        .apply_filters(&mut image)
        .map_err(|e| format!("filter failed: {}", e))?;

    encode_and_write(&image, output, format, quality).map_err(|e| format!("save failed: {}", e))?;
    Ok(applied)
}

// ============================================================================
// Helpers
// ============================================================================

/// Configured filters first, then one Ink filter per `--ink` value.
fn build_filters(config: &HostConfig, inks: &[f64]) -> Result<Vec<Box<dyn Filter>>, String> {
    let mut filters = config.build_filters().map_err(|e| e.to_string())?;
    filters.extend(
        inks.iter()
            .map(|&ink| Box::new(InkFilter::new(Some(InkOptions { ink: Some(ink) }))) as Box<dyn Filter>),
    );
    Ok(filters)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` joined with the input stem
/// 3. next to the input, appending `_ink` to the stem if it would overwrite it
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));
    if candidate == input {
        Some(parent.join(format!("{}_ink.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

//! ASCII-art CLI
//!
//! Renders images (or every image below a directory) as ASCII art on the
//! GPU and writes `<stem>_ascii.png` files into the output directory.
//!
//! # Usage
//! ```bash
//! ascii-cli --input photo.jpg --input shots/ --output out/ --settings look.yaml
//! ```

use std::path::{Path, PathBuf};

use ascii_wgpu::device::{FeatureLevel, RenderDevice, TextureId};
use ascii_wgpu::{AsciiRenderer, GlyphTextures, ImageCodec, ImageCrateCodec, ProcessRequest, RenderSettings, WgpuDevice, atlas};
use clap::Parser;
use walkdir::WalkDir;

/// Extensions picked up when walking an input directory
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

#[derive(Parser)]
#[command(version, about = "Render images as ASCII art on the GPU")]
struct Args {
    /// Input image file or directory (repeatable)
    #[arg(long, short, required = true)]
    input: Vec<PathBuf>,

    /// Output directory
    #[arg(long, short)]
    output: PathBuf,

    /// YAML file overriding the default render settings
    #[arg(long, short)]
    settings: Option<PathBuf>,

    /// Edge glyph atlas image (five 8x8 tiles in a row)
    #[arg(long)]
    edges_atlas: Option<PathBuf>,

    /// Fill glyph atlas image (ten 8x8 tiles in a row)
    #[arg(long)]
    fill_atlas: Option<PathBuf>,

    /// Use the fragment composite even if compute is available
    #[arg(long)]
    no_compute: bool,

    /// Log every pass and resource
    #[arg(long, short)]
    verbose: bool,
}

/// One image to render and where its output goes, relative to `--output`
struct Job {
    input: PathBuf,
    output: PathBuf,
}

fn output_name(relative: &Path) -> PathBuf {
    let stem = relative.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    relative.with_file_name(format!("{stem}_ascii.png"))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_jobs(inputs: &[PathBuf]) -> Vec<Job> {
    let mut jobs = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).into_iter().filter_map(Result::ok) {
                let path = entry.path();
                if entry.file_type().is_file() && is_image(path) {
                    let relative = path.strip_prefix(input).unwrap_or(path);
                    jobs.push(Job {
                        input: path.to_path_buf(),
                        output: output_name(relative),
                    });
                }
            }
        } else {
            let relative = input.file_name().map(PathBuf::from).unwrap_or_else(|| input.clone());
            jobs.push(Job {
                input: input.clone(),
                output: output_name(&relative),
            });
        }
    }

    jobs
}

fn upload_atlas(device: &mut WgpuDevice, codec: &ImageCrateCodec, path: Option<&Path>, builtin: fn() -> ascii_wgpu::PixelBuffer) -> Result<TextureId, Box<dyn std::error::Error>> {
    let pixels = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading glyph atlas");
            codec.decode(path)?
        }
        None => builtin(),
    };
    device.upload_texture(&pixels).ok_or_else(|| "failed to upload glyph atlas".into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = match &args.settings {
        Some(path) => RenderSettings::from_file(path)?,
        None => RenderSettings::default(),
    };

    std::fs::create_dir_all(&args.output)?;

    let jobs = collect_jobs(&args.input);
    if jobs.is_empty() {
        tracing::warn!("no input images found");
        return Ok(());
    }
    tracing::info!(count = jobs.len(), "images queued");

    let mut device = pollster::block_on(WgpuDevice::new())?;
    if args.no_compute {
        device = device.with_feature_level(FeatureLevel::Basic);
    }
    let programs = device.compile_builtin_programs();

    let codec = ImageCrateCodec;
    let glyphs = GlyphTextures {
        edges: upload_atlas(&mut device, &codec, args.edges_atlas.as_deref(), atlas::edge_atlas)?,
        fill: upload_atlas(&mut device, &codec, args.fill_atlas.as_deref(), atlas::fill_atlas)?,
    };

    let renderer = AsciiRenderer::new(&mut device, settings)?;

    let mut failed = 0;
    for job in &jobs {
        let output = args.output.join(&job.output);
        let request = ProcessRequest {
            input: &job.input,
            output: &output,
            composite_program: programs.composite,
            glyphs,
            compute_program: programs.compute,
        };

        // Failures are logged by the renderer; keep going with the batch
        match renderer.process_image(&mut device, &codec, &request) {
            Ok(report) => tracing::debug!(?report, "image done"),
            Err(_) => failed += 1,
        }
    }

    renderer.release(&mut device);
    device.delete_texture(glyphs.edges);
    device.delete_texture(glyphs.fill);

    tracing::info!(processed = jobs.len() - failed, failed, "batch finished");
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

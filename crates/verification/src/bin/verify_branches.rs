//! Composite branch verification binary
//!
//! Renders each input image once with the compute composite and once with
//! the fragment fallback, then compares the two outputs.

use ascii_wgpu::device::FeatureLevel;
use ascii_wgpu_verification::{
    compare::{CompareResult, compare_images},
    harness::Harness,
};

/// Largest per-channel difference accepted between the branches
const TOLERANCE: u8 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <input_image>...", args[0]);
        return Ok(());
    }

    let mut compute = Harness::new(None).await?;
    if compute.feature_level() < FeatureLevel::Compute {
        eprintln!("✗ Adapter has no compute support, nothing to compare");
        return Ok(());
    }
    let mut fragment = Harness::new(Some(FeatureLevel::Basic)).await?;

    let output_dir = std::env::temp_dir().join("ascii-wgpu-verification");
    std::fs::create_dir_all(&output_dir)?;

    for input in &args[1..] {
        let input = std::path::Path::new(input);
        let stem = input.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();

        let (compute_report, compute_output) = match compute.render(input, &output_dir.join(format!("{stem}_compute.png"))) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("✗ Error rendering {} with the compute composite: {e}", input.display());
                continue;
            }
        };
        let (_, fragment_output) = match fragment.render(input, &output_dir.join(format!("{stem}_fragment.png"))) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("✗ Error rendering {} with the fragment composite: {e}", input.display());
                continue;
            }
        };

        match compare_images(&compute_output, &fragment_output, TOLERANCE) {
            CompareResult::Match => {
                println!("✓ Branches match for {} ({}x{})", input.display(), compute_report.width, compute_report.height);
            }
            CompareResult::DimensionMismatch {
                reference_dimensions,
                candidate_dimensions,
            } => {
                eprintln!("✗ Dimension mismatch for {}: compute {reference_dimensions:?}, fragment {candidate_dimensions:?}", input.display());
            }
            CompareResult::PixelMismatch { max_difference, mismatched_pixels } => {
                eprintln!("✗ Pixel mismatch for {}: {mismatched_pixels} pixels, max difference {max_difference}", input.display());
            }
        }
    }

    compute.close();
    fragment.close();
    Ok(())
}

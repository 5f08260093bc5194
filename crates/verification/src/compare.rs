//! Image comparison utilities for verification
//!
//! Used to check that the compute and fragment composites agree and that
//! repeated renders are identical.

/// Result of comparing two images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Every channel is within the tolerance
    Match,
    /// Images have different dimensions
    DimensionMismatch {
        reference_dimensions: (u32, u32),
        candidate_dimensions: (u32, u32),
    },
    /// Images have matching dimensions but some channels differ too much
    PixelMismatch {
        /// Largest channel difference found
        max_difference: u8,
        /// Pixels with at least one channel beyond the tolerance
        mismatched_pixels: usize,
    },
}

/// Compares two RGB8 images channel by channel
///
/// Differences up to `tolerance` are accepted.
pub fn compare_images(reference: &image::RgbImage, candidate: &image::RgbImage, tolerance: u8) -> CompareResult {
    if reference.dimensions() != candidate.dimensions() {
        return CompareResult::DimensionMismatch {
            reference_dimensions: reference.dimensions(),
            candidate_dimensions: candidate.dimensions(),
        };
    }

    let mut max_difference = 0;
    let mut mismatched_pixels = 0;

    for (reference_pixel, candidate_pixel) in reference.pixels().zip(candidate.pixels()) {
        let difference = reference_pixel.0.iter().zip(candidate_pixel.0.iter()).map(|(a, b)| a.abs_diff(*b)).max().unwrap_or(0);

        max_difference = max_difference.max(difference);
        if difference > tolerance {
            mismatched_pixels += 1;
        }
    }

    if mismatched_pixels == 0 {
        CompareResult::Match
    } else {
        CompareResult::PixelMismatch {
            max_difference,
            mismatched_pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_images_match() {
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        assert_eq!(compare_images(&image, &image.clone(), 0), CompareResult::Match);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let reference = image::RgbImage::from_pixel(2, 2, image::Rgb([100, 100, 100]));
        let mut candidate = reference.clone();
        candidate.put_pixel(1, 1, image::Rgb([102, 100, 100]));

        assert_eq!(compare_images(&reference, &candidate, 2), CompareResult::Match);
        assert_eq!(
            compare_images(&reference, &candidate, 1),
            CompareResult::PixelMismatch {
                max_difference: 2,
                mismatched_pixels: 1,
            }
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let reference = image::RgbImage::new(3, 2);
        let candidate = image::RgbImage::new(2, 3);
        assert_eq!(
            compare_images(&reference, &candidate, 255),
            CompareResult::DimensionMismatch {
                reference_dimensions: (3, 2),
                candidate_dimensions: (2, 3),
            }
        );
    }
}

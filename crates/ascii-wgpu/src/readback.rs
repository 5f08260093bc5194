//! Moving the final image from the device to disk

use std::path::Path;

use crate::codec::{ImageCodec, PixelBuffer};
use crate::device::{DrawTarget, RenderDevice};
use crate::error::PipelineError;

/// Channels in the host readback buffer
pub const READBACK_CHANNELS: u8 = 3;

/// Outcome of [`ensure_output_dir`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDir {
    Created,
    AlreadyExists,
}

/// Creates `dir` (and its parents) unless it already exists
///
/// On Unix the new directories get mode `0o777` before the umask. Calling
/// this on an existing directory does nothing.
pub fn ensure_output_dir(dir: &Path) -> std::io::Result<OutputDir> {
    if dir.is_dir() {
        return Ok(OutputDir::AlreadyExists);
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(dir)?;

    tracing::info!(dir = %dir.display(), "created output directory");
    Ok(OutputDir::Created)
}

/// Reads the default surface as RGB8
///
/// Rows come back in the device's order; the encoder flips them.
pub fn read_back<D: RenderDevice>(device: &mut D, width: u32, height: u32) -> Result<PixelBuffer, PipelineError> {
    let data = device.read_pixels(DrawTarget::Surface { width, height }, width, height)?;

    let expected = width as usize * height as usize * READBACK_CHANNELS as usize;
    if data.len() != expected {
        return Err(PipelineError::Readback { expected, actual: data.len() });
    }

    Ok(PixelBuffer {
        width,
        height,
        channels: READBACK_CHANNELS,
        data,
    })
}

/// Writes the read-back pixels to `path` as a vertically flipped PNG
pub fn encode_output<C: ImageCodec>(codec: &C, path: &Path, pixels: &PixelBuffer) -> Result<(), PipelineError> {
    codec.encode(path, pixels, true).map_err(|source| PipelineError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(path = %path.display(), width = pixels.width, height = pixels.height, "output image saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ImageCrateCodec;
    use crate::device::recording::{Call, RecordingDevice};

    #[test]
    fn test_ensure_output_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("output").join("nested");

        assert_eq!(ensure_output_dir(&dir).unwrap(), OutputDir::Created);
        assert!(dir.is_dir());
        assert_eq!(ensure_output_dir(&dir).unwrap(), OutputDir::AlreadyExists);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_ensure_output_dir_fails_under_a_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"not a directory").unwrap();

        assert!(ensure_output_dir(&file.join("output")).is_err());
    }

    #[test]
    fn test_read_back_returns_rgb_bytes() {
        let mut device = RecordingDevice::new();
        let pixels = read_back(&mut device, 5, 3).unwrap();
        assert_eq!(pixels.data.len(), 5 * 3 * 3);
        assert_eq!(pixels.channels, 3);
        assert_eq!(
            device.calls().last(),
            Some(&Call::ReadPixels {
                target: DrawTarget::Surface { width: 5, height: 3 },
                width: 5,
                height: 3,
            })
        );
    }

    #[test]
    fn test_read_back_rejects_short_buffer() {
        let mut device = RecordingDevice::new();
        device.truncate_readback();
        assert!(matches!(read_back(&mut device, 4, 4), Err(PipelineError::Readback { expected: 48, .. })));
    }

    #[test]
    fn test_encode_output_reports_path() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("missing-dir").join("out.png");
        let pixels = PixelBuffer::new(1, 1, 3, vec![0, 0, 0]).unwrap();

        match encode_output(&ImageCrateCodec, &path, &pixels) {
            Err(PipelineError::Encode { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

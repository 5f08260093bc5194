//! Runs the real pipeline on a wgpu device
//!
//! Every harness opens its own device, optionally capped to a feature level,
//! with the built-in programs and glyph atlases loaded.

use std::path::Path;

use ascii_wgpu::device::{FeatureLevel, RenderDevice};
use ascii_wgpu::{AsciiRenderer, BuiltinPrograms, DeviceError, GlyphTextures, Pass, PipelineError, ProcessRequest, RenderReport, RenderSettings, TexelData, WgpuDevice, atlas};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("failed to upload glyph atlas")]
    AtlasUpload,
    #[error("pass {0} never ran")]
    PassNotRun(Pass),
}

impl HarnessError {
    /// Whether the machine simply has no usable GPU
    pub fn is_no_adapter(&self) -> bool {
        matches!(self, HarnessError::Device(DeviceError::NoAdapter(_)))
    }
}

pub struct Harness {
    device: WgpuDevice,
    programs: BuiltinPrograms,
    glyphs: GlyphTextures,
    renderer: AsciiRenderer,
}

impl Harness {
    /// Opens a device, lowering it to `level` when given
    pub async fn new(level: Option<FeatureLevel>) -> Result<Self, HarnessError> {
        let mut device = WgpuDevice::new().await?;
        if let Some(level) = level {
            device = device.with_feature_level(level);
        }

        let programs = device.compile_builtin_programs();
        let glyphs = GlyphTextures {
            edges: device.upload_texture(&atlas::edge_atlas()).ok_or(HarnessError::AtlasUpload)?,
            fill: device.upload_texture(&atlas::fill_atlas()).ok_or(HarnessError::AtlasUpload)?,
        };
        let renderer = AsciiRenderer::new(&mut device, RenderSettings::default())?;

        Ok(Self {
            device,
            programs,
            glyphs,
            renderer,
        })
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.device.feature_level()
    }

    fn request<'a>(&self, input: &'a Path, output: &'a Path) -> ProcessRequest<'a> {
        ProcessRequest {
            input,
            output,
            composite_program: self.programs.composite,
            glyphs: self.glyphs,
            compute_program: self.programs.compute,
        }
    }

    /// Renders `input` to `output` and loads the written PNG back
    pub fn render(&mut self, input: &Path, output: &Path) -> Result<(RenderReport, image::RgbImage), HarnessError> {
        let request = self.request(input, output);
        let report = self.renderer.process_image(&mut self.device, &ascii_wgpu::ImageCrateCodec, &request)?;
        let image = image::open(output)?.into_rgb8();
        Ok((report, image))
    }

    /// Renders `input` and returns the target written by `pass`
    pub fn render_inspecting(&mut self, input: &Path, output: &Path, pass: Pass) -> Result<TexelData, HarnessError> {
        let request = self.request(input, output);
        let mut captured = None;

        self.renderer.process_image_with(&mut self.device, &ascii_wgpu::ImageCrateCodec, &request, |device, ran, texture| {
            if ran == pass {
                captured = Some(device.read_texture(texture));
            }
        })?;

        Ok(captured.ok_or(HarnessError::PassNotRun(pass))??)
    }

    /// Releases the device resources owned by the harness
    pub fn close(mut self) {
        self.renderer.release(&mut self.device);
        self.device.delete_texture(self.glyphs.edges);
        self.device.delete_texture(self.glyphs.fill);
    }
}

//! The pipeline entry point

use std::path::Path;

use crate::codec::ImageCodec;
use crate::compositor::{CompositeBranch, Compositor};
use crate::device::{ProgramId, ProgramKind, RenderDevice, TextureId};
use crate::error::PipelineError;
use crate::framebuffer::FramebufferBinding;
use crate::invocation::Invocation;
use crate::quad::{FullscreenQuad, create_blit_quad};
use crate::readback::{encode_output, ensure_output_dir, read_back};
use crate::sequencer::PassSequencer;
use crate::settings::RenderSettings;
use crate::stage::{END_PASS, Pass};
use crate::targets::{GlyphTextures, RenderTargets, TextureRole};

/// Inputs of one [`AsciiRenderer::process_image`] call
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    /// The shared fragment program
    pub composite_program: ProgramId,
    pub glyphs: GlyphTextures,
    /// Enables the compute composite when the device supports it
    pub compute_program: Option<ProgramId>,
}

/// Summary of a successful invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderReport {
    pub width: u32,
    pub height: u32,
    pub compute: bool,
}

/// Turns images into ASCII renders on a [`RenderDevice`]
///
/// The renderer owns the fullscreen quad shared by every invocation. Only one
/// invocation may be in flight per device; the `&mut` device borrow enforces
/// this.
pub struct AsciiRenderer {
    quad: FullscreenQuad,
    settings: RenderSettings,
}

impl AsciiRenderer {
    pub fn new<D: RenderDevice>(device: &mut D, settings: RenderSettings) -> Result<Self, PipelineError> {
        Ok(Self {
            quad: FullscreenQuad::new(device)?,
            settings,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Frees the shared quad
    pub fn release<D: RenderDevice>(self, device: &mut D) {
        self.quad.release(device);
    }

    /// Renders `request.input` into `request.output`
    ///
    /// Every device resource allocated here is released before returning,
    /// whichever way the call ends. Failures are logged and returned.
    pub fn process_image<D: RenderDevice, C: ImageCodec>(&self, device: &mut D, codec: &C, request: &ProcessRequest<'_>) -> Result<RenderReport, PipelineError> {
        self.process_image_with(device, codec, request, |_, _, _| {})
    }

    /// Like [`process_image`](Self::process_image), calling `on_pass` after every pass
    ///
    /// The callback receives the texture the pass wrote while it is still
    /// alive, which makes intermediate targets inspectable.
    pub fn process_image_with<D, C, F>(&self, device: &mut D, codec: &C, request: &ProcessRequest<'_>, mut on_pass: F) -> Result<RenderReport, PipelineError>
    where
        D: RenderDevice,
        C: ImageCodec,
        F: FnMut(&mut D, Pass, TextureId),
    {
        let result = self.run(device, codec, request, &mut on_pass);
        if let Err(error) = &result {
            tracing::error!(input = %request.input.display(), %error, "image processing failed");
        }
        result
    }

    fn run<D, C, F>(&self, device: &mut D, codec: &C, request: &ProcessRequest<'_>, on_pass: &mut F) -> Result<RenderReport, PipelineError>
    where
        D: RenderDevice,
        C: ImageCodec,
        F: FnMut(&mut D, Pass, TextureId),
    {
        let pixels = codec.decode(request.input).map_err(|source| PipelineError::Decode {
            path: request.input.to_path_buf(),
            source,
        })?;
        let (width, height) = (pixels.width, pixels.height);
        if width == 0 || height == 0 {
            return Err(PipelineError::EmptyImage {
                path: request.input.to_path_buf(),
            });
        }
        tracing::debug!(input = %request.input.display(), width, height, channels = pixels.channels, "input decoded");

        let program = request.composite_program;
        let status = device.program_status(program);
        if !status.is_ready(ProgramKind::Fragment) {
            return Err(PipelineError::InvalidProgram(format!("composite {program}: {status:?}")));
        }

        if let Some(dir) = request.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            // Not fatal here; the encoder reports the real failure
            if let Err(error) = ensure_output_dir(dir) {
                tracing::warn!(dir = %dir.display(), %error, "failed to create output directory");
            }
        }

        let branch = CompositeBranch::select(device, request.compute_program);
        tracing::info!(input = %request.input.display(), compute = branch.is_compute(), "processing image");

        let mut invocation = Invocation::new(device);
        let mut framebuffer = FramebufferBinding::create(&mut invocation)?;
        let source = invocation
            .upload_texture(&pixels)
            .ok_or_else(|| PipelineError::Allocation(format!("source texture ({width}x{height})")))?;
        drop(pixels);
        let targets = RenderTargets::allocate(&mut invocation, width, height, source, request.glyphs)?;

        self.settings.edges.apply(invocation.device(), program)?;

        let sequencer = PassSequencer::new(&self.quad, program);
        sequencer.run_all(&mut invocation, &mut framebuffer, &targets, on_pass)?;

        Compositor::new(&sequencer, &self.settings.composite).run(&mut invocation, &mut framebuffer, &targets, branch)?;
        on_pass(invocation.device(), Pass::RenderAscii, targets.texture(TextureRole::AsciiOutput));

        tracing::debug!("starting final render pass");
        let blit = create_blit_quad(&mut invocation)?;
        sequencer.execute(&mut invocation, &mut framebuffer, &targets, &END_PASS, &blit)?;

        let rgb = read_back(invocation.device(), width, height)?;
        encode_output(codec, request.output, &rgb)?;

        Ok(RenderReport {
            width,
            height,
            compute: branch.is_compute(),
        })
    }
}

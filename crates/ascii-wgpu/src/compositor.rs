//! Capability-gated composite pass
//!
//! The composite turns the Sobel and downscale targets into glyphs. It runs
//! either as one compute dispatch over 8x8 workgroups or, on devices below
//! [`FeatureLevel::Compute`], as a fragment pass of the shared program. Both
//! paths call the same `shade_ascii` shader function.

use crate::device::{FeatureLevel, ImageAccess, ProgramId, ProgramKind, ProgramStatus, RenderDevice};
use crate::error::PipelineError;
use crate::framebuffer::FramebufferBinding;
use crate::invocation::Invocation;
use crate::sequencer::{PassSequencer, bind_inputs};
use crate::settings::CompositeParams;
use crate::stage::RENDER_ASCII_PASS;
use crate::targets::{RenderTargets, TextureRole};

/// Workgroup width of the compute composite, one glyph tile
pub const COMPUTE_WORKGROUP_SIZE_X: u32 = 8;
/// Workgroup height of the compute composite, one glyph tile
pub const COMPUTE_WORKGROUP_SIZE_Y: u32 = 8;

/// Image unit the compute program reads the Sobel target from
const SOBEL_IMAGE_UNIT: usize = 0;
/// Image unit the compute program writes its result to
const OUTPUT_IMAGE_UNIT: usize = 1;

/// Which implementation of the composite an invocation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeBranch {
    Compute(ProgramId),
    Fragment,
}

impl CompositeBranch {
    /// Chooses the branch once per invocation
    ///
    /// The compute branch needs both a compute-capable device and a compute
    /// program that built successfully; anything else falls back.
    pub fn select<D: RenderDevice>(device: &D, compute_program: Option<ProgramId>) -> Self {
        let Some(program) = compute_program else {
            return CompositeBranch::Fragment;
        };

        let level = device.feature_level();
        if level < FeatureLevel::Compute {
            tracing::info!(?level, "compute composite unavailable at this feature level, using fragment fallback");
            return CompositeBranch::Fragment;
        }

        match device.program_status(program) {
            ProgramStatus::Ready(ProgramKind::Compute) => CompositeBranch::Compute(program),
            status => {
                tracing::warn!(%program, ?status, "refusing unusable compute program, using fragment fallback");
                CompositeBranch::Fragment
            }
        }
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, CompositeBranch::Compute(_))
    }
}

/// Number of workgroups needed to cover `size` pixels
pub const fn workgroup_count(size: u32, workgroup_size: u32) -> u32 {
    size.div_ceil(workgroup_size)
}

/// Runs the composite for one invocation
pub struct Compositor<'a> {
    sequencer: &'a PassSequencer<'a>,
    params: &'a CompositeParams,
}

impl<'a> Compositor<'a> {
    pub fn new(sequencer: &'a PassSequencer<'a>, params: &'a CompositeParams) -> Self {
        Self { sequencer, params }
    }

    /// Writes the composite into the [`TextureRole::AsciiOutput`] target
    pub fn run<D: RenderDevice>(&self, invocation: &mut Invocation<'_, D>, framebuffer: &mut FramebufferBinding, targets: &RenderTargets, branch: CompositeBranch) -> Result<(), PipelineError> {
        match branch {
            CompositeBranch::Compute(program) => self.run_compute(invocation, targets, program),
            CompositeBranch::Fragment => self.run_fragment(invocation, framebuffer, targets),
        }
    }

    fn run_compute<D: RenderDevice>(&self, invocation: &mut Invocation<'_, D>, targets: &RenderTargets, program: ProgramId) -> Result<(), PipelineError> {
        let device = invocation.device();

        device.use_program(program);
        bind_inputs(device, targets, RENDER_ASCII_PASS.inputs);
        device.bind_image(SOBEL_IMAGE_UNIT, Some(targets.texture(TextureRole::Sobel)), ImageAccess::ReadOnly);
        device.bind_image(OUTPUT_IMAGE_UNIT, Some(targets.texture(TextureRole::AsciiOutput)), ImageAccess::WriteOnly);
        self.params.apply(device, program)?;

        let groups_x = workgroup_count(targets.width(), COMPUTE_WORKGROUP_SIZE_X);
        let groups_y = workgroup_count(targets.height(), COMPUTE_WORKGROUP_SIZE_Y);
        device.dispatch_compute(groups_x, groups_y, 1)?;

        // The end pass samples the image written above
        device.memory_barrier();

        // Leave no storage binding behind for later passes
        device.bind_image(SOBEL_IMAGE_UNIT, None, ImageAccess::ReadOnly);
        device.bind_image(OUTPUT_IMAGE_UNIT, None, ImageAccess::WriteOnly);

        tracing::debug!(groups_x, groups_y, "compute composite dispatched");
        Ok(())
    }

    fn run_fragment<D: RenderDevice>(&self, invocation: &mut Invocation<'_, D>, framebuffer: &mut FramebufferBinding, targets: &RenderTargets) -> Result<(), PipelineError> {
        self.params.apply(invocation.device(), self.sequencer.program())?;
        self.sequencer.execute(invocation, framebuffer, targets, &RENDER_ASCII_PASS, self.sequencer.quad().mesh())
    }
}

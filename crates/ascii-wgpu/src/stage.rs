//! Static description of the pass graph
//!
//! Every pass is a draw (or, for the compute composite, a dispatch) that reads
//! a fixed set of textures and writes exactly one output. The shared fragment
//! program selects its behaviour from the integer [`Pass::index`], so the
//! mapping below must agree with the `switch` in `shaders/passes.wgsl`.

use crate::targets::TextureRole;

/// Identifies one pass of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Pass {
    Luminance = 0,
    Downscale = 1,
    HorizontalBlur = 2,
    VerticalBlurAndDifference = 3,
    CalculateNormals = 4,
    EdgeDetect = 5,
    HorizontalSobel = 6,
    VerticalSobel = 7,
    EndPass = 8,
    /// Fragment-program composite used when the compute branch is unavailable
    RenderAscii = 9,
}

impl Pass {
    /// Value of the `pass_index` program parameter for this pass
    pub const fn index(self) -> i32 {
        self as i32
    }

    /// Returns the display name of the pass
    pub const fn name(self) -> &'static str {
        match self {
            Pass::Luminance => "Luminance",
            Pass::Downscale => "Downscale",
            Pass::HorizontalBlur => "HorizontalBlur",
            Pass::VerticalBlurAndDifference => "VerticalBlurAndDifference",
            Pass::CalculateNormals => "CalculateNormals",
            Pass::EdgeDetect => "EdgeDetect",
            Pass::HorizontalSobel => "HorizontalSobel",
            Pass::VerticalSobel => "VerticalSobel",
            Pass::EndPass => "EndPass",
            Pass::RenderAscii => "RenderAscii",
        }
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutput {
    /// An invocation render target, attached to the framebuffer
    Target(TextureRole),
    /// The device's default-visible surface
    Surface,
}

/// A pass together with its texture dependencies
///
/// `inputs[i]` is bound to texture slot `i`; remaining slots are cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassDescriptor {
    pub pass: Pass,
    pub inputs: &'static [TextureRole],
    pub output: PassOutput,
}

/// Passes run by the sequencer before the composite, in execution order
pub const SEQUENCED_PASSES: [PassDescriptor; 8] = [
    PassDescriptor {
        pass: Pass::Luminance,
        inputs: &[TextureRole::Source],
        output: PassOutput::Target(TextureRole::Luminance),
    },
    PassDescriptor {
        pass: Pass::Downscale,
        // Slot 1 carries base color into the downscale target for blend-with-base
        inputs: &[TextureRole::Luminance, TextureRole::Source],
        output: PassOutput::Target(TextureRole::Downscale),
    },
    PassDescriptor {
        pass: Pass::HorizontalBlur,
        inputs: &[TextureRole::Downscale],
        output: PassOutput::Target(TextureRole::Ping),
    },
    PassDescriptor {
        pass: Pass::VerticalBlurAndDifference,
        inputs: &[TextureRole::Ping],
        output: PassOutput::Target(TextureRole::DifferenceOfGaussians),
    },
    PassDescriptor {
        pass: Pass::CalculateNormals,
        inputs: &[TextureRole::DifferenceOfGaussians],
        output: PassOutput::Target(TextureRole::Normals),
    },
    PassDescriptor {
        pass: Pass::EdgeDetect,
        inputs: &[TextureRole::Normals],
        output: PassOutput::Target(TextureRole::Edges),
    },
    PassDescriptor {
        pass: Pass::HorizontalSobel,
        inputs: &[TextureRole::Edges],
        output: PassOutput::Target(TextureRole::Ping),
    },
    PassDescriptor {
        pass: Pass::VerticalSobel,
        inputs: &[TextureRole::Ping],
        output: PassOutput::Target(TextureRole::Sobel),
    },
];

/// The composite, shared by the compute and fragment branches
pub const RENDER_ASCII_PASS: PassDescriptor = PassDescriptor {
    pass: Pass::RenderAscii,
    inputs: &[TextureRole::Sobel, TextureRole::Downscale, TextureRole::EdgeGlyphs, TextureRole::FillGlyphs],
    output: PassOutput::Target(TextureRole::AsciiOutput),
};

/// Final blit of the composite onto the default surface
pub const END_PASS: PassDescriptor = PassDescriptor {
    pass: Pass::EndPass,
    inputs: &[TextureRole::AsciiOutput],
    output: PassOutput::Surface,
};

//! Render-target allocation for one invocation

use crate::device::{RenderDevice, STORAGE_IMAGE_FORMAT, TargetFormat, TextureId};
use crate::error::PipelineError;
use crate::invocation::Invocation;

/// Downscale factor of the low-resolution target, matching the glyph size
pub const DOWNSCALE_FACTOR: u32 = 8;

/// Every texture a pass can read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRole {
    /// The decoded input image
    Source,
    Luminance,
    Downscale,
    /// Scratch target shared by the blur and Sobel passes
    Ping,
    DifferenceOfGaussians,
    Normals,
    Edges,
    Sobel,
    /// Composite result, written by either compositor branch
    AsciiOutput,
    /// Caller-supplied edge glyph atlas
    EdgeGlyphs,
    /// Caller-supplied fill glyph atlas
    FillGlyphs,
}

/// Size of a render target relative to the input image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Full,
    /// Each dimension divided by the factor, rounded up
    Downsampled(u32),
}

impl Resolution {
    /// Computes the target extent for an input of `width` x `height`
    pub const fn extent(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Resolution::Full => (width, height),
            Resolution::Downsampled(factor) => (width.div_ceil(factor), height.div_ceil(factor)),
        }
    }
}

/// Format and size of an invocation-owned render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub role: TextureRole,
    pub format: TargetFormat,
    pub resolution: Resolution,
}

/// Render targets allocated per invocation, in allocation order
pub const TARGET_SPECS: [TargetSpec; 8] = [
    TargetSpec {
        role: TextureRole::Luminance,
        format: TargetFormat::R16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::Downscale,
        format: TargetFormat::Rgba16Float,
        resolution: Resolution::Downsampled(DOWNSCALE_FACTOR),
    },
    TargetSpec {
        role: TextureRole::Ping,
        format: TargetFormat::Rgba16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::DifferenceOfGaussians,
        format: TargetFormat::R16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::Normals,
        format: TargetFormat::Rgba16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::Edges,
        format: TargetFormat::R16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::Sobel,
        format: TargetFormat::Rg16Float,
        resolution: Resolution::Full,
    },
    TargetSpec {
        role: TextureRole::AsciiOutput,
        format: STORAGE_IMAGE_FORMAT,
        resolution: Resolution::Full,
    },
];

/// Glyph atlases supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphTextures {
    pub edges: TextureId,
    pub fill: TextureId,
}

/// Resolves every [`TextureRole`] of one invocation to a device texture
#[derive(Debug, Clone)]
pub struct RenderTargets {
    width: u32,
    height: u32,
    source: TextureId,
    glyphs: GlyphTextures,
    allocated: Vec<(TextureRole, TextureId)>,
}

impl RenderTargets {
    /// Allocates all intermediate targets for an input of `width` x `height`
    ///
    /// Targets are registered with the invocation as soon as they exist, so a
    /// failure part-way through still releases the ones already created.
    ///
    /// # Arguments
    /// * `invocation` - Invocation that owns the new targets
    /// * `width` - Input image width in pixels
    /// * `height` - Input image height in pixels
    /// * `source` - Texture holding the decoded input image
    /// * `glyphs` - Caller-owned glyph atlases
    ///
    /// # Returns
    /// The resolved role table, or [`PipelineError::Allocation`] naming the target the device refused
    pub fn allocate<D: RenderDevice>(invocation: &mut Invocation<'_, D>, width: u32, height: u32, source: TextureId, glyphs: GlyphTextures) -> Result<Self, PipelineError> {
        let mut allocated = Vec::with_capacity(TARGET_SPECS.len());

        for spec in &TARGET_SPECS {
            let (target_width, target_height) = spec.resolution.extent(width, height);
            let texture = invocation
                .create_texture(target_width, target_height, spec.format)
                .ok_or_else(|| PipelineError::Allocation(format!("{:?} target ({target_width}x{target_height} {:?})", spec.role, spec.format)))?;
            tracing::debug!(role = ?spec.role, %texture, target_width, target_height, format = ?spec.format, "allocated render target");
            allocated.push((spec.role, texture));
        }

        Ok(Self {
            width,
            height,
            source,
            glyphs,
            allocated,
        })
    }

    /// Input (and output) width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Input (and output) height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the texture playing `role` in this invocation
    pub fn texture(&self, role: TextureRole) -> TextureId {
        match role {
            TextureRole::Source => self.source,
            TextureRole::EdgeGlyphs => self.glyphs.edges,
            TextureRole::FillGlyphs => self.glyphs.fill,
            _ => self
                .allocated
                .iter()
                .find_map(|(allocated_role, texture)| (*allocated_role == role).then_some(*texture))
                .unwrap_or_else(|| unreachable!("every intermediate role has an entry in TARGET_SPECS")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};

    #[test]
    fn test_downsampled_extent_rounds_up() {
        assert_eq!(Resolution::Downsampled(8).extent(64, 64), (8, 8));
        assert_eq!(Resolution::Downsampled(8).extent(65, 7), (9, 1));
        assert_eq!(Resolution::Full.extent(13, 5), (13, 5));
    }

    #[test]
    fn test_every_intermediate_role_has_a_spec() {
        let roles = [
            TextureRole::Luminance,
            TextureRole::Downscale,
            TextureRole::Ping,
            TextureRole::DifferenceOfGaussians,
            TextureRole::Normals,
            TextureRole::Edges,
            TextureRole::Sobel,
            TextureRole::AsciiOutput,
        ];
        for role in roles {
            assert_eq!(TARGET_SPECS.iter().filter(|spec| spec.role == role).count(), 1, "{role:?}");
        }
    }

    #[test]
    fn test_allocate_uses_declared_formats_and_sizes() {
        let mut device = RecordingDevice::new();
        let glyphs = device.external_glyphs();
        let source = device.external_texture();

        let mut invocation = Invocation::new(&mut device);
        let targets = RenderTargets::allocate(&mut invocation, 20, 12, source, glyphs).unwrap();
        assert_eq!(targets.texture(TextureRole::Source), source);
        assert_eq!(targets.texture(TextureRole::FillGlyphs), glyphs.fill);
        let downscale = targets.texture(TextureRole::Downscale);
        drop(invocation);

        let created: Vec<_> = device
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::CreateTexture { id, width, height, format } => Some((*id, *width, *height, *format)),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), TARGET_SPECS.len());
        assert!(created.contains(&(downscale, 3, 2, TargetFormat::Rgba16Float)));
        assert_eq!(created[6].3, TargetFormat::Rg16Float);
        assert_eq!(created[7].3, TargetFormat::Rgba16Float);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn test_allocation_failure_releases_partial_set() {
        let mut device = RecordingDevice::new();
        let glyphs = device.external_glyphs();
        let source = device.external_texture();
        device.fail_texture_allocation_after(3);

        let mut invocation = Invocation::new(&mut device);
        let error = RenderTargets::allocate(&mut invocation, 16, 16, source, glyphs).unwrap_err();
        assert!(matches!(error, PipelineError::Allocation(_)));
        drop(invocation);

        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.deleted_textures().len(), 3);
    }
}

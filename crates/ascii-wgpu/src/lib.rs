//! ASCII-art rendering of images on the GPU
//!
//! An image is decoded, pushed through a fixed chain of fragment passes
//! (luminance, downscale, difference of Gaussians, normals, edge detection
//! and a separable Sobel filter) and composited into 8x8 glyph tiles, either
//! by a compute program or by a fragment fallback on devices without compute
//! support. The result is read back and written as a PNG.
//!
//! All GPU access goes through the [`RenderDevice`] trait; [`WgpuDevice`] is
//! the wgpu implementation and [`AsciiRenderer`] the entry point.

pub mod atlas;
pub mod codec;
pub mod compositor;
pub mod device;
mod error;
mod framebuffer;
mod invocation;
mod quad;
pub mod readback;
mod renderer;
mod sequencer;
pub mod settings;
pub mod shaders;
pub mod stage;
pub mod targets;

pub use codec::{ImageCodec, ImageCrateCodec, PixelBuffer};
pub use device::{BuiltinPrograms, FeatureLevel, RenderDevice, TexelData, WgpuDevice};
pub use error::{CodecError, DeviceError, PipelineError, SettingsError};
pub use readback::{OutputDir, ensure_output_dir};
pub use renderer::{AsciiRenderer, ProcessRequest, RenderReport};
pub use settings::{CompositeParams, EdgeParams, RenderSettings};
pub use stage::Pass;
pub use targets::GlyphTextures;

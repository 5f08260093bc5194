//! Error types

use std::path::PathBuf;

use crate::device::{FramebufferStatus, ProgramId};
use crate::stage::Pass;

/// Errors raised by a [`RenderDevice`](crate::RenderDevice) implementation
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("program has no parameter named `{0}`")]
    UnknownUniform(String),
    #[error("parameter `{name}` expects a {expected} value")]
    UniformType { name: String, expected: &'static str },
    #[error("no program is active")]
    NoActiveProgram,
    #[error("{0} is not a {1} program")]
    ProgramKindMismatch(ProgramId, &'static str),
    #[error("{0} failed to build: {1}")]
    InvalidProgram(ProgramId, String),
    #[error("framebuffer has no usable color attachment")]
    MissingAttachment,
    #[error("image unit {0} is not bound")]
    ImageUnitUnbound(usize),
    #[error("pipeline creation failed: {0}")]
    Pipeline(String),
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Errors from decoding or encoding image files
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("pixel buffer does not match its dimensions: {0}")]
    InvalidBuffer(String),
}

/// Errors from loading a settings file
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_norway::Error),
}

/// Reasons a pipeline invocation aborts
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to decode input image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("input image {} has zero width or height", path.display())]
    EmptyImage { path: PathBuf },
    #[error("program is not usable: {0}")]
    InvalidProgram(String),
    #[error("failed to allocate {0}")]
    Allocation(String),
    #[error("framebuffer incomplete for pass {pass}: {status:?}")]
    IncompleteFramebuffer { pass: Pass, status: FramebufferStatus },
    #[error("readback returned {actual} bytes, expected {expected}")]
    Readback { expected: usize, actual: usize },
    #[error("failed to encode output image {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

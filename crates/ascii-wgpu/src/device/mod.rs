//! Rendering device abstraction
//!
//! The orchestrator never talks to wgpu directly. Everything it needs from a
//! GPU is expressed by [`RenderDevice`]: allocating render targets, binding
//! textures to fixed slots, drawing a mesh into an output and dispatching a
//! compute program. [`WgpuDevice`] is the production implementation.

mod backend;

#[cfg(test)]
pub(crate) mod recording;

pub use backend::{BuiltinPrograms, TexelData, WgpuDevice};

use crate::codec::PixelBuffer;
use crate::error::DeviceError;

/// Number of texture slots a program can sample from
pub const TEXTURE_SLOTS: usize = 4;

/// Number of image units available to compute programs
pub const IMAGE_UNITS: usize = 2;

/// Format of the write-only storage image a compute program writes
///
/// Renderable on GLES-class adapters too, so the fragment composite can
/// draw into the same target.
pub const STORAGE_IMAGE_FORMAT: TargetFormat = TargetFormat::Rgba16Float;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Opaque handle to a device texture
    TextureId
);
handle!(
    /// Opaque handle to a framebuffer (a color attachment slot)
    FramebufferId
);
handle!(
    /// Opaque handle to a vertex or index buffer
    BufferId
);
handle!(
    /// Opaque handle to a compiled program
    ProgramId
);

/// Capability tier of a device
///
/// Ordered so that `level >= FeatureLevel::Compute` gates the compute branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    /// Rasterization only
    Basic,
    /// Compute programs with storage image writes
    Compute,
}

/// Pixel format of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// One half-float channel
    R16Float,
    /// Two half-float channels
    Rg16Float,
    /// Four half-float channels
    Rgba16Float,
    /// Four float channels
    Rgba32Float,
    /// Four normalized 8-bit channels
    Rgba8Unorm,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 5] = [
        TargetFormat::R16Float,
        TargetFormat::Rg16Float,
        TargetFormat::Rgba16Float,
        TargetFormat::Rgba32Float,
        TargetFormat::Rgba8Unorm,
    ];

    /// Number of color components stored per texel
    pub const fn components(self) -> u32 {
        match self {
            TargetFormat::R16Float => 1,
            TargetFormat::Rg16Float => 2,
            TargetFormat::Rgba16Float | TargetFormat::Rgba32Float | TargetFormat::Rgba8Unorm => 4,
        }
    }

    /// The matching wgpu texture format
    pub const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::R16Float => wgpu::TextureFormat::R16Float,
            TargetFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TargetFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// The two flavours of compiled program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Vertex + fragment stages, drawn with a mesh
    Fragment,
    /// A single compute entry point
    Compute,
}

/// Build state of a compiled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Compiled and linked, ready to be activated
    Ready(ProgramKind),
    /// Construction failed; the program must not be used
    Invalid(String),
    /// The handle does not name a program on this device
    Unknown,
}

impl ProgramStatus {
    /// Whether this status describes a usable program of `kind`
    pub fn is_ready(&self, kind: ProgramKind) -> bool {
        matches!(self, ProgramStatus::Ready(ready) if *ready == kind)
    }
}

/// Completeness of a framebuffer's color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    /// The attachment can be rendered to
    Complete,
    /// Nothing is attached
    MissingAttachment,
    /// The attached texture no longer exists
    UnknownAttachment,
    /// The attached texture's format cannot be a render attachment
    NotRenderable(TargetFormat),
}

/// Access mode of an image unit binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAccess {
    ReadOnly,
    WriteOnly,
}

/// Kind of device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Value assigned to a named program parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
}

/// Attribute layout of a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// `vec2` position followed by `vec2` texture coordinate
    Position2Uv,
    /// `vec3` position followed by `vec2` texture coordinate
    Position3Uv,
}

impl VertexLayout {
    /// Size of one vertex in bytes
    pub const fn stride(self) -> u64 {
        match self {
            VertexLayout::Position2Uv => 4 * 4,
            VertexLayout::Position3Uv => 5 * 4,
        }
    }
}

/// How a mesh's vertices are assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Non-indexed triangle strip
    TriangleStrip { vertex_count: u32 },
    /// Indexed triangle list with `u32` indices
    IndexedTriangles { index_buffer: BufferId, index_count: u32 },
}

/// Geometry that can be drawn with [`RenderDevice::draw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub vertex_buffer: BufferId,
    pub layout: VertexLayout,
    pub topology: Topology,
}

/// Where a draw call writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    /// The texture currently attached to a framebuffer
    Framebuffer(FramebufferId),
    /// The device's default-visible surface, sized for this draw
    Surface { width: u32, height: u32 },
}

/// A rendering device able to execute the ASCII pipeline
///
/// Handles returned by the device stay valid until they are deleted. The
/// device keeps GL-like binding state: texture slots, image units and the
/// active program persist across calls until rebound.
pub trait RenderDevice {
    /// The detected capability tier
    fn feature_level(&self) -> FeatureLevel;

    /// Reports whether `program` was built successfully
    fn program_status(&self, program: ProgramId) -> ProgramStatus;

    /// Allocates a render target, returning `None` if the device refuses
    fn create_texture(&mut self, width: u32, height: u32, format: TargetFormat) -> Option<TextureId>;

    /// Uploads host pixels into a new sampled RGBA8 texture
    fn upload_texture(&mut self, pixels: &PixelBuffer) -> Option<TextureId>;

    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self) -> Option<FramebufferId>;

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Attaches `texture` as the single color output of `framebuffer`
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId);

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Option<BufferId>;

    fn delete_buffer(&mut self, buffer: BufferId);

    /// Binds (or clears) a sampled texture slot
    fn bind_texture(&mut self, slot: usize, texture: Option<TextureId>);

    /// Binds (or clears) an image unit for compute programs
    fn bind_image(&mut self, unit: usize, texture: Option<TextureId>, access: ImageAccess);

    fn use_program(&mut self, program: ProgramId);

    /// Assigns a named parameter of `program`
    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) -> Result<(), DeviceError>;

    /// Draws `mesh` with the active fragment program into `target`
    fn draw(&mut self, target: DrawTarget, mesh: &Mesh) -> Result<(), DeviceError>;

    /// Dispatches the active compute program
    fn dispatch_compute(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<(), DeviceError>;

    /// Makes all previously issued writes visible to subsequent commands
    fn memory_barrier(&mut self);

    /// Reads `width * height` texels of `target` as tightly packed RGB8
    fn read_pixels(&mut self, target: DrawTarget, width: u32, height: u32) -> Result<Vec<u8>, DeviceError>;
}

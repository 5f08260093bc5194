//! Screen-covering geometry

use crate::device::{BufferKind, Mesh, RenderDevice, Topology, VertexLayout};
use crate::error::PipelineError;
use crate::invocation::Invocation;

/// Vertex of the shared pass quad
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Vertex of the final blit quad
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlitVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Triangle strip covering normalized device coordinates
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 0.0] },
];

const BLIT_VERTICES: [BlitVertex; 4] = [
    BlitVertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 1.0] },
    BlitVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 0.0] },
    BlitVertex { position: [1.0, -1.0, 0.0], uv: [1.0, 0.0] },
    BlitVertex { position: [1.0, 1.0, 0.0], uv: [1.0, 1.0] },
];

const BLIT_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// The quad every fragment pass draws
///
/// Created once by the renderer and shared by reference with every
/// invocation. Call [`FullscreenQuad::release`] when the renderer is done.
#[derive(Debug)]
pub struct FullscreenQuad {
    mesh: Mesh,
}

impl FullscreenQuad {
    pub fn new<D: RenderDevice>(device: &mut D) -> Result<Self, PipelineError> {
        let vertex_buffer = device
            .create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&QUAD_VERTICES))
            .ok_or_else(|| PipelineError::Allocation("fullscreen quad vertex buffer".into()))?;

        Ok(Self {
            mesh: Mesh {
                vertex_buffer,
                layout: VertexLayout::Position2Uv,
                topology: Topology::TriangleStrip {
                    vertex_count: QUAD_VERTICES.len() as u32,
                },
            },
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn release<D: RenderDevice>(self, device: &mut D) {
        device.delete_buffer(self.mesh.vertex_buffer);
    }
}

/// Creates the indexed quad used by the end pass
///
/// Both buffers belong to `invocation` and are released with it.
pub fn create_blit_quad<D: RenderDevice>(invocation: &mut Invocation<'_, D>) -> Result<Mesh, PipelineError> {
    let vertex_buffer = invocation
        .create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&BLIT_VERTICES))
        .ok_or_else(|| PipelineError::Allocation("blit quad vertex buffer".into()))?;
    let index_buffer = invocation
        .create_buffer(BufferKind::Index, bytemuck::cast_slice(&BLIT_INDICES))
        .ok_or_else(|| PipelineError::Allocation("blit quad index buffer".into()))?;

    Ok(Mesh {
        vertex_buffer,
        layout: VertexLayout::Position3Uv,
        topology: Topology::IndexedTriangles {
            index_buffer,
            index_count: BLIT_INDICES.len() as u32,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::RecordingDevice;

    #[test]
    fn test_vertex_sizes_match_layouts() {
        assert_eq!(std::mem::size_of::<QuadVertex>() as u64, VertexLayout::Position2Uv.stride());
        assert_eq!(std::mem::size_of::<BlitVertex>() as u64, VertexLayout::Position3Uv.stride());
    }

    #[test]
    fn test_quad_covers_clip_space() {
        for corner in [[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]] {
            assert!(QUAD_VERTICES.iter().any(|v| v.position == corner));
            assert!(BLIT_VERTICES.iter().any(|v| v.position[..2] == corner));
        }
        assert!(BLIT_INDICES.iter().all(|&i| (i as usize) < BLIT_VERTICES.len()));
    }

    #[test]
    fn test_blit_quad_is_owned_by_invocation() {
        let mut device = RecordingDevice::new();
        {
            let mut invocation = Invocation::new(&mut device);
            let mesh = create_blit_quad(&mut invocation).unwrap();
            assert_eq!(mesh.layout, VertexLayout::Position3Uv);
            assert_eq!(invocation.tracked_resources(), 2);
        }
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_fullscreen_quad_release() {
        let mut device = RecordingDevice::new();
        let quad = FullscreenQuad::new(&mut device).unwrap();
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(quad.mesh().topology, Topology::TriangleStrip { vertex_count: 4 });
        quad.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}

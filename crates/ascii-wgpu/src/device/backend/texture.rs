//! Texture creation, upload and readback helpers

use crate::device::TargetFormat;
use crate::error::DeviceError;

/// A texture together with its default view
pub(super) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: TargetFormat,
}

impl GpuTexture {
    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub fn supports(&self, usage: wgpu::TextureUsages) -> bool {
        self.texture.usage().contains(usage)
    }
}

/// Usages granted to every render target
const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_SRC).union(wgpu::TextureUsages::COPY_DST);

/// Usages for uploaded, read-only textures
pub(super) const UPLOAD_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST);

/// Usages `format` allows on textures created from `adapter`
///
/// Downlevel adapters (GL, GLES, WebGL2) validate against their own format
/// table, which can be narrower than the WebGPU guarantees: `Rgba32Float`
/// is not renderable there.
pub(super) fn allowed_usages(adapter: &wgpu::Adapter, device: &wgpu::Device, format: TargetFormat) -> wgpu::TextureUsages {
    if adapter.get_downlevel_capabilities().is_webgpu_compliant() {
        format.to_wgpu().guaranteed_format_features(device.features()).allowed_usages
    } else {
        adapter.get_texture_format_features(format.to_wgpu()).allowed_usages
    }
}

/// Picks render target usages out of `allowed`
///
/// Render attachment is added when the format is renderable, storage only
/// when `storage` is requested and the format supports it.
pub(super) fn target_usage(allowed: wgpu::TextureUsages, storage: bool) -> wgpu::TextureUsages {
    let mut usage = TARGET_USAGE;
    if allowed.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if storage && allowed.contains(wgpu::TextureUsages::STORAGE_BINDING) {
        usage |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    usage
}

/// Creates a single-layer 2D texture without mipmaps
pub(super) fn create_texture(device: &wgpu::Device, label: &str, width: u32, height: u32, format: TargetFormat, usage: wgpu::TextureUsages) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: format.to_wgpu(),
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    GpuTexture { texture, view, format }
}

/// Uploads tightly packed RGBA8 rows into `texture`
pub(super) fn write_rgba8(queue: &wgpu::Queue, texture: &wgpu::Texture, width: u32, height: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Copies `texture` to host memory, returning tightly packed rows
///
/// Submits its own command buffer; pending work must be submitted first.
pub(super) fn read_texture_bytes(device: &wgpu::Device, queue: &wgpu::Queue, texture: &GpuTexture) -> Result<Vec<u8>, DeviceError> {
    let (width, height) = texture.size();
    let bytes_per_texel = texture
        .format
        .to_wgpu()
        .block_copy_size(None)
        .ok_or_else(|| DeviceError::Readback(format!("{:?} has no copyable block size", texture.format)))?;

    // Rows in the staging buffer must be aligned
    let unpadded_bytes_per_row = width * bytes_per_texel;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only disappears if the wait below already failed
        let _ = sender.send(result);
    });

    device.poll(wgpu::PollType::Wait).map_err(|e| DeviceError::Readback(e.to_string()))?;

    pollster::block_on(receiver.receive())
        .ok_or_else(|| DeviceError::Readback("map callback was dropped".into()))?
        .map_err(|e| DeviceError::Readback(e.to_string()))?;

    let mut bytes = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
    {
        let mapped = buffer_slice.get_mapped_range();
        for row in mapped.chunks_exact(padded_bytes_per_row as usize) {
            bytes.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
    }
    buffer.unmap();

    Ok(bytes)
}

/// Texel values of a texture, decoded to `f32`
#[derive(Debug, Clone, PartialEq)]
pub struct TexelData {
    pub width: u32,
    pub height: u32,
    /// Components stored per texel
    pub components: u32,
    /// Row-major values, `components` per texel
    pub values: Vec<f32>,
}

impl TexelData {
    /// Components of the texel at (`x`, `y`), or `None` outside the texture
    pub fn texel(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.components as usize;
        self.values.get(start..start + self.components as usize)
    }

    /// Converts to RGB8, replicating single-channel data and dropping alpha
    pub fn to_rgb8(&self) -> Vec<u8> {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.values
            .chunks_exact(self.components as usize)
            .flat_map(|texel| match *texel {
                [v] => [quantize(v); 3],
                [r, g] => [quantize(r), quantize(g), 0],
                [r, g, b, ..] => [quantize(r), quantize(g), quantize(b)],
                _ => [0; 3],
            })
            .collect()
    }
}

/// Decodes tightly packed texel bytes of `format`
pub(super) fn decode_texels(format: TargetFormat, width: u32, height: u32, bytes: &[u8]) -> TexelData {
    let values = match format {
        TargetFormat::R16Float | TargetFormat::Rg16Float | TargetFormat::Rgba16Float => bytes
            .chunks_exact(2)
            .map(|half_bytes| half::f16::from_le_bytes([half_bytes[0], half_bytes[1]]).to_f32())
            .collect(),
        TargetFormat::Rgba32Float => bytes
            .chunks_exact(4)
            .map(|float_bytes| f32::from_le_bytes([float_bytes[0], float_bytes[1], float_bytes[2], float_bytes[3]]))
            .collect(),
        TargetFormat::Rgba8Unorm => bytes.iter().map(|&b| b as f32 / 255.0).collect(),
    };

    TexelData {
        width,
        height,
        components: format.components(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::STORAGE_IMAGE_FORMAT;

    #[test]
    fn test_decode_half_floats() {
        let bytes: Vec<u8> = [0.5f32, 1.0, -2.0].iter().flat_map(|&v| half::f16::from_f32(v).to_le_bytes()).collect();
        let data = decode_texels(TargetFormat::R16Float, 3, 1, &bytes);
        assert_eq!(data.values, vec![0.5, 1.0, -2.0]);
        assert_eq!(data.texel(1, 0), Some(&[1.0][..]));
    }

    #[test]
    fn test_decode_unorm_and_convert_to_rgb() {
        let data = decode_texels(TargetFormat::Rgba8Unorm, 1, 1, &[255, 0, 51, 128]);
        assert_eq!(data.components, 4);
        assert_eq!(data.to_rgb8(), vec![255, 0, 51]);
    }

    #[test]
    fn test_texel_outside_texture_is_none() {
        let data = TexelData {
            width: 2,
            height: 2,
            components: 2,
            values: vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1, 3.0, 3.1],
        };
        assert_eq!(data.texel(1, 1), Some(&[3.0, 3.1][..]));
        assert_eq!(data.texel(2, 0), None);
        assert_eq!(data.texel(0, 2), None);
        assert_eq!(data.texel(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn test_target_usage_skips_disallowed_render_attachment() {
        // Rgba32Float on a GLES adapter: sampled and copied, never drawn into
        let gles = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        let usage = target_usage(gles, true);
        assert!(!usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(!usage.contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC));
    }

    #[test]
    fn test_target_usage_adds_storage_only_on_request() {
        let allowed = wgpu::TextureUsages::all();
        assert!(target_usage(allowed, false).contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(!target_usage(allowed, false).contains(wgpu::TextureUsages::STORAGE_BINDING));
        assert!(target_usage(allowed, true).contains(wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT));
    }

    #[test]
    fn test_storage_image_format_is_renderable_and_storable() {
        let allowed = STORAGE_IMAGE_FORMAT.to_wgpu().guaranteed_format_features(wgpu::Features::empty()).allowed_usages;
        assert!(allowed.contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn test_rgb_conversion_clamps() {
        let data = TexelData {
            width: 2,
            height: 1,
            components: 1,
            values: vec![-1.0, 2.0],
        };
        assert_eq!(data.to_rgb8(), vec![0, 0, 0, 255, 255, 255]);
    }
}

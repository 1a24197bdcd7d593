//! GPU display target: the progressive accumulation as a sampled texture.

use std::sync::Arc;

use glint_tracer::{DisplayTarget, TransferBuffer};
use wgpu::{BindGroupLayout, Device, Queue};

/// Texel format of the trace texture. Linear radiance, unfilterable.
pub const TRACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Texture holding the most recent finished pass, plus the bind group the
/// blit pipeline samples it through.
pub struct TraceTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub size: (u32, u32),
}

impl TraceTexture {
    fn new(device: &Device, layout: &BindGroupLayout, size: (u32, u32)) -> Self {
        let size = texture_extent(size.0, size.1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Trace Texture"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TRACE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trace Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            }],
        });

        Self {
            texture,
            view,
            bind_group,
            size,
        }
    }
}

/// Bind group layout for a [`TraceTexture`]: one unfilterable float texture
/// read with `textureLoad`.
pub fn trace_bind_group_layout(device: &Device) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Trace Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }],
    })
}

/// Texture size for a render size; wgpu rejects zero extents.
pub fn texture_extent(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

/// [`DisplayTarget`] that uploads each finished pass with `Queue::write_texture`.
///
/// The write is queued and lands with the next submit, so the copy never
/// blocks the frame loop. The last staging buffer is kept for snapshots.
pub struct TextureTarget {
    device: Arc<Device>,
    queue: Arc<Queue>,
    layout: Arc<BindGroupLayout>,
    texture: TraceTexture,
    last: TransferBuffer,
}

impl TextureTarget {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, layout: Arc<BindGroupLayout>, size: (u32, u32)) -> Self {
        let texture = TraceTexture::new(&device, &layout, size);
        Self {
            device,
            queue,
            layout,
            texture,
            last: TransferBuffer::default(),
        }
    }

    /// Last uploaded pass, for saving to disk.
    pub fn snapshot(&self) -> &TransferBuffer {
        &self.last
    }
}

impl DisplayTarget for TextureTarget {
    type Output = TraceTexture;

    fn enqueue_copy(&mut self, buffer: &TransferBuffer) {
        if buffer.width() == 0 || buffer.height() == 0 {
            return;
        }

        let size = (buffer.width(), buffer.height());
        if self.texture.size != size {
            log::debug!("Recreating trace texture at {}x{}", size.0, size.1);
            self.texture = TraceTexture::new(&self.device, &self.layout, size);
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            buffer.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(buffer.bytes_per_row()),
                rows_per_image: Some(buffer.height()),
            },
            wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
        );
        self.last.clone_from(buffer);
    }

    fn output(&self) -> &TraceTexture {
        &self.texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_extent_never_zero() {
        assert_eq!(texture_extent(0, 0), (1, 1));
        assert_eq!(texture_extent(640, 0), (640, 1));
        assert_eq!(texture_extent(320, 200), (320, 200));
    }

    #[test]
    fn test_trace_format_matches_transfer_layout() {
        let buffer = TransferBuffer::new(7, 3);
        let texel = TRACE_FORMAT.block_copy_size(None).unwrap_or(0);
        assert_eq!(buffer.bytes_per_row(), 7 * texel);
    }
}

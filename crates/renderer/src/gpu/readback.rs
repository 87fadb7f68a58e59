use std::sync::mpsc::channel;

use crate::error::FrameError;
use crate::types::{Framebuffer, SurfaceDimensions, BYTES_PER_PIXEL};

/// Copies an RGBA8 texture into a tightly packed [`Framebuffer`].
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: SurfaceDimensions,
) -> Result<Framebuffer, FrameError> {
    let row_bytes = size.width * BYTES_PER_PIXEL as u32;
    let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("framebuffer readback"),
        size: u64::from(padded_row_bytes) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row_bytes),
                rows_per_image: Some(size.height),
            },
        },
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        drop(sender.send(result));
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| FrameError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|err| FrameError::Readback(err.to_string()))?
        .map_err(|err| FrameError::Readback(err.to_string()))?;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(row_bytes as usize * size.height as usize);
    for row in mapped.chunks_exact(padded_row_bytes as usize) {
        pixels.extend_from_slice(&row[..row_bytes as usize]);
    }
    drop(mapped);
    buffer.unmap();

    Framebuffer::from_pixels(size.width, size.height, pixels)
        .ok_or_else(|| FrameError::Readback("mapped buffer size mismatch".to_owned()))
}

use crate::error::FrameError;
use crate::types::FrameImage;

use super::context::OFFSCREEN_FORMAT;

/// The single frame texture, reallocated whenever the frame size changes.
pub struct FrameTexture {
    sampler: wgpu::Sampler,
    storage: Option<TextureStorage>,
}

struct TextureStorage {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl FrameTexture {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            sampler,
            storage: None,
        }
    }

    pub(crate) fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.storage.as_ref().map(|storage| &storage.bind_group)
    }

    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        max_dimension: u32,
        frame: &FrameImage<'_>,
    ) -> Result<(), FrameError> {
        frame.validate()?;
        if frame.width > max_dimension || frame.height > max_dimension {
            return Err(FrameError::TooLarge {
                width: frame.width,
                height: frame.height,
                max: max_dimension,
            });
        }

        let reusable = matches!(
            &self.storage,
            Some(storage) if storage.width == frame.width && storage.height == frame.height
        );
        if !reusable {
            if let Some(previous) = self.storage.take() {
                previous.texture.destroy();
            }
            tracing::trace!(width = frame.width, height = frame.height, "allocating frame texture");
            self.storage = Some(self.allocate(device, layout, frame.width, frame.height));
        }
        let Some(storage) = self.storage.as_ref() else {
            return Ok(());
        };

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn allocate(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
    ) -> TextureStorage {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("packed frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        TextureStorage {
            texture,
            bind_group,
            width,
            height,
        }
    }

    /// Drops the current storage so the next upload allocates afresh.
    pub(crate) fn discard(&mut self) {
        if let Some(storage) = self.storage.take() {
            storage.texture.destroy();
        }
    }

    pub(crate) fn destroy(self) {
        if let Some(storage) = self.storage {
            storage.texture.destroy();
        }
    }
}

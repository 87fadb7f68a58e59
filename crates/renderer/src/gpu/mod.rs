//! wgpu implementation of [`GpuBackend`].
//!
//! - `context` owns instance, device and the output surface (window
//!   swapchain or offscreen texture) and reconfigures it on resize.
//! - `pipeline` compiles the GLSL stages and links them into one render
//!   pipeline with two vertex streams and a single frame bind group.
//! - `texture` keeps the frame texture and its bind group, reallocating
//!   when the incoming frame size changes.
//! - `readback` copies the offscreen target back to the CPU.

mod context;
mod pipeline;
mod readback;
mod texture;

use wgpu::util::DeviceExt;

use crate::backend::{DrawCall, GpuBackend, ResourceCounts};
use crate::compile::ProgramSource;
use crate::error::{FrameError, InitError};
use crate::types::{ContextAttributes, FrameImage, Framebuffer, LogicalSize, SurfaceDimensions};

use self::context::{scoped, GpuContext, OutputSurface};

pub use self::context::OutputTarget;
pub use self::pipeline::DecodeProgram;
pub use self::texture::FrameTexture;

pub struct WgpuBackend {
    context: GpuContext,
    frame_layout: wgpu::BindGroupLayout,
    live: ResourceCounts,
}

/// Maps an error caught by a device error scope onto the frame that hit it.
fn scope_error(stage: &'static str, err: wgpu::Error) -> FrameError {
    match err {
        wgpu::Error::OutOfMemory { .. } => FrameError::OutOfMemory {
            stage,
            log: err.to_string(),
        },
        _ => FrameError::Validation {
            stage,
            log: err.to_string(),
        },
    }
}

impl GpuBackend for WgpuBackend {
    type Target = OutputTarget;
    type Program = DecodeProgram;
    type Buffer = wgpu::Buffer;
    type Texture = FrameTexture;

    fn acquire(target: OutputTarget, attributes: &ContextAttributes) -> Result<Self, InitError> {
        let context = GpuContext::new(target, attributes)?;
        let frame_layout = pipeline::frame_bind_group_layout(&context.device);
        Ok(Self {
            context,
            frame_layout,
            live: ResourceCounts::default(),
        })
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<DecodeProgram, InitError> {
        let program = DecodeProgram::new(
            &self.context.device,
            source,
            &self.frame_layout,
            self.context.format,
        )?;
        self.live.programs += 1;
        Ok(program)
    }

    fn create_vertex_buffer(
        &mut self,
        label: &'static str,
        vertices: &[[f32; 2]],
    ) -> Result<wgpu::Buffer, InitError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            buffer.destroy();
            return Err(InitError::Allocation {
                resource: label,
                log: err.to_string(),
            });
        }
        self.live.buffers += 1;
        Ok(buffer)
    }

    fn create_frame_texture(&mut self) -> Result<FrameTexture, InitError> {
        self.live.textures += 1;
        Ok(FrameTexture::new(&self.context.device))
    }

    fn upload_frame(
        &mut self,
        texture: &mut FrameTexture,
        frame: &FrameImage<'_>,
    ) -> Result<(), FrameError> {
        let context = &self.context;
        let (uploaded, scope) = scoped(&context.device, || {
            texture.upload(
                &context.device,
                &context.queue,
                &self.frame_layout,
                context.max_texture_dimension,
                frame,
            )
        });
        uploaded?;
        match scope {
            Some(err) => {
                texture.discard();
                Err(scope_error("texture upload", err))
            }
            None => Ok(()),
        }
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), FrameError> {
        let context = &self.context;
        let output = context.output.as_ref().ok_or(FrameError::Detached)?;
        let Some(bind_group) = call.texture.bind_group() else {
            return Ok(());
        };

        let (surface_texture, view, size) = match output {
            OutputSurface::Window { surface, config } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                        context.reconfigure();
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (
                    Some(frame),
                    view,
                    SurfaceDimensions::new(config.width, config.height),
                )
            }
            OutputSurface::Offscreen { texture, size } => (
                None,
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
                *size,
            ),
        };

        context.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("dual-channel encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("dual-channel pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let width = call.viewport.width.min(size.width);
            let height = call.viewport.height.min(size.height);
            if width > 0 && height > 0 {
                pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                pass.set_pipeline(&call.program.pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, call.positions.slice(..));
                pass.set_vertex_buffer(1, call.tex_coords.slice(..));
                pass.draw(0..call.vertex_count, 0..1);
            }
        }
        context.queue.submit(Some(encoder.finish()));

        let validation = pollster::block_on(context.device.pop_error_scope());
        let out_of_memory = pollster::block_on(context.device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(scope_error("draw", err));
        }
        if let Some(frame) = surface_texture {
            frame.present();
        }
        Ok(())
    }

    fn configure_surface(&mut self, dimensions: SurfaceDimensions, logical: LogicalSize) {
        tracing::trace!(
            width = dimensions.width,
            height = dimensions.height,
            logical_width = logical.width,
            logical_height = logical.height,
            "configuring output surface"
        );
        self.context.resize(dimensions);
    }

    fn read_pixels(&mut self) -> Result<Framebuffer, FrameError> {
        match self.context.output.as_ref() {
            Some(OutputSurface::Offscreen { texture, size }) => {
                readback::read_texture(&self.context.device, &self.context.queue, texture, *size)
            }
            Some(OutputSurface::Window { .. }) => Err(FrameError::Readback(
                "window swapchains cannot be read back; render offscreen instead".to_owned(),
            )),
            None => Err(FrameError::Detached),
        }
    }

    fn release_buffer(&mut self, buffer: wgpu::Buffer) {
        buffer.destroy();
        self.live.buffers = self.live.buffers.saturating_sub(1);
    }

    fn release_texture(&mut self, texture: FrameTexture) {
        texture.destroy();
        self.live.textures = self.live.textures.saturating_sub(1);
    }

    fn release_program(&mut self, program: DecodeProgram) {
        drop(program);
        self.live.programs = self.live.programs.saturating_sub(1);
    }

    fn detach_surface(&mut self) {
        if let Some(OutputSurface::Offscreen { texture, .. }) = self.context.output.take() {
            texture.destroy();
        }
    }

    fn live_objects(&self) -> ResourceCounts {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_scope_maps_to_its_own_variant() {
        let err = wgpu::Error::OutOfMemory {
            source: Box::new(std::io::Error::other("heap exhausted")),
        };
        assert!(matches!(
            scope_error("texture upload", err),
            FrameError::OutOfMemory { stage: "texture upload", .. }
        ));
    }

    #[test]
    fn validation_scope_keeps_description() {
        let err = wgpu::Error::Validation {
            source: Box::new(std::io::Error::other("bad copy")),
            description: "copy extent exceeds texture".to_owned(),
        };
        match scope_error("draw", err) {
            FrameError::Validation { stage, log } => {
                assert_eq!(stage, "draw");
                assert!(log.contains("copy extent exceeds texture"), "{log}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

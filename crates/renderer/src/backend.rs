use crate::compile::ProgramSource;
use crate::error::{FrameError, InitError};
use crate::types::{ContextAttributes, FrameImage, Framebuffer, LogicalSize, SurfaceDimensions};

/// Number of live GPU objects owned through one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub programs: usize,
    pub buffers: usize,
    pub textures: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.programs + self.buffers + self.textures
    }
}

/// Everything one draw of the quad needs.
pub struct DrawCall<'a, B: GpuBackend> {
    pub program: &'a B::Program,
    pub positions: &'a B::Buffer,
    pub tex_coords: &'a B::Buffer,
    pub texture: &'a B::Texture,
    pub viewport: SurfaceDimensions,
    pub vertex_count: u32,
}

/// A rendering context bound to one output surface.
///
/// Object handles are plain owned values: the caller decides when they go
/// away by handing them back through the `release_*` methods.
pub trait GpuBackend: Sized {
    /// Where the output surface is created (window, offscreen, container).
    type Target;
    type Program;
    type Buffer;
    type Texture;

    /// Creates the output surface inside `target` and acquires a context.
    fn acquire(target: Self::Target, attributes: &ContextAttributes) -> Result<Self, InitError>;

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<Self::Program, InitError>;

    fn create_vertex_buffer(
        &mut self,
        label: &'static str,
        vertices: &[[f32; 2]],
    ) -> Result<Self::Buffer, InitError>;

    /// Allocates the clamp-to-edge, linearly filtered frame texture.
    fn create_frame_texture(&mut self) -> Result<Self::Texture, InitError>;

    /// Replaces the whole texture contents with `frame`.
    fn upload_frame(
        &mut self,
        texture: &mut Self::Texture,
        frame: &FrameImage<'_>,
    ) -> Result<(), FrameError>;

    /// Clears the surface to transparent black and draws the quad with
    /// straight alpha blending.
    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), FrameError>;

    /// Resizes the backing store and records the displayed size.
    fn configure_surface(&mut self, dimensions: SurfaceDimensions, logical: LogicalSize);

    /// Copies the current surface contents to the CPU.
    fn read_pixels(&mut self) -> Result<Framebuffer, FrameError>;

    fn release_buffer(&mut self, buffer: Self::Buffer);
    fn release_texture(&mut self, texture: Self::Texture);
    fn release_program(&mut self, program: Self::Program);

    /// Removes the output surface from its target.
    fn detach_surface(&mut self);

    fn live_objects(&self) -> ResourceCounts;
}

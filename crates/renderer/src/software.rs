//! CPU implementation of the dual-channel pipeline.
//!
//! `SoftwareBackend` rasterises the quad triangle by triangle, samples the
//! frame texture with clamp-to-edge bilinear filtering and blends with
//! straight alpha into an RGBA8 framebuffer. The framebuffer lives in a
//! [`SoftwareContainer`], which plays the part of the host element the
//! surface is attached to and keeps a ledger of live objects.
//!
//! The program is fixed: sources passed to `create_program` are checked for
//! an entry point and a shared varying, then the built-in decode runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{DrawCall, GpuBackend, ResourceCounts};
use crate::compile::ProgramSource;
use crate::error::{FrameError, InitError, ShaderStage};
use crate::layout::{alpha_uv, color_uv};
use crate::types::{
    ContextAttributes, FrameImage, Framebuffer, LogicalSize, SurfaceDimensions, BYTES_PER_PIXEL,
};

const SHARED_VARYING: &str = "v_tex_coord";

/// Largest software framebuffer or frame texture edge, matching wgpu's
/// default `max_texture_dimension_2d`.
pub const DEFAULT_SOFTWARE_MAX_DIMENSION: u32 = 8192;

#[derive(Debug)]
struct ContainerState {
    context_available: bool,
    surface: Option<SurfaceState>,
    attributes: Option<ContextAttributes>,
    live: ResourceCounts,
    pending_faults: u32,
    max_dimension: u32,
}

#[derive(Debug)]
struct SurfaceState {
    framebuffer: Framebuffer,
    displayed: Option<LogicalSize>,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self {
            context_available: true,
            surface: None,
            attributes: None,
            live: ResourceCounts::default(),
            pending_faults: 0,
            max_dimension: DEFAULT_SOFTWARE_MAX_DIMENSION,
        }
    }
}

/// Host element for a software output surface.
///
/// Cloning yields another handle to the same container, so the host keeps
/// observing the surface after handing one handle to the backend.
#[derive(Debug, Clone, Default)]
pub struct SoftwareContainer {
    inner: Rc<RefCell<ContainerState>>,
}

impl SoftwareContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A container whose backing store and frame textures are limited to
    /// `max_dimension` pixels per edge.
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        let container = Self::default();
        container.inner.borrow_mut().max_dimension = max_dimension.max(1);
        container
    }

    /// A container in which context acquisition always fails.
    pub fn without_context() -> Self {
        let container = Self::default();
        container.inner.borrow_mut().context_available = false;
        container
    }

    pub fn is_attached(&self) -> bool {
        self.inner.borrow().surface.is_some()
    }

    /// Snapshot of the attached surface's framebuffer.
    pub fn framebuffer(&self) -> Option<Framebuffer> {
        self.inner
            .borrow()
            .surface
            .as_ref()
            .map(|surface| surface.framebuffer.clone())
    }

    pub fn displayed_size(&self) -> Option<LogicalSize> {
        self.inner
            .borrow()
            .surface
            .as_ref()
            .and_then(|surface| surface.displayed)
    }

    /// Attributes the last context was acquired with.
    pub fn context_attributes(&self) -> Option<ContextAttributes> {
        self.inner.borrow().attributes
    }

    pub fn live_objects(&self) -> ResourceCounts {
        self.inner.borrow().live
    }

    /// Makes the next `count` frame uploads fail, for exercising recovery.
    pub fn inject_frame_faults(&self, count: u32) {
        self.inner.borrow_mut().pending_faults = count;
    }
}

pub struct SoftwareBackend {
    container: SoftwareContainer,
}

#[derive(Debug)]
pub struct SoftwareProgram {
    _private: (),
}

#[derive(Debug)]
pub struct SoftwareBuffer {
    vertices: Vec<[f32; 2]>,
}

#[derive(Debug, Default)]
pub struct SoftwareTexture {
    width: u32,
    height: u32,
    texels: Vec<u8>,
}

impl SoftwareTexture {
    fn fetch(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, i64::from(self.width) - 1) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        let offset = (y * self.width as usize + x) * BYTES_PER_PIXEL;
        let texel = &self.texels[offset..offset + BYTES_PER_PIXEL];
        [
            f32::from(texel[0]) / 255.0,
            f32::from(texel[1]) / 255.0,
            f32::from(texel[2]) / 255.0,
            f32::from(texel[3]) / 255.0,
        ]
    }

    /// Bilinear sample with clamp-to-edge addressing.
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp4(self.fetch(x0, y0), self.fetch(x0 + 1, y0), fx);
        let bottom = lerp4(self.fetch(x0, y0 + 1), self.fetch(x0 + 1, y0 + 1), fx);
        lerp4(top, bottom, fy)
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = a[i] + (b[i] - a[i]) * t;
    }
    out
}

fn barycentric(triangle: &[[f32; 2]], point: [f32; 2]) -> Option<[f32; 3]> {
    const EDGE_EPSILON: f32 = -1e-6;
    let [a, b, c] = [triangle[0], triangle[1], triangle[2]];
    let det = (b[1] - c[1]) * (a[0] - c[0]) + (c[0] - b[0]) * (a[1] - c[1]);
    if det.abs() <= f32::EPSILON {
        return None;
    }
    let l1 = ((b[1] - c[1]) * (point[0] - c[0]) + (c[0] - b[0]) * (point[1] - c[1])) / det;
    let l2 = ((c[1] - a[1]) * (point[0] - c[0]) + (a[0] - c[0]) * (point[1] - c[1])) / det;
    let l3 = 1.0 - l1 - l2;
    if l1 >= EDGE_EPSILON && l2 >= EDGE_EPSILON && l3 >= EDGE_EPSILON {
        Some([l1, l2, l3])
    } else {
        None
    }
}

/// Fragment stage: colour from the right half, alpha from the left half's
/// red channel.
fn shade(texture: &SoftwareTexture, u: f32, v: f32) -> [f32; 4] {
    let (cu, cv) = color_uv(u, v);
    let (au, av) = alpha_uv(u, v);
    let color = texture.sample(cu, cv);
    let alpha = texture.sample(au, av)[0];
    [color[0], color[1], color[2], alpha]
}

/// `src·α + dst·(1-α)` on colour, `α + dst·(1-α)` on the alpha channel.
fn blend(dst: &mut [u8], src: [f32; 4]) {
    let alpha = src[3].clamp(0.0, 1.0);
    let inverse = 1.0 - alpha;
    let to_u8 = |value: f32| (value * 255.0).round().clamp(0.0, 255.0) as u8;
    for channel in 0..3 {
        let existing = f32::from(dst[channel]) / 255.0;
        dst[channel] = to_u8(src[channel] * alpha + existing * inverse);
    }
    let existing = f32::from(dst[3]) / 255.0;
    dst[3] = to_u8(alpha + existing * inverse);
}

fn check_stage(stage: ShaderStage, source: &str) -> Result<(), InitError> {
    if !source.contains("void main") {
        return Err(InitError::ShaderCompile {
            stage,
            log: "ERROR: 0:1: no entry point `main` defined".to_owned(),
        });
    }
    Ok(())
}

impl GpuBackend for SoftwareBackend {
    type Target = SoftwareContainer;
    type Program = SoftwareProgram;
    type Buffer = SoftwareBuffer;
    type Texture = SoftwareTexture;

    fn acquire(target: SoftwareContainer, attributes: &ContextAttributes) -> Result<Self, InitError> {
        {
            let mut state = target.inner.borrow_mut();
            if !state.context_available {
                return Err(InitError::ContextUnavailable {
                    reason: "software container has no rendering context".to_owned(),
                });
            }
            if state.surface.is_some() {
                return Err(InitError::ContextUnavailable {
                    reason: "container already hosts an output surface".to_owned(),
                });
            }
            state.surface = Some(SurfaceState {
                framebuffer: Framebuffer::default(),
                displayed: None,
            });
            state.attributes = Some(*attributes);
        }
        tracing::debug!(?attributes, "acquired software rendering context");
        Ok(Self { container: target })
    }

    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<SoftwareProgram, InitError> {
        check_stage(ShaderStage::Vertex, source.vertex)?;
        check_stage(ShaderStage::Fragment, source.fragment)?;
        if !source.vertex.contains(SHARED_VARYING) || !source.fragment.contains(SHARED_VARYING) {
            return Err(InitError::ProgramLink {
                log: format!("varying `{SHARED_VARYING}` is not shared between stages"),
            });
        }
        self.container.inner.borrow_mut().live.programs += 1;
        Ok(SoftwareProgram { _private: () })
    }

    fn create_vertex_buffer(
        &mut self,
        label: &'static str,
        vertices: &[[f32; 2]],
    ) -> Result<SoftwareBuffer, InitError> {
        self.container.inner.borrow_mut().live.buffers += 1;
        tracing::trace!(label, vertices = vertices.len(), "created software vertex buffer");
        Ok(SoftwareBuffer {
            vertices: vertices.to_vec(),
        })
    }

    fn create_frame_texture(&mut self) -> Result<SoftwareTexture, InitError> {
        self.container.inner.borrow_mut().live.textures += 1;
        Ok(SoftwareTexture::default())
    }

    fn upload_frame(
        &mut self,
        texture: &mut SoftwareTexture,
        frame: &FrameImage<'_>,
    ) -> Result<(), FrameError> {
        let max = {
            let mut state = self.container.inner.borrow_mut();
            if state.pending_faults > 0 {
                state.pending_faults -= 1;
                return Err(FrameError::Injected("texture upload"));
            }
            state.max_dimension
        };
        frame.validate()?;
        if frame.width > max || frame.height > max {
            return Err(FrameError::TooLarge {
                width: frame.width,
                height: frame.height,
                max,
            });
        }
        texture.width = frame.width;
        texture.height = frame.height;
        texture.texels.clear();
        texture.texels.extend_from_slice(frame.pixels);
        Ok(())
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), FrameError> {
        let mut state = self.container.inner.borrow_mut();
        let surface = state.surface.as_mut().ok_or(FrameError::Detached)?;
        let framebuffer = &mut surface.framebuffer;
        framebuffer.pixels_mut().fill(0);

        let width = call.viewport.width.min(framebuffer.width());
        let height = call.viewport.height.min(framebuffer.height());
        if width == 0 || height == 0 {
            return Ok(());
        }

        let vertex_count = call.vertex_count as usize;
        let positions = &call.positions.vertices[..vertex_count.min(call.positions.vertices.len())];
        let tex_coords =
            &call.tex_coords.vertices[..vertex_count.min(call.tex_coords.vertices.len())];
        let stride = framebuffer.width() as usize;
        let pixels = framebuffer.pixels_mut();

        for y in 0..height {
            for x in 0..width {
                let point = [
                    (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
                    1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
                ];
                let covered = positions
                    .chunks_exact(3)
                    .zip(tex_coords.chunks_exact(3))
                    .find_map(|(triangle, uvs)| barycentric(triangle, point).map(|w| (w, uvs)));
                let Some((weights, uvs)) = covered else {
                    continue;
                };
                let u = weights[0] * uvs[0][0] + weights[1] * uvs[1][0] + weights[2] * uvs[2][0];
                let v = weights[0] * uvs[0][1] + weights[1] * uvs[1][1] + weights[2] * uvs[2][1];
                let offset = (y as usize * stride + x as usize) * BYTES_PER_PIXEL;
                blend(
                    &mut pixels[offset..offset + BYTES_PER_PIXEL],
                    shade(call.texture, u, v),
                );
            }
        }
        Ok(())
    }

    fn configure_surface(&mut self, dimensions: SurfaceDimensions, logical: LogicalSize) {
        let mut state = self.container.inner.borrow_mut();
        let max = state.max_dimension;
        let Some(surface) = state.surface.as_mut() else {
            return;
        };
        let clamped = SurfaceDimensions::new(dimensions.width.min(max), dimensions.height.min(max));
        if clamped != dimensions {
            tracing::debug!(
                requested_width = dimensions.width,
                requested_height = dimensions.height,
                max,
                "clamping software backing store"
            );
        }
        if surface.framebuffer.dimensions() != clamped {
            match Framebuffer::new(clamped.width, clamped.height) {
                Some(framebuffer) => surface.framebuffer = framebuffer,
                None => tracing::warn!(
                    width = clamped.width,
                    height = clamped.height,
                    "software backing store too large; keeping the previous one"
                ),
            }
        }
        surface.displayed = Some(logical);
    }

    fn read_pixels(&mut self) -> Result<Framebuffer, FrameError> {
        self.container.framebuffer().ok_or(FrameError::Detached)
    }

    fn release_buffer(&mut self, _buffer: SoftwareBuffer) {
        let mut state = self.container.inner.borrow_mut();
        state.live.buffers = state.live.buffers.saturating_sub(1);
    }

    fn release_texture(&mut self, _texture: SoftwareTexture) {
        let mut state = self.container.inner.borrow_mut();
        state.live.textures = state.live.textures.saturating_sub(1);
    }

    fn release_program(&mut self, _program: SoftwareProgram) {
        let mut state = self.container.inner.borrow_mut();
        state.live.programs = state.live.programs.saturating_sub(1);
    }

    fn detach_surface(&mut self) {
        self.container.inner.borrow_mut().surface = None;
    }

    fn live_objects(&self) -> ResourceCounts {
        self.container.live_objects()
    }
}

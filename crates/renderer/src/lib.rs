//! Dual-channel alpha compositing.
//!
//! Ordinary video codecs carry no alpha. A packed frame works around that by
//! placing the alpha mask (as gray) in the left half and the colour in the
//! right half of every frame. [`DualChannelAlphaRenderer`] uploads each frame
//! as a texture and recombines the halves in a fragment shader, producing
//! RGBA output that composites over whatever lies behind the surface.
//!
//! ```text
//!   FrameSource ──current_frame()──▶ render() ─▶ upload ─▶ draw quad ─▶ surface
//!        ▲                              ▲
//!        │ host playback                │ on_frame(handle)
//!   PlaybackEvent / visibility ──▶ PlaybackGate ──▶ start_loop / stop_loop
//!                                                        │
//!                                                 FrameScheduler
//! ```
//!
//! Two backends implement [`GpuBackend`]: [`WgpuBackend`] renders into a
//! window or an offscreen texture, [`SoftwareBackend`] rasterises on the CPU
//! into a [`SoftwareContainer`] and is what the integration tests drive.

mod backend;
mod compile;
mod error;
mod geometry;
mod gpu;
mod layout;
mod playback;
mod render_loop;
mod renderer;
mod software;
mod types;

pub use backend::{DrawCall, GpuBackend, ResourceCounts};
pub use compile::{ProgramSource, FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
pub use error::{FrameError, InitError, ShaderStage};
pub use geometry::{QUAD_POSITIONS, QUAD_TEX_COORDS, QUAD_VERTEX_COUNT};
pub use gpu::{DecodeProgram, FrameTexture, OutputTarget, WgpuBackend};
pub use layout::{
    alpha_uv, color_uv, decode_texel, display_width, pack_rgba, responsive_size, unpack_packed,
    DEFAULT_CONTAINER_WIDTH, INITIAL_SIZE,
};
pub use playback::{LoopCommand, PlaybackEvent, PlaybackGate};
pub use render_loop::{LoopState, RenderLoop};
pub use renderer::{DualChannelAlphaRenderer, RenderStats};
pub use software::{
    SoftwareBackend, SoftwareBuffer, SoftwareContainer, SoftwareProgram, SoftwareTexture,
    DEFAULT_SOFTWARE_MAX_DIMENSION,
};
pub use types::{
    effective_pixel_density, ContextAttributes, FrameImage, FrameSource, Framebuffer, LogicalSize,
    PowerPreference, RendererOptions, SurfaceDimensions, BYTES_PER_PIXEL, MAX_PIXEL_DENSITY,
};

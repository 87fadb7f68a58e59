use std::fmt;

/// Pipeline stage a shader belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Failures that make a renderer instance unusable.
///
/// These are only produced while initialising; the instance is left
/// uninitialised and holds no GPU objects afterwards.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no GPU rendering context available: {reason}")]
    ContextUnavailable { reason: String },
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("shader program failed to link: {log}")]
    ProgramLink { log: String },
    #[error("failed to allocate {resource}: {log}")]
    Allocation { resource: &'static str, log: String },
    #[error("renderer is already initialised")]
    AlreadyInitialized,
    #[error("renderer has been disposed")]
    Disposed,
}

/// Failures confined to a single rendered frame.
///
/// `render()` logs these and carries on; the next scheduled frame tries again.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGBA frame")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame {width}x{height} exceeds the maximum texture dimension {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("failed to acquire surface texture: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("GPU validation failed during {stage}: {log}")]
    Validation { stage: &'static str, log: String },
    #[error("GPU ran out of memory during {stage}: {log}")]
    OutOfMemory { stage: &'static str, log: String },
    #[error("failed to read back framebuffer: {0}")]
    Readback(String),
    #[error("output surface is not attached")]
    Detached,
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

use scheduler::{FrameHandle, FrameScheduler};

use crate::backend::{DrawCall, GpuBackend, ResourceCounts};
use crate::compile::ProgramSource;
use crate::error::{FrameError, InitError};
use crate::geometry::{QUAD_POSITIONS, QUAD_TEX_COORDS, QUAD_VERTEX_COUNT};
use crate::layout::{responsive_size, INITIAL_SIZE};
use crate::playback::{LoopCommand, PlaybackEvent, PlaybackGate};
use crate::render_loop::{LoopState, RenderLoop};
use crate::types::{
    effective_pixel_density, ContextAttributes, FrameImage, FrameSource, Framebuffer, LogicalSize,
    RendererOptions, SurfaceDimensions,
};

/// Counters kept across the lifetime of one renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub frames_rendered: u64,
    /// Renders that found no frame ready (or a zero-sized one).
    pub frames_skipped: u64,
    /// Renders dropped because of a [`FrameError`].
    pub frame_errors: u64,
}

/// Every GPU object the renderer owns besides the context itself.
struct GpuResources<B: GpuBackend> {
    program: B::Program,
    positions: B::Buffer,
    tex_coords: B::Buffer,
    texture: B::Texture,
}

impl<B: GpuBackend> GpuResources<B> {
    /// Creates program, quad buffers and texture. Whatever was created before
    /// a failure is released again.
    fn build(backend: &mut B, source: &ProgramSource<'_>) -> Result<Self, InitError> {
        let program = backend.create_program(source)?;

        let positions = match backend.create_vertex_buffer("quad positions", &QUAD_POSITIONS) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.release_program(program);
                return Err(err);
            }
        };

        let tex_coords = match backend.create_vertex_buffer("quad tex coords", &QUAD_TEX_COORDS) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.release_buffer(positions);
                backend.release_program(program);
                return Err(err);
            }
        };

        let texture = match backend.create_frame_texture() {
            Ok(texture) => texture,
            Err(err) => {
                backend.release_buffer(positions);
                backend.release_buffer(tex_coords);
                backend.release_program(program);
                return Err(err);
            }
        };

        Ok(Self {
            program,
            positions,
            tex_coords,
            texture,
        })
    }

    /// Buffers first, then the texture, then the program.
    fn release(self, backend: &mut B) {
        backend.release_buffer(self.positions);
        backend.release_buffer(self.tex_coords);
        backend.release_texture(self.texture);
        backend.release_program(self.program);
    }

    fn draw_frame(
        &mut self,
        backend: &mut B,
        frame: &FrameImage<'_>,
        viewport: SurfaceDimensions,
    ) -> Result<(), FrameError> {
        frame.validate()?;
        backend.upload_frame(&mut self.texture, frame)?;
        backend.draw(DrawCall {
            program: &self.program,
            positions: &self.positions,
            tex_coords: &self.tex_coords,
            texture: &self.texture,
            viewport,
            vertex_count: QUAD_VERTEX_COUNT,
        })
    }
}

/// Composites a packed dual-channel frame stream onto one output surface.
///
/// The renderer is bound to one output target and one frame source at
/// construction. Nothing touches the GPU until [`initialize`] succeeds, and
/// after [`dispose`] every method is an inert no-op.
///
/// Fired frames come back through [`on_frame`] with the handle the
/// scheduler issued; handles from before a `stop_loop` are ignored.
///
/// [`initialize`]: DualChannelAlphaRenderer::initialize
/// [`dispose`]: DualChannelAlphaRenderer::dispose
/// [`on_frame`]: DualChannelAlphaRenderer::on_frame
pub struct DualChannelAlphaRenderer<B, F, S>
where
    B: GpuBackend,
    F: FrameSource,
    S: FrameScheduler,
{
    target: Option<B::Target>,
    backend: Option<B>,
    resources: Option<GpuResources<B>>,
    frame_source: Option<F>,
    scheduler: S,
    render_loop: RenderLoop,
    gate: PlaybackGate,
    attributes: ContextAttributes,
    pixel_density: f64,
    logical: LogicalSize,
    dimensions: SurfaceDimensions,
    container_width: Option<f64>,
    container_height: Option<f64>,
    stats: RenderStats,
    disposed: bool,
}

impl<B, F, S> DualChannelAlphaRenderer<B, F, S>
where
    B: GpuBackend,
    F: FrameSource,
    S: FrameScheduler,
{
    pub fn new(target: B::Target, frame_source: F, scheduler: S, options: RendererOptions) -> Self {
        let logical = INITIAL_SIZE;
        Self {
            target: Some(target),
            backend: None,
            resources: None,
            frame_source: Some(frame_source),
            scheduler,
            render_loop: RenderLoop::default(),
            gate: PlaybackGate::default(),
            attributes: options.attributes,
            pixel_density: options.pixel_density,
            logical,
            dimensions: SurfaceDimensions::from_logical(logical, options.pixel_density),
            container_width: None,
            container_height: None,
            stats: RenderStats::default(),
            disposed: false,
        }
    }

    /// Constructs and initialises in one step.
    pub fn create(
        target: B::Target,
        frame_source: F,
        scheduler: S,
        options: RendererOptions,
    ) -> Result<Self, InitError> {
        let mut renderer = Self::new(target, frame_source, scheduler, options);
        renderer.initialize()?;
        Ok(renderer)
    }

    /// Acquires the context and builds program, geometry and texture.
    ///
    /// On failure nothing stays allocated and the renderer remains
    /// uninitialised. The output target is consumed by the first attempt.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        if self.disposed {
            return Err(InitError::Disposed);
        }
        if self.backend.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        let target = self
            .target
            .take()
            .ok_or_else(|| InitError::ContextUnavailable {
                reason: "output target was consumed by an earlier initialisation attempt"
                    .to_owned(),
            })?;

        let mut backend = B::acquire(target, &self.attributes)?;
        let resources = match GpuResources::build(&mut backend, &ProgramSource::dual_channel()) {
            Ok(resources) => resources,
            Err(err) => {
                backend.detach_surface();
                tracing::error!(error = %err, "dual-channel renderer failed to initialise");
                return Err(err);
            }
        };
        backend.configure_surface(self.dimensions, self.logical);

        self.backend = Some(backend);
        self.resources = Some(resources);
        tracing::info!(
            width = self.dimensions.width,
            height = self.dimensions.height,
            "dual-channel renderer initialised"
        );
        Ok(())
    }

    /// Uploads the current frame and draws it. Never fails: frame errors are
    /// logged and the next call tries again.
    pub fn render(&mut self) {
        let (Some(backend), Some(resources)) = (self.backend.as_mut(), self.resources.as_mut())
        else {
            return;
        };
        let frame = self
            .frame_source
            .as_ref()
            .and_then(|source| source.current_frame())
            .filter(|frame| !frame.is_empty());
        let Some(frame) = frame else {
            self.stats.frames_skipped += 1;
            return;
        };

        match resources.draw_frame(backend, &frame, self.dimensions) {
            Ok(()) => self.stats.frames_rendered += 1,
            Err(err) => {
                self.stats.frame_errors += 1;
                tracing::warn!(error = %err, "dropping frame");
            }
        }
    }

    /// Resizes the backing store to `logical × min(density, 2.0)`.
    pub fn resize(&mut self, logical_width: f64, logical_height: f64) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        self.logical = LogicalSize::new(logical_width, logical_height);
        self.dimensions = SurfaceDimensions::from_logical(self.logical, self.pixel_density);
        backend.configure_surface(self.dimensions, self.logical);
        tracing::debug!(
            logical_width,
            logical_height,
            width = self.dimensions.width,
            height = self.dimensions.height,
            "resized output surface"
        );

        if !self.render_loop.is_running() {
            self.render();
        }
    }

    pub fn start_loop(&mut self) {
        if self.backend.is_none() || !self.render_loop.begin() {
            return;
        }
        tracing::debug!("render loop started");
        self.render();
        self.render_loop.schedule(&mut self.scheduler);
    }

    pub fn stop_loop(&mut self) {
        if self.render_loop.stop(&mut self.scheduler) {
            tracing::debug!("render loop stopped");
        }
    }

    /// Delivers a fired frame. Returns `true` if it rendered.
    pub fn on_frame(&mut self, handle: FrameHandle) -> bool {
        if !self.render_loop.accept(handle) {
            return false;
        }
        self.render();
        if self.render_loop.is_running() {
            self.render_loop.schedule(&mut self.scheduler);
        }
        true
    }

    /// Stops the loop, releases every GPU object and detaches the surface.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.render_loop.stop(&mut self.scheduler);
        if let Some(mut backend) = self.backend.take() {
            if let Some(resources) = self.resources.take() {
                resources.release(&mut backend);
            }
            backend.detach_surface();
            let remaining = backend.live_objects();
            if remaining.total() > 0 {
                tracing::warn!(?remaining, "GPU objects outlived disposal");
            }
        }
        self.target = None;
        self.frame_source = None;
        self.gate.reset();
        self.disposed = true;
        tracing::info!("dual-channel renderer disposed");
    }

    pub fn on_playback_event(&mut self, event: PlaybackEvent) {
        if self.disposed {
            return;
        }
        let command = self.gate.on_playback(event);
        tracing::trace!(?event, ?command, "playback event");
        self.apply(command);
    }

    pub fn on_visibility_changed(&mut self, visible: bool) {
        if self.disposed {
            return;
        }
        let command = self.gate.on_visibility(visible);
        tracing::trace!(visible, ?command, "visibility changed");
        self.apply(command);
    }

    /// Records the container size and, once frames are loaded, lays the
    /// surface out to the container width at the frame's aspect ratio.
    pub fn on_container_resized(&mut self, width: f64, height: Option<f64>) {
        if self.disposed {
            return;
        }
        self.container_width = Some(width);
        self.container_height = height;
        if self.gate.accepts_layout() {
            self.layout();
        }
    }

    /// Updates the device pixel density and re-sizes the backing store.
    pub fn set_pixel_density(&mut self, pixel_density: f64) {
        if self.disposed {
            return;
        }
        let changed = effective_pixel_density(pixel_density) != self.effective_pixel_density();
        self.pixel_density = pixel_density;
        if !changed {
            return;
        }
        if self.backend.is_some() {
            let LogicalSize { width, height } = self.logical;
            self.resize(width, height);
        } else {
            self.dimensions = SurfaceDimensions::from_logical(self.logical, pixel_density);
        }
    }

    fn apply(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Start => self.start_loop(),
            LoopCommand::Stop => self.stop_loop(),
            LoopCommand::Layout => self.layout(),
            LoopCommand::Hold => {}
        }
    }

    fn layout(&mut self) {
        let frame = self
            .frame_source
            .as_ref()
            .and_then(|source| source.current_frame())
            .map(|frame| (frame.width, frame.height));
        let size = responsive_size(self.container_width, self.container_height, frame);
        self.resize(size.width, size.height);
    }

    /// Copies the surface back to the CPU (offscreen and software targets).
    pub fn read_pixels(&mut self) -> Result<Framebuffer, FrameError> {
        self.backend
            .as_mut()
            .ok_or(FrameError::Detached)?
            .read_pixels()
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_looping(&self) -> bool {
        self.render_loop.is_running()
    }

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.render_loop.pending()
    }

    pub fn playback(&self) -> &PlaybackGate {
        &self.gate
    }

    pub fn surface_dimensions(&self) -> SurfaceDimensions {
        self.dimensions
    }

    pub fn logical_size(&self) -> LogicalSize {
        self.logical
    }

    pub fn pixel_density(&self) -> f64 {
        self.pixel_density
    }

    pub fn effective_pixel_density(&self) -> f64 {
        effective_pixel_density(self.pixel_density)
    }

    pub fn live_objects(&self) -> ResourceCounts {
        self.backend
            .as_ref()
            .map(GpuBackend::live_objects)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn frame_source(&self) -> Option<&F> {
        self.frame_source.as_ref()
    }

    pub fn frame_source_mut(&mut self) -> Option<&mut F> {
        self.frame_source.as_mut()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }
}

impl<B, F, S> Drop for DualChannelAlphaRenderer<B, F, S>
where
    B: GpuBackend,
    F: FrameSource,
    S: FrameScheduler,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShaderStage;
    use crate::software::{SoftwareBackend, SoftwareContainer};

    fn backend() -> (SoftwareContainer, SoftwareBackend) {
        let container = SoftwareContainer::new();
        let backend = SoftwareBackend::acquire(container.clone(), &ContextAttributes::default())
            .expect("software context");
        (container, backend)
    }

    #[test]
    fn resources_release_everything() {
        let (container, mut backend) = backend();
        let resources =
            GpuResources::build(&mut backend, &ProgramSource::dual_channel()).expect("resources");
        assert_eq!(
            container.live_objects(),
            ResourceCounts {
                programs: 1,
                buffers: 2,
                textures: 1
            }
        );
        resources.release(&mut backend);
        assert_eq!(container.live_objects().total(), 0);
    }

    #[test]
    fn compile_failure_names_stage_and_leaves_nothing_behind() {
        let (container, mut backend) = backend();
        let source = ProgramSource {
            vertex: ProgramSource::dual_channel().vertex,
            fragment: "#version 450\nvoid mian() {}",
        };
        let err = GpuResources::build(&mut backend, &source)
            .err()
            .expect("fragment stage must fail");
        assert!(matches!(
            err,
            InitError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(container.live_objects().total(), 0);
    }

    #[test]
    fn link_failure_carries_log() {
        let (_container, mut backend) = backend();
        let source = ProgramSource {
            vertex: "#version 450\nvoid main() {}",
            fragment: ProgramSource::dual_channel().fragment,
        };
        match GpuResources::build(&mut backend, &source) {
            Err(InitError::ProgramLink { log }) => assert!(log.contains("v_tex_coord")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("link should fail"),
        }
    }
}

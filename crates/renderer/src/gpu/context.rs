use std::sync::Arc;

use winit::window::Window;

use crate::error::InitError;
use crate::types::{ContextAttributes, PowerPreference, SurfaceDimensions};

/// Texture format of frame textures and offscreen targets.
pub(crate) const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where the wgpu backend renders to.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// A window-backed swapchain.
    Window(Arc<Window>),
    /// A private texture that can be read back with `read_pixels`.
    Offscreen,
}

pub(crate) enum OutputSurface {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        size: SurfaceDimensions,
    },
}

pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
    pub max_texture_dimension: u32,
    pub output: Option<OutputSurface>,
}

fn unavailable(reason: impl std::fmt::Display) -> InitError {
    InitError::ContextUnavailable {
        reason: reason.to_string(),
    }
}

impl GpuContext {
    pub(crate) fn new(target: OutputTarget, attributes: &ContextAttributes) -> Result<Self, InitError> {
        if attributes.antialias || attributes.depth || attributes.stencil {
            tracing::warn!(
                antialias = attributes.antialias,
                depth = attributes.depth,
                stencil = attributes.stencil,
                "dual-channel pipeline renders without multisampling, depth or stencil; ignoring request"
            );
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let surface = match &target {
            OutputTarget::Window(window) => Some(
                instance
                    .create_surface(Arc::clone(window))
                    .map_err(|err| unavailable(format!("failed to create rendering surface: {err}")))?,
            ),
            OutputTarget::Offscreen => None,
        };

        let power_preference = match attributes.power_preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .map_err(|err| unavailable(format!("failed to find a suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("dual-channel device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| unavailable(format!("failed to create GPU device: {err}")))?;
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(error = %error, "uncaptured wgpu error");
        }));

        let (format, output) = match (target, surface) {
            (OutputTarget::Window(window), Some(surface)) => {
                let caps = surface.get_capabilities(&adapter);
                let Some(&first_format) = caps.formats.first() else {
                    return Err(unavailable("surface reports no supported formats"));
                };
                // Decoded colour is written as-is; an sRGB target would re-encode it.
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|format| !format.is_srgb())
                    .unwrap_or_else(|| {
                        tracing::warn!(
                            fallback = ?first_format,
                            "no linear (non-sRGB) surface format available"
                        );
                        first_format
                    });
                let alpha_mode = pick_alpha_mode(&caps, attributes.alpha);
                let present_mode = caps
                    .present_modes
                    .iter()
                    .copied()
                    .find(|mode| *mode == wgpu::PresentMode::Fifo)
                    .unwrap_or(wgpu::PresentMode::AutoVsync);
                tracing::debug!(?format, ?alpha_mode, ?present_mode, "configured window surface");

                let size = window.inner_size();
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: size.width.max(1),
                    height: size.height.max(1),
                    present_mode,
                    alpha_mode,
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                let ((), error) = scoped(&device, || surface.configure(&device, &config));
                if let Some(err) = error {
                    return Err(unavailable(format!("failed to configure window surface: {err}")));
                }
                (format, OutputSurface::Window { surface, config })
            }
            _ => {
                let size = SurfaceDimensions::new(1, 1);
                let texture = create_offscreen_texture(&device, size);
                (OFFSCREEN_FORMAT, OutputSurface::Offscreen { texture, size })
            }
        };

        Ok(Self {
            _instance: instance,
            device,
            queue,
            format,
            max_texture_dimension: limits.max_texture_dimension_2d,
            output: Some(output),
        })
    }

    /// Reconfigures the output for a new backing-store size. Zero sizes are
    /// ignored; the surface keeps its previous configuration.
    pub(crate) fn resize(&mut self, dimensions: SurfaceDimensions) {
        if dimensions.is_empty() {
            return;
        }
        let max = self.max_texture_dimension;
        let dimensions = SurfaceDimensions::new(dimensions.width.min(max), dimensions.height.min(max));

        match self.output.as_mut() {
            Some(OutputSurface::Window { surface, config }) => {
                if config.width == dimensions.width && config.height == dimensions.height {
                    return;
                }
                config.width = dimensions.width;
                config.height = dimensions.height;
                let device = &self.device;
                let ((), error) = scoped(device, || surface.configure(device, config));
                if let Some(err) = error {
                    tracing::error!(
                        error = %err,
                        width = dimensions.width,
                        height = dimensions.height,
                        "failed to reconfigure window surface"
                    );
                }
            }
            Some(OutputSurface::Offscreen { texture, size }) => {
                if *size == dimensions {
                    return;
                }
                let device = &self.device;
                let (replacement, error) =
                    scoped(device, || create_offscreen_texture(device, dimensions));
                if let Some(err) = error {
                    replacement.destroy();
                    tracing::error!(
                        error = %err,
                        width = dimensions.width,
                        height = dimensions.height,
                        "failed to allocate offscreen target; keeping the previous one"
                    );
                    return;
                }
                texture.destroy();
                *texture = replacement;
                *size = dimensions;
            }
            None => {}
        }
    }

    /// Reapplies the current configuration after the swapchain went stale.
    pub(crate) fn reconfigure(&self) {
        if let Some(OutputSurface::Window { surface, config }) = self.output.as_ref() {
            let device = &self.device;
            let ((), error) = scoped(device, || surface.configure(device, config));
            if let Some(err) = error {
                tracing::error!(error = %err, "failed to reconfigure stale window surface");
            }
        }
    }
}

/// Runs `operation` inside out-of-memory and validation error scopes and
/// returns the first error either caught. Out-of-memory is reported first.
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    operation: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = operation();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, out_of_memory.or(validation))
}

fn pick_alpha_mode(caps: &wgpu::SurfaceCapabilities, alpha: bool) -> wgpu::CompositeAlphaMode {
    let preferred: &[wgpu::CompositeAlphaMode] = if alpha {
        &[
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
            wgpu::CompositeAlphaMode::Inherit,
        ]
    } else {
        &[wgpu::CompositeAlphaMode::Opaque]
    };
    preferred
        .iter()
        .copied()
        .find(|mode| caps.alpha_modes.contains(mode))
        .unwrap_or_else(|| {
            if alpha {
                tracing::warn!(
                    supported = ?caps.alpha_modes,
                    "compositor cannot blend surface alpha; transparent regions may render opaque"
                );
            }
            caps.alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        })
}

pub(crate) fn create_offscreen_texture(
    device: &wgpu::Device,
    size: SurfaceDimensions,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use playerconfig::{BackendKind, PlayerConfig, PowerSetting, ResolvedClip};
use renderer::{
    responsive_size, ContextAttributes, DualChannelAlphaRenderer, FrameSource, OutputTarget,
    PlaybackEvent, PowerPreference, RendererOptions, WgpuBackend,
};
use scheduler::{FrameHandle, PacedScheduler};
use tracing_subscriber::EnvFilter;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::cli::PlayArgs;
use crate::paths::AppPaths;
use crate::player::SequencePlayer;

type WindowRenderer = DualChannelAlphaRenderer<WgpuBackend, SequencePlayer, PacedScheduler>;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: PlayArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = paths.load_config(args.config.as_deref())?;
    let clip = resolve_clip(&config, &args)?;
    tracing::info!(
        clip = %clip.name,
        frames = %clip.frames.display(),
        fps = clip.fps,
        loops = clip.loops,
        width = clip.container_width,
        "starting playback"
    );
    if clip.backend == BackendKind::Software {
        tracing::warn!("software backend only renders offscreen; playing on the GPU");
    }

    let player = SequencePlayer::open(&clip.frames, clip.fps, clip.loops)?;
    let frame_size = player
        .current_frame()
        .map(|frame| (frame.width, frame.height));
    let initial = responsive_size(Some(clip.container_width), None, frame_size);

    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window = WindowBuilder::new()
        .with_title(format!("alphaplay: {}", clip.name))
        .with_transparent(true)
        .with_inner_size(LogicalSize::new(initial.width, initial.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create player window: {err}"))?;
    let window = Arc::new(window);

    let options = RendererOptions {
        attributes: ContextAttributes {
            power_preference: power_preference(clip.power),
            ..ContextAttributes::default()
        },
        pixel_density: window.scale_factor(),
    };
    let mut renderer = WindowRenderer::create(
        OutputTarget::Window(window.clone()),
        player,
        PacedScheduler::new(args.max_fps),
        options,
    )
    .context("failed to initialise dual-channel renderer")?;

    renderer.on_container_resized(clip.container_width, None);
    renderer.on_playback_event(PlaybackEvent::Loaded);
    if clip.autoplay && !args.paused {
        drive(&mut renderer, |player| player.play(Instant::now()));
    }

    let pause_when_hidden = clip.pause_when_hidden;
    let mut fired: Option<FrameHandle> = None;
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                renderer.dispose();
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if handle_key(&mut renderer, &event) == KeyAction::Exit {
                    renderer.dispose();
                    elwt.exit();
                }
            }
            WindowEvent::Resized(size) => {
                let logical: LogicalSize<f64> = size.to_logical(window.scale_factor());
                if logical.width <= 0.0 {
                    return;
                }
                renderer.on_container_resized(logical.width, Some(logical.height));
                let laid_out = renderer.logical_size();
                let wanted: PhysicalSize<u32> = LogicalSize::new(laid_out.width, laid_out.height)
                    .to_physical(window.scale_factor());
                if wanted.height.abs_diff(size.height) > 1 {
                    let _ = window.request_inner_size(wanted);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                renderer.set_pixel_density(scale_factor);
            }
            WindowEvent::Occluded(occluded) => {
                if pause_when_hidden {
                    renderer.on_visibility_changed(!occluded);
                }
            }
            WindowEvent::RedrawRequested => match fired.take() {
                Some(handle) => {
                    renderer.on_frame(handle);
                }
                None => renderer.render(),
            },
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            let events = renderer
                .frame_source_mut()
                .map(|player| player.tick(now))
                .unwrap_or_default();
            for event in events {
                renderer.on_playback_event(event);
            }

            if let Some(handle) = renderer.scheduler_mut().due(now) {
                tracing::trace!(handle = handle.id(), "scheduler: issuing redraw now");
                fired = Some(handle);
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
                return;
            }
            let player_deadline = renderer
                .frame_source()
                .and_then(SequencePlayer::next_deadline);
            let frame_deadline = renderer.scheduler().next_deadline();
            match earliest(player_deadline, frame_deadline) {
                Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                None => elwt.set_control_flow(ControlFlow::Wait),
            }
        }
        Event::LoopExiting => {
            let stats = renderer.stats();
            tracing::info!(
                rendered = stats.frames_rendered,
                skipped = stats.frames_skipped,
                errors = stats.frame_errors,
                "player window closed"
            );
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("player event loop error: {err}"))
}

/// Picks the clip named on the command line, a bare frames directory, or the
/// configured default, then applies command-line overrides.
pub fn resolve_clip(config: &PlayerConfig, args: &PlayArgs) -> Result<ResolvedClip> {
    let mut clip = match args.clip.as_deref() {
        Some(name) => match config.resolve_clip(name) {
            Some(clip) => clip,
            None if Path::new(name).is_dir() => {
                let label = Path::new(name)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.to_owned());
                config.resolve_frames(&label, name.into())
            }
            None => bail!("'{name}' is neither a configured clip nor a frames directory"),
        },
        None => {
            let Some(name) = config.default_clip() else {
                bail!("no clip given and the config names no default clip");
            };
            config
                .resolve_clip(name)
                .with_context(|| format!("default clip '{name}' is not defined"))?
        }
    };

    if let Some(fps) = args.fps {
        if !(fps.is_finite() && fps > 0.0) {
            bail!("--fps must be greater than zero");
        }
        clip.fps = fps;
    }
    if let Some(loops) = args.loops {
        clip.loops = loops;
    }
    if let Some(width) = args.width {
        if !(width.is_finite() && width > 0.0) {
            bail!("--width must be greater than zero");
        }
        clip.container_width = width;
    }
    if let Some(power) = args.power {
        clip.power = power;
    }
    Ok(clip)
}

fn power_preference(setting: PowerSetting) -> PowerPreference {
    match setting {
        PowerSetting::HighPerformance => PowerPreference::HighPerformance,
        PowerSetting::LowPower => PowerPreference::LowPower,
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Applies a player transition and reports it to the renderer.
fn drive(
    renderer: &mut WindowRenderer,
    action: impl FnOnce(&mut SequencePlayer) -> Option<PlaybackEvent>,
) {
    if let Some(event) = renderer.frame_source_mut().and_then(action) {
        renderer.on_playback_event(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Handled,
    Ignored,
    Exit,
}

fn handle_key(renderer: &mut WindowRenderer, event: &KeyEvent) -> KeyAction {
    if event.state != ElementState::Pressed || event.repeat {
        return KeyAction::Ignored;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => KeyAction::Exit,
        Key::Named(NamedKey::Space) => {
            toggle_playback(renderer);
            KeyAction::Handled
        }
        Key::Character(value) if value.as_str() == " " => {
            toggle_playback(renderer);
            KeyAction::Handled
        }
        Key::Character(value) if value.eq_ignore_ascii_case("r") => {
            drive(renderer, SequencePlayer::reset);
            // Paused on the first frame: draw it once.
            renderer.render();
            if let Some(player) = renderer.frame_source() {
                tracing::debug!(frame = player.index(), frames = player.len(), "sequence reset");
            }
            KeyAction::Handled
        }
        _ => KeyAction::Ignored,
    }
}

fn toggle_playback(renderer: &mut WindowRenderer) {
    drive(renderer, |player| player.toggle(Instant::now()));
    if let Some(player) = renderer.frame_source() {
        tracing::debug!(playing = player.is_playing(), frame = player.index(), "toggled playback");
    }
}

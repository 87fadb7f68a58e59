use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use renderer::{
    display_width, DualChannelAlphaRenderer, GpuBackend, OutputTarget, PlaybackEvent,
    RendererOptions, SoftwareBackend, SoftwareContainer, WgpuBackend,
};
use scheduler::ManualScheduler;

use crate::cli::ExportArgs;

pub fn export(args: &ExportArgs) -> Result<()> {
    let frame = image::open(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?
        .to_rgba8();
    if frame.width() < 2 || frame.height() == 0 {
        bail!(
            "{} is {}x{}; a packed frame needs both halves",
            args.input.display(),
            frame.width(),
            frame.height()
        );
    }
    let width = match args.width {
        Some(width) if width.is_finite() && width > 0.0 => width,
        Some(_) => bail!("--width must be greater than zero"),
        None => f64::from(display_width(frame.width())),
    };
    if !(args.density.is_finite() && args.density > 0.0) {
        bail!("--density must be greater than zero");
    }

    let image = if args.software {
        composite::<SoftwareBackend>(SoftwareContainer::new(), frame, width, args.density)?
    } else {
        composite::<WgpuBackend>(OutputTarget::Offscreen, frame, width, args.density)?
    };
    save(&image, &args.output)?;
    tracing::info!(
        output = %args.output.display(),
        width = image.width(),
        height = image.height(),
        software = args.software,
        "exported composited frame"
    );
    Ok(())
}

/// Lays out and draws one packed frame, returning straight-alpha RGBA.
pub fn composite<B: GpuBackend>(
    target: B::Target,
    frame: RgbaImage,
    width: f64,
    pixel_density: f64,
) -> Result<RgbaImage> {
    let options = RendererOptions {
        pixel_density,
        ..RendererOptions::default()
    };
    let mut renderer: DualChannelAlphaRenderer<B, RgbaImage, ManualScheduler> =
        DualChannelAlphaRenderer::create(target, frame, ManualScheduler::new(), options)
            .context("failed to initialise dual-channel renderer")?;
    renderer.on_container_resized(width, None);
    renderer.on_playback_event(PlaybackEvent::Loaded);

    let stats = renderer.stats();
    if stats.frames_rendered == 0 || stats.frame_errors > 0 {
        bail!(
            "frame did not render ({} errors, {} skipped)",
            stats.frame_errors,
            stats.frames_skipped
        );
    }
    let framebuffer = renderer
        .read_pixels()
        .map_err(|err| anyhow!("failed to read back composited frame: {err}"))?;
    Ok(framebuffer.to_straight_image())
}

fn save(image: &RgbaImage, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))
}

#[cfg(test)]
mod tests {
    use image::Rgba;
    use renderer::pack_rgba;

    use super::*;

    #[test]
    fn software_composite_recovers_picture() {
        let picture = RgbaImage::from_pixel(12, 6, Rgba([200, 100, 50, 255]));
        let image =
            composite::<SoftwareBackend>(SoftwareContainer::new(), pack_rgba(&picture), 12.0, 1.0)
                .unwrap();
        assert_eq!(image.dimensions(), (12, 6));
        let [r, g, b, a] = image.get_pixel(6, 3).0;
        assert!(r.abs_diff(200) <= 2 && g.abs_diff(100) <= 2 && b.abs_diff(50) <= 2);
        assert_eq!(a, 255);
    }

    #[test]
    fn density_scales_output_and_is_capped() {
        let picture = RgbaImage::from_pixel(10, 5, Rgba([0, 0, 0, 255]));
        let packed = pack_rgba(&picture);
        let doubled =
            composite::<SoftwareBackend>(SoftwareContainer::new(), packed.clone(), 10.0, 2.0)
                .unwrap();
        assert_eq!(doubled.dimensions(), (20, 10));
        let capped =
            composite::<SoftwareBackend>(SoftwareContainer::new(), packed, 10.0, 3.0).unwrap();
        assert_eq!(capped.dimensions(), (20, 10));
    }

    #[test]
    fn unavailable_context_is_reported() {
        let picture = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let err = composite::<SoftwareBackend>(
            SoftwareContainer::without_context(),
            pack_rgba(&picture),
            2.0,
            1.0,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("initialise"));
    }
}

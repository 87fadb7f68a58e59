//! Runs the wgpu pipeline against an offscreen target. Skipped when the
//! machine exposes no GPU adapter.

use image::{Rgba, RgbaImage};
use renderer::{
    pack_rgba, DualChannelAlphaRenderer, InitError, OutputTarget, RendererOptions, WgpuBackend,
};
use scheduler::ManualScheduler;

type GpuRenderer = DualChannelAlphaRenderer<WgpuBackend, RgbaImage, ManualScheduler>;

fn try_renderer(frame: RgbaImage) -> Option<GpuRenderer> {
    match GpuRenderer::create(
        OutputTarget::Offscreen,
        frame,
        ManualScheduler::new(),
        RendererOptions::default(),
    ) {
        Ok(renderer) => Some(renderer),
        Err(InitError::ContextUnavailable { reason }) => {
            eprintln!("skipping GPU test: {reason}");
            None
        }
        Err(err) => panic!("unexpected initialisation failure: {err}"),
    }
}

#[test]
fn offscreen_decode_matches_packed_input() {
    let picture = RgbaImage::from_pixel(16, 16, Rgba([240, 120, 30, 255]));
    let Some(mut renderer) = try_renderer(pack_rgba(&picture)) else {
        return;
    };
    renderer.resize(16.0, 16.0);

    let framebuffer = renderer.read_pixels().expect("offscreen readback");
    assert_eq!((framebuffer.width(), framebuffer.height()), (16, 16));
    let [r, g, b, a] = framebuffer.pixel(8, 8).unwrap();
    assert!(r.abs_diff(240) <= 2 && g.abs_diff(120) <= 2 && b.abs_diff(30) <= 2);
    assert_eq!(a, 255);
}

#[test]
fn offscreen_dispose_releases_gpu_objects() {
    let Some(mut renderer) = try_renderer(RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]))) else {
        return;
    };
    renderer.render();
    assert_eq!(renderer.live_objects().total(), 4);
    renderer.dispose();
    assert_eq!(renderer.live_objects().total(), 0);
    assert!(renderer.read_pixels().is_err());
}

#[test]
fn frame_size_changes_and_oversized_frames_do_not_abort() {
    let Some(mut renderer) = try_renderer(pack_rgba(&RgbaImage::from_pixel(
        8,
        8,
        Rgba([10, 20, 30, 255]),
    ))) else {
        return;
    };
    renderer.resize(8.0, 8.0);
    assert_eq!(renderer.stats().frame_errors, 0);

    *renderer.frame_source_mut().unwrap() =
        pack_rgba(&RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255])));
    renderer.render();
    assert_eq!(renderer.stats().frame_errors, 0);

    *renderer.frame_source_mut().unwrap() = RgbaImage::new(65_536, 1);
    renderer.render();
    assert_eq!(renderer.stats().frame_errors, 1);

    *renderer.frame_source_mut().unwrap() =
        pack_rgba(&RgbaImage::from_pixel(8, 8, Rgba([240, 120, 30, 255])));
    renderer.render();
    assert_eq!(renderer.stats().frame_errors, 1);
    let [r, _, _, a] = renderer.read_pixels().expect("offscreen readback").pixel(4, 4).unwrap();
    assert!(r.abs_diff(240) <= 2);
    assert_eq!(a, 255);
}

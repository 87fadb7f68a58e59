use image::{Rgba, RgbaImage};
use renderer::{
    pack_rgba, DualChannelAlphaRenderer, RendererOptions, SoftwareBackend, SoftwareContainer,
};
use scheduler::ManualScheduler;

const TOLERANCE: i16 = 2;

fn render_packed(packed: RgbaImage, width: u32, height: u32) -> renderer::Framebuffer {
    let container = SoftwareContainer::new();
    let mut renderer: DualChannelAlphaRenderer<SoftwareBackend, RgbaImage, ManualScheduler> =
        DualChannelAlphaRenderer::create(
            container.clone(),
            packed,
            ManualScheduler::new(),
            RendererOptions::default(),
        )
        .expect("software renderer initialises");
    renderer.resize(f64::from(width), f64::from(height));
    renderer.read_pixels().expect("software framebuffer")
}

fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(
            (i16::from(*a) - i16::from(*e)).abs() <= TOLERANCE,
            "got {actual:?}, expected {expected:?}"
        );
    }
}

#[test]
fn gray_mask_and_colour_recombine() {
    let alpha = 200;
    let color = [240, 120, 30];
    let mut packed = RgbaImage::new(32, 16);
    for (x, _, pixel) in packed.enumerate_pixels_mut() {
        *pixel = if x < 16 {
            Rgba([alpha, alpha, alpha, 255])
        } else {
            Rgba([color[0], color[1], color[2], 255])
        };
    }

    let framebuffer = render_packed(packed, 16, 16);
    for y in 1..15 {
        for x in 2..14 {
            assert_close(
                framebuffer.unpremultiplied(x, y).unwrap(),
                [color[0], color[1], color[2], alpha],
            );
        }
    }
}

#[test]
fn alpha_comes_from_red_channel_only() {
    let mut packed = RgbaImage::new(16, 8);
    for (x, _, pixel) in packed.enumerate_pixels_mut() {
        *pixel = if x < 8 {
            Rgba([128, 255, 0, 255])
        } else {
            Rgba([10, 200, 90, 255])
        };
    }

    let framebuffer = render_packed(packed, 8, 8);
    assert_close(framebuffer.unpremultiplied(4, 4).unwrap(), [10, 200, 90, 128]);
}

#[test]
fn transparent_mask_leaves_nothing_behind() {
    let picture = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 0]));
    let framebuffer = render_packed(pack_rgba(&picture), 8, 8);
    assert!(framebuffer.pixels().iter().all(|byte| *byte == 0));
}

#[test]
fn image_row_zero_lands_at_the_top() {
    let mut picture = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]));
    for x in 0..8 {
        for y in 0..4 {
            picture.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }

    let framebuffer = render_packed(pack_rgba(&picture), 8, 8);
    assert_close(framebuffer.pixel(4, 1).unwrap(), [255, 0, 0, 255]);
    assert_close(framebuffer.pixel(4, 6).unwrap(), [0, 0, 255, 255]);
}

#[test]
fn straight_export_matches_cpu_unpack() {
    let mut picture = RgbaImage::new(8, 8);
    for (x, y, pixel) in picture.enumerate_pixels_mut() {
        *pixel = Rgba([(x * 30) as u8, (y * 30) as u8, 128, 255]);
    }
    for x in 2..6 {
        for y in 2..6 {
            picture.put_pixel(x, y, Rgba([40, 80, 160, 255]));
        }
    }

    let framebuffer = render_packed(pack_rgba(&picture), 8, 8);
    let exported = framebuffer.to_straight_image();
    assert_eq!(exported.dimensions(), (8, 8));
    // Uniform interior block: bilinear sampling reproduces it exactly.
    assert_close(exported.get_pixel(3, 3).0, [40, 80, 160, 255]);
}

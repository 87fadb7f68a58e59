//! The dual-channel packed frame convention.
//!
//! A packed frame is twice as wide as the picture it carries. The left half
//! holds the alpha mask as gray (only the red channel is read back), the right
//! half holds the colour. Everything here is the CPU mirror of what the
//! fragment shader does, plus the encoder used to produce packed frames.

use image::{Rgba, RgbaImage};

use crate::types::{FrameImage, LogicalSize};

/// Container width assumed when the host cannot report one.
pub const DEFAULT_CONTAINER_WIDTH: f64 = 375.0;

/// Display size before the host has laid anything out.
pub const INITIAL_SIZE: LogicalSize = LogicalSize {
    width: DEFAULT_CONTAINER_WIDTH,
    height: DEFAULT_CONTAINER_WIDTH / 2.0,
};

/// Aspect ratio (height / width) used before frame dimensions are known.
const FALLBACK_HEIGHT_RATIO: f64 = 0.75;

/// Coordinate in the alpha (left) half for an output coordinate.
pub fn alpha_uv(u: f32, v: f32) -> (f32, f32) {
    (u * 0.5, v)
}

/// Coordinate in the colour (right) half for an output coordinate.
pub fn color_uv(u: f32, v: f32) -> (f32, f32) {
    (0.5 + u * 0.5, v)
}

/// Combines one alpha-half texel and one colour-half texel.
pub fn decode_texel(alpha: [u8; 4], color: [u8; 4]) -> [u8; 4] {
    [color[0], color[1], color[2], alpha[0]]
}

/// Width of the picture carried by a packed frame of `packed_width` pixels.
pub fn display_width(packed_width: u32) -> u32 {
    packed_width / 2
}

/// Encodes an RGBA image as a packed frame of twice the width.
pub fn pack_rgba(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let mut packed = RgbaImage::new(width * 2, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        packed.put_pixel(x, y, Rgba([a, a, a, 255]));
        packed.put_pixel(width + x, y, Rgba([r, g, b, 255]));
    }
    packed
}

/// Nearest-texel decode of a packed frame back into straight RGBA.
///
/// Returns `None` for frames too narrow to hold both halves.
pub fn unpack_packed(frame: &FrameImage<'_>) -> Option<RgbaImage> {
    let width = display_width(frame.width);
    if width == 0 || frame.height == 0 || frame.validate().is_err() {
        return None;
    }
    Some(RgbaImage::from_fn(width, frame.height, |x, y| {
        let alpha = frame.texel(x, y);
        let color = frame.texel(width + x, y);
        Rgba(decode_texel(alpha, color))
    }))
}

/// Display size for a packed stream inside a container.
///
/// The width follows the container; the height keeps the aspect ratio of the
/// carried picture (half the packed width). Without frame dimensions the
/// container height is used when known, otherwise a 4:3 box.
pub fn responsive_size(
    container_width: Option<f64>,
    container_height: Option<f64>,
    frame: Option<(u32, u32)>,
) -> LogicalSize {
    let width = container_width
        .filter(|width| width.is_finite() && *width > 0.0)
        .unwrap_or(DEFAULT_CONTAINER_WIDTH);

    let height = match frame {
        Some((packed_width, packed_height)) if packed_width >= 2 && packed_height > 0 => {
            let aspect = f64::from(display_width(packed_width)) / f64::from(packed_height);
            width / aspect
        }
        _ => container_height
            .filter(|height| height.is_finite() && *height > 0.0)
            .unwrap_or(width * FALLBACK_HEIGHT_RATIO),
    };

    LogicalSize::new(width.round(), height.round())
}

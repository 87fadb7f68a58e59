use crate::error::FrameError;

/// Upper bound applied to the device pixel density when sizing the backing
/// store. Very dense displays are rendered at 2x and scaled by the compositor.
pub const MAX_PIXEL_DENSITY: f64 = 2.0;

/// Bytes per texel of every frame and framebuffer handled by the renderer.
pub const BYTES_PER_PIXEL: usize = 4;

/// GPU power hint passed to adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// Requested properties of the rendering context.
///
/// The dual-channel pipeline only ever needs an alpha-capable colour target:
/// no multisampling, no depth buffer, no stencil buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub antialias: bool,
    pub depth: bool,
    pub stencil: bool,
    pub power_preference: PowerPreference,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            antialias: false,
            depth: false,
            stencil: false,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

/// Display size in logical (density independent) units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

impl LogicalSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Backing-store size of the output surface in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDimensions {
    pub width: u32,
    pub height: u32,
}

impl SurfaceDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scales a logical size by the capped pixel density.
    pub fn from_logical(logical: LogicalSize, pixel_density: f64) -> Self {
        let scale = effective_pixel_density(pixel_density);
        Self {
            width: to_pixels(logical.width * scale),
            height: to_pixels(logical.height * scale),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Density used for the backing store: unknown or invalid densities count as
/// 1.0 and anything above [`MAX_PIXEL_DENSITY`] is clamped.
pub fn effective_pixel_density(pixel_density: f64) -> f64 {
    if pixel_density.is_finite() && pixel_density > 0.0 {
        pixel_density.min(MAX_PIXEL_DENSITY)
    } else {
        1.0
    }
}

/// One decoded, tightly packed RGBA8 frame borrowed from a [`FrameSource`].
#[derive(Debug, Clone, Copy)]
pub struct FrameImage<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> FrameImage<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte length of a tightly packed frame; saturates for sizes no
    /// buffer could hold.
    pub fn expected_len(&self) -> usize {
        rgba_len(self.width, self.height).unwrap_or(usize::MAX)
    }

    /// Checks that the pixel buffer matches the advertised dimensions.
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self.expected_len();
        if self.pixels.len() != expected {
            return Err(FrameError::MalformedFrame {
                width: self.width,
                height: self.height,
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Texel at `(x, y)`; coordinates are clamped to the frame edges.
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1)) as usize;
        let y = y.min(self.height.saturating_sub(1)) as usize;
        let offset = (y * self.width as usize + x) * BYTES_PER_PIXEL;
        let mut texel = [0u8; 4];
        texel.copy_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
        texel
    }
}

/// Provider of the currently decoded video frame.
///
/// `None` means no frame is available yet (stream start-up); this is not an
/// error and the renderer simply skips the frame.
pub trait FrameSource {
    fn current_frame(&self) -> Option<FrameImage<'_>>;
}

impl FrameSource for image::RgbaImage {
    fn current_frame(&self) -> Option<FrameImage<'_>> {
        Some(FrameImage::new(self.as_raw(), self.width(), self.height()))
    }
}

impl<T: FrameSource> FrameSource for Option<T> {
    fn current_frame(&self) -> Option<FrameImage<'_>> {
        self.as_ref().and_then(FrameSource::current_frame)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn current_frame(&self) -> Option<FrameImage<'_>> {
        (**self).current_frame()
    }
}

/// CPU copy of an output surface.
///
/// Colour channels are stored premultiplied by alpha, exactly as blended into
/// the framebuffer; [`Framebuffer::unpremultiplied`] recovers straight values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Framebuffer {
    /// Fully transparent framebuffer, or `None` when the byte length does
    /// not fit in `usize`.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let len = rgba_len(width, height)?;
        Some(Self {
            width,
            height,
            pixels: vec![0; len],
        })
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if rgba_len(width, height)? != pixels.len() {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> SurfaceDimensions {
        SurfaceDimensions::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Stored (premultiplied) pixel, or `None` outside the framebuffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let texel = self.pixels.get(offset..offset + BYTES_PER_PIXEL)?;
        let mut pixel = [0u8; 4];
        pixel.copy_from_slice(texel);
        Some(pixel)
    }

    /// Pixel with colour divided back out of the stored alpha.
    pub fn unpremultiplied(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixel(x, y).map(unpremultiply)
    }

    /// Straight-alpha image suitable for writing to disk.
    pub fn to_straight_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            image::Rgba(self.unpremultiplied(x, y).unwrap_or_default())
        })
    }
}

fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let scale = |c: u8| ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8;
    [scale(r), scale(g), scale(b), a]
}

fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Options fixed at renderer construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererOptions {
    pub attributes: ContextAttributes,
    /// Device pixel density reported by the host at start-up.
    pub pixel_density: f64,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            attributes: ContextAttributes::default(),
            pixel_density: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_capped_at_two() {
        let logical = LogicalSize::new(375.0, 200.0);
        assert_eq!(
            SurfaceDimensions::from_logical(logical, 2.0),
            SurfaceDimensions::new(750, 400)
        );
        assert_eq!(
            SurfaceDimensions::from_logical(logical, 3.0),
            SurfaceDimensions::new(750, 400)
        );
    }

    #[test]
    fn invalid_density_falls_back_to_one() {
        let logical = LogicalSize::new(320.0, 180.0);
        for density in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                SurfaceDimensions::from_logical(logical, density),
                SurfaceDimensions::new(320, 180)
            );
        }
    }

    #[test]
    fn fractional_density_rounds_to_whole_pixels() {
        let dims = SurfaceDimensions::from_logical(LogicalSize::new(375.0, 187.5), 1.5);
        assert_eq!(dims, SurfaceDimensions::new(563, 281));
    }

    #[test]
    fn frame_validation_reports_mismatched_length() {
        let pixels = vec![0u8; 15];
        let frame = FrameImage::new(&pixels, 2, 2);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::MalformedFrame {
                expected: 16,
                actual: 15,
                ..
            })
        ));
    }

    #[test]
    fn unpremultiply_restores_straight_colour() {
        let framebuffer = Framebuffer::from_pixels(1, 1, vec![100, 50, 0, 200]).unwrap();
        assert_eq!(framebuffer.unpremultiplied(0, 0), Some([128, 64, 0, 200]));
    }

    #[test]
    fn pixel_outside_framebuffer_is_none() {
        let framebuffer = Framebuffer::new(2, 1).unwrap();
        assert_eq!(framebuffer.pixel(1, 0), Some([0, 0, 0, 0]));
        assert_eq!(framebuffer.pixel(2, 0), None);
        assert_eq!(framebuffer.pixel(0, 1), None);
        assert_eq!(framebuffer.unpremultiplied(5, 5), None);
    }

    #[test]
    fn framebuffer_sizes_beyond_address_space_are_refused() {
        assert!(Framebuffer::new(u32::MAX, u32::MAX).is_none());
        assert!(Framebuffer::from_pixels(u32::MAX, u32::MAX, Vec::new()).is_none());
        let frame = FrameImage::new(&[], u32::MAX, u32::MAX);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn optional_source_without_frame_is_not_ready() {
        let source: Option<image::RgbaImage> = None;
        assert!(source.current_frame().is_none());
    }
}

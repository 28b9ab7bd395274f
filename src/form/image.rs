//! Scaling of uploaded images to a declared bounding box.

use std::fmt;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};

/// A `WxH` bounding box from a field tag such as `avatar#file#250x250`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse `WxH`; zero or malformed dimensions give `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
        let height = h.trim().parse::<u32>().ok().filter(|v| *v > 0)?;
        Some(Self { width, height })
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Decode `bytes`, shrink the image to fit inside `max` keeping the aspect
/// ratio, and return it as PNG.
pub fn resize_image(bytes: &[u8], max: ImageSize) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (w, h) = img.dimensions();

    let img = if w > max.width || h > max.height {
        img.resize(max.width, max.height, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(ImageSize::parse("250x250"), Some(ImageSize::new(250, 250)));
        assert_eq!(ImageSize::parse("64X32"), Some(ImageSize::new(64, 32)));
        assert_eq!(ImageSize::parse("64"), None);
        assert_eq!(ImageSize::parse("0x10"), None);
        assert_eq!(ImageSize::parse(""), None);
        assert_eq!(ImageSize::new(16, 9).to_string(), "16x9");
    }

    #[test]
    fn test_shrinks_keeping_aspect() {
        let out = resize_image(&test_png(200, 100), ImageSize::new(50, 50)).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (50, 25));
    }

    #[test]
    fn test_small_image_is_kept() {
        let out = resize_image(&test_png(10, 12), ImageSize::new(50, 50)).unwrap();
        let img = image::load_from_memory_with_format(&out, ImageFormat::Png).unwrap();
        assert_eq!(img.dimensions(), (10, 12));
    }

    #[test]
    fn test_not_an_image() {
        assert!(resize_image(b"definitely not a picture", ImageSize::new(16, 16)).is_err());
    }
}

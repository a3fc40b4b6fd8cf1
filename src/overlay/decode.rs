//! Image decoding and pixel preparation

use std::io;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, Rgb, RgbImage, Rgba};
use thiserror::Error;

/// Why an image could not be loaded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("file not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("corrupt image data: {0}")]
    Corrupt(String),

    #[error("image exceeds decoder limits")]
    TooLarge,

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl DecodeError {
    /// Short classification for logs
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::Unsupported(_) => "unsupported-format",
            Self::Corrupt(_) => "corrupt",
            Self::TooLarge => "too-large",
            Self::Io(_) => "io",
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(e),
        }
    }
}

impl From<ImageError> for DecodeError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(e) => e.into(),
            ImageError::Unsupported(e) => Self::Unsupported(e.to_string()),
            ImageError::Limits(_) => Self::TooLarge,
            ImageError::Decoding(e) => Self::Corrupt(e.to_string()),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

/// Source of decoded images
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<DynamicImage, DecodeError>;
}

/// Decodes files with the `image` crate, sniffing the format from content
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl ImageLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(image)
    }
}

/// Scale to exactly `width`x`height` and flatten any alpha onto black
pub fn prepare(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    let rgba = if (image.width(), image.height()) == (width, height) {
        image.to_rgba8()
    } else {
        image.resize_exact(width, height, filter).to_rgba8()
    };

    RgbImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        Rgb([over_black(r, a), over_black(g, a), over_black(b, a)])
    })
}

fn over_black(channel: u8, alpha: u8) -> u8 {
    ((u16::from(channel) * u16::from(alpha) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        RgbImage::from_pixel(4, 2, Rgb([10, 20, 30])).save(&path).unwrap();

        let image = FileLoader.load(&path).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
    }

    #[test]
    fn test_format_sniffed_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("pic.png");
        RgbImage::new(3, 3).save(&png).unwrap();
        let renamed = dir.path().join("pic.dat");
        std::fs::rename(&png, &renamed).unwrap();

        assert!(FileLoader.load(&renamed).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileLoader.load(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, DecodeError::NotFound));
        assert_eq!(err.class(), "not-found");
    }

    #[test]
    fn test_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"just some text, no pixels here").unwrap();

        let err = FileLoader.load(&path).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)), "got {:?}", err);
    }

    #[test]
    fn test_truncated_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        let mut bytes = Vec::new();
        RgbImage::new(16, 16)
            .write_to(&mut io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = FileLoader.load(&path).unwrap_err();
        assert!(
            matches!(err, DecodeError::Corrupt(_) | DecodeError::Io(_)),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_prepare_resizes() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 0, 0])));
        let pixels = prepare(&image, 80, 40, FilterType::Nearest);
        assert_eq!(pixels.dimensions(), (80, 40));
        assert_eq!(*pixels.get_pixel(40, 20), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_prepare_composites_alpha_over_black() {
        let mut rgba = RgbaImage::new(3, 1);
        rgba.put_pixel(0, 0, Rgba([200, 100, 50, 255]));
        rgba.put_pixel(1, 0, Rgba([200, 100, 50, 0]));
        rgba.put_pixel(2, 0, Rgba([200, 100, 50, 128]));

        let pixels = prepare(&DynamicImage::ImageRgba8(rgba), 3, 1, FilterType::Nearest);
        assert_eq!(*pixels.get_pixel(0, 0), Rgb([200, 100, 50]));
        assert_eq!(*pixels.get_pixel(1, 0), Rgb([0, 0, 0]));
        assert_eq!(*pixels.get_pixel(2, 0), Rgb([100, 50, 25]));
    }
}

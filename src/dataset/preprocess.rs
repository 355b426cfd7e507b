//! Image preprocessing
//!
//! Resize, CHW conversion and ImageNet normalization. Every split goes
//! through the same transform.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};

use crate::utils::error::{Error, Result};

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// File extensions recognised as images (lowercase)
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// Check whether a path has one of [`IMAGE_EXTENSIONS`]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Deterministic resize + normalize transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    pub image_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(crate::IMAGE_SIZE)
    }
}

impl Preprocessor {
    /// ImageNet normalization at the given square size
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Number of floats produced per image (`3 * size * size`)
    pub fn output_len(&self) -> usize {
        3 * self.image_size * self.image_size
    }

    /// Transform a decoded image into a normalized CHW vector
    pub fn process(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let rgb = image
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8();

        let plane = size * size;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                data[c * plane + offset] = (value - self.mean[c]) / self.std[c];
            }
        }

        data
    }

    /// Decode the file at `path` and transform it
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let image = ImageReader::open(path)
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?;

        Ok(self.process(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let buffer = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        });
        DynamicImage::ImageRgb8(buffer)
    }

    #[test]
    fn test_output_shape() {
        let pre = Preprocessor::new(16);
        let data = pre.process(&gradient(40, 30));
        assert_eq!(data.len(), pre.output_len());
        assert_eq!(data.len(), 3 * 16 * 16);
    }

    #[test]
    fn test_process_is_deterministic() {
        let pre = Preprocessor::new(24);
        let image = gradient(64, 48);
        assert_eq!(pre.process(&image), pre.process(&image));
    }

    #[test]
    fn test_normalization_values() {
        let pre = Preprocessor::new(4);
        let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([255, 255, 255])));
        let data = pre.process(&white);

        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            let value = data[c * 16];
            assert!((value - expected).abs() < 1e-5, "channel {}: {}", c, value);
        }
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_file(Path::new("ecg/a.PNG")));
        assert!(is_image_file(Path::new("ecg/b.tiff")));
        assert!(!is_image_file(Path::new("ecg/notes.txt")));
        assert!(!is_image_file(Path::new("ecg/no_extension")));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Preprocessor::new(8)
            .load(Path::new("/nonexistent/ecg.png"))
            .unwrap_err();
        assert!(matches!(err, Error::ImageLoad(_, _)));
    }
}

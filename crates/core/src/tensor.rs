//! The engine's native in-memory image representation.
//!
//! An [`ImageTensor`] is one image stored as `f32` samples in row-major
//! height x width x channels order, nominally normalized to `0.0..=1.0`.
//! Output nodes receive a batch of them.

use image::DynamicImage;

use crate::error::CoreError;

/// Channel counts the encoder understands: luma, RGB, RGBA.
pub const SUPPORTED_CHANNELS: &[usize] = &[1, 3, 4];

/// A batch of images as handed to an output node.
pub type ImageBatch = Vec<ImageTensor>;

/// One image as a dense array of normalized samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    height: u32,
    width: u32,
    channels: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build a tensor, validating that the shape matches the sample count.
    ///
    /// Sample values are not range-checked; out-of-range values are
    /// clamped when encoding.
    pub fn new(height: u32, width: u32, channels: usize, data: Vec<f32>) -> Result<Self, CoreError> {
        if height == 0 || width == 0 {
            return Err(CoreError::Validation(format!(
                "Image dimensions must be non-zero, got {height}x{width}"
            )));
        }
        if !SUPPORTED_CHANNELS.contains(&channels) {
            return Err(CoreError::Validation(format!(
                "Unsupported channel count {channels}. Must be one of: {SUPPORTED_CHANNELS:?}"
            )));
        }
        let expected = height as usize * width as usize * channels;
        if data.len() != expected {
            return Err(CoreError::Validation(format!(
                "Expected {expected} samples for {height}x{width}x{channels}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// A tensor with every sample set to `value`.
    pub fn filled(height: u32, width: u32, channels: usize, value: f32) -> Result<Self, CoreError> {
        let len = height as usize * width as usize * channels;
        Self::new(height, width, channels, vec![value; len])
    }

    /// Convert a decoded image into normalized samples.
    ///
    /// Grayscale images become 1 channel, images with alpha become RGBA,
    /// everything else RGB. Higher bit depths are reduced to 8 bits first.
    pub fn from_image(img: &DynamicImage) -> Result<Self, CoreError> {
        let color = img.color();
        let (channels, bytes) = if color.has_alpha() {
            (4, img.to_rgba8().into_raw())
        } else if color.has_color() {
            (3, img.to_rgb8().into_raw())
        } else {
            (1, img.to_luma8().into_raw())
        };
        let data = bytes.into_iter().map(|b| f32::from(b) / 255.0).collect();
        Self::new(img.height(), img.width(), channels, data)
    }

    /// Decode PNG bytes into a tensor.
    pub fn decode_png(bytes: &[u8]) -> Result<Self, CoreError> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?;
        Self::from_image(&img)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_matching_shape() {
        let t = ImageTensor::new(2, 3, 3, vec![0.5; 18]).unwrap();
        assert_eq!((t.height(), t.width(), t.channels()), (2, 3, 3));
        assert_eq!(t.data().len(), 18);
    }

    #[test]
    fn new_rejects_sample_count_mismatch() {
        assert!(ImageTensor::new(2, 2, 3, vec![0.0; 11]).is_err());
    }

    #[test]
    fn new_rejects_zero_dimension() {
        assert!(ImageTensor::new(0, 4, 3, vec![]).is_err());
        assert!(ImageTensor::new(4, 0, 3, vec![]).is_err());
    }

    #[test]
    fn new_rejects_unsupported_channels() {
        assert!(ImageTensor::new(1, 1, 2, vec![0.0; 2]).is_err());
        assert!(ImageTensor::new(1, 1, 5, vec![0.0; 5]).is_err());
    }

    #[test]
    fn from_image_normalizes_rgb() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2,
            1,
            image::Rgb([255, 0, 51]),
        ));
        let t = ImageTensor::from_image(&img).unwrap();
        assert_eq!(t.channels(), 3);
        assert_eq!(t.data(), &[1.0, 0.0, 0.2, 1.0, 0.0, 0.2]);
    }

    #[test]
    fn from_image_keeps_alpha_and_luma() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::new(1, 1));
        assert_eq!(ImageTensor::from_image(&rgba).unwrap().channels(), 4);

        let luma = DynamicImage::ImageLuma8(image::GrayImage::new(1, 1));
        assert_eq!(ImageTensor::from_image(&luma).unwrap().channels(), 1);
    }

    #[test]
    fn decode_png_rejects_garbage() {
        assert!(ImageTensor::decode_png(b"not a png").is_err());
    }
}

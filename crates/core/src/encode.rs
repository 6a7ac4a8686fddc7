//! Artifact encoder: normalized image tensors to PNG bytes.
//!
//! Each sample is scaled by 255, clamped to `0..=255` and truncated to
//! `u8`. Out-of-range values saturate instead of wrapping; NaN becomes 0.
//! Encoding is deterministic: identical tensors give identical bytes.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::CoreError;
use crate::tensor::ImageTensor;

/// MIME type of every encoded artifact.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Denormalize one sample to an 8-bit channel value.
pub fn denormalize(sample: f32) -> u8 {
    // NaN survives `clamp`; the `as` cast maps it to 0.
    (sample * 255.0).clamp(0.0, 255.0) as u8
}

/// Encode one image as PNG.
pub fn encode_png(tensor: &ImageTensor) -> Result<Vec<u8>, CoreError> {
    let pixels: Vec<u8> = tensor.data().iter().copied().map(denormalize).collect();

    let color = match tensor.channels() {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        other => {
            return Err(CoreError::Validation(format!(
                "Cannot encode image with {other} channels"
            )))
        }
    };

    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(&pixels, tensor.width(), tensor.height(), color)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn denormalize_maps_range_endpoints() {
        assert_eq!(denormalize(0.0), 0);
        assert_eq!(denormalize(1.0), 255);
        // Truncation, not rounding.
        assert_eq!(denormalize(0.999), 254);
    }

    #[test]
    fn denormalize_saturates_out_of_range() {
        assert_eq!(denormalize(-0.5), 0);
        assert_eq!(denormalize(-1000.0), 0);
        assert_eq!(denormalize(1.5), 255);
        assert_eq!(denormalize(f32::INFINITY), 255);
        assert_eq!(denormalize(f32::NEG_INFINITY), 0);
        assert_eq!(denormalize(f32::NAN), 0);
    }

    #[test]
    fn encodes_valid_png() {
        let t = ImageTensor::filled(4, 5, 3, 0.5).unwrap();
        let bytes = encode_png(&t).unwrap();
        assert!(bytes.starts_with(PNG_SIGNATURE));

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 4));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0).0, [127, 127, 127]);
    }

    #[test]
    fn out_of_range_values_clamp_in_output() {
        let t = ImageTensor::new(1, 2, 3, vec![-3.0, 0.0, 7.0, 2.0, -0.1, 1.0]).unwrap();
        let bytes = encode_png(&t).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [255, 0, 255]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let data: Vec<f32> = (0..48).map(|i| i as f32 / 47.0).collect();
        let t = ImageTensor::new(4, 4, 3, data).unwrap();
        assert_eq!(encode_png(&t).unwrap(), encode_png(&t).unwrap());
    }

    #[test]
    fn encodes_luma_and_rgba() {
        let luma = ImageTensor::filled(2, 2, 1, 1.0).unwrap();
        let decoded = image::load_from_memory(&encode_png(&luma).unwrap()).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);

        let rgba = ImageTensor::filled(2, 2, 4, 1.0).unwrap();
        let decoded = image::load_from_memory(&encode_png(&rgba).unwrap()).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn decode_then_encode_preserves_pixels() {
        let t = ImageTensor::new(1, 1, 3, vec![1.0, 0.0, 0.2]).unwrap();
        let bytes = encode_png(&t).unwrap();
        let back = ImageTensor::decode_png(&bytes).unwrap();
        assert_eq!(encode_png(&back).unwrap(), bytes);
    }
}

/// Errors raised by domain types and the image codec.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images do not have matching sizes.
    #[error("Image size mismatch: {0}x{1} vs {2}x{3}")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when a pixel index is outside of the image.
    #[error("Pixel ({0}, {1}) is out of bounds")]
    PixelIndexOutOfBounds(usize, usize),

    /// Error when a value cannot be cast to the pixel type.
    #[error("Failed to cast pixel value")]
    CastError,
}

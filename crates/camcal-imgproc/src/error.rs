use camcal_image::ImageError;

/// An error type for the image processing operations.
#[derive(thiserror::Error, Debug)]
pub enum ImgprocError {
    /// Error coming from the image container.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The chessboard pattern is too small to be located.
    #[error("Chessboard pattern needs at least 2x2 inner corners, got {0}x{1}")]
    InvalidPatternSize(usize, usize),

    /// A correction map does not fit the image it is applied to.
    #[error("Correction map of size {0} cannot be applied to an image of size {1}")]
    MapSizeMismatch(camcal_image::ImageSize, camcal_image::ImageSize),
}

#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// image container and size types.
pub mod image;

/// Error types for the image module.
pub mod error;

/// size checks and intensity conversions.
pub mod ops;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};

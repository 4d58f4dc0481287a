#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// camera model types, lens distortion and image undistortion.
pub mod calibration;

/// chessboard corner detection and subpixel refinement.
pub mod chessboard;

/// color transformations module.
pub mod color;

/// utilities to draw on images.
pub mod draw;

/// error types for the image processing operations.
pub mod error;

/// image smoothing and derivatives.
pub mod filter;

/// utilities for interpolation.
pub mod interpolation;

/// module containing parallization utilities.
pub mod parallel;

pub use crate::error::ImgprocError;

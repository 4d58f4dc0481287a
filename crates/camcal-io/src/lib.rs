#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for frame sources.
pub mod error;

/// Image folder replay source.
pub mod folder;

/// Frame rate counter for video processing.
pub mod fps_counter;

/// Pixel format conversions of raw camera buffers.
pub mod pixels;

/// The frame source abstraction.
pub mod source;

/// Synthetic camera looking at a chessboard.
pub mod synthetic;

/// Video4Linux2 (V4L2) camera capture (feature-gated, Linux only).
#[cfg(all(feature = "v4l", target_os = "linux"))]
pub mod v4l;

pub use crate::error::FrameSourceError;
pub use crate::folder::ImageFolderSource;
pub use crate::source::FrameSource;
pub use crate::synthetic::SyntheticChessboardCamera;

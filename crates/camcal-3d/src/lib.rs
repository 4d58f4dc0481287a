#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Intrinsic calibration from planar targets.
pub mod calibration;

/// Homography estimation between planes.
pub mod homography;

/// Linear algebra utilities.
pub mod linalg;

/// Levenberg-Marquardt least squares.
pub mod optim;

/// Perspective-n-Point (PnP) solvers.
pub mod pnp;

/// Projection of 3d points into the image.
pub mod projection;

/// Axis-angle and rotation matrix conversions.
pub mod rotation;

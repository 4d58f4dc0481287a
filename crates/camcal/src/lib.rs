#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use camcal_image as image;

#[doc(inline)]
pub use camcal_imgproc as imgproc;

#[doc(inline)]
pub use camcal_3d as k3d;

#[doc(inline)]
pub use camcal_io as io;

#[doc(inline)]
pub use camcal_workflow as workflow;

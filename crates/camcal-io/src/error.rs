/// An error type for the frame sources.
#[derive(thiserror::Error, Debug)]
pub enum FrameSourceError {
    /// The device could not be opened.
    #[error("Device {0} is unavailable")]
    DeviceUnavailable(String),

    /// A frame was requested from a closed source.
    #[error("Frame source is not opened")]
    NotOpened,

    /// The replay folder holds no readable image.
    #[error("No image found in {0}")]
    EmptyFolder(std::path::PathBuf),

    /// The device delivers a pixel format that cannot be converted.
    #[error("Unsupported pixel format {0}")]
    UnsupportedFormat(String),

    /// Error to read from the file system or the device.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// Error to create the image.
    #[error("Failed to create image. {0}")]
    ImageCreation(#[from] camcal_image::ImageError),

    /// Error to decode the image.
    #[error("Failed to decode the image. {0}")]
    ImageDecode(#[from] image::ImageError),
}

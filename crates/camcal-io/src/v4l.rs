use std::path::PathBuf;

use camcal_image::{Image, ImageSize};
use v4l::{
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    video::{capture::Parameters, Capture},
    Device, FourCC,
};

use crate::{
    error::FrameSourceError, folder::decode_image_rgb8, pixels::yuyv_to_rgb8,
    source::FrameSource,
};

/// A video device found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// The device index, `N` in `/dev/videoN`.
    pub index: usize,
    /// The device node.
    pub path: PathBuf,
    /// The driver reported name, if any.
    pub name: Option<String>,
}

/// List the V4L2 devices of the system, ordered by index.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let mut devices = v4l::context::enum_devices()
        .into_iter()
        .map(|node| DeviceInfo {
            index: node.index(),
            path: node.path().to_path_buf(),
            name: node.name(),
        })
        .collect::<Vec<_>>();
    devices.sort_by_key(|d| d.index);
    devices
}

/// Configuration for V4L video capture.
#[derive(Debug, Clone)]
pub struct V4lCameraConfig {
    /// The camera device path
    pub device_path: String,
    /// The desired image size
    pub size: ImageSize,
    /// The desired frames per second
    pub fps: u32,
}

impl Default for V4lCameraConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            size: ImageSize {
                width: 640,
                height: 480,
            },
            fps: 30,
        }
    }
}

struct OpenedDevice {
    // keeps the device handle alive for the stream
    _device: Device,
    stream: Stream<'static>,
    size: ImageSize,
    fourcc: FourCC,
}

/// V4L2 camera delivering YUYV or MJPG frames, converted to RGB.
pub struct V4lCamera {
    config: V4lCameraConfig,
    opened: Option<OpenedDevice>,
}

impl V4lCamera {
    /// Create a camera for the configured device. The device is opened on `open`.
    pub fn new(config: V4lCameraConfig) -> Self {
        Self {
            config,
            opened: None,
        }
    }

    fn open_device(&self) -> Result<OpenedDevice, FrameSourceError> {
        let device = Device::with_path(&self.config.device_path)?;

        let mut format = device.format()?;
        format.width = self.config.size.width as u32;
        format.height = self.config.size.height as u32;
        format.fourcc = FourCC::new(b"YUYV");
        let actual = device.set_format(&format)?;

        match actual.fourcc.str() {
            Ok("YUYV") | Ok("MJPG") => {}
            _ => {
                return Err(FrameSourceError::UnsupportedFormat(
                    actual.fourcc.to_string(),
                ))
            }
        }
        if actual.width != format.width || actual.height != format.height {
            log::warn!(
                "requested {}x{}, the device delivers {}x{}",
                format.width,
                format.height,
                actual.width,
                actual.height
            );
        }

        device.set_params(&Parameters::with_fps(self.config.fps))?;
        let stream = Stream::with_buffers(&device, Type::VideoCapture, 4)?;

        Ok(OpenedDevice {
            _device: device,
            stream,
            size: ImageSize {
                width: actual.width as usize,
                height: actual.height as usize,
            },
            fourcc: actual.fourcc,
        })
    }
}

impl FrameSource for V4lCamera {
    fn name(&self) -> String {
        self.config.device_path.clone()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        if self.opened.is_some() {
            return Ok(());
        }
        let opened = self.open_device().map_err(|err| {
            log::warn!("cannot open {}: {err}", self.config.device_path);
            FrameSourceError::DeviceUnavailable(self.config.device_path.clone())
        })?;
        log::info!(
            "opened {} at {} ({})",
            self.config.device_path,
            opened.size,
            opened.fourcc
        );
        self.opened = Some(opened);
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened.is_some()
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        let opened = self.opened.as_mut().ok_or(FrameSourceError::NotOpened)?;
        let (buf, meta) = opened.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());

        let frame = if opened.fourcc == FourCC::new(b"MJPG") {
            decode_image_rgb8(&buf[..used])?
        } else {
            yuyv_to_rgb8(&buf[..used], opened.size)?
        };
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.opened.take().is_some() {
            log::debug!("released {}", self.config.device_path);
        }
    }
}

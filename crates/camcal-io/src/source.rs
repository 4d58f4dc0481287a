use camcal_image::Image;

use crate::error::FrameSourceError;

/// A device producing RGB frames on demand.
///
/// Sources are opened and released explicitly and are moved into the acquisition thread, so
/// they must be `Send`.
pub trait FrameSource: Send {
    /// A human readable name of the device.
    fn name(&self) -> String;

    /// Open the device.
    fn open(&mut self) -> Result<(), FrameSourceError>;

    /// Whether the device is opened.
    fn is_opened(&self) -> bool;

    /// Grab the next frame.
    ///
    /// Returns `Ok(None)` when no frame is ready yet.
    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError>;

    /// Release the device. Releasing a closed source does nothing.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        (**self).open()
    }

    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        (**self).grab()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

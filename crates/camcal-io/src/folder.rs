use std::path::{Path, PathBuf};

use camcal_image::{Image, ImageSize};

use crate::{error::FrameSourceError, source::FrameSource};

const EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Replays the still images of a folder as a video stream, in file name order.
pub struct ImageFolderSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    opened: bool,
}

impl ImageFolderSource {
    /// Create a source over the images in `dir`. The folder is listed on `open`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            next: 0,
            looping: true,
            opened: false,
        }
    }

    /// Restart from the first image after the last one, or stop producing frames.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// The images found by the last `open`.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn list_images(&self) -> Result<Vec<PathBuf>, FrameSourceError> {
        let mut files = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }
}

/// Read an image file as an RGB8 image.
pub fn read_image_rgb8(path: impl AsRef<Path>) -> Result<Image<u8, 3>, FrameSourceError> {
    into_rgb8(image::open(path.as_ref())?)
}

/// Decode an encoded image held in memory, e.g. a MJPG frame, as an RGB8 image.
pub fn decode_image_rgb8(bytes: &[u8]) -> Result<Image<u8, 3>, FrameSourceError> {
    into_rgb8(image::load_from_memory(bytes)?)
}

/// Write an RGB8 image, encoded after the extension of `path`.
pub fn write_image_rgb8(
    path: impl AsRef<Path>,
    image: &Image<u8, 3>,
) -> Result<(), FrameSourceError> {
    image::save_buffer(
        path.as_ref(),
        image.as_slice(),
        image.width() as u32,
        image.height() as u32,
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(())
}

fn into_rgb8(img: image::DynamicImage) -> Result<Image<u8, 3>, FrameSourceError> {
    let img = img.to_rgb8();
    let (width, height) = img.dimensions();
    let size = ImageSize {
        width: width as usize,
        height: height as usize,
    };
    Ok(Image::new(size, img.into_raw())?)
}

impl FrameSource for ImageFolderSource {
    fn name(&self) -> String {
        format!("image folder {}", self.dir.display())
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        if !self.dir.is_dir() {
            return Err(FrameSourceError::DeviceUnavailable(
                self.dir.display().to_string(),
            ));
        }
        let files = self.list_images()?;
        if files.is_empty() {
            return Err(FrameSourceError::EmptyFolder(self.dir.clone()));
        }
        log::debug!("replaying {} images from {}", files.len(), self.dir.display());
        self.files = files;
        self.next = 0;
        self.opened = true;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        if !self.opened {
            return Err(FrameSourceError::NotOpened);
        }
        if self.next >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;
        read_image_rgb8(path).map(Some)
    }

    fn release(&mut self) {
        self.opened = false;
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, value: u8) -> Result<(), FrameSourceError> {
        let frame = Image::from_size_val(ImageSize::from([4, 3]), value)?;
        write_image_rgb8(dir.join(name), &frame)
    }

    #[test]
    fn test_replay_in_name_order() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        write_png(tmp_dir.path(), "b.png", 20)?;
        write_png(tmp_dir.path(), "a.png", 10)?;
        std::fs::write(tmp_dir.path().join("notes.txt"), "not an image")?;

        let mut source = ImageFolderSource::new(tmp_dir.path());
        source.open()?;
        assert_eq!(source.files().len(), 2);

        let values = (0..3)
            .map(|_| -> Result<u8, FrameSourceError> {
                let frame = source.grab()?.ok_or(FrameSourceError::NotOpened)?;
                assert_eq!(frame.size(), ImageSize::from([4, 3]));
                Ok(frame.as_slice()[0])
            })
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(values, vec![10, 20, 10]);
        Ok(())
    }

    #[test]
    fn test_no_looping() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        write_png(tmp_dir.path(), "only.png", 5)?;

        let mut source = ImageFolderSource::new(tmp_dir.path()).with_looping(false);
        source.open()?;
        assert!(source.grab()?.is_some());
        assert!(source.grab()?.is_none());
        Ok(())
    }

    #[test]
    fn test_open_errors() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let mut empty = ImageFolderSource::new(tmp_dir.path());
        assert!(matches!(empty.open(), Err(FrameSourceError::EmptyFolder(_))));

        let mut missing = ImageFolderSource::new(tmp_dir.path().join("missing"));
        assert!(matches!(
            missing.open(),
            Err(FrameSourceError::DeviceUnavailable(_))
        ));
        assert!(!missing.is_opened());
        Ok(())
    }
}

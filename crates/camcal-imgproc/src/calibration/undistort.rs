use rayon::prelude::*;

use camcal_image::{Image, ImageSize};

use super::{
    distortion::{distort_point_polynomial, PolynomialDistortion},
    CameraIntrinsic,
};
use crate::{interpolation::bilinear_u8, parallel, ImgprocError};

/// Precomputed correction map that removes lens distortion from images of a fixed size.
///
/// For every pixel of the corrected image the map stores where the distorted input has to be
/// sampled. The corrected image keeps the camera matrix of the input.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    size: ImageSize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortMap {
    /// Generate the correction map for a polynomial distortion model.
    ///
    /// # Arguments
    ///
    /// * `intrinsic` - The intrinsic parameters of the camera
    /// * `distortion` - The distortion parameters of the camera
    /// * `size` - The size of the images the map applies to
    pub fn new(
        intrinsic: &CameraIntrinsic,
        distortion: &PolynomialDistortion,
        size: ImageSize,
    ) -> Self {
        let (rows, cols) = (size.height, size.width);
        let mut map_x = vec![0.0f32; rows * cols];
        let mut map_y = vec![0.0f32; rows * cols];

        if cols > 0 {
            map_x
                .par_chunks_exact_mut(cols)
                .zip(map_y.par_chunks_exact_mut(cols))
                .enumerate()
                .for_each(|(y, (xarr, yarr))| {
                    for (x, (mx, my)) in xarr.iter_mut().zip(yarr.iter_mut()).enumerate() {
                        let (xsrc, ysrc) =
                            distort_point_polynomial(x as f64, y as f64, intrinsic, distortion);
                        *mx = xsrc as f32;
                        *my = ysrc as f32;
                    }
                });
        }

        Self { size, map_x, map_y }
    }

    /// The image size the map was generated for.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The sampling coordinates of the corrected pixel `(x, y)`.
    pub fn source_of(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let idx = y * self.size.width + x;
        Some((self.map_x[idx], self.map_y[idx]))
    }

    /// Remap an image through the correction map with bilinear interpolation.
    ///
    /// Pixels that sample outside the input are black.
    pub fn apply<const C: usize>(&self, src: &Image<u8, C>) -> Result<Image<u8, C>, ImgprocError> {
        if src.size() != self.size {
            return Err(ImgprocError::MapSizeMismatch(self.size, src.size()));
        }

        let mut dst = Image::<u8, C>::from_size_val(self.size, 0)?;
        if self.size.width == 0 {
            return Ok(dst);
        }

        let cols = self.size.width;
        parallel::par_rows_mut(&mut dst, |y, row| {
            let map_x = &self.map_x[y * cols..(y + 1) * cols];
            let map_y = &self.map_y[y * cols..(y + 1) * cols];
            for ((dst_pixel, x), y) in row.chunks_exact_mut(C).zip(map_x).zip(map_y) {
                if let Some(pixel) = bilinear_u8(src, *x, *y) {
                    dst_pixel.copy_from_slice(&pixel);
                }
            }
        });

        Ok(dst)
    }
}

/// Remove the lens distortion from an image.
///
/// Builds the correction map on every call; keep an [`UndistortMap`] around to correct a stream
/// of frames from the same camera.
pub fn undistort_image<const C: usize>(
    src: &Image<u8, C>,
    intrinsic: &CameraIntrinsic,
    distortion: &PolynomialDistortion,
) -> Result<Image<u8, C>, ImgprocError> {
    UndistortMap::new(intrinsic, distortion, src.size()).apply(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsic() -> CameraIntrinsic {
        CameraIntrinsic {
            fx: 80.0,
            fy: 80.0,
            cx: 15.5,
            cy: 11.5,
            skew: 0.0,
        }
    }

    #[test]
    fn zero_distortion_is_identity() -> Result<(), ImgprocError> {
        let src = Image::<u8, 3>::from_fn([32, 24].into(), |x, y| {
            [(x * 7) as u8, (y * 9) as u8, ((x + y) * 3) as u8]
        });
        let dst = undistort_image(&src, &intrinsic(), &PolynomialDistortion::default())?;
        assert_eq!(dst, src);
        Ok(())
    }

    #[test]
    fn principal_point_is_fixed() {
        let distortion = PolynomialDistortion {
            k1: -0.3,
            k2: 0.1,
            ..Default::default()
        };
        let intrinsic = CameraIntrinsic {
            cx: 16.0,
            cy: 12.0,
            ..intrinsic()
        };
        let map = UndistortMap::new(&intrinsic, &distortion, [32, 24].into());
        assert_eq!(map.source_of(16, 12), Some((16.0, 12.0)));
        assert_eq!(map.source_of(32, 0), None);

        // barrel distortion pulls the corners inwards
        let (x, y) = map.source_of(0, 0).unwrap_or_default();
        assert!(x > 0.0 && y > 0.0);
    }

    #[test]
    fn outside_samples_are_black() -> Result<(), ImgprocError> {
        let src = Image::<u8, 1>::from_size_val([32, 24].into(), 200)?;
        let distortion = PolynomialDistortion {
            k1: 0.8,
            ..Default::default()
        };
        let dst = undistort_image(&src, &intrinsic(), &distortion)?;
        assert_eq!(dst.get_pixel(0, 0)?, &[0]);
        assert_eq!(dst.get_pixel(15, 11)?, &[200]);
        Ok(())
    }

    #[test]
    fn size_mismatch() -> Result<(), ImgprocError> {
        let map = UndistortMap::new(&intrinsic(), &PolynomialDistortion::default(), [8, 8].into());
        let src = Image::<u8, 1>::from_size_val([4, 4].into(), 0)?;
        assert!(matches!(
            map.apply(&src),
            Err(ImgprocError::MapSizeMismatch(_, _))
        ));
        Ok(())
    }
}

/// lens distortion of image points.
pub mod distortion;

/// undistortion of whole images through precomputed correction maps.
pub mod undistort;

/// Represents the instrinsic parameters of a pinhole camera
///
/// The camera matrix reads
///
/// ```text
/// | fx  skew  cx |
/// |  0   fy   cy |
/// |  0    0    1 |
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsic {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
    /// The skew between the image axes
    pub skew: f64,
}

impl CameraIntrinsic {
    /// The camera matrix, row-major.
    pub fn matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Map a point from normalized camera coordinates to pixels.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (self.fx * x + self.skew * y + self.cx, self.fy * y + self.cy)
    }

    /// Map a pixel to normalized camera coordinates.
    pub fn to_normalized(&self, u: f64, v: f64) -> (f64, f64) {
        let y = (v - self.cy) / self.fy;
        let x = (u - self.cx - self.skew * y) / self.fx;
        (x, y)
    }
}

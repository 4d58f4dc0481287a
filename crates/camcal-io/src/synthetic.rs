use rayon::prelude::*;

use camcal_3d::{
    linalg::{inverse_mat33, mat33_mul_vec3},
    rotation::rotation_from_rvec,
};
use camcal_image::{Image, ImageSize};
use camcal_imgproc::{
    calibration::{
        distortion::{undistort_point, PolynomialDistortion},
        CameraIntrinsic,
    },
    chessboard::PatternSize,
};

use crate::{error::FrameSourceError, source::FrameSource};

// samples per pixel side for anti-aliasing
const SUPERSAMPLING: usize = 3;

const BLACK: f64 = 20.0;
const WHITE: f64 = 235.0;

/// A board pose: rotation vector and translation from the board frame to the camera frame.
pub type BoardPose = ([f64; 3], [f64; 3]);

/// A simulated camera watching a chessboard that moves through a list of poses.
///
/// The board lies on the `z = 0` plane of its own frame with inner corner `(i, j)` at
/// `(i * square_size, j * square_size, 0)`, surrounded by one square of white margin.
pub struct SyntheticChessboardCamera {
    size: ImageSize,
    intrinsic: CameraIntrinsic,
    distortion: PolynomialDistortion,
    pattern: PatternSize,
    square_size: f64,
    poses: Vec<BoardPose>,
    frames_per_pose: usize,
    frame_index: usize,
    opened: bool,
}

impl SyntheticChessboardCamera {
    /// Create a camera with a set of tilted board poses filling the view.
    pub fn new(
        size: ImageSize,
        intrinsic: CameraIntrinsic,
        pattern: PatternSize,
        square_size: f64,
    ) -> Self {
        let poses = default_poses(size, &intrinsic, pattern, square_size);
        Self {
            size,
            intrinsic,
            distortion: PolynomialDistortion::default(),
            pattern,
            square_size,
            poses,
            frames_per_pose: 1,
            frame_index: 0,
            opened: false,
        }
    }

    /// Set the lens distortion of the simulated camera.
    pub fn with_distortion(mut self, distortion: PolynomialDistortion) -> Self {
        self.distortion = distortion;
        self
    }

    /// Replace the board poses. An empty list keeps the current poses.
    pub fn with_poses(mut self, poses: Vec<BoardPose>) -> Self {
        if !poses.is_empty() {
            self.poses = poses;
        }
        self
    }

    /// Set how many consecutive frames show the same pose.
    pub fn with_frames_per_pose(mut self, frames_per_pose: usize) -> Self {
        self.frames_per_pose = frames_per_pose.max(1);
        self
    }

    /// The simulated camera matrix.
    pub fn intrinsic(&self) -> &CameraIntrinsic {
        &self.intrinsic
    }

    /// The board poses cycled through.
    pub fn poses(&self) -> &[BoardPose] {
        &self.poses
    }

    /// The pose shown by the next grabbed frame.
    pub fn current_pose(&self) -> BoardPose {
        self.poses[(self.frame_index / self.frames_per_pose) % self.poses.len()]
    }

    /// Render the board seen from `pose`.
    pub fn render(&self, pose: &BoardPose) -> Result<Image<u8, 3>, FrameSourceError> {
        let (rvec, tvec) = pose;
        let r = rotation_from_rvec(rvec);
        // plane to normalized image: [r1 r2 t]
        let homo = [
            [r[0][0], r[0][1], tvec[0]],
            [r[1][0], r[1][1], tvec[1]],
            [r[2][0], r[2][1], tvec[2]],
        ];
        let Some(inv) = inverse_mat33(&homo) else {
            return Ok(Image::from_size_val(self.size, WHITE as u8)?);
        };

        let cols = self.size.width;
        let mut data = vec![0u8; cols * self.size.height * 3];
        data.par_chunks_exact_mut(3 * cols)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, pixel) in row.chunks_exact_mut(3).enumerate() {
                    let mut acc = 0.0;
                    for sy in 0..SUPERSAMPLING {
                        for sx in 0..SUPERSAMPLING {
                            let u = x as f64 + (sx as f64 + 0.5) / SUPERSAMPLING as f64 - 0.5;
                            let v = y as f64 + (sy as f64 + 0.5) / SUPERSAMPLING as f64 - 0.5;
                            acc += self.shade(&inv, u, v);
                        }
                    }
                    let value = (acc / (SUPERSAMPLING * SUPERSAMPLING) as f64).round() as u8;
                    pixel.fill(value);
                }
            });

        Ok(Image::new(self.size, data)?)
    }

    fn shade(&self, inv: &[[f64; 3]; 3], u: f64, v: f64) -> f64 {
        let (x, y) = undistort_point(u, v, &self.intrinsic, &self.distortion);
        let p = mat33_mul_vec3(inv, &[x, y, 1.0]);
        if p[2] <= 0.0 {
            return WHITE;
        }
        let sx = (p[0] / p[2]) / self.square_size;
        let sy = (p[1] / p[2]) / self.square_size;

        let inside = sx >= -1.0
            && sy >= -1.0
            && sx < self.pattern.cols as f64
            && sy < self.pattern.rows as f64;
        if !inside {
            return WHITE;
        }

        if (sx.floor() as i64 + sy.floor() as i64).rem_euclid(2) == 0 {
            BLACK
        } else {
            WHITE
        }
    }
}

/// Tilted poses keeping the whole board inside the view.
fn default_poses(
    size: ImageSize,
    intrinsic: &CameraIntrinsic,
    pattern: PatternSize,
    square_size: f64,
) -> Vec<BoardPose> {
    let board_width = (pattern.cols + 1) as f64 * square_size;
    let depth = intrinsic.fx * board_width / (0.5 * size.width as f64);
    let center = [
        0.5 * (pattern.cols - 1) as f64 * square_size,
        0.5 * (pattern.rows - 1) as f64 * square_size,
        0.0,
    ];
    // centre the board on the optical axis
    let offset = [
        (size.width as f64 - 1.0) * 0.5 - intrinsic.cx,
        (size.height as f64 - 1.0) * 0.5 - intrinsic.cy,
    ];

    [
        [0.25, 0.05, 0.0],
        [-0.25, -0.05, 0.05],
        [0.05, 0.3, -0.05],
        [-0.05, -0.3, 0.0],
        [0.2, 0.2, 0.1],
        [-0.2, 0.2, -0.1],
    ]
    .into_iter()
    .map(|rvec| {
        let rc = mat33_mul_vec3(&rotation_from_rvec(&rvec), &center);
        let tvec = [
            offset[0] * depth / intrinsic.fx - rc[0],
            offset[1] * depth / intrinsic.fy - rc[1],
            depth - rc[2],
        ];
        (rvec, tvec)
    })
    .collect()
}

impl Default for SyntheticChessboardCamera {
    fn default() -> Self {
        Self::new(
            ImageSize {
                width: 640,
                height: 480,
            },
            CameraIntrinsic {
                fx: 600.0,
                fy: 600.0,
                cx: 319.5,
                cy: 239.5,
                skew: 0.0,
            },
            PatternSize { cols: 9, rows: 6 },
            25.0,
        )
    }
}

impl FrameSource for SyntheticChessboardCamera {
    fn name(&self) -> String {
        format!(
            "synthetic {}x{} chessboard camera",
            self.pattern.cols, self.pattern.rows
        )
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        self.opened = true;
        self.frame_index = 0;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        if !self.opened {
            return Err(FrameSourceError::NotOpened);
        }
        let frame = self.render(&self.current_pose())?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.opened = false;
    }
}

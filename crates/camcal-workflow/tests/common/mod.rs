#![allow(dead_code)]

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Arc,
    time::{Duration, Instant},
};

use camcal_3d::{calibration::CalibError, projection::project_points, rotation::rotation_from_rvec};
use camcal_image::{Image, ImageSize};
use camcal_imgproc::{
    calibration::{distortion::PolynomialDistortion, CameraIntrinsic},
    chessboard::PatternSize,
};
use camcal_io::{FrameSource, FrameSourceError};
use camcal_workflow::{
    config::CalibrationPolicy,
    session::{Correspondence, IntrinsicModel, PoseEstimate, SampleSet},
    vision::{CalibrationOutput, PoseSolution},
    NativeVision, VisionBackend, VisionError, WorkflowConfig, WorkflowController,
};

pub const FRAME_SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

pub fn camera() -> IntrinsicModel {
    IntrinsicModel {
        intrinsic: CameraIntrinsic {
            fx: 600.0,
            fy: 600.0,
            cx: 319.5,
            cy: 239.5,
            skew: 0.0,
        },
        distortion: PolynomialDistortion::default(),
    }
}

/// Board views around a fronto-parallel pose at 600 units.
pub fn board_poses() -> Vec<([f64; 3], [f64; 3])> {
    [
        [0.3, 0.0, 0.0],
        [-0.3, 0.0, 0.05],
        [0.0, 0.3, 0.0],
        [0.0, -0.3, -0.05],
        [0.2, 0.2, 0.1],
        [-0.2, 0.25, -0.1],
        [0.25, -0.2, 0.05],
        [-0.25, -0.25, 0.0],
        [0.1, 0.35, 0.0],
        [0.35, 0.1, 0.0],
    ]
    .into_iter()
    .enumerate()
    .map(|(i, rvec)| {
        let shift = (i % 3) as f64 * 10.0 - 10.0;
        (rvec, [-112.5 + shift, -112.5 - shift, 600.0 + 5.0 * i as f64])
    })
    .collect()
}

/// Vision backend answering chessboard queries from projected board views.
///
/// Each successful detection consumes one unit of budget, so tests decide exactly how many
/// samples the pipeline can produce.
pub struct FakeVision {
    world: Vec<[f64; 3]>,
    poses: Vec<([f64; 3], [f64; 3])>,
    budget: AtomicUsize,
    served: AtomicUsize,
    fail_calibration: AtomicBool,
    native: NativeVision,
}

impl FakeVision {
    pub fn new(pattern: PatternSize, square: f64) -> Self {
        let world = (0..pattern.rows)
            .flat_map(|j| {
                (0..pattern.cols).map(move |i| [i as f64 * square, j as f64 * square, 0.0])
            })
            .collect();
        Self {
            world,
            poses: board_poses(),
            budget: AtomicUsize::new(0),
            served: AtomicUsize::new(0),
            fail_calibration: AtomicBool::new(false),
            native: NativeVision::default(),
        }
    }

    pub fn allow(&self, detections: usize) {
        self.budget.fetch_add(detections, Ordering::SeqCst);
    }

    pub fn fail_calibration(&self) {
        self.fail_calibration.store(true, Ordering::SeqCst);
    }
}

impl VisionBackend for FakeVision {
    fn find_chessboard(
        &self,
        _frame: &Image<u8, 3>,
        pattern: PatternSize,
    ) -> Result<Option<Vec<[f64; 2]>>, VisionError> {
        if pattern.cols * pattern.rows != self.world.len() {
            return Ok(None);
        }
        let granted = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_ok();
        if !granted {
            return Ok(None);
        }

        let index = self.served.fetch_add(1, Ordering::SeqCst) % self.poses.len();
        let (rvec, tvec) = self.poses[index];
        let model = camera();
        Ok(Some(project_points(
            &self.world,
            &rotation_from_rvec(&rvec),
            &tvec,
            &model.intrinsic,
            &model.distortion,
        )))
    }

    fn calibrate(
        &self,
        samples: &SampleSet,
        image_size: ImageSize,
        policy: &CalibrationPolicy,
    ) -> Result<CalibrationOutput, VisionError> {
        if self.fail_calibration.load(Ordering::SeqCst) {
            let reason = "views do not constrain the focal length".to_string();
            return Err(CalibError::Degenerate(reason).into());
        }
        self.native.calibrate(samples, image_size, policy)
    }

    fn undistort(
        &self,
        frame: &Image<u8, 3>,
        _model: &IntrinsicModel,
    ) -> Result<Image<u8, 3>, VisionError> {
        Ok(frame.clone())
    }

    fn solve_pose(
        &self,
        correspondences: &[Correspondence],
        model: &IntrinsicModel,
    ) -> Result<PoseSolution, VisionError> {
        self.native.solve_pose(correspondences, model)
    }

    fn project(&self, world: &[f64; 3], pose: &PoseEstimate, model: &IntrinsicModel) -> [f64; 2] {
        self.native.project(world, pose, model)
    }
}

/// A camera streaming gray frames.
pub struct BlankSource {
    opened: bool,
}

impl BlankSource {
    pub fn boxed() -> Box<dyn FrameSource> {
        Box::new(Self { opened: false })
    }
}

impl FrameSource for BlankSource {
    fn name(&self) -> String {
        "blank".to_string()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
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
        Ok(Some(Image::from_size_val(FRAME_SIZE, 128)?))
    }

    fn release(&mut self) {
        self.opened = false;
    }
}

/// A camera that is never there.
pub struct MissingSource;

impl FrameSource for MissingSource {
    fn name(&self) -> String {
        "/dev/video9".to_string()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        Err(FrameSourceError::DeviceUnavailable("no such device".to_string()))
    }

    fn is_opened(&self) -> bool {
        false
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        Err(FrameSourceError::NotOpened)
    }

    fn release(&mut self) {}
}

/// A camera dropping every other frame.
pub struct FlakySource {
    opened: bool,
    grabs: usize,
    pub released: Arc<AtomicBool>,
}

impl FlakySource {
    pub fn new() -> Self {
        Self {
            opened: false,
            grabs: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for FlakySource {
    fn name(&self) -> String {
        "flaky".to_string()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        self.opened = true;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        self.grabs += 1;
        if self.grabs % 2 == 1 {
            return Err(FrameSourceError::Io(std::io::Error::other("frame dropped")));
        }
        Ok(Some(Image::from_size_val(FRAME_SIZE, 128)?))
    }

    fn release(&mut self) {
        self.opened = false;
        self.released.store(true, Ordering::SeqCst);
    }
}

/// A camera taking `delay` to deliver each frame.
pub struct SlowSource {
    delay: Duration,
    pub grabbing: Arc<AtomicBool>,
    pub released: Arc<AtomicBool>,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            grabbing: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for SlowSource {
    fn name(&self) -> String {
        "slow".to_string()
    }

    fn open(&mut self) -> Result<(), FrameSourceError> {
        Ok(())
    }

    fn is_opened(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    fn grab(&mut self) -> Result<Option<Image<u8, 3>>, FrameSourceError> {
        self.grabbing.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Some(Image::from_size_val(FRAME_SIZE, 128)?))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Wait up to five seconds for `flag` to be raised.
pub fn wait_for(flag: &AtomicBool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

pub fn test_config(dir: &std::path::Path) -> WorkflowConfig {
    WorkflowConfig::default()
        .with_tick_period(Duration::from_millis(2))
        .with_sample_cooldown(Duration::ZERO)
        .with_shutdown_wait(Duration::from_secs(2))
        .with_params_path(dir.join("camcal.json"))
}

/// Poll the controller until `done` holds, returning whether it did within five seconds.
pub fn poll_until(
    controller: &mut WorkflowController,
    mut done: impl FnMut(&WorkflowController) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let _ = controller.poll();
        if done(controller) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

pub fn controller_with(vision: Arc<FakeVision>, dir: &std::path::Path) -> WorkflowController {
    let _ = env_logger::builder().is_test(true).try_init();
    WorkflowController::new(test_config(dir), vision)
}

/// The next frame packet handed out by the controller, waiting at most five seconds.
pub fn next_packet(controller: &mut WorkflowController) -> Option<camcal_workflow::FramePacket> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(packet) = controller.poll() {
            return Some(packet);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    None
}

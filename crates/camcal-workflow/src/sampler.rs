use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use camcal_image::Image;
use camcal_imgproc::chessboard::PatternSize;

use crate::{
    session::ChessboardSample,
    vision::{VisionBackend, VisionError},
};

/// Timer spacing out detection attempts.
///
/// Every attempt arms the gate, whatever its outcome; no attempt is allowed until the cooldown
/// has elapsed.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown: Duration,
    armed_until: Option<Instant>,
}

impl CooldownGate {
    /// Create a disarmed gate.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            armed_until: None,
        }
    }

    /// Whether an attempt is allowed at `now`.
    pub fn is_open(&self, now: Instant) -> bool {
        self.armed_until.map_or(true, |until| now >= until)
    }

    /// Arm the gate if it is open at `now`. Returns whether the caller may attempt.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.armed_until = Some(now + self.cooldown);
        true
    }
}

/// Outcome of one sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleAttempt {
    /// The gate is armed, nothing was tried.
    CoolingDown,
    /// No board in the frame.
    NotFound,
    /// The refined corners of the board, row-major.
    Found(Vec<[f64; 2]>),
}

/// Gated chessboard detection on the acquisition side.
pub struct CornerSampler {
    pattern: PatternSize,
    gate: CooldownGate,
}

impl CornerSampler {
    /// Create a sampler for `pattern` attempting at most once per `cooldown`.
    pub fn new(pattern: PatternSize, cooldown: Duration) -> Self {
        Self {
            pattern,
            gate: CooldownGate::new(cooldown),
        }
    }

    /// The searched pattern.
    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    /// Try to find the board in `frame` if the gate allows it at `now`.
    pub fn sample(
        &mut self,
        vision: &dyn VisionBackend,
        frame: &Image<u8, 3>,
        now: Instant,
    ) -> Result<SampleAttempt, VisionError> {
        if !self.gate.try_pass(now) {
            return Ok(SampleAttempt::CoolingDown);
        }
        match vision.find_chessboard(frame, self.pattern)? {
            Some(corners) if corners.len() == self.pattern.num_corners() => {
                Ok(SampleAttempt::Found(corners))
            }
            _ => Ok(SampleAttempt::NotFound),
        }
    }
}

/// Pair detected corners with the world template, if they match it one to one.
pub fn build_sample(
    corners: Vec<[f64; 2]>,
    template: &Arc<[[f64; 3]]>,
) -> Option<ChessboardSample> {
    if corners.len() != template.len() {
        return None;
    }
    Some(ChessboardSample {
        image_points: corners,
        world_points: Arc::clone(template),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CalibrationPolicy,
        session::{Correspondence, IntrinsicModel, PoseEstimate, SampleSet},
        vision::{CalibrationOutput, PoseSolution},
    };
    use camcal_image::ImageSize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts detection calls and reports a fixed corner count.
    struct CountingVision {
        calls: AtomicUsize,
        corners: usize,
    }

    impl VisionBackend for CountingVision {
        fn find_chessboard(
            &self,
            _frame: &Image<u8, 3>,
            _pattern: PatternSize,
        ) -> Result<Option<Vec<[f64; 2]>>, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![[1.0, 2.0]; self.corners]))
        }

        fn calibrate(
            &self,
            _samples: &SampleSet,
            _image_size: ImageSize,
            _policy: &CalibrationPolicy,
        ) -> Result<CalibrationOutput, VisionError> {
            unimplemented!()
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
            _correspondences: &[Correspondence],
            _model: &IntrinsicModel,
        ) -> Result<PoseSolution, VisionError> {
            unimplemented!()
        }

        fn project(&self, _w: &[f64; 3], _p: &PoseEstimate, _m: &IntrinsicModel) -> [f64; 2] {
            [0.0, 0.0]
        }
    }

    #[test]
    fn test_gate_arms_on_every_attempt() {
        let start = Instant::now();
        let mut gate = CooldownGate::new(Duration::from_millis(1500));

        assert!(gate.try_pass(start));
        assert!(!gate.try_pass(start + Duration::from_millis(1499)));
        assert!(gate.try_pass(start + Duration::from_millis(1500)));
        assert!(!gate.is_open(start + Duration::from_millis(2000)));
        assert!(gate.is_open(start + Duration::from_millis(3000)));
    }

    #[test]
    fn test_sampler_respects_cooldown() -> Result<(), VisionError> {
        let vision = CountingVision {
            calls: AtomicUsize::new(0),
            corners: 6,
        };
        let frame = Image::<u8, 3>::from_size_val([8, 8].into(), 0)?;
        let mut sampler = CornerSampler::new(
            PatternSize { cols: 3, rows: 2 },
            Duration::from_millis(100),
        );

        let start = Instant::now();
        assert!(matches!(
            sampler.sample(&vision, &frame, start)?,
            SampleAttempt::Found(c) if c.len() == 6
        ));
        assert_eq!(
            sampler.sample(&vision, &frame, start + Duration::from_millis(50))?,
            SampleAttempt::CoolingDown
        );
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);

        sampler.sample(&vision, &frame, start + Duration::from_millis(100))?;
        assert_eq!(vision.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_wrong_corner_count_is_not_a_sample() -> Result<(), VisionError> {
        let vision = CountingVision {
            calls: AtomicUsize::new(0),
            corners: 5,
        };
        let frame = Image::<u8, 3>::from_size_val([8, 8].into(), 0)?;
        let mut sampler = CornerSampler::new(PatternSize { cols: 3, rows: 2 }, Duration::ZERO);
        assert_eq!(
            sampler.sample(&vision, &frame, Instant::now())?,
            SampleAttempt::NotFound
        );

        let template: Arc<[[f64; 3]]> = Arc::from(vec![[0.0; 3]; 6]);
        assert!(build_sample(vec![[0.0; 2]; 5], &template).is_none());
        assert!(build_sample(vec![[0.0; 2]; 6], &template).is_some());
        Ok(())
    }
}

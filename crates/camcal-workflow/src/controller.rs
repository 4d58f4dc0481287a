use std::sync::Arc;

use camcal_3d::pnp::{PnPError, MIN_CORRESPONDENCES};
use camcal_image::ImageSize;
use camcal_io::FrameSource;
use chrono::Local;

use crate::{
    collector::{CorrespondenceCollector, WorldInput},
    config::WorkflowConfig,
    error::WorkflowError,
    pipeline::{
        FramePacket, FramePipeline, Overlay, PipelineEvent, PipelineSettings, SessionSnapshot,
    },
    report::{CalibrationReport, PoseReport},
    sampler::build_sample,
    session::{BoardGeometry, Correspondence, IntrinsicModel, SampleSet, Stage},
    store::{intrinsic_values, pose_values, ParameterStore},
    vision::{VisionBackend, VisionError},
};

/// What [`WorkflowController::save_parameters`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedParameters {
    /// The camera matrix and the distortion vector.
    Intrinsics,
    /// The intrinsics together with the rotation and translation vectors.
    IntrinsicsAndPose,
}

/// The calibration state machine.
///
/// The controller owns the session state and is driven from a single thread, the presentation
/// context. Frames are produced by a [`FramePipeline`] thread and collected with
/// [`WorkflowController::poll`].
pub struct WorkflowController {
    config: WorkflowConfig,
    vision: Arc<dyn VisionBackend>,
    store: ParameterStore,
    stage: Stage,
    epoch: u64,
    geometry: Option<BoardGeometry>,
    template: Option<Arc<[[f64; 3]]>>,
    samples: SampleSet,
    model: Option<IntrinsicModel>,
    calibration_report: Option<CalibrationReport>,
    collector: CorrespondenceCollector,
    pose: Option<PoseReport>,
    pipeline: Option<FramePipeline>,
    tick_faults: usize,
}

impl WorkflowController {
    /// Create a controller in the `Prepare` stage, persisting to the configured record file.
    pub fn new(config: WorkflowConfig, vision: Arc<dyn VisionBackend>) -> Self {
        let store = ParameterStore::new(&config.params_path);
        Self {
            config,
            vision,
            store,
            stage: Stage::Prepare,
            epoch: 0,
            geometry: None,
            template: None,
            samples: SampleSet::default(),
            model: None,
            calibration_report: None,
            collector: CorrespondenceCollector::default(),
            pose: None,
            pipeline: None,
            tick_faults: 0,
        }
    }

    /// The current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Number of transitions so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The parameter store.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// The board of the current detection.
    pub fn geometry(&self) -> Option<&BoardGeometry> {
        self.geometry.as_ref()
    }

    /// World coordinates of the board corners.
    pub fn world_template(&self) -> Option<&[[f64; 3]]> {
        self.template.as_deref()
    }

    /// The accepted samples.
    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    /// Number of accepted samples.
    pub fn saved_count(&self) -> usize {
        self.samples.len()
    }

    /// The camera model of the session.
    pub fn model(&self) -> Option<&IntrinsicModel> {
        self.model.as_ref()
    }

    /// The report of the last calibration.
    pub fn calibration_report(&self) -> Option<&CalibrationReport> {
        self.calibration_report.as_ref()
    }

    /// The solved pose.
    pub fn pose(&self) -> Option<&PoseReport> {
        self.pose.as_ref()
    }

    /// The recorded correspondences.
    pub fn correspondences(&self) -> &[Correspondence] {
        self.collector.correspondences()
    }

    /// The picked pixel.
    pub fn preview_point(&self) -> Option<[f64; 2]> {
        self.collector.preview()
    }

    /// The projected test point.
    pub fn mark_point(&self) -> Option<[f64; 2]> {
        self.collector.mark()
    }

    /// Number of acquisition ticks that failed.
    pub fn tick_faults(&self) -> usize {
        self.tick_faults
    }

    /// Whether the acquisition thread runs.
    pub fn is_streaming(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.is_running())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            epoch: self.epoch,
            stage: self.stage,
            pattern: match self.stage {
                Stage::Detecting => self.geometry.map(|g| g.pattern()),
                _ => None,
            },
            model: match self.stage {
                Stage::Undistorting => self.model,
                _ => None,
            },
            overlay: Overlay {
                preview: self.collector.preview(),
                mark: self.collector.mark(),
                recorded: self
                    .collector
                    .correspondences()
                    .iter()
                    .map(|c| c.pixel)
                    .collect(),
            },
        }
    }

    fn publish(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.publish(Arc::new(self.snapshot()));
        }
    }

    /// Move to `stage`, resetting the session fields the new stage owns.
    fn enter(&mut self, stage: Stage) {
        match stage {
            Stage::Prepare | Stage::Started | Stage::Detecting | Stage::Closed => {
                self.samples.clear();
                self.model = None;
                self.calibration_report = None;
                self.collector.reset();
                self.pose = None;
            }
            Stage::Calibrated | Stage::Undistorting => {
                self.collector.reset();
                self.pose = None;
            }
        }

        log::info!("stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.epoch += 1;
        self.publish();
    }

    fn require(&self, operation: &'static str, allowed: &[Stage]) -> Result<(), WorkflowError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                operation,
                stage: self.stage,
            })
        }
    }

    /// Open `source` and start streaming.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::DeviceUnavailable`] when the source cannot be opened; the workflow is
    /// then `Closed`.
    pub fn connect(&mut self, mut source: Box<dyn FrameSource>) -> Result<(), WorkflowError> {
        self.require("connect", &[Stage::Prepare, Stage::Closed])?;

        let device = source.name();
        if let Err(err) = source.open() {
            log::warn!("cannot open {device}: {err}");
            self.enter(Stage::Closed);
            return Err(WorkflowError::DeviceUnavailable {
                device,
                reason: err.to_string(),
            });
        }
        log::info!("connected to {device}");

        self.enter(Stage::Started);
        let settings = PipelineSettings {
            period: self.config.tick_period(),
            cooldown: self.config.sample_cooldown(),
        };
        match FramePipeline::spawn(
            source,
            Arc::clone(&self.vision),
            Arc::new(self.snapshot()),
            settings,
        ) {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                Ok(())
            }
            Err(err) => {
                self.enter(Stage::Closed);
                Err(WorkflowError::Pipeline(err))
            }
        }
    }

    /// Start collecting chessboard samples of `geometry`, dropping previous samples.
    pub fn begin_detection(&mut self, geometry: BoardGeometry) -> Result<(), WorkflowError> {
        self.require(
            "begin detection",
            &[
                Stage::Started,
                Stage::Detecting,
                Stage::Calibrated,
                Stage::Undistorting,
            ],
        )?;
        geometry.validate()?;

        self.template = Some(Arc::from(geometry.world_template()));
        self.geometry = Some(geometry);
        self.enter(Stage::Detecting);
        Ok(())
    }

    /// Estimate the intrinsics from the collected samples.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::InsufficientSamples`] below the requested number of boards and
    /// [`WorkflowError::CalibrationDegenerate`] when the estimation fails; detection goes on
    /// with the collected samples in both cases.
    pub fn calibrate(&mut self) -> Result<CalibrationReport, WorkflowError> {
        self.require("calibrate", &[Stage::Detecting])?;
        let geometry = self
            .geometry
            .ok_or(WorkflowError::MissingModel("board geometry"))?;

        if self.samples.len() < geometry.boards_number {
            return Err(WorkflowError::InsufficientSamples {
                required: geometry.boards_number,
                actual: self.samples.len(),
            });
        }
        let resolution = self
            .samples
            .image_size()
            .ok_or(WorkflowError::InsufficientSamples {
                required: geometry.boards_number,
                actual: 0,
            })?;

        let output = self
            .vision
            .calibrate(&self.samples, resolution, &self.config.calibration)
            .map_err(|err| {
                log::warn!("calibration failed: {err}");
                WorkflowError::CalibrationDegenerate(err.to_string())
            })?;
        if !output.model.is_finite() || !output.rms.is_finite() {
            log::warn!("calibration produced non-finite parameters");
            return Err(WorkflowError::CalibrationDegenerate(
                "non-finite camera parameters".to_string(),
            ));
        }

        let report = CalibrationReport {
            timestamp: Local::now(),
            samples: self.samples.len(),
            geometry,
            resolution,
            model: output.model,
            rms: output.rms,
        };
        log::info!(
            "calibrated from {} samples at {resolution}, rms {:.4} px",
            report.samples,
            report.rms
        );

        self.model = Some(output.model);
        self.calibration_report = Some(report.clone());
        self.enter(Stage::Calibrated);
        Ok(report)
    }

    /// Start undistorting the stream.
    ///
    /// With `use_saved` the intrinsics are read from the parameter store, which also allows
    /// skipping detection straight from `Started`.
    pub fn undistort(&mut self, use_saved: bool) -> Result<(), WorkflowError> {
        let model = match (self.stage, use_saved) {
            (Stage::Calibrated, false) => self
                .model
                .ok_or(WorkflowError::MissingModel("intrinsics"))?,
            (Stage::Started | Stage::Calibrated, true) => {
                let model = self.store.load_intrinsics()?;
                log::info!("using the intrinsics saved in {}", self.store.path().display());
                model
            }
            (stage, _) => {
                return Err(WorkflowError::InvalidTransition {
                    operation: "undistort",
                    stage,
                })
            }
        };

        self.model = Some(model);
        self.enter(Stage::Undistorting);
        Ok(())
    }

    /// Pick the pixel of the next correspondence.
    pub fn set_preview_point(&mut self, pixel: [f64; 2]) -> Result<(), WorkflowError> {
        self.require("pick a point", &[Stage::Undistorting])?;
        self.collector.set_preview(pixel);
        self.publish();
        Ok(())
    }

    /// Pair the picked pixel with `world`.
    pub fn record_correspondence(
        &mut self,
        world: WorldInput,
    ) -> Result<Correspondence, WorkflowError> {
        self.require("record a correspondence", &[Stage::Undistorting])?;
        let correspondence = self.collector.record(world)?;
        log::info!(
            "correspondence {}: {:?} -> {:?}",
            self.collector.len(),
            correspondence.pixel,
            correspondence.world
        );
        self.publish();
        Ok(correspondence)
    }

    /// Drop the correspondences and the picked and marked pixels.
    pub fn reset_correspondences(&mut self) -> Result<(), WorkflowError> {
        self.require("reset correspondences", &[Stage::Undistorting])?;
        self.collector.reset();
        self.publish();
        Ok(())
    }

    fn intrinsics_or_saved(&self) -> Result<IntrinsicModel, WorkflowError> {
        match self.model {
            Some(model) => Ok(model),
            None => Ok(self.store.load_intrinsics()?),
        }
    }

    /// Solve the camera pose from the recorded correspondences.
    pub fn solve_pose(&mut self) -> Result<PoseReport, WorkflowError> {
        self.require("solve the pose", &[Stage::Undistorting])?;

        let actual = self.collector.len();
        if actual < MIN_CORRESPONDENCES {
            return Err(WorkflowError::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                actual,
            });
        }

        let model = self.intrinsics_or_saved()?;
        let solution = self
            .vision
            .solve_pose(self.collector.correspondences(), &model)
            .map_err(|err| match err {
                VisionError::PnP(PnPError::InsufficientCorrespondences { required, actual }) => {
                    WorkflowError::InsufficientCorrespondences { required, actual }
                }
                err => WorkflowError::PoseDegenerate(err.to_string()),
            })?;

        let report = PoseReport {
            pose: solution.pose,
            rms: solution.rms,
            correspondences: actual,
        };
        log::info!(
            "pose solved from {actual} correspondences, rms {:.4} px",
            report.rms
        );
        self.pose = Some(report);
        Ok(report)
    }

    /// Project `world` with the solved (or saved) pose and show it on the stream.
    pub fn mark_position(&mut self, world: [f64; 3]) -> Result<[f64; 2], WorkflowError> {
        self.require("mark a position", &[Stage::Undistorting])?;

        let pose = match self.pose {
            Some(report) => report.pose,
            None => self.store.load_pose()?,
        };
        let model = self.intrinsics_or_saved()?;

        let pixel = self.vision.project(&world, &pose, &model);
        self.collector.set_mark(pixel);
        self.publish();
        Ok(pixel)
    }

    /// Persist the results of the current stage.
    ///
    /// Intrinsics are saved once calibrated, and while undistorting until a pose is solved;
    /// once solved, the pose is saved along with them.
    pub fn save_parameters(&self) -> Result<SavedParameters, WorkflowError> {
        match self.stage {
            Stage::Calibrated | Stage::Undistorting => {}
            stage => return Err(WorkflowError::NothingToSave(stage)),
        }
        let model = self
            .model
            .ok_or(WorkflowError::NothingToSave(self.stage))?;

        let mut values = intrinsic_values(&model);
        let saved = match (self.stage, self.pose) {
            (Stage::Undistorting, Some(report)) => {
                values.extend(pose_values(&report.pose));
                SavedParameters::IntrinsicsAndPose
            }
            _ => SavedParameters::Intrinsics,
        };
        // single write: a failure leaves the previous record as it was
        self.store.save(&values)?;
        log::info!("saved {saved:?} to {}", self.store.path().display());
        Ok(saved)
    }

    /// Stop streaming and release the source. Calling it again does nothing.
    pub fn disconnect(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop(self.config.shutdown_wait());
        }
        if self.stage != Stage::Closed {
            self.enter(Stage::Closed);
        }
    }

    /// Process the pipeline output: accept detected samples and return the latest frames.
    ///
    /// Results computed under a previous stage are dropped.
    pub fn poll(&mut self) -> Option<FramePacket> {
        let events = self.pipeline.as_ref()?.drain_events();
        for event in events {
            match event {
                PipelineEvent::CornersFound {
                    epoch,
                    corners,
                    image_size,
                } if epoch == self.epoch && self.stage == Stage::Detecting => {
                    self.accept_sample(corners, image_size);
                }
                PipelineEvent::CornersFound { epoch, .. } => {
                    log::debug!("dropping corners of epoch {epoch}");
                }
                PipelineEvent::TickFault { epoch, message } => {
                    self.tick_faults += 1;
                    log::debug!("tick fault in epoch {epoch}: {message}");
                }
                PipelineEvent::Stopped => {
                    log::warn!("the acquisition thread stopped on its own");
                }
            }
        }

        let packet = self.pipeline.as_ref()?.take_frame()?;
        (packet.epoch == self.epoch).then_some(packet)
    }

    fn accept_sample(&mut self, corners: Vec<[f64; 2]>, image_size: ImageSize) {
        let (Some(template), Some(geometry)) = (&self.template, &self.geometry) else {
            return;
        };
        match build_sample(corners, template) {
            Some(sample) => {
                if self.samples.push(sample, image_size) {
                    log::info!(
                        "sample {}/{} accepted at {image_size}",
                        self.samples.len(),
                        geometry.boards_number
                    );
                } else if let Some(expected) = self.samples.image_size() {
                    log::warn!(
                        "sample at {image_size} dropped, the session samples are {expected}"
                    );
                }
            }
            None => log::warn!("detected corners do not match the board"),
        }
    }
}

impl Drop for WorkflowController {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.stop(self.config.shutdown_wait());
        }
    }
}

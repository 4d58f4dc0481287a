use crate::{session::Stage, store::StoreError, vision::VisionError};

/// Error types of the calibration workflow.
///
/// None of them is fatal: the controller stays usable after every error, in the stage
/// documented for each variant.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The frame source could not be opened. The workflow is closed.
    #[error("Device {device} is unavailable: {reason}")]
    DeviceUnavailable {
        /// Name of the frame source.
        device: String,
        /// Why opening failed.
        reason: String,
    },

    /// Not enough chessboard samples to calibrate. Nothing changes.
    #[error("Calibration needs {required} samples, only {actual} collected")]
    InsufficientSamples {
        /// Number of boards requested by the geometry.
        required: usize,
        /// Number of samples collected.
        actual: usize,
    },

    /// The calibration did not converge. The workflow stays in detection with its samples.
    #[error("Calibration failed: {0}")]
    CalibrationDegenerate(String),

    /// Not enough correspondences to solve the pose. Nothing changes.
    #[error("Pose estimation needs at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of recorded correspondences.
        actual: usize,
    },

    /// The pose solver failed on the recorded correspondences. Nothing changes.
    #[error("Pose estimation failed: {0}")]
    PoseDegenerate(String),

    /// Reading or writing the parameter store failed. In-memory state is unaffected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation is not available in the current stage.
    #[error("Cannot {operation} in stage {stage}")]
    InvalidTransition {
        /// The rejected operation.
        operation: &'static str,
        /// The stage the workflow is in.
        stage: Stage,
    },

    /// The board geometry is not usable.
    #[error("Invalid board geometry: {0}")]
    InvalidGeometry(String),

    /// A correspondence was recorded without all three world coordinates.
    #[error("World point is incomplete, missing {0}")]
    IncompleteCorrespondence(&'static str),

    /// A correspondence was recorded before a pixel was picked.
    #[error("No image point selected")]
    NoPreviewPoint,

    /// Neither intrinsics nor a pose are available to save.
    #[error("Nothing to save in stage {0}")]
    NothingToSave(Stage),

    /// The intrinsics or the pose are not available.
    #[error("No {0} available")]
    MissingModel(&'static str),

    /// A vision operation failed.
    #[error(transparent)]
    Vision(#[from] VisionError),

    /// The acquisition thread could not be started.
    #[error("Failed to start the frame pipeline: {0}")]
    Pipeline(#[from] std::io::Error),
}

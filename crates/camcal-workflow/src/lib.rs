#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Correspondences between picked pixels and world points.
pub mod collector;

/// Workflow configuration.
pub mod config;

/// The calibration state machine.
pub mod controller;

/// Error types for the workflow.
pub mod error;

/// The acquisition thread and its messages.
pub mod pipeline;

/// Human readable calibration and pose reports.
pub mod report;

/// Cooldown-gated chessboard sampling.
pub mod sampler;

/// Session state: stages, board geometry, samples and camera models.
pub mod session;

/// Persistent key-value record of calibration parameters.
pub mod store;

/// The vision operations the workflow depends on.
pub mod vision;

pub use crate::collector::WorldInput;
pub use crate::config::{CalibrationPolicy, ConfigError, WorkflowConfig};
pub use crate::controller::{SavedParameters, WorkflowController};
pub use crate::error::WorkflowError;
pub use crate::pipeline::FramePacket;
pub use crate::report::{CalibrationReport, PoseReport};
pub use crate::session::{
    BoardGeometry, ChessboardSample, Correspondence, IntrinsicModel, PoseEstimate, SampleSet,
    Stage,
};
pub use crate::store::{ParameterStore, StoreError};
pub use crate::vision::{NativeVision, VisionBackend, VisionError};

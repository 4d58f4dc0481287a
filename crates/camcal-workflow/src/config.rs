use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use camcal_3d::calibration::CalibrationFlags;
use camcal_imgproc::chessboard::{ChessboardParams, SubPixParams};
use serde::{Deserialize, Serialize};

/// Error types for loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error to read the configuration file.
    #[error("Failed to read the configuration. {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON.
    #[error("Malformed configuration. {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which camera parameters the calibration estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationPolicy {
    /// Keep the principal point at the image centre.
    pub fix_principal_point: bool,
    /// Keep `k4` at zero.
    pub fix_k4: bool,
    /// Keep `k5` at zero.
    pub fix_k5: bool,
    /// Estimate the rational radial model.
    pub rational_model: bool,
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        let flags = CalibrationFlags::default();
        Self {
            fix_principal_point: flags.fix_principal_point,
            fix_k4: flags.fix_k4,
            fix_k5: flags.fix_k5,
            rational_model: flags.rational_model,
        }
    }
}

impl From<CalibrationPolicy> for CalibrationFlags {
    fn from(policy: CalibrationPolicy) -> Self {
        CalibrationFlags {
            fix_principal_point: policy.fix_principal_point,
            fix_k4: policy.fix_k4,
            fix_k5: policy.fix_k5,
            rational_model: policy.rational_model,
        }
    }
}

/// Configuration of the calibration workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Period of the acquisition loop in milliseconds.
    pub tick_period_ms: u64,
    /// Pause between two chessboard detection attempts in milliseconds.
    pub sample_cooldown_ms: u64,
    /// How long a disconnect waits for the acquisition thread, in milliseconds.
    pub shutdown_wait_ms: u64,
    /// The parameter record file.
    pub params_path: PathBuf,
    /// Parameters estimated by the calibration.
    pub calibration: CalibrationPolicy,
    /// Half side of the subpixel refinement window.
    pub subpix_half_window: usize,
    /// Iteration budget of the subpixel refinement.
    pub subpix_max_iterations: usize,
    /// Convergence threshold of the subpixel refinement, in pixels.
    pub subpix_epsilon: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 33,
            sample_cooldown_ms: 1500,
            shutdown_wait_ms: 33,
            params_path: PathBuf::from("resources/camcal.json"),
            calibration: CalibrationPolicy::default(),
            subpix_half_window: 5,
            subpix_max_iterations: 30,
            subpix_epsilon: 0.1,
        }
    }
}

impl WorkflowConfig {
    /// Read a configuration file. Absent fields take their default value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the acquisition period.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period_ms = period.as_millis() as u64;
        self
    }

    /// Set the detection cooldown.
    pub fn with_sample_cooldown(mut self, cooldown: Duration) -> Self {
        self.sample_cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Set the shutdown wait.
    pub fn with_shutdown_wait(mut self, wait: Duration) -> Self {
        self.shutdown_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Set the parameter record file.
    pub fn with_params_path(mut self, path: impl AsRef<Path>) -> Self {
        self.params_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the calibration policy.
    pub fn with_calibration(mut self, policy: CalibrationPolicy) -> Self {
        self.calibration = policy;
        self
    }

    /// The acquisition period, at least one millisecond.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    /// The detection cooldown.
    pub fn sample_cooldown(&self) -> Duration {
        Duration::from_millis(self.sample_cooldown_ms)
    }

    /// The shutdown wait.
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }

    /// Detector parameters with the configured subpixel refinement.
    pub fn chessboard_params(&self) -> ChessboardParams {
        ChessboardParams::default().with_subpix(
            SubPixParams::default()
                .with_half_window(self.subpix_half_window)
                .with_max_iterations(self.subpix_max_iterations)
                .with_epsilon(self.subpix_epsilon),
        )
    }
}

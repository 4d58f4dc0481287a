//! Persistence of the calibration results as a flat record of named decimal values.
//!
//! The record is a JSON document:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "values": { "intrinsic.m00": "812.5", "rvec.x": "0.01", ... }
//! }
//! ```
//!
//! Saves merge the new values into the record on disk and replace the file atomically.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use camcal_imgproc::calibration::{distortion::PolynomialDistortion, CameraIntrinsic};
use serde::{Deserialize, Serialize};

use crate::session::{IntrinsicModel, PoseEstimate};

/// Version of the record layout written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Number of distortion fields in the record; the first eight are used.
pub const DISTORTION_FIELDS: usize = 14;

/// Error types for the parameter store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Error to read or write the record file.
    #[error("Failed to access the parameter file. {0}")]
    Io(#[from] std::io::Error),

    /// The record file is not valid JSON.
    #[error("Malformed parameter file. {0}")]
    Format(#[from] serde_json::Error),

    /// The record was written by a newer version.
    #[error("Parameter file schema {found} is newer than the supported {supported}")]
    UnsupportedSchema {
        /// Version found in the file.
        found: u32,
        /// Latest supported version.
        supported: u32,
    },

    /// Keys missing from the record.
    #[error("Parameters not found: {}", .0.join(", "))]
    NotFound(Vec<String>),

    /// A value is not a decimal number.
    #[error("Parameter {key} holds {value:?}, not a number")]
    InvalidValue {
        /// The key.
        key: String,
        /// The stored text.
        value: String,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordFile {
    schema_version: u32,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

/// Keys of the intrinsic matrix, row-major.
pub fn intrinsic_keys() -> Vec<String> {
    (0..3)
        .flat_map(|r| (0..3).map(move |c| format!("intrinsic.m{r}{c}")))
        .collect()
}

/// Keys of the distortion vector, reserved fields included.
pub fn distortion_keys() -> Vec<String> {
    (0..DISTORTION_FIELDS)
        .map(|i| format!("distortion.d{i:02}"))
        .collect()
}

/// Keys of the rotation vector.
pub fn rvec_keys() -> Vec<String> {
    ["x", "y", "z"].iter().map(|a| format!("rvec.{a}")).collect()
}

/// Keys of the translation vector.
pub fn tvec_keys() -> Vec<String> {
    ["x", "y", "z"].iter().map(|a| format!("tvec.{a}")).collect()
}

/// The stored values of a camera model, keyed by [`intrinsic_keys`] and [`distortion_keys`].
pub fn intrinsic_values(model: &IntrinsicModel) -> BTreeMap<String, f64> {
    let coefficients = model.distortion_coefficients();
    intrinsic_keys()
        .into_iter()
        .zip(model.camera_matrix().into_iter().flatten())
        .chain(
            distortion_keys()
                .into_iter()
                .enumerate()
                .map(|(i, key)| (key, coefficients.get(i).copied().unwrap_or(0.0))),
        )
        .collect()
}

/// The stored values of a pose, keyed by [`rvec_keys`] and [`tvec_keys`].
pub fn pose_values(pose: &PoseEstimate) -> BTreeMap<String, f64> {
    rvec_keys()
        .into_iter()
        .zip(pose.rvec)
        .chain(tvec_keys().into_iter().zip(pose.tvec))
        .collect()
}

/// Values read for a key schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedValues {
    /// Values found, by key.
    pub values: BTreeMap<String, f64>,
    /// Requested keys absent from the record.
    pub missing: Vec<String>,
}

impl LoadedValues {
    /// The values in the order of `keys`, or the list of missing keys.
    pub fn ordered(&self, keys: &[String]) -> Result<Vec<f64>, StoreError> {
        if !self.missing.is_empty() {
            return Err(StoreError::NotFound(self.missing.clone()));
        }
        keys.iter()
            .map(|k| {
                self.values
                    .get(k)
                    .copied()
                    .ok_or_else(|| StoreError::NotFound(vec![k.clone()]))
            })
            .collect()
    }
}

/// JSON file holding the persisted intrinsics and pose.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    path: PathBuf,
}

impl ParameterStore {
    /// Create a store backed by the file at `path`. The file is created on the first save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Result<RecordFile, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordFile {
                    schema_version: SCHEMA_VERSION,
                    values: BTreeMap::new(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let record: RecordFile = serde_json::from_str(&text)?;
        if record.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: record.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(record)
    }

    /// Merge `values` into the record and rewrite it.
    ///
    /// The file is written next to its final location and renamed over it, so a failed save
    /// leaves the previous record intact.
    pub fn save(&self, values: &BTreeMap<String, f64>) -> Result<(), StoreError> {
        let mut record = self.read_record()?;
        record.schema_version = SCHEMA_VERSION;
        for (key, value) in values {
            record.values.insert(key.clone(), value.to_string());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, &record)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        log::debug!("saved {} values to {}", values.len(), self.path.display());
        Ok(())
    }

    /// Read the values of `keys`. Absent keys are reported in [`LoadedValues::missing`].
    pub fn load(&self, keys: &[String]) -> Result<LoadedValues, StoreError> {
        let record = self.read_record()?;
        let mut loaded = LoadedValues::default();
        for key in keys {
            match record.values.get(key) {
                Some(text) => {
                    let value = text
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| StoreError::InvalidValue {
                            key: key.clone(),
                            value: text.clone(),
                        })?;
                    loaded.values.insert(key.clone(), value);
                }
                None => loaded.missing.push(key.clone()),
            }
        }
        log::debug!(
            "loaded {} values from {} ({} missing)",
            loaded.values.len(),
            self.path.display(),
            loaded.missing.len()
        );
        Ok(loaded)
    }

    /// Save the camera matrix and the distortion vector.
    pub fn save_intrinsics(&self, model: &IntrinsicModel) -> Result<(), StoreError> {
        self.save(&intrinsic_values(model))
    }

    /// Load the camera matrix and the distortion vector.
    pub fn load_intrinsics(&self) -> Result<IntrinsicModel, StoreError> {
        let keys = intrinsic_keys();
        let m = self.load(&keys)?.ordered(&keys)?;

        let dist_keys = distortion_keys();
        let d = self.load(&dist_keys[..8])?.ordered(&dist_keys[..8])?;

        Ok(IntrinsicModel {
            intrinsic: CameraIntrinsic {
                fx: m[0],
                skew: m[1],
                cx: m[2],
                fy: m[4],
                cy: m[5],
            },
            distortion: PolynomialDistortion::from_coefficients([
                d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7],
            ]),
        })
    }

    /// Save the rotation and translation vectors.
    pub fn save_pose(&self, pose: &PoseEstimate) -> Result<(), StoreError> {
        self.save(&pose_values(pose))
    }

    /// Load the rotation and translation vectors.
    pub fn load_pose(&self) -> Result<PoseEstimate, StoreError> {
        let keys = rvec_keys().into_iter().chain(tvec_keys()).collect::<Vec<_>>();
        let v = self.load(&keys)?.ordered(&keys)?;
        Ok(PoseEstimate::from_vectors(
            [v[0], v[1], v[2]],
            [v[3], v[4], v[5]],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> IntrinsicModel {
        IntrinsicModel {
            intrinsic: CameraIntrinsic {
                fx: 812.345678901234,
                fy: 809.1,
                cx: 319.5,
                cy: 239.5,
                skew: 0.0,
            },
            distortion: PolynomialDistortion::from_coefficients([
                -0.1234567890123,
                0.05,
                1e-4,
                -2e-4,
                0.003,
                0.0,
                0.0,
                0.0,
            ]),
        }
    }

    #[test]
    fn test_intrinsics_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let store = ParameterStore::new(tmp_dir.path().join("resources").join("camcal.json"));

        store.save_intrinsics(&model())?;
        assert_eq!(store.load_intrinsics()?, model());

        let all = store.load(&distortion_keys())?;
        assert!(all.missing.is_empty());
        assert_eq!(all.values.len(), DISTORTION_FIELDS);
        Ok(())
    }

    #[test]
    fn test_save_merges_records() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let store = ParameterStore::new(tmp_dir.path().join("camcal.json"));

        let pose = PoseEstimate::from_vectors([0.1, -0.2, 0.3], [10.0, 20.0, 500.25]);
        store.save_intrinsics(&model())?;
        store.save_pose(&pose)?;

        assert_eq!(store.load_intrinsics()?, model());
        assert_eq!(store.load_pose()?, pose);
        Ok(())
    }

    #[test]
    fn test_missing_keys_are_reported() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let store = ParameterStore::new(tmp_dir.path().join("camcal.json"));

        let loaded = store.load(&rvec_keys())?;
        assert_eq!(loaded.missing, rvec_keys());
        assert!(matches!(store.load_pose(), Err(StoreError::NotFound(_))));

        store.save_intrinsics(&model())?;
        let keys = [rvec_keys(), intrinsic_keys()].concat();
        let loaded = store.load(&keys)?;
        assert_eq!(loaded.missing, rvec_keys());
        assert_eq!(loaded.values.len(), 9);
        Ok(())
    }

    #[test]
    fn test_rejects_newer_schema_and_bad_values() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("camcal.json");
        let store = ParameterStore::new(&path);

        std::fs::write(&path, r#"{"schema_version": 99, "values": {}}"#)?;
        assert!(matches!(
            store.load(&rvec_keys()),
            Err(StoreError::UnsupportedSchema { found: 99, .. })
        ));
        assert!(store.save_pose(&PoseEstimate::from_vectors([0.0; 3], [0.0; 3])).is_err());

        std::fs::write(&path, r#"{"schema_version": 1, "values": {"rvec.x": "abc"}}"#)?;
        assert!(matches!(
            store.load(&rvec_keys()),
            Err(StoreError::InvalidValue { .. })
        ));
        Ok(())
    }
}

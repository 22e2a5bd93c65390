//! Persisted calibration offsets
//!
//! A flat JSON object mapping key → integer. Saving merges into whatever the
//! file already holds: the six offset keys are overwritten, any other keys are
//! left alone.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::{Map, Value};

use crate::error::{ImuError, Result};
use crate::types::{Axes, OffsetSet};

pub const ACCELERATION_X_OFFSET: &str = "ACCELERATION_X_OFFSET";
pub const ACCELERATION_Y_OFFSET: &str = "ACCELERATION_Y_OFFSET";
pub const ACCELERATION_Z_OFFSET: &str = "ACCELERATION_Z_OFFSET";
pub const GYROSCOPE_X_OFFSET: &str = "GYROSCOPE_X_OFFSET";
pub const GYROSCOPE_Y_OFFSET: &str = "GYROSCOPE_Y_OFFSET";
pub const GYROSCOPE_Z_OFFSET: &str = "GYROSCOPE_Z_OFFSET";

/// Default file name used by the CLI
pub const DEFAULT_OFFSETS_FILE: &str = "setup.json";

/// Largest offset magnitude accepted on load. Calibration averages i16 counts
/// and subtracts 1 g from Z, so anything beyond this is not a real offset.
pub const MAX_OFFSET_MAGNITUDE: i32 = 65_535;

/// Result of looking for a persisted calibration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetLoad {
    Loaded(OffsetSet),
    /// No file yet: the expected first-run state
    Absent,
}

impl OffsetLoad {
    pub fn is_absent(&self) -> bool {
        matches!(self, OffsetLoad::Absent)
    }

    /// Offsets to run with; zero when nothing was persisted
    pub fn into_offsets(self) -> OffsetSet {
        match self {
            OffsetLoad::Loaded(offsets) => offsets,
            OffsetLoad::Absent => OffsetSet::zero(),
        }
    }
}

impl OffsetSet {
    /// The six persisted entries in file order
    pub fn entries(&self) -> [(&'static str, i32); 6] {
        [
            (ACCELERATION_X_OFFSET, self.accel_offset.x),
            (ACCELERATION_Y_OFFSET, self.accel_offset.y),
            (ACCELERATION_Z_OFFSET, self.accel_offset.z),
            (GYROSCOPE_X_OFFSET, self.gyro_offset.x),
            (GYROSCOPE_Y_OFFSET, self.gyro_offset.y),
            (GYROSCOPE_Z_OFFSET, self.gyro_offset.z),
        ]
    }
}

pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the offsets. A missing file is `Absent`; a missing key reads as 0;
    /// anything unparsable is a `ConfigLoad` error.
    pub fn load(&self) -> Result<OffsetLoad> {
        let Some(document) = self.read_document()? else {
            return Ok(OffsetLoad::Absent);
        };

        let get = |key: &str| -> Result<i32> {
            match document.get(key) {
                None => Ok(0),
                Some(value) => value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .filter(|v| v.abs() <= MAX_OFFSET_MAGNITUDE)
                    .ok_or_else(|| {
                        self.load_error(format!(
                            "{key} must be an integer within ±{MAX_OFFSET_MAGNITUDE}, found {value}"
                        ))
                    }),
            }
        };

        let offsets = OffsetSet {
            accel_offset: Axes::new(
                get(ACCELERATION_X_OFFSET)?,
                get(ACCELERATION_Y_OFFSET)?,
                get(ACCELERATION_Z_OFFSET)?,
            ),
            gyro_offset: Axes::new(
                get(GYROSCOPE_X_OFFSET)?,
                get(GYROSCOPE_Y_OFFSET)?,
                get(GYROSCOPE_Z_OFFSET)?,
            ),
        };
        info!("Loaded offsets from {}", self.path.display());
        Ok(OffsetLoad::Loaded(offsets))
    }

    /// Write `offsets`, preserving unrelated keys already in the file
    pub fn save(&self, offsets: &OffsetSet) -> Result<()> {
        let document = self.read_document()?.unwrap_or_default();
        self.write_merged(document, offsets)
    }

    /// Like [`save`](Self::save), but a present-but-unparsable file is replaced
    /// instead of failing. Used by calibration, which is the remedy for a
    /// corrupt file.
    pub fn save_replacing_corrupt(&self, offsets: &OffsetSet) -> Result<()> {
        let document = match self.read_document() {
            Ok(doc) => doc.unwrap_or_default(),
            Err(ImuError::ConfigLoad { reason, .. }) => {
                warn!(
                    "Existing {} is unreadable ({reason}); rewriting it",
                    self.path.display()
                );
                Map::new()
            }
            Err(e) => return Err(e),
        };
        self.write_merged(document, offsets)
    }

    fn write_merged(&self, mut document: Map<String, Value>, offsets: &OffsetSet) -> Result<()> {
        for (key, value) in offsets.entries() {
            document.insert(key.to_string(), Value::from(value));
        }
        let json = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| self.io_error(e.into()))?;
        fs::write(&self.path, json).map_err(|source| self.io_error(source))?;
        info!("Offsets saved to {}", self.path.display());
        Ok(())
    }

    /// `None` when the file does not exist
    fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(other) => Err(self.load_error(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(self.load_error(e.to_string())),
        }
    }

    fn io_error(&self, source: std::io::Error) -> ImuError {
        ImuError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load_error(&self, reason: String) -> ImuError {
        ImuError::ConfigLoad {
            path: self.path.clone(),
            reason,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_offsets() -> OffsetSet {
        OffsetSet {
            accel_offset: Axes::new(-512, 37, 210),
            gyro_offset: Axes::new(-44, 19, -MAX_OFFSET_MAGNITUDE),
        }
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = OffsetStore::new(dir.path().join("setup.json"));

        let load = store.load().unwrap();
        assert!(load.is_absent());
        assert_eq!(load.into_offsets(), OffsetSet::zero());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = OffsetStore::new(dir.path().join("setup.json"));

        store.save(&sample_offsets()).unwrap();
        assert_eq!(store.load().unwrap(), OffsetLoad::Loaded(sample_offsets()));
    }

    #[test]
    fn test_missing_key_defaults_to_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");
        fs::write(&path, r#"{"ACCELERATION_Z_OFFSET": -120, "GYROSCOPE_X_OFFSET": 7}"#).unwrap();

        let offsets = OffsetStore::new(&path).load().unwrap().into_offsets();
        assert_eq!(offsets.accel_offset, Axes::new(0, 0, -120));
        assert_eq!(offsets.gyro_offset, Axes::new(7, 0, 0));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");
        fs::write(&path, "{ not json").unwrap();

        let err = OffsetStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ImuError::ConfigLoad { .. }));
    }

    #[test]
    fn test_non_object_and_non_integer_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            OffsetStore::new(&path).load(),
            Err(ImuError::ConfigLoad { .. })
        ));

        fs::write(&path, r#"{"GYROSCOPE_Y_OFFSET": 1.5}"#).unwrap();
        assert!(matches!(
            OffsetStore::new(&path).load(),
            Err(ImuError::ConfigLoad { .. })
        ));

        fs::write(&path, r#"{"GYROSCOPE_Y_OFFSET": 4294967296}"#).unwrap();
        assert!(OffsetStore::new(&path).load().is_err());
    }

    #[test]
    fn test_offsets_beyond_sensor_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");

        fs::write(&path, r#"{"GYROSCOPE_Z_OFFSET": -2147483648}"#).unwrap();
        let err = OffsetStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ImuError::ConfigLoad { .. }));
        assert!(err.to_string().contains("GYROSCOPE_Z_OFFSET"));

        fs::write(&path, r#"{"ACCELERATION_Z_OFFSET": 65536}"#).unwrap();
        assert!(OffsetStore::new(&path).load().is_err());

        fs::write(&path, r#"{"ACCELERATION_Z_OFFSET": -49152}"#).unwrap();
        let offsets = OffsetStore::new(&path).load().unwrap().into_offsets();
        assert_eq!(offsets.accel_offset.z, -49152);
    }

    #[test]
    fn test_write_failure_is_io_not_config_load() {
        // A directory at the offsets path cannot be read or written as a file
        let dir = TempDir::new().unwrap();
        let store = OffsetStore::new(dir.path());

        let err = store.save(&sample_offsets()).unwrap_err();
        assert!(matches!(err, ImuError::Io { .. }));
        assert!(!err.to_string().contains("re-run calibration"));

        let err = store.save_replacing_corrupt(&sample_offsets()).unwrap_err();
        assert!(matches!(err, ImuError::Io { .. }));
    }

    #[test]
    fn test_save_preserves_unrelated_keys_and_overwrites_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");
        fs::write(
            &path,
            r#"{"MOTOR_TRIM": 12, "ACCELERATION_X_OFFSET": 9999, "label": "bench"}"#,
        )
        .unwrap();

        let store = OffsetStore::new(&path);
        store.save(&sample_offsets()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["MOTOR_TRIM"], 12);
        assert_eq!(doc["label"], "bench");
        assert_eq!(doc[ACCELERATION_X_OFFSET], -512);
        assert_eq!(store.load().unwrap().into_offsets(), sample_offsets());
    }

    #[test]
    fn test_save_refuses_to_clobber_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup.json");
        fs::write(&path, "garbage").unwrap();

        let store = OffsetStore::new(&path);
        assert!(store.save(&sample_offsets()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");

        store.save_replacing_corrupt(&sample_offsets()).unwrap();
        assert_eq!(store.load().unwrap().into_offsets(), sample_offsets());
    }
}

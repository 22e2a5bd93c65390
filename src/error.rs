use std::path::PathBuf;

use thiserror::Error;

/// Boxed transport error carried by [`ImuError::Bus`].
pub type BusSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tilt tracker error types
#[derive(Error, Debug)]
pub enum ImuError {
    #[error("Bus transfer failed at register 0x{register:02X}: {source}")]
    Bus {
        register: u8,
        #[source]
        source: BusSource,
    },

    #[error("Offsets file {path} is unreadable: {reason} (re-run calibration)")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Calibration needs at least one sample (got {0})")]
    InvalidSampleCount(u32),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Calibration cancelled after {completed} of {total} samples")]
    Cancelled { completed: u32, total: u32 },
}

impl ImuError {
    pub(crate) fn bus<E>(register: u8, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ImuError::Bus {
            register,
            source: Box::new(source),
        }
    }

    /// True for transport failures, the class the caller decides to abort on.
    pub fn is_bus(&self) -> bool {
        matches!(self, ImuError::Bus { .. })
    }
}

/// Result type for estimator and calibration operations
pub type Result<T> = std::result::Result<T, ImuError>;

//! Crate-wide error type.
//!
//! Configuration errors are fatal at startup (missing/malformed JSON config
//! files). Driver errors are transient: the caller skips the current
//! frame's decision and retries on the next one. State-invariant violations
//! (computed target outside hard limits) are clamped and logged, not
//! propagated as errors at all.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("{source}")]
    SerdeJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("{source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },

    #[error(transparent)]
    FileError(#[from] FileErrorInner),

    #[error("calibration table is empty")]
    EmptyCalibrationTable,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("camera driver transient failure: {0}")]
    DriverTransient(String),

    #[error("camera driver authentication failure: {0}")]
    DriverAuth(String),
}

#[derive(Debug)]
pub struct FileErrorInner {
    what: &'static str,
    filename: String,
    source: Box<dyn std::error::Error + Sync + Send>,
}

impl std::fmt::Display for FileErrorInner {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "error reading {} ({}): {}", self.what, self.filename, self.source)
    }
}

impl std::error::Error for FileErrorInner {}

pub fn file_error<E>(what: &'static str, filename: String, source: E) -> Error
where
    E: 'static + std::error::Error + Sync + Send,
{
    FileErrorInner {
        what,
        filename,
        source: Box::new(source),
    }
    .into()
}

pub type Result<T> = std::result::Result<T, Error>;

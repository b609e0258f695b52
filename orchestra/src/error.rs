use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;

use crate::data::ParseRowErr;

/// The orchestra module's result type.
pub type Result<T> = std::result::Result<T, OrchestraErr>;

/// Failures of a run, on the coordinator or on any worker.
#[derive(Debug)]
pub enum OrchestraErr {
    /// A file could not be opened, read or written.
    Io { path: PathBuf, source: io::Error },
    /// The channel to another worker failed.
    Net(io::Error),
    Csv { path: PathBuf, source: csv::Error },
    MalformedRow { row: usize, source: ParseRowErr },
    Image { path: PathBuf, source: image::ImageError },
    Model(MlErr),
    ThreadPool(rayon::ThreadPoolBuildError),
    /// A worker received a message it did not expect at this point of the run.
    Protocol(String),
    /// The coordinator gave up and told every peer so.
    Aborted(String),
    Config { path: PathBuf, source: serde_json::Error },
    /// A worker task panicked or was cancelled.
    Join(tokio::task::JoinError),
}

impl OrchestraErr {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(expected: &str, got: impl fmt::Debug) -> Self {
        Self::Protocol(format!("expected {expected}, got {got:?}"))
    }
}

impl fmt::Display for OrchestraErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestraErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            OrchestraErr::Net(e) => write!(f, "network error: {e}"),
            OrchestraErr::Csv { path, source } => write!(f, "csv error on {}: {source}", path.display()),
            OrchestraErr::MalformedRow { row, source } => write!(f, "malformed row {row}: {source}"),
            OrchestraErr::Image { path, source } => {
                write!(f, "failed to write image {}: {source}", path.display())
            }
            OrchestraErr::Model(e) => write!(f, "model error: {e}"),
            OrchestraErr::ThreadPool(e) => write!(f, "failed to build thread pool: {e}"),
            OrchestraErr::Protocol(detail) => write!(f, "protocol violation: {detail}"),
            OrchestraErr::Aborted(reason) => write!(f, "run aborted by the coordinator: {reason}"),
            OrchestraErr::Config { path, source } => {
                write!(f, "invalid configuration {}: {source}", path.display())
            }
            OrchestraErr::Join(e) => write!(f, "worker task failed: {e}"),
        }
    }
}

impl Error for OrchestraErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OrchestraErr::Io { source, .. } => Some(source),
            OrchestraErr::Net(e) => Some(e),
            OrchestraErr::Csv { source, .. } => Some(source),
            OrchestraErr::MalformedRow { source, .. } => Some(source),
            OrchestraErr::Image { source, .. } => Some(source),
            OrchestraErr::Model(e) => Some(e),
            OrchestraErr::ThreadPool(e) => Some(e),
            OrchestraErr::Config { source, .. } => Some(source),
            OrchestraErr::Join(e) => Some(e),
            OrchestraErr::Protocol(_) | OrchestraErr::Aborted(_) => None,
        }
    }
}

impl From<io::Error> for OrchestraErr {
    fn from(value: io::Error) -> Self {
        Self::Net(value)
    }
}

impl From<MlErr> for OrchestraErr {
    fn from(value: MlErr) -> Self {
        Self::Model(value)
    }
}

impl From<tokio::task::JoinError> for OrchestraErr {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for OrchestraErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(value)
    }
}

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use comms::specs::training::TrainingSpec;
use serde::{Deserialize, Serialize};

use crate::{OrchestraErr, Result, image_dump::ImageDump};

/// Everything a run needs to know, loadable from a JSON file.
///
/// Missing fields take their default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub train: PathBuf,
    pub test: PathBuf,
    pub output: PathBuf,
    /// Where the diagnostic sample image goes, `None` disables it.
    pub image: Option<PathBuf>,
    /// Zero based index of the inference sample to dump.
    pub image_index: usize,
    /// Rows the coordinator's matrix holds at most.
    pub capacity: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub epochs: NonZeroUsize,
    /// Width of the hidden layer.
    pub hidden: NonZeroUsize,
    pub seed: u64,
    /// Threads of the shared memory variant, all available cores when unset.
    pub threads: Option<NonZeroUsize>,
}

const fn nz(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => NonZeroUsize::MIN,
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train: "train.csv".into(),
            test: "test.csv".into(),
            output: "submission.csv".into(),
            image: Some("sample_17.png".into()),
            image_index: 16,
            capacity: nz(60_000),
            batch_size: nz(1_000),
            learning_rate: 0.25,
            epochs: nz(1),
            hidden: nz(32),
            seed: 0,
            threads: None,
        }
    }
}

impl RunConfig {
    /// Reads a JSON configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| OrchestraErr::io(path, e))?;
        serde_json::from_str(&raw).map_err(|source| OrchestraErr::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn threads(&self) -> NonZeroUsize {
        self.threads
            .or_else(|| thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// The knobs the distribution strategies work with.
    pub fn settings(&self) -> Settings {
        Settings {
            capacity: self.capacity,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            dump: self
                .image
                .as_ref()
                .map(|path| ImageDump::new(path, self.image_index)),
        }
    }

    /// What this configuration says about training, to be shared with peers.
    pub fn training_spec(&self) -> TrainingSpec {
        TrainingSpec {
            hidden: self.hidden.get(),
            seed: self.seed,
            batch_size: self.batch_size.get(),
            learning_rate: self.learning_rate,
            epochs: self.epochs.get(),
            capacity: self.capacity.get(),
        }
    }

    /// This configuration with its training knobs replaced by `spec`'s.
    ///
    /// Paths and thread counts stay local.
    pub fn with_training(&self, spec: TrainingSpec) -> Result<Self> {
        let count = |what: &str, n: usize| {
            NonZeroUsize::new(n).ok_or_else(|| OrchestraErr::Protocol(format!("received a {what} of 0")))
        };

        Ok(Self {
            hidden: count("hidden width", spec.hidden)?,
            seed: spec.seed,
            batch_size: count("batch size", spec.batch_size)?,
            learning_rate: spec.learning_rate,
            epochs: count("epoch count", spec.epochs)?,
            capacity: count("capacity", spec.capacity)?,
            ..self.clone()
        })
    }
}

/// Immutable execution bounds for a strategy.
#[derive(Debug, Clone)]
pub struct Settings {
    pub capacity: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub epochs: NonZeroUsize,
    pub dump: Option<ImageDump>,
}

impl Default for Settings {
    fn default() -> Self {
        RunConfig::default().settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_the_default() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.batch_size.get(), 1_000);
        assert_eq!(config.image_index, 16);
    }

    #[test]
    fn fields_override_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{ "batch_size": 50, "image": null, "threads": 3 }"#).unwrap();

        assert_eq!(config.batch_size.get(), 50);
        assert_eq!(config.threads().get(), 3);
        assert!(config.settings().dump.is_none());
        assert_eq!(config.learning_rate, 0.25);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(serde_json::from_str::<RunConfig>(r#"{ "batch_size": 0 }"#).is_err());
    }

    #[test]
    fn training_spec_replaces_only_training_knobs() {
        let coordinator = RunConfig {
            epochs: nz(5),
            seed: 3,
            hidden: nz(16),
            ..RunConfig::default()
        };
        let peer = RunConfig {
            output: "elsewhere.csv".into(),
            threads: Some(nz(2)),
            ..RunConfig::default()
        };

        let agreed = peer.with_training(coordinator.training_spec()).unwrap();
        assert_eq!(agreed.training_spec(), coordinator.training_spec());
        assert_eq!(agreed.output, peer.output);
        assert_eq!(agreed.threads, peer.threads);
    }

    #[test]
    fn zero_counts_in_a_training_spec_are_rejected() {
        let spec = TrainingSpec {
            epochs: 0,
            ..RunConfig::default().training_spec()
        };

        assert!(matches!(
            RunConfig::default().with_training(spec),
            Err(OrchestraErr::Protocol(_))
        ));
    }

    #[test]
    fn bad_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            RunConfig::from_json_file(&path),
            Err(OrchestraErr::Config { .. })
        ));
        assert!(matches!(
            RunConfig::from_json_file(dir.path().join("missing.json")),
            Err(OrchestraErr::Io { .. })
        ));
    }
}

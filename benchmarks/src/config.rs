use crate::datasets::DatasetDescriptor;
use crate::driver::DriverOptions;
use crate::error::BenchmarkError;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "KILT_BENCH";

/// Run parameters, layered as defaults, then an optional TOML file, then
/// `KILT_BENCH_*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub output_folder: PathBuf,
    pub topk: usize,
    pub debug: bool,
    pub worker_count: usize,
    pub emit_failed_queries: bool,
    pub show_progress: bool,
    pub slow_query_threshold_ms: u64,
    #[serde(default)]
    pub ranker: RankerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// JSONL corpus indexed by the default BM25 engine.
    pub corpus_path: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("predictions"),
            topk: 100,
            debug: false,
            worker_count: default_worker_count(),
            emit_failed_queries: false,
            show_progress: true,
            slow_query_threshold_ms: 5_000,
            ranker: RankerConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, BenchmarkError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("output_folder", defaults.output_folder.to_string_lossy().to_string())?
            .set_default("topk", defaults.topk as i64)?
            .set_default("debug", defaults.debug)?
            .set_default("worker_count", defaults.worker_count as i64)?
            .set_default("emit_failed_queries", defaults.emit_failed_queries)?
            .set_default("show_progress", defaults.show_progress)?
            .set_default("slow_query_threshold_ms", defaults.slow_query_threshold_ms as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchmarkError> {
        if self.topk == 0 {
            return Err(BenchmarkError::Config("topk must be at least 1".to_string()));
        }
        if self.worker_count == 0 {
            return Err(BenchmarkError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            output_folder: self.output_folder.clone(),
            topk: self.topk,
            debug: self.debug,
            emit_failed_queries: self.emit_failed_queries,
        }
    }

    pub fn to_toml(&self) -> Result<String, BenchmarkError> {
        toml::to_string_pretty(self).map_err(|e| BenchmarkError::Config(e.to_string()))
    }
}

pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Nested `task_family -> dataset_name -> file_path` mapping, flattened in
/// file order. A `null` or empty path marks a dataset that is not run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    pub datasets: Vec<DatasetDescriptor>,
}

impl TaskConfig {
    pub fn from_path(path: &Path) -> Result<Self, BenchmarkError> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchmarkError::io(path, e))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, BenchmarkError> {
        let families: Map<String, Value> = serde_json::from_str(content)?;
        let mut datasets = Vec::new();

        for (task_family, family_datasets) in families {
            let Value::Object(family_datasets) = family_datasets else {
                return Err(BenchmarkError::Config(format!(
                    "task family {} must map dataset names to file paths",
                    task_family
                )));
            };

            for (dataset_name, file_path) in family_datasets {
                let file_path = match file_path {
                    Value::Null => None,
                    Value::String(path) if path.trim().is_empty() => None,
                    Value::String(path) => Some(PathBuf::from(path)),
                    other => {
                        return Err(BenchmarkError::Config(format!(
                            "dataset {}/{} has a non-string file path: {}",
                            task_family, dataset_name, other
                        )))
                    }
                };

                datasets.push(DatasetDescriptor {
                    task_family: task_family.clone(),
                    dataset_name,
                    file_path,
                });
            }
        }

        Ok(Self { datasets })
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

use crate::config::TaskConfig;
use crate::datasets::{
    load_raw_data, DatapointValidator, DatasetDescriptor, KiltValidator, ValidatedDataset,
};
use crate::error::{BenchmarkError, PoolError};
use crate::ranker::{RankerPool, RankingEngine};
use crate::reporter::{build_prediction, PredictionWriter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Datasets run in debug mode only see this many queries.
pub const DEBUG_QUERY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    pub output_folder: PathBuf,
    pub topk: usize,
    pub debug: bool,
    /// Write records with empty provenance for queries the engine failed on.
    /// Off by default: failed queries are left out of the prediction file.
    pub emit_failed_queries: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("predictions"),
            topk: 100,
            debug: false,
            emit_failed_queries: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOutcome {
    /// The output file already existed; nothing was ranked.
    Skipped { output_file: PathBuf },
    Completed {
        output_file: PathBuf,
        records: usize,
        queries: usize,
        failed_queries: usize,
    },
    /// Ranking produced nothing to write; no output file was created.
    Empty { queries: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub task_family: String,
    pub dataset_name: String,
    pub outcome: DatasetOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub datasets: Vec<DatasetReport>,
}

impl RunSummary {
    pub fn completed(&self) -> impl Iterator<Item = &DatasetReport> {
        self.datasets
            .iter()
            .filter(|report| matches!(report.outcome, DatasetOutcome::Completed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DatasetReport> {
        self.datasets
            .iter()
            .filter(|report| matches!(report.outcome, DatasetOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &DatasetReport> {
        self.datasets
            .iter()
            .filter(|report| matches!(report.outcome, DatasetOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn outcome(&self, dataset_name: &str) -> Option<&DatasetOutcome> {
        self.datasets
            .iter()
            .find(|report| report.dataset_name == dataset_name)
            .map(|report| &report.outcome)
    }

    pub fn log(&self) {
        info!(
            "Run finished: {} completed, {} skipped, {} failed, {} total",
            self.completed().count(),
            self.skipped().count(),
            self.failed().count(),
            self.datasets.len()
        );
        for report in self.failed() {
            if let DatasetOutcome::Failed { error } = &report.outcome {
                error!(
                    "{}/{} failed: {}",
                    report.task_family, report.dataset_name, error
                );
            }
        }
    }
}

/// Walks the task configuration and runs every configured dataset through a
/// [`RankerPool`], one dataset at a time.
pub struct DatasetDriver<V = KiltValidator> {
    options: DriverOptions,
    validator: V,
}

impl DatasetDriver<KiltValidator> {
    pub fn with_options(options: DriverOptions) -> Self {
        Self::new(options, KiltValidator)
    }
}

impl<V: DatapointValidator> DatasetDriver<V> {
    pub fn new(options: DriverOptions, validator: V) -> Self {
        Self { options, validator }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Dataset-level failures are recorded in the summary and the loop moves on.
    /// Only a broken pool stops the run.
    pub async fn run<E: RankingEngine>(
        &self,
        tasks: &TaskConfig,
        pool: &mut RankerPool<E>,
    ) -> Result<RunSummary, PoolError> {
        let mut summary = RunSummary::default();
        let mut current_family: Option<&str> = None;

        for descriptor in &tasks.datasets {
            if current_family != Some(descriptor.task_family.as_str()) {
                info!("TASK: {}", descriptor.task_family);
                current_family = Some(descriptor.task_family.as_str());
            }
            info!("DATASET: {}", descriptor.dataset_name);

            if descriptor.file_path.is_none() {
                continue;
            }

            let outcome = match self.process_dataset(descriptor, pool).await {
                Ok(outcome) => outcome,
                Err(BenchmarkError::Pool(e)) => return Err(e),
                Err(e) => {
                    error!("Dataset {} failed: {}", descriptor.dataset_name, e);
                    DatasetOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            summary.datasets.push(DatasetReport {
                task_family: descriptor.task_family.clone(),
                dataset_name: descriptor.dataset_name.clone(),
                outcome,
            });
        }

        Ok(summary)
    }

    pub async fn process_dataset<E: RankingEngine>(
        &self,
        descriptor: &DatasetDescriptor,
        pool: &mut RankerPool<E>,
    ) -> Result<DatasetOutcome, BenchmarkError> {
        let Some(input_file) = descriptor.file_path.as_deref() else {
            return Ok(DatasetOutcome::Empty { queries: 0 });
        };
        let output_file = self.prepare_output_file(descriptor, input_file)?;

        if output_file.exists() {
            info!("Skip output file {} that already exists.", output_file.display());
            return Ok(DatasetOutcome::Skipped { output_file });
        }

        let raw_data = load_raw_data(input_file)?;
        let ValidatedDataset {
            mut datapoints,
            mut queries,
            ..
        } = ValidatedDataset::build(raw_data, &self.validator, input_file)?;

        if self.options.debug {
            queries.truncate(DEBUG_QUERY_LIMIT);
            info!("Debug mode: ranking the first {} queries", queries.len());
        }
        let submitted = queries.len();

        pool.feed_data(queries, self.options.topk);
        let provenance = pool.run().await?;

        if provenance.successful_len() != submitted {
            warn!(
                "{}: different numbers of queries: {} and predictions: {}",
                descriptor.dataset_name,
                submitted,
                provenance.successful_len()
            );
        }

        if provenance.is_empty() {
            warn!("{}: no predictions produced", descriptor.dataset_name);
            return Ok(DatasetOutcome::Empty { queries: submitted });
        }

        let failed_queries = provenance.failed_len();
        let mut predictions = Vec::with_capacity(provenance.len());
        for entry in provenance {
            let datapoint = datapoints
                .remove(&entry.query_id)
                .ok_or_else(|| BenchmarkError::UnknownQueryId(entry.query_id.clone()))?;
            if entry.failed && !self.options.emit_failed_queries {
                continue;
            }
            predictions.push(build_prediction(datapoint, &entry.provenance));
        }

        if predictions.is_empty() {
            warn!(
                "{}: all {} queries failed, nothing to write",
                descriptor.dataset_name, submitted
            );
            return Ok(DatasetOutcome::Empty { queries: submitted });
        }

        info!("writing prediction file to {}", output_file.display());
        let mut writer = PredictionWriter::create(&output_file)?;
        for prediction in &predictions {
            writer.write(prediction)?;
        }
        let records = writer.finish()?;

        Ok(DatasetOutcome::Completed {
            output_file,
            records,
            queries: submitted,
            failed_queries,
        })
    }

    fn prepare_output_file(
        &self,
        descriptor: &DatasetDescriptor,
        input_file: &Path,
    ) -> Result<PathBuf, BenchmarkError> {
        let output_file = descriptor
            .output_path(&self.options.output_folder)
            .ok_or_else(|| {
                BenchmarkError::Config(format!(
                    "dataset {} has no file name in {}",
                    descriptor.dataset_name,
                    input_file.display()
                ))
            })?;

        if let Some(parent) = output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| BenchmarkError::io(parent, e))?;
            }
        }

        Ok(output_file)
    }
}

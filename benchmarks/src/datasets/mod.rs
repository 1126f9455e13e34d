pub mod validation;

pub use validation::*;

use crate::error::BenchmarkError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A full source record. Every field is kept as read so that unknown fields
/// survive into the prediction file.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    record: Map<String, Value>,
}

impl Datapoint {
    /// Returns `None` unless the value is an object with string `id` and `input`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(record)
                if record.get("id").map_or(false, Value::is_string)
                    && record.get("input").map_or(false, Value::is_string) =>
            {
                Some(Self { record })
            }
            _ => None,
        }
    }

    pub fn id(&self) -> &str {
        self.record.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn input(&self) -> &str {
        self.record.get("input").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn output(&self) -> Option<&Vec<Value>> {
        self.record.get("output").and_then(Value::as_array)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.record
    }

    pub fn to_query(&self) -> Query {
        Query::new(self.id(), self.input())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub task_family: String,
    pub dataset_name: String,
    /// `None` means the dataset is listed but not configured for this run.
    pub file_path: Option<PathBuf>,
}

impl DatasetDescriptor {
    /// `output_folder` joined with the base name of the input file.
    pub fn output_path(&self, output_folder: &Path) -> Option<PathBuf> {
        let file_name = self.file_path.as_ref()?.file_name()?;
        Some(output_folder.join(file_name))
    }
}

/// Reads one JSON value per line. Blank lines are ignored.
pub fn load_raw_data(path: &Path) -> Result<Vec<Value>, BenchmarkError> {
    let file = File::open(path).map_err(|e| BenchmarkError::io(path, e))?;
    let reader = BufReader::new(file);
    let mut raw_data = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BenchmarkError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let value = serde_json::from_str(&line).map_err(|source| BenchmarkError::MalformedLine {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        raw_data.push(value);
    }

    debug!("Loaded {} raw datapoints from {}", raw_data.len(), path.display());
    Ok(raw_data)
}

/// The valid datapoints of one dataset, keyed by id, with the query batch in
/// source order. Lives only for the duration of one dataset's processing.
#[derive(Debug, Default)]
pub struct ValidatedDataset {
    pub datapoints: HashMap<String, Datapoint>,
    pub queries: Vec<Query>,
    pub discarded: usize,
}

impl ValidatedDataset {
    pub fn build<V>(
        raw_data: Vec<Value>,
        validator: &V,
        source: &Path,
    ) -> Result<Self, BenchmarkError>
    where
        V: DatapointValidator + ?Sized,
    {
        let mut dataset = ValidatedDataset::default();

        for element in raw_data {
            if !validator.is_valid(&element) {
                dataset.discarded += 1;
                continue;
            }
            let Some(datapoint) = Datapoint::from_value(element) else {
                dataset.discarded += 1;
                continue;
            };

            if dataset.datapoints.contains_key(datapoint.id()) {
                return Err(BenchmarkError::DuplicateQueryId {
                    id: datapoint.id().to_string(),
                    path: source.to_path_buf(),
                });
            }

            dataset.queries.push(datapoint.to_query());
            dataset
                .datapoints
                .insert(datapoint.id().to_string(), datapoint);
        }

        info!(
            "Validated {} datapoints ({} discarded) from {}",
            dataset.queries.len(),
            dataset.discarded,
            source.display()
        );
        Ok(dataset)
    }
}

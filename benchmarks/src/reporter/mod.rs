use crate::datasets::Datapoint;
use crate::error::BenchmarkError;
use crate::ranker::Provenance;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Replaces the datapoint's `output` with the predicted provenance followed by
/// its gold answers. All other fields pass through untouched.
pub fn build_prediction(datapoint: Datapoint, provenance: &[Provenance]) -> Value {
    let provenance: Vec<Value> = provenance
        .iter()
        .map(|entry| json!({ "document_id": entry.document_id }))
        .collect();
    let mut new_output = vec![json!({ "provenance": provenance })];

    if let Some(entries) = datapoint.output() {
        new_output.extend(
            entries
                .iter()
                .filter_map(|entry| entry.get("answer"))
                .map(|answer| json!({ "answer": answer })),
        );
    }

    let mut record: Map<String, Value> = datapoint.into_map();
    record.insert("output".to_string(), Value::Array(new_output));
    Value::Object(record)
}

/// Writes prediction records as JSON lines into a `.tmp` sibling of the target
/// path. Only [`PredictionWriter::finish`] moves the file into place, so the
/// target exists only once every record has been written. A writer dropped
/// before `finish` removes its temporary file.
pub struct PredictionWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl PredictionWriter {
    pub fn create(path: &Path) -> Result<Self, BenchmarkError> {
        let tmp_path = tmp_path_for(path);
        let file = File::create(&tmp_path).map_err(|e| BenchmarkError::io(&tmp_path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<(), BenchmarkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write_all(&line)
                .map_err(|e| BenchmarkError::io(&self.tmp_path, e))?;
        }
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered records, moves the file to its final path and returns
    /// how many records were written.
    pub fn finish(mut self) -> Result<usize, BenchmarkError> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| BenchmarkError::io(&self.tmp_path, e.into_error()))?;
            file.sync_all()
                .map_err(|e| BenchmarkError::io(&self.tmp_path, e))?;
        }
        fs::rename(&self.tmp_path, &self.path).map_err(|e| BenchmarkError::io(&self.path, e))?;
        debug!("Wrote {} records to {}", self.written, self.path.display());
        Ok(self.written)
    }
}

impl Drop for PredictionWriter {
    fn drop(&mut self) {
        drop(self.writer.take());
        if self.tmp_path.exists() {
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                warn!(
                    "Could not remove partial output {}: {}",
                    self.tmp_path.display(),
                    e
                );
            }
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

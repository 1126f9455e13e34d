#![allow(dead_code)]

use anyhow::anyhow;
use kilt_benchmarks::config::TaskConfig;
use kilt_benchmarks::{DatasetDescriptor, RankerPool, RankingEngine};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted engine shared by the driver tests. Unscripted queries get a single
/// document derived from the query text.
#[derive(Clone, Default)]
pub struct StubEngine {
    responses: Arc<HashMap<String, (Vec<String>, Vec<f32>)>>,
    failing: Arc<HashSet<String>>,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

#[derive(Default)]
pub struct StubEngineBuilder {
    responses: HashMap<String, (Vec<String>, Vec<f32>)>,
    failing: HashSet<String>,
}

impl StubEngineBuilder {
    pub fn respond(mut self, query: &str, doc_ids: &[&str], scores: &[f32]) -> Self {
        self.responses.insert(
            query.to_string(),
            (
                doc_ids.iter().map(|d| d.to_string()).collect(),
                scores.to_vec(),
            ),
        );
        self
    }

    pub fn fail_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn build(self) -> StubEngine {
        StubEngine {
            responses: Arc::new(self.responses),
            failing: Arc::new(self.failing),
            ..StubEngine::default()
        }
    }
}

impl StubEngine {
    pub fn builder() -> StubEngineBuilder {
        StubEngineBuilder::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl RankingEngine for StubEngine {
    fn closest(&mut self, query: &str, _topk: usize) -> anyhow::Result<(Vec<String>, Vec<f32>)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(query.to_string());

        if self.failing.contains(query) {
            return Err(anyhow!("ranking failed for {:?}", query));
        }
        if let Some((doc_ids, scores)) = self.responses.get(query) {
            return Ok((doc_ids.clone(), scores.clone()));
        }
        Ok((vec![format!("doc::{}", query)], vec![1.0]))
    }
}

/// Every worker gets a clone sharing the same counters.
pub fn stub_pool(engine: &StubEngine, worker_count: usize) -> RankerPool<StubEngine> {
    let engine = engine.clone();
    RankerPool::new(worker_count, move |_| Ok(engine.clone())).unwrap()
}

pub fn write_jsonl(path: &Path, records: &[Value]) {
    let content: String = records
        .iter()
        .map(|record| format!("{}\n", record))
        .collect();
    std::fs::write(path, content).unwrap();
}

pub fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

pub fn single_dataset(task_family: &str, dataset_name: &str, file_path: &Path) -> TaskConfig {
    TaskConfig {
        datasets: vec![DatasetDescriptor {
            task_family: task_family.to_string(),
            dataset_name: dataset_name.to_string(),
            file_path: Some(PathBuf::from(file_path)),
        }],
    }
}

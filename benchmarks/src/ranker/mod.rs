pub mod bm25;
pub mod pool;
mod worker;

pub use self::bm25::Bm25Engine;
pub use pool::{partition, RankerPool};
pub use worker::RankedQuery;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ENT_START: &str = "[START_ENT]";
pub const ENT_END: &str = "[END_ENT]";

/// A stateful document ranker. Each instance is owned by exactly one shard
/// worker, so implementations need `Send` but never `Sync`.
///
/// An `Err` from [`RankingEngine::closest`] is treated as a failure of that
/// single query only; the engine must remain usable for the next call.
pub trait RankingEngine: Send + 'static {
    /// Returns up to `topk` document ids with their scores, best first.
    fn closest(&mut self, query: &str, topk: usize) -> Result<(Vec<String>, Vec<f32>)>;
}

impl<E: RankingEngine + ?Sized> RankingEngine for Box<E> {
    fn closest(&mut self, query: &str, topk: usize) -> Result<(Vec<String>, Vec<f32>)> {
        (**self).closest(query, topk)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub document_id: String,
}

impl Provenance {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryProvenance {
    pub query_id: String,
    pub provenance: Vec<Provenance>,
    /// The engine raised for this query; `provenance` is empty.
    pub failed: bool,
}

impl From<RankedQuery> for QueryProvenance {
    fn from(ranked: RankedQuery) -> Self {
        let provenance = ranked
            .doc_ids
            .iter()
            .map(|doc_id| Provenance::new(doc_id.trim()))
            .collect();

        Self {
            query_id: ranked.query_id,
            provenance,
            failed: ranked.failed,
        }
    }
}

/// Merged pool output keyed by query id. Iteration follows insertion order,
/// which the pool makes equal to submission order.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    entries: Vec<QueryProvenance>,
    index: HashMap<String, usize>,
}

impl QueryResult {
    /// Inserts an entry, replacing any previous entry for the same query id.
    pub fn insert(&mut self, entry: QueryProvenance) {
        match self.index.get(&entry.query_id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.index.insert(entry.query_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, query_id: &str) -> Option<&QueryProvenance> {
        self.index.get(query_id).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, query_id: &str) -> bool {
        self.index.contains_key(query_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queries the engine answered without raising.
    pub fn successful_len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.failed).count()
    }

    pub fn failed_len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.failed).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryProvenance> {
        self.entries.iter()
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.query_id.as_str())
    }
}

impl IntoIterator for QueryResult {
    type Item = QueryProvenance;
    type IntoIter = std::vec::IntoIter<QueryProvenance>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<QueryProvenance> for QueryResult {
    fn from_iter<I: IntoIterator<Item = QueryProvenance>>(iter: I) -> Self {
        let mut result = QueryResult::default();
        for entry in iter {
            result.insert(entry);
        }
        result
    }
}

/// Strips entity markers from a query before it reaches an engine.
pub fn normalize_query(text: &str) -> String {
    text.replace(ENT_END, "").replace(ENT_START, "").trim().to_string()
}

//! Default ranking engine: BM25 over a JSONL corpus held in memory.
//!
//! Corpus lines are either `{"id": ..., "text": ...}` or the BEIR layout
//! `{"_id": ..., "title": ..., "text": ...}`. The title, when present, is
//! indexed together with the text.

use super::RankingEngine;
use ::bm25::{Document, Language, SearchEngine, SearchEngineBuilder};
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

pub struct Bm25Engine {
    search_engine: SearchEngine<String>,
    document_count: usize,
}

impl Bm25Engine {
    pub fn from_documents<I, S, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let documents: Vec<Document<String>> = documents
            .into_iter()
            .map(|(id, contents)| Document {
                id: id.into(),
                contents: contents.into(),
            })
            .collect();
        let document_count = documents.len();
        let search_engine =
            SearchEngineBuilder::<String>::with_documents(Language::English, documents).build();

        Self {
            search_engine,
            document_count,
        }
    }

    pub fn from_corpus_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open corpus file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut documents = Vec::new();
        let mut skipped = 0usize;

        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let doc_data: serde_json::Value = serde_json::from_str(&line).with_context(|| {
                format!("Malformed corpus line {} in {}", index + 1, path.display())
            })?;

            match corpus_entry(&doc_data) {
                Some(entry) => documents.push(entry),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!("Skipped {} corpus lines without id or text", skipped);
        }
        if documents.is_empty() {
            return Err(anyhow!("Corpus {} contains no documents", path.display()));
        }

        let engine = Self::from_documents(documents);
        info!(
            "Indexed {} documents from {}",
            engine.document_count,
            path.display()
        );
        Ok(engine)
    }

    pub fn len(&self) -> usize {
        self.document_count
    }

    pub fn is_empty(&self) -> bool {
        self.document_count == 0
    }
}

fn corpus_entry(doc_data: &serde_json::Value) -> Option<(String, String)> {
    let id = match doc_data.get("id").or_else(|| doc_data.get("_id"))? {
        serde_json::Value::String(id) => id.clone(),
        serde_json::Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let text = doc_data["text"].as_str()?;

    let contents = match doc_data["title"].as_str() {
        Some(title) if !title.is_empty() => format!("{} {}", title, text),
        _ => text.to_string(),
    };
    Some((id, contents))
}

impl RankingEngine for Bm25Engine {
    fn closest(&mut self, query: &str, topk: usize) -> Result<(Vec<String>, Vec<f32>)> {
        if query.trim().is_empty() {
            bail!("Empty query");
        }

        Ok(self
            .search_engine
            .search(query, topk)
            .into_iter()
            .map(|result| (result.document.id, result.score))
            .unzip())
    }
}

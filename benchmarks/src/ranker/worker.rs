use super::{normalize_query, RankingEngine};
use crate::datasets::Query;
use indicatif::ProgressBar;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Output of one query inside a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedQuery {
    pub query_id: String,
    pub doc_ids: Vec<String>,
    pub scores: Vec<f32>,
    pub failed: bool,
}

impl RankedQuery {
    fn failed(query_id: String) -> Self {
        Self {
            query_id,
            doc_ids: Vec::new(),
            scores: Vec::new(),
            failed: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub topk: usize,
    pub slow_query_threshold: Duration,
}

/// One engine plus the shard currently assigned to it.
pub(crate) struct ShardWorker<E> {
    index: usize,
    engine: E,
    shard: Vec<Query>,
}

impl<E: RankingEngine> ShardWorker<E> {
    pub fn new(index: usize, engine: E) -> Self {
        Self {
            index,
            engine,
            shard: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn assign(&mut self, shard: Vec<Query>) {
        self.shard = shard;
    }

    pub fn shard_len(&self) -> usize {
        self.shard.len()
    }

    /// Ranks every query of the assigned shard in order, consuming the shard.
    /// A query whose engine call errors or panics yields an empty, failed entry.
    pub fn process(
        &mut self,
        settings: &WorkerSettings,
        progress: &ProgressBar,
    ) -> Vec<RankedQuery> {
        let shard = std::mem::take(&mut self.shard);
        let mut ranked = Vec::with_capacity(shard.len());
        debug!(worker = self.index, queries = shard.len(), "Processing shard");

        for query in shard {
            let text = normalize_query(&query.text);
            let engine = &mut self.engine;
            let started = Instant::now();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| engine.closest(&text, settings.topk)));
            let elapsed = started.elapsed();

            if elapsed > settings.slow_query_threshold {
                warn!(
                    worker = self.index,
                    query_id = %query.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow ranking call"
                );
            }

            let entry = match outcome {
                Ok(Ok((mut doc_ids, mut scores))) => {
                    doc_ids.truncate(settings.topk);
                    scores.truncate(settings.topk);
                    RankedQuery {
                        query_id: query.id,
                        doc_ids,
                        scores,
                        failed: false,
                    }
                }
                Ok(Err(e)) => {
                    warn!(worker = self.index, query_id = %query.id, "RuntimeError: {:#}", e);
                    RankedQuery::failed(query.id)
                }
                Err(payload) => {
                    warn!(
                        worker = self.index,
                        query_id = %query.id,
                        "Ranking engine panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    RankedQuery::failed(query.id)
                }
            };

            ranked.push(entry);
            progress.inc(1);
        }

        ranked
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::thread;

    struct EchoEngine {
        calls: Vec<String>,
    }

    impl RankingEngine for EchoEngine {
        fn closest(
            &mut self,
            query: &str,
            topk: usize,
        ) -> anyhow::Result<(Vec<String>, Vec<f32>)> {
            self.calls.push(query.to_string());
            match query {
                "boom" => Err(anyhow!("index lookup failed")),
                "panic" => panic!("engine state exploded"),
                "slow" => {
                    thread::sleep(Duration::from_millis(5));
                    Ok((vec!["slow-0".to_string()], vec![1.0]))
                }
                _ => Ok((
                    (0..topk + 2).map(|i| format!("{}-{}", query, i)).collect(),
                    (0..topk + 2).map(|i| 1.0 / (i as f32 + 1.0)).collect(),
                )),
            }
        }
    }

    fn settings(topk: usize) -> WorkerSettings {
        WorkerSettings {
            topk,
            slow_query_threshold: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_failed_queries_do_not_stop_the_shard() {
        let mut worker = ShardWorker::new(0, EchoEngine { calls: Vec::new() });
        worker.assign(vec![
            Query::new("q1", "alpha"),
            Query::new("q2", "boom"),
            Query::new("q3", "panic"),
            Query::new("q4", "omega"),
        ]);

        let ranked = worker.process(&settings(1), &ProgressBar::hidden());

        assert_eq!(ranked.len(), 4);
        assert!(!ranked[0].failed);
        assert!(ranked[1].failed && ranked[1].doc_ids.is_empty());
        assert!(ranked[2].failed && ranked[2].doc_ids.is_empty());
        assert_eq!(ranked[3].doc_ids, vec!["omega-0".to_string()]);
        assert_eq!(worker.engine.calls, vec!["alpha", "boom", "panic", "omega"]);
        assert_eq!(worker.shard_len(), 0);
    }

    #[test]
    fn test_results_are_truncated_to_topk() {
        let mut worker = ShardWorker::new(3, EchoEngine { calls: Vec::new() });
        worker.assign(vec![Query::new("q1", "[START_ENT] alpha [END_ENT]")]);

        let ranked = worker.process(&settings(2), &ProgressBar::hidden());

        assert_eq!(ranked[0].doc_ids, vec!["alpha-0", "alpha-1"]);
        assert_eq!(ranked[0].scores.len(), 2);
        assert_eq!(worker.engine.calls, vec!["alpha"]);
    }

    #[test]
    fn test_slow_calls_are_reported_but_kept() {
        let mut worker = ShardWorker::new(1, EchoEngine { calls: Vec::new() });
        worker.assign(vec![Query::new("q1", "slow"), Query::new("q2", "boom")]);
        let settings = WorkerSettings {
            topk: 3,
            slow_query_threshold: Duration::ZERO,
        };

        let ranked = worker.process(&settings, &ProgressBar::hidden());

        assert_eq!(ranked.len(), 2);
        assert!(!ranked[0].failed);
        assert_eq!(ranked[0].doc_ids, vec!["slow-0"]);
        assert!(ranked[1].failed);
    }
}

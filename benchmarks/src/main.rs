use anyhow::{Context, Result};
use clap::Parser;
use kilt_benchmarks::config::{BenchmarkConfig, TaskConfig};
use kilt_benchmarks::driver::DatasetDriver;
use kilt_benchmarks::ranker::{Bm25Engine, RankerPool};
use kilt_benchmarks::telemetry::{self, TelemetryConfig};
use kilt_benchmarks::KiltValidator;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "benchmark")]
#[command(about = "Run a retrieval benchmark over KILT-style task datasets")]
struct Args {
    /// JSON file mapping task families to datasets to input files
    #[arg(short, long)]
    tasks: PathBuf,

    /// TOML file with run parameters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSONL corpus for the BM25 ranker
    #[arg(long)]
    corpus: Option<PathBuf>,

    #[arg(short, long)]
    output_folder: Option<PathBuf>,

    /// Maximum provenance entries per query
    #[arg(long)]
    topk: Option<usize>,

    /// Number of ranking workers (capped at available parallelism)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Only rank the first 10 queries of each dataset
    #[arg(long)]
    debug: bool,

    /// Write failed queries with empty provenance instead of omitting them
    #[arg(long)]
    emit_failed: bool,

    #[arg(long)]
    no_progress: bool,

    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut BenchmarkConfig) {
        if let Some(corpus) = &self.corpus {
            config.ranker.corpus_path = Some(corpus.clone());
        }
        if let Some(output_folder) = &self.output_folder {
            config.output_folder = output_folder.clone();
        }
        if let Some(topk) = self.topk {
            config.topk = topk;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        config.debug |= self.debug;
        config.emit_failed_queries |= self.emit_failed;
        config.show_progress &= !self.no_progress;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    telemetry::init_telemetry(
        TelemetryConfig::from_env("kilt-benchmark").with_json(args.json_logs),
    )?;

    let mut config = BenchmarkConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let tasks = TaskConfig::from_path(&args.tasks)?;
    info!(
        "Loaded {} datasets from {}",
        tasks.len(),
        args.tasks.display()
    );

    let corpus = config
        .ranker
        .corpus_path
        .clone()
        .context("No corpus configured; pass --corpus or set ranker.corpus_path")?;

    // Every worker indexes its own copy of the corpus.
    let worker_count = config.worker_count;
    let pool = tokio::task::spawn_blocking(move || {
        RankerPool::new(worker_count, |_| Bm25Engine::from_corpus_file(&corpus))
    })
    .await??;
    let mut pool = pool
        .with_progress(config.show_progress)
        .with_slow_query_threshold(config.slow_query_threshold());

    let driver = DatasetDriver::new(config.driver_options(), KiltValidator);
    let summary = driver.run(&tasks, &mut pool).await?;
    summary.log();

    if summary.has_failures() {
        anyhow::bail!("{} dataset(s) failed", summary.failed().count());
    }

    Ok(())
}

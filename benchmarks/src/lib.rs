pub mod config;
pub mod datasets;
pub mod driver;
pub mod error;
pub mod ranker;
pub mod reporter;
pub mod telemetry;

pub use self::config::{BenchmarkConfig, TaskConfig};
pub use datasets::{DatasetDescriptor, Datapoint, DatapointValidator, KiltValidator, Query};
pub use driver::{DatasetDriver, DatasetOutcome, DriverOptions, RunSummary};
pub use error::{BenchmarkError, PoolError};
pub use ranker::{Provenance, QueryResult, RankerPool, RankingEngine};
pub use reporter::PredictionWriter;

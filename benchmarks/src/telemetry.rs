use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json: bool,
    /// Used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        let json = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            service_name: service_name.to_string(),
            json,
            default_filter: "info".to_string(),
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = self.json || json;
        self
    }
}

/// Installs the global subscriber, writing to stderr alongside the progress bar.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!("Telemetry initialized for {}", config.service_name);
    Ok(())
}

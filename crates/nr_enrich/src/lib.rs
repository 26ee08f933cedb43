use std::sync::Arc;

use nr_core::{Enricher, Error, Result};

pub mod heuristic;
pub mod remote;

pub use heuristic::HeuristicEnricher;
pub use remote::RemoteEnricher;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// Enricher factory keyed by name, used by the CLI.
pub fn create_enricher(kind: &str, config: Config) -> Result<Arc<dyn Enricher>> {
    match kind {
        "heuristic" => Ok(Arc::new(HeuristicEnricher::new())),
        "remote" => Ok(Arc::new(RemoteEnricher::new(
            config.api_key,
            config.base_url,
            config.model,
        )?)),
        other => Err(Error::Enrichment(format!("unknown enricher: {}", other))),
    }
}

pub mod prelude {
    pub use super::{create_enricher, Config, HeuristicEnricher, RemoteEnricher};
    pub use nr_core::{Enricher, Enrichment, Sentiment};
}

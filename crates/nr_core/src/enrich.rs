use async_trait::async_trait;

use crate::types::Enrichment;

/// Turns raw article text into summary, category, sentiment and tags.
///
/// Implementations degrade per-field instead of failing: a default value
/// for every field is part of the contract, which is why `enrich` does not
/// return a `Result`.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(&self, text: &str) -> Enrichment;
}

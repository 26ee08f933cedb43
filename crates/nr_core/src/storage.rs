use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Article, FeedSource, PipelineRun, RawArticle};
use crate::Result;

/// Dedup ledger for raw articles plus per-feed fetch checkpoints. The
/// unique key on url is the only deduplication mechanism; there is no
/// content hashing.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Whether a raw article with this url has been staged before.
    async fn is_known(&self, url: &str) -> Result<bool>;

    /// Insert-if-absent keyed on url. Returns false when the url was
    /// already staged; a duplicate call is a no-op, never an error.
    async fn stage(&self, article: &RawArticle) -> Result<bool>;

    /// Upsert the last successful fetch timestamp for a feed.
    async fn checkpoint(&self, feed_url: &str, fetched_at: DateTime<Utc>) -> Result<()>;

    async fn checkpoints(&self) -> Result<Vec<FeedSource>>;

    /// Staged articles with no published counterpart, oldest first.
    async fn pending(&self, limit: usize) -> Result<Vec<RawArticle>>;
}

/// Published-article store. Insertion is insert-if-absent on url so that
/// concurrent runs racing on the same article resolve to a no-op rather
/// than an error.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Returns false when an article with this url already exists.
    async fn insert(&self, article: &Article) -> Result<bool>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>>;

    /// Published articles, newest first.
    async fn list_recent(&self, skip: usize, limit: usize) -> Result<Vec<Article>>;

    /// Atomic vote counter increment. Returns false for an unknown url.
    async fn record_vote(&self, url: &str, upvote: bool) -> Result<bool>;

    /// Atomic view counter increment. Returns false for an unknown url.
    async fn record_view(&self, url: &str) -> Result<bool>;
}

/// Append-only audit log of pipeline runs.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn append(&self, run: &PipelineRun) -> Result<()>;

    /// Most recent runs, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>>;
}

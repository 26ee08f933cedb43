use async_trait::async_trait;

use crate::types::RawArticle;
use crate::Result;

/// Fetches and parses one feed into raw article candidates. A failure
/// covers the whole feed; the orchestrator isolates it from other feeds.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<RawArticle>>;
}

#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub content: String,
    pub image_url: Option<String>,
}

/// Best-effort full-text extraction for articles whose feed entry carried
/// no body. Timeouts and non-2xx responses are errors the caller treats as
/// a per-article failure.
#[async_trait]
pub trait ContentScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage>;
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nr_core::{
    Article, ArticleStore, FeedSource, PipelineRun, RawArticle, Result, RunLog, StagingStore,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryInner {
    feeds: HashMap<String, DateTime<Utc>>,
    raw_articles: Vec<RawArticle>,
    articles: Vec<Article>,
    runs: Vec<PipelineRun>,
}

/// In-memory document store. The default backend, and the substrate the
/// pipeline tests run against.
pub struct MemoryStorage {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner::default())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StagingStore for MemoryStorage {
    async fn is_known(&self, url: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.raw_articles.iter().any(|a| a.url == url))
    }

    async fn stage(&self, article: &RawArticle) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.raw_articles.iter().any(|a| a.url == article.url) {
            return Ok(false);
        }
        inner.raw_articles.push(article.clone());
        Ok(true)
    }

    async fn checkpoint(&self, feed_url: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.feeds.insert(feed_url.to_string(), fetched_at);
        Ok(())
    }

    async fn checkpoints(&self) -> Result<Vec<FeedSource>> {
        let inner = self.inner.read().await;
        let mut feeds: Vec<FeedSource> = inner
            .feeds
            .iter()
            .map(|(url, last_fetched_at)| FeedSource {
                url: url.clone(),
                last_fetched_at: *last_fetched_at,
            })
            .collect();
        feeds.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(feeds)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<RawArticle>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<RawArticle> = inner
            .raw_articles
            .iter()
            .filter(|raw| !inner.articles.iter().any(|a| a.url == raw.url))
            .cloned()
            .collect();
        pending.sort_by_key(|raw| raw.created_at);
        pending.truncate(limit);
        Ok(pending)
    }
}

#[async_trait]
impl ArticleStore for MemoryStorage {
    async fn insert(&self, article: &Article) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.articles.iter().any(|a| a.url == article.url) {
            return Ok(false);
        }
        inner.articles.push(article.clone());
        Ok(true)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let inner = self.inner.read().await;
        Ok(inner.articles.iter().find(|a| a.url == url).cloned())
    }

    async fn list_recent(&self, skip: usize, limit: usize) -> Result<Vec<Article>> {
        let inner = self.inner.read().await;
        let mut articles = inner.articles.clone();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(articles.into_iter().skip(skip).take(limit).collect())
    }

    async fn record_vote(&self, url: &str, upvote: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.articles.iter_mut().find(|a| a.url == url) {
            Some(article) => {
                if upvote {
                    article.upvotes += 1;
                } else {
                    article.downvotes += 1;
                }
                article.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_view(&self, url: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.articles.iter_mut().find(|a| a.url == url) {
            Some(article) => {
                article.views += 1;
                article.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RunLog for MemoryStorage {
    async fn append(&self, run: &PipelineRun) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.runs.push(run.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let inner = self.inner.read().await;
        Ok(inner.runs.iter().rev().take(limit).cloned().collect())
    }
}

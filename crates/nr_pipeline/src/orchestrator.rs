use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use nr_core::{
    Article, ArticleStore, ContentScraper, Enricher, FeedFetcher, PipelineRun, RawArticle,
    Result, RunLog, StagingStore,
};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

const SYSTEM_AUTHOR: &str = "system";

/// Aggregate counts for one pipeline run, mirrored into the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: u64,
    pub processed: u64,
    pub nlp_success: u64,
    pub nlp_fail: u64,
}

enum Outcome {
    Published,
    /// Idempotency re-check hit, or a duplicate-key race lost. A no-op,
    /// not a failure.
    AlreadyPublished,
    Failed,
}

/// The ingestion state machine: fan out feed fetches, stage new raw
/// articles, process them under a concurrency bound, log one audit record.
///
/// Owns the RawArticle → Article transition exclusively; nothing else
/// writes pipeline articles.
pub struct Pipeline {
    staging: Arc<dyn StagingStore>,
    articles: Arc<dyn ArticleStore>,
    runs: Arc<dyn RunLog>,
    fetcher: Arc<dyn FeedFetcher>,
    scraper: Arc<dyn ContentScraper>,
    enricher: Arc<dyn Enricher>,
    semaphore: Arc<Semaphore>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        staging: Arc<dyn StagingStore>,
        articles: Arc<dyn ArticleStore>,
        runs: Arc<dyn RunLog>,
        fetcher: Arc<dyn FeedFetcher>,
        scraper: Arc<dyn ContentScraper>,
        enricher: Arc<dyn Enricher>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            staging,
            articles,
            runs,
            fetcher,
            scraper,
            enricher,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// One full cycle over the feed list. Always logs exactly one run
    /// record, even when nothing was fetched or everything failed.
    pub async fn run(&self, feeds: &[String]) -> Result<RunSummary> {
        info!("🔄 Pipeline run over {} feeds", feeds.len());

        let feed_futures: Vec<_> = feeds
            .iter()
            .map(|feed_url| self.fetch_and_stage(feed_url))
            .collect();
        let staged_per_feed = join_all(feed_futures).await;

        let mut fetched = 0u64;
        let mut new_articles = Vec::new();
        for (feed_fetched, mut staged) in staged_per_feed {
            fetched += feed_fetched;
            new_articles.append(&mut staged);
        }

        let outcome_futures: Vec<_> = new_articles
            .into_iter()
            .map(|raw| self.process_with_permit(raw))
            .collect();
        let outcomes = join_all(outcome_futures).await;

        self.finish_run(fetched, outcomes).await
    }

    /// Re-run staged articles that never made it into the published set.
    /// Uses the same per-article path and logs the batch as a run.
    pub async fn replay(&self, limit: usize) -> Result<RunSummary> {
        let pending = self.staging.pending(limit).await?;
        info!("🔁 Replaying {} pending articles", pending.len());

        let outcome_futures: Vec<_> = pending
            .into_iter()
            .map(|raw| self.process_with_permit(raw))
            .collect();
        let outcomes = join_all(outcome_futures).await;

        self.finish_run(0, outcomes).await
    }

    /// FETCHING + STAGING for a single feed, isolated from its siblings.
    /// Returns (items seen, newly staged).
    async fn fetch_and_stage(&self, feed_url: &str) -> (u64, Vec<RawArticle>) {
        let candidates = match self.fetcher.fetch(feed_url).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("❌ feed {} failed: {}", feed_url, e);
                return (0, Vec::new());
            }
        };
        let fetched = candidates.len() as u64;

        let mut staged = Vec::new();
        for candidate in candidates {
            match self.staging.stage(&candidate).await {
                Ok(true) => staged.push(candidate),
                // Seen in an earlier run, or earlier in this one.
                Ok(false) => {}
                Err(e) => warn!("failed to stage {}: {}", candidate.url, e),
            }
        }

        // The checkpoint moves after every successful fetch, new items or
        // not; a stale checkpoint therefore means the feed itself cannot
        // be polled.
        if let Err(e) = self.staging.checkpoint(feed_url, Utc::now()).await {
            warn!("failed to checkpoint {}: {}", feed_url, e);
        }

        info!("✅ {}: {} items, {} new", feed_url, fetched, staged.len());
        (fetched, staged)
    }

    async fn process_with_permit(&self, raw: RawArticle) -> Outcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            // The semaphore is never closed while the pipeline is alive.
            Err(_) => return Outcome::Failed,
        };
        self.process_raw_article(raw).await
    }

    /// PROCESSING for one staged article: idempotency re-check, scrape
    /// when the feed carried no body, enrich, publish.
    async fn process_raw_article(&self, mut raw: RawArticle) -> Outcome {
        match self.articles.find_by_url(&raw.url).await {
            Ok(Some(_)) => return Outcome::AlreadyPublished,
            Ok(None) => {}
            Err(e) => {
                warn!("idempotency check failed for {}: {}", raw.url, e);
                return Outcome::Failed;
            }
        }

        if raw.content.trim().is_empty() {
            match self.scraper.scrape(&raw.url).await {
                Ok(page) => {
                    raw.content = page.content;
                    if raw.image_url.is_none() {
                        raw.image_url = page.image_url;
                    }
                }
                Err(e) => {
                    warn!("scrape failed for {}: {}", raw.url, e);
                    return Outcome::Failed;
                }
            }
            if raw.content.trim().is_empty() {
                warn!("no content extracted from {}", raw.url);
                return Outcome::Failed;
            }
        }

        let enrichment = self.enricher.enrich(&raw.content).await;

        let now = Utc::now();
        let article = Article {
            url: raw.url.clone(),
            title: raw.title,
            summary: enrichment.summary,
            content: raw.content,
            category: enrichment.category,
            tags: enrichment.tags,
            sentiment: enrichment.sentiment,
            image_url: raw.image_url,
            source_url: raw.url,
            author: SYSTEM_AUTHOR.to_string(),
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            views: 0,
            created_at: now,
            updated_at: now,
        };

        match self.articles.insert(&article).await {
            Ok(true) => {
                info!("📰 Published {}", article.url);
                Outcome::Published
            }
            // A concurrent run won the duplicate-key race.
            Ok(false) => Outcome::AlreadyPublished,
            Err(e) => {
                error!("failed to insert article {}: {}", article.url, e);
                Outcome::Failed
            }
        }
    }

    /// LOGGING: aggregate outcomes and append the audit record.
    async fn finish_run(&self, fetched: u64, outcomes: Vec<Outcome>) -> Result<RunSummary> {
        let mut summary = RunSummary {
            fetched,
            processed: outcomes.len() as u64,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Published => summary.nlp_success += 1,
                Outcome::Failed => summary.nlp_fail += 1,
                Outcome::AlreadyPublished => {}
            }
        }

        let run = PipelineRun {
            timestamp: Utc::now(),
            fetched: summary.fetched,
            processed: summary.processed,
            nlp_success: summary.nlp_success,
            nlp_fail: summary.nlp_fail,
        };
        if let Err(e) = self.runs.append(&run).await {
            error!("failed to append run record: {}", e);
        }

        info!(
            "📊 Run summary: fetched={} processed={} nlp_success={} nlp_fail={}",
            summary.fetched, summary.processed, summary.nlp_success, summary.nlp_fail
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nr_core::{Enrichment, Error, ScrapedPage, Sentiment};
    use nr_storage::MemoryStorage;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn raw(url: &str) -> RawArticle {
        RawArticle {
            url: url.to_string(),
            title: format!("Article {}", url),
            summary: "teaser".to_string(),
            content: String::new(),
            published_at: None,
            source: "Test Feed".to_string(),
            tags: vec![],
            image_url: None,
            created_at: Utc::now(),
        }
    }

    fn published(url: &str) -> Article {
        let now = Utc::now();
        Article {
            url: url.to_string(),
            title: format!("Article {}", url),
            summary: "summary".to_string(),
            content: "body".to_string(),
            category: "General".to_string(),
            tags: vec![],
            sentiment: Sentiment::Neutral,
            image_url: None,
            source_url: url.to_string(),
            author: "system".to_string(),
            upvotes: 0,
            downvotes: 0,
            comments_count: 0,
            views: 0,
            created_at: now,
            updated_at: now,
        }
    }

    struct StaticFetcher {
        feeds: HashMap<String, Vec<RawArticle>>,
        failing: HashSet<String>,
    }

    impl StaticFetcher {
        fn new() -> Self {
            Self {
                feeds: HashMap::new(),
                failing: HashSet::new(),
            }
        }

        fn with_feed(mut self, url: &str, items: Vec<RawArticle>) -> Self {
            self.feeds.insert(url.to_string(), items);
            self
        }

        fn with_failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl FeedFetcher for StaticFetcher {
        async fn fetch(&self, feed_url: &str) -> Result<Vec<RawArticle>> {
            if self.failing.contains(feed_url) {
                return Err(Error::Feed(format!("{} unreachable", feed_url)));
            }
            Ok(self.feeds.get(feed_url).cloned().unwrap_or_default())
        }
    }

    struct StaticScraper;

    #[async_trait]
    impl ContentScraper for StaticScraper {
        async fn scrape(&self, _url: &str) -> Result<ScrapedPage> {
            Ok(ScrapedPage {
                content: "Scraped body text.".to_string(),
                image_url: Some("https://cdn.example/scraped.jpg".to_string()),
            })
        }
    }

    struct FailingScraper;

    #[async_trait]
    impl ContentScraper for FailingScraper {
        async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
            Err(Error::Scraping(format!("{} timed out", url)))
        }
    }

    struct StaticEnricher;

    #[async_trait]
    impl Enricher for StaticEnricher {
        fn name(&self) -> &str {
            "static"
        }

        async fn enrich(&self, text: &str) -> Enrichment {
            Enrichment {
                summary: text.chars().take(50).collect(),
                category: "General".to_string(),
                sentiment: Sentiment::Neutral,
                tags: vec!["test".to_string()],
            }
        }
    }

    /// Tracks how many enrichments run at once so tests can assert the
    /// semaphore bound.
    struct CountingEnricher {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl CountingEnricher {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Enricher for CountingEnricher {
        fn name(&self) -> &str {
            "counting"
        }

        async fn enrich(&self, _text: &str) -> Enrichment {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Enrichment {
                summary: String::new(),
                category: "General".to_string(),
                sentiment: Sentiment::Neutral,
                tags: vec![],
            }
        }
    }

    fn pipeline_with(
        storage: Arc<MemoryStorage>,
        fetcher: Arc<dyn FeedFetcher>,
        scraper: Arc<dyn ContentScraper>,
        enricher: Arc<dyn Enricher>,
        max_concurrent: usize,
    ) -> Pipeline {
        Pipeline::new(
            storage.clone(),
            storage.clone(),
            storage,
            fetcher,
            scraper,
            enricher,
            max_concurrent,
        )
    }

    #[tokio::test]
    async fn end_to_end_first_run_then_incremental_run() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();

        let fetcher = StaticFetcher::new().with_feed(
            &feed,
            vec![raw("http://a"), raw("http://b"), raw("http://c")],
        );
        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(fetcher),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed.clone()]).await.unwrap();
        assert_eq!(
            summary,
            RunSummary { fetched: 3, processed: 3, nlp_success: 3, nlp_fail: 0 }
        );
        assert!(storage.find_by_url("http://a").await.unwrap().is_some());
        assert_eq!(storage.list_recent(0, 10).await.unwrap().len(), 3);

        // Same feed again, now with one new entry: only D is processed.
        let fetcher = StaticFetcher::new().with_feed(
            &feed,
            vec![raw("http://a"), raw("http://b"), raw("http://c"), raw("http://d")],
        );
        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(fetcher),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(
            summary,
            RunSummary { fetched: 4, processed: 1, nlp_success: 1, nlp_fail: 0 }
        );
        assert_eq!(storage.list_recent(0, 10).await.unwrap().len(), 4);
        assert_eq!(storage.recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rerun_on_unchanged_feed_publishes_nothing() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();
        let items = vec![raw("http://a"), raw("http://b")];

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, items.clone())),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );
        pipeline.run(&[feed.clone()]).await.unwrap();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, items)),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );
        let summary = pipeline.run(&[feed]).await.unwrap();

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.nlp_success, 0);
        assert_eq!(storage.list_recent(0, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_entries_in_one_feed_stage_once() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, vec![raw("http://a"), raw("http://a")])),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.nlp_success, 1);
    }

    #[tokio::test]
    async fn one_unreachable_feed_does_not_poison_the_rest() {
        let storage = Arc::new(MemoryStorage::new());
        let good = "https://good.example/rss".to_string();
        let bad = "https://bad.example/rss".to_string();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(
                StaticFetcher::new()
                    .with_feed(&good, vec![raw("http://a"), raw("http://b")])
                    .with_failing(&bad),
            ),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[good.clone(), bad.clone()]).await.unwrap();
        assert_eq!(
            summary,
            RunSummary { fetched: 2, processed: 2, nlp_success: 2, nlp_fail: 0 }
        );

        // Only the reachable feed gets a checkpoint.
        let checkpoints = storage.checkpoints().await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].url, good);
    }

    #[tokio::test]
    async fn checkpoint_moves_forward_even_when_nothing_is_new() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();
        let items = vec![raw("http://a")];

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, items.clone())),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );
        pipeline.run(&[feed.clone()]).await.unwrap();
        let first = storage.checkpoints().await.unwrap()[0].last_fetched_at;

        tokio::time::sleep(Duration::from_millis(5)).await;

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, items)),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );
        pipeline.run(&[feed]).await.unwrap();
        let second = storage.checkpoints().await.unwrap()[0].last_fetched_at;

        assert!(second > first);
    }

    #[tokio::test]
    async fn scrape_failure_counts_as_nlp_fail_and_leaves_article_pending() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, vec![raw("http://a")])),
            Arc::new(FailingScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(
            summary,
            RunSummary { fetched: 1, processed: 1, nlp_success: 0, nlp_fail: 1 }
        );
        assert!(storage.find_by_url("http://a").await.unwrap().is_none());

        // Still staged, eligible for replay.
        let pending = storage.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "http://a");
    }

    #[tokio::test]
    async fn feed_content_skips_the_scraper() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();
        let mut item = raw("http://a");
        item.content = "Full body straight from the feed.".to_string();

        // A failing scraper proves the scrape step was skipped.
        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, vec![item])),
            Arc::new(FailingScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(summary.nlp_success, 1);
        let article = storage.find_by_url("http://a").await.unwrap().unwrap();
        assert_eq!(article.content, "Full body straight from the feed.");
    }

    #[tokio::test]
    async fn already_published_article_is_a_noop_not_a_failure() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();

        // The article store already carries http://a while staging has
        // never seen it, as after a concurrent run or a restored backup.
        storage.insert(&published("http://a")).await.unwrap();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, vec![raw("http://a")])),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(
            summary,
            RunSummary { fetched: 1, processed: 1, nlp_success: 0, nlp_fail: 0 }
        );
    }

    #[tokio::test]
    async fn replay_publishes_pending_articles() {
        let storage = Arc::new(MemoryStorage::new());
        storage.stage(&raw("http://a")).await.unwrap();

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new()),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let first = pipeline.replay(10).await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.nlp_success, 1);
        assert!(storage.find_by_url("http://a").await.unwrap().is_some());

        // Nothing pending any more; a further replay processes zero but
        // still logs a run.
        let empty = pipeline.replay(10).await.unwrap();
        assert_eq!(empty.processed, 0);
        assert_eq!(storage.recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_feed_list_still_logs_a_run() {
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new()),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );

        let summary = pipeline.run(&[]).await.unwrap();
        assert_eq!(summary, RunSummary::default());

        let runs = storage.recent(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].fetched, 0);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_bound() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();
        let items: Vec<RawArticle> = (0..20).map(|i| raw(&format!("http://a{}", i))).collect();

        let enricher = Arc::new(CountingEnricher::new());
        let bound = 3;
        let pipeline = pipeline_with(
            storage,
            Arc::new(StaticFetcher::new().with_feed(&feed, items)),
            Arc::new(StaticScraper),
            enricher.clone(),
            bound,
        );

        let summary = pipeline.run(&[feed]).await.unwrap();
        assert_eq!(summary.nlp_success, 20);
        assert!(enricher.max_seen.load(Ordering::SeqCst) <= bound);
        assert!(enricher.max_seen.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn scraped_image_fills_a_missing_one() {
        let storage = Arc::new(MemoryStorage::new());
        let feed = "https://news.example/rss".to_string();

        let mut with_image = raw("http://has-image");
        with_image.image_url = Some("https://cdn.example/from-feed.jpg".to_string());
        let without_image = raw("http://no-image");

        let pipeline = pipeline_with(
            storage.clone(),
            Arc::new(StaticFetcher::new().with_feed(&feed, vec![with_image, without_image])),
            Arc::new(StaticScraper),
            Arc::new(StaticEnricher),
            DEFAULT_MAX_CONCURRENT,
        );
        pipeline.run(&[feed]).await.unwrap();

        let kept = storage.find_by_url("http://has-image").await.unwrap().unwrap();
        assert_eq!(kept.image_url.as_deref(), Some("https://cdn.example/from-feed.jpg"));
        let filled = storage.find_by_url("http://no-image").await.unwrap().unwrap();
        assert_eq!(filled.image_url.as_deref(), Some("https://cdn.example/scraped.jpg"));
    }
}

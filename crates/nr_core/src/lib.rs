pub mod enrich;
pub mod error;
pub mod fetch;
pub mod storage;
pub mod types;

pub use enrich::Enricher;
pub use error::Error;
pub use fetch::{ContentScraper, FeedFetcher, ScrapedPage};
pub use storage::{ArticleStore, RunLog, StagingStore};
pub use types::{Article, Enrichment, FeedSource, PipelineRun, RawArticle, Sentiment};

pub type Result<T> = std::result::Result<T, Error>;

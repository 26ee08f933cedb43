use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-feed fetch checkpoint. Upserted after every successful fetch
/// attempt, found articles or not, so staleness means the feed itself
/// cannot be polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub last_fetched_at: DateTime<Utc>,
}

/// An article as captured from a feed, before enrichment. Staged once per
/// distinct url and never updated afterwards: presence means "seen",
/// independent of whether downstream processing succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    pub summary: String,
    /// Empty when the feed only carried a teaser; filled by the scraper.
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A published article, created exactly once per url by the pipeline.
/// The vote/view counters are mutated only through the store's increment
/// operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub image_url: Option<String>,
    pub source_url: String,
    pub author: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub comments_count: i64,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Lenient parse; anything unrecognized is neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Sentiment::Neutral
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the enrichment stage produces for one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    pub category: String,
    pub sentiment: Sentiment,
    pub tags: Vec<String>,
}

/// Audit record appended once per orchestrator invocation, empty runs
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub timestamp: DateTime<Utc>,
    /// Raw items seen across all feeds this run, already-known ones included.
    pub fetched: u64,
    /// Articles attempted this run.
    pub processed: u64,
    pub nlp_success: u64,
    pub nlp_fail: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_labels_round_trip() {
        for sentiment in [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral] {
            assert_eq!(Sentiment::from_label(sentiment.as_str()), sentiment);
        }
        assert_eq!(Sentiment::from_label("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("mixed"), Sentiment::Neutral);
        assert_eq!(Sentiment::from_label(""), Sentiment::Neutral);
    }

    #[test]
    fn sentiment_serializes_lowercase() {
        let json = serde_json::to_string(&Sentiment::Positive).unwrap();
        assert_eq!(json, "\"positive\"");
        let parsed: Sentiment = serde_json::from_str("\"negative\"").unwrap();
        assert_eq!(parsed, Sentiment::Negative);
    }
}

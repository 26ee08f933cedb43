use std::collections::HashMap;

use async_trait::async_trait;
use nr_core::{Enricher, Enrichment, Sentiment};

pub const FALLBACK_CATEGORY: &str = "General";
pub const TOP_KEYWORDS: usize = 5;

const SUMMARY_TARGET_CHARS: usize = 200;
const SUMMARY_MAX_CHARS: usize = 400;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Technology",
        &["tech", "software", "ai", "computer", "gadgets", "chip", "startup", "robot"],
    ),
    (
        "Politics",
        &["election", "government", "senate", "policy", "parliament", "minister", "vote"],
    ),
    (
        "Business",
        &["market", "stock", "finance", "economy", "earnings", "inflation", "trade"],
    ),
    (
        "Health",
        &["health", "medicine", "virus", "covid", "vaccine", "hospital", "disease"],
    ),
    (
        "Sports",
        &["football", "soccer", "nba", "olympics", "championship", "tournament", "league"],
    ),
];

const POSITIVE_WORDS: &[&str] = &[
    "win", "wins", "won", "growth", "success", "breakthrough", "record", "strong", "surge",
    "gain", "gains", "improve", "improved", "hope", "celebrate", "recovery", "rescue",
];

const NEGATIVE_WORDS: &[&str] = &[
    "crisis", "death", "deaths", "crash", "war", "decline", "loss", "losses", "fear", "attack",
    "fraud", "collapse", "recession", "outbreak", "layoffs", "failure", "threat",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "from", "this", "have", "has", "had", "was", "were",
    "are", "will", "been", "their", "they", "them", "then", "than", "about", "after", "into",
    "over", "under", "more", "most", "when", "which", "would", "could", "should", "said",
    "says", "also", "its", "his", "her", "but", "not", "you", "your", "who", "what", "where",
    "while", "there", "here", "these", "those", "some", "such", "only", "just", "being",
];

/// Rule-based enrichment with no external dependencies. It is both the
/// default enricher and the per-field fallback source for the remote one.
pub struct HeuristicEnricher;

impl HeuristicEnricher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enricher for HeuristicEnricher {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn enrich(&self, text: &str) -> Enrichment {
        let summary = summarize(text);
        Enrichment {
            // Sentiment is read off the summary, where the lead usually
            // carries the tone of the piece.
            sentiment: sentiment(&summary),
            category: classify(text),
            tags: keywords(text, TOP_KEYWORDS),
            summary,
        }
    }
}

/// Leading sentences up to a length cap; plain truncation when the text
/// has no sentence structure to speak of.
pub fn summarize(text: &str) -> String {
    let mut summary = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if !summary.is_empty() && summary.len() + sentence.len() > SUMMARY_MAX_CHARS {
            break;
        }
        summary.push_str(sentence);
        if summary.len() >= SUMMARY_TARGET_CHARS {
            break;
        }
    }
    let summary = summary.trim();
    // No sentence structure, or a single run-on "sentence": hard truncate.
    if summary.is_empty() || summary.len() > SUMMARY_MAX_CHARS {
        truncate(text, SUMMARY_TARGET_CHARS)
    } else {
        summary.to_string()
    }
}

pub fn classify(text: &str) -> String {
    let lower = text.to_lowercase();
    for (category, words) in CATEGORY_KEYWORDS {
        if words.iter().any(|word| contains_word(&lower, word)) {
            return (*category).to_string();
        }
    }
    FALLBACK_CATEGORY.to_string()
}

pub fn sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let mut score = 0i32;
    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if POSITIVE_WORDS.contains(&token) {
            score += 1;
        } else if NEGATIVE_WORDS.contains(&token) {
            score -= 1;
        }
    }
    if score > 0 {
        Sentiment::Positive
    } else if score < 0 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Most frequent non-stopword tokens, alphabetical on ties so the output
/// is deterministic.
pub fn keywords(text: &str, top_n: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if token.len() > 3 && !STOPWORDS.contains(&token) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(word, _)| word.to_string())
        .collect()
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim().to_string()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_field_is_populated_even_for_empty_text() {
        let enricher = HeuristicEnricher::new();
        let enrichment = enricher.enrich("").await;
        assert_eq!(enrichment.summary, "");
        assert_eq!(enrichment.category, FALLBACK_CATEGORY);
        assert_eq!(enrichment.sentiment, Sentiment::Neutral);
        assert!(enrichment.tags.is_empty());
    }

    #[tokio::test]
    async fn enriches_a_plain_article() {
        let enricher = HeuristicEnricher::new();
        let text = "The government announced a new election policy today. \
                    Ministers celebrate the strong reform success. \
                    Observers expect the policy debate to continue for weeks.";
        let enrichment = enricher.enrich(text).await;

        assert!(enrichment.summary.starts_with("The government announced"));
        assert_eq!(enrichment.category, "Politics");
        assert_eq!(enrichment.sentiment, Sentiment::Positive);
        assert!(enrichment.tags.contains(&"policy".to_string()));
    }

    #[test]
    fn summary_takes_leading_sentences() {
        let text = "The central bank raised its benchmark interest rate by a quarter \
                    point on Tuesday morning. Officials described the decision as a \
                    response to persistent inflation across the whole economy. Analysts \
                    had widely expected the move after months of unusually strong \
                    employment figures. This fourth sentence must not appear.";
        let summary = summarize(text);
        assert!(summary.starts_with("The central bank"));
        assert!(summary.len() <= SUMMARY_MAX_CHARS);
        assert!(!summary.contains("fourth sentence"));
    }

    #[test]
    fn summary_falls_back_to_truncation_without_sentences() {
        let text = "word ".repeat(100);
        let summary = summarize(&text);
        assert!(!summary.is_empty());
        assert!(summary.chars().count() <= SUMMARY_TARGET_CHARS);
    }

    #[test]
    fn classification_matches_whole_words_only() {
        // "said" must not trip the "ai" keyword.
        assert_eq!(classify("He said hello to the crowd"), FALLBACK_CATEGORY);
        assert_eq!(classify("New AI chip unveiled"), "Technology");
        assert_eq!(classify("Stock market rally continues"), "Business");
    }

    #[test]
    fn sentiment_counts_lexicon_hits() {
        assert_eq!(sentiment("A record win and strong growth"), Sentiment::Positive);
        assert_eq!(sentiment("War and crisis deepen the decline"), Sentiment::Negative);
        assert_eq!(sentiment("The committee met on Tuesday"), Sentiment::Neutral);
    }

    #[test]
    fn keywords_rank_by_frequency_and_skip_stopwords() {
        let text = "budget budget budget deficit deficit spending about which would";
        let tags = keywords(text, 2);
        assert_eq!(tags, vec!["budget", "deficit"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "日本語のテキストです";
        assert_eq!(truncate(text, 3), "日本語");
    }
}

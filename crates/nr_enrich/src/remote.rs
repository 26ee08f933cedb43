use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use nr_core::{Enricher, Enrichment, Error, Result, Sentiment};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::heuristic;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PROMPT_CHARS: usize = 6000;

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

/// The JSON object the model is asked to produce. Every field is optional
/// so a partially well-formed answer still contributes what it has.
#[derive(Default, Deserialize)]
struct EnrichmentPayload {
    summary: Option<String>,
    category: Option<String>,
    sentiment: Option<String>,
    tags: Option<Vec<String>>,
}

/// Enrichment backed by an OpenAI-compatible chat-completions endpoint.
/// Any transport or parse failure falls back per-field to the heuristic
/// values, so `enrich` never fails.
pub struct RemoteEnricher {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl RemoteEnricher {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.unwrap_or_default(),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }

    async fn request_enrichment(&self, text: &str) -> Result<EnrichmentPayload> {
        let prompt = format!(
            "Analyze the following news article and answer with a JSON object \
             containing exactly these fields: \"summary\" (2-3 sentences), \
             \"category\" (one of Technology, Politics, Business, Health, Sports, General), \
             \"sentiment\" (positive, negative or neutral) and \"tags\" \
             (up to 5 keywords).\n\n{}",
            heuristic::truncate(text, MAX_PROMPT_CHARS),
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| Error::Enrichment("empty completion".to_string()))?;

        let json = extract_json(content)
            .ok_or_else(|| Error::Enrichment("completion carries no JSON object".to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl fmt::Debug for RemoteEnricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEnricher")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl Enricher for RemoteEnricher {
    fn name(&self) -> &str {
        "remote"
    }

    async fn enrich(&self, text: &str) -> Enrichment {
        let payload = match self.request_enrichment(text).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("remote enrichment failed, using heuristic fallback: {}", e);
                EnrichmentPayload::default()
            }
        };

        Enrichment {
            summary: payload
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| heuristic::summarize(text)),
            category: payload
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| heuristic::classify(text)),
            sentiment: payload
                .sentiment
                .map(|s| Sentiment::from_label(&s))
                .unwrap_or_else(|| heuristic::sentiment(text)),
            tags: payload
                .tags
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| heuristic::keywords(text, heuristic::TOP_KEYWORDS)),
        }
    }
}

/// Models like to wrap their JSON in prose or code fences; take the
/// outermost braces.
fn extract_json(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| content[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_unwraps_code_fences() {
        let content = "Here you go:\n```json\n{\"summary\": \"ok\"}\n```";
        assert_eq!(extract_json(content).unwrap(), "{\"summary\": \"ok\"}");
        assert!(extract_json("no json here").is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_heuristics() {
        // Point at a port nothing listens on; the connection error must
        // degrade to heuristic values, not surface.
        let enricher = RemoteEnricher::new(
            None,
            Some("http://127.0.0.1:1".to_string()),
            Some("test-model".to_string()),
        )
        .unwrap();

        let text = "The stock market posted a record gain after strong earnings.";
        let enrichment = enricher.enrich(text).await;

        assert!(!enrichment.summary.is_empty());
        assert_eq!(enrichment.category, "Business");
        assert_eq!(enrichment.sentiment, Sentiment::Positive);
        assert!(!enrichment.tags.is_empty());
    }

    #[test]
    fn payload_fields_are_all_optional() {
        let payload: EnrichmentPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.summary.is_none());
        assert!(payload.tags.is_none());

        let payload: EnrichmentPayload =
            serde_json::from_str(r#"{"sentiment": "negative", "tags": ["a"]}"#).unwrap();
        assert_eq!(payload.sentiment.as_deref(), Some("negative"));
        assert_eq!(payload.tags.unwrap(), vec!["a"]);
    }
}

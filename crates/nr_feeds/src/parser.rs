use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feed_rs::model::Entry;
use feed_rs::parser;
use nr_core::{Error, FeedFetcher, RawArticle, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("newsriver/", env!("CARGO_PKG_VERSION"));

/// Fetches syndication documents and maps their entries to raw article
/// candidates. Stateless between calls; novelty is decided downstream by
/// the staging store's url key.
pub struct FeedParser {
    client: Client,
}

impl FeedParser {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<RawArticle>> {
        let response = self.client.get(feed_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Feed(format!("{} returned {}", feed_url, status)));
        }
        let bytes = response.bytes().await?;
        parse_document(bytes.as_ref(), feed_url)
    }
}

#[async_trait]
impl FeedFetcher for FeedParser {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<RawArticle>> {
        self.fetch_feed(feed_url).await
    }
}

/// Parse a syndication document into raw article candidates. Entries
/// without a usable http(s) link are skipped; every other field is
/// best-effort.
pub fn parse_document(bytes: &[u8], feed_url: &str) -> Result<Vec<RawArticle>> {
    let feed = parser::parse(bytes)
        .map_err(|e| Error::Feed(format!("failed to parse {}: {}", feed_url, e)))?;

    let source = feed.title.map(|t| t.content).unwrap_or_default();
    let now = Utc::now();

    let articles = feed
        .entries
        .iter()
        .filter_map(|entry| {
            let url = entry_url(entry)?;
            if !is_http_url(&url) {
                debug!("skipping non-http entry link {} in {}", url, feed_url);
                return None;
            }
            Some(RawArticle {
                title: entry
                    .title
                    .as_ref()
                    .map(|t| t.content.trim().to_string())
                    .unwrap_or_default(),
                summary: entry
                    .summary
                    .as_ref()
                    .map(|s| s.content.clone())
                    .unwrap_or_default(),
                content: entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
                    .unwrap_or_default(),
                published_at: entry.published,
                source: source.clone(),
                tags: entry.categories.iter().map(|c| c.term.clone()).collect(),
                image_url: extract_image(entry),
                url,
                created_at: now,
            })
        })
        .collect();

    Ok(articles)
}

fn entry_url(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|link| link.href.clone())
}

fn is_http_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Ordered image fallback: media content entries (widest image wins), then
/// media thumbnails, then image enclosures, then the first `<img>` in the
/// entry HTML. No image at all is a valid outcome.
fn extract_image(entry: &Entry) -> Option<String> {
    if let Some(url) = widest_media_content(entry) {
        return Some(url);
    }
    if let Some(url) = widest_thumbnail(entry) {
        return Some(url);
    }
    if let Some(url) = image_enclosure(entry) {
        return Some(url);
    }
    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.as_str()))?;
    first_img_src(html)
}

fn widest_media_content(entry: &Entry) -> Option<String> {
    let mut best: Option<(u32, String)> = None;
    for media in &entry.media {
        for content in &media.content {
            let Some(url) = content.url.as_ref() else {
                continue;
            };
            let is_image = match content.content_type.as_ref() {
                Some(m) => m.type_() == mime::IMAGE,
                None => has_image_extension(url.as_str()),
            };
            if !is_image {
                continue;
            }
            let width = content.width.unwrap_or(0);
            if best.as_ref().map_or(true, |(w, _)| width > *w) {
                best = Some((width, url.to_string()));
            }
        }
    }
    best.map(|(_, url)| url)
}

fn widest_thumbnail(entry: &Entry) -> Option<String> {
    let mut best: Option<(u32, String)> = None;
    for media in &entry.media {
        for thumbnail in &media.thumbnails {
            let width = thumbnail.image.width.unwrap_or(0);
            if best.as_ref().map_or(true, |(w, _)| width > *w) {
                best = Some((width, thumbnail.image.uri.clone()));
            }
        }
    }
    best.map(|(_, url)| url)
}

fn image_enclosure(entry: &Entry) -> Option<String> {
    // RSS <enclosure> surfaces as the entry content src; Atom carries a
    // link with rel="enclosure".
    if let Some(content) = &entry.content {
        if content.content_type.type_() == mime::IMAGE {
            if let Some(src) = &content.src {
                return Some(src.href.clone());
            }
        }
    }
    entry
        .links
        .iter()
        .find(|link| {
            link.rel
                .as_deref()
                .map_or(false, |rel| rel.eq_ignore_ascii_case("enclosure"))
                && link
                    .media_type
                    .as_deref()
                    .map_or(false, |m| m.starts_with("image/"))
        })
        .map(|link| link.href.clone())
}

fn first_img_src(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img").unwrap();
    fragment
        .select(&selector)
        .find_map(|img| img.value().attr("src"))
        .map(|src| src.to_string())
}

fn has_image_extension(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| path.ends_with(ext))
}

use std::time::Duration;

use async_trait::async_trait;
use nr_core::{ContentScraper, Error, Result, ScrapedPage};
use reqwest::Client;
use scraper::{Html, Selector};

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("newsriver/", env!("CARGO_PKG_VERSION"));

/// Fetches an article page and extracts its main text, for feed entries
/// that only carried a teaser.
pub struct PageScraper {
    client: Client,
}

impl PageScraper {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn scrape_page(&self, url: &str) -> Result<ScrapedPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Scraping(format!("{} returned {}", url, status)));
        }
        let html = response.text().await?;
        Ok(extract_page(&html))
    }
}

#[async_trait]
impl ContentScraper for PageScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        self.scrape_page(url).await
    }
}

/// Every paragraph joined as body text, first image as a fallback
/// illustration.
pub fn extract_page(html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let paragraphs = Selector::parse("p").unwrap();
    let content = document
        .select(&paragraphs)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let images = Selector::parse("img").unwrap();
    let image_url = document
        .select(&images)
        .find_map(|img| img.value().attr("src"))
        .map(|src| src.to_string());

    ScrapedPage { content, image_url }
}

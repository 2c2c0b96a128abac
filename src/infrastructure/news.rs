//! CryptoCompare-compatible news client.

use crate::config::UpstreamConfig;
use crate::domain::{NewsArticle, NewsSource, UpstreamError};
use crate::infrastructure::http::UpstreamHttp;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

/// Articles kept per fetch, newest first.
pub const MAX_ARTICLES: usize = 20;

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(rename = "Data", default)]
    data: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    source: String,
    published_on: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    categories: String,
}

#[derive(Clone)]
pub struct NewsClient {
    http: UpstreamHttp,
    api_key: Option<String>,
}

impl NewsClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: UpstreamHttp::new("news", config)?
                .with_limiter(RateLimiter::new(config.requests_per_minute)),
            api_key: config.api_key.clone(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Apikey {}", key)) {
                headers.insert("authorization", value);
            }
        }
        headers
    }
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn fetch_news(&self) -> Result<Vec<NewsArticle>, UpstreamError> {
        let query = [("lang", "EN".to_string())];
        let raw: NewsResponse = self.http.get_json("/news/", &query, self.headers()).await?;
        Ok(parse_articles(raw.data))
    }
}

fn parse_articles(raw: Vec<RawArticle>) -> Vec<NewsArticle> {
    let mut articles: Vec<NewsArticle> = raw
        .into_iter()
        .filter(|a| !a.title.trim().is_empty())
        .filter_map(|a| {
            let published_at = DateTime::<Utc>::from_timestamp(a.published_on, 0)?;
            Some(NewsArticle {
                id: match a.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                title: a.title.trim().to_string(),
                body: a.body,
                source: a.source,
                url: a.url.filter(|u| !u.is_empty()),
                published_at,
                tags: split_pipe(&a.tags),
                categories: split_pipe(&a.categories),
            })
        })
        .collect();

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(MAX_ARTICLES);
    articles
}

fn split_pipe(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

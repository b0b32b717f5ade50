use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    /// Search submissions matching `query`, newest first.
    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<Submission>> {
        if query.trim().is_empty() {
            bail!("reddit: search query is required");
        }
        let mut url = self.base_url.join("search.json")?;
        url.query_pairs_mut()
            .append_pair("q", query.trim())
            .append_pair("limit", &limit.to_string())
            .append_pair("sort", "new");

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return match status.as_u16() {
                429 => Err(anyhow!("reddit: rate limited: {}", body)),
                _ => Err(anyhow!("reddit: api error {}: {}", status, body)),
            };
        }
        let listing: ListingEnvelope<Submission> = resp.json()?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data)
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub ups: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub url_overridden_by_dest: Option<String>,
    #[serde(default)]
    pub preview: Preview,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMetadata>>,
}

impl Submission {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if self.created_utc == 0.0 {
            return None;
        }
        Utc.timestamp_opt(self.created_utc.trunc() as i64, 0).single()
    }

    /// Attachment URLs: the overridden destination, preview image sources,
    /// then gallery media, in that order. Missing everything yields an empty
    /// sequence.
    pub fn media_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(dest) = &self.url_overridden_by_dest {
            if !dest.is_empty() {
                urls.push(dest.clone());
            }
        }
        for image in &self.preview.images {
            if !image.source.url.is_empty() {
                urls.push(image.source.url.clone());
            }
        }
        if let Some(metadata) = &self.media_metadata {
            let mut keys: Vec<&String> = metadata.keys().collect();
            keys.sort();
            for key in keys {
                let full = &metadata[key].full;
                if !full.url.is_empty() {
                    urls.push(full.url.clone());
                }
            }
        }
        urls
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewImage {
    #[serde(default)]
    pub source: PreviewSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreviewSource {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaMetadata {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "e")]
    pub kind: String,
    #[serde(default, rename = "s")]
    pub full: MediaMetadataImage,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaMetadataImage {
    #[serde(default, rename = "u")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingEnvelope<T> {
    kind: String,
    data: Listing<T>,
}

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, FixedOffset};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://mastodon.social/";

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
            bail!("mastodon client user agent required");
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

    /// Fetch the public timeline for one hashtag.
    pub fn tag_timeline(&self, tag: &str, limit: u32) -> Result<Vec<Status>> {
        if tag.trim().is_empty() {
            bail!("mastodon: tag is required");
        }
        let mut url = self
            .base_url
            .join(&format!("api/v1/timelines/tag/{}", tag.trim()))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("mastodon: api error {}: {}", status, body));
        }
        let statuses: Vec<Status> = resp.json()?;
        Ok(statuses)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub created_at: DateTime<FixedOffset>,
    pub account: Account,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    #[serde(default)]
    pub url: String,
}

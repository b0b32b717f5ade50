use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://serpapi.com/";

/// Leading "Mar 5, 2024 -" style date some result snippets carry.
static SNIPPET_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][a-z]{2} \d{1,2}, \d{4})\s*[—–-]").unwrap());

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    user_agent: String,
    api_key: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("websearch client user agent required");
        }
        if config.api_key.trim().is_empty() {
            bail!("websearch client api key required");
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
            api_key: config.api_key,
            base_url,
        })
    }

    /// Run one web search and return its organic results.
    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<OrganicResult>> {
        if query.trim().is_empty() {
            bail!("websearch: query is required");
        }
        let mut url = self.base_url.join("search.json")?;
        url.query_pairs_mut()
            .append_pair("q", query.trim())
            .append_pair("num", &limit.to_string())
            .append_pair("engine", "google")
            .append_pair("api_key", &self.api_key);

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("websearch: api error {}: {}", status, body));
        }
        let payload: SearchResponse = resp.json()?;
        Ok(payload.organic_results)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl OrganicResult {
    /// Best-effort publication time: the provider's `date` field when it
    /// parses, else a dated snippet prefix. Results we cannot date carry no
    /// timestamp and are simply skipped by time-window filters.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if let Some(date) = self.date.as_deref() {
            if let Some(parsed) = parse_result_date(date) {
                return Some(parsed);
            }
        }
        SNIPPET_DATE
            .captures(&self.snippet)
            .and_then(|caps| parse_result_date(&caps[1]))
    }
}

fn parse_result_date(text: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(text.trim(), "%b %e, %Y").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(12, 0, 0)?,
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn rejects_missing_api_key() {
        let err = Client::new(ClientConfig {
            user_agent: "tagfeed-test/0.1".into(),
            ..ClientConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("api key"));
    }

    #[test]
    fn parses_date_field() {
        let result = OrganicResult {
            date: Some("Mar 5, 2024".into()),
            ..OrganicResult::default()
        };
        let created = result.created_at().unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2024, 3, 5));
    }

    #[test]
    fn parses_snippet_prefix_date() {
        let result = OrganicResult {
            snippet: "Jan 12, 2023 — a thing happened".into(),
            ..OrganicResult::default()
        };
        assert!(result.created_at().is_some());
    }

    #[test]
    fn undatable_result_has_no_timestamp() {
        let result = OrganicResult {
            snippet: "no date here".into(),
            ..OrganicResult::default()
        };
        assert_eq!(result.created_at(), None);
    }

    #[test]
    fn decodes_response_payload() {
        let payload = r#"{
            "organic_results": [
                {"title": "T", "snippet": "S", "link": "https://example.com/a"}
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.organic_results.len(), 1);
        assert_eq!(response.organic_results[0].link, "https://example.com/a");
    }
}

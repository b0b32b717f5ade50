use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "TAGFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub websearch: WebSearchConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-fetch timeout; one slow connector must not hold up the others.
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    "tagfeed/0.1 (+https://github.com/tagfeed/tagfeed)".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MastodonConfig {
    #[serde(default = "default_mastodon_base_url")]
    pub base_url: String,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            base_url: default_mastodon_base_url(),
        }
    }
}

fn default_mastodon_base_url() -> String {
    crate::mastodon::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_reddit_base_url(),
        }
    }
}

fn default_reddit_base_url() -> String {
    crate::reddit::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSearchConfig {
    #[serde(default = "default_websearch_base_url")]
    pub base_url: String,
    /// Empty key disables the web-search connector.
    #[serde(default)]
    pub api_key: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_websearch_base_url(),
            api_key: String::new(),
        }
    }
}

fn default_websearch_base_url() -> String {
    crate::websearch::DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_max_posts_per_source")]
    pub max_posts_per_source: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_explicit_words")]
    pub explicit_words: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_posts_per_source: default_max_posts_per_source(),
            page_size: default_page_size(),
            explicit_words: default_explicit_words(),
        }
    }
}

fn default_max_posts_per_source() -> usize {
    20
}

fn default_page_size() -> usize {
    10
}

fn default_explicit_words() -> Vec<String> {
    vec![
        "nsfw".into(),
        "porn".into(),
        "xxx".into(),
        "hentai".into(),
        "gore".into(),
        "fetish".into(),
        "onlyfans".into(),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.http.user_agent.is_empty() {
        base.http.user_agent = other.http.user_agent;
    }
    if other.http.fetch_timeout != Duration::ZERO {
        base.http.fetch_timeout = other.http.fetch_timeout;
    }

    if !other.mastodon.base_url.is_empty() {
        base.mastodon.base_url = other.mastodon.base_url;
    }
    if !other.reddit.base_url.is_empty() {
        base.reddit.base_url = other.reddit.base_url;
    }
    if !other.websearch.base_url.is_empty() {
        base.websearch.base_url = other.websearch.base_url;
    }
    if !other.websearch.api_key.is_empty() {
        base.websearch.api_key = other.websearch.api_key;
    }

    if other.search.max_posts_per_source != 0 {
        base.search.max_posts_per_source = other.search.max_posts_per_source;
    }
    if other.search.page_size != 0 {
        base.search.page_size = other.search.page_size;
    }
    if !other.search.explicit_words.is_empty() {
        base.search.explicit_words = other.search.explicit_words;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "http.user_agent" => cfg.http.user_agent = value,
        "http.fetch_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.http.fetch_timeout = duration;
            }
        }
        "mastodon.base_url" => cfg.mastodon.base_url = value,
        "reddit.base_url" => cfg.reddit.base_url = value,
        "websearch.base_url" => cfg.websearch.base_url = value,
        "websearch.api_key" => cfg.websearch.api_key = value,
        "search.max_posts_per_source" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.max_posts_per_source = parsed;
            }
        }
        "search.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.page_size = parsed;
            }
        }
        "search.explicit_words" => {
            cfg.search.explicit_words = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tagfeed").join("config.yaml"))
}

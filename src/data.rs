use std::sync::Arc;

use anyhow::{Context, Result};

use crate::mastodon;
use crate::post::{Post, SourceId};
use crate::rating::Classifier;
use crate::reddit;
use crate::websearch;

/// One provider behind the aggregation pipeline. A failed fetch is an error
/// value; the aggregator downgrades it to a per-source diagnostic and keeps
/// going with the other sources.
pub trait Connector: Send + Sync {
    fn source(&self) -> SourceId;
    fn fetch_by_tag(&self, tag: &str, limit: u32) -> Result<Vec<Post>>;
}

pub struct MastodonConnector {
    client: Arc<mastodon::Client>,
    classifier: Arc<Classifier>,
}

impl MastodonConnector {
    pub fn new(client: Arc<mastodon::Client>, classifier: Arc<Classifier>) -> Self {
        Self { client, classifier }
    }
}

impl Connector for MastodonConnector {
    fn source(&self) -> SourceId {
        SourceId::Mastodon
    }

    fn fetch_by_tag(&self, tag: &str, limit: u32) -> Result<Vec<Post>> {
        let statuses = self
            .client
            .tag_timeline(tag, limit)
            .context("fetch mastodon tag timeline")?;
        Ok(statuses
            .into_iter()
            .map(|status| Post::from_status(status, &self.classifier))
            .collect())
    }
}

pub struct RedditConnector {
    client: Arc<reddit::Client>,
    classifier: Arc<Classifier>,
}

impl RedditConnector {
    pub fn new(client: Arc<reddit::Client>, classifier: Arc<Classifier>) -> Self {
        Self { client, classifier }
    }
}

impl Connector for RedditConnector {
    fn source(&self) -> SourceId {
        SourceId::Reddit
    }

    fn fetch_by_tag(&self, tag: &str, limit: u32) -> Result<Vec<Post>> {
        let submissions = self
            .client
            .search(tag, limit)
            .context("fetch reddit search")?;
        Ok(submissions
            .into_iter()
            .map(|submission| Post::from_submission(submission, &self.classifier))
            .collect())
    }
}

pub struct WebSearchConnector {
    client: Arc<websearch::Client>,
    classifier: Arc<Classifier>,
}

impl WebSearchConnector {
    pub fn new(client: Arc<websearch::Client>, classifier: Arc<Classifier>) -> Self {
        Self { client, classifier }
    }
}

impl Connector for WebSearchConnector {
    fn source(&self) -> SourceId {
        SourceId::Web
    }

    fn fetch_by_tag(&self, tag: &str, limit: u32) -> Result<Vec<Post>> {
        let results = self.client.search(tag, limit).context("fetch web search")?;
        Ok(results
            .into_iter()
            .map(|result| Post::from_search_result(result, &self.classifier))
            .collect())
    }
}

/// In-memory connector serving canned posts, for offline use and tests.
pub struct StaticConnector {
    source: SourceId,
    posts: Vec<Post>,
    fail: bool,
}

impl StaticConnector {
    pub fn new(source: SourceId, posts: Vec<Post>) -> Self {
        Self {
            source,
            posts,
            fail: false,
        }
    }

    pub fn failing(source: SourceId) -> Self {
        Self {
            source,
            posts: Vec::new(),
            fail: true,
        }
    }
}

impl Connector for StaticConnector {
    fn source(&self) -> SourceId {
        self.source
    }

    fn fetch_by_tag(&self, _tag: &str, limit: u32) -> Result<Vec<Post>> {
        if self.fail {
            anyhow::bail!("{}: connection refused", self.source.as_str());
        }
        Ok(self.posts.iter().take(limit as usize).cloned().collect())
    }
}

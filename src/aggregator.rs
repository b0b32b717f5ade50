use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use serde::{Deserialize, Serialize};

use crate::data::Connector;
use crate::post::{Post, SourceId};
use crate::rating::Rating;

/// Whether a multi-tag search requires every tag or any tag to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    And,
    Or,
}

/// One connector call that failed. Soft diagnostic: the search proceeds with
/// the other `(tag, source)` pairs.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: SourceId,
    pub tag: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub posts: Vec<Post>,
    pub failures: Vec<SourceFailure>,
}

impl SearchOutcome {
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .failures
            .iter()
            .map(|failure| {
                format!(
                    "{} '{}': {}",
                    failure.source.as_str(),
                    failure.tag,
                    failure.message
                )
            })
            .collect();
        Some(lines.join("; "))
    }
}

pub struct Aggregator {
    connectors: Vec<Arc<dyn Connector>>,
    max_posts_per_source: usize,
    fetch_limit: u32,
}

impl Aggregator {
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        max_posts_per_source: usize,
        fetch_limit: u32,
    ) -> Self {
        Self {
            connectors,
            max_posts_per_source,
            fetch_limit,
        }
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.connectors.iter().map(|c| c.source()).collect()
    }

    /// Fetch every `(tag, source)` pair concurrently, then run the merge
    /// pipeline single-threaded on the joined results. Never errors: a failed
    /// connector call degrades to a `SourceFailure` diagnostic.
    pub fn search(
        &self,
        tags: &[String],
        mode: TagMode,
        sources: &[SourceId],
        allow_explicit: bool,
    ) -> SearchOutcome {
        let tags: Vec<String> = tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        if tags.is_empty() {
            return SearchOutcome::default();
        }

        let enabled: Vec<Arc<dyn Connector>> = self
            .connectors
            .iter()
            .filter(|connector| sources.contains(&connector.source()))
            .cloned()
            .collect();

        // Each worker owns its fetch; results rejoin over the channel and are
        // re-ordered by spawn index so merge order is deterministic.
        let (tx, rx) = unbounded();
        let mut handles = Vec::new();
        let mut order = 0usize;
        for tag in &tags {
            for connector in &enabled {
                let tx = tx.clone();
                let connector = connector.clone();
                let tag = tag.clone();
                let limit = self.fetch_limit;
                let index = order;
                order += 1;
                handles.push(thread::spawn(move || {
                    let result = connector.fetch_by_tag(&tag, limit);
                    let _ = tx.send((index, connector.source(), tag, result));
                }));
            }
        }
        drop(tx);

        let mut batches: Vec<_> = rx.iter().collect();
        for handle in handles {
            let _ = handle.join();
        }
        batches.sort_by_key(|(index, _, _, _)| *index);

        let mut fetched = Vec::new();
        let mut failures = Vec::new();
        for (_, source, tag, result) in batches {
            match result {
                Ok(posts) => fetched.extend(posts),
                Err(err) => failures.push(SourceFailure {
                    source,
                    tag,
                    message: format!("{:#}", err),
                }),
            }
        }

        let merged = dedupe_first_wins(fetched);
        let merged = if allow_explicit {
            merged
        } else {
            drop_explicit(merged)
        };
        let merged = filter_by_tags(merged, &tags, mode);
        let merged = cap_per_source(merged, self.max_posts_per_source * tags.len());
        let posts = sort_newest_first(merged);

        SearchOutcome { posts, failures }
    }
}

/// Drop later duplicates of an already-seen `(source, id)`; first wins.
fn dedupe_first_wins(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert((post.source, post.id.clone())))
        .collect()
}

fn drop_explicit(posts: Vec<Post>) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|post| post.rating != Rating::Explicit)
        .collect()
}

/// Keep posts whose searchable text contains all (`And`) or any (`Or`) of the
/// requested tags.
fn filter_by_tags(posts: Vec<Post>, tags: &[String], mode: TagMode) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|post| {
            let text = post.searchable_text();
            match mode {
                TagMode::And => tags.iter().all(|tag| text.contains(tag.as_str())),
                TagMode::Or => tags.iter().any(|tag| text.contains(tag.as_str())),
            }
        })
        .collect()
}

/// At most `cap` posts survive per source, keeping the most recent by
/// `created_at` with fetch order breaking ties. Undated posts rank oldest.
fn cap_per_source(posts: Vec<Post>, cap: usize) -> Vec<Post> {
    let mut source_order = Vec::new();
    for post in &posts {
        if !source_order.contains(&post.source) {
            source_order.push(post.source);
        }
    }

    let mut capped = Vec::new();
    for source in source_order {
        let mut group: Vec<Post> = posts
            .iter()
            .filter(|post| post.source == source)
            .cloned()
            .collect();
        group.sort_by(|a, b| compare_newest_first(a, b));
        group.truncate(cap);
        capped.extend(group);
    }
    capped
}

fn sort_newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(compare_newest_first);
    posts
}

fn compare_newest_first(a: &Post, b: &Post) -> std::cmp::Ordering {
    match (a.created_at, b.created_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticConnector;
    use crate::post::Variant;
    use chrono::{TimeZone, Utc};

    fn post(source: SourceId, id: &str, content: &str, hour: u32) -> Post {
        Post {
            id: id.to_string(),
            source,
            created_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()),
            author: "author".into(),
            content: content.to_string(),
            url: format!("https://example.com/{}", id),
            media_urls: Vec::new(),
            likes: 0,
            num_comments: 0,
            explicit_flag: false,
            rating: Rating::Safe,
            variant: Variant::Web,
        }
    }

    fn aggregator(connectors: Vec<Arc<dyn Connector>>, cap: usize) -> Aggregator {
        Aggregator::new(connectors, cap, 20)
    }

    fn serving(source: SourceId, posts: Vec<Post>) -> Arc<dyn Connector> {
        Arc::new(StaticConnector::new(source, posts))
    }

    fn failing(source: SourceId) -> Arc<dyn Connector> {
        Arc::new(StaticConnector::failing(source))
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const ALL: &[SourceId] = &[SourceId::Mastodon, SourceId::Reddit, SourceId::Web];

    #[test]
    fn and_mode_requires_every_tag() {
        let connector = serving(
            SourceId::Web,
            vec![
                post(SourceId::Web, "1", "cat and dog together", 1),
                post(SourceId::Web, "2", "only cat here", 2),
                post(SourceId::Web, "3", "only dog here", 3),
            ],
        );
        let agg = aggregator(vec![connector], 20);
        let outcome = agg.search(&tags(&["cat", "dog"]), TagMode::And, ALL, true);
        assert_eq!(outcome.posts.len(), 1);
        assert_eq!(outcome.posts[0].id, "1");
    }

    #[test]
    fn or_mode_accepts_any_tag() {
        let connector = serving(
            SourceId::Web,
            vec![
                post(SourceId::Web, "1", "cat and dog together", 1),
                post(SourceId::Web, "2", "only cat here", 2),
                post(SourceId::Web, "3", "neither animal", 3),
            ],
        );
        let agg = aggregator(vec![connector], 20);
        let outcome = agg.search(&tags(&["cat", "dog"]), TagMode::Or, ALL, true);
        assert_eq!(outcome.posts.len(), 2);
    }

    #[test]
    fn duplicate_source_id_pairs_collapse() {
        // Two tags hit the same connector, which returns the same post twice.
        let connector = serving(
            SourceId::Reddit,
            vec![post(SourceId::Reddit, "same", "cat dog", 1)],
        );
        let agg = aggregator(vec![connector], 20);
        let outcome = agg.search(&tags(&["cat", "dog"]), TagMode::Or, ALL, true);
        assert_eq!(outcome.posts.len(), 1);
    }

    #[test]
    fn same_id_from_different_sources_survives() {
        let a = serving(
            SourceId::Reddit,
            vec![post(SourceId::Reddit, "x", "cat", 1)],
        );
        let b = serving(SourceId::Web, vec![post(SourceId::Web, "x", "cat", 2)]);
        let agg = aggregator(vec![a, b], 20);
        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, true);
        assert_eq!(outcome.posts.len(), 2);
    }

    #[test]
    fn explicit_posts_drop_unless_allowed() {
        let mut explicit = post(SourceId::Web, "1", "cat", 1);
        explicit.rating = Rating::Explicit;
        explicit.explicit_flag = true;
        let connector = serving(
            SourceId::Web,
            vec![explicit, post(SourceId::Web, "2", "cat", 2)],
        );
        let agg = aggregator(vec![connector], 20);

        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, false);
        assert_eq!(outcome.posts.len(), 1);
        assert_eq!(outcome.posts[0].id, "2");

        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, true);
        assert_eq!(outcome.posts.len(), 2);
    }

    #[test]
    fn cap_scales_with_tag_count_and_keeps_newest() {
        let posts: Vec<Post> = (0..10)
            .map(|i| post(SourceId::Web, &format!("p{}", i), "cat dog", i))
            .collect();
        let connector = serving(SourceId::Web, posts);
        let agg = aggregator(vec![connector], 2);

        // Cap is 2 per source per tag: two tags allow four survivors, and the
        // four most recent at that. Dedupe collapses the second tag's copies
        // first, so a single connector still yields at most 2 * tags posts.
        let outcome = agg.search(&tags(&["cat", "dog"]), TagMode::And, ALL, true);
        assert_eq!(outcome.posts.len(), 4);
        assert_eq!(outcome.posts[0].id, "p9");
        assert_eq!(outcome.posts[3].id, "p6");
    }

    #[test]
    fn results_sort_newest_first_with_undated_last() {
        let mut undated = post(SourceId::Web, "u", "cat", 1);
        undated.created_at = None;
        let connector = serving(
            SourceId::Web,
            vec![
                post(SourceId::Web, "old", "cat", 1),
                undated,
                post(SourceId::Web, "new", "cat", 9),
            ],
        );
        let agg = aggregator(vec![connector], 20);
        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, true);
        let ids: Vec<&str> = outcome.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "u"]);
    }

    #[test]
    fn failed_connector_degrades_to_diagnostic() {
        let good = serving(SourceId::Web, vec![post(SourceId::Web, "1", "cat", 1)]);
        let bad = failing(SourceId::Reddit);
        let agg = aggregator(vec![good, bad], 20);
        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, true);
        assert_eq!(outcome.posts.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source, SourceId::Reddit);
    }

    #[test]
    fn all_sources_failing_returns_empty_with_summary() {
        let a = failing(SourceId::Reddit);
        let b = failing(SourceId::Mastodon);
        let agg = aggregator(vec![a, b], 20);
        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, ALL, true);
        assert!(outcome.posts.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failure_summary().unwrap().contains("reddit"));
    }

    #[test]
    fn source_filter_restricts_connectors() {
        let mastodon = serving(
            SourceId::Mastodon,
            vec![post(SourceId::Mastodon, "m", "cat", 1)],
        );
        let web = serving(SourceId::Web, vec![post(SourceId::Web, "w", "cat", 2)]);
        let agg = aggregator(vec![mastodon, web], 20);
        let outcome = agg.search(&tags(&["cat"]), TagMode::Or, &[SourceId::Mastodon], true);
        assert_eq!(outcome.posts.len(), 1);
        assert_eq!(outcome.posts[0].source, SourceId::Mastodon);
    }

    #[test]
    fn blank_tags_yield_empty_outcome() {
        let connector = serving(SourceId::Web, vec![post(SourceId::Web, "1", "cat", 1)]);
        let agg = aggregator(vec![connector], 20);
        let outcome = agg.search(&tags(&["  ", ""]), TagMode::Or, ALL, true);
        assert!(outcome.posts.is_empty());
        assert!(outcome.failures.is_empty());
    }
}

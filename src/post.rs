use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mastodon::Status;
use crate::rating::{Classifier, Rating};
use crate::reddit::Submission;
use crate::websearch::OrganicResult;

/// Which provider a post came from. Post ids are only unique within a source,
/// so deduplication keys on `(SourceId, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Mastodon,
    Reddit,
    Web,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Mastodon => "mastodon",
            SourceId::Reddit => "reddit",
            SourceId::Web => "web",
        }
    }

    /// Short label for summary rows.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceId::Mastodon => "Ma",
            SourceId::Reddit => "Re",
            SourceId::Web => "We",
        }
    }
}

/// Provider-specific payload carried alongside the shared field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Mastodon { visibility: String },
    Reddit { subreddit: String, title: String },
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub source: SourceId,
    /// UTC at ingestion. Absent when the provider gave no usable timestamp;
    /// such posts are skipped by date filters but kept in plain listings.
    pub created_at: Option<DateTime<Utc>>,
    pub author: String,
    pub content: String,
    pub url: String,
    /// Always present; no attachments is the empty sequence, never a sentinel.
    pub media_urls: Vec<String>,
    pub likes: u64,
    pub num_comments: u64,
    pub explicit_flag: bool,
    pub rating: Rating,
    pub variant: Variant,
}

impl Post {
    pub fn from_status(status: Status, classifier: &Classifier) -> Self {
        let media_urls = status
            .media_attachments
            .into_iter()
            .map(|attachment| attachment.url)
            .filter(|url| !url.is_empty())
            .collect();
        let assessment = classifier.classify(&status.content, None, status.sensitive);
        // Some instances omit `url`; the federation `uri` still points at
        // the status.
        let url = if status.url.is_empty() {
            status.uri
        } else {
            status.url
        };
        Post {
            id: status.id,
            source: SourceId::Mastodon,
            created_at: Some(status.created_at.with_timezone(&Utc)),
            author: status.account.username,
            content: status.content,
            url,
            media_urls,
            likes: status.favourites_count,
            num_comments: status.replies_count,
            explicit_flag: status.sensitive || assessment.mark_explicit,
            rating: assessment.rating,
            variant: Variant::Mastodon {
                visibility: status.visibility,
            },
        }
    }

    pub fn from_submission(submission: Submission, classifier: &Classifier) -> Self {
        let media_urls = submission.media_urls();
        let created_at = submission.created_at();
        let assessment =
            classifier.classify(&submission.selftext, Some(&submission.title), submission.over_18);
        Post {
            id: submission.id,
            source: SourceId::Reddit,
            created_at,
            author: submission.author,
            content: submission.selftext,
            url: format!("https://www.reddit.com{}", submission.permalink),
            media_urls,
            likes: submission.ups.max(0) as u64,
            num_comments: submission.num_comments.max(0) as u64,
            explicit_flag: submission.over_18 || assessment.mark_explicit,
            rating: assessment.rating,
            variant: Variant::Reddit {
                subreddit: submission.subreddit,
                title: submission.title,
            },
        }
    }

    pub fn from_search_result(result: OrganicResult, classifier: &Classifier) -> Self {
        let created_at = result.created_at();
        let content = if result.snippet.is_empty() {
            result.title.clone()
        } else {
            format!("{}\n{}", result.title, result.snippet)
        };
        let assessment = classifier.classify(&content, None, false);
        Post {
            id: result.link.clone(),
            source: SourceId::Web,
            created_at,
            author: result.source.unwrap_or_default(),
            content,
            url: result.link,
            media_urls: Vec::new(),
            likes: 0,
            num_comments: 0,
            explicit_flag: assessment.mark_explicit,
            rating: assessment.rating,
            variant: Variant::Web,
        }
    }

    pub fn is_from_reddit(&self) -> bool {
        matches!(self.variant, Variant::Reddit { .. })
    }

    /// Lower-cased plain text used for tag matching: the body stripped of
    /// markup, plus the title for Reddit posts.
    pub fn searchable_text(&self) -> String {
        let mut text = plain_text(&self.content).to_lowercase();
        if let Variant::Reddit { title, .. } = &self.variant {
            text.push(' ');
            text.push_str(&title.to_lowercase());
        }
        text
    }

    /// Plain-text body for display, truncated to `max` characters.
    pub fn preview(&self, max: usize) -> String {
        let text = match &self.variant {
            Variant::Reddit { title, .. } if !title.is_empty() => {
                let body = plain_text(&self.content);
                if body.is_empty() {
                    title.clone()
                } else {
                    format!("{} - {}", title, body)
                }
            }
            _ => plain_text(&self.content),
        };
        let mut out: String = text.chars().take(max).collect();
        if text.chars().count() > max {
            out.push('…');
        }
        out
    }
}

/// Strip HTML tags and decode the handful of entities Mastodon emits. Runs of
/// whitespace left behind by removed block tags collapse to single spaces.
pub fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            '&' => {
                let mut entity = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        chars.next();
                        break;
                    }
                    if entity.len() > 8 || c == '<' || c == '&' || c.is_whitespace() {
                        break;
                    }
                    entity.push(c);
                    chars.next();
                }
                match entity.as_str() {
                    "amp" => out.push('&'),
                    "lt" => out.push('<'),
                    "gt" => out.push('>'),
                    "quot" => out.push('"'),
                    "apos" | "#39" => out.push('\''),
                    "nbsp" => out.push(' '),
                    _ => {
                        out.push('&');
                        out.push_str(&entity);
                    }
                }
            }
            c if c.is_whitespace() => {
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastodon::{Account, MediaAttachment};
    use chrono::TimeZone;

    fn classifier() -> Classifier {
        Classifier::new(vec!["nsfw".to_string(), "gore".to_string()])
    }

    fn sample_status() -> Status {
        Status {
            id: "111".into(),
            created_at: chrono::FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2024, 3, 5, 13, 0, 0)
                .unwrap(),
            account: Account {
                username: "ada".into(),
            },
            content: "<p>Hello &amp; welcome</p>".into(),
            url: "https://mastodon.social/@ada/111".into(),
            uri: "https://mastodon.social/users/ada/statuses/111".into(),
            sensitive: false,
            visibility: "public".into(),
            favourites_count: 7,
            replies_count: 2,
            media_attachments: vec![MediaAttachment {
                url: "https://files.example/cat.png".into(),
            }],
        }
    }

    #[test]
    fn status_normalizes_to_utc() {
        let post = Post::from_status(sample_status(), &classifier());
        let created = post.created_at.unwrap();
        assert_eq!(created, Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());
    }

    #[test]
    fn status_without_media_yields_empty_sequence() {
        let mut status = sample_status();
        status.media_attachments.clear();
        let post = Post::from_status(status, &classifier());
        assert!(post.media_urls.is_empty());
    }

    #[test]
    fn status_url_falls_back_to_uri() {
        let mut status = sample_status();
        status.url.clear();
        let post = Post::from_status(status, &classifier());
        assert_eq!(post.url, "https://mastodon.social/users/ada/statuses/111");
    }

    #[test]
    fn reddit_title_feeds_searchable_text() {
        let submission = Submission {
            id: "abc".into(),
            title: "Cats Of Reddit".into(),
            subreddit: "cats".into(),
            author: "u1".into(),
            selftext: "look at this".into(),
            permalink: "/r/cats/abc".into(),
            ups: 3,
            num_comments: 1,
            created_utc: 1_700_000_000.0,
            over_18: false,
            url_overridden_by_dest: None,
            preview: Default::default(),
            media_metadata: None,
        };
        let post = Post::from_submission(submission, &classifier());
        assert!(post.is_from_reddit());
        assert!(post.searchable_text().contains("cats of reddit"));
        assert!(post.searchable_text().contains("look at this"));
        assert!(post.url.starts_with("https://www.reddit.com/r/cats"));
    }

    #[test]
    fn plain_text_strips_tags_and_entities() {
        assert_eq!(
            plain_text("<p>one <b>two</b> &amp; three</p>"),
            "one two & three"
        );
        assert_eq!(plain_text(""), "");
        assert_eq!(plain_text("no markup"), "no markup");
    }

    #[test]
    fn sensitive_status_is_explicit() {
        let mut status = sample_status();
        status.sensitive = true;
        let post = Post::from_status(status, &classifier());
        assert_eq!(post.rating, Rating::Explicit);
        assert!(post.explicit_flag);
    }
}

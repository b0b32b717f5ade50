use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Content-safety tier. Computed once when a post is normalized and
/// re-derivable from the same inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Safe,
    Sensitive,
    Explicit,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Safe => "safe",
            Rating::Sensitive => "sensitive",
            Rating::Explicit => "explicit",
        }
    }
}

/// Result of classifying one post. `mark_explicit` asks the caller to raise
/// the post's explicit flag (the literal "nsfw" marker escalates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub rating: Rating,
    pub mark_explicit: bool,
}

/// Scans post text against a fixed lower-case word list. The list is loaded
/// once from config and never mutated here.
#[derive(Debug, Clone)]
pub struct Classifier {
    words: HashSet<String>,
}

impl Classifier {
    pub fn new(words: impl IntoIterator<Item = String>) -> Self {
        let words = words
            .into_iter()
            .map(|word| word.trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Classifier { words }
    }

    /// Classify `content` (plus `extra`, e.g. a Reddit title) under the
    /// provider's own explicit flag. The provider flag is authoritative; the
    /// "nsfw" check runs before the general scan so that set iteration order
    /// can never change the tier.
    pub fn classify(&self, content: &str, extra: Option<&str>, explicit_flag: bool) -> Assessment {
        if explicit_flag {
            return Assessment {
                rating: Rating::Explicit,
                mark_explicit: true,
            };
        }

        let mut text = content.to_lowercase();
        if let Some(extra) = extra {
            text.push(' ');
            text.push_str(&extra.to_lowercase());
        }

        if self.words.contains("nsfw") && text.contains("nsfw") {
            return Assessment {
                rating: Rating::Explicit,
                mark_explicit: true,
            };
        }

        for word in &self.words {
            if text.contains(word.as_str()) {
                return Assessment {
                    rating: Rating::Sensitive,
                    mark_explicit: false,
                };
            }
        }

        Assessment {
            rating: Rating::Safe,
            mark_explicit: false,
        }
    }
}

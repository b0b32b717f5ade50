use chrono::{DateTime, Duration, Utc};

use crate::aggregator::{Aggregator, SourceFailure, TagMode};
use crate::command::{self, Command, CommandError, Modifiers};
use crate::post::{Post, SourceId};

pub const HELP_TEXT: &str = "\
Commands:
  s <tags>          search all sources (space-joined tags match ANY)
  s& <tags>         search all sources (tags must ALL match)
  s a & b           '&'-joined tags also force ALL-match
  #<tag>            search the hashtag timeline source only
  n / next          select the next post
  p / previous      select the previous post
  l / list          show the current page of results
  goto N            select the Nth post
  view [N]          open the selected (or Nth) post's link
  sort like         sort results by likes, descending
  sort date         sort results by date, descending
  allow nsfw        include explicit posts in future searches
  unallow nsfw      exclude explicit posts (default)
  clear             clear the screen
  ? / help          show this help
Modifiers (combine with a search):
  *date(N)          keep only the N most recent results
  *depuis(N)        keep results from the last N days
  *minute(N)        keep results from the last N minutes";

/// Per-session cursor/result/history state. Created once per interactive
/// session, mutated only by the interpreter, gone when the session ends.
#[derive(Debug)]
pub struct SessionState {
    pub results: Vec<Post>,
    pub selection_index: usize,
    pub page: usize,
    pub allow_explicit: bool,
    history: Vec<String>,
    history_cursor: usize,
    page_size: usize,
}

impl SessionState {
    pub fn new(page_size: usize) -> Self {
        Self {
            results: Vec::new(),
            selection_index: 0,
            page: 0,
            allow_explicit: false,
            history: Vec::new(),
            history_cursor: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn replace_results(&mut self, results: Vec<Post>) {
        self.results = results;
        self.selection_index = 0;
        self.page = 0;
    }

    pub fn selected(&self) -> Option<&Post> {
        self.results.get(self.selection_index)
    }

    /// Advance the selection, clamped to the last index. Returns false when
    /// there is nothing to move over.
    pub fn select_next(&mut self) -> bool {
        if self.results.is_empty() {
            return false;
        }
        if self.selection_index + 1 < self.results.len() {
            self.selection_index += 1;
        }
        true
    }

    pub fn select_previous(&mut self) -> bool {
        if self.results.is_empty() {
            return false;
        }
        self.selection_index = self.selection_index.saturating_sub(1);
        true
    }

    pub fn goto(&mut self, index: usize) -> Result<(), CommandError> {
        if index >= self.results.len() {
            return Err(CommandError::IndexOutOfRange {
                index: index + 1,
                len: self.results.len(),
            });
        }
        self.selection_index = index;
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        if self.results.is_empty() {
            0
        } else {
            self.results.len().div_ceil(self.page_size)
        }
    }

    pub fn clamp_page(&mut self) {
        let pages = self.page_count();
        if pages == 0 {
            self.page = 0;
        } else if self.page >= pages {
            self.page = pages - 1;
        }
    }

    pub fn page_slice(&self) -> &[Post] {
        let start = self.page * self.page_size;
        if start >= self.results.len() {
            return &[];
        }
        let end = (start + self.page_size).min(self.results.len());
        &self.results[start..end]
    }

    /// Stable: posts with equal like counts keep their current relative
    /// order.
    pub fn sort_by_likes(&mut self) {
        self.results.sort_by(|a, b| b.likes.cmp(&a.likes));
        self.selection_index = 0;
        self.page = 0;
    }

    pub fn sort_by_date(&mut self) {
        self.results.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        self.selection_index = 0;
        self.page = 0;
    }

    pub fn record_history(&mut self, raw: &str) {
        self.history.push(raw.to_string());
        self.history_cursor = self.history.len();
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Move one step back through history (arrow-up). Stays on the oldest
    /// entry once reached.
    pub fn recall_back(&mut self) -> Option<&str> {
        if self.history.is_empty() {
            return None;
        }
        if self.history_cursor > 0 {
            self.history_cursor -= 1;
        }
        self.history.get(self.history_cursor).map(String::as_str)
    }

    /// Move one step forward (arrow-down). Past the newest entry the cursor
    /// parks at `len` and the input should be cleared, hence `None`.
    pub fn recall_forward(&mut self) -> Option<&str> {
        if self.history_cursor < self.history.len() {
            self.history_cursor += 1;
        }
        self.history.get(self.history_cursor).map(String::as_str)
    }
}

/// What one executed command produced, for the presentation layer to render.
#[derive(Debug)]
pub enum Outcome {
    SearchDone {
        total: usize,
        page: Vec<Post>,
        failures: Vec<SourceFailure>,
    },
    Page {
        posts: Vec<Post>,
        page: usize,
        pages: usize,
    },
    Selection {
        index: usize,
        post: Post,
    },
    OpenUrl(String),
    Help(&'static str),
    Cleared,
    ExplicitAllowed(bool),
    Noop,
}

/// Executes parsed commands against the session state. One command runs to
/// completion (including the blocking aggregator call) before the next is
/// accepted.
pub struct Interpreter {
    aggregator: Aggregator,
    state: SessionState,
}

impl Interpreter {
    pub fn new(aggregator: Aggregator, page_size: usize) -> Self {
        Self {
            aggregator,
            state: SessionState::new(page_size),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Parse and run one line of input. Errors report without mutating any
    /// session state.
    pub fn execute(&mut self, line: &str) -> Result<Outcome, CommandError> {
        let command = command::parse(line)?;
        match command {
            Command::Search {
                tags,
                mode,
                modifiers,
            } => {
                if tags.is_empty() {
                    return Ok(Outcome::Noop);
                }
                let sources = self.aggregator.sources();
                Ok(self.run_search(line, &tags, mode, &sources, modifiers))
            }
            Command::TagSearch { tag, modifiers } => {
                let tags = vec![tag];
                Ok(self.run_search(line, &tags, TagMode::Or, &[SourceId::Mastodon], modifiers))
            }
            Command::Next => {
                if self.state.select_next() {
                    self.state.record_history(line);
                    let index = self.state.selection_index;
                    let post = self.state.results[index].clone();
                    Ok(Outcome::Selection { index, post })
                } else {
                    Ok(Outcome::Noop)
                }
            }
            Command::Previous => {
                if self.state.select_previous() {
                    self.state.record_history(line);
                    let index = self.state.selection_index;
                    let post = self.state.results[index].clone();
                    Ok(Outcome::Selection { index, post })
                } else {
                    Ok(Outcome::Noop)
                }
            }
            Command::List => {
                self.state.clamp_page();
                Ok(Outcome::Page {
                    posts: self.state.page_slice().to_vec(),
                    page: self.state.page,
                    pages: self.state.page_count(),
                })
            }
            Command::Goto(n) => {
                let index = n
                    .checked_sub(1)
                    .ok_or(CommandError::IndexOutOfRange {
                        index: n,
                        len: self.state.results.len(),
                    })?;
                self.state.goto(index)?;
                self.state.record_history(line);
                let post = self.state.results[index].clone();
                Ok(Outcome::Selection { index, post })
            }
            Command::View(arg) => {
                if self.state.results.is_empty() {
                    return Err(CommandError::NoSelection);
                }
                let post = match arg {
                    None => self
                        .state
                        .selected()
                        .ok_or(CommandError::NoSelection)?,
                    Some(n) => {
                        let index =
                            n.checked_sub(1)
                                .ok_or(CommandError::IndexOutOfRange {
                                    index: n,
                                    len: self.state.results.len(),
                                })?;
                        self.state.results.get(index).ok_or(
                            CommandError::IndexOutOfRange {
                                index: n,
                                len: self.state.results.len(),
                            },
                        )?
                    }
                };
                Ok(Outcome::OpenUrl(post.url.clone()))
            }
            Command::SortLikes => {
                self.state.sort_by_likes();
                self.state.record_history(line);
                Ok(Outcome::Page {
                    posts: self.state.page_slice().to_vec(),
                    page: self.state.page,
                    pages: self.state.page_count(),
                })
            }
            Command::SortDate => {
                self.state.sort_by_date();
                self.state.record_history(line);
                Ok(Outcome::Page {
                    posts: self.state.page_slice().to_vec(),
                    page: self.state.page,
                    pages: self.state.page_count(),
                })
            }
            Command::AllowExplicit(allow) => {
                self.state.allow_explicit = allow;
                self.state.record_history(line);
                Ok(Outcome::ExplicitAllowed(allow))
            }
            Command::Clear => Ok(Outcome::Cleared),
            Command::Help => Ok(Outcome::Help(HELP_TEXT)),
            Command::Noop => Ok(Outcome::Noop),
        }
    }

    fn run_search(
        &mut self,
        line: &str,
        tags: &[String],
        mode: TagMode,
        sources: &[SourceId],
        modifiers: Modifiers,
    ) -> Outcome {
        let outcome = self
            .aggregator
            .search(tags, mode, sources, self.state.allow_explicit);
        let posts = apply_modifiers(outcome.posts, &modifiers, Utc::now());
        self.state.replace_results(posts);
        self.state.record_history(line);
        Outcome::SearchDone {
            total: self.state.results.len(),
            page: self.state.page_slice().to_vec(),
            failures: outcome.failures,
        }
    }
}

/// Apply the search modifiers: the day and minute windows first, then the
/// recency-sorted count limit. Posts without a timestamp fail the window
/// filters but survive the plain count limit.
pub fn apply_modifiers(posts: Vec<Post>, modifiers: &Modifiers, now: DateTime<Utc>) -> Vec<Post> {
    let mut posts = posts;

    if let Some(days) = modifiers.within_days {
        let threshold = window_start(now, Duration::try_days(days));
        posts.retain(|post| post.created_at.is_some_and(|at| at > threshold));
    }
    if let Some(minutes) = modifiers.within_minutes {
        let threshold = window_start(now, Duration::try_minutes(minutes));
        posts.retain(|post| post.created_at.is_some_and(|at| at > threshold));
    }
    if let Some(latest) = modifiers.latest {
        posts.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        posts.truncate(latest);
    }

    posts
}

/// A window too large for the date arithmetic clamps to the beginning of
/// time, which keeps every dated post.
fn window_start(now: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

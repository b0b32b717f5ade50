use once_cell::sync::Lazy;
use regex::Regex;

use crate::aggregator::TagMode;

static LATEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*date\((\d+)\)").unwrap());
static SINCE_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*depuis\((\d+)\)").unwrap());
static SINCE_MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*minute\((\d+)\)").unwrap());

/// Failure taxonomy for the command surface. Nothing here is fatal: every
/// error is reported and leaves session state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{}", range_message(.index, .len))]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid numeric argument: {0}")]
    InvalidNumericArgument(String),
    #[error("no post selected")]
    NoSelection,
}

fn range_message(index: &usize, len: &usize) -> String {
    if *len == 0 {
        format!("index {} out of range (no results)", index)
    } else {
        format!("index {} out of range (1-{})", index, len)
    }
}

/// Search-time post-filters, extracted from the raw line before tag
/// tokenization. `latest` is a recency-sorted count limit, despite the
/// `*date(N)` surface syntax it comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub latest: Option<usize>,
    pub within_days: Option<i64>,
    pub within_minutes: Option<i64>,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        self.latest.is_none() && self.within_days.is_none() && self.within_minutes.is_none()
    }
}

/// One fully parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search {
        tags: Vec<String>,
        mode: TagMode,
        modifiers: Modifiers,
    },
    /// `#tag`: single-tag search against the hashtag timeline source only.
    TagSearch { tag: String, modifiers: Modifiers },
    Next,
    Previous,
    List,
    Goto(usize),
    View(Option<usize>),
    SortLikes,
    SortDate,
    AllowExplicit(bool),
    Clear,
    Help,
    Noop,
}

/// Parse one input line into a typed command. Longest/most specific form
/// wins; anything unmatched is an `UnknownCommand` error.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let (rest, modifiers) = extract_modifiers(line)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Command::Noop);
    }

    if rest == "?" || rest == "help" {
        return Ok(Command::Help);
    }

    if let Some(tag_text) = rest.strip_prefix('#') {
        let tag = tag_text.trim().to_lowercase();
        if tag.is_empty() {
            return Err(CommandError::UnknownCommand(rest.to_string()));
        }
        return Ok(Command::TagSearch { tag, modifiers });
    }

    let mut words = rest.split_whitespace();
    let head = words.next().unwrap_or_default();
    let tail = rest[head.len()..].trim();

    match head {
        "s" | "s&" | "search" | "h" => {
            let forced_and = head == "s&";
            Ok(parse_search(tail, forced_and, modifiers))
        }
        "n" | "next" => expect_no_arg(tail, rest, Command::Next),
        "p" | "previous" => expect_no_arg(tail, rest, Command::Previous),
        "l" | "list" => expect_no_arg(tail, rest, Command::List),
        "clear" => expect_no_arg(tail, rest, Command::Clear),
        "goto" => {
            let index = parse_index(tail)?;
            Ok(Command::Goto(index))
        }
        "view" => {
            if tail.is_empty() {
                Ok(Command::View(None))
            } else {
                Ok(Command::View(Some(parse_index(tail)?)))
            }
        }
        "sort" => match tail {
            "like" => Ok(Command::SortLikes),
            "date" => Ok(Command::SortDate),
            _ => Err(CommandError::UnknownCommand(rest.to_string())),
        },
        "allow" if tail == "nsfw" => Ok(Command::AllowExplicit(true)),
        "unallow" if tail == "nsfw" => Ok(Command::AllowExplicit(false)),
        _ => Err(CommandError::UnknownCommand(rest.to_string())),
    }
}

fn expect_no_arg(tail: &str, rest: &str, command: Command) -> Result<Command, CommandError> {
    if tail.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::UnknownCommand(rest.to_string()))
    }
}

fn parse_search(tag_text: &str, forced_and: bool, modifiers: Modifiers) -> Command {
    let mode = if forced_and || tag_text.contains('&') {
        TagMode::And
    } else {
        TagMode::Or
    };
    let tags: Vec<String> = tag_text
        .split(|c: char| c == '&' || c.is_whitespace())
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    Command::Search {
        tags,
        mode,
        modifiers,
    }
}

fn parse_index(text: &str) -> Result<usize, CommandError> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| CommandError::InvalidNumericArgument(text.trim().to_string()))
}

/// Pull `*date(N)`, `*depuis(N)` and `*minute(N)` out of the line, returning
/// the stripped remainder. Each modifier may appear at most meaningfully
/// once; the first occurrence wins.
fn extract_modifiers(line: &str) -> Result<(String, Modifiers), CommandError> {
    let mut modifiers = Modifiers::default();
    let mut rest = line.to_string();

    if let Some(caps) = LATEST.captures(&rest) {
        modifiers.latest = Some(parse_index(&caps[1])?);
        rest = rest.replacen(&caps[0], "", 1);
    }
    if let Some(caps) = SINCE_DAYS.captures(&rest) {
        let days: i64 = caps[1]
            .parse()
            .map_err(|_| CommandError::InvalidNumericArgument(caps[1].to_string()))?;
        modifiers.within_days = Some(days);
        rest = rest.replacen(&caps[0], "", 1);
    }
    if let Some(caps) = SINCE_MINUTES.captures(&rest) {
        let minutes: i64 = caps[1]
            .parse()
            .map_err(|_| CommandError::InvalidNumericArgument(caps[1].to_string()))?;
        modifiers.within_minutes = Some(minutes);
        rest = rest.replacen(&caps[0], "", 1);
    }

    Ok((rest, modifiers))
}

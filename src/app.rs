use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::aggregator::Aggregator;
use crate::config;
use crate::data::{Connector, MastodonConnector, RedditConnector, WebSearchConnector};
use crate::mastodon;
use crate::post::Post;
use crate::rating::Classifier;
use crate::reddit;
use crate::session::{Interpreter, Outcome};
use crate::websearch;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let classifier = Arc::new(Classifier::new(cfg.search.explicit_words.clone()));
    let user_agent = cfg.http.user_agent.clone();
    let timeout = cfg.http.fetch_timeout;

    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    let mastodon_client = mastodon::Client::new(mastodon::ClientConfig {
        user_agent: user_agent.clone(),
        base_url: Some(cfg.mastodon.base_url.clone()),
        timeout: Some(timeout),
        http_client: None,
    })
    .context("build mastodon client")?;
    connectors.push(Arc::new(MastodonConnector::new(
        Arc::new(mastodon_client),
        classifier.clone(),
    )));

    let reddit_client = reddit::Client::new(reddit::ClientConfig {
        user_agent: user_agent.clone(),
        base_url: Some(cfg.reddit.base_url.clone()),
        timeout: Some(timeout),
        http_client: None,
    })
    .context("build reddit client")?;
    connectors.push(Arc::new(RedditConnector::new(
        Arc::new(reddit_client),
        classifier.clone(),
    )));

    if !cfg.websearch.api_key.trim().is_empty() {
        let websearch_client = websearch::Client::new(websearch::ClientConfig {
            user_agent: user_agent.clone(),
            api_key: cfg.websearch.api_key.clone(),
            base_url: Some(cfg.websearch.base_url.clone()),
            timeout: Some(timeout),
            http_client: None,
        })
        .context("build websearch client")?;
        connectors.push(Arc::new(WebSearchConnector::new(
            Arc::new(websearch_client),
            classifier.clone(),
        )));
    } else {
        println!("Web search disabled (no websearch.api_key configured).");
    }

    let aggregator = Aggregator::new(
        connectors,
        cfg.search.max_posts_per_source,
        cfg.search.max_posts_per_source as u32,
    );
    let mut interpreter = Interpreter::new(aggregator, cfg.search.page_size);

    println!("tagfeed {} — type ? for help.", crate::VERSION);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        match interpreter.execute(line) {
            Ok(outcome) => render(&mut stdout, outcome, interpreter.state().page_size())?,
            Err(err) => println!("error: {}", err),
        }
    }

    Ok(())
}

fn render(out: &mut impl Write, outcome: Outcome, page_size: usize) -> Result<()> {
    match outcome {
        Outcome::SearchDone {
            total,
            page,
            failures,
        } => {
            for failure in &failures {
                writeln!(
                    out,
                    "warning: {} '{}' failed: {}",
                    failure.source.as_str(),
                    failure.tag,
                    failure.message
                )?;
            }
            writeln!(out, "{} result(s).", total)?;
            render_rows(out, &page, 0)?;
        }
        Outcome::Page { posts, page, pages } => {
            render_rows(out, &posts, page * page_size)?;
            if pages > 1 {
                writeln!(out, "page {}/{}", page + 1, pages)?;
            }
        }
        Outcome::Selection { index, post } => {
            writeln!(out, "#{} [{}] @{}", index + 1, post.source.tag(), post.author)?;
            if let Some(at) = post.created_at {
                writeln!(out, "  published {}", at.format("%d %b %Y %H:%M UTC"))?;
            }
            writeln!(out, "  {}", post.preview(400))?;
            if !post.media_urls.is_empty() {
                writeln!(out, "  media: {}", post.media_urls.join(", "))?;
            }
            writeln!(
                out,
                "  {} likes, {} comments, rating {}",
                post.likes,
                post.num_comments,
                post.rating.as_str()
            )?;
            writeln!(out, "  {}", post.url)?;
        }
        Outcome::OpenUrl(url) => {
            if url.is_empty() {
                writeln!(out, "no link available for this post")?;
            } else if webbrowser::open(&url).is_err() {
                writeln!(out, "open manually: {}", url)?;
            }
        }
        Outcome::Help(text) => writeln!(out, "{}", text)?,
        Outcome::Cleared => write!(out, "\x1b[2J\x1b[H")?,
        Outcome::ExplicitAllowed(allow) => {
            if allow {
                writeln!(out, "Explicit posts will be included in future searches.")?;
            } else {
                writeln!(out, "Explicit posts will be excluded from future searches.")?;
            }
        }
        Outcome::Noop => {}
    }
    Ok(())
}

fn render_rows(out: &mut impl Write, posts: &[Post], offset: usize) -> Result<()> {
    for (i, post) in posts.iter().enumerate() {
        writeln!(
            out,
            "#{:<3} [{}] {:>4}♥ {:>3}c  {}",
            offset + i + 1,
            post.source.tag(),
            post.likes,
            post.num_comments,
            post.preview(100)
        )?;
    }
    Ok(())
}

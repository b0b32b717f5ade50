#![allow(clippy::uninlined_format_args)]

pub mod aggregator;
pub mod app;
pub mod command;
pub mod config;
pub mod data;
pub mod mastodon;
pub mod post;
pub mod rating;
pub mod reddit;
pub mod session;
pub mod websearch;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;

//! Slack as notification sink and channel directory.

mod client;

pub use client::SlackClient;

pub mod collector;
pub mod notifier;
pub mod summarizer;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("mergecast/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP client shared by the live adapters.
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("build http client")
}

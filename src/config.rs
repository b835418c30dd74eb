use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "mergecast.toml";
const CONFIG_VERSION: u32 = 1;

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const WEBHOOK_URL_ENV: &str = "DISCORD_WEBHOOK_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub github: GithubConfig,
    pub summarizer: SummarizerConfig,
    pub notifier: NotifierConfig,
    pub run: RunSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubConfig {
    pub repo: String,
    pub base_branch: String,
    pub api_url: String,
    pub per_page: u32,
    pub max_pages: u32,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummarizerConfig {
    pub api_url: String,
    pub model: String,
    /// Language the summary prose is written in.
    pub language: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifierConfig {
    #[serde(skip_serializing)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSettings {
    pub state_path: PathBuf,
    pub max_notifications: usize,
    pub simulate: bool,
    pub http_timeout_secs: u64,
    pub lock_stale_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GithubConfig {
                repo: "openai/codex".to_string(),
                base_branch: "main".to_string(),
                api_url: "https://api.github.com".to_string(),
                per_page: 100,
                max_pages: 3,
                token: None,
            },
            summarizer: SummarizerConfig {
                api_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                language: "English".to_string(),
                api_key: None,
            },
            notifier: NotifierConfig { webhook_url: None },
            run: RunSettings {
                state_path: PathBuf::from("state/state.json"),
                max_notifications: 20,
                simulate: true,
                http_timeout_secs: 30,
                lock_stale_secs: crate::state::lock::DEFAULT_LOCK_STALE_SECS,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    version: Option<u32>,
    github: Option<RawGithubConfig>,
    summarizer: Option<RawSummarizerConfig>,
    notifier: Option<RawNotifierConfig>,
    run: Option<RawRunSettings>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGithubConfig {
    repo: Option<String>,
    base_branch: Option<String>,
    api_url: Option<String>,
    per_page: Option<u32>,
    max_pages: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSummarizerConfig {
    api_url: Option<String>,
    model: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNotifierConfig {
    webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRunSettings {
    state_path: Option<String>,
    max_notifications: Option<usize>,
    simulate: Option<bool>,
    http_timeout_secs: Option<u64>,
    lock_stale_secs: Option<i64>,
}

/// Loads the config file (defaults when absent) and applies secrets from the
/// process environment.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let cfg = load_config_file(explicit)?;
    Ok(apply_env(cfg, |name| std::env::var(name).ok()))
}

pub fn load_config_file(explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if !path.exists() {
        if explicit.is_some() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Config::default());
    }

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let parsed: RawConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    validate_config(parsed, &path)
}

/// Secrets never live in the config file. The webhook URL may, but the
/// environment wins.
pub fn apply_env(mut cfg: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let read = |name: &str| sanitize_optional(lookup(name));
    cfg.github.token = read(GITHUB_TOKEN_ENV);
    cfg.summarizer.api_key = read(OPENAI_API_KEY_ENV);
    if let Some(url) = read(WEBHOOK_URL_ENV) {
        cfg.notifier.webhook_url = Some(url);
    }
    cfg
}

fn validate_config(raw: RawConfig, path: &Path) -> Result<Config> {
    let version = raw
        .version
        .ok_or_else(|| anyhow::anyhow!("{} missing required `version`", path.display()))?;
    if version != CONFIG_VERSION {
        bail!(
            "{} has unsupported version {version}; expected version = {CONFIG_VERSION}",
            path.display()
        );
    }

    let mut cfg = Config::default();

    if let Some(github) = raw.github {
        if let Some(repo) = sanitize_optional(github.repo) {
            validate_repo_slug(&repo)
                .with_context(|| format!("{} invalid `[github].repo`", path.display()))?;
            cfg.github.repo = repo;
        }
        if let Some(branch) = sanitize_optional(github.base_branch) {
            cfg.github.base_branch = branch;
        }
        if let Some(url) = sanitize_optional(github.api_url) {
            cfg.github.api_url = validate_http_url(&url, "[github].api_url", path)?;
        }
        if let Some(per_page) = github.per_page {
            if !(1..=100).contains(&per_page) {
                bail!("{} `[github].per_page` must be within 1..=100", path.display());
            }
            cfg.github.per_page = per_page;
        }
        if let Some(max_pages) = github.max_pages {
            if max_pages == 0 {
                bail!("{} `[github].max_pages` must be at least 1", path.display());
            }
            cfg.github.max_pages = max_pages;
        }
    }

    if let Some(summarizer) = raw.summarizer {
        if let Some(url) = sanitize_optional(summarizer.api_url) {
            cfg.summarizer.api_url = validate_http_url(&url, "[summarizer].api_url", path)?;
        }
        if let Some(model) = sanitize_optional(summarizer.model) {
            cfg.summarizer.model = model;
        }
        if let Some(language) = sanitize_optional(summarizer.language) {
            cfg.summarizer.language = language;
        }
    }

    if let Some(notifier) = raw.notifier
        && let Some(url) = sanitize_optional(notifier.webhook_url)
    {
        cfg.notifier.webhook_url = Some(validate_http_url(&url, "[notifier].webhook_url", path)?);
    }

    if let Some(run) = raw.run {
        if let Some(state_path) = sanitize_optional(run.state_path) {
            cfg.run.state_path = PathBuf::from(state_path);
        }
        if let Some(max) = run.max_notifications {
            if max == 0 {
                bail!(
                    "{} `[run].max_notifications` must be at least 1",
                    path.display()
                );
            }
            cfg.run.max_notifications = max;
        }
        if let Some(simulate) = run.simulate {
            cfg.run.simulate = simulate;
        }
        if let Some(timeout) = run.http_timeout_secs {
            if timeout == 0 {
                bail!(
                    "{} `[run].http_timeout_secs` must be at least 1",
                    path.display()
                );
            }
            cfg.run.http_timeout_secs = timeout;
        }
        if let Some(stale) = run.lock_stale_secs {
            if stale <= 0 {
                bail!("{} `[run].lock_stale_secs` must be positive", path.display());
            }
            cfg.run.lock_stale_secs = stale;
        }
    }

    Ok(cfg)
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_repo_slug(repo: &str) -> Result<()> {
    let mut parts = repo.split('/');
    let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected `owner/name`, got `{repo}`");
    };
    if owner.is_empty() || name.is_empty() {
        bail!("expected `owner/name`, got `{repo}`");
    }
    Ok(())
}

fn validate_http_url(url: &str, field: &str, path: &Path) -> Result<String> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!(
            "{} `{field}` must be an http(s) URL, got `{url}`",
            path.display()
        );
    }
    Ok(url.trim_end_matches('/').to_string())
}

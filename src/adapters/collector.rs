use crate::config::GithubConfig;
use crate::error::CollectorError;
use crate::events::{Event, MergedPr, Release};
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Read-only source of upstream events.
pub trait Collector {
    fn fetch_merged_prs(
        &self,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, CollectorError>;

    fn fetch_releases(&self, repo: &str) -> Result<Vec<Event>, CollectorError>;

    fn fetch_release_by_tag(&self, repo: &str, tag: &str) -> Result<Event, CollectorError>;
}

pub struct GitHubCollector {
    client: Client,
    api_url: String,
    base_branch: String,
    token: Option<String>,
    per_page: u32,
    max_pages: u32,
}

impl GitHubCollector {
    pub fn new(client: Client, cfg: &GithubConfig) -> Self {
        Self {
            client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            base_branch: cfg.base_branch.clone(),
            token: cfg.token.clone(),
            per_page: cfg.per_page.max(1),
            max_pages: cfg.max_pages.max(1),
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        match self.token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollectorError> {
        let response = self
            .get(url)
            .query(query)
            .send()
            .map_err(|err| CollectorError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CollectorError::NotFound {
                what: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CollectorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.json::<T>().map_err(|err| CollectorError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

impl Collector for GitHubCollector {
    fn fetch_merged_prs(
        &self,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, CollectorError> {
        let url = format!("{}/repos/{repo}/pulls", self.api_url);
        let mut out = Vec::new();
        for page in 1..=self.max_pages {
            let items: Vec<WirePull> = self.get_json(
                &url,
                &[
                    ("state", "closed".to_string()),
                    ("base", self.base_branch.clone()),
                    ("sort", "updated".to_string()),
                    ("direction", "desc".to_string()),
                    ("per_page", self.per_page.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let fetched = items.len();
            let oldest_update = items.iter().map(|p| p.updated_at).min();
            out.extend(merged_prs_from_wire(items, &self.base_branch));
            debug!(repo, page, fetched, "fetched pull request page");
            if !wants_next_page(fetched, self.per_page, oldest_update, since) {
                break;
            }
        }
        Ok(out)
    }

    fn fetch_releases(&self, repo: &str) -> Result<Vec<Event>, CollectorError> {
        let url = format!("{}/repos/{repo}/releases", self.api_url);
        let mut out = Vec::new();
        for page in 1..=self.max_pages {
            let items: Vec<WireRelease> = self.get_json(
                &url,
                &[
                    ("per_page", self.per_page.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let fetched = items.len();
            out.extend(items.into_iter().filter_map(release_from_wire));
            debug!(repo, page, fetched, "fetched release page");
            if !wants_next_page(fetched, self.per_page, None, None) {
                break;
            }
        }
        Ok(out)
    }

    fn fetch_release_by_tag(&self, repo: &str, tag: &str) -> Result<Event, CollectorError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CollectorError::InvalidRequest(
                "release tag must not be empty".to_string(),
            ));
        }
        let url = release_tag_url(&self.api_url, repo, tag)?.to_string();
        let wire: WireRelease = self.get_json(&url, &[]).map_err(|err| match err {
            CollectorError::NotFound { .. } => CollectorError::NotFound {
                what: format!("release tag {tag} in {repo}"),
            },
            other => other,
        })?;
        release_from_wire(wire).ok_or_else(|| CollectorError::Decode {
            url,
            message: "release has an empty tag name".to_string(),
        })
    }
}

/// A short page is the last one. Pull requests come newest-update first, so a
/// page reaching back past `since` ends the walk too.
pub(crate) fn wants_next_page(
    fetched: usize,
    per_page: u32,
    oldest_update: Option<DateTime<Utc>>,
    since: Option<DateTime<Utc>>,
) -> bool {
    if fetched < per_page as usize {
        return false;
    }
    match (since, oldest_update) {
        (Some(since), Some(oldest)) => oldest >= since,
        _ => true,
    }
}

/// Tags are free-form, so they go in as an encoded path segment.
pub(crate) fn release_tag_url(api_url: &str, repo: &str, tag: &str) -> Result<Url, CollectorError> {
    let mut url = Url::parse(api_url)
        .map_err(|err| CollectorError::InvalidRequest(format!("api url {api_url}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| CollectorError::InvalidRequest(format!("api url {api_url} cannot be a base")))?
        .pop_if_empty()
        .push("repos")
        .extend(repo.split('/'))
        .extend(["releases", "tags", tag]);
    Ok(url)
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePull {
    number: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    base: WireRef,
    #[serde(default)]
    user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRelease {
    id: u64,
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    author: Option<WireUser>,
}

/// Keeps pull requests merged into `base_branch`; closed-unmerged ones drop out.
pub(crate) fn merged_prs_from_wire(items: Vec<WirePull>, base_branch: &str) -> Vec<Event> {
    items
        .into_iter()
        .filter(|p| p.base.ref_name == base_branch)
        .filter_map(|p| {
            let merged_at = p.merged_at?;
            Some(Event::MergedPr(MergedPr {
                number: p.number,
                title: p.title.trim().to_string(),
                url: p.html_url,
                merged_at,
                base_ref: p.base.ref_name,
                body: normalize_optional_text(p.body),
                author: p.user.map(|u| u.login),
            }))
        })
        .collect()
}

pub(crate) fn release_from_wire(r: WireRelease) -> Option<Event> {
    let tag_name = normalize_optional_text(r.tag_name)?;
    let name = normalize_optional_text(r.name).unwrap_or_else(|| tag_name.clone());
    Some(Event::Release(Release {
        id: r.id,
        tag_name,
        name,
        url: r.html_url,
        // Drafts carry no publish time until they are published.
        published_at: r.published_at.unwrap_or(r.created_at),
        body: normalize_optional_text(r.body),
        author: r.author.map(|u| u.login),
        prerelease: r.prerelease,
        draft: r.draft,
    }))
}

fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub mod filter;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independently tracked upstream sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    PullRequests,
    Releases,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::PullRequests, Stream::Releases];

    pub fn as_str(self) -> &'static str {
        match self {
            Stream::PullRequests => "pull_requests",
            Stream::Releases => "releases",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPr {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub merged_at: DateTime<Utc>,
    pub base_ref: String,
    pub body: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub name: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub prerelease: bool,
    pub draft: bool,
}

/// An upstream occurrence that may be announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MergedPr(MergedPr),
    Release(Release),
}

impl Event {
    pub fn stream(&self) -> Stream {
        match self {
            Event::MergedPr(_) => Stream::PullRequests,
            Event::Release(_) => Stream::Releases,
        }
    }

    /// Identifier used for processed-set membership: the PR number, or the
    /// numeric release id.
    pub fn id(&self) -> u64 {
        match self {
            Event::MergedPr(pr) => pr.number,
            Event::Release(rel) => rel.id,
        }
    }

    /// The moment the event became final.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::MergedPr(pr) => pr.merged_at,
            Event::Release(rel) => rel.published_at,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Event::MergedPr(pr) => &pr.title,
            Event::Release(rel) => &rel.name,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Event::MergedPr(pr) => pr.body.as_deref(),
            Event::Release(rel) => rel.body.as_deref(),
        }
    }

    /// Short human label, e.g. `#42` or `v1.2.0`.
    pub fn label(&self) -> String {
        match self {
            Event::MergedPr(pr) => format!("#{}", pr.number),
            Event::Release(rel) => rel.tag_name.clone(),
        }
    }
}

pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

use crate::config::SummarizerConfig;
use crate::error::SummarizationError;
use crate::events::{Event, format_utc};
use reqwest::blocking::Client;
use serde_json::{Value, json};

const MAX_BODY_CHARS: usize = 8000;
const SYSTEM_PROMPT_PR: &str = "You summarize merged GitHub pull requests for a chat channel.";
const SYSTEM_PROMPT_RELEASE: &str = "You summarize GitHub releases for a chat channel.";
const SYSTEM_PROMPT_FORMAT: &str = "Return valid JSON only with string keys overview, details, impact. \
Keep each value to one or two sentences.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub overview: String,
    pub details: String,
    pub impact: String,
    /// Set when the summary was produced without the language model.
    pub fallback: bool,
}

impl Summary {
    /// Deterministic stand-in used when generation fails.
    pub fn fallback(event: &Event) -> Self {
        let (kind, link_hint) = match event {
            Event::MergedPr(_) => ("Pull request", "the pull request"),
            Event::Release(_) => ("Release", "the release notes"),
        };
        Self {
            overview: format!(
                "{kind} {}: {} ({})",
                event.label(),
                event.title(),
                format_utc(event.timestamp())
            ),
            details: format!("No generated summary is available; see {link_hint} for details."),
            impact: format!("Follow the link to review {link_hint}."),
            fallback: true,
        }
    }
}

pub trait Summarizer {
    fn summarize(&self, event: &Event) -> Result<Summary, SummarizationError>;
}

/// Summarizes through an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    api_url: String,
    model: String,
    language: String,
    api_key: Option<String>,
}

impl OpenAiSummarizer {
    pub fn new(client: Client, cfg: &SummarizerConfig) -> Self {
        Self {
            client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            language: cfg.language.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, event: &Event) -> Result<Summary, SummarizationError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SummarizationError::NotConfigured(format!(
                "{} is not set",
                crate::config::OPENAI_API_KEY_ENV
            ))
        })?;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&build_request(&self.model, &self.language, event))
            .send()
            .map_err(|err| SummarizationError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SummarizationError::Status(status.as_u16()));
        }
        let payload: Value = response
            .json()
            .map_err(|err| SummarizationError::Malformed(err.to_string()))?;
        parse_completion(&payload)
    }
}

pub(crate) fn build_request(model: &str, language: &str, event: &Event) -> Value {
    let subject = match event {
        Event::MergedPr(_) => SYSTEM_PROMPT_PR,
        Event::Release(_) => SYSTEM_PROMPT_RELEASE,
    };
    let system = format!("{subject} Write every value in {language}. {SYSTEM_PROMPT_FORMAT}");
    json!({
        "model": model,
        "temperature": 0.2,
        "response_format": {"type": "json_object"},
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": build_user_prompt(event)}
        ]
    })
}

pub(crate) fn build_user_prompt(event: &Event) -> String {
    let mut lines = match event {
        Event::MergedPr(pr) => vec![
            "Summarize this merged pull request.".to_string(),
            format!("PR number: {}", pr.number),
            format!("Title: {}", pr.title),
            format!("URL: {}", pr.url),
            format!("Merged at: {}", format_utc(pr.merged_at)),
        ],
        Event::Release(rel) => vec![
            "Summarize this release.".to_string(),
            format!("Release tag: {}", rel.tag_name),
            format!("Release name: {}", rel.name),
            format!("URL: {}", rel.url),
            format!("Published at: {}", format_utc(rel.published_at)),
        ],
    };
    if let Some(body) = event.body() {
        lines.push("Body:".to_string());
        lines.push(truncate_chars(body, MAX_BODY_CHARS));
    }
    lines.join("\n")
}

pub(crate) fn parse_completion(payload: &Value) -> Result<Summary, SummarizationError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            SummarizationError::Malformed("response must include message content".to_string())
        })?;
    let parsed: Value = serde_json::from_str(content)
        .map_err(|_| SummarizationError::Malformed("content must be valid JSON".to_string()))?;
    if !parsed.is_object() {
        return Err(SummarizationError::Malformed(
            "content JSON must be an object".to_string(),
        ));
    }
    Ok(Summary {
        overview: summary_field(&parsed, "overview")?,
        details: summary_field(&parsed, "details")?,
        impact: summary_field(&parsed, "impact")?,
        fallback: false,
    })
}

fn summary_field(parsed: &Value, name: &str) -> Result<String, SummarizationError> {
    parsed
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| SummarizationError::Malformed(format!("field `{name}` must be non-empty text")))
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

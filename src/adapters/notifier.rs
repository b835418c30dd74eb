use crate::adapters::summarizer::truncate_chars;
use crate::error::DeliveryError;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use std::cell::RefCell;
use std::io::Write;

/// Discord rejects webhook content longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

pub trait Notifier {
    fn send(&self, message: &str) -> Result<(), DeliveryError>;
}

pub struct WebhookNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, message: &str) -> Result<(), DeliveryError> {
        let content = prepare_content(message)?;
        let url = self.webhook_url.as_deref().ok_or_else(|| {
            DeliveryError::NotConfigured(format!(
                "{} is not set",
                crate::config::WEBHOOK_URL_ENV
            ))
        })?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "content": content }))
            .send()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok());
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Writes messages to a sink instead of posting them. Used for simulate runs.
pub struct StdoutNotifier<W: Write> {
    out: RefCell<W>,
}

impl StdoutNotifier<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StdoutNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Notifier for StdoutNotifier<W> {
    fn send(&self, message: &str) -> Result<(), DeliveryError> {
        let content = prepare_content(message)?;
        let mut out = self.out.borrow_mut();
        writeln!(out, "----- simulated notification -----\n{content}\n")
            .map_err(|err| DeliveryError::Transport(err.to_string()))
    }
}

pub(crate) fn prepare_content(message: &str) -> Result<String, DeliveryError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(DeliveryError::EmptyMessage);
    }
    Ok(truncate_chars(trimmed, MAX_MESSAGE_CHARS - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_is_rejected() {
        assert!(matches!(
            prepare_content("  \n "),
            Err(DeliveryError::EmptyMessage)
        ));
    }

    #[test]
    fn long_message_is_truncated_to_limit() {
        let content = prepare_content(&"a".repeat(5000)).unwrap();
        assert_eq!(content.chars().count(), MAX_MESSAGE_CHARS);
        assert!(content.ends_with('…'));
        assert_eq!(prepare_content("  hello  ").unwrap(), "hello");
    }

    #[test]
    fn missing_webhook_is_not_configured() {
        let notifier = WebhookNotifier::new(Client::new(), None);
        let err = notifier.send("hello").unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured(_)));
    }

    #[test]
    fn stdout_notifier_writes_trimmed_message() {
        let notifier = StdoutNotifier::new(Vec::new());
        notifier.send("  hi there ").unwrap();
        let written = String::from_utf8(notifier.into_inner()).unwrap();
        assert!(written.contains("simulated notification"));
        assert!(written.contains("\nhi there\n"));
    }
}

use crate::events::Stream;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventFailure {
    /// `None` when the failure is not tied to one event (a baseline write).
    pub id: Option<u64>,
    pub message: String,
}

/// What happened to one stream during one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamOutcome {
    pub stream: Stream,
    pub baseline: Option<DateTime<Utc>>,
    pub announced: Vec<u64>,
    pub deferred: usize,
    pub summary_fallbacks: Vec<u64>,
    pub delivery_failures: Vec<EventFailure>,
    pub state_write_failures: Vec<EventFailure>,
    pub collector_error: Option<String>,
}

impl StreamOutcome {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            baseline: None,
            announced: Vec::new(),
            deferred: 0,
            summary_fallbacks: Vec::new(),
            delivery_failures: Vec::new(),
            state_write_failures: Vec::new(),
            collector_error: None,
        }
    }

    /// Collector and state-write failures need an operator; everything else
    /// retries by itself on the next run.
    pub fn is_failure(&self) -> bool {
        self.collector_error.is_some() || !self.state_write_failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub simulate: bool,
    pub streams: Vec<StreamOutcome>,
}

impl RunReport {
    pub fn new(run_id: &str, simulate: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            simulate,
            streams: Vec::new(),
        }
    }

    pub fn stream(&self, stream: Stream) -> Option<&StreamOutcome> {
        self.streams.iter().find(|s| s.stream == stream)
    }

    pub fn is_failure(&self) -> bool {
        self.streams.iter().any(StreamOutcome::is_failure)
    }

    pub fn announced_count(&self) -> usize {
        self.streams.iter().map(|s| s.announced.len()).sum()
    }

    pub fn failure_summary(&self) -> String {
        let mut parts = Vec::new();
        for s in &self.streams {
            if let Some(err) = &s.collector_error {
                parts.push(format!("{}: fetch failed ({err})", s.stream));
            }
            for failure in &s.state_write_failures {
                match failure.id {
                    Some(id) => parts.push(format!(
                        "{}: announced {id} but state write failed ({}); it may be announced again",
                        s.stream, failure.message
                    )),
                    None => parts.push(format!(
                        "{}: baseline write failed ({})",
                        s.stream, failure.message
                    )),
                }
            }
        }
        parts.join("; ")
    }
}

use crate::adapters::collector::Collector;
use crate::adapters::notifier::Notifier;
use crate::adapters::summarizer::{Summarizer, Summary};
use crate::events::{Event, Stream, filter, format_utc};
use crate::logging::ndjson::{self, RunRecord};
use crate::run::message;
use crate::run::outcome::{EventFailure, RunReport, StreamOutcome};
use crate::state::store::StateStore;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub struct Collaborators<'a> {
    pub collector: &'a dyn Collector,
    pub summarizer: &'a dyn Summarizer,
    pub notifier: &'a dyn Notifier,
}

pub struct LoopInput {
    pub run_id: String,
    pub repo: String,
    /// Per-stream cap on notifications sent in one run.
    pub max_notifications: usize,
    /// Simulate runs fetch, summarize, and notify, but never write state.
    pub simulate: bool,
    pub ndjson_log: Option<PathBuf>,
}

/// Runs one pass over every stream. Failures stay inside the stream they hit;
/// the caller decides what the report means for the exit status.
pub fn run_pipeline(
    store: &mut StateStore,
    collab: &Collaborators<'_>,
    input: &LoopInput,
) -> RunReport {
    let mut report = RunReport::new(&input.run_id, input.simulate);
    for stream in Stream::ALL {
        report.streams.push(process_stream(store, collab, input, stream));
    }
    record(
        input,
        "run_finished",
        None,
        None,
        json!({
            "announced": report.announced_count(),
            "failed": report.is_failure(),
            "simulate": input.simulate,
        }),
    );
    report
}

fn process_stream(
    store: &mut StateStore,
    collab: &Collaborators<'_>,
    input: &LoopInput,
    stream: Stream,
) -> StreamOutcome {
    let mut outcome = StreamOutcome::new(stream);
    let cursor = store.cursor(stream).clone();

    let raw = match fetch(collab.collector, &input.repo, stream, cursor.last_seen_at) {
        Ok(raw) => raw,
        Err(err) => {
            error!(run_id = %input.run_id, %stream, error = %err, "fetch failed");
            record(
                input,
                "collector_failed",
                Some(stream),
                None,
                json!({"error": err.to_string()}),
            );
            outcome.collector_error = Some(err.to_string());
            return outcome;
        }
    };
    debug!(%stream, fetched = raw.len(), "fetched upstream events");

    if !cursor.is_initialized() {
        establish_baseline(store, input, stream, &raw, &mut outcome);
        return outcome;
    }

    let selection = filter::select(stream, &cursor, raw, input.max_notifications);
    outcome.deferred = selection.deferred.len();
    if outcome.deferred > 0 {
        info!(%stream, deferred = outcome.deferred, "cap reached; remaining events wait for the next run");
    }
    if selection.is_empty() {
        debug!(%stream, "nothing new");
        return outcome;
    }

    let next_deferred_at = selection.deferred.first().map(Event::timestamp);
    // Set once an event of this run is left unannounced; the cursor must not
    // move past it.
    let mut gap = false;

    for (idx, event) in selection.events.iter().enumerate() {
        let summary = summarize_or_fallback(collab.summarizer, input, event, &mut outcome);
        let text = message::render(event, &summary);

        if let Err(err) = collab.notifier.send(&text) {
            warn!(
                run_id = %input.run_id,
                %stream,
                id = event.id(),
                transient = err.is_transient(),
                error = %err,
                "delivery failed; event stays eligible"
            );
            record(
                input,
                "delivery_failed",
                Some(stream),
                Some(event.id()),
                json!({"error": err.to_string(), "transient": err.is_transient()}),
            );
            outcome.delivery_failures.push(EventFailure {
                id: Some(event.id()),
                message: err.to_string(),
            });
            gap = true;
            continue;
        }
        outcome.announced.push(event.id());
        info!(%stream, id = event.id(), label = %event.label(), "announced");
        record(
            input,
            "announced",
            Some(stream),
            Some(event.id()),
            json!({"timestamp": format_utc(event.timestamp()), "simulate": input.simulate}),
        );

        if input.simulate {
            continue;
        }

        let next_at = selection
            .events
            .get(idx + 1)
            .map(Event::timestamp)
            .or(next_deferred_at);
        let committed = if may_advance(gap, event.timestamp(), next_at) {
            store.commit(stream, event.id(), event.timestamp())
        } else {
            store.commit_held(stream, event.id())
        };
        if let Err(err) = committed {
            error!(
                run_id = %input.run_id,
                %stream,
                id = event.id(),
                error = %err,
                "announced but not recorded; it may be announced again"
            );
            record(
                input,
                "commit_failed",
                Some(stream),
                Some(event.id()),
                json!({"error": err.to_string()}),
            );
            outcome.state_write_failures.push(EventFailure {
                id: Some(event.id()),
                message: err.to_string(),
            });
        }
    }
    outcome
}

/// The cursor may only move to `at` when nothing earlier in this run is still
/// unannounced and the next remaining candidate is strictly later, so every
/// pending event stays inside the strictly-after window.
fn may_advance(gap: bool, at: DateTime<Utc>, next_at: Option<DateTime<Utc>>) -> bool {
    !gap && next_at.is_none_or(|next| next > at)
}

fn fetch(
    collector: &dyn Collector,
    repo: &str,
    stream: Stream,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Event>, crate::error::CollectorError> {
    match stream {
        Stream::PullRequests => collector.fetch_merged_prs(repo, since),
        Stream::Releases => collector.fetch_releases(repo),
    }
}

fn establish_baseline(
    store: &mut StateStore,
    input: &LoopInput,
    stream: Stream,
    raw: &[Event],
    outcome: &mut StreamOutcome,
) {
    let position = raw
        .iter()
        .filter(|e| e.stream() == stream)
        .map(Event::timestamp)
        .max()
        .unwrap_or_else(Utc::now);
    outcome.baseline = Some(position);
    info!(
        %stream,
        backlog = raw.len(),
        baseline = %format_utc(position),
        simulate = input.simulate,
        "first run for stream; recording baseline without announcing"
    );
    record(
        input,
        "baseline",
        Some(stream),
        None,
        json!({"position": format_utc(position), "backlog": raw.len(), "simulate": input.simulate}),
    );
    if input.simulate {
        return;
    }
    if let Err(err) = store.mark_seen_baseline(stream, position) {
        error!(%stream, error = %err, "baseline write failed");
        record(
            input,
            "commit_failed",
            Some(stream),
            None,
            json!({"error": err.to_string()}),
        );
        outcome.state_write_failures.push(EventFailure {
            id: None,
            message: err.to_string(),
        });
    }
}

fn summarize_or_fallback(
    summarizer: &dyn Summarizer,
    input: &LoopInput,
    event: &Event,
    outcome: &mut StreamOutcome,
) -> Summary {
    match summarizer.summarize(event) {
        Ok(summary) => summary,
        Err(err) => {
            warn!(id = event.id(), error = %err, "summary generation failed; using fallback");
            record(
                input,
                "summary_fallback",
                Some(event.stream()),
                Some(event.id()),
                json!({"error": err.to_string()}),
            );
            outcome.summary_fallbacks.push(event.id());
            Summary::fallback(event)
        }
    }
}

fn record(input: &LoopInput, event: &str, stream: Option<Stream>, id: Option<u64>, detail: Value) {
    let Some(path) = input.ndjson_log.as_deref() else {
        return;
    };
    let rec = RunRecord {
        run_id: &input.run_id,
        event,
        stream,
        id,
        detail,
    };
    if let Err(err) = ndjson::mirror_record(path, &rec) {
        warn!(path = %path.display(), error = %err, "run log write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 10, min, 0).unwrap()
    }

    #[test]
    fn advances_only_past_a_strictly_later_successor() {
        assert!(may_advance(false, at(1), None));
        assert!(may_advance(false, at(1), Some(at(2))));
        assert!(!may_advance(false, at(1), Some(at(1))));
    }

    #[test]
    fn earlier_failure_holds_the_cursor() {
        assert!(!may_advance(true, at(3), None));
        assert!(!may_advance(true, at(3), Some(at(4))));
    }
}

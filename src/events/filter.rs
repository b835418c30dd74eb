use crate::events::{Event, Release, Stream};
use crate::state::StreamCursor;
use std::collections::HashSet;

/// Outcome of selecting one stream's candidates for this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Events to announce this run, oldest first, at most `max_count`.
    pub events: Vec<Event>,
    /// Eligible events beyond the cap, oldest first. Left for a later run.
    pub deferred: Vec<Event>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub fn select(
    stream: Stream,
    cursor: &StreamCursor,
    raw_events: Vec<Event>,
    max_count: usize,
) -> Selection {
    let mut seen = HashSet::new();
    let mut eligible = raw_events
        .into_iter()
        .filter(|ev| ev.stream() == stream)
        .filter(|ev| seen.insert(ev.id()))
        .filter(|ev| !cursor.processed_ids.contains(&ev.id()))
        .filter(|ev| {
            cursor
                .last_seen_at
                .is_none_or(|last_seen| ev.timestamp() > last_seen)
        })
        .filter(passes_content_policy)
        .collect::<Vec<_>>();

    eligible.sort_by_key(|ev| (ev.timestamp(), ev.id()));
    let deferred = if eligible.len() > max_count {
        eligible.split_off(max_count)
    } else {
        Vec::new()
    };
    Selection {
        events: eligible,
        deferred,
    }
}

pub fn passes_content_policy(event: &Event) -> bool {
    match event {
        Event::MergedPr(_) => true,
        Event::Release(rel) => !is_excluded_release(rel),
    }
}

pub fn is_excluded_release(rel: &Release) -> bool {
    rel.prerelease || rel.draft || has_alpha_marker(&rel.tag_name) || has_alpha_marker(&rel.name)
}

fn has_alpha_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("alpha") || lowered.contains('α')
}

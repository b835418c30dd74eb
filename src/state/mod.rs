pub mod lock;
pub mod schema;
pub mod store;

use crate::events::Stream;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Durable progress marker for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamCursor {
    pub last_seen_at: Option<DateTime<Utc>>,
    pub processed_ids: BTreeSet<u64>,
}

impl StreamCursor {
    /// A cursor without a position has never been baselined.
    pub fn is_initialized(&self) -> bool {
        self.last_seen_at.is_some()
    }

    pub fn is_processed(&self, id: u64) -> bool {
        self.processed_ids.contains(&id)
    }

    fn advance_to(&mut self, at: DateTime<Utc>) {
        self.last_seen_at = Some(match self.last_seen_at {
            Some(current) if current >= at => current,
            _ => at,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedState {
    pub version: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub pull_requests: StreamCursor,
    pub releases: StreamCursor,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION,
            updated_at: None,
            pull_requests: StreamCursor::default(),
            releases: StreamCursor::default(),
        }
    }
}

impl PersistedState {
    pub fn cursor(&self, stream: Stream) -> &StreamCursor {
        match stream {
            Stream::PullRequests => &self.pull_requests,
            Stream::Releases => &self.releases,
        }
    }

    fn cursor_mut(&mut self, stream: Stream) -> &mut StreamCursor {
        match stream {
            Stream::PullRequests => &mut self.pull_requests,
            Stream::Releases => &mut self.releases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn advance_never_moves_backwards() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let mut cursor = StreamCursor::default();
        assert!(!cursor.is_initialized());
        cursor.advance_to(late);
        cursor.advance_to(early);
        assert_eq!(cursor.last_seen_at, Some(late));
    }

    #[test]
    fn streams_map_to_separate_cursors() {
        let mut state = PersistedState::default();
        state.cursor_mut(Stream::Releases).processed_ids.insert(7);
        assert!(state.cursor(Stream::Releases).is_processed(7));
        assert!(!state.cursor(Stream::PullRequests).is_processed(7));
    }
}

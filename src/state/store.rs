use crate::error::{StateLoadError, StateWriteError};
use crate::events::Stream;
use crate::state::{PersistedState, StreamCursor, schema};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive handle on the persisted cursors.
///
/// The in-memory copy always mirrors the last durable write: every mutation is
/// staged on a clone, written atomically, and only then swapped in.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: PersistedState,
}

impl StateStore {
    /// Reads the state file. A missing file is a first run, not an error.
    pub fn load(path: &Path) -> Result<Self, StateLoadError> {
        let state = match fs::read_to_string(path) {
            Ok(raw) => schema::decode(&raw).map_err(|message| StateLoadError::Parse {
                path: path.to_path_buf(),
                message,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => PersistedState::default(),
            Err(source) => {
                return Err(StateLoadError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn cursor(&self, stream: Stream) -> &StreamCursor {
        self.state.cursor(stream)
    }

    /// Establishes the first-run position for a stream without recording any
    /// identifiers.
    pub fn mark_seen_baseline(
        &mut self,
        stream: Stream,
        position: DateTime<Utc>,
    ) -> Result<(), StateWriteError> {
        let mut staged = self.state.clone();
        staged.cursor_mut(stream).advance_to(position);
        self.persist(staged)
    }

    /// Records an announced event and advances the cursor to its timestamp.
    pub fn commit(
        &mut self,
        stream: Stream,
        id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StateWriteError> {
        let mut staged = self.state.clone();
        let cursor = staged.cursor_mut(stream);
        cursor.processed_ids.insert(id);
        cursor.advance_to(timestamp);
        self.persist(staged)
    }

    /// Records an announced event while leaving the cursor where it is, so
    /// older unannounced events stay inside the next run's window.
    pub fn commit_held(&mut self, stream: Stream, id: u64) -> Result<(), StateWriteError> {
        let mut staged = self.state.clone();
        staged.cursor_mut(stream).processed_ids.insert(id);
        self.persist(staged)
    }

    fn persist(&mut self, mut staged: PersistedState) -> Result<(), StateWriteError> {
        staged.updated_at = Some(Utc::now());
        let raw = schema::encode(&staged).map_err(|err| StateWriteError {
            path: self.path.clone(),
            source: io::Error::other(err),
        })?;
        write_atomic(&self.path, &raw).map_err(|source| StateWriteError {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "state persisted");
        self.state = staged;
        Ok(())
    }
}

pub(crate) fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, hour, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_loads_empty_state() {
        let tmp = tempdir().unwrap();
        let store = StateStore::load(&tmp.path().join("state").join("state.json")).unwrap();
        assert_eq!(store.state(), &PersistedState::default());
        assert!(!store.cursor(Stream::PullRequests).is_initialized());
    }

    #[test]
    fn corrupt_file_is_a_load_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        fs::write(&path, "{\"version\": 1, \"releases\": 5}").unwrap();
        let err = StateStore::load(&path).unwrap_err();
        assert!(matches!(err, StateLoadError::Parse { .. }));
        assert!(err.to_string().contains("state.json"));
    }

    #[test]
    fn commit_persists_and_reloads() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("state.json");
        let mut store = StateStore::load(&path).unwrap();
        store.mark_seen_baseline(Stream::PullRequests, at(9)).unwrap();
        store.commit(Stream::PullRequests, 101, at(10)).unwrap();
        store.commit(Stream::PullRequests, 100, at(8)).unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        let cursor = reloaded.cursor(Stream::PullRequests);
        assert_eq!(cursor.last_seen_at, Some(at(10)));
        assert_eq!(
            cursor.processed_ids.iter().copied().collect::<Vec<_>>(),
            vec![100, 101]
        );
        assert!(reloaded.state().updated_at.is_some());
        assert!(!reloaded.cursor(Stream::Releases).is_initialized());
    }

    #[test]
    fn baseline_leaves_processed_ids_untouched() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let mut store = StateStore::load(&path).unwrap();
        store.mark_seen_baseline(Stream::Releases, at(12)).unwrap();
        let cursor = StateStore::load(&path).unwrap().cursor(Stream::Releases).clone();
        assert_eq!(cursor.last_seen_at, Some(at(12)));
        assert!(cursor.processed_ids.is_empty());
    }

    #[test]
    fn commit_held_records_id_without_moving_cursor() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let mut store = StateStore::load(&path).unwrap();
        store.mark_seen_baseline(Stream::PullRequests, at(1)).unwrap();
        store.commit_held(Stream::PullRequests, 7).unwrap();
        let cursor = store.cursor(Stream::PullRequests);
        assert_eq!(cursor.last_seen_at, Some(at(1)));
        assert!(cursor.is_processed(7));
    }

    #[test]
    fn failed_write_keeps_previous_state_in_memory_and_on_disk() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let mut store = StateStore::load(&path).unwrap();
        store.commit(Stream::PullRequests, 1, at(1)).unwrap();
        let before = store.state().clone();

        // A directory in place of the file makes the final rename fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir_all(path.join("blocker")).unwrap();

        let err = store.commit(Stream::PullRequests, 2, at(2)).unwrap_err();
        assert_eq!(err.path, path);
        assert_eq!(store.state(), &before);

        let leftovers = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn write_for_one_stream_leaves_other_cursor_alone() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let mut store = StateStore::load(&path).unwrap();
        store.mark_seen_baseline(Stream::Releases, at(3)).unwrap();
        store.commit(Stream::PullRequests, 5, at(9)).unwrap();
        let reloaded = StateStore::load(&path).unwrap();
        assert_eq!(reloaded.cursor(Stream::Releases).last_seen_at, Some(at(3)));
        assert!(reloaded.cursor(Stream::Releases).processed_ids.is_empty());
    }
}

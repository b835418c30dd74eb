use crate::state::store::write_atomic;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

pub(crate) const LOCK_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LOCK_STALE_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum LockState {
    Active,
    Released,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunLockRecord {
    version: u32,
    run_id: String,
    owner_pid: u32,
    started_at: String,
    state: LockState,
}

/// Advisory guard against two live runs writing the same state file.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    run_id: String,
    released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockDecision {
    /// No lock file yet.
    Free,
    /// A previous run released it cleanly.
    Released,
    TakeOver { reason: String },
    Held { reason: String },
}

pub fn lock_path(state_path: &Path) -> PathBuf {
    let name = state_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    state_path.with_file_name(format!("{name}.lock"))
}

impl RunLock {
    pub fn acquire(state_path: &Path, run_id: &str, stale_after_secs: i64) -> Result<Self> {
        let path = lock_path(state_path);
        let decision = evaluate_lock_at(&path, stale_after_secs, Utc::now())?;
        match &decision {
            LockDecision::Held { reason } => bail!("{reason}; refusing to start ({})", path.display()),
            LockDecision::TakeOver { reason } => {
                warn!(path = %path.display(), %reason, "taking over run lock");
            }
            LockDecision::Free | LockDecision::Released => {}
        }
        let record = RunLockRecord {
            version: LOCK_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            owner_pid: std::process::id(),
            started_at: Utc::now().to_rfc3339(),
            state: LockState::Active,
        };
        match decision {
            LockDecision::Free => create_lock(&path, &record)?,
            _ => write_lock(&path, &record)?,
        }
        info!(path = %path.display(), run_id, "run lock acquired");
        Ok(Self {
            path,
            run_id: run_id.to_string(),
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if !self.path.exists() {
            return Ok(());
        }
        let mut record = read_lock(&self.path)?;
        if record.run_id != self.run_id {
            // Someone else took it over; leave their record alone.
            return Ok(());
        }
        record.state = LockState::Released;
        write_lock(&self.path, &record)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}

pub(crate) fn evaluate_lock_at(
    path: &Path,
    stale_after_secs: i64,
    now: DateTime<Utc>,
) -> Result<LockDecision> {
    if !path.exists() {
        return Ok(LockDecision::Free);
    }
    let record = match read_lock(path) {
        Ok(record) => record,
        Err(err) => {
            return Ok(LockDecision::TakeOver {
                reason: format!("unreadable lock file ({err:#})"),
            });
        }
    };
    if record.state == LockState::Released {
        return Ok(LockDecision::Released);
    }
    let started_at = match DateTime::parse_from_rfc3339(&record.started_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(err) => {
            return Ok(LockDecision::TakeOver {
                reason: format!(
                    "lock from run {} has unreadable started_at `{}` ({err})",
                    record.run_id, record.started_at
                ),
            });
        }
    };
    let age_secs = now.signed_duration_since(started_at).num_seconds().max(0);
    if age_secs > stale_after_secs {
        return Ok(LockDecision::TakeOver {
            reason: format!(
                "stale lock from run {} (age={}s > {}s)",
                record.run_id, age_secs, stale_after_secs
            ),
        });
    }
    if !process_alive(record.owner_pid) {
        return Ok(LockDecision::TakeOver {
            reason: format!(
                "lock owner pid {} for run {} is not alive",
                record.owner_pid, record.run_id
            ),
        });
    }
    Ok(LockDecision::Held {
        reason: format!(
            "run {} appears active (owner pid {} alive; age={}s)",
            record.run_id, record.owner_pid, age_secs
        ),
    })
}

pub(crate) fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if pid == std::process::id() {
        return true;
    }
    let mut cmd = Command::new("kill");
    cmd.arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.status().map(|status| status.success()).unwrap_or(false)
}

fn read_lock(path: &Path) -> Result<RunLockRecord> {
    let raw = fs::read_to_string(path).with_context(|| format!("read lock {}", path.display()))?;
    let record =
        serde_json::from_str(&raw).with_context(|| format!("parse lock JSON {}", path.display()))?;
    Ok(record)
}

/// Creates the lock only if no other run created it since it was evaluated.
fn create_lock(path: &Path, record: &RunLockRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(record)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            bail!("lock {} was taken by another run", path.display())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("create lock {}", path.display()));
        }
    };
    file.write_all(raw.as_bytes())?;
    file.sync_all()
        .with_context(|| format!("sync lock {}", path.display()))
}

fn write_lock(path: &Path, record: &RunLockRecord) -> Result<()> {
    let raw = serde_json::to_string_pretty(record)?;
    write_atomic(path, &raw).with_context(|| format!("write lock {}", path.display()))
}

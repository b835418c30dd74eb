use crate::events::Stream;
use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// One line of the optional run log.
#[derive(Debug, Clone)]
pub struct RunRecord<'a> {
    pub run_id: &'a str,
    pub event: &'a str,
    pub stream: Option<Stream>,
    pub id: Option<u64>,
    pub detail: Value,
}

pub fn mirror_record(path: &Path, rec: &RunRecord<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let line = json!({
        "ts": Utc::now().to_rfc3339(),
        "run_id": rec.run_id,
        "event": rec.event,
        "stream": rec.stream,
        "id": rec.id,
        "detail": rec.detail
    });
    writeln!(f, "{}", line)?;
    Ok(())
}

mod r#loop;
pub mod message;
pub mod outcome;

pub use r#loop::{Collaborators, LoopInput, run_pipeline};

use crate::adapters::collector::{Collector, GitHubCollector};
use crate::adapters::http_client;
use crate::adapters::notifier::{Notifier, StdoutNotifier, WebhookNotifier};
use crate::adapters::summarizer::{OpenAiSummarizer, Summarizer, Summary};
use crate::config::{Config, WEBHOOK_URL_ENV, load_config};
use crate::events::{Stream, format_utc};
use crate::run::outcome::RunReport;
use crate::state::lock::RunLock;
use crate::state::store::StateStore;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct RunCommand {
    pub config: Option<PathBuf>,
    pub state: Option<PathBuf>,
    /// `None` keeps the configured mode.
    pub simulate: Option<bool>,
    pub max_notifications: Option<usize>,
    pub log: Option<PathBuf>,
    pub no_lock: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseCommand {
    pub config: Option<PathBuf>,
    pub tag: String,
    pub send: bool,
    pub simulate: Option<bool>,
}

pub fn execute_run(cmd: RunCommand) -> Result<()> {
    let cfg = load_config(cmd.config.as_deref())?;
    let simulate = cmd.simulate.unwrap_or(cfg.run.simulate);
    let max_notifications = cmd.max_notifications.unwrap_or(cfg.run.max_notifications);
    if max_notifications == 0 {
        bail!("--max-notifications must be greater than zero");
    }
    let state_path = cmd.state.clone().unwrap_or_else(|| cfg.run.state_path.clone());
    if !simulate && cfg.notifier.webhook_url.is_none() {
        bail!("{WEBHOOK_URL_ENV} is required for live runs");
    }

    let run_id = Uuid::new_v4().to_string();
    info!(
        %run_id,
        repo = %cfg.github.repo,
        simulate,
        max_notifications,
        state = %state_path.display(),
        "run started"
    );

    // Simulate runs never write state, so they never contend for it.
    let lock = if simulate || cmd.no_lock {
        None
    } else {
        Some(RunLock::acquire(&state_path, &run_id, cfg.run.lock_stale_secs)?)
    };
    let mut store = StateStore::load(&state_path)?;

    let client = http_client(cfg.run.http_timeout_secs)?;
    let collector = GitHubCollector::new(client.clone(), &cfg.github);
    let summarizer = OpenAiSummarizer::new(client.clone(), &cfg.summarizer);
    let notifier: Box<dyn Notifier> = if simulate {
        Box::new(StdoutNotifier::stdout())
    } else {
        Box::new(WebhookNotifier::new(client, cfg.notifier.webhook_url.clone()))
    };

    let report = run_pipeline(
        &mut store,
        &Collaborators {
            collector: &collector,
            summarizer: &summarizer,
            notifier: notifier.as_ref(),
        },
        &LoopInput {
            run_id: run_id.clone(),
            repo: cfg.github.repo.clone(),
            max_notifications,
            simulate,
            ndjson_log: cmd.log.clone(),
        },
    );

    finish_run(&report, lock)
}

/// Releases the lock, logs each stream, and turns the report into the exit
/// status. A lock that cannot be released never masks the run's own result.
fn finish_run(report: &RunReport, lock: Option<RunLock>) -> Result<()> {
    let run_id = &report.run_id;
    if let Some(lock) = lock
        && let Err(err) = lock.release()
    {
        warn!(%run_id, error = %format!("{err:#}"), "failed to release run lock");
    }

    for s in &report.streams {
        info!(
            %run_id,
            stream = %s.stream,
            announced = s.announced.len(),
            deferred = s.deferred,
            delivery_failures = s.delivery_failures.len(),
            summary_fallbacks = s.summary_fallbacks.len(),
            baseline = s.baseline.map(format_utc).as_deref().unwrap_or("-"),
            "stream finished"
        );
    }
    if report.is_failure() {
        bail!("run {run_id} failed: {}", report.failure_summary());
    }
    info!(%run_id, announced = report.announced_count(), "run finished");
    Ok(())
}

/// Summarizes one release by tag without reading or writing any state.
pub fn summarize_release(cmd: ReleaseCommand) -> Result<()> {
    let cfg = load_config(cmd.config.as_deref())?;
    let simulate = cmd.simulate.unwrap_or(cfg.run.simulate);
    let client = http_client(cfg.run.http_timeout_secs)?;
    let collector = GitHubCollector::new(client.clone(), &cfg.github);
    let summarizer = OpenAiSummarizer::new(client.clone(), &cfg.summarizer);
    let webhook = WebhookNotifier::new(client, cfg.notifier.webhook_url.clone());

    let deliver: Option<&dyn Notifier> = match (cmd.send, simulate) {
        (true, false) => Some(&webhook),
        (true, true) => {
            warn!("simulate mode; not sending the release summary");
            None
        }
        (false, _) => None,
    };
    let text = announce_release(&collector, &summarizer, deliver, &cfg, &cmd.tag)?;
    println!("{text}");
    Ok(())
}

/// Fetches, summarizes, and optionally delivers one release. Returns the
/// rendered message.
pub fn announce_release(
    collector: &dyn Collector,
    summarizer: &dyn Summarizer,
    notifier: Option<&dyn Notifier>,
    cfg: &Config,
    tag: &str,
) -> Result<String> {
    let event = collector
        .fetch_release_by_tag(&cfg.github.repo, tag)
        .with_context(|| format!("fetch release {tag} from {}", cfg.github.repo))?;
    let summary = summarizer.summarize(&event).unwrap_or_else(|err| {
        warn!(tag, error = %err, "summary generation failed; using fallback");
        Summary::fallback(&event)
    });
    let text = message::render(&event, &summary);
    if let Some(notifier) = notifier {
        notifier
            .send(&text)
            .with_context(|| format!("deliver release summary for {tag}"))?;
        info!(tag, "release summary delivered");
    }
    Ok(text)
}

pub fn inspect_state(config: Option<PathBuf>, state: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config.as_deref())?;
    let path = state.unwrap_or(cfg.run.state_path);
    let store = StateStore::load(&path)?;
    let persisted = store.state();

    println!("state: {}", path.display());
    println!("version: {}", persisted.version);
    println!(
        "updated_at: {}",
        persisted.updated_at.map(format_utc).as_deref().unwrap_or("never")
    );
    for stream in Stream::ALL {
        let cursor = store.cursor(stream);
        println!(
            "{stream}: last_seen_at={} processed={}",
            cursor
                .last_seen_at
                .map(format_utc)
                .as_deref()
                .unwrap_or("uninitialized"),
            cursor.processed_ids.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectorError, DeliveryError, SummarizationError};
    use crate::events::{Event, Release};
    use crate::run::outcome::StreamOutcome;
    use chrono::{DateTime, TimeZone, Utc};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    struct OneRelease;

    impl Collector for OneRelease {
        fn fetch_merged_prs(
            &self,
            _repo: &str,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Event>, CollectorError> {
            Ok(Vec::new())
        }

        fn fetch_releases(&self, _repo: &str) -> Result<Vec<Event>, CollectorError> {
            Ok(Vec::new())
        }

        fn fetch_release_by_tag(&self, _repo: &str, tag: &str) -> Result<Event, CollectorError> {
            if tag != "v1.2.0" {
                return Err(CollectorError::NotFound {
                    what: format!("release tag {tag}"),
                });
            }
            Ok(Event::Release(Release {
                id: 5,
                tag_name: tag.to_string(),
                name: tag.to_string(),
                url: format!("https://github.com/o/r/releases/tag/{tag}"),
                published_at: Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap(),
                body: Some("notes".to_string()),
                author: None,
                prerelease: false,
                draft: false,
            }))
        }
    }

    struct Broken;

    impl Summarizer for Broken {
        fn summarize(&self, _event: &Event) -> Result<Summary, SummarizationError> {
            Err(SummarizationError::Status(503))
        }
    }

    #[derive(Default)]
    struct Capture(RefCell<Vec<String>>);

    impl Notifier for Capture {
        fn send(&self, message: &str) -> Result<(), DeliveryError> {
            self.0.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn release_summary_falls_back_and_sends_only_when_asked() {
        let cfg = Config::default();
        let sink = Capture::default();

        let text = announce_release(&OneRelease, &Broken, None, &cfg, "v1.2.0").unwrap();
        assert!(text.contains("- Release: v1.2.0"));
        assert!(sink.0.borrow().is_empty());

        announce_release(&OneRelease, &Broken, Some(&sink), &cfg, "v1.2.0").unwrap();
        assert_eq!(sink.0.borrow().len(), 1);
    }

    #[test]
    fn live_run_without_webhook_fails_before_touching_state() {
        if std::env::var_os(WEBHOOK_URL_ENV).is_some() {
            return;
        }
        let tmp = tempdir().unwrap();
        let config = tmp.path().join("mergecast.toml");
        fs::write(&config, "version = 1\n[run]\nsimulate = false\n").unwrap();
        let state = tmp.path().join("state.json");

        let err = execute_run(RunCommand {
            config: Some(config),
            state: Some(state.clone()),
            ..RunCommand::default()
        })
        .unwrap_err();

        assert!(err.to_string().contains(WEBHOOK_URL_ENV));
        assert!(!state.exists());
        assert!(!crate::state::lock::lock_path(&state).exists());
    }

    #[test]
    fn lock_release_failure_keeps_the_run_verdict() {
        let tmp = tempdir().unwrap();
        let state = tmp.path().join("state.json");
        let lock = RunLock::acquire(&state, "r1", 900).unwrap();
        let lock_file = crate::state::lock::lock_path(&state);
        fs::remove_file(&lock_file).unwrap();
        fs::create_dir(&lock_file).unwrap();

        let mut failed = RunReport::new("r1", false);
        let mut releases = StreamOutcome::new(Stream::Releases);
        releases.collector_error = Some("timeout".to_string());
        failed.streams.push(releases);
        let err = finish_run(&failed, Some(lock)).unwrap_err();
        assert!(err.to_string().contains("releases: fetch failed (timeout)"));

        let other = tmp.path().join("other.json");
        let lock = RunLock::acquire(&other, "r2", 900).unwrap();
        let lock_file = crate::state::lock::lock_path(&other);
        fs::remove_file(&lock_file).unwrap();
        fs::create_dir(&lock_file).unwrap();
        finish_run(&RunReport::new("r2", false), Some(lock)).unwrap();
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = announce_release(&OneRelease, &Broken, None, &Config::default(), "v9")
            .unwrap_err();
        assert!(format!("{err:#}").contains("release tag v9"));
    }
}

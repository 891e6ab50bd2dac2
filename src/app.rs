use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend;
use crate::comments::CommentNode;
use crate::config;
use crate::data::{Services, VideoDetail};
use crate::orchestrator::{NoticeKind, Orchestrator, Settings};
use crate::watch::{PlaybackEvent, WatchEffect, WatchSession};

/// One entry of a replay file: a player event or a run of clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayStep {
    Tick { tick: u64 },
    Event(PlaybackEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReplayLine {
    pub step: usize,
    #[serde(flatten)]
    pub effect: WatchEffect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub lines: Vec<ReplayLine>,
    pub accumulated_secs: u64,
    pub view_threshold: Option<u64>,
    pub view_counted: bool,
    pub history_logged: bool,
}

impl ReplayReport {
    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        for line in &self.lines {
            writeln!(out, "{}", serde_json::to_string(line)?)?;
        }
        let threshold = self
            .view_threshold
            .map(|secs| format!("{secs}s"))
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(
            out,
            "summary: watched={}s threshold={} view_counted={} history_logged={}",
            self.accumulated_secs, threshold, self.view_counted, self.history_logged
        )?;
        Ok(())
    }
}

/// Runs a recorded playback through a watch session and collects what it
/// would have sent.
pub fn replay(events: &Path, config_file: Option<PathBuf>) -> Result<ReplayReport> {
    let cfg = config::load(config::LoadOptions {
        config_file,
        env_prefix: None,
    })
    .context("load config")?;
    let raw = fs::read_to_string(events)
        .with_context(|| format!("Failed to read replay file at {}", events.display()))?;
    let steps: Vec<ReplayStep> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse replay file at {}", events.display()))?;

    let mut session = WatchSession::new(cfg.watch.history_floor_secs);
    let mut lines = Vec::new();
    for (index, step) in steps.into_iter().enumerate() {
        let effects = match step {
            ReplayStep::Tick { tick } => session.advance(tick),
            ReplayStep::Event(event) => session.handle(event),
        };
        lines.extend(effects.into_iter().map(|effect| ReplayLine {
            step: index + 1,
            effect,
        }));
    }

    Ok(ReplayReport {
        lines,
        accumulated_secs: session.accumulated_secs(),
        view_threshold: session.view_threshold(),
        view_counted: session.view_counted(),
        history_logged: session.has_logged_history(),
    })
}

/// Loads up to `pages` pages of root comments for `video_code` from the
/// configured backend.
pub fn list_comments(
    video_code: &str,
    pages: u32,
    config_file: Option<PathBuf>,
) -> Result<Vec<CommentNode>> {
    let cfg = config::load(config::LoadOptions {
        config_file,
        env_prefix: None,
    })
    .context("load config")?;
    let client = backend::Client::new(cfg.api.client_config()).context("create backend client")?;
    let mut orchestrator = Orchestrator::new(Services::rest(Arc::new(client)), Settings::from(&cfg));
    orchestrator.open_video(&VideoDetail {
        code: video_code.to_string(),
        ..VideoDetail::default()
    });

    let wait = cfg.api.timeout + Duration::from_secs(1);
    for _ in 0..pages.max(1) {
        orchestrator.load_root_comments()?;
        orchestrator.settle(wait);
        if orchestrator.in_flight() > 0 {
            bail!("timed out waiting for comments of {}", video_code);
        }
        if let Some(notice) = orchestrator
            .take_notices()
            .into_iter()
            .find(|notice| notice.kind == NoticeKind::Error)
        {
            bail!(notice.message);
        }
        let has_more = orchestrator
            .active()
            .map(|session| session.comments().roots().has_more())
            .unwrap_or(false);
        if !has_more {
            break;
        }
    }

    Ok(orchestrator
        .active()
        .map(|session| session.comments().roots().iter().cloned().collect())
        .unwrap_or_default())
}

pub fn render_comment(node: &CommentNode) -> String {
    let author = if node.author_display.is_empty() {
        &node.author_username
    } else {
        &node.author_display
    };
    let replies = match node.child_count {
        0 => String::new(),
        1 => " (1 reply)".to_string(),
        n => format!(" ({n} replies)"),
    };
    format!(
        "[{}] {} {}{}: {}",
        node.id,
        node.created_at.format("%Y-%m-%d %H:%M"),
        author,
        replies,
        node.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_replay(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("events.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn steps_parse_ticks_and_events() {
        let steps: Vec<ReplayStep> = serde_json::from_str(
            r#"[{"event":"loadedmetadata","duration":100},{"event":"playing"},{"tick":3},{"event":"timeupdate","currentTime":2.5}]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                ReplayStep::Event(PlaybackEvent::LoadedMetadata { duration: 100.0 }),
                ReplayStep::Event(PlaybackEvent::Playing),
                ReplayStep::Tick { tick: 3 },
                ReplayStep::Event(PlaybackEvent::TimeUpdate { current_time: 2.5 }),
            ]
        );
    }

    #[test]
    fn replay_counts_view_at_two_fifths() {
        let dir = tempdir().unwrap();
        let events = write_replay(
            dir.path(),
            r#"[{"event":"loadedmetadata","duration":100},{"event":"playing"},{"tick":39},{"event":"pause"},{"tick":10},{"event":"playing"},{"tick":5}]"#,
        );
        let report = replay(&events, Some(dir.path().join("none.yaml"))).unwrap();
        assert_eq!(report.accumulated_secs, 40);
        assert_eq!(report.view_threshold, Some(40));
        assert!(report.view_counted);
        assert!(report.history_logged);
        let views: Vec<usize> = report
            .lines
            .iter()
            .filter(|line| line.effect == WatchEffect::IncrementView)
            .map(|line| line.step)
            .collect();
        assert_eq!(views, vec![7]);
    }

    #[test]
    fn report_prints_json_lines() {
        let report = ReplayReport {
            lines: vec![ReplayLine {
                step: 2,
                effect: WatchEffect::LogPosition { position: 0 },
            }],
            accumulated_secs: 0,
            view_threshold: None,
            view_counted: false,
            history_logged: false,
        };
        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "{\"step\":2,\"call\":\"log_position\",\"position\":0}\nsummary: watched=0s threshold=unknown view_counted=false history_logged=false\n"
        );
    }

    #[test]
    fn malformed_replay_is_an_error() {
        let dir = tempdir().unwrap();
        let events = write_replay(dir.path(), r#"[{"event":"rewind"}]"#);
        let err = replay(&events, Some(dir.path().join("none.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse replay file"));
    }
}

//! Replays a JSON-lines event log through an [`EventHandler`].

use std::path::Path;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::indexer::events::EventLog;
use crate::indexer::handler::EventHandler;

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: u64,
    pub skipped: u64,
}

/// Reads `path` line by line and applies each log in order. Blank lines are
/// ignored.
///
/// # Errors
///
/// Fails on the first unreadable line, malformed log, or sink error, naming
/// the line number. Logs before it stay applied.
pub async fn replay_file(path: &Path, handler: &EventHandler) -> anyhow::Result<ReplayStats> {
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open event log {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut stats = ReplayStats::default();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let log: EventLog = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_no}: malformed event", path.display()))?;
        let applied = handler
            .handle(&log)
            .await
            .with_context(|| format!("{}:{line_no}: {} failed", path.display(), log.event.name()))?;
        if applied {
            stats.applied += 1;
        } else {
            stats.skipped += 1;
        }
    }

    info!(
        path = %path.display(),
        applied = stats.applied,
        skipped = stats.skipped,
        checkpoint = ?handler.checkpoint(),
        "event log replayed"
    );
    Ok(stats)
}

// ABOUTME: JSON-lines replay feed - one Notification per line
// ABOUTME: Resumes after a checkpoint position and stops on handler error or shutdown

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use crate::handler::{dispatch, EventHandler};
use crate::notification::Notification;
use crate::position::Position;

/// Counters reported when a feed finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Notifications delivered to the handler
    pub dispatched: u64,
    /// Notifications at or before the start position
    pub skipped: u64,
}

/// Reads notifications line by line and delivers them to an [`EventHandler`].
///
/// Blank lines and lines starting with `#` are ignored. Notifications whose
/// position is at or before `start` were already covered by a checkpoint and
/// are skipped.
pub struct ReplayFeed<R> {
    lines: Lines<R>,
    start: Option<Position>,
}

impl<R: AsyncBufRead + Unpin + Send> ReplayFeed<R> {
    pub fn new(reader: R, start: Option<Position>) -> Self {
        Self {
            lines: reader.lines(),
            start,
        }
    }

    /// Drive `handler` until EOF, a handler error, or `stop` resolves.
    pub async fn run<H, F>(mut self, handler: &mut H, stop: F) -> Result<ReplayStats>
    where
        H: EventHandler,
        F: Future<Output = ()>,
    {
        let mut stats = ReplayStats::default();
        let mut line_no = 0usize;
        tokio::pin!(stop);

        if let Some(ref start) = self.start {
            debug!("Replay feed resuming after {}", start);
        }

        loop {
            let line = tokio::select! {
                biased;

                _ = &mut stop => {
                    debug!("Replay feed stopping at line {}: shutdown requested", line_no);
                    break;
                }
                line = self.lines.next_line() => line.context("failed to read replay feed")?,
            };

            let Some(line) = line else {
                debug!("Replay feed reached end of input after {} lines", line_no);
                break;
            };
            line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let notification: Notification = serde_json::from_str(trimmed)
                .with_context(|| format!("invalid notification on line {}", line_no))?;

            if self.is_covered(&notification) {
                stats.skipped += 1;
                continue;
            }

            dispatch(handler, &notification)
                .await
                .with_context(|| format!("handler stopped the feed at line {}", line_no))?;
            stats.dispatched += 1;
        }

        Ok(stats)
    }

    fn is_covered(&self, notification: &Notification) -> bool {
        match (&self.start, notification.position()) {
            (Some(start), Some(position)) => position <= start,
            _ => false,
        }
    }
}

impl ReplayFeed<BufReader<File>> {
    /// Open a feed file.
    pub async fn open(path: &Path, start: Option<Position>) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open replay feed {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), start))
    }
}

impl ReplayFeed<BufReader<Stdin>> {
    /// Read the feed from standard input.
    pub fn stdin(start: Option<Position>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), start)
    }
}

//! Output formatting and persistence for cycle snapshots.
//!
//! Snapshots are appended to the structured log sink as JSON lines through a
//! non-blocking writer, so a slow disk or log shipper never stalls polling.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::snapshot::Snapshot;

/// Lines the background writer holds before `emit` blocks.
const BUFFERED_LINES: usize = 1024;

/// Appends one JSON line per emitted [`Snapshot`].
pub struct SnapshotEmitter {
    writer: Box<dyn Write + Send>,
    emitted: u64,
    // Flushes buffered lines when the emitter is dropped.
    _guard: Option<WorkerGuard>,
}

impl SnapshotEmitter {
    /// Opens (or creates) the log file at `path` behind a background writer.
    ///
    /// The writer is not lossy: when its buffer is full, `emit` waits for
    /// the worker instead of dropping the line.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_buffered(path, BUFFERED_LINES)
    }

    fn open_buffered(path: &Path, buffered_lines: usize) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("snapshot log path {} has no file name", path.display()))?;

        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot log directory {}", dir.display()))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .with_context(|| format!("opening snapshot log {}", path.display()))?;
        let (non_blocking, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .buffered_lines_limit(buffered_lines)
            .finish(appender);

        debug!(path = %path.display(), "Snapshot log opened");

        Ok(Self {
            writer: Box::new(non_blocking),
            emitted: 0,
            _guard: Some(guard),
        })
    }

    /// Wraps an arbitrary writer; each snapshot is written with a single call.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            emitted: 0,
            _guard: None,
        }
    }

    /// Appends `snapshot` as one line. Failures are logged, never returned.
    pub fn emit(&mut self, snapshot: &Snapshot) {
        let mut line = match serde_json::to_vec(snapshot) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize snapshot");
                return;
            }
        };
        line.push(b'\n');

        if let Err(e) = self.writer.write_all(&line).and_then(|_| self.writer.flush()) {
            error!(error = %e, "Failed to write snapshot");
            return;
        }

        self.emitted += 1;
        debug!(routes = snapshot.routes.len(), "Snapshot emitted");
    }

    /// Number of snapshots successfully handed to the writer.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! JSON-lines file sink for the event stream
//!
//! Every record is sent over a channel to a dedicated writer thread, so the
//! engine never does file I/O while holding its state lock. A flush is a
//! round-trip through the same channel and therefore covers every record sent
//! before it.

use crate::core::resolver::Resolution;
use crate::core::types::{DeadlockReport, Event};
use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// One line of the log file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "record", rename_all = "lowercase")]
pub enum SinkRecord {
    Event(Event),
    Deadlock(DeadlockReport),
    Resolution(Resolution),
}

/// Commands for controlling the writer thread
#[derive(Debug)]
enum SinkCommand {
    /// Write a record to the file
    Write(SinkRecord),
    /// Flush all pending records to disk and signal completion
    Flush(Sender<()>),
}

/// Asynchronous JSON-lines writer
pub struct EventSink {
    sender: Sender<SinkCommand>,
    path: PathBuf,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").field("path", &self.path).finish()
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        // Records still queued must reach the file before the program exits
        if let Err(e) = self.flush() {
            tracing::warn!("failed to flush event sink on drop: {e:?}");
        }
    }
}

impl EventSink {
    /// Create a sink that writes to the specified file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the filename contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The directory containing the log file could not be created
    /// - The log file could not be opened for writing
    /// - The writer thread could not be spawned
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        #[allow(clippy::literal_string_with_formatting_args)]
        let file_path = if path_buf.to_string_lossy().contains("{timestamp}") {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(
                path_buf
                    .to_string_lossy()
                    .replace("{timestamp}", &timestamp.to_string()),
            )
        } else {
            path_buf
        };

        if let Some(parent) = file_path.parent()
            && parent.to_string_lossy() != ""
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .with_context(|| format!("Failed to open log file {}", file_path.display()))?;

        let (tx, rx) = unbounded::<SinkCommand>();
        thread::Builder::new()
            .name("ragwatch-sink".into())
            .spawn(move || writer_thread(file, rx))
            .context("Failed to spawn log writer thread")?;

        Ok(EventSink {
            sender: tx,
            path: file_path,
        })
    }

    /// Path actually written, with any placeholder expanded
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a record. Never blocks; a closed channel is reported and ignored.
    pub fn write(&self, record: SinkRecord) {
        if let Err(e) = self.sender.send(SinkCommand::Write(record)) {
            tracing::warn!("failed to queue log record: {e:?}");
        }
    }

    /// Force flush all pending records to disk
    ///
    /// Blocks until the writer thread confirms.
    ///
    /// # Errors
    /// Returns an error if the writer thread is gone or does not answer in time.
    pub fn flush(&self) -> Result<()> {
        let (flush_tx, flush_rx) = bounded(1);
        self.sender
            .send(SinkCommand::Flush(flush_tx))
            .context("Log writer thread is gone")?;
        flush_rx
            .recv_timeout(Duration::from_secs(10))
            .context("Flush operation timed out")
    }
}

/// Writer thread loop
///
/// Runs until every sender is dropped, then performs a final flush.
fn writer_thread(file: File, rx: Receiver<SinkCommand>) {
    let mut writer = BufWriter::new(file);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            SinkCommand::Write(record) => match serde_json::to_string(&record) {
                Ok(json) => {
                    if let Err(e) = writeln!(writer, "{json}") {
                        tracing::warn!("log write error: {e:?}");
                    }
                }
                Err(e) => tracing::warn!("log record serialization error: {e:?}"),
            },
            SinkCommand::Flush(responder) => {
                if let Err(e) = writer.flush() {
                    tracing::warn!("log flush error: {e:?}");
                }
                let _ = responder.send(());
            }
        }
    }

    if let Err(e) = writer.flush() {
        tracing::warn!("log final flush error: {e:?}");
    }
}

//! Run log.
//!
//! Every pipeline phase reports through a process-wide broadcast channel.
//! Entries are echoed to stdout and fanned out to subscribers, such as the
//! CLI's JSON-lines log file writer.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth for sub-steps
    #[serde(default)]
    pub indent: u8,
    pub timestamp: String,
}

impl LogEntry {
    fn with_level(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Error, message)
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to every subscriber
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    /// Print the entry and send it to all subscribers
    pub fn log(&self, entry: LogEntry) {
        let prefix = match entry.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(entry.indent as usize);
        println!("{}{} {}", indent, prefix, entry.message);

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::info(msg).with_indent(indent));
}

pub fn log_success_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::success(msg).with_indent(indent));
}

// =============================================================================
// JSON-lines log file
// =============================================================================

/// Background task writing every received entry as one JSON line.
pub struct LogFileWriter {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<io::Result<()>>,
}

impl LogFileWriter {
    /// Create (truncate) `path` and start consuming `rx`.
    pub async fn start(path: &Path, mut rx: broadcast::Receiver<LogEntry>) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path).await?);
        let (shutdown, mut stop) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    entry = rx.recv() => match entry {
                        Ok(entry) => write_line(&mut out, &entry).await?,
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stop => break,
                }
            }

            // Entries sent before shutdown are still queued
            loop {
                match rx.try_recv() {
                    Ok(entry) => write_line(&mut out, &entry).await?,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }

            out.flush().await
        });

        Ok(Self { shutdown, handle })
    }

    /// Stop after writing everything already logged.
    pub async fn finish(self) -> io::Result<()> {
        let _ = self.shutdown.send(());
        self.handle.await.map_err(io::Error::other)?
    }
}

async fn write_line(out: &mut BufWriter<File>, entry: &LogEntry) -> io::Result<()> {
    let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_receives_entries() {
        let broadcaster = LogBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.log(LogEntry::warning("3 rows dropped").with_indent(1));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.message, "3 rows dropped");
        assert_eq!(entry.indent, 1);
    }

    #[test]
    fn test_entry_serializes_lowercase_level() {
        let json = serde_json::to_value(LogEntry::success("done")).unwrap();
        assert_eq!(json["level"], "success");
        assert_eq!(json["indent"], 0);
    }

    #[tokio::test]
    async fn test_log_file_writes_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        let broadcaster = LogBroadcaster::new();

        let writer = LogFileWriter::start(&path, broadcaster.subscribe())
            .await
            .unwrap();
        broadcaster.log(LogEntry::info("Cleaning 4 records"));
        broadcaster.log(LogEntry::success("Cleaned 4 records"));
        writer.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LogEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "Cleaning 4 records");
        assert_eq!(lines[1].level, LogLevel::Success);
    }

    #[tokio::test]
    async fn test_log_file_replaces_previous_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "stale line from an earlier run\n").unwrap();
        let broadcaster = LogBroadcaster::new();

        let writer = LogFileWriter::start(&path, broadcaster.subscribe())
            .await
            .unwrap();
        broadcaster.log(LogEntry::info("Extracting ev.csv"));
        writer.finish().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 1);
    }
}

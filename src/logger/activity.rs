//! Background logger thread. The run loop never touches the log file: it hands
//! events to a [`ActivityLoggerHandle`], which queues them without blocking
//! and counts what it had to drop.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{HddError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Lifecycle and error events worth a line in the activity log.
///
/// Individual ON/OFF transitions are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
        poll_interval_ms: u64,
    },
    DaemonStopped {
        reason: String,
        indicator_writes: u64,
        uptime_secs: u64,
        dropped_events: u64,
    },
    IndicatorWriteFailed { code: String, message: String },
    SamplerFailed { code: String, message: String },
}

impl ActivityEvent {
    fn into_entry(self) -> LogEntry {
        let (event, severity, ok) = match &self {
            Self::DaemonStarted { .. } => (EventType::DaemonStart, Severity::Info, true),
            Self::DaemonStopped { .. } => (EventType::DaemonStop, Severity::Info, true),
            Self::IndicatorWriteFailed { .. } => {
                (EventType::IndicatorWriteFailed, Severity::Warning, false)
            }
            Self::SamplerFailed { .. } => (EventType::SamplerFailed, Severity::Critical, false),
        };
        let mut entry = LogEntry::new(event, severity);
        entry.ok = Some(ok);

        match self {
            Self::DaemonStarted {
                version,
                config_hash,
                poll_interval_ms,
            } => {
                entry.details = Some(format!(
                    "version={version} config_hash={config_hash} poll_interval_ms={poll_interval_ms}"
                ));
            }
            Self::DaemonStopped {
                reason,
                indicator_writes,
                uptime_secs,
                dropped_events,
            } => {
                entry.details = Some(format!(
                    "reason={reason} indicator_writes={indicator_writes} \
                     uptime_secs={uptime_secs} dropped_events={dropped_events}"
                ));
            }
            Self::IndicatorWriteFailed { code, message }
            | Self::SamplerFailed { code, message } => {
                entry.error_code = Some(code);
                entry.error_message = Some(message);
            }
        }
        entry
    }
}

enum Message {
    Event(ActivityEvent),
    Stop,
}

/// Cloneable sending side of the logger.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<Message>,
    dropped: Arc<AtomicU64>,
    dropped_total: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue `event` without blocking. A full queue drops it and bumps the
    /// dropped counter; a stopped logger ignores it.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(Message::Event(event)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events lost to a full queue since start.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: 256,
        }
    }
}

/// The running logger thread.
pub struct ActivityLogger {
    handle: ActivityLoggerHandle,
    join: JoinHandle<()>,
}

impl ActivityLogger {
    #[must_use]
    pub fn handle(&self) -> ActivityLoggerHandle {
        self.handle.clone()
    }

    /// Write out everything queued so far, sync the file and join the thread.
    pub fn finish(self) {
        // Blocking send: the stop marker must not be dropped.
        let _ = self.handle.tx.send(Message::Stop);
        if self.join.join().is_err() {
            eprintln!("[HDL-JSONL] logger thread panicked");
        }
    }
}

/// Start the logger thread.
///
/// Threads do not survive `fork`, so call this only after detaching.
pub fn spawn_logger(config: LoggerConfig) -> Result<ActivityLogger> {
    let (tx, rx) = bounded(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped: Arc::clone(&dropped),
        dropped_total: Arc::new(AtomicU64::new(0)),
    };

    let join = thread::Builder::new()
        .name("hddled-logger".to_string())
        .spawn(move || drain(&rx, JsonlWriter::open(config.jsonl_config), &dropped))
        .map_err(|e| HddError::Runtime {
            details: format!("cannot start logger thread: {e}"),
        })?;

    Ok(ActivityLogger { handle, join })
}

fn drain(rx: &Receiver<Message>, mut writer: JsonlWriter, dropped: &AtomicU64) {
    for message in rx {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut entry = LogEntry::new(EventType::Error, Severity::Warning);
            entry.details = Some(format!("dropped_events={lost}"));
            writer.write_entry(&entry);
        }

        match message {
            Message::Event(event) => writer.write_entry(&event.into_entry()),
            Message::Stop => break,
        }
    }
    writer.sync();
}

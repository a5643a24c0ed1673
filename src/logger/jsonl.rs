//! JSONL activity log: one JSON object per line for lifecycle and error events.
//!
//! Each line goes out in a single `write_all` and is flushed straight away;
//! these events are rare and the daemon may be killed at any moment.
//!
//! The writer steps down a sink chain on failure and never steps back up:
//! primary file → fallback file → stderr (`[HDL-JSONL]` prefix) → discard.
//! Logging problems never reach the caller.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DaemonStart,
    DaemonStop,
    IndicatorWriteFailed,
    SamplerFailed,
    Error,
}

/// One line of the log. `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Space-separated `key=value` pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines are currently going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        })
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// A file is rolled over before it would grow past this size.
    pub max_size_bytes: u64,
    /// Rolled files kept as `<path>.1` (newest) to `<path>.N`.
    pub max_rotated_files: u32,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/hddled/activity.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/hddled.jsonl")),
            max_size_bytes: 4 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// An open log file and its current length.
struct LogFile {
    path: PathBuf,
    out: BufWriter<File>,
    len: u64,
}

impl LogFile {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            len,
        })
    }

    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.out.write_all(line)?;
        self.out.flush()?;
        self.len += line.len() as u64;
        Ok(())
    }

    /// Shift `<path>.k` to `<path>.k+1`, move the live file to `<path>.1`,
    /// and reopen an empty live file.
    fn roll(&mut self, keep: u32) -> io::Result<()> {
        self.out.flush()?;
        if keep == 0 {
            fs::remove_file(&self.path)?;
        } else {
            for k in (1..keep).rev() {
                let from = numbered(&self.path, k);
                if from.exists() {
                    fs::rename(&from, numbered(&self.path, k + 1))?;
                }
            }
            fs::rename(&self.path, numbered(&self.path, 1))?;
        }
        *self = Self::open(&self.path)?;
        Ok(())
    }
}

fn numbered(base: &Path, k: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{k}"));
    PathBuf::from(name)
}

/// Append-only JSONL writer with size-based rollover and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<LogFile>,
    sink: Sink,
}

impl JsonlWriter {
    /// Open the primary file, falling down the chain if that fails.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Primary,
        };
        match LogFile::open(&writer.config.path) {
            Ok(file) => writer.file = Some(file),
            Err(e) => {
                eprintln!(
                    "[HDL-JSONL] cannot open {}: {e}",
                    writer.config.path.display()
                );
                writer.step_down();
            }
        }
        writer
    }

    #[must_use]
    pub fn sink(&self) -> Sink {
        self.sink
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        let mut line = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("[HDL-JSONL] dropping unserializable entry: {e}");
                return;
            }
        };
        line.push(b'\n');

        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    if self.try_append(&line).is_ok() {
                        return;
                    }
                    self.step_down();
                }
                Sink::Stderr => {
                    let _ = write!(io::stderr(), "[HDL-JSONL] {}", String::from_utf8_lossy(&line));
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    /// Push buffered bytes to disk. Called once when the logger thread exits.
    pub fn sync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.out.flush();
            let _ = file.out.get_ref().sync_data();
        }
    }

    fn try_append(&mut self, line: &[u8]) -> io::Result<()> {
        let max = self.config.max_size_bytes;
        let keep = self.config.max_rotated_files;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("no open log file"))?;
        if file.len > 0 && file.len + line.len() as u64 > max {
            file.roll(keep)?;
        }
        file.append(line)
    }

    fn step_down(&mut self) {
        self.file = None;
        self.sink = match self.sink {
            Sink::Primary => match self.config.fallback_path.as_deref().map(LogFile::open) {
                Some(Ok(file)) => {
                    eprintln!("[HDL-JSONL] using fallback {}", file.path.display());
                    self.file = Some(file);
                    Sink::Fallback
                }
                _ => {
                    eprintln!("[HDL-JSONL] no usable log file, writing to stderr");
                    Sink::Stderr
                }
            },
            Sink::Fallback => {
                eprintln!("[HDL-JSONL] fallback failed, writing to stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }
}

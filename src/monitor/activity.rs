//! Disk activity detection from the kernel's paging counters.
//!
//! The counter source is a live text stream (`/proc/vmstat` on Linux) that is
//! re-read from its start on every sample. Only inequality between successive
//! readings matters; rates and direction are never inspected.

#![allow(missing_docs)]

use std::io::{self, BufRead, Seek, SeekFrom};

use crate::core::errors::SamplerError;

// ──────────────────── counter source capability ────────────────────

/// Read-and-rewind access to a line-oriented `key value` stream.
pub trait CounterSource {
    /// Reposition to the beginning of the stream.
    fn rewind(&mut self) -> io::Result<()>;

    /// Append the next line, newline included, to `buf`. Returns the bytes
    /// read, 0 at end of stream. The bytes need not be UTF-8.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
}

/// Adapts any seekable buffered reader (a `BufReader<File>`, a `Cursor`) into a
/// [`CounterSource`].
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
}

impl<R: BufRead + Seek> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: BufRead + Seek> CounterSource for StreamSource<R> {
    fn rewind(&mut self) -> io::Result<()> {
        // BufReader discards its buffer on seek, so procfs is re-generated.
        self.inner.seek(SeekFrom::Start(0)).map(|_| ())
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.inner.read_until(b'\n', buf)
    }
}

impl<S: CounterSource + ?Sized> CounterSource for Box<S> {
    fn rewind(&mut self) -> io::Result<()> {
        (**self).rewind()
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        (**self).read_line(buf)
    }
}

// ──────────────────── counter model ────────────────────

/// One reading of the two paging counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterPair {
    pub pages_in: u64,
    pub pages_out: u64,
}

impl CounterPair {
    #[must_use]
    pub const fn new(pages_in: u64, pages_out: u64) -> Self {
        Self {
            pages_in,
            pages_out,
        }
    }

    /// Whether either counter differs from `previous`.
    #[must_use]
    pub fn differs_from(&self, previous: &Self) -> bool {
        self.pages_in != previous.pages_in || self.pages_out != previous.pages_out
    }
}

/// Names of the two counters within the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKeys {
    pub pages_in: String,
    pub pages_out: String,
}

impl Default for CounterKeys {
    fn default() -> Self {
        Self {
            pages_in: "pgpgin".to_string(),
            pages_out: "pgpgout".to_string(),
        }
    }
}

// ──────────────────── sampler ────────────────────

/// Reports whether the paging counters moved since the previous sample.
///
/// The previous pair starts at `(0, 0)`; the run loop takes a discarded
/// baseline sample before its first tick so that start-up never reports a
/// false positive.
pub struct ActivitySampler<S> {
    source: S,
    keys: CounterKeys,
    previous: CounterPair,
    line: Vec<u8>,
}

impl<S: CounterSource> ActivitySampler<S> {
    pub fn new(source: S) -> Self {
        Self::with_keys(source, CounterKeys::default())
    }

    pub fn with_keys(source: S, keys: CounterKeys) -> Self {
        Self {
            source,
            keys,
            previous: CounterPair::default(),
            line: Vec::with_capacity(64),
        }
    }

    /// Read the counters and compare them with the previous reading.
    ///
    /// The stored pair is replaced on every successful read. Errors leave it
    /// untouched and are never retried here.
    pub fn sample(&mut self) -> Result<bool, SamplerError> {
        let current = self.read_counters()?;
        let activity = current.differs_from(&self.previous);
        self.previous = current;
        Ok(activity)
    }

    /// The pair recorded by the last successful sample.
    #[must_use]
    pub fn last_sample(&self) -> CounterPair {
        self.previous
    }

    fn read_counters(&mut self) -> Result<CounterPair, SamplerError> {
        self.source
            .rewind()
            .map_err(|source| SamplerError::RewindFailed { source })?;

        let mut pages_in: Option<u64> = None;
        let mut pages_out: Option<u64> = None;

        loop {
            self.line.clear();
            match self.source.read_line(&mut self.line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            // Lines that are not UTF-8 cannot hold either key.
            let Ok(text) = std::str::from_utf8(&self.line) else {
                continue;
            };
            let Some((key, value)) = parse_line(text) else {
                continue;
            };
            if pages_in.is_none() && key == self.keys.pages_in {
                pages_in = Some(value);
            } else if pages_out.is_none() && key == self.keys.pages_out {
                pages_out = Some(value);
            }

            if pages_in.is_some() && pages_out.is_some() {
                break;
            }
        }

        match (pages_in, pages_out) {
            (Some(pages_in), Some(pages_out)) => Ok(CounterPair::new(pages_in, pages_out)),
            (None, None) => Err(SamplerError::MissingCounters {
                missing: format!("{} and {}", self.keys.pages_in, self.keys.pages_out),
            }),
            (None, Some(_)) => Err(SamplerError::MissingCounters {
                missing: self.keys.pages_in.clone(),
            }),
            (Some(_), None) => Err(SamplerError::MissingCounters {
                missing: self.keys.pages_out.clone(),
            }),
        }
    }
}

/// Split a `key value` line. Lines without an unsigned value yield `None`.
fn parse_line(line: &str) -> Option<(&str, u64)> {
    let mut fields = line.split_whitespace();
    let key = fields.next()?;
    let value = fields.next()?.parse::<u64>().ok()?;
    Some((key, value))
}

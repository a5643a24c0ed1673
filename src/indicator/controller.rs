//! Debounced indicator output: a write reaches the sink only when the
//! requested state differs from the last state written successfully.

#![allow(missing_docs)]

use std::io::{self, Seek, SeekFrom, Write};

use crate::core::errors::IndicatorError;

// ──────────────────── indicator sink capability ────────────────────

/// A single-value output that applies each write immediately.
pub trait IndicatorSink {
    fn write_state(&mut self, on: bool) -> io::Result<()>;
}

/// Writes `1\n` / `0\n` at offset 0 of a seekable writer and flushes, the
/// format sysfs GPIO `value` files expect.
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
}

impl<W: Write + Seek> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Seek> IndicatorSink for StreamSink<W> {
    fn write_state(&mut self, on: bool) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(if on { b"1\n" } else { b"0\n" })?;
        self.inner.flush()
    }
}

impl<S: IndicatorSink + ?Sized> IndicatorSink for Box<S> {
    fn write_state(&mut self, on: bool) -> io::Result<()> {
        (**self).write_state(on)
    }
}

// ──────────────────── controller ────────────────────

/// Owns the indicator sink and the last state written to it.
pub struct IndicatorController<S> {
    sink: S,
    /// `None` until the first successful write.
    state: Option<bool>,
    writes: u64,
}

impl<S: IndicatorSink> IndicatorController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: None,
            writes: 0,
        }
    }

    /// Drive the indicator to `state`, skipping the write if it is already there.
    ///
    /// A failed write leaves the stored state untouched, so repeating the same
    /// request retries the write.
    pub fn set(&mut self, state: bool) -> Result<(), IndicatorError> {
        if self.state == Some(state) {
            return Ok(());
        }

        self.sink
            .write_state(state)
            .map_err(|source| IndicatorError::WriteFailed {
                state: u8::from(state),
                source,
            })?;
        self.state = Some(state);
        self.writes += 1;
        Ok(())
    }

    /// Unconditionally write OFF, regardless of the stored state.
    pub fn force_off(&mut self) -> Result<(), IndicatorError> {
        self.state = None;
        self.set(false)
    }

    /// Last state written successfully, `None` if unknown.
    #[must_use]
    pub fn state(&self) -> Option<bool> {
        self.state
    }

    /// Number of successful writes since construction.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

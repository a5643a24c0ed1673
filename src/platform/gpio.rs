//! Sysfs GPIO binding for the indicator: export, direction, value file.
//!
//! Setup happens once before the run loop starts. The loop itself only ever
//! sees the opened value file, wrapped in a [`StreamSink`].

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::errors::{HddError, Result};
use crate::indicator::controller::StreamSink;

/// Indicator sink backed by a sysfs `value` file.
pub type GpioValueSink = StreamSink<File>;

/// One sysfs GPIO line, e.g. `/sys/class/gpio/gpio199`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioPin {
    root: PathBuf,
    number: u32,
}

impl GpioPin {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, number: u32) -> Self {
        Self {
            root: root.into(),
            number,
        }
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn export_path(&self) -> PathBuf {
        self.root.join("export")
    }

    #[must_use]
    pub fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.number))
    }

    #[must_use]
    pub fn direction_path(&self) -> PathBuf {
        self.pin_dir().join("direction")
    }

    #[must_use]
    pub fn value_path(&self) -> PathBuf {
        self.pin_dir().join("value")
    }

    /// Ask the kernel to expose the pin. A pin that is already exported is fine.
    pub fn export(&self) -> Result<()> {
        let path = self.export_path();
        match write_control(&path, &format!("{}\n", self.number)) {
            Err(HddError::Io { source, .. }) if is_already_exported(&source) => {
                eprintln!(
                    "[HDL-GPIO] pin {} already exported, reusing it",
                    self.number
                );
                Ok(())
            }
            other => other,
        }
    }

    pub fn set_direction_out(&self) -> Result<()> {
        write_control(&self.direction_path(), "out\n")
    }

    /// Open the value file for writing. The file must already exist.
    pub fn open_value_sink(&self) -> Result<GpioValueSink> {
        let path = self.value_path();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| HddError::io(&path, source))?;
        Ok(StreamSink::new(file))
    }

    /// Full bring-up: optional export + direction, then open the value file.
    pub fn prepare(&self, export: bool) -> Result<GpioValueSink> {
        if export {
            self.export()?;
            self.set_direction_out()?;
        }
        self.open_value_sink()
    }
}

fn write_control(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| HddError::io(path, source))?;
    file.write_all(contents.as_bytes())
        .map_err(|source| HddError::io(path, source))
}

#[cfg(unix)]
fn is_already_exported(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::EBUSY as i32)
}

#[cfg(not(unix))]
fn is_already_exported(_err: &std::io::Error) -> bool {
    false
}

//! Binding of the counter source to a procfs file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::core::errors::{HddError, Result};
use crate::monitor::activity::StreamSource;

/// Counter source backed by a file such as `/proc/vmstat`.
pub type FileCounterSource = StreamSource<BufReader<File>>;

/// Open `path` read-only as a rewindable counter source.
pub fn open_counter_source(path: &Path) -> Result<FileCounterSource> {
    let file = File::open(path).map_err(|source| HddError::io(path, source))?;
    Ok(StreamSource::new(BufReader::with_capacity(4096, file)))
}

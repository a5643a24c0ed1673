//! HDL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HddError>;

/// Failures reading the counter source. Always fatal to the run loop.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("counter source could not be rewound: {source}")]
    RewindFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("counter source is missing {missing}")]
    MissingCounters { missing: String },
}

/// Failures writing the indicator sink. Recoverable.
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("indicator write of {state} failed: {source}")]
    WriteFailed {
        state: u8,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type for hddled.
#[derive(Debug, Error)]
pub enum HddError {
    #[error("[HDL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[HDL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[HDL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[HDL-2001] {0}")]
    Sampler(#[from] SamplerError),

    #[error("[HDL-2002] {0}")]
    Indicator(#[from] IndicatorError),

    #[error("[HDL-3001] already running: pid {pid} holds {path}")]
    AlreadyRunning { path: PathBuf, pid: u32 },

    #[error("[HDL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[HDL-3003] failed to detach from terminal: {details}")]
    Daemonize { details: String },

    #[error("[HDL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl HddError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "HDL-1001",
            Self::MissingConfig { .. } => "HDL-1002",
            Self::ConfigParse { .. } => "HDL-1003",
            Self::Sampler(_) => "HDL-2001",
            Self::Indicator(_) => "HDL-2002",
            Self::AlreadyRunning { .. } => "HDL-3001",
            Self::Io { .. } => "HDL-3002",
            Self::Daemonize { .. } => "HDL-3003",
            Self::Runtime { .. } => "HDL-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Indicator writes are retried by the loop on the next differing state;
    /// sampler failures are not, since the counters are the only truth source.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Indicator(_) | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for HddError {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigParse {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HddError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> std::io::Error {
        std::io::Error::other("test")
    }

    fn all_errors() -> Vec<HddError> {
        vec![
            HddError::InvalidConfig {
                details: String::new(),
            },
            HddError::MissingConfig {
                path: PathBuf::new(),
            },
            HddError::ConfigParse {
                context: "",
                details: String::new(),
            },
            SamplerError::RewindFailed { source: io_err() }.into(),
            IndicatorError::WriteFailed {
                state: 1,
                source: io_err(),
            }
            .into(),
            HddError::AlreadyRunning {
                path: PathBuf::new(),
                pid: 1,
            },
            HddError::Io {
                path: PathBuf::new(),
                source: io_err(),
            },
            HddError::Daemonize {
                details: String::new(),
            },
            HddError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_errors();
        let codes: Vec<&str> = errors.iter().map(HddError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_hdl_prefix() {
        for err in &all_errors() {
            assert!(
                err.code().starts_with("HDL-"),
                "code {} must start with HDL-",
                err.code()
            );
            assert!(
                err.to_string().contains(err.code()),
                "display should contain code: {err}"
            );
        }
    }

    #[test]
    fn sampler_errors_are_not_retryable() {
        let missing: HddError = SamplerError::MissingCounters {
            missing: "pgpgin".to_string(),
        }
        .into();
        assert!(!missing.is_retryable());
        assert!(missing.to_string().contains("pgpgin"));

        let rewind: HddError = SamplerError::RewindFailed { source: io_err() }.into();
        assert!(!rewind.is_retryable());
    }

    #[test]
    fn indicator_errors_are_retryable() {
        let err: HddError = IndicatorError::WriteFailed {
            state: 0,
            source: io_err(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "HDL-2002");
    }

    #[test]
    fn io_convenience_constructor() {
        let err = HddError::io(
            "/sys/class/gpio/export",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "HDL-3002");
        assert!(err.to_string().contains("/sys/class/gpio/export"));
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: HddError = toml_err.into();
        assert_eq!(err.code(), "HDL-1003");
    }
}

//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use hddled::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{HddError, IndicatorError, Result, SamplerError};

// Monitor
pub use crate::monitor::activity::{
    ActivitySampler, CounterKeys, CounterPair, CounterSource, StreamSource,
};

// Indicator
pub use crate::indicator::controller::{IndicatorController, IndicatorSink, StreamSink};

// Platform
pub use crate::platform::gpio::{GpioPin, GpioValueSink};
pub use crate::platform::vmstat::{FileCounterSource, open_counter_source};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{RunLoop, ShutdownReason};
pub use crate::daemon::pidfile::{PidFile, ensure_not_running};
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;

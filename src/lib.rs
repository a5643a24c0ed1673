#![forbid(unsafe_code)]

//! hddled: drives a disk-activity LED from the kernel's paging counters.
//!
//! Each tick the [`monitor::activity::ActivitySampler`] re-reads `pgpgin` and
//! `pgpgout`, reports whether either moved, and the
//! [`indicator::controller::IndicatorController`] writes the LED only when the
//! state actually changes. The [`daemon::loop_main::RunLoop`] ties the two
//! together and stops cleanly on SIGTERM, SIGINT or SIGHUP.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use hddled::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use hddled::core::config::Config;
//! use hddled::monitor::activity::{ActivitySampler, StreamSource};
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod indicator;
pub mod logger;
pub mod monitor;
pub mod platform;

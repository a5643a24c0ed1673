//! Daemon subsystem: run loop, signal handling and the PID file guard.

#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod pidfile;
#[cfg(feature = "daemon")]
pub mod signals;

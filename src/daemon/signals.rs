//! Signal handling: SIGTERM/SIGINT/SIGHUP request a graceful shutdown.
//!
//! Uses the `signal-hook` crate for safe signal registration. The handler only
//! stores into an atomic flag; the run loop polls it at the top of each
//! iteration and again after waking from its sleep.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shutdown flag shared between the signal handler and the run loop.
///
/// Single writer (the handler or [`request_shutdown`](Self::request_shutdown)),
/// single reader (the loop), and the flag only ever goes from `false` to
/// `true`, so `Ordering::Relaxed` is sufficient.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// SIGTERM, SIGINT and SIGHUP all request shutdown. Registration is
    /// best-effort; failures are logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::manual();
        handler.register_os_hooks();
        handler
    }

    /// A handler with no OS hooks, driven only through
    /// [`request_shutdown`](Self::request_shutdown).
    pub fn manual() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Request termination. Idempotent and safe from any thread.
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Hook SIGTERM, SIGINT and SIGHUP onto this handler's flag.
    ///
    /// Lets a [`manual`](Self::manual) handler be armed later, e.g. after
    /// detaching from the terminal.
    pub fn register_os_hooks(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[HDL-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[HDL-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::SIGHUP;
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.shutdown_flag)) {
                eprintln!("[HDL-SIGNAL] failed to register SIGHUP: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

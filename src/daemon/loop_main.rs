//! Main run loop: poll the activity sampler at a fixed interval and mirror the
//! result onto the indicator until shutdown is requested.
//!
//! Lifecycle: `Initializing → Running → ShuttingDown → Terminated`.
//! [`RunLoop::init`] covers `Initializing` and [`RunLoop::run`] the rest, so
//! the caller can detach from the terminal between the two.
//!
//! Single thread of control. The only shared state is the shutdown flag held
//! by [`SignalHandler`]. The inter-tick sleep is cut into slices of at most
//! [`SHUTDOWN_CHECK_SLICE`] and the flag is checked between slices, so a stop
//! request is honoured promptly however long the poll interval is.

#![allow(missing_docs)]

use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::{HddError, Result};
use crate::daemon::signals::SignalHandler;
use crate::indicator::controller::{IndicatorController, IndicatorSink};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::monitor::activity::{ActivitySampler, CounterSource};

/// Longest uninterrupted sleep between shutdown-flag checks.
pub const SHUTDOWN_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Why [`RunLoop::run`] returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The shutdown flag was raised (signal or explicit request).
    Signal,
}

impl ShutdownReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
        }
    }
}

/// Owns the sampler and controller for the lifetime of the daemon.
pub struct RunLoop<S, I> {
    sampler: ActivitySampler<S>,
    controller: IndicatorController<I>,
    interval: Duration,
    signals: SignalHandler,
    logger: Option<ActivityLoggerHandle>,
    start_time: Instant,
}

impl<S: CounterSource, I: IndicatorSink> RunLoop<S, I> {
    /// Force the indicator off and take the baseline sample.
    ///
    /// The baseline's activity flag is discarded so the first tick compares
    /// real-to-real counters. On failure the indicator is forced off once
    /// more (best effort) and the error is returned.
    pub fn init(
        sampler: ActivitySampler<S>,
        controller: IndicatorController<I>,
        interval: Duration,
        signals: SignalHandler,
    ) -> Result<Self> {
        let mut this = Self {
            sampler,
            controller,
            interval,
            signals,
            logger: None,
            start_time: Instant::now(),
        };

        this.controller.force_off()?;
        if let Err(e) = this.sampler.sample() {
            this.best_effort_off();
            return Err(e.into());
        }
        Ok(this)
    }

    /// Attach the activity logger. Must be spawned after any detach.
    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn controller(&self) -> &IndicatorController<I> {
        &self.controller
    }

    /// Run until the shutdown flag is raised or the sampler fails.
    ///
    /// Returns `Ok(ShutdownReason::Signal)` on a requested stop. A sampler
    /// failure is returned as `Err` after the indicator has been forced off.
    /// Retryable failures (indicator writes) are logged and the loop carries
    /// on; the next differing state retries the write.
    pub fn run(mut self) -> Result<ShutdownReason> {
        let outcome = self.tick_until_stopped();

        // ──────── ShuttingDown ────────
        self.best_effort_off();

        let uptime_secs = self.start_time.elapsed().as_secs();
        let reason = match &outcome {
            Ok(r) => r.as_str().to_string(),
            Err(e) => format!("failure: {}", e.code()),
        };
        self.log(ActivityEvent::DaemonStopped {
            reason: reason.clone(),
            indicator_writes: self.controller.writes(),
            uptime_secs,
            dropped_events: self
                .logger
                .as_ref()
                .map_or(0, ActivityLoggerHandle::dropped_events),
        });
        eprintln!(
            "[HDL-LOOP] stopped ({reason}, writes={}, uptime={uptime_secs}s)",
            self.controller.writes()
        );

        outcome
    }

    // ──────────────────── internals ────────────────────

    fn tick_until_stopped(&mut self) -> Result<ShutdownReason> {
        loop {
            if self.signals.should_shutdown() {
                return Ok(ShutdownReason::Signal);
            }

            if self.sleep_or_shutdown() {
                return Ok(ShutdownReason::Signal);
            }

            if let Err(err) = self.tick() {
                self.report(&err);
                if !err.is_retryable() {
                    return Err(err);
                }
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        let active = self.sampler.sample()?;
        self.controller.set(active)?;
        Ok(())
    }

    /// Sleep one poll interval in slices. Returns true as soon as shutdown
    /// is requested.
    fn sleep_or_shutdown(&self) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.signals.should_shutdown() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(SHUTDOWN_CHECK_SLICE));
        }
    }

    fn report(&self, err: &HddError) {
        if err.is_retryable() {
            eprintln!("[HDL-LOOP] {err}");
        } else {
            eprintln!("[HDL-LOOP] tick failed, shutting down: {err}");
        }
        let (code, message) = (err.code().to_string(), err.to_string());
        self.log(match err {
            HddError::Indicator(_) => ActivityEvent::IndicatorWriteFailed { code, message },
            _ => ActivityEvent::SamplerFailed { code, message },
        });
    }

    fn best_effort_off(&mut self) {
        if let Err(e) = self.controller.force_off() {
            eprintln!("[HDL-LOOP] could not force indicator off: {e}");
        }
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::core::errors::SamplerError;
    use crate::logger::activity::{LoggerConfig, spawn_logger};
    use crate::logger::jsonl::JsonlConfig;

    /// Serves one scripted vmstat snapshot per rewind. Requests shutdown once
    /// `stop_after` snapshots have been served.
    struct Script {
        snapshots: VecDeque<String>,
        current: Vec<String>,
        served: usize,
        stop_after: Option<(usize, SignalHandler)>,
    }

    impl Script {
        fn new(pairs: &[(u64, u64)]) -> Self {
            Self {
                snapshots: pairs
                    .iter()
                    .map(|(i, o)| format!("nr_free_pages 1\npgpgin {i}\npgpgout {o}\n"))
                    .collect(),
                current: Vec::new(),
                served: 0,
                stop_after: None,
            }
        }

        fn stop_after(mut self, n: usize, signals: SignalHandler) -> Self {
            self.stop_after = Some((n, signals));
            self
        }
    }

    impl CounterSource for Script {
        fn rewind(&mut self) -> io::Result<()> {
            let snap = self
                .snapshots
                .pop_front()
                .ok_or_else(|| io::Error::other("script exhausted"))?;
            self.current = snap.lines().rev().map(|l| format!("{l}\n")).collect();
            self.served += 1;
            if let Some((n, signals)) = &self.stop_after
                && self.served >= *n
            {
                signals.request_shutdown();
            }
            Ok(())
        }

        fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
            match self.current.pop() {
                Some(line) => {
                    buf.extend_from_slice(line.as_bytes());
                    Ok(line.len())
                }
                None => Ok(0),
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink {
        written: Arc<Mutex<Vec<bool>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl IndicatorSink for SharedSink {
        fn write_state(&mut self, on: bool) -> io::Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(io::Error::other("gpio gone"));
            }
            self.written.lock().unwrap().push(on);
            Ok(())
        }
    }

    fn build(
        script: Script,
        sink: SharedSink,
        signals: SignalHandler,
    ) -> Result<RunLoop<Script, SharedSink>> {
        RunLoop::init(
            ActivitySampler::new(script),
            IndicatorController::new(sink),
            Duration::from_millis(1),
            signals,
        )
    }

    #[test]
    fn init_forces_off_and_discards_baseline() {
        let sink = SharedSink::default();
        let rl = build(
            Script::new(&[(100, 50)]),
            sink.clone(),
            SignalHandler::manual(),
        )
        .unwrap();
        // Baseline (100,50) differs from the initial (0,0) but must not light up.
        assert_eq!(*sink.written.lock().unwrap(), vec![false]);
        assert_eq!(rl.controller().state(), Some(false));
    }

    #[test]
    fn scripted_ticks_drive_indicator() {
        let signals = SignalHandler::manual();
        let sink = SharedSink::default();
        let script = Script::new(&[(100, 50), (100, 50), (100, 70), (100, 70), (150, 70)])
            .stop_after(5, signals.clone());
        let rl = build(script, sink.clone(), signals).unwrap();

        assert_eq!(rl.run().unwrap(), ShutdownReason::Signal);
        // init OFF, tick2 ON, tick3 OFF, tick4 ON, shutdown OFF.
        assert_eq!(
            *sink.written.lock().unwrap(),
            vec![false, true, false, true, false]
        );
    }

    #[test]
    fn sampler_failure_is_fatal_and_forces_off() {
        let sink = SharedSink::default();
        // Second snapshot lacks pgpgout.
        let mut script = Script::new(&[(1, 1), (2, 1)]);
        script.snapshots[1] = "pgpgin 5\n".to_string();
        let rl = build(script, sink.clone(), SignalHandler::manual()).unwrap();

        let err = rl.run().unwrap_err();
        assert!(matches!(
            err,
            HddError::Sampler(SamplerError::MissingCounters { .. })
        ));
        assert_eq!(*sink.written.lock().unwrap(), vec![false, false]);
    }

    #[test]
    fn rewind_failure_is_fatal() {
        let sink = SharedSink::default();
        // Only the baseline is scripted; the first tick cannot rewind.
        let rl = build(Script::new(&[(1, 1)]), sink, SignalHandler::manual()).unwrap();
        assert_eq!(rl.run().unwrap_err().code(), "HDL-2001");
    }

    #[test]
    fn init_fails_when_baseline_unreadable() {
        let sink = SharedSink::default();
        let err = build(Script::new(&[]), sink.clone(), SignalHandler::manual())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            HddError::Sampler(SamplerError::RewindFailed { .. })
        ));
        assert_eq!(*sink.written.lock().unwrap(), vec![false, false]);
    }

    #[test]
    fn init_fails_when_indicator_unwritable() {
        let sink = SharedSink::default();
        *sink.fail.lock().unwrap() = true;
        let err = build(Script::new(&[(1, 1)]), sink, SignalHandler::manual())
            .err()
            .unwrap();
        assert_eq!(err.code(), "HDL-2002");
    }

    #[test]
    fn indicator_failure_is_not_fatal() {
        let signals = SignalHandler::manual();
        let sink = SharedSink::default();
        let script = Script::new(&[(1, 1), (2, 1), (3, 1)]).stop_after(3, signals.clone());
        let rl = build(script, sink.clone(), signals).unwrap();
        *sink.fail.lock().unwrap() = true;

        // Every write fails, yet the loop keeps sampling until the flag is raised.
        assert_eq!(rl.run().unwrap(), ShutdownReason::Signal);
        assert_eq!(*sink.written.lock().unwrap(), vec![false]);
    }

    #[test]
    fn shutdown_before_first_tick_skips_sampling() {
        let signals = SignalHandler::manual();
        let sink = SharedSink::default();
        let rl = build(Script::new(&[(1, 1)]), sink.clone(), signals.clone()).unwrap();
        signals.request_shutdown();

        assert_eq!(rl.run().unwrap(), ShutdownReason::Signal);
        assert_eq!(*sink.written.lock().unwrap(), vec![false, false]);
    }

    #[test]
    fn shutdown_cuts_a_long_interval_short() {
        let signals = SignalHandler::manual();
        let sink = SharedSink::default();
        let rl = RunLoop::init(
            ActivitySampler::new(Script::new(&[(1, 1)])),
            IndicatorController::new(sink.clone()),
            Duration::from_secs(10),
            signals.clone(),
        )
        .unwrap();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signals.request_shutdown();
        });
        let started = Instant::now();
        assert_eq!(rl.run().unwrap(), ShutdownReason::Signal);
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(*sink.written.lock().unwrap(), vec![false, false]);
    }

    #[test]
    fn dropped_log_events_are_reported_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let logger = spawn_logger(LoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.path().join("activity.jsonl"),
                fallback_path: None,
                ..JsonlConfig::default()
            },
            channel_capacity: 16,
        })
        .unwrap();
        let signals = SignalHandler::manual();
        let rl = build(
            Script::new(&[(1, 1)]),
            SharedSink::default(),
            signals.clone(),
        )
        .unwrap()
        .with_logger(logger.handle());
        signals.request_shutdown();
        rl.run().unwrap();
        logger.finish();

        let log = std::fs::read_to_string(dir.path().join("activity.jsonl")).unwrap();
        let stop: serde_json::Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
        assert_eq!(stop["event"], "daemon_stop");
        assert!(
            stop["details"]
                .as_str()
                .unwrap()
                .ends_with("dropped_events=0")
        );
    }

    #[test]
    fn shutdown_during_sleep_ends_within_one_interval() {
        let signals = SignalHandler::manual();
        let sink = SharedSink::default();
        let rl = RunLoop::init(
            ActivitySampler::new(Script::new(&[(1, 1)])),
            IndicatorController::new(sink.clone()),
            Duration::from_millis(300),
            signals.clone(),
        )
        .unwrap();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signals.request_shutdown();
        });
        let started = Instant::now();
        assert_eq!(rl.run().unwrap(), ShutdownReason::Signal);
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(*sink.written.lock().unwrap(), vec![false, false]);
    }
}

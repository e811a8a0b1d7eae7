//! End-to-end orchestration: system under test, driver, collector.
//!
//! A harness run is a single one-shot scenario: start the system
//! under test, spawn the value-put driver on its own thread, and drive
//! the collector's reactor on the calling thread until the expected
//! number of log records has been observed (or a deadline elapses). The
//! system under test is always stopped, whatever the outcome.
//!
//! Verification synchronizes on records observed, not on the driver's
//! pacing sleeps; the deadline bounds the whole run so a stalled log
//! pipeline fails instead of hanging.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::collector::{Collector, CollectorStats};
use crate::driver::{DriverError, DriverHandle, PutDriver, PutTransport};
use crate::framing::Record;
use crate::reactor::ReactorError;
use crate::trace::{info, warn};

/// The system under test could not be started.
///
/// Fatal before any driver step runs: without a running system there is
/// nothing to provoke log emissions from.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("system under test failed to start: {reason}")]
pub struct StartupError {
    /// Collaborator-specific failure description.
    pub reason: String,
}

/// Control boundary of the system under test.
///
/// The harness treats it as an opaque process that, once running and
/// receiving value updates, emits log records on the collector's
/// connection.
pub trait SystemUnderTest {
    /// Starts the system.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the system cannot be brought up.
    fn start(&mut self) -> Result<(), StartupError>;

    /// Stops the system. Idempotent by contract.
    fn stop(&mut self);
}

/// Harness run parameters.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Number of records the run must observe to pass.
    pub expected_records: usize,
    /// Overall deadline for the run.
    pub deadline: Duration,
    /// Upper bound for one readiness wait, so deadline and driver
    /// completion are re-checked regularly.
    pub poll_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            expected_records: 0,
            deadline: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(50),
        }
    }
}

/// Error from a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The system under test did not start.
    #[error(transparent)]
    Startup(#[from] StartupError),
    /// The collector's readiness wait failed.
    #[error("collector failed: {0}")]
    Reactor(#[from] ReactorError),
    /// The driver aborted its step sequence.
    #[error("driver failed: {0}")]
    Driver(#[from] DriverError),
    /// The driver thread could not be spawned.
    #[error("failed to spawn driver thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The deadline elapsed before the expected records were observed.
    #[error("deadline elapsed with {observed} of {expected} expected records")]
    Deadline {
        /// Records the run was configured to observe.
        expected: usize,
        /// Records actually observed before the deadline.
        observed: usize,
    },
}

/// The pass/fail facts of a completed run.
#[derive(Debug)]
pub struct Outcome {
    /// All records observed, in arrival order.
    pub records: Vec<Record>,
    /// Steps the driver completed.
    pub puts_completed: usize,
    /// Collector counters at the end of the run.
    pub stats: CollectorStats,
}

/// One-shot harness tying the collector, the driver, and the system
/// under test together.
pub struct Harness<S: SystemUnderTest> {
    collector: Collector,
    sut: S,
    config: HarnessConfig,
}

impl<S: SystemUnderTest> Harness<S> {
    /// Creates a harness over an already-bound collector.
    pub fn new(collector: Collector, sut: S, config: HarnessConfig) -> Self {
        Self {
            collector,
            sut,
            config,
        }
    }

    /// Read access to the collector (e.g. for its bound address).
    #[must_use]
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Runs the full scenario.
    ///
    /// The system under test is stopped before this returns, on every
    /// path. If the deadline elapses while the driver thread is still
    /// running, the thread is left to finish on its own (its transport
    /// waits are bounded) rather than blocking the caller.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Startup`] if the system under test does not come
    /// up (fatal before any driver step); [`HarnessError::Driver`] if
    /// any put step fails; [`HarnessError::Deadline`] if too few records
    /// arrive in time; [`HarnessError::Reactor`] on a readiness-wait
    /// failure.
    pub fn run<T>(mut self, driver: PutDriver<T>) -> Result<Outcome, HarnessError>
    where
        T: PutTransport + Send + 'static,
    {
        self.sut.start()?;
        info!("system under test started");

        let result = self.collect(driver);
        self.sut.stop();
        info!("system under test stopped");
        result
    }

    fn collect<T>(&mut self, driver: PutDriver<T>) -> Result<Outcome, HarnessError>
    where
        T: PutTransport + Send + 'static,
    {
        let mut handle: Option<DriverHandle> = Some(driver.spawn().map_err(HarnessError::Spawn)?);
        let mut puts_completed = None;
        let deadline = Instant::now() + self.config.deadline;
        let mut records = Vec::new();

        loop {
            records.extend(self.collector.drain_records());

            if puts_completed.is_none() && handle.as_ref().is_some_and(DriverHandle::is_finished) {
                // Driver errors are hard failures; surface them at once.
                let finished = handle.take().expect("handle present");
                puts_completed = Some(finished.join()?);
            }

            if puts_completed.is_some() && records.len() >= self.config.expected_records {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    expected = self.config.expected_records,
                    observed = records.len(),
                    "deadline elapsed"
                );
                return Err(HarnessError::Deadline {
                    expected: self.config.expected_records,
                    observed: records.len(),
                });
            }

            let wait = self.config.poll_timeout.min(deadline - now);
            self.collector.poll_once(Some(wait))?;
        }

        Ok(Outcome {
            records,
            puts_completed: puts_completed.unwrap_or(0),
            stats: self.collector.stats(),
        })
    }
}

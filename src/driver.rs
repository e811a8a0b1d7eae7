//! Value-put driver: a scripted sequence of remote value updates.
//!
//! The driver runs independently of the reactor (its own thread of
//! control) and issues a fixed, paced sequence of synchronous value
//! updates against named targets in the system under test. Each update
//! is expected to provoke a log emission that eventually arrives at the
//! collector; the pacing interval between steps gives the asynchronous
//! log pipeline time to propagate each write's line before the next.
//!
//! The update transport itself is an external collaborator reached
//! through the three-call [`PutTransport`] contract; its protocol is out
//! of scope here. Both `open` and `write` are expected to wait a bounded
//! time internally and surface timeouts as [`TransportError`]s.

use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::trace::{debug, info};

/// A typed value payload for one update.
#[derive(Debug, Clone, PartialEq)]
pub enum PutValue {
    /// Double-precision floating point value.
    Double(f64),
    /// 64-bit integer value.
    Long(i64),
    /// Text value.
    Text(String),
}

impl fmt::Display for PutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// One scripted update: a target name and the value to write to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PutStep {
    /// Name of the target channel in the system under test.
    pub target: String,
    /// Value to write.
    pub value: PutValue,
}

/// Builds a step sequence writing `values` to a single target, in order.
pub fn steps_for_target(
    target: &str,
    values: impl IntoIterator<Item = PutValue>,
) -> Vec<PutStep> {
    values
        .into_iter()
        .map(|value| PutStep {
            target: target.to_owned(),
            value,
        })
        .collect()
}

/// Error from the value-update transport boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The target could not be resolved within the transport's bounded wait.
    #[error("failed to open channel to {target}: {reason}")]
    Channel {
        /// Target that could not be resolved.
        target: String,
        /// Transport-specific failure description.
        reason: String,
    },
    /// No acknowledgment for a write within the transport's bounded wait.
    #[error("write to {target} timed out waiting for acknowledgment")]
    WriteTimeout {
        /// Target the write was addressed to.
        target: String,
    },
}

/// The value-update transport: an addressable named endpoint that accepts
/// synchronous writes.
///
/// Implementations perform their own bounded waits; the driver never
/// retries. `close` is infallible by contract — teardown failures have
/// nothing actionable for the driver.
pub trait PutTransport {
    /// Open channel handle.
    type Handle;

    /// Resolves `target` to a channel handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Channel`] if the target cannot be
    /// resolved within the transport's bounded wait.
    fn open(&mut self, target: &str) -> Result<Self::Handle, TransportError>;

    /// Writes `value` synchronously and waits for acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::WriteTimeout`] if no acknowledgment
    /// arrives within the transport's bounded wait.
    fn write(&mut self, handle: &mut Self::Handle, value: &PutValue) -> Result<(), TransportError>;

    /// Releases the channel handle.
    fn close(&mut self, handle: Self::Handle);
}

/// Error from a driver run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A transport call failed; the remaining steps were aborted. A
    /// failed write breaks the log-generation premise of the harness, so
    /// continuing makes no sense.
    #[error("step {step} failed: {source}")]
    Transport {
        /// Zero-based index of the failed step.
        step: usize,
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// The driver thread panicked.
    #[error("driver thread panicked")]
    Panicked,
}

/// Executes a scripted step sequence, strictly sequentially.
///
/// No step begins before the previous one's acknowledgment (or failure);
/// a pacing sleep separates consecutive steps.
pub struct PutDriver<T: PutTransport> {
    transport: T,
    steps: Vec<PutStep>,
    pacing: Duration,
}

impl<T: PutTransport> PutDriver<T> {
    /// Creates a driver over `transport` for the given step sequence.
    pub fn new(transport: T, steps: Vec<PutStep>, pacing: Duration) -> Self {
        Self {
            transport,
            steps,
            pacing,
        }
    }

    /// Runs the step sequence on the calling thread.
    ///
    /// Returns the number of completed steps (always the full sequence
    /// length on success).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Transport`] for the first failing step; the
    /// remaining steps are not attempted.
    pub fn run(&mut self) -> Result<usize, DriverError> {
        for (step_idx, step) in self.steps.iter().enumerate() {
            if step_idx > 0 {
                thread::sleep(self.pacing);
            }

            debug!(step = step_idx, target = %step.target, value = %step.value, "put step");

            let mut handle = self
                .transport
                .open(&step.target)
                .map_err(|source| DriverError::Transport {
                    step: step_idx,
                    source,
                })?;
            self.transport
                .write(&mut handle, &step.value)
                .map_err(|source| DriverError::Transport {
                    step: step_idx,
                    source,
                })?;
            self.transport.close(handle);
        }
        Ok(self.steps.len())
    }

    /// Spawns the driver on its own named thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(mut self) -> io::Result<DriverHandle>
    where
        T: Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("logtrap-driver".into())
            .spawn(move || {
                info!("driver thread started");
                let result = self.run();
                info!("driver thread exiting");
                result
            })?;
        Ok(DriverHandle { handle })
    }
}

/// Handle to a spawned driver thread.
pub struct DriverHandle {
    handle: JoinHandle<Result<usize, DriverError>>,
}

impl DriverHandle {
    /// Returns `true` once the driver thread has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the driver to finish and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the driver's own error, or [`DriverError::Panicked`] if
    /// the thread panicked.
    pub fn join(self) -> Result<usize, DriverError> {
        self.handle.join().unwrap_or(Err(DriverError::Panicked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Transport that records every call and can fail a chosen write.
    #[derive(Default)]
    struct ScriptedTransport {
        ops: Arc<Mutex<Vec<String>>>,
        fail_write_at: Option<usize>,
        writes_seen: usize,
    }

    impl ScriptedTransport {
        fn recording(ops: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                ops,
                ..Self::default()
            }
        }
    }

    impl PutTransport for ScriptedTransport {
        type Handle = String;

        fn open(&mut self, target: &str) -> Result<String, TransportError> {
            self.ops.lock().unwrap().push(format!("open {target}"));
            Ok(target.to_owned())
        }

        fn write(&mut self, handle: &mut String, value: &PutValue) -> Result<(), TransportError> {
            if self.fail_write_at == Some(self.writes_seen) {
                return Err(TransportError::WriteTimeout {
                    target: handle.clone(),
                });
            }
            self.writes_seen += 1;
            self.ops.lock().unwrap().push(format!("write {handle}={value}"));
            Ok(())
        }

        fn close(&mut self, handle: String) {
            self.ops.lock().unwrap().push(format!("close {handle}"));
        }
    }

    fn scripted_values() -> Vec<PutValue> {
        vec![
            PutValue::Double(5677.0),
            PutValue::Double(11.0),
            PutValue::Double(88.0),
            PutValue::Double(99.0),
        ]
    }

    #[test]
    fn executes_steps_strictly_in_order() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport::recording(Arc::clone(&ops));
        let steps = steps_for_target("ao", scripted_values());

        let mut driver = PutDriver::new(transport, steps, Duration::ZERO);
        assert_eq!(driver.run().unwrap(), 4);

        let ops = ops.lock().unwrap();
        assert_eq!(
            *ops,
            vec![
                "open ao",
                "write ao=5677",
                "close ao",
                "open ao",
                "write ao=11",
                "close ao",
                "open ao",
                "write ao=88",
                "close ao",
                "open ao",
                "write ao=99",
                "close ao",
            ]
        );
    }

    #[test]
    fn write_failure_aborts_remaining_steps() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            ops: Arc::clone(&ops),
            fail_write_at: Some(1),
            writes_seen: 0,
        };
        let steps = steps_for_target("ao", scripted_values());

        let mut driver = PutDriver::new(transport, steps, Duration::ZERO);
        let err = driver.run().unwrap_err();
        match err {
            DriverError::Transport { step, source } => {
                assert_eq!(step, 1);
                assert_eq!(
                    source,
                    TransportError::WriteTimeout {
                        target: "ao".to_owned()
                    }
                );
            }
            DriverError::Panicked => panic!("unexpected panic result"),
        }

        // First step completed fully; second stopped at the failed write;
        // third and fourth never began.
        let ops = ops.lock().unwrap();
        assert_eq!(*ops, vec!["open ao", "write ao=5677", "close ao", "open ao"]);
    }

    #[test]
    fn open_failure_surfaces_channel_error() {
        struct RefusingTransport;
        impl PutTransport for RefusingTransport {
            type Handle = ();
            fn open(&mut self, target: &str) -> Result<(), TransportError> {
                Err(TransportError::Channel {
                    target: target.to_owned(),
                    reason: "no such target".to_owned(),
                })
            }
            fn write(&mut self, _handle: &mut (), _value: &PutValue) -> Result<(), TransportError> {
                unreachable!("open never succeeds")
            }
            fn close(&mut self, _handle: ()) {}
        }

        let steps = steps_for_target("missing", vec![PutValue::Long(1)]);
        let mut driver = PutDriver::new(RefusingTransport, steps, Duration::ZERO);
        let err = driver.run().unwrap_err();
        assert!(matches!(err, DriverError::Transport { step: 0, .. }));
    }

    #[test]
    fn pacing_separates_consecutive_steps() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport::recording(Arc::clone(&ops));
        let steps = steps_for_target("ao", vec![PutValue::Long(1), PutValue::Long(2), PutValue::Long(3)]);

        let pacing = Duration::from_millis(10);
        let started = Instant::now();
        let mut driver = PutDriver::new(transport, steps, pacing);
        driver.run().unwrap();

        // Two inter-step gaps for three steps.
        assert!(started.elapsed() >= pacing * 2);
    }

    #[test]
    fn spawn_runs_on_named_thread_and_joins() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport::recording(Arc::clone(&ops));
        let steps = steps_for_target("ao", vec![PutValue::Text("hi".to_owned())]);

        let handle = PutDriver::new(transport, steps, Duration::ZERO)
            .spawn()
            .unwrap();
        assert_eq!(handle.join().unwrap(), 1);
        assert_eq!(*ops.lock().unwrap(), vec!["open ao", "write ao=hi", "close ao"]);
    }
}

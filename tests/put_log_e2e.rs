//! End-to-end integration tests for the put-log capture harness.
//!
//! These tests verify the complete flow:
//! 1. The collector binds an OS-chosen port and registers its acceptor.
//! 2. A scripted in-process system under test connects to that port.
//! 3. The driver thread issues paced value updates through the transport.
//! 4. Each accepted update makes the system under test emit one log line.
//! 5. The reactor reassembles the fragmented stream into records.
//!
//! # Running with tracing
//!
//! To see full debug output, run with the tracing feature and no capture:
//! ```bash
//! RUST_LOG=logtrap=trace cargo test --features tracing -- --nocapture
//! ```

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use logtrap::driver::{steps_for_target, PutDriver, PutValue, TransportError};
use logtrap::harness::{Harness, HarnessConfig, HarnessError, StartupError, SystemUnderTest};
use logtrap::{Collector, CollectorConfig, PutTransport};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        logtrap::init_tracing();
    });
}

/// Shared connection from the scripted system under test to the collector.
type LogLink = Arc<Mutex<Option<TcpStream>>>;

/// Scripted system under test: on start it connects to the collector's
/// port, playing the role of the external system's log client.
struct ScriptedSut {
    collector_addr: SocketAddr,
    link: LogLink,
}

impl ScriptedSut {
    fn new(collector_addr: SocketAddr) -> (Self, LogLink) {
        let link = LogLink::default();
        (
            Self {
                collector_addr,
                link: Arc::clone(&link),
            },
            link,
        )
    }
}

impl SystemUnderTest for ScriptedSut {
    fn start(&mut self) -> Result<(), StartupError> {
        let stream = TcpStream::connect(self.collector_addr).map_err(|e| StartupError {
            reason: e.to_string(),
        })?;
        *self.link.lock().unwrap() = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the stream closes the collector's connection.
        *self.link.lock().unwrap() = None;
    }
}

/// Transport that makes the scripted system emit one log line per
/// accepted put, optionally fragmenting each line to exercise framing.
struct ScriptedTransport {
    link: LogLink,
    fragment: bool,
    fail_write_at: Option<usize>,
    writes_seen: usize,
}

impl ScriptedTransport {
    fn new(link: LogLink) -> Self {
        Self {
            link,
            fragment: false,
            fail_write_at: None,
            writes_seen: 0,
        }
    }

    fn emit(&self, line: &[u8]) -> std::io::Result<()> {
        let mut guard = self.link.lock().unwrap();
        let stream = guard.as_mut().expect("system under test is running");
        if self.fragment {
            // Two flushes, so the collector sees the line in two chunks.
            let split = line.len() / 2;
            stream.write_all(&line[..split])?;
            stream.flush()?;
            stream.write_all(&line[split..])?;
        } else {
            stream.write_all(line)?;
        }
        stream.flush()
    }
}

impl PutTransport for ScriptedTransport {
    type Handle = String;

    fn open(&mut self, target: &str) -> Result<String, TransportError> {
        if self.link.lock().unwrap().is_none() {
            return Err(TransportError::Channel {
                target: target.to_owned(),
                reason: "system under test not running".to_owned(),
            });
        }
        Ok(target.to_owned())
    }

    fn write(&mut self, handle: &mut String, value: &PutValue) -> Result<(), TransportError> {
        if self.fail_write_at == Some(self.writes_seen) {
            return Err(TransportError::WriteTimeout {
                target: handle.clone(),
            });
        }
        self.writes_seen += 1;

        let line = format!("{handle}={value}\n");
        self.emit(line.as_bytes())
            .map_err(|_| TransportError::WriteTimeout {
                target: handle.clone(),
            })
    }

    fn close(&mut self, _handle: String) {}
}

fn bind_collector() -> Collector {
    Collector::bind(
        "127.0.0.1:0".parse().unwrap(),
        CollectorConfig::default(),
    )
    .unwrap()
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
fn four_puts_produce_four_records_in_order() {
    init_test_tracing();

    let collector = bind_collector();
    let (sut, link) = ScriptedSut::new(collector.local_addr());
    let transport = ScriptedTransport::new(link);

    let driver = PutDriver::new(
        transport,
        steps_for_target("ao", scripted_values()),
        Duration::from_millis(5),
    );
    let config = HarnessConfig {
        expected_records: 4,
        deadline: Duration::from_secs(5),
        ..HarnessConfig::default()
    };

    let outcome = Harness::new(collector, sut, config).run(driver).unwrap();

    assert_eq!(outcome.puts_completed, 4);
    let texts: Vec<_> = outcome.records.iter().map(|r| r.text().into_owned()).collect();
    assert_eq!(texts, vec!["ao=5677", "ao=11", "ao=88", "ao=99"]);
    assert_eq!(outcome.stats.accepted, 1);
    assert_eq!(outcome.stats.read_errors, 0);
}

#[test]
fn fragmented_lines_are_reassembled() {
    init_test_tracing();

    let collector = bind_collector();
    let (sut, link) = ScriptedSut::new(collector.local_addr());
    let transport = ScriptedTransport {
        fragment: true,
        ..ScriptedTransport::new(link)
    };

    let driver = PutDriver::new(
        transport,
        steps_for_target("ao", scripted_values()),
        Duration::from_millis(5),
    );
    let config = HarnessConfig {
        expected_records: 4,
        deadline: Duration::from_secs(5),
        ..HarnessConfig::default()
    };

    let outcome = Harness::new(collector, sut, config).run(driver).unwrap();

    // Fragmentation at the transport must be invisible after framing.
    let texts: Vec<_> = outcome.records.iter().map(|r| r.text().into_owned()).collect();
    assert_eq!(texts, vec!["ao=5677", "ao=11", "ao=88", "ao=99"]);
}

#[test]
fn failed_write_fails_the_whole_run() {
    init_test_tracing();

    let collector = bind_collector();
    let (sut, link) = ScriptedSut::new(collector.local_addr());
    let transport = ScriptedTransport {
        fail_write_at: Some(2),
        ..ScriptedTransport::new(link)
    };

    let driver = PutDriver::new(
        transport,
        steps_for_target("ao", scripted_values()),
        Duration::from_millis(5),
    );
    let config = HarnessConfig {
        expected_records: 4,
        deadline: Duration::from_secs(5),
        ..HarnessConfig::default()
    };

    let err = Harness::new(collector, sut, config).run(driver).unwrap_err();
    assert!(matches!(err, HarnessError::Driver(_)), "got: {err}");
}

#[test]
fn unreachable_system_fails_startup_before_any_put() {
    init_test_tracing();

    let collector = bind_collector();
    // Point the system under test at a dead address.
    let (sut, link) = ScriptedSut::new("127.0.0.1:1".parse().unwrap());
    let transport = ScriptedTransport::new(link);

    let driver = PutDriver::new(
        transport,
        steps_for_target("ao", scripted_values()),
        Duration::ZERO,
    );

    let err = Harness::new(collector, sut, HarnessConfig::default())
        .run(driver)
        .unwrap_err();
    assert!(matches!(err, HarnessError::Startup(_)), "got: {err}");
}

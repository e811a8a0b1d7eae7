//! # logtrap
//!
//! A one-shot, event-driven log-capture harness: a reactor-driven TCP
//! collector that reassembles newline-delimited log records from an
//! arbitrarily fragmented byte stream, paired with a scripted value-put
//! driver that provokes those records from a system under test.
//!
//! ## Architecture
//!
//! Two threads of control, sharing no memory:
//! - The **reactor thread** runs the collector: a readiness multiplexer
//!   dispatching the connection acceptor and frame reader, with the pure
//!   framer splitting the byte stream into records.
//! - The **driver thread** issues a fixed, paced sequence of synchronous
//!   value updates through an external transport; the resulting log
//!   lines arrive back at the collector over TCP.
//!
//! The update transport and the system under test are external
//! collaborators behind the [`PutTransport`] and [`SystemUnderTest`]
//! traits.
//!
//! ## Example
//!
//! ```ignore
//! use logtrap::{Collector, CollectorConfig, Harness, HarnessConfig, PutDriver};
//! use logtrap::driver::{steps_for_target, PutValue};
//!
//! let collector = Collector::bind("127.0.0.1:0".parse()?, CollectorConfig::default())?;
//! let sut = MySystem::connect_to(collector.local_addr());
//!
//! let steps = steps_for_target("ao", [5677.0, 11.0, 88.0, 99.0].map(PutValue::Double));
//! let driver = PutDriver::new(MyTransport::new(), steps, Duration::from_secs(2));
//!
//! let config = HarnessConfig { expected_records: 4, ..Default::default() };
//! let outcome = Harness::new(collector, sut, config).run(driver)?;
//! assert_eq!(outcome.records.len(), 4);
//! ```

pub mod collector;
pub mod driver;
pub mod framing;
pub mod harness;
pub mod net;
pub mod reactor;

mod trace;

pub use collector::{AcceptPolicy, Collector, CollectorConfig, CollectorStats};
pub use driver::{PutDriver, PutTransport, PutValue};
pub use framing::Record;
pub use harness::{Harness, HarnessConfig, Outcome, SystemUnderTest};
pub use reactor::{Cycle, EventHandler, Reactor, Verdict};
pub use trace::init_tracing;

//! Log collector: listening socket, single connection, record sink.
//!
//! The collector owns the reactor, registers the [`Acceptor`] on a TCP
//! listening socket (port 0 by default; the OS-chosen port is reported by
//! [`Collector::local_addr`]), and funnels every complete log record into
//! an in-process channel drained by the harness.
//!
//! By design at most one connection exists at a time. What happens when a
//! second client connects is an explicit policy choice
//! ([`AcceptPolicy`]), never a silent overwrite.
//!
//! [`Acceptor`]: acceptor::Acceptor

pub(crate) mod acceptor;
pub(crate) mod reader;

use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use mio::Token;
use thiserror::Error;

use crate::framing::Record;
use crate::net::Listener;
use crate::reactor::{Cycle, Reactor, ReactorError};
use crate::trace::{info, warn};

use acceptor::Acceptor;

/// Error creating a collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The listening socket could not be bound.
    #[error("failed to bind listening socket: {0}")]
    Bind(#[source] std::io::Error),
    /// Reactor setup failed.
    #[error("reactor error: {0}")]
    Reactor(#[from] ReactorError),
}

/// Policy for a connection attempt while a connection already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptPolicy {
    /// Drop the new connection and count it as an anomaly.
    #[default]
    Reject,
    /// Tear down the existing connection and adopt the new one.
    Replace,
}

/// Counters for every non-fatal anomaly and lifecycle event.
///
/// Descriptor-level failures are recovered locally and reported here (and
/// logged); only a failed readiness wait aborts the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Connections accepted and adopted.
    pub accepted: u64,
    /// Connections dropped by [`AcceptPolicy::Reject`].
    pub rejected: u64,
    /// Connections torn down by [`AcceptPolicy::Replace`].
    pub replaced: u64,
    /// Spurious wakeups and failed accept calls.
    pub accept_errors: u64,
    /// Hard read errors on the connection.
    pub read_errors: u64,
    /// Connections closed by the peer.
    pub closed: u64,
    /// Connections dropped for exceeding the record-size cap.
    pub oversized: u64,
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Size of the bounded per-read scratch buffer.
    pub read_buf_len: usize,
    /// Maximum pending bytes without a delimiter before the connection is
    /// dropped. Guards against a peer that never sends a newline.
    pub max_record_len: usize,
    /// Kernel receive buffer size for accepted connections, if set.
    pub recv_buffer_size: Option<usize>,
    /// Policy for a second concurrent connection attempt.
    pub accept_policy: AcceptPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            read_buf_len: 1024,
            max_record_len: 64 * 1024,
            recv_buffer_size: None,
            accept_policy: AcceptPolicy::Reject,
        }
    }
}

/// State shared between the acceptor and the frame reader.
///
/// Everything here lives on the reactor thread, so plain `Cell`s suffice
/// (no locking, per the single-writer invariants of the design).
pub(crate) struct Shared {
    conn_active: Cell<bool>,
    reader_token: Cell<Option<Token>>,
    stats: Cell<CollectorStats>,
    sink: Sender<Record>,
}

impl Shared {
    fn new(sink: Sender<Record>) -> Self {
        Self {
            conn_active: Cell::new(false),
            reader_token: Cell::new(None),
            stats: Cell::new(CollectorStats::default()),
            sink,
        }
    }

    pub(crate) fn connection_active(&self) -> bool {
        self.conn_active.get()
    }

    /// Marks the current connection, or clears it with `None`.
    pub(crate) fn set_connection(&self, token: Option<Token>) {
        self.conn_active.set(token.is_some());
        self.reader_token.set(token);
    }

    pub(crate) fn reader_token(&self) -> Option<Token> {
        self.reader_token.get()
    }

    pub(crate) fn stats(&self) -> CollectorStats {
        self.stats.get()
    }

    pub(crate) fn bump(&self, update: impl FnOnce(&mut CollectorStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    /// Forwards a complete record to the harness.
    pub(crate) fn send_record(&self, record: Record) {
        if self.sink.send(record).is_err() {
            // Receiver gone means the collector itself was dropped.
            warn!("record sink disconnected, dropping record");
        }
    }
}

/// The log-collection side of the harness.
pub struct Collector {
    reactor: Reactor,
    shared: Rc<Shared>,
    records: Receiver<Record>,
    local_addr: SocketAddr,
    listen_token: Token,
}

impl Collector {
    /// Binds the listening socket and registers the acceptor.
    ///
    /// Bind to port 0 and discover the actual port via
    /// [`Collector::local_addr`]; callers must not hardcode a port.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Bind`] if the socket cannot be bound and
    /// [`CollectorError::Reactor`] if reactor setup fails.
    pub fn bind(addr: SocketAddr, config: CollectorConfig) -> Result<Self, CollectorError> {
        let mut reactor = Reactor::new()?;
        let listener = Listener::bind(addr).map_err(CollectorError::Bind)?;
        let local_addr = listener.local_addr().map_err(CollectorError::Bind)?;

        let (sink, records) = mpsc::channel();
        let shared = Rc::new(Shared::new(sink));

        let listen_token = reactor.register(Box::new(Acceptor::new(
            listener,
            Rc::clone(&shared),
            config,
        )))?;

        info!(addr = %local_addr, "collector listening");

        Ok(Self {
            reactor,
            shared,
            records,
            local_addr,
            listen_token,
        })
    }

    /// The address the listening socket is actually bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs one reactor cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Wait`] on a readiness-wait failure, which
    /// is fatal to the collector.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<Cycle, ReactorError> {
        self.reactor.run_once(timeout)
    }

    /// Requests cooperative termination of the reactor loop.
    pub fn stop(&mut self) {
        self.reactor.stop();
    }

    /// Drains all records collected so far, in arrival order.
    pub fn drain_records(&mut self) -> Vec<Record> {
        self.records.try_iter().collect()
    }

    /// Snapshot of the anomaly/lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> CollectorStats {
        self.shared.stats()
    }

    /// Whether a connection is currently established.
    #[must_use]
    pub fn connection_active(&self) -> bool {
        self.shared.connection_active()
    }

    /// Number of descriptors the reactor is watching (listener included).
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.reactor.handler_count()
    }

    /// Token of the listening-socket registration.
    #[must_use]
    pub fn listen_token(&self) -> Token {
        self.listen_token
    }
}

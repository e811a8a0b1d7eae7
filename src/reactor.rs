//! Readiness multiplexer: the harness's single-threaded event loop.
//!
//! The reactor owns a set of watched descriptors, blocks until at least
//! one is ready to read, and invokes the handler registered for each
//! ready descriptor. All collector components (acceptor, frame reader)
//! run on the reactor thread, so none of them need internal locking.
//!
//! # Registering from inside a handler
//!
//! A handler may register new handlers or deregister existing ones while
//! its own `on_ready` runs; the acceptor relies on this to register a
//! frame reader for each accepted connection. Dispatch removes the
//! running handler from the table for the duration of its callback, so
//! the reactor can be borrowed mutably inside it. Sources registered
//! during dispatch become eligible from the next wait cycle, not the
//! current one.
//!
//! # Readiness semantics
//!
//! mio readiness is edge-triggered: a descriptor that stays readable does
//! not re-fire until new bytes arrive. Handlers must therefore drain
//! their source (bounded reads until `WouldBlock`) before returning.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use thiserror::Error;

use crate::trace::{debug, trace, warn};

/// Initial capacity of the per-cycle event batch.
const EVENTS_CAPACITY: usize = 64;

/// Error raised by reactor operations.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The OS poll primitive could not be created.
    #[error("failed to create poll instance: {0}")]
    Create(#[source] std::io::Error),
    /// The descriptor could not be registered (closed or invalid).
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[source] std::io::Error),
    /// The underlying wait primitive failed. Fatal to the loop: no
    /// further progress is possible, so the caller must surface it.
    #[error("readiness wait failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// What a handler wants done with its registration after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the registration; dispatch again on the next readiness.
    Keep,
    /// Deregister the source and drop the handler.
    Close,
}

/// Outcome of a single [`Reactor::run_once`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// At least one descriptor became ready; its handlers were invoked.
    Dispatched(usize),
    /// The optional wait timeout elapsed with no readiness.
    TimedOut,
    /// [`Reactor::stop`] was called; the loop should terminate.
    Stopped,
}

/// A callback bound to one watched descriptor.
///
/// The handler owns its descriptor and exposes it through [`source`] so
/// the reactor can (de)register it. `on_ready` is invoked once per cycle
/// in which the descriptor was ready; handler-local failures (a spurious
/// accept, a read error) are recovered inside the handler and never
/// abort the reactor loop.
///
/// [`source`]: EventHandler::source
pub trait EventHandler {
    /// The descriptor to watch for read readiness.
    fn source(&mut self) -> &mut dyn mio::event::Source;

    /// Invoked when the descriptor is ready to read.
    fn on_ready(&mut self, reactor: &mut Reactor) -> Verdict;
}

/// Readiness multiplexer over a set of watched descriptors.
pub struct Reactor {
    poll: Poll,
    handlers: HashMap<Token, Box<dyn EventHandler>>,
    next_token: usize,
    stopped: bool,
}

impl Reactor {
    /// Creates a reactor with no watched descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Create`] if the OS poll primitive cannot
    /// be created.
    pub fn new() -> Result<Self, ReactorError> {
        let poll = Poll::new().map_err(ReactorError::Create)?;
        Ok(Self {
            poll,
            handlers: HashMap::new(),
            next_token: 0,
            stopped: false,
        })
    }

    /// Registers a handler for read readiness on its descriptor.
    ///
    /// At most one handler is registered per descriptor; tokens are never
    /// reused within a reactor's lifetime. Safe to call from inside a
    /// running handler; the new descriptor becomes eligible from the next
    /// wait cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::InvalidDescriptor`] if the descriptor is
    /// closed or otherwise cannot be registered.
    pub fn register(&mut self, mut handler: Box<dyn EventHandler>) -> Result<Token, ReactorError> {
        let token = Token(self.next_token);
        self.next_token += 1;

        self.poll
            .registry()
            .register(handler.source(), token, Interest::READABLE)
            .map_err(ReactorError::InvalidDescriptor)?;

        trace!(token = token.0, "reactor: registered handler");
        self.handlers.insert(token, handler);
        Ok(token)
    }

    /// Deregisters the handler for `token`, dropping it and its descriptor.
    ///
    /// Unknown tokens are ignored (the handler may already have closed
    /// itself). Safe to call from inside a running handler for any token
    /// other than the running handler's own.
    pub fn deregister(&mut self, token: Token) {
        if let Some(mut handler) = self.handlers.remove(&token) {
            if let Err(_e) = self.poll.registry().deregister(handler.source()) {
                warn!(token = token.0, error = %_e, "reactor: deregister failed");
            }
            trace!(token = token.0, "reactor: deregistered handler");
        }
    }

    /// Runs one wait-and-dispatch cycle.
    ///
    /// Blocks until at least one watched descriptor becomes ready (or
    /// `timeout` elapses, if given), then invokes each ready descriptor's
    /// handler exactly once, in unspecified order among descriptors that
    /// became ready in the same wait. An interrupted wait is retried
    /// internally.
    ///
    /// # Errors
    ///
    /// Returns [`ReactorError::Wait`] if the wait primitive fails. This
    /// is fatal to the loop; callers should not retry.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<Cycle, ReactorError> {
        if self.stopped {
            return Ok(Cycle::Stopped);
        }

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            match self.poll.poll(&mut events, timeout) {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReactorError::Wait(e)),
            }
        }

        if events.is_empty() {
            return Ok(Cycle::TimedOut);
        }

        let ready: Vec<Token> = events.iter().map(|event| event.token()).collect();
        let mut dispatched = 0;

        for token in ready {
            // The handler may have been deregistered by an earlier
            // callback in this same batch.
            let Some(mut handler) = self.handlers.remove(&token) else {
                continue;
            };
            dispatched += 1;

            match handler.on_ready(self) {
                Verdict::Keep => {
                    self.handlers.insert(token, handler);
                }
                Verdict::Close => {
                    if let Err(_e) = self.poll.registry().deregister(handler.source()) {
                        debug!(token = token.0, error = %_e, "reactor: deregister on close");
                    }
                    trace!(token = token.0, "reactor: handler closed");
                }
            }
        }

        Ok(Cycle::Dispatched(dispatched))
    }

    /// Requests cooperative termination: the next [`run_once`] returns
    /// [`Cycle::Stopped`] instead of blocking.
    ///
    /// [`run_once`]: Reactor::run_once
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Number of currently watched descriptors.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

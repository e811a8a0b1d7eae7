//! Connection acceptor: the handler bound to the listening socket.

use std::rc::Rc;

use crate::net::Listener;
use crate::reactor::{EventHandler, Reactor, Verdict};
use crate::trace::{debug, info, warn};

use super::reader::FrameReader;
use super::{AcceptPolicy, CollectorConfig, Shared};

/// Accepts inbound connections and hands each adopted one to a
/// [`FrameReader`].
///
/// Readiness on the listener is edge-triggered, so one invocation drains
/// every pending connection. The first pending connection becomes *the*
/// connection (there is at most one); any further attempt while a
/// connection exists goes through [`AcceptPolicy`].
pub(crate) struct Acceptor {
    listener: Listener,
    shared: Rc<Shared>,
    config: CollectorConfig,
}

impl Acceptor {
    pub(crate) fn new(listener: Listener, shared: Rc<Shared>, config: CollectorConfig) -> Self {
        Self {
            listener,
            shared,
            config,
        }
    }
}

impl EventHandler for Acceptor {
    fn source(&mut self) -> &mut dyn mio::event::Source {
        &mut self.listener
    }

    fn on_ready(&mut self, reactor: &mut Reactor) -> Verdict {
        let mut accepted_any = false;

        loop {
            let (conn, peer) = match self.listener.try_accept() {
                Ok(Some(pair)) => pair,
                Ok(None) => break,
                Err(_e) => {
                    warn!(error = %_e, "accept failed");
                    self.shared.bump(|s| s.accept_errors += 1);
                    return Verdict::Keep;
                }
            };
            accepted_any = true;

            if self.shared.connection_active() {
                match self.config.accept_policy {
                    AcceptPolicy::Reject => {
                        warn!(peer = %peer, "second connection rejected");
                        self.shared.bump(|s| s.rejected += 1);
                        drop(conn);
                        continue;
                    }
                    AcceptPolicy::Replace => {
                        warn!(peer = %peer, "second connection replaces existing one");
                        if let Some(token) = self.shared.reader_token() {
                            reactor.deregister(token);
                        }
                        self.shared.set_connection(None);
                        self.shared.bump(|s| s.replaced += 1);
                    }
                }
            }

            if let Some(size) = self.config.recv_buffer_size {
                if let Err(_e) = conn.set_recv_buffer_size(size) {
                    debug!(error = %_e, "recv buffer size not applied");
                }
            }

            let reader = FrameReader::new(
                conn,
                Rc::clone(&self.shared),
                self.config.read_buf_len,
                self.config.max_record_len,
            );
            match reactor.register(Box::new(reader)) {
                Ok(token) => {
                    info!(peer = %peer, token = token.0, "connection accepted");
                    self.shared.set_connection(Some(token));
                    self.shared.bump(|s| s.accepted += 1);
                }
                Err(_e) => {
                    warn!(peer = %peer, error = %_e, "failed to register reader");
                    self.shared.bump(|s| s.accept_errors += 1);
                }
            }
        }

        if !accepted_any {
            // Woken with nothing actually pending.
            debug!("spurious accept wakeup");
            self.shared.bump(|s| s.accept_errors += 1);
        }

        Verdict::Keep
    }
}

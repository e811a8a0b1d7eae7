//! Frame reader: the handler bound to the accepted connection.

use std::io::ErrorKind;
use std::rc::Rc;

use crate::framing::FrameBuffer;
use crate::net::Conn;
use crate::reactor::{EventHandler, Reactor, Verdict};
use crate::trace::{debug, trace, warn};

use super::Shared;

/// Reads raw bytes from the connection and frames them into records.
///
/// Each invocation drains the socket with bounded reads (the scratch
/// buffer caps every individual read) and extracts every complete record
/// before returning, so no complete record survives a readiness cycle in
/// the pending buffer. A zero-byte read means the peer closed; transient
/// errors are deferred to the next readiness cycle; hard errors drop the
/// connection and are counted, not fatal.
pub(crate) struct FrameReader {
    conn: Conn,
    frame: FrameBuffer,
    scratch: Vec<u8>,
    shared: Rc<Shared>,
    max_record_len: usize,
}

impl FrameReader {
    pub(crate) fn new(
        conn: Conn,
        shared: Rc<Shared>,
        read_buf_len: usize,
        max_record_len: usize,
    ) -> Self {
        Self {
            conn,
            frame: FrameBuffer::new(),
            scratch: vec![0u8; read_buf_len],
            shared,
            max_record_len,
        }
    }

    /// Clears the connection slot and counts the teardown reason.
    fn teardown(&self, count: impl FnOnce(&mut super::CollectorStats)) -> Verdict {
        self.shared.set_connection(None);
        self.shared.bump(count);
        Verdict::Close
    }
}

impl EventHandler for FrameReader {
    fn source(&mut self) -> &mut dyn mio::event::Source {
        &mut self.conn
    }

    fn on_ready(&mut self, _reactor: &mut Reactor) -> Verdict {
        loop {
            match self.conn.try_read(&mut self.scratch) {
                // Socket drained; wait for the next readiness cycle.
                Ok(None) => return Verdict::Keep,
                Ok(Some(0)) => {
                    if !self.frame.is_empty() {
                        debug!(
                            pending = self.frame.len(),
                            "peer closed with unterminated tail, discarding"
                        );
                    }
                    debug!("connection closed by peer");
                    return self.teardown(|s| s.closed += 1);
                }
                Ok(Some(n)) => {
                    self.frame.push(&self.scratch[..n]);
                    for record in self.frame.take_records() {
                        trace!(len = record.len(), "record framed");
                        self.shared.send_record(record);
                    }
                    if self.frame.len() > self.max_record_len {
                        warn!(
                            pending = self.frame.len(),
                            cap = self.max_record_len,
                            "record exceeds size cap, dropping connection"
                        );
                        return self.teardown(|s| s.oversized += 1);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => return Verdict::Keep,
                Err(_e) => {
                    warn!(error = %_e, "read failed, dropping connection");
                    return self.teardown(|s| s.read_errors += 1);
                }
            }
        }
    }
}

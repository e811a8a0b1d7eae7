//! TCP socket wrappers for mio-based I/O.
//!
//! Provides thin wrappers around [`mio::net::TcpListener`] and
//! [`mio::net::TcpStream`] with ergonomic accept/read APIs and integration
//! with mio's polling infrastructure.

use std::io::{self, ErrorKind, Read};
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

/// A non-blocking TCP listening socket.
///
/// Wraps a mio TCP listener. Bind to port 0 to let the OS choose a free
/// port; the chosen port is reported by [`Listener::local_addr`]. The
/// socket is non-blocking; use with mio's [`Poll`] for readiness
/// notification.
///
/// [`Poll`]: mio::Poll
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Creates a new listening socket bound to the given address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound (e.g., address in use).
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = TcpListener::bind(addr)?;
        Ok(Self { inner })
    }

    /// Returns the local address this socket is bound to.
    ///
    /// For a port-0 bind this reports the port the OS actually chose.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Attempts to accept a pending connection, returning `Ok(None)`
    /// instead of `WouldBlock`.
    ///
    /// `None` means no connection was actually pending (spurious wakeup).
    ///
    /// # Errors
    ///
    /// Returns an error on accept failure other than `WouldBlock`.
    pub fn try_accept(&self) -> io::Result<Option<(Conn, SocketAddr)>> {
        match self.inner.accept() {
            Ok((stream, peer)) => Ok(Some((Conn { inner: stream }, peer))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for Listener {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

/// A non-blocking accepted TCP connection.
///
/// Wraps a mio TCP stream and provides a bounded read API. The stream is
/// non-blocking; use with mio's [`Poll`] for readiness notification.
///
/// [`Poll`]: mio::Poll
pub struct Conn {
    inner: TcpStream,
}

impl Conn {
    /// Returns the peer address of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer address cannot be retrieved.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Attempts one bounded read, returning `Ok(None)` instead of
    /// `WouldBlock`.
    ///
    /// `Some(0)` means the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure other than `WouldBlock`.
    pub fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inner.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        // Use rustix for socket options since mio doesn't expose them directly
        let fd = self.inner.as_fd();
        rustix::net::sockopt::set_socket_recv_buffer_size(fd, size)?;
        Ok(())
    }

    /// Gets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        let fd = self.inner.as_fd();
        Ok(rustix::net::sockopt::socket_recv_buffer_size(fd)?)
    }
}

impl AsFd for Conn {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for Conn {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

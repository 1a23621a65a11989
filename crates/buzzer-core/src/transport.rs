//! Byte stream to the host.
//!
//! The client only needs three things from a stream: write one byte, read
//! one byte, and force-close from another thread so a blocked reader wakes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use tracing::debug;

/// A connected byte stream shared between the reader and the senders.
pub trait Transport: Send + Sync + 'static {
    fn send_byte(&self, byte: u8) -> io::Result<()>;

    /// Block for the next byte. `Ok(None)` means the peer closed.
    fn recv_byte(&self) -> io::Result<Option<u8>>;

    /// Shut the stream down in both directions.
    fn close(&self);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_byte(&self, byte: u8) -> io::Result<()> {
        (**self).send_byte(byte)
    }

    fn recv_byte(&self) -> io::Result<Option<u8>> {
        (**self).recv_byte()
    }

    fn close(&self) {
        (**self).close()
    }
}

impl Transport for TcpStream {
    fn send_byte(&self, byte: u8) -> io::Result<()> {
        let mut stream = self;
        stream.write_all(&[byte])
    }

    fn recv_byte(&self) -> io::Result<Option<u8>> {
        let mut stream = self;
        let mut buf = [0u8; 1];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&self) {
        // Already shut down by the peer is fine.
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Opens new streams to the host.
pub trait Connector {
    type Transport: Transport;

    fn connect(&self) -> io::Result<Self::Transport>;
}

/// Connects to a fixed host address over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Transport = TcpStream;

    fn connect(&self) -> io::Result<TcpStream> {
        debug!("Connecting to host at {}", self.addr);
        let stream = TcpStream::connect(self.addr)?;
        // Single-byte messages must not wait for Nagle.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

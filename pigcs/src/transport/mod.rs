//! Byte-level connections to PI controllers.
//!
//! A [`Transport`] is a connection-oriented byte channel. The framing layer
//! never talks to sockets or serial ports directly; it wraps a transport in a
//! [`LineChannel`], which adds GCS line reading, per-read deadlines and
//! deferred ("autoconnect = false") opening.
//!
//! Built-in transports:
//!
//! - [`TcpTransport`]: TCP/IP, default port 50000
//! - [`SerialTransport`]: RS-232 ports and PI USB devices (which enumerate as
//!   virtual serial ports)
//! - [`DaisyChainDevice`]: one logical device on a shared daisy-chain port
//!
//! IEEE-488 and PCI boards need vendor drivers. They are described by
//! [`Interface::Gpib`] and [`Interface::Pci`], and must be opened by handing
//! a caller-implemented [`Transport`] to the device dispatcher.
//!
//! # Cancellation
//!
//! Every transport hands out a [`Closer`]. Calling [`Closer::cancel`] from
//! any thread makes a pending read return [`GcsError::Cancelled`].

mod daisy;
mod serial;
mod tcp;

use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{GcsError, GcsResult};

pub use daisy::{DaisyChain, DaisyChainDevice, DaisyDevice, MAX_DAISY_DEVICES};
pub use serial::{enumerate_usb, SerialTransport, UsbDevice, PI_USB_VENDOR_ID};
pub use tcp::{enumerate_tcpip, TcpDevice, TcpTransport, DEFAULT_PORT};

/// A connection-oriented byte channel to one controller.
///
/// Implementations must make [`read`](Transport::read) return
/// [`GcsError::Cancelled`] promptly once the [`Closer`] returned by
/// [`closer`](Transport::closer) has been cancelled.
pub trait Transport: Send {
    /// Establish the connection. Opening an open transport is a no-op.
    fn open(&mut self) -> GcsResult<()>;

    /// Tear the connection down. Closing a closed transport is a no-op.
    fn close(&mut self) -> GcsResult<()>;

    /// True while the connection is established.
    fn is_open(&self) -> bool;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> GcsResult<()>;

    /// Read at least one byte, waiting at most `timeout`.
    ///
    /// Returns [`GcsError::Timeout`] if nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> GcsResult<usize>;

    /// Number of bytes that can be read without blocking.
    fn poll_available(&mut self) -> GcsResult<usize> {
        Ok(0)
    }

    /// Handle that cancels pending reads from another thread.
    fn closer(&self) -> Closer;

    /// Human-readable description of the endpoint.
    fn describe(&self) -> String;

    /// Start a request/response exchange.
    ///
    /// Shared transports (daisy chains) block here until no other logical
    /// device is mid-exchange.
    fn begin_exchange(&mut self) -> GcsResult<()> {
        Ok(())
    }

    /// Finish the exchange started by [`begin_exchange`](Transport::begin_exchange).
    fn end_exchange(&mut self) {}
}

// ==================== Cancellation ====================

#[derive(Debug, Default)]
struct CloserInner {
    cancelled: AtomicBool,
    socket: Mutex<Option<TcpStream>>,
}

/// Cancels pending reads on a transport from any thread.
///
/// Clones share state. For TCP transports the socket is shut down so a
/// blocked read wakes immediately; other transports poll the flag between
/// short read slices.
#[derive(Debug, Clone, Default)]
pub struct Closer {
    inner: Arc<CloserInner>,
}

impl Closer {
    /// Create a closer in the armed (not cancelled) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel pending and future reads until the transport is reopened.
    pub fn cancel(&self) {
        debug!("Cancelling pending transport reads");
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(socket) = self.inner.socket.lock() {
            if let Some(stream) = socket.as_ref() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    /// True once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the cancelled flag. Transports call this when they (re)open.
    pub fn rearm(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Return `Err(Cancelled)` if cancelled.
    pub fn check(&self) -> GcsResult<()> {
        if self.is_cancelled() {
            Err(GcsError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn attach_socket(&self, stream: TcpStream) {
        if let Ok(mut socket) = self.inner.socket.lock() {
            *socket = Some(stream);
        }
    }

    pub(crate) fn detach_socket(&self) {
        if let Ok(mut socket) = self.inner.socket.lock() {
            *socket = None;
        }
    }
}

// ==================== Interfaces ====================

/// Where a controller is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    /// RS-232 port (`/dev/ttyUSB0`, `COM3`) at a baudrate.
    Rs232 {
        /// Platform port name
        port: String,
        /// Baudrate
        baudrate: u32,
    },
    /// USB device, identified by an [`enumerate_usb`] description or serial number.
    Usb {
        /// Description or serial number
        description: String,
    },
    /// TCP/IP endpoint.
    TcpIp {
        /// Host name or IP address
        host: String,
        /// TCP port (default 50000)
        port: u16,
    },
    /// IEEE-488 (GPIB) board and device address.
    Gpib {
        /// Board index
        board: u32,
        /// Device address on the bus
        device: u32,
    },
    /// PCI controller board.
    Pci {
        /// Board index
        board: u32,
    },
}

impl Interface {
    /// Build an unopened transport for this interface.
    ///
    /// # Errors
    ///
    /// [`GcsError::UnsupportedInterface`] for GPIB and PCI, which need a
    /// caller-supplied transport.
    pub fn transport(&self) -> GcsResult<Box<dyn Transport>> {
        match self {
            Interface::Rs232 { port, baudrate } => {
                Ok(Box::new(SerialTransport::new(port.clone(), *baudrate)))
            }
            Interface::Usb { description } => Ok(Box::new(SerialTransport::usb(description.clone()))),
            Interface::TcpIp { host, port } => Ok(Box::new(TcpTransport::new(host.clone(), *port))),
            Interface::Gpib { .. } | Interface::Pci { .. } => {
                Err(GcsError::UnsupportedInterface(self.to_string()))
            }
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Rs232 { port, baudrate } => write!(f, "RS-232 {port} @ {baudrate} baud"),
            Interface::Usb { description } => write!(f, "USB {description}"),
            Interface::TcpIp { host, port } => write!(f, "TCP/IP {host}:{port}"),
            Interface::Gpib { board, device } => write!(f, "GPIB board {board} device {device}"),
            Interface::Pci { board } => write!(f, "PCI board {board}"),
        }
    }
}

// ==================== Line channel ====================

const READ_CHUNK: usize = 4096;

/// GCS line reader over a [`Transport`].
///
/// Keeps bytes received past the end of a line for the next read. Lines are
/// decoded as Latin-1, which is what PI controllers send (`µ` is `0xB5`).
pub struct LineChannel {
    transport: Box<dyn Transport>,
    pending: Vec<u8>,
    timeout: Duration,
}

impl LineChannel {
    /// Wrap `transport`. It is opened on first use if it is not open yet.
    pub fn new(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Vec::new(),
            timeout,
        }
    }

    /// Timeout applied to each line read.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the per-line read timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// True while the transport is open.
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Endpoint description of the transport.
    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Cancellation handle of the transport.
    pub fn closer(&self) -> Closer {
        self.transport.closer()
    }

    /// Open the transport if a deferred open is still pending.
    pub fn ensure_open(&mut self) -> GcsResult<()> {
        if !self.transport.is_open() {
            debug!("Opening {}", self.transport.describe());
            self.pending.clear();
            self.transport.open()?;
        }
        Ok(())
    }

    /// Close the transport and drop any buffered bytes.
    pub fn close(&mut self) -> GcsResult<()> {
        self.pending.clear();
        self.transport.close()
    }

    /// Write raw bytes.
    pub fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        self.ensure_open()?;
        self.transport.write(data)
    }

    /// Read one line including its `\n` terminator.
    pub fn read_line(&mut self) -> GcsResult<String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = latin1(&line);
                trace!("line: {:?}", line);
                return Ok(line);
            }
            self.fill(deadline)?;
        }
    }

    /// Read lines until one starts with `sentinel`, returning all of them.
    pub fn read_block_until(&mut self, sentinel: &str) -> GcsResult<String> {
        let mut block = String::new();
        loop {
            let line = self.read_line()?;
            let done = line.trim_start().starts_with(sentinel);
            block.push_str(&line);
            if done {
                return Ok(block);
            }
        }
    }

    /// Bytes readable right now, buffered ones included.
    pub fn poll_available(&mut self) -> GcsResult<usize> {
        let waiting = if self.transport.is_open() {
            self.transport.poll_available()?
        } else {
            0
        };
        Ok(self.pending.len() + waiting)
    }

    /// Discard buffered and waiting input.
    pub fn flush_input(&mut self) -> GcsResult<()> {
        self.pending.clear();
        let mut buf = [0u8; READ_CHUNK];
        while self.transport.is_open() && self.transport.poll_available()? > 0 {
            self.transport.read(&mut buf, Duration::from_millis(1))?;
        }
        Ok(())
    }

    /// Start an exchange on the transport.
    pub fn begin_exchange(&mut self) -> GcsResult<()> {
        self.ensure_open()?;
        self.transport.begin_exchange()
    }

    /// Finish an exchange on the transport.
    pub fn end_exchange(&mut self) {
        self.transport.end_exchange();
    }

    /// Run `f` inside one exchange. The exchange ends even if `f` fails.
    pub fn exchange<T>(&mut self, f: impl FnOnce(&mut Self) -> GcsResult<T>) -> GcsResult<T> {
        self.begin_exchange()?;
        let result = f(self);
        self.end_exchange();
        result
    }

    fn fill(&mut self, deadline: Instant) -> GcsResult<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(GcsError::Timeout);
        }
        self.ensure_open()?;
        let mut buf = [0u8; READ_CHUNK];
        let n = self.transport.read(&mut buf, remaining)?;
        self.pending.extend_from_slice(&buf[..n]);
        Ok(())
    }
}

/// Latin-1 bytes map one-to-one onto the first 256 code points.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`latin1`]; characters outside Latin-1 become `?`.
pub(crate) fn to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ScriptedTransport;

    #[test]
    fn test_read_line_keeps_remainder() {
        let transport = ScriptedTransport::new().with_raw(b"1=0.5 \n2=1.5\nextra");
        let mut channel = LineChannel::new(Box::new(transport), Duration::from_millis(50));
        assert_eq!(channel.read_line().unwrap(), "1=0.5 \n");
        assert_eq!(channel.read_line().unwrap(), "2=1.5\n");
        assert!(matches!(channel.read_line(), Err(GcsError::Timeout)));
    }

    #[test]
    fn test_read_block_until_sentinel() {
        let transport =
            ScriptedTransport::new().with_raw(b"#Params: ID\tType\n0x1\tINT32\n#END\nnext\n");
        let mut channel = LineChannel::new(Box::new(transport), Duration::from_millis(50));
        let block = channel.read_block_until("#END").unwrap();
        assert_eq!(block, "#Params: ID\tType\n0x1\tINT32\n#END\n");
        assert_eq!(channel.poll_available().unwrap(), 5);
    }

    #[test]
    fn test_latin1_micro_sign() {
        assert_eq!(latin1(&[b'1', 0xB5, b'm']), "1µm");
        assert_eq!(to_latin1("1µm"), vec![b'1', 0xB5, b'm']);
    }

    #[test]
    fn test_cancelled_closer_aborts_read() {
        let transport = ScriptedTransport::new();
        let closer = transport.closer();
        let mut channel = LineChannel::new(Box::new(transport), Duration::from_secs(5));
        channel.ensure_open().unwrap();
        closer.cancel();
        assert!(matches!(channel.read_line(), Err(GcsError::Cancelled)));
    }

    #[test]
    fn test_gpib_needs_supplied_transport() {
        let err = Interface::Gpib { board: 0, device: 4 }.transport().err().unwrap();
        assert!(matches!(err, GcsError::UnsupportedInterface(_)));
        assert!(Interface::Pci { board: 1 }.transport().is_err());
    }
}

//! TCP/IP transport and UDP discovery.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{Closer, Transport};
use crate::error::{GcsError, GcsResult};

/// Default TCP port for PI controllers.
pub const DEFAULT_PORT: u16 = 50000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Payload that makes PI controllers on the subnet announce themselves.
const DISCOVERY_REQUEST: &[u8] = b"PI";

/// Plain TCP stream to a controller.
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    closer: Closer,
}

impl TcpTransport {
    /// Transport for `host:port`. Nothing is connected until [`Transport::open`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            closer: Closer::new(),
        }
    }

    fn stream(&mut self) -> GcsResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(GcsError::NotConnected)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> GcsResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| GcsError::ConnectionFailed(format!("{}: {e}", self.describe())))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    self.closer.rearm();
                    self.closer.attach_socket(stream.try_clone()?);
                    self.stream = Some(stream);
                    debug!("Connected to PI device via TCP at {addr}");
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(GcsError::ConnectionFailed(match last_err {
            Some(e) => format!("Failed to connect to {}: {e}", self.describe()),
            None => format!("No address for {}", self.describe()),
        }))
    }

    fn close(&mut self) -> GcsResult<()> {
        self.closer.detach_socket();
        if let Some(stream) = self.stream.take() {
            debug!("Closing TCP connection to {}", self.describe());
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        let stream = self.stream()?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> GcsResult<usize> {
        self.closer.check()?;
        let closer = self.closer.clone();
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match stream.read(buf) {
            Ok(0) if closer.is_cancelled() => Err(GcsError::Cancelled),
            Ok(0) => Err(GcsError::ConnectionFailed("connection closed by peer".to_string())),
            Ok(n) => Ok(n),
            Err(_) if closer.is_cancelled() => Err(GcsError::Cancelled),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Err(GcsError::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn poll_available(&mut self) -> GcsResult<usize> {
        let stream = self.stream()?;
        let mut probe = [0u8; 4096];
        stream.set_nonblocking(true)?;
        let peeked = stream.peek(&mut probe);
        stream.set_nonblocking(false)?;
        match peeked {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn closer(&self) -> Closer {
        self.closer.clone()
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A controller that answered the UDP discovery sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpDevice {
    /// Address the answer came from
    pub address: SocketAddr,
    /// Identification the controller sent
    pub identification: String,
}

impl TcpDevice {
    /// Description in the `"<identification> (<ip>:<port>)"` form.
    pub fn description(&self) -> String {
        format!(
            "{} ({}:{})",
            self.identification,
            self.address.ip(),
            DEFAULT_PORT
        )
    }

    /// Recover `(host, port)` from a [`description`](Self::description).
    pub fn parse_description(description: &str) -> Option<(String, u16)> {
        let start = description.rfind('(')?;
        let inner = description[start + 1..].trim_end().strip_suffix(')')?;
        let (host, port) = inner.rsplit_once(':')?;
        Some((host.to_string(), port.parse().ok()?))
    }
}

/// Broadcast a discovery request and collect answers for `timeout`.
///
/// Only devices whose description contains `mask` are returned; pass `""`
/// for all.
pub fn enumerate_tcpip(mask: &str, timeout: Duration) -> GcsResult<Vec<TcpDevice>> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_broadcast(true)?;
    socket.send_to(DISCOVERY_REQUEST, ("255.255.255.255", DEFAULT_PORT))?;
    debug!("Sent TCP/IP discovery broadcast on port {DEFAULT_PORT}");

    let deadline = Instant::now() + timeout;
    let mut devices: Vec<TcpDevice> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;
        match socket.recv_from(&mut buf) {
            Ok((n, address)) => {
                let identification = super::latin1(&buf[..n]).trim().to_string();
                trace!("Discovery answer from {address}: {identification:?}");
                let device = TcpDevice {
                    address,
                    identification,
                };
                if device.description().contains(mask)
                    && !devices.iter().any(|d| d.address.ip() == address.ip())
                {
                    devices.push(device);
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => {
                warn!("Discovery receive failed: {e}");
                break;
            }
        }
    }
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_description_round_trip() {
        let device = TcpDevice {
            address: "192.168.1.20:50000".parse().unwrap(),
            identification: "C-884 SN 118000123".to_string(),
        };
        let description = device.description();
        assert_eq!(description, "C-884 SN 118000123 (192.168.1.20:50000)");
        assert_eq!(
            TcpDevice::parse_description(&description),
            Some(("192.168.1.20".to_string(), 50000))
        );
        assert_eq!(TcpDevice::parse_description("no address"), None);
    }

    #[test]
    fn test_loopback_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"*IDN?\n");
            socket.write_all(b"PI,E-727,123,1.0\n").unwrap();
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        assert!(!transport.is_open());
        transport.open().unwrap();
        transport.write(b"*IDN?\n").unwrap();
        let mut buf = [0u8; 64];
        let mut got = Vec::new();
        while !got.ends_with(b"\n") {
            let n = transport.read(&mut buf, Duration::from_secs(2)).unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"PI,E-727,123,1.0\n");
        server.join().unwrap();
        transport.close().unwrap();
        assert!(!transport.is_open());
    }

    #[test]
    fn test_cancel_wakes_blocked_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(socket);
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.open().unwrap();
        let closer = transport.closer();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.cancel();
        });
        let mut buf = [0u8; 16];
        let result = transport.read(&mut buf, Duration::from_secs(5));
        assert!(matches!(result, Err(GcsError::Cancelled)));
        canceller.join().unwrap();
        server.join().unwrap();
    }
}

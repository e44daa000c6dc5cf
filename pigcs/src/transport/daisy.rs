//! Daisy-chain multiplexing.
//!
//! Several controllers share one host port. Each request line is prefixed
//! with the target device id (`"2 POS?\n"`), and answers come back with a
//! `"0 2 "` address prefix that is stripped before the line reaches framing.
//!
//! Logical devices take turns: [`Transport::begin_exchange`] blocks until no
//! other device on the chain is mid-exchange, so a request on device 2 cannot
//! interleave with a pending bulk read on device 5.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{latin1, Closer, Transport};
use crate::error::{GcsError, GcsResult};

/// Highest device id probed during enumeration.
pub const MAX_DAISY_DEVICES: u8 = 16;

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Reads on the shared port block at most this long before a logical
/// device checks its own cancel flag again.
const READ_SLICE: Duration = Duration::from_millis(50);

struct SharedPort {
    transport: Box<dyn Transport>,
    owner: Option<u8>,
}

struct DaisyPort {
    shared: Mutex<SharedPort>,
    turn: Condvar,
    closer: Closer,
    description: String,
}

impl DaisyPort {
    fn lock(&self) -> GcsResult<MutexGuard<'_, SharedPort>> {
        self.shared.lock().map_err(|_| GcsError::poisoned())
    }

    fn acquire(&self, id: u8) -> GcsResult<()> {
        let mut shared = self.lock()?;
        while shared.owner.is_some() && shared.owner != Some(id) {
            shared = self.turn.wait(shared).map_err(|_| GcsError::poisoned())?;
        }
        shared.owner = Some(id);
        Ok(())
    }

    fn release(&self, id: u8) {
        if let Ok(mut shared) = self.shared.lock() {
            if shared.owner == Some(id) {
                shared.owner = None;
            }
        }
        self.turn.notify_all();
    }
}

/// A device found on a daisy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaisyDevice {
    /// Device id used as the address prefix
    pub id: u8,
    /// `"<model> SN<serial>"` built from `*IDN?`
    pub description: String,
}

/// The master port of a daisy chain.
///
/// Cloning shares the port. Hand out logical devices with
/// [`device`](Self::device).
#[derive(Clone)]
pub struct DaisyChain {
    port: Arc<DaisyPort>,
}

impl DaisyChain {
    /// Open `transport` as a daisy-chain master port.
    pub fn open(mut transport: Box<dyn Transport>) -> GcsResult<Self> {
        transport.open()?;
        let description = transport.describe();
        let closer = transport.closer();
        debug!("Opened daisy chain on {description}");
        Ok(Self {
            port: Arc::new(DaisyPort {
                shared: Mutex::new(SharedPort {
                    transport,
                    owner: None,
                }),
                turn: Condvar::new(),
                closer,
                description,
            }),
        })
    }

    /// Probe device ids `1..=MAX_DAISY_DEVICES` with `*IDN?`.
    pub fn enumerate(&self) -> GcsResult<Vec<DaisyDevice>> {
        self.enumerate_with_timeout(PROBE_TIMEOUT)
    }

    /// Like [`enumerate`](Self::enumerate) with a custom per-id answer timeout.
    pub fn enumerate_with_timeout(&self, timeout: Duration) -> GcsResult<Vec<DaisyDevice>> {
        let mut found = Vec::new();
        for id in 1..=MAX_DAISY_DEVICES {
            let mut device = self.device(id);
            device.open()?;
            let idn = device.begin_exchange().and_then(|_| {
                let answer = probe_idn(&mut device, timeout);
                device.end_exchange();
                answer
            });
            match idn {
                Ok(idn) => {
                    let description = describe_idn(&idn);
                    debug!("Daisy chain device {id}: {description}");
                    found.push(DaisyDevice { id, description });
                }
                Err(GcsError::Timeout) => trace!("No daisy chain device at {id}"),
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Logical transport for device `id`.
    pub fn device(&self, id: u8) -> DaisyChainDevice {
        DaisyChainDevice {
            port: Arc::clone(&self.port),
            id,
            open: false,
            closer: Closer::new(),
            raw: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Close the shared port. Logical devices fail with `NotConnected` afterwards.
    pub fn close(&self) -> GcsResult<()> {
        self.port.closer.cancel();
        let mut shared = self.port.lock()?;
        shared.transport.close()
    }

    /// Description of the master port.
    pub fn describe(&self) -> &str {
        &self.port.description
    }
}

fn probe_idn(device: &mut DaisyChainDevice, timeout: Duration) -> GcsResult<String> {
    device.write(b"*IDN?\n")?;
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut buf = [0u8; 256];
    while !line.ends_with(b"\n") {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(GcsError::Timeout);
        }
        let n = device.read(&mut buf, remaining)?;
        line.extend_from_slice(&buf[..n]);
    }
    Ok(latin1(&line).trim().to_string())
}

/// Split `"0 <id> <answer>"` into the device id and the answer.
fn answer_address(line: &[u8]) -> Option<(u8, &[u8])> {
    let rest = line.strip_prefix(b"0 ")?;
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    let (id, rest) = rest.split_at(digits);
    let rest = rest.strip_prefix(b" ")?;
    let id = std::str::from_utf8(id).ok()?.parse().ok()?;
    Some((id, rest))
}

/// `"PI,C-863.11,0123456789,V1.2"` becomes `"C-863.11 SN0123456789"`.
fn describe_idn(idn: &str) -> String {
    let fields: Vec<&str> = idn.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [_, model, serial, ..] => format!("{model} SN{serial}"),
        _ => idn.to_string(),
    }
}

/// One logical device on a [`DaisyChain`].
pub struct DaisyChainDevice {
    port: Arc<DaisyPort>,
    id: u8,
    open: bool,
    closer: Closer,
    raw: Vec<u8>,
    ready: Vec<u8>,
}

impl DaisyChainDevice {
    /// Device id on the chain.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// This device's part of an answer line, or `None` when the line is
    /// addressed to another device on the chain.
    fn strip_prefix<'a>(&self, line: &'a [u8]) -> Option<&'a [u8]> {
        match answer_address(line) {
            Some((id, rest)) if id == self.id => Some(rest),
            Some(_) => None,
            None => Some(line),
        }
    }

    fn prefixed(&self, data: &[u8]) -> Vec<u8> {
        let prefix = format!("{} ", self.id);
        let mut out = Vec::with_capacity(data.len() + prefix.len());
        for line in data.split_inclusive(|&b| b == b'\n') {
            out.extend_from_slice(prefix.as_bytes());
            out.extend_from_slice(line);
        }
        out
    }

    fn take_ready(&mut self, buf: &mut [u8]) -> usize {
        let n = self.ready.len().min(buf.len());
        buf[..n].copy_from_slice(&self.ready[..n]);
        self.ready.drain(..n);
        n
    }
}

impl Transport for DaisyChainDevice {
    fn open(&mut self) -> GcsResult<()> {
        if !self.port.lock()?.transport.is_open() {
            return Err(GcsError::NotConnected);
        }
        self.closer.rearm();
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> GcsResult<()> {
        self.open = false;
        self.raw.clear();
        self.ready.clear();
        self.port.release(self.id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        if !self.open {
            return Err(GcsError::NotConnected);
        }
        self.port.acquire(self.id)?;
        let framed = self.prefixed(data);
        trace!("daisy {} write {:?}", self.id, latin1(&framed));
        self.port.lock()?.transport.write(&framed)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> GcsResult<usize> {
        if !self.open {
            return Err(GcsError::NotConnected);
        }
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 1024];
        while self.ready.is_empty() {
            self.closer.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GcsError::Timeout);
            }
            let n = match self.port.lock()?.transport.read(&mut chunk, remaining.min(READ_SLICE)) {
                Ok(n) => n,
                Err(GcsError::Timeout) => continue,
                Err(e) => return Err(e),
            };
            self.raw.extend_from_slice(&chunk[..n]);
            while let Some(pos) = self.raw.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.raw.drain(..=pos).collect();
                match self.strip_prefix(&line) {
                    Some(stripped) => self.ready.extend_from_slice(stripped),
                    None => trace!("daisy {} dropped {:?}", self.id, latin1(&line)),
                }
            }
        }
        Ok(self.take_ready(buf))
    }

    fn poll_available(&mut self) -> GcsResult<usize> {
        let waiting = self.port.lock()?.transport.poll_available()?;
        Ok(self.ready.len() + self.raw.len() + waiting)
    }

    fn closer(&self) -> Closer {
        self.closer.clone()
    }

    fn describe(&self) -> String {
        format!("{} device {}", self.port.description, self.id)
    }

    fn begin_exchange(&mut self) -> GcsResult<()> {
        self.port.acquire(self.id)
    }

    fn end_exchange(&mut self) {
        self.port.release(self.id);
    }
}

impl Drop for DaisyChainDevice {
    fn drop(&mut self) {
        self.port.release(self.id);
    }
}

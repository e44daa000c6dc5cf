//! RS-232 and USB transports.
//!
//! PI USB controllers enumerate as virtual serial ports, so both share one
//! implementation. A USB transport is created from a description (as
//! returned by [`enumerate_usb`]) or a serial number and resolves the port
//! name when it is opened.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::{debug, trace};

use super::{Closer, Transport};
use crate::error::{GcsError, GcsResult};

/// USB vendor id of Physik Instrumente.
pub const PI_USB_VENDOR_ID: u16 = 0x1A72;

/// Baudrate used for USB virtual serial ports.
const USB_BAUDRATE: u32 = 115_200;

/// Reads block at most this long before the cancel flag is checked again.
const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
enum Target {
    Port { name: String, baudrate: u32 },
    Usb { description: String },
}

/// Serial connection to a controller (RS-232 or USB).
pub struct SerialTransport {
    target: Target,
    port: Option<Box<dyn SerialPort>>,
    closer: Closer,
}

impl SerialTransport {
    /// RS-232 port at `baudrate`, 8N1, no flow control.
    pub fn new(port_name: impl Into<String>, baudrate: u32) -> Self {
        Self {
            target: Target::Port {
                name: port_name.into(),
                baudrate,
            },
            port: None,
            closer: Closer::new(),
        }
    }

    /// USB device matching `description` (a full description or a serial number).
    pub fn usb(description: impl Into<String>) -> Self {
        Self {
            target: Target::Usb {
                description: description.into(),
            },
            port: None,
            closer: Closer::new(),
        }
    }

    fn resolve(&self) -> GcsResult<(String, u32)> {
        match &self.target {
            Target::Port { name, baudrate } => Ok((name.clone(), *baudrate)),
            Target::Usb { description } => {
                let device = enumerate_usb("")?
                    .into_iter()
                    .find(|d| d.matches(description))
                    .ok_or_else(|| {
                        GcsError::ConnectionFailed(format!("USB device {description:?} not found"))
                    })?;
                Ok((device.port_name, USB_BAUDRATE))
            }
        }
    }

    fn port(&mut self) -> GcsResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(GcsError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> GcsResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let (name, baudrate) = self.resolve()?;
        let port = serialport::new(&name, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_SLICE)
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;
        debug!("Opened serial port {name} at {baudrate} baud");
        self.closer.rearm();
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> GcsResult<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.describe());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> GcsResult<usize> {
        let closer = self.closer.clone();
        let deadline = Instant::now() + timeout;
        let port = self.port()?;
        loop {
            closer.check()?;
            match port.read(buf) {
                Ok(0) => {}
                Ok(n) => {
                    trace!("serial read {n} bytes");
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(GcsError::Timeout);
            }
        }
    }

    fn poll_available(&mut self) -> GcsResult<usize> {
        Ok(self.port()?.bytes_to_read()? as usize)
    }

    fn closer(&self) -> Closer {
        self.closer.clone()
    }

    fn describe(&self) -> String {
        match &self.target {
            Target::Port { name, baudrate } => format!("{name} @ {baudrate}"),
            Target::Usb { description } => format!("USB {description}"),
        }
    }
}

/// A PI controller attached via USB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// `"<product> SN <serial>"`
    pub description: String,
    /// Serial number reported by the USB descriptor
    pub serial_number: String,
    /// Operating system port name
    pub port_name: String,
}

impl UsbDevice {
    fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        self.description == wanted || self.serial_number == wanted || self.port_name == wanted
    }
}

/// List PI USB controllers whose description contains `mask`.
pub fn enumerate_usb(mask: &str) -> GcsResult<Vec<UsbDevice>> {
    let devices = serialport::available_ports()?
        .into_iter()
        .filter_map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) if usb.vid == PI_USB_VENDOR_ID => {
                let serial_number = usb.serial_number.unwrap_or_default();
                let product = usb.product.unwrap_or_else(|| "PI Controller".to_string());
                Some(UsbDevice {
                    description: format!("{product} SN {serial_number}"),
                    serial_number,
                    port_name: info.port_name,
                })
            }
            _ => None,
        })
        .filter(|device| device.description.contains(mask))
        .collect();
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_device_matching() {
        let device = UsbDevice {
            description: "C-863 SN 0123456789".to_string(),
            serial_number: "0123456789".to_string(),
            port_name: "/dev/ttyUSB0".to_string(),
        };
        assert!(device.matches("C-863 SN 0123456789"));
        assert!(device.matches(" 0123456789 "));
        assert!(device.matches("/dev/ttyUSB0"));
        assert!(!device.matches("C-863"));
    }

    #[test]
    fn test_unopened_serial_transport() {
        let mut transport = SerialTransport::new("/dev/ttyS99", 115_200);
        assert!(!transport.is_open());
        assert_eq!(transport.describe(), "/dev/ttyS99 @ 115200");
        assert!(matches!(transport.write(b"*IDN?\n"), Err(GcsError::NotConnected)));
        transport.close().unwrap();
    }
}

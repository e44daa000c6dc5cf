//! End-to-end scenarios through the public API against an in-process
//! GCS 2.0 stage controller behind a custom [`Transport`].

use std::collections::VecDeque;
use std::time::Duration;

use pigcs::tools::{self, WaitOptions};
use pigcs::transport::Closer;
use pigcs::{ConnectionSettings, GcsCommands, GcsDevice, GcsError, GcsResult, Syntax, Transport};

/// `PI_CNTR_MOVE_WITHOUT_REF_OR_NO_SERVO`
const ERR_NO_SERVO: i64 = 5;
/// `PI_CNTR_UNKNOWN_COMMAND`
const ERR_UNKNOWN_COMMAND: i64 = 2;

const HELP: &str = "The following commands are valid: \n\
#7 Request Controller Ready Status \n\
FRF [{<AxisID>}] Fast Reference Move To Reference Switch \n\
FRF? [{<AxisID>}] Get Referencing Result \n\
MOV {<AxisID> <Position>} Set Target Position \n\
ONT? [{<AxisID>}] Get On Target State \n\
POS? [{<AxisID>}] Get Real Position \n\
SVO {<AxisID> <ServoState>} Set Servo Mode \n\
end of help\n";

/// Single-axis stage that settles instantly.
struct Stage {
    open: bool,
    pending: Vec<u8>,
    output: VecDeque<u8>,
    error: i64,
    servo: bool,
    referenced: bool,
    position: f64,
    closer: Closer,
}

impl Stage {
    fn new() -> Self {
        Self {
            open: false,
            pending: Vec::new(),
            output: VecDeque::new(),
            error: 0,
            servo: false,
            referenced: false,
            position: 3.0,
            closer: Closer::new(),
        }
    }

    fn answer(&mut self, text: &str) {
        self.output.extend(text.bytes());
    }

    fn fail(&mut self, code: i64) {
        if self.error == 0 {
            self.error = code;
        }
    }

    fn handle(&mut self, line: &str) {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();
        match command {
            "CSV?" => self.answer("2.0\n"),
            "*IDN?" => self.answer("(c)2024 Physik Instrumente (PI) GmbH & Co. KG, C-863.11, 0123456789, 01.00.02\n"),
            "HLP?" => self.answer(HELP),
            "SAI?" => self.answer("X\n"),
            "ERR?" => {
                let code = std::mem::take(&mut self.error);
                self.answer(&format!("{code}\n"));
            }
            "SVO" => self.servo = args.get(1) == Some(&"1"),
            "MOV" => match args.get(1).and_then(|v| v.parse().ok()) {
                Some(target) if self.servo => self.position = target,
                _ => self.fail(ERR_NO_SERVO),
            },
            "FRF" => {
                self.referenced = true;
                self.position = 0.0;
            }
            "POS?" => {
                let answer = format!("X={}\n", self.position);
                self.answer(&answer);
            }
            "ONT?" => self.answer("X=1\n"),
            "FRF?" => {
                let answer = format!("X={}\n", u8::from(self.referenced));
                self.answer(&answer);
            }
            _ => self.fail(ERR_UNKNOWN_COMMAND),
        }
    }
}

impl Transport for Stage {
    fn open(&mut self) -> GcsResult<()> {
        self.open = true;
        self.closer.rearm();
        Ok(())
    }

    fn close(&mut self) -> GcsResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        for &byte in data {
            match byte {
                b'\n' => {
                    let line = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
                    self.handle(&line);
                }
                7 if self.pending.is_empty() => self.output.extend(b"\xb1\n"),
                _ => self.pending.push(byte),
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> GcsResult<usize> {
        if self.output.is_empty() {
            return Err(GcsError::Timeout);
        }
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn closer(&self) -> Closer {
        self.closer.clone()
    }

    fn describe(&self) -> String {
        "in-process stage".to_string()
    }
}

fn connect() -> GcsDevice {
    let settings = ConnectionSettings::from_json(r#"{"timeout_ms": 200}"#).unwrap();
    GcsDevice::from_transport(Box::new(Stage::new()), settings).unwrap()
}

fn fast() -> WaitOptions {
    WaitOptions {
        timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(1),
        ..WaitOptions::default()
    }
}

#[test]
fn test_probe_binds_gcs2() {
    let mut device = connect();
    assert_eq!(device.syntax(), Syntax::Gcs2);
    assert!(device.as_gcs2().is_ok());
    assert!(device.as_gcs21().is_err());
    assert_eq!(device.devname().unwrap(), "C-863.11");
}

#[test]
fn test_move_and_verify() {
    let mut device = connect();
    device.svo(("X", true)).unwrap();
    device.mov(("X", 12.5)).unwrap();
    tools::wait_on_target(&mut device, &["X".to_string()], &fast()).unwrap();
    assert_eq!(device.qpos("X").unwrap()["X"], 12.5);
}

#[test]
fn test_move_without_servo_raises_controller_error() {
    let mut device = connect();
    let err = device.mov(("X", 1.0)).unwrap_err();
    assert!(err.is_controller_code(ERR_NO_SERVO));
    assert_eq!(device.qpos("X").unwrap()["X"], 3.0);
}

#[test]
fn test_reference() {
    let mut device = connect();
    assert!(!device.qfrf("X").unwrap()["X"]);
    device.frf("X").unwrap();
    tools::wait_on_ready(&mut device, &fast()).unwrap();
    assert!(device.qfrf("X").unwrap()["X"]);
    assert_eq!(device.qpos("X").unwrap()["X"], 0.0);
}

#[test]
fn test_capabilities_from_help() {
    let mut device = connect();
    assert!(device.supports("qONT").unwrap());
    assert!(device.supports("IsControllerReady").unwrap());
    assert!(!device.supports("qDRL").unwrap());
}

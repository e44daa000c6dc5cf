//! Scripted transport for unit tests.
//!
//! Replays canned controller answers for expected request lines. `ERR?`
//! lines that are not explicitly scripted are answered with `0`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{GcsError, GcsResult};
use crate::transport::{latin1, to_latin1, Closer, Transport};

#[derive(Debug)]
struct Expectation {
    request: String,
    response: Option<String>,
}

#[derive(Debug, Default)]
struct Script {
    expectations: VecDeque<Expectation>,
    output: VecDeque<Vec<u8>>,
    written: Vec<String>,
    auto_err: bool,
    open: bool,
    open_count: usize,
    read_delay: Duration,
}

/// Inspection handle for a [`ScriptedTransport`] that was moved away.
#[derive(Debug, Clone)]
pub struct ScriptLog {
    script: Arc<Mutex<Script>>,
}

impl ScriptLog {
    /// Every request line written so far.
    pub fn written(&self) -> Vec<String> {
        self.script.lock().unwrap().written.clone()
    }

    /// True when every expectation was consumed.
    pub fn is_done(&self) -> bool {
        self.script.lock().unwrap().expectations.is_empty()
    }

    /// How often the transport was opened.
    pub fn open_count(&self) -> usize {
        self.script.lock().unwrap().open_count
    }

    /// True while open.
    pub fn is_open(&self) -> bool {
        self.script.lock().unwrap().open
    }
}

/// Transport that answers scripted requests.
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    closer: Closer,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                auto_err: true,
                ..Script::default()
            })),
            closer: Closer::new(),
        }
    }

    /// Answer `request` (one line including `\n`, or a single control byte)
    /// with `response`.
    pub fn expect(self, request: &str, response: &str) -> Self {
        self.push(request, Some(response.to_string()))
    }

    /// Accept `request` without answering.
    pub fn expect_silence(self, request: &str) -> Self {
        self.push(request, None)
    }

    /// Accept `request` and answer it with `code` on the next `ERR?`.
    pub fn expect_error(self, request: &str, code: i64) -> Self {
        self.push(request, None)
            .push("ERR?\n", Some(format!("{code}\n")))
    }

    /// Queue bytes that are readable without any request.
    pub fn with_raw(self, bytes: &[u8]) -> Self {
        self.script.lock().unwrap().output.push_back(bytes.to_vec());
        self
    }

    /// Answer unscripted `ERR?` with `0` (default) or reject it.
    pub fn auto_err(self, enabled: bool) -> Self {
        self.script.lock().unwrap().auto_err = enabled;
        self
    }

    /// Sleep this long before each successful read.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().read_delay = delay;
        self
    }

    /// Start in the open state.
    pub fn opened(self) -> Self {
        self.script.lock().unwrap().open = true;
        self
    }

    pub fn log(&self) -> ScriptLog {
        ScriptLog {
            script: Arc::clone(&self.script),
        }
    }

    fn push(self, request: &str, response: Option<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .expectations
            .push_back(Expectation {
                request: request.to_string(),
                response,
            });
        self
    }

    fn handle_request(script: &mut Script, request: String) -> GcsResult<()> {
        let matches_front = script
            .expectations
            .front()
            .is_some_and(|e| e.request == request);
        if matches_front {
            if let Some(exp) = script.expectations.pop_front() {
                if let Some(response) = exp.response {
                    // One chunk per answer line so reads observe progress.
                    for line in to_latin1(&response).split_inclusive(|&b| b == b'\n') {
                        script.output.push_back(line.to_vec());
                    }
                }
            }
        } else if request == "ERR?\n" && script.auto_err {
            script.output.push_back(b"0\n".to_vec());
        } else {
            let wanted = script.expectations.front().map(|e| e.request.clone());
            script.written.push(request.clone());
            return Err(GcsError::InvalidResponse(format!(
                "unexpected request {request:?}, expected {wanted:?}"
            )));
        }
        script.written.push(request);
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> GcsResult<()> {
        let mut script = self.script.lock().unwrap();
        script.open = true;
        script.open_count += 1;
        self.closer.rearm();
        Ok(())
    }

    fn close(&mut self) -> GcsResult<()> {
        self.script.lock().unwrap().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.script.lock().unwrap().open
    }

    fn write(&mut self, data: &[u8]) -> GcsResult<()> {
        let mut script = self.script.lock().unwrap();
        if !script.open {
            return Err(GcsError::NotConnected);
        }
        let text = latin1(data);
        if !text.contains('\n') {
            return Self::handle_request(&mut script, text);
        }
        for line in text.split_inclusive('\n') {
            Self::handle_request(&mut script, line.to_string())?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> GcsResult<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            self.closer.check()?;
            let delay = {
                let mut script = self.script.lock().unwrap();
                if !script.open {
                    return Err(GcsError::NotConnected);
                }
                if let Some(mut chunk) = script.output.pop_front() {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        script.output.push_front(chunk.split_off(n));
                    }
                    Some((n, script.read_delay))
                } else {
                    None
                }
            };
            if let Some((n, delay)) = delay {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                return Ok(n);
            }
            if Instant::now() >= deadline {
                return Err(GcsError::Timeout);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn poll_available(&mut self) -> GcsResult<usize> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .output
            .iter()
            .map(Vec::len)
            .sum())
    }

    fn closer(&self) -> Closer {
        self.closer.clone()
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

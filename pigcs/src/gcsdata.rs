//! GCS bulk data ("gcsdata") answers.
//!
//! Data recorder and wave table queries answer with a header of
//! `# KEY = value` lines terminated by an `# END` line, followed by rows of
//! separator-delimited floats:
//!
//! ```text
//! # REM E-727
//! # VERSION = 1
//! # TYPE = 1
//! # SEPARATOR = 32
//! # DIM = 2
//! # SAMPLE_TIME = 0.000050
//! # NDATA = 3
//! # NAME0 = Actual Position of axis 1
//! # NAME1 = Target Position of axis 1
//! # END_HEADER
//! 0.1 0.2
//! 0.3 0.4
//! 0.5 0.6
//! ```
//!
//! The rows are pumped by a background worker (see
//! [`GcsMessages::read_gcsdata`](crate::GcsMessages::read_gcsdata)); its
//! progress is observable as a [`BufState`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use ndarray::Array2;

use crate::error::{GcsError, GcsResult};

/// Parsed bulk data header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcsDataHeader {
    entries: IndexMap<String, String>,
}

impl GcsDataHeader {
    /// All `KEY = value` entries in controller order.
    pub fn entries(&self) -> &IndexMap<String, String> {
        &self.entries
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn parse_key<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Number of data rows announced by the controller.
    pub fn ndata(&self) -> Option<usize> {
        self.parse_key("NDATA")
    }

    /// Number of columns (`DIM`, or `NCHANNELS` on older firmware).
    pub fn dim(&self) -> Option<usize> {
        self.parse_key("DIM").or_else(|| self.parse_key("NCHANNELS"))
    }

    /// Column separator, sent as an ASCII code. Defaults to space.
    pub fn separator(&self) -> char {
        self.parse_key::<u8>("SEPARATOR")
            .map(char::from)
            .unwrap_or(' ')
    }

    /// Seconds between rows, if announced.
    pub fn sample_time(&self) -> Option<f64> {
        self.parse_key("SAMPLE_TIME")
    }

    /// Column names (`NAME0`, `NAME1`, ...).
    pub fn names(&self) -> Vec<String> {
        (0..)
            .map_while(|i| self.get(&format!("NAME{i}")).map(str::to_string))
            .collect()
    }

    /// Feed one header line. Returns `true` on the terminating `END` line.
    pub fn push_line(&mut self, line: &str) -> GcsResult<bool> {
        let body = line.trim().strip_prefix('#').ok_or_else(|| {
            GcsError::InvalidResponse(format!("expected gcsdata header line, got {line:?}"))
        })?;
        let body = body.trim();
        if body.starts_with("END") {
            return Ok(true);
        }
        if let Some((key, value)) = body.split_once('=') {
            self.entries
                .insert(key.trim().to_string(), value.trim().to_string());
        } else if let Some((key, value)) = body.split_once(' ') {
            // Free-form lines such as "REM E-727".
            self.entries
                .insert(key.trim().to_string(), value.trim().to_string());
        } else if !body.is_empty() {
            self.entries.insert(body.to_string(), String::new());
        }
        Ok(false)
    }

    /// Parse a complete header block.
    pub fn parse(text: &str) -> GcsResult<Self> {
        let mut header = Self::default();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if header.push_line(line)? {
                return Ok(header);
            }
        }
        Err(GcsError::InvalidResponse(
            "gcsdata header is missing its END line".to_string(),
        ))
    }
}

/// Parse one data row into floats.
pub fn parse_row(line: &str, separator: char) -> GcsResult<Vec<f64>> {
    let parse = |tok: &str| {
        tok.trim()
            .parse::<f64>()
            .map_err(|_| GcsError::ParseError(format!("invalid gcsdata value {tok:?}")))
    };
    if separator == ' ' || separator == '\t' {
        line.split_whitespace().map(parse).collect()
    } else {
        line.trim()
            .split(separator)
            .filter(|t| !t.trim().is_empty())
            .map(parse)
            .collect()
    }
}

/// Why a bulk read did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkFailure {
    /// The connection was closed while pumping.
    Cancelled,
    /// Transport, protocol or controller error, with its message.
    Error(String),
}

/// Observable state of the bulk data pump.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BufState {
    /// No bulk read was started.
    #[default]
    Idle,
    /// Started, no data row received yet.
    Pending,
    /// Rows arriving; the fraction received is in `(0, 1]`.
    Receiving(f64),
    /// All rows received. `buf_data` is available.
    Done,
    /// The pump stopped early; the partial buffer was discarded.
    Failed(BulkFailure),
}

impl BufState {
    /// True once all data arrived.
    pub fn is_done(&self) -> bool {
        matches!(self, BufState::Done)
    }

    /// True while the pump is still running.
    pub fn is_active(&self) -> bool {
        matches!(self, BufState::Pending | BufState::Receiving(_))
    }

    /// Progress fraction: `0` pending, `(0, 1]` receiving, `1` done.
    pub fn progress(&self) -> Option<f64> {
        match self {
            BufState::Pending => Some(0.0),
            BufState::Receiving(f) => Some(*f),
            BufState::Done => Some(1.0),
            BufState::Idle | BufState::Failed(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct BulkInner {
    state: BufState,
    header: Option<GcsDataHeader>,
    rows: Vec<Vec<f64>>,
    expected: Option<usize>,
}

/// Shared buffer between the pump and the handle.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct BulkBuffer {
    inner: Arc<(Mutex<BulkInner>, Condvar)>,
}

impl BulkBuffer {
    fn lock(&self) -> GcsResult<MutexGuard<'_, BulkInner>> {
        self.inner.0.lock().map_err(|_| GcsError::poisoned())
    }

    /// Reset for a new read with `expected` rows (`None` = open-ended).
    pub fn start(&self, header: GcsDataHeader, expected: Option<usize>) -> GcsResult<()> {
        let mut inner = self.lock()?;
        inner.state = BufState::Pending;
        inner.header = Some(header);
        inner.rows.clear();
        inner.expected = expected;
        Ok(())
    }

    /// Append a row and update progress.
    pub fn push_row(&self, row: Vec<f64>) -> GcsResult<()> {
        let mut inner = self.lock()?;
        inner.rows.push(row);
        let received = inner.rows.len() as f64;
        let fraction = match inner.expected {
            Some(n) if n > 0 => (received / n as f64).min(1.0),
            _ => received / (received + 1.0),
        };
        inner.state = BufState::Receiving(fraction);
        Ok(())
    }

    /// Rows received so far.
    pub fn rows_received(&self) -> usize {
        self.lock().map(|i| i.rows.len()).unwrap_or(0)
    }

    /// Mark the read complete.
    pub fn finish(&self) -> GcsResult<()> {
        self.lock()?.state = BufState::Done;
        self.inner.1.notify_all();
        Ok(())
    }

    /// Mark the read failed and discard the partial buffer.
    pub fn fail(&self, error: &GcsError) {
        if let Ok(mut inner) = self.inner.0.lock() {
            inner.rows.clear();
            inner.state = BufState::Failed(match error {
                GcsError::Cancelled => BulkFailure::Cancelled,
                other => BulkFailure::Error(other.to_string()),
            });
        }
        self.inner.1.notify_all();
    }

    /// Current state.
    pub fn state(&self) -> BufState {
        self.lock()
            .map(|i| i.state.clone())
            .unwrap_or(BufState::Failed(BulkFailure::Error("poisoned".to_string())))
    }

    /// Header of the current or last read.
    pub fn header(&self) -> Option<GcsDataHeader> {
        self.lock().ok().and_then(|i| i.header.clone())
    }

    /// Block until the pump leaves the active states or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> GcsResult<BufState> {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().map_err(|_| GcsError::poisoned())?;
        while inner.state.is_active() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GcsError::Timeout);
            }
            inner = cvar
                .wait_timeout(inner, remaining)
                .map_err(|_| GcsError::poisoned())?
                .0;
        }
        Ok(inner.state.clone())
    }

    /// The completed buffer as an `rows × columns` matrix.
    ///
    /// # Errors
    ///
    /// [`GcsError::Cancelled`] if the read was cancelled,
    /// [`GcsError::InvalidResponse`] if it failed, is still running, or rows
    /// have inconsistent widths.
    pub fn data(&self) -> GcsResult<Array2<f64>> {
        let inner = self.lock()?;
        match &inner.state {
            BufState::Done => {}
            BufState::Failed(BulkFailure::Cancelled) => return Err(GcsError::Cancelled),
            BufState::Failed(BulkFailure::Error(msg)) => {
                return Err(GcsError::InvalidResponse(format!("bulk read failed: {msg}")))
            }
            other => {
                return Err(GcsError::InvalidResponse(format!(
                    "bulk data not complete (state {other:?})"
                )))
            }
        }
        let columns = inner
            .rows
            .first()
            .map(Vec::len)
            .or_else(|| inner.header.as_ref().and_then(GcsDataHeader::dim))
            .unwrap_or(0);
        if let Some(bad) = inner.rows.iter().position(|r| r.len() != columns) {
            return Err(GcsError::InvalidResponse(format!(
                "gcsdata row {bad} has {} values, expected {columns}",
                inner.rows[bad].len()
            )));
        }
        let flat: Vec<f64> = inner.rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((inner.rows.len(), columns), flat)
            .map_err(|e| GcsError::InvalidResponse(format!("gcsdata shape: {e}")))
    }
}

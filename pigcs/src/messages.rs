//! GCS message framing.
//!
//! [`GcsMessages`] turns command strings into wire traffic and answers back
//! into strings:
//!
//! - **Write**: the trailing newline is normalised to exactly one `\n`. In
//!   embedded-error mode `ERR?` rides in the same transmission.
//! - **Read**: lines are read until one does not end in a space, the
//!   controller's "more lines follow" marker.
//! - **Error check**: unless disabled, `ERR?` is polled after every command
//!   and a nonzero code is raised as [`GcsError::Controller`], translated in
//!   the code space of the bound [`Syntax`].
//! - **Bulk data**: [`read_gcsdata`](GcsMessages::read_gcsdata) parses the
//!   header synchronously and hands the connection to a background pump that
//!   fills a [`BulkBuffer`]. The next command waits for the pump to finish.
//! - **Log sink**: if a log file is configured, outbound lines are appended
//!   as `> ...` and inbound lines as `< ...`.
//!
//! # Example
//!
//! ```no_run
//! use pigcs::{ConnectionSettings, GcsMessages, TcpTransport};
//!
//! let transport = TcpTransport::new("192.168.15.210", 50000);
//! let mut msgs = GcsMessages::new(Box::new(transport), ConnectionSettings::default())?;
//! msgs.send("SVO 1 1")?;
//! let answer = msgs.read("POS? 1")?;
//! println!("{}", answer.trim());
//! # Ok::<(), pigcs::GcsError>(())
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ndarray::Array2;
use tracing::{debug, trace, warn};

use crate::config::ConnectionSettings;
use crate::error::{ControllerError, GcsError, GcsResult, Syntax};
use crate::gcsdata::{parse_row, BufState, BulkBuffer, GcsDataHeader};
use crate::transport::{to_latin1, Closer, LineChannel, Transport};

/// The error query appended or polled after commands.
const ERROR_QUERY: &str = "ERR?";

// ==================== Log sink ====================

/// Appends wire traffic to a file in human-readable form.
#[derive(Debug, Clone)]
struct LogSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    poisoned: Arc<AtomicBool>,
}

impl LogSink {
    fn open(path: &Path) -> GcsResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            poisoned: Arc::new(AtomicBool::new(false)),
        })
    }

    fn write(&self, marker: char, text: &str) {
        let Ok(mut file) = self.file.lock() else {
            if !self.poisoned.swap(true, Ordering::Relaxed) {
                warn!("GCS log {} unavailable: {}", self.path.display(), GcsError::poisoned());
            }
            return;
        };
        for line in text.lines() {
            if let Err(e) = writeln!(file, "{marker} {}", line.trim_end()) {
                warn!("Cannot write GCS log {}: {e}", self.path.display());
                return;
            }
        }
    }

    fn sent(&self, text: &str) {
        self.write('>', text);
    }

    fn received(&self, text: &str) {
        self.write('<', text);
    }
}

// ==================== Framing ====================

/// Framing layer over one transport.
pub struct GcsMessages {
    channel: Option<LineChannel>,
    pump: Option<JoinHandle<LineChannel>>,
    closer: Closer,
    settings: ConnectionSettings,
    syntax: Syntax,
    log: Option<LogSink>,
    bulk: BulkBuffer,
}

impl GcsMessages {
    /// Wrap `transport`. It is opened on first use unless already open.
    pub fn new(transport: Box<dyn Transport>, settings: ConnectionSettings) -> GcsResult<Self> {
        let log = match &settings.logfile_path {
            Some(path) => Some(LogSink::open(path)?),
            None => None,
        };
        let channel = LineChannel::new(transport, settings.timeout());
        Ok(Self {
            closer: channel.closer(),
            channel: Some(channel),
            pump: None,
            settings,
            syntax: Syntax::Gcs2,
            log,
            bulk: BulkBuffer::default(),
        })
    }

    // ==================== Settings ====================

    /// Current settings.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Whether `ERR?` is polled after each command.
    pub fn errcheck(&self) -> bool {
        self.settings.errcheck
    }

    /// Enable or disable error polling.
    pub fn set_errcheck(&mut self, errcheck: bool) {
        self.settings.errcheck = errcheck;
    }

    /// Whether `ERR?` is sent in the same transmission.
    pub fn embederr(&self) -> bool {
        self.settings.embederr
    }

    /// Enable or disable embedded error queries.
    pub fn set_embederr(&mut self, embederr: bool) {
        self.settings.embederr = embederr;
    }

    /// Per-line read timeout.
    pub fn timeout(&self) -> Duration {
        self.settings.timeout()
    }

    /// Change the per-line read timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.settings.timeout_ms = timeout.as_millis() as u64;
        if let Some(channel) = self.channel.as_mut() {
            channel.set_timeout(timeout);
        }
    }

    /// Start or stop logging traffic to `path`.
    pub fn set_logfile(&mut self, path: Option<PathBuf>) -> GcsResult<()> {
        self.log = match &path {
            Some(path) => Some(LogSink::open(path)?),
            None => None,
        };
        self.settings.logfile_path = path;
        Ok(())
    }

    /// Error code space used to translate `ERR?` answers.
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Select the error code space.
    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.syntax = syntax;
    }

    /// Run `f` with error polling switched to `errcheck`, restoring it afterwards.
    pub fn with_errcheck<T>(
        &mut self,
        errcheck: bool,
        f: impl FnOnce(&mut Self) -> GcsResult<T>,
    ) -> GcsResult<T> {
        let saved = self.settings.errcheck;
        self.settings.errcheck = errcheck;
        let result = f(self);
        self.settings.errcheck = saved;
        result
    }

    // ==================== Connection ====================

    /// Open the transport now instead of on the first command.
    pub fn connect(&mut self) -> GcsResult<()> {
        self.channel()?.ensure_open()
    }

    /// True while the transport is open.
    pub fn is_connected(&self) -> bool {
        match &self.channel {
            Some(channel) => channel.is_open(),
            None => self.pump.is_some(),
        }
    }

    /// Endpoint description.
    pub fn describe(&self) -> String {
        self.channel
            .as_ref()
            .map(LineChannel::describe)
            .unwrap_or_else(|| "bulk read in progress".to_string())
    }

    /// Handle that cancels a pending read from another thread.
    pub fn canceller(&self) -> Closer {
        self.closer.clone()
    }

    /// Close the transport, cancelling any pending read.
    pub fn close(&mut self) -> GcsResult<()> {
        if !self.is_connected() {
            return Ok(());
        }
        debug!("Closing connection to {}", self.describe());
        self.closer.cancel();
        let channel = self.channel()?;
        channel.close()
    }

    /// The line channel, reclaimed from a finished bulk pump if needed.
    fn channel(&mut self) -> GcsResult<&mut LineChannel> {
        if let Some(pump) = self.pump.take() {
            trace!("Waiting for bulk data pump to finish");
            let channel = pump
                .join()
                .map_err(|_| GcsError::InvalidResponse("bulk data pump panicked".to_string()))?;
            self.channel = Some(channel);
        }
        let timeout = self.settings.timeout();
        let channel = self.channel.as_mut().ok_or(GcsError::NotConnected)?;
        channel.set_timeout(timeout);
        Ok(channel)
    }

    fn log_sent(&self, text: &str) {
        if let Some(log) = &self.log {
            log.sent(text);
        }
    }

    fn log_received(&self, text: &str) {
        if let Some(log) = &self.log {
            log.received(text);
        }
    }

    // ==================== Commands ====================

    /// Send a command that has no answer.
    pub fn send(&mut self, command: &str) -> GcsResult<()> {
        let line = command.trim_end_matches(['\n', '\r']);
        let errcheck = self.settings.errcheck;
        let embed = errcheck && self.settings.embederr;
        let syntax = self.syntax;

        debug!("GCS send: {:?}", line);
        self.log_sent(line);
        let result = self.channel()?.exchange(|ch| {
            if embed {
                ch.write(&to_latin1(&format!("{line}\n{ERROR_QUERY}\n")))?;
                read_error_code(ch).and_then(|code| raise_code(syntax, code))
            } else {
                ch.write(&to_latin1(&format!("{line}\n")))?;
                if errcheck {
                    poll_error(ch, syntax)
                } else {
                    Ok(())
                }
            }
        });
        if let Err(e) = &result {
            debug!("GCS send {:?} failed: {e}", line);
        }
        result
    }

    /// Send a query and return its complete answer (all lines, terminators kept).
    pub fn read(&mut self, command: &str) -> GcsResult<String> {
        self.query_with(command, read_answer)
    }

    /// Send a query whose answer is a `#...#END` block.
    pub fn read_block(&mut self, command: &str) -> GcsResult<String> {
        self.query_with(command, read_block_answer)
    }

    fn query_with(
        &mut self,
        command: &str,
        reader: fn(&mut LineChannel) -> GcsResult<String>,
    ) -> GcsResult<String> {
        let line = command.trim_end_matches(['\n', '\r']);
        let errcheck = self.settings.errcheck;
        let embed = errcheck && self.settings.embederr;
        let syntax = self.syntax;

        debug!("GCS send: {:?}", line);
        self.log_sent(line);
        let answer = self.channel()?.exchange(|ch| {
            let request = if embed {
                format!("{line}\n{ERROR_QUERY}\n")
            } else {
                format!("{line}\n")
            };
            ch.write(&to_latin1(&request))?;
            let answer = reader(ch)?;
            if embed {
                read_error_code(ch).and_then(|code| raise_code(syntax, code))?;
            } else if errcheck {
                poll_error(ch, syntax)?;
            }
            Ok(answer)
        })?;
        trace!("GCS recv: {:?}", answer);
        self.log_received(&answer);
        Ok(answer)
    }

    /// Send a single unterminated control byte (`#24` stop-all and friends).
    ///
    /// Control bytes are never error checked.
    pub fn send_control(&mut self, byte: u8) -> GcsResult<()> {
        debug!("GCS send: #{byte}");
        self.log_sent(&format!("#{byte}"));
        self.channel()?.exchange(|ch| ch.write(&[byte]))
    }

    /// Send a control byte and return its single-line answer.
    pub fn read_control(&mut self, byte: u8) -> GcsResult<String> {
        debug!("GCS send: #{byte}");
        self.log_sent(&format!("#{byte}"));
        let answer = self.channel()?.exchange(|ch| {
            ch.write(&[byte])?;
            read_answer(ch)
        })?;
        trace!("GCS recv: {:?}", answer);
        self.log_received(&answer);
        Ok(answer)
    }

    /// Query `ERR?` and raise on a nonzero code.
    pub fn check_error(&mut self) -> GcsResult<()> {
        let code = self.query_error()?;
        raise_code(self.syntax, code)
    }

    /// Query `ERR?` and return the raw code. Never error checked itself.
    pub fn query_error(&mut self) -> GcsResult<i64> {
        debug!("GCS send: {:?}", ERROR_QUERY);
        self.log_sent(ERROR_QUERY);
        let code = self.channel()?.exchange(|ch| {
            ch.write(format!("{ERROR_QUERY}\n").as_bytes())?;
            read_error_code(ch)
        })?;
        self.log_received(&code.to_string());
        Ok(code)
    }

    /// Discard unread input, e.g. after a timed-out query.
    pub fn flush_input(&mut self) -> GcsResult<()> {
        self.channel()?.flush_input()
    }

    /// Bytes waiting on the transport.
    pub fn poll_available(&mut self) -> GcsResult<usize> {
        self.channel()?.poll_available()
    }

    // ==================== Bulk data ====================

    /// Send a bulk data query and start pumping its rows in the background.
    ///
    /// `rows` is the expected number of data rows; `None` takes `NDATA` from
    /// the header, or reads until a row without continuation space. Returns
    /// the parsed header. Observe progress with [`buf_state`](Self::buf_state)
    /// and collect the matrix with [`buf_data`](Self::buf_data).
    pub fn read_gcsdata(&mut self, command: &str, rows: Option<usize>) -> GcsResult<GcsDataHeader> {
        let line = command.trim_end_matches(['\n', '\r']).to_string();
        debug!("GCS send: {:?} (gcsdata)", line);
        self.log_sent(&line);

        let channel = self.channel()?;
        channel.begin_exchange()?;
        let header = match write_and_read_header(channel, &line) {
            Ok(header) => header,
            Err(e) => {
                channel.end_exchange();
                return Err(e);
            }
        };
        debug!("gcsdata header: {:?}", header.entries());
        let expected = rows.or_else(|| header.ndata());
        self.bulk.start(header.clone(), expected)?;

        let mut channel = self.channel.take().ok_or(GcsError::NotConnected)?;
        let pump = Pump {
            bulk: self.bulk.clone(),
            separator: header.separator(),
            expected,
            errcheck: self.settings.errcheck,
            syntax: self.syntax,
            log: self.log.clone(),
        };
        let handle = thread::Builder::new()
            .name("gcs-bulk-pump".to_string())
            .spawn(move || {
                pump.run(&mut channel);
                channel.end_exchange();
                channel
            })?;
        self.pump = Some(handle);
        Ok(header)
    }

    /// State of the bulk data pump.
    pub fn buf_state(&self) -> BufState {
        self.bulk.state()
    }

    /// Completed bulk data as a `rows × columns` matrix.
    pub fn buf_data(&self) -> GcsResult<Array2<f64>> {
        self.bulk.data()
    }

    /// Header of the current or last bulk read.
    pub fn buf_header(&self) -> Option<GcsDataHeader> {
        self.bulk.header()
    }

    /// Block until the pump finishes, then return the final state.
    pub fn wait_bulk(&mut self, timeout: Duration) -> GcsResult<BufState> {
        let state = self.bulk.wait(timeout)?;
        self.channel()?;
        Ok(state)
    }
}

impl Drop for GcsMessages {
    fn drop(&mut self) {
        if self.pump.is_some() {
            self.closer.cancel();
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

struct Pump {
    bulk: BulkBuffer,
    separator: char,
    expected: Option<usize>,
    errcheck: bool,
    syntax: Syntax,
    log: Option<LogSink>,
}

impl Pump {
    fn run(&self, channel: &mut LineChannel) {
        match self.collect(channel) {
            Ok(()) => {
                debug!("gcsdata complete: {} rows", self.bulk.rows_received());
                if let Err(e) = self.bulk.finish() {
                    self.bulk.fail(&e);
                }
            }
            Err(e) => {
                warn!("gcsdata pump stopped: {e}");
                self.bulk.fail(&e);
            }
        }
    }

    fn collect(&self, channel: &mut LineChannel) -> GcsResult<()> {
        let mut received = 0usize;
        loop {
            if self.expected.is_some_and(|n| received >= n) {
                break;
            }
            let line = channel.read_line()?;
            if let Some(log) = &self.log {
                log.received(&line);
            }
            let more = line.ends_with(" \n");
            if !line.trim().is_empty() {
                self.bulk.push_row(parse_row(&line, self.separator)?)?;
                received += 1;
            }
            if self.expected.is_none() && !more {
                break;
            }
        }
        if self.errcheck {
            channel.write(format!("{ERROR_QUERY}\n").as_bytes())?;
            raise_code(self.syntax, read_error_code(channel)?)?;
        }
        Ok(())
    }
}

// ==================== Line helpers ====================

fn write_and_read_header(channel: &mut LineChannel, line: &str) -> GcsResult<GcsDataHeader> {
    channel.write(&to_latin1(&format!("{line}\n")))?;
    let mut header = GcsDataHeader::default();
    loop {
        let text = channel.read_line()?;
        if text.trim().is_empty() {
            continue;
        }
        if header.push_line(&text)? {
            return Ok(header);
        }
    }
}

/// Read lines until one does not end with the continuation space.
fn read_answer(channel: &mut LineChannel) -> GcsResult<String> {
    let mut answer = String::new();
    loop {
        let line = channel.read_line()?;
        let more = line.ends_with(" \n");
        answer.push_str(&line);
        if !more {
            return Ok(answer);
        }
    }
}

/// Read a block answer, tracking `#...`/`#END` nesting.
fn read_block_answer(channel: &mut LineChannel) -> GcsResult<String> {
    let mut answer = String::new();
    let mut depth = 0usize;
    loop {
        let line = channel.read_line()?;
        let more = line.ends_with(" \n");
        let head = line.trim_start();
        answer.push_str(&line);
        if head.as_bytes().get(..4).is_some_and(|b| b.eq_ignore_ascii_case(b"#END")) {
            depth = depth.saturating_sub(1);
            if depth == 0 && !more {
                return Ok(answer);
            }
        } else if head.starts_with('#') {
            depth += 1;
        } else if depth == 0 && !more {
            return Ok(answer);
        }
    }
}

fn read_error_code(channel: &mut LineChannel) -> GcsResult<i64> {
    let line = channel.read_line()?;
    line.trim()
        .parse()
        .map_err(|_| GcsError::InvalidResponse(format!("Invalid error code: {line:?}")))
}

fn poll_error(channel: &mut LineChannel, syntax: Syntax) -> GcsResult<()> {
    channel.write(format!("{ERROR_QUERY}\n").as_bytes())?;
    let code = read_error_code(channel)?;
    raise_code(syntax, code)
}

fn raise_code(syntax: Syntax, code: i64) -> GcsResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(GcsError::Controller(ControllerError::from_code(syntax, code)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorInfo;
    use crate::gcsdata::BulkFailure;
    use crate::test_util::ScriptedTransport;

    fn messages(transport: ScriptedTransport) -> GcsMessages {
        let settings = ConnectionSettings {
            timeout_ms: 200,
            ..ConnectionSettings::default()
        };
        GcsMessages::new(Box::new(transport), settings).unwrap()
    }

    #[test]
    fn test_send_polls_error() {
        let transport = ScriptedTransport::new().expect_silence("MOV 1 2.5\n");
        let log = transport.log();
        let mut msgs = messages(transport);
        msgs.send("MOV 1 2.5\n").unwrap();
        assert_eq!(log.written(), ["MOV 1 2.5\n", "ERR?\n"]);
    }

    #[test]
    fn test_send_raises_controller_error() {
        let transport = ScriptedTransport::new().expect_error("MOV 1 999\n", 7);
        let mut msgs = messages(transport);
        let err = msgs.send("MOV 1 999").unwrap_err();
        assert!(err.is_controller_code(7));
        match err {
            GcsError::Controller(c) => assert!(c.message().contains("Position out of limits")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gcs21_error_translation() {
        let transport = ScriptedTransport::new().expect_error("MOV AXIS_1 1\n", 21448);
        let mut msgs = messages(transport);
        msgs.set_syntax(Syntax::Gcs21);
        let err = msgs.send("MOV AXIS_1 1").unwrap_err();
        assert!(err.to_string().contains("AXIS_DISABLED"));
    }

    #[test]
    fn test_embedded_error_single_transmission() {
        let transport = ScriptedTransport::new().expect_silence("SVO 1 1\n");
        let log = transport.log();
        let mut msgs = messages(transport);
        msgs.set_embederr(true);
        msgs.send("SVO 1 1").unwrap();
        assert_eq!(log.written(), ["SVO 1 1\n", "ERR?\n"]);
        assert!(log.is_done());
    }

    #[test]
    fn test_read_multiline_answer() {
        let transport = ScriptedTransport::new().expect("POS? 1 2\n", "1=0.5 \n2=1.25\n");
        let mut msgs = messages(transport);
        assert_eq!(msgs.read("POS? 1 2").unwrap(), "1=0.5 \n2=1.25\n");
    }

    #[test]
    fn test_errcheck_disabled_skips_poll() {
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect("POS?\n", "1=0\n");
        let log = transport.log();
        let mut msgs = messages(transport);
        msgs.with_errcheck(false, |m| m.read("POS?")).unwrap();
        assert!(msgs.errcheck());
        assert_eq!(log.written(), ["POS?\n"]);
    }

    #[test]
    fn test_read_block_nested() {
        let answer = "#Units: Unit\tDescription\nAXIS_1\tAxis\n#Sub: A\tB\n1\t2\n#END\n#END\n";
        let transport = ScriptedTransport::new().expect("USG? CMD\n", answer);
        let mut msgs = messages(transport);
        assert_eq!(msgs.read_block("USG? CMD").unwrap(), answer);
    }

    #[test]
    fn test_read_block_with_latin1_row() {
        let answer = "#Units: Unit\tDescription\nPos\u{b0}x\tAxis\n#END\n";
        let transport = ScriptedTransport::new().expect("USG? CMD\n", answer);
        let mut msgs = messages(transport);
        assert_eq!(msgs.read_block("USG? CMD").unwrap(), answer);
    }

    #[test]
    fn test_control_byte_has_no_error_check() {
        let transport = ScriptedTransport::new().auto_err(false).expect("\x05", "3\n");
        let mut msgs = messages(transport);
        assert_eq!(msgs.read_control(5).unwrap(), "3\n");
    }

    #[test]
    fn test_query_error_returns_code() {
        let transport = ScriptedTransport::new().expect("ERR?\n", "10\n");
        let mut msgs = messages(transport);
        assert_eq!(msgs.query_error().unwrap(), 10);
    }

    #[test]
    fn test_gcsdata_pump() {
        let header = "# TYPE = 1\n# SEPARATOR = 32\n# DIM = 2\n# NDATA = 3\n# END_HEADER\n";
        let rows = "1 10\n2 20\n3 30\n";
        let transport = ScriptedTransport::new()
            .expect("DRR? 1 3 1 2\n", &format!("{header}{rows}"))
            .with_read_delay(Duration::from_millis(5));
        let mut msgs = messages(transport);
        let header = msgs.read_gcsdata("DRR? 1 3 1 2", Some(3)).unwrap();
        assert_eq!(header.dim(), Some(2));

        let state = msgs.wait_bulk(Duration::from_secs(2)).unwrap();
        assert!(state.is_done());
        let data = msgs.buf_data().unwrap();
        assert_eq!(data.shape(), &[3, 2]);
        assert_eq!(data[[2, 1]], 30.0);

        // The connection is usable again after the pump.
        assert!(msgs.is_connected());
    }

    #[test]
    fn test_gcsdata_cancel_discards_buffer() {
        let header = "# DIM = 1\n# NDATA = 100\n# END_HEADER\n";
        let transport = ScriptedTransport::new()
            .expect("DRR? 1 100 1\n", &format!("{header}1\n2\n"))
            .with_read_delay(Duration::from_millis(5));
        let mut msgs = messages(transport);
        msgs.set_timeout(Duration::from_secs(5));
        msgs.read_gcsdata("DRR? 1 100 1", None).unwrap();
        msgs.canceller().cancel();
        let state = msgs.wait_bulk(Duration::from_secs(2)).unwrap();
        assert_eq!(state, BufState::Failed(BulkFailure::Cancelled));
        assert!(matches!(msgs.buf_data(), Err(GcsError::Cancelled)));
    }

    #[test]
    fn test_logfile_records_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcs.log");
        let transport = ScriptedTransport::new().expect("*IDN?\n", "PI,E-727,1,1.0\n");
        let mut msgs = messages(transport);
        msgs.set_logfile(Some(path.clone())).unwrap();
        msgs.read("*IDN?").unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "> *IDN?\n< PI,E-727,1,1.0\n");
    }

    #[test]
    fn test_logfile_poisoned_lock_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::open(&dir.path().join("gcs.log")).unwrap();
        let file = Arc::clone(&sink.file);
        let _ = std::thread::spawn(move || {
            let _guard = file.lock().unwrap();
            panic!("poison the log lock");
        })
        .join();
        sink.sent("MOV 1 2");
        assert!(sink.poisoned.load(Ordering::Relaxed));
        sink.received("0");
        assert!(sink.poisoned.load(Ordering::Relaxed));
    }

    #[test]
    fn test_close_then_autoreopen() {
        let transport = ScriptedTransport::new().expect("*IDN?\n", "x\n");
        let log = transport.log();
        let mut msgs = messages(transport);
        msgs.connect().unwrap();
        msgs.close().unwrap();
        assert!(!msgs.is_connected());
        msgs.read("*IDN?").unwrap();
        assert_eq!(log.open_count(), 2);
    }
}

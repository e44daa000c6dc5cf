//! Per-controller command state shared by both protocol layers.
//!
//! [`GcsCore`] owns the framing layer plus the lazily built caches of a
//! handle: the axis lists and the supported-command set. Command layers build
//! their request lines through the helpers here so argument formatting,
//! arity checks and answer parsing are done in one place.

use std::time::Duration;

use tracing::{debug, info};

use crate::blocks::parse_block_answer;
use crate::capabilities::Capabilities;
use crate::config::FloatFormat;
use crate::error::{ControllerError, GcsError, GcsResult, Syntax};
use crate::items::{join_pairs, parse_item_map, parse_item_values, IntoItemValues, IntoItems, ItemMap};
use crate::messages::GcsMessages;
use crate::registry::{self, ResponseShape};
use crate::values::{ToWire, Value, ValueKind};

/// Framing plus per-handle caches.
pub struct GcsCore {
    msgs: GcsMessages,
    axes: Option<Vec<String>>,
    allaxes: Option<Vec<String>>,
    capabilities: Option<Capabilities>,
    idn: Option<String>,
}

/// `wire` followed by `args` when there are any.
pub(crate) fn command_line(wire: &str, args: &str) -> String {
    let args = args.trim();
    if args.is_empty() {
        wire.to_string()
    } else {
        format!("{wire} {args}")
    }
}

impl GcsCore {
    pub fn new(msgs: GcsMessages) -> Self {
        Self {
            msgs,
            axes: None,
            allaxes: None,
            capabilities: None,
            idn: None,
        }
    }

    /// Framing layer.
    pub fn messages(&self) -> &GcsMessages {
        &self.msgs
    }

    /// Framing layer, mutable.
    pub fn messages_mut(&mut self) -> &mut GcsMessages {
        &mut self.msgs
    }

    /// Protocol variant the framing layer translates errors for.
    pub fn syntax(&self) -> Syntax {
        self.msgs.syntax()
    }

    /// Float formatting used for outbound arguments.
    pub fn float_format(&self) -> FloatFormat {
        self.msgs.settings().float_format.clone()
    }

    /// Format `value` for the wire.
    pub fn wire<V: ToWire + ?Sized>(&self, value: &V) -> String {
        value.to_wire(&self.msgs.settings().float_format)
    }

    /// Per-read timeout.
    pub fn timeout(&self) -> Duration {
        self.msgs.timeout()
    }

    /// Change the per-read timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.msgs.set_timeout(timeout);
    }

    // ==================== Raw exchange ====================

    /// Send a command without answer.
    pub fn send(&mut self, command: &str) -> GcsResult<()> {
        self.msgs.send(command)
    }

    /// Send a query and return the raw answer.
    pub fn read(&mut self, command: &str) -> GcsResult<String> {
        self.msgs.read(command)
    }

    /// Send a query answered by a block.
    pub fn read_block(&mut self, command: &str) -> GcsResult<String> {
        self.msgs.read_block(command)
    }

    /// Send `wire` followed by the listed items (`HLT 1 2`).
    pub fn send_items(&mut self, wire: &str, items: impl IntoItems) -> GcsResult<()> {
        let items = items.into_items();
        self.send(&command_line(wire, &items.join(" ")))
    }

    /// Send `wire` with interleaved item/value pairs (`MOV 1 2.5 2 3`).
    ///
    /// # Errors
    ///
    /// [`GcsError::ArityMismatch`] or [`GcsError::InvalidArgument`] before
    /// anything is written if the pairs are unbalanced or empty.
    pub fn set_items<V: ToWire>(&mut self, wire: &str, pairs: impl IntoItemValues<V>) -> GcsResult<()> {
        let (items, values) = pairs.into_item_values()?;
        if items.is_empty() {
            return Err(GcsError::InvalidArgument(format!("{wire} needs at least one item")));
        }
        let args = join_pairs(&items, &values, &self.msgs.settings().float_format);
        self.send(&command_line(wire, &args))
    }

    // ==================== Typed queries ====================

    /// Query `wire` for `items` and parse `item=value` lines.
    ///
    /// An empty item list asks for all items and keeps the controller's order.
    pub fn query(&mut self, wire: &str, items: impl IntoItems, kind: ValueKind) -> GcsResult<ItemMap> {
        let items = items.into_items();
        let answer = self.read(&command_line(wire, &items.join(" ")))?;
        parse_item_values(&answer, &items, kind)
    }

    fn query_as<T>(
        &mut self,
        wire: &str,
        items: impl IntoItems,
        kind: ValueKind,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> GcsResult<ItemMap<T>> {
        let items = items.into_items();
        let answer = self.read(&command_line(wire, &items.join(" ")))?;
        parse_item_map(&answer, &items, kind, convert)
    }

    /// [`query`](Self::query) with float values.
    pub fn query_f64(&mut self, wire: &str, items: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.query_as(wire, items, ValueKind::Float, Value::as_f64)
    }

    /// [`query`](Self::query) with `0`/`1` values.
    pub fn query_bool(&mut self, wire: &str, items: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.query_as(wire, items, ValueKind::Bool, Value::as_bool)
    }

    /// [`query`](Self::query) with integer values.
    pub fn query_i64(&mut self, wire: &str, items: impl IntoItems) -> GcsResult<ItemMap<i64>> {
        self.query_as(wire, items, ValueKind::Int, Value::as_i64)
    }

    /// [`query`](Self::query) with text values.
    pub fn query_str(&mut self, wire: &str, items: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.query_as(wire, items, ValueKind::Str, |v| v.as_str().map(str::to_string))
    }

    /// Query a free-text answer and trim it.
    pub fn query_text(&mut self, command: &str) -> GcsResult<String> {
        Ok(self.read(command)?.trim().to_string())
    }

    /// Send a control byte and return its trimmed answer.
    pub fn control(&mut self, byte: u8) -> GcsResult<String> {
        Ok(self.msgs.read_control(byte)?.trim().to_string())
    }

    // ==================== Stop handling ====================

    /// Send `command`, swallowing the "stopped by command" error if `noraise`.
    pub fn send_stop(&mut self, command: &str, noraise: bool) -> GcsResult<()> {
        match self.send(command) {
            Err(e) if noraise && e.is_stop() => {
                debug!("{command}: ignoring stop error");
                Ok(())
            }
            other => other,
        }
    }

    /// Send a reference move. The stop error raised by an aborted reference
    /// move is always swallowed.
    pub fn send_reference(&mut self, command: &str) -> GcsResult<()> {
        self.send_stop(command, true)
    }

    /// Poll `ERR?` after an unchecked control byte, swallowing a stop error if `noraise`.
    pub fn check_after_control(&mut self, noraise: bool) -> GcsResult<()> {
        if !self.msgs.errcheck() {
            return Ok(());
        }
        let code = self.msgs.query_error()?;
        if code == 0 {
            return Ok(());
        }
        let err = ControllerError::from_code(self.syntax(), code)?;
        if noraise && err.is_stop() {
            Ok(())
        } else {
            Err(GcsError::Controller(err))
        }
    }

    // ==================== Caches ====================

    /// Raw `*IDN?` answer, cached.
    pub fn idn(&mut self) -> GcsResult<String> {
        if let Some(idn) = &self.idn {
            return Ok(idn.clone());
        }
        let idn = self.query_text("*IDN?")?;
        self.idn = Some(idn.clone());
        Ok(idn)
    }

    /// Controller model from `*IDN?` (second comma-separated field).
    pub fn controller_name(&mut self) -> GcsResult<String> {
        let idn = self.idn()?;
        idn.split(',')
            .nth(1)
            .map(|name| name.trim().to_string())
            .ok_or_else(|| GcsError::InvalidResponse(format!("unexpected *IDN? answer {idn:?}")))
    }

    /// Supported commands, fetched on first use.
    pub fn capabilities(&mut self) -> GcsResult<&Capabilities> {
        if self.capabilities.is_none() {
            let caps = match self.syntax() {
                Syntax::Gcs21 => {
                    let answer = self.read_block("USG? CMD")?;
                    Capabilities::from_blocks(&parse_block_answer(&answer)?)
                }
                Syntax::Gcs2 => Capabilities::from_help(&self.read("HLP?")?),
            };
            debug!("Controller lists {} commands", caps.len());
            self.capabilities = Some(caps);
        }
        self.capabilities.as_ref().ok_or(GcsError::NotConnected)
    }

    /// True if the firmware implements the command behind `name` (`qDRL`, `MAC_BEG`).
    pub fn supports(&mut self, name: &str) -> GcsResult<bool> {
        if let Some(info) = registry::lookup(name) {
            if !info.available_for(self.syntax()) {
                return Ok(false);
            }
        }
        Ok(self.capabilities()?.supports(name))
    }

    /// Fail with [`GcsError::Unsupported`] unless `name` is supported.
    pub fn require(&mut self, name: &str) -> GcsResult<()> {
        if self.supports(name)? {
            Ok(())
        } else {
            Err(GcsError::Unsupported(name.to_string()))
        }
    }

    /// Enabled axes (`SAI?`), fetched on first use.
    pub fn axes(&mut self) -> GcsResult<Vec<String>> {
        if self.axes.is_none() {
            let answer = self.read("SAI?")?;
            self.axes = Some(answer.split_whitespace().map(str::to_string).collect());
        }
        Ok(self.axes.clone().unwrap_or_default())
    }

    /// All axes including disabled ones (`SAI? ALL`), fetched on first use.
    pub fn allaxes(&mut self) -> GcsResult<Vec<String>> {
        if self.allaxes.is_none() {
            let answer = self.read("SAI? ALL")?;
            self.allaxes = Some(answer.split_whitespace().map(str::to_string).collect());
        }
        Ok(self.allaxes.clone().unwrap_or_default())
    }

    /// Forget the axis lists after `CST`/`SAI`.
    pub fn invalidate_axes(&mut self) {
        self.axes = None;
        self.allaxes = None;
    }

    /// Forget the command set after a command level change.
    pub fn invalidate_capabilities(&mut self) {
        self.capabilities = None;
    }

    /// Forget everything learned from the controller, e.g. after `RBT`.
    pub fn reset_caches(&mut self) {
        info!("Clearing cached controller state");
        self.invalidate_axes();
        self.invalidate_capabilities();
        self.idn = None;
    }

    // ==================== Generic dispatch ====================

    /// Run a command by method name (`qPOS`) or wire form (`POS?`) with
    /// pre-formatted arguments and return its raw answer.
    ///
    /// Bulk data answers are collected completely and returned as the
    /// header followed by space-separated rows.
    pub fn call(&mut self, name: &str, args: &str) -> GcsResult<String> {
        let info = registry::lookup(name).ok_or_else(|| GcsError::Unsupported(name.to_string()))?;
        if let Some(byte) = info.control_byte() {
            return match info.shape {
                ResponseShape::None => self.msgs.send_control(byte).map(|_| String::new()),
                _ => self.msgs.read_control(byte),
            };
        }
        let line = command_line(info.wire, args);
        match info.shape {
            ResponseShape::None => self.send(&line).map(|_| String::new()),
            ResponseShape::Block => self.read_block(&line),
            ResponseShape::GcsData => {
                let header = self.msgs.read_gcsdata(&line, None)?;
                self.msgs.wait_bulk(self.timeout())?;
                let data = self.msgs.buf_data()?;
                let mut out: String = header
                    .entries()
                    .iter()
                    .map(|(k, v)| format!("# {k} = {v}\n"))
                    .collect();
                for row in data.rows() {
                    let row: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                    out.push_str(&row.join(" "));
                    out.push('\n');
                }
                Ok(out)
            }
            _ => self.read(&line),
        }
    }
}

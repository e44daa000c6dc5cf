//! GCS 2.1 data recorder (`REC_*`).
//!
//! Each recorder instance (`REC_1`, ...) owns numbered traces. A trace
//! samples one parameter address. The recorder moves through `CFG` (being
//! configured), `WAIT` (armed, waiting for its trigger) and `RUN`.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};

use super::{Gcs21Commands, ParamAddress};
use crate::core::command_line;
use crate::error::{GcsError, GcsResult};
use crate::gcsdata::GcsDataHeader;
use crate::items::{split_answer, ItemMap};
use crate::values::{format_hex, parse_int};

/// State reported by `REC_STATE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum RecState {
    #[strum(serialize = "CFG")]
    Configuration,
    #[strum(serialize = "WAIT")]
    Waiting,
    #[strum(serialize = "RUN")]
    Running,
}

/// Trigger of a recorder: a mode word and its options (`IMM`, or `POS
/// AXIS_1 ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecTrigger {
    pub mode: String,
    pub options: Vec<String>,
}

impl RecTrigger {
    /// Start recording as soon as `REC_START` is received.
    pub fn immediate() -> Self {
        Self {
            mode: "IMM".to_string(),
            options: Vec::new(),
        }
    }

    pub fn new(mode: impl Into<String>, options: &[&str]) -> Self {
        Self {
            mode: mode.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl fmt::Display for RecTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mode)?;
        for option in &self.options {
            write!(f, " {option}")?;
        }
        Ok(())
    }
}

impl FromStr for RecTrigger {
    type Err = GcsError;

    fn from_str(s: &str) -> GcsResult<Self> {
        let mut parts = s.split_whitespace();
        let mode = parts
            .next()
            .ok_or_else(|| GcsError::InvalidResponse("empty recorder trigger".to_string()))?;
        Ok(Self {
            mode: mode.to_string(),
            options: parts.map(str::to_string).collect(),
        })
    }
}

fn single_value<'a>(values: &'a ItemMap<String>, recorder: &str) -> GcsResult<&'a str> {
    values
        .get(recorder)
        .map(|v| v.trim())
        .ok_or_else(|| GcsError::InvalidResponse(format!("no answer for {recorder}")))
}

impl Gcs21Commands {
    /// `REC_TRACE`: let `trace` of `recorder` sample the parameter at
    /// `source`, which needs container, function and id.
    pub fn rec_trace(&mut self, recorder: &str, trace: u32, source: &ParamAddress) -> GcsResult<()> {
        let (Some(container), Some(function), Some(id)) =
            (&source.container, &source.function, source.id)
        else {
            return Err(GcsError::InvalidArgument(format!(
                "REC_TRACE needs a complete address, got {source}"
            )));
        };
        self.core.send(&format!(
            "REC_TRACE {recorder} {trace} {container} {function} {}",
            format_hex(id)
        ))
    }

    /// `REC_TRACE?`: sampled source per trace of `recorder`, as
    /// `container function id`. Unused traces answer `0`.
    pub fn qrec_trace(&mut self, recorder: &str, traces: &[u32]) -> GcsResult<ItemMap<String>> {
        let traces: Vec<String> = traces.iter().map(u32::to_string).collect();
        let answer = self
            .core
            .read(&command_line(&format!("REC_TRACE? {recorder}"), &traces.join(" ")))?;
        Ok(split_answer(&answer)
            .into_iter()
            .map(|line| (line.keys.last().cloned().unwrap_or_default(), line.value))
            .collect())
    }

    /// `REC_TRG`
    pub fn rec_trg(&mut self, recorder: &str, trigger: &RecTrigger) -> GcsResult<()> {
        self.core.send(&format!("REC_TRG {recorder} {trigger}"))
    }

    /// `REC_TRG?`
    pub fn qrec_trg(&mut self, recorder: &str) -> GcsResult<RecTrigger> {
        let values = self.core.query_str("REC_TRG?", recorder)?;
        single_value(&values, recorder)?.parse()
    }

    /// `REC_RATE`: record every `rate`-th servo cycle.
    pub fn rec_rate(&mut self, recorder: &str, rate: u32) -> GcsResult<()> {
        self.core.send(&format!("REC_RATE {recorder} {}", rate.max(1)))
    }

    /// `REC_RATE?`
    pub fn qrec_rate(&mut self, recorder: &str) -> GcsResult<u32> {
        let values = self.core.query_str("REC_RATE?", recorder)?;
        let rate = parse_int(single_value(&values, recorder)?)?;
        u32::try_from(rate).map_err(|_| GcsError::InvalidResponse(format!("record rate {rate}")))
    }

    /// `REC_START`: arm `recorder`; it runs once its trigger fires.
    pub fn rec_start(&mut self, recorder: &str) -> GcsResult<()> {
        self.core.send(&format!("REC_START {recorder}"))
    }

    /// `REC_STOP`
    pub fn rec_stop(&mut self, recorder: &str) -> GcsResult<()> {
        self.core.send(&format!("REC_STOP {recorder}"))
    }

    /// `REC_STATE?`
    pub fn qrec_state(&mut self, recorder: &str) -> GcsResult<RecState> {
        let values = self.core.query_str("REC_STATE?", recorder)?;
        let state = single_value(&values, recorder)?;
        state
            .parse()
            .map_err(|_| GcsError::InvalidResponse(format!("recorder state {state:?}")))
    }

    /// `REC_DAT?`: start reading `count` points from `offset` of `traces`
    /// into the bulk buffer. No traces means all configured ones.
    pub fn qrec_dat(
        &mut self,
        recorder: &str,
        offset: u32,
        count: usize,
        traces: &[u32],
    ) -> GcsResult<GcsDataHeader> {
        let traces: Vec<String> = traces.iter().map(u32::to_string).collect();
        let command = command_line(
            &format!("REC_DAT? {recorder} ASCII {offset} {count}"),
            &traces.join(" "),
        );
        self.core.messages_mut().read_gcsdata(&command, Some(count))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::tests::gcs21;
    use super::*;
    use crate::commands::GcsCommands;
    use crate::schema::MemoryType;
    use crate::test_util::ScriptedTransport;

    #[test]
    fn test_configure_and_run() {
        let transport = ScriptedTransport::new()
            .expect_silence("REC_TRACE REC_1 1 AXIS_1 - 0x102\n")
            .expect_silence("REC_TRG REC_1 IMM\n")
            .expect_silence("REC_RATE REC_1 10\n")
            .expect("REC_RATE? REC_1\n", "REC_1=10\n")
            .expect_silence("REC_START REC_1\n")
            .expect("REC_STATE? REC_1\n", "REC_1=RUN\n")
            .expect("REC_TRG? REC_1\n", "REC_1=IMM\n");
        let mut dev = gcs21(transport);
        let source = ParamAddress::new(MemoryType::RAM)
            .unit("AXIS_1")
            .function("-")
            .param(0x102);
        dev.rec_trace("REC_1", 1, &source).unwrap();
        dev.rec_trg("REC_1", &RecTrigger::immediate()).unwrap();
        dev.rec_rate("REC_1", 10).unwrap();
        assert_eq!(dev.qrec_rate("REC_1").unwrap(), 10);
        dev.rec_start("REC_1").unwrap();
        assert_eq!(dev.qrec_state("REC_1").unwrap(), RecState::Running);
        assert_eq!(dev.qrec_trg("REC_1").unwrap(), RecTrigger::immediate());
    }

    #[test]
    fn test_qrec_trace_and_unknown_state() {
        let transport = ScriptedTransport::new()
            .expect("REC_TRACE? REC_1 1 2\n", "REC_1 1=AXIS_1 - 0x102 \nREC_1 2=0\n")
            .expect("REC_STATE? REC_1\n", "REC_1=BUSY\n");
        let mut dev = gcs21(transport);
        let traces = dev.qrec_trace("REC_1", &[1, 2]).unwrap();
        assert_eq!(traces["1"], "AXIS_1 - 0x102");
        assert_eq!(traces["2"], "0");
        assert!(dev.qrec_state("REC_1").is_err());
    }

    #[test]
    fn test_qrec_dat_fills_bulk_buffer() {
        let header = "# TYPE = 1 \n# SEPARATOR = 32 \n# DIM = 1 \n# NDATA = 3 \n# NAME0 = AXIS_1 - 0x102 \n# END_HEADER \n";
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect(
                "REC_DAT? REC_1 ASCII 1 3 1\n",
                &format!("{header}0.5 \n0.6 \n0.7\n"),
            )
            .expect("ERR?\n", "0\n");
        let mut dev = gcs21(transport);
        dev.qrec_dat("REC_1", 1, 3, &[1]).unwrap();
        assert!(dev.wait_bulk(Duration::from_secs(1)).unwrap().is_done());
        let data = dev.buf_data().unwrap();
        assert_eq!(data.shape(), [3, 1]);
        assert_eq!(data[[2, 0]], 0.7);
    }
}

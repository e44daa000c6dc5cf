//! Data recorder commands of GCS 2.0 controllers.
//!
//! Each record table samples one signal ([`RecordOption`]) of one source
//! item. Recording starts on the configured [`TriggerSource`]. Tables are
//! read back with `DRR?` as bulk data through the handle's pump.

use strum::{EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};
use tracing::warn;

use super::Gcs2Commands;
use crate::core::command_line;
use crate::error::{GcsError, GcsResult};
use crate::gcsdata::GcsDataHeader;
use crate::items::ItemMap;
use crate::values::parse_int;

/// Signal recorded by a table (`DRC` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RecordOption {
    Nothing = 0,
    CommandedPosition = 1,
    ActualPosition = 2,
    PositionError = 3,
    PioValue = 4,
    DioValue = 5,
    ComediValue = 6,
    PiezoVoltage = 7,
    Timestamp = 8,
    Index = 9,
    Ticks = 10,
    DdlOutput = 13,
    OpenloopInput = 14,
    PidOutput = 15,
    AnalogOutput = 16,
    SensorNormalized = 17,
    SensorFiltered = 18,
    SensorElecLin = 19,
    SensorMechLin = 20,
    TargetSlewrateLim = 22,
    TargetVelocity = 23,
    TargetAcceleration = 24,
    TargetJerk = 25,
    DiValue = 26,
    DoValue = 27,
    CtvTargetValue = 28,
    CcvControlValue = 29,
    CavActualValue = 30,
    CcvCurrentValue = 31,
    DriftCompOffset = 32,
    HybridMotorVoltage = 33,
    HybridPiezoVoltage = 34,
    SystemTime = 44,
    CommandedVelocity = 70,
    CommandedAcceleration = 71,
    ActualVelocity = 72,
    MotorOutput = 73,
    KpOfAxis = 74,
    KiOfAxis = 75,
    KdOfAxis = 76,
    SignalStatusRegister = 80,
    AnalogInput = 81,
    ActiveParameterset = 90,
    ActualFrequency = 91,
    P0 = 92,
    Dia = 93,
    CurrentPhaseA = 100,
    CurrentPhaseB = 101,
    CurrentPhaseC = 102,
    CurrentPhaseD = 103,
    FieldOrientedControlUd = 105,
    FieldOrientedControlUq = 106,
    FieldOrientedControlId = 107,
    FieldOrientedControlIq = 108,
    FieldOrientedControlUAlpha = 109,
    FieldOrientedControlUBeta = 110,
    FieldOrientedControlVPhase = 111,
    FieldOrientedControlAngle = 112,
    FieldOrientedControlAngleFromPos = 113,
    FieldOrientedControlErrorD = 114,
    FieldOrientedControlErrorQ = 115,
    PositionControlOut = 120,
    VelocityControlOut = 121,
    PilotControlOut = 122,
    AccelerationControlOut = 123,
    LowPassFilteredVelocity = 140,
    AnalogInValue = 141,
    LowPassFilteredVelocityError = 142,
    ActualAcceleration = 143,
    LowPassFilteredAccelerationError = 144,
    Tw8SineRegister = 145,
    Tw8CosineRegister = 146,
    FastAlignmentInputChannel = 150,
    FastAlignmentProcessRegister = 151,
    FastAlignmentGsResultRoutine = 152,
    FastAlignmentGsWeightRoutine = 153,
    FastAlignmentGsAmplitudeRoutine = 154,
    FastAlignmentFinishedFlag = 155,
    FastAlignmentGradientScanPhaseRoutine = 156,
}

/// Event that starts recording (`DRT` source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TriggerSource {
    Default = 0,
    PositionChangingCommand = 1,
    NextCommandWithReset = 2,
    ExternalTrigger = 3,
    TriggerImmediately = 4,
    DioChannel = 5,
    PosChangingWithReset = 6,
    SmoCommandWithReset = 7,
    ComediChannel = 8,
    WaveGenerator = 9,
}

/// True if `abbrev` starts like `word` and its remaining characters occur in
/// `word` in order (`ACT` for `ACTUAL`).
fn is_abbreviation(abbrev: &str, word: &str) -> bool {
    let mut abbrev = abbrev.chars();
    let mut word = word.chars();
    match (abbrev.next(), word.next()) {
        (None, _) => return true,
        (Some(_), None) => return false,
        (Some(a), Some(w)) if a != w => return false,
        _ => {}
    }
    abbrev.all(|a| word.any(|w| w == a))
}

/// Find the variant whose `_`-separated name parts are abbreviated by the
/// parts of `name`. Candidates are tried in alphabetical order.
fn find_abbreviated<T>(name: &str) -> Option<T>
where
    T: IntoEnumIterator + Into<&'static str> + Copy,
{
    let wanted: Vec<String> = name.split('_').map(str::to_ascii_uppercase).collect();
    let mut candidates: Vec<(&'static str, T)> = T::iter().map(|v| (v.into(), v)).collect();
    candidates.sort_by_key(|(n, _)| *n);
    candidates
        .into_iter()
        .find(|(candidate, _)| {
            candidate
                .split('_')
                .enumerate()
                .filter(|(_, part)| !part.chars().all(|c| c.is_ascii_digit()))
                .all(|(i, part)| wanted.get(i).map_or(true, |w| is_abbreviation(w, part)))
        })
        .map(|(_, v)| v)
}

impl RecordOption {
    /// Wire value.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Option by wire value.
    pub fn from_id(id: i64) -> Option<Self> {
        u8::try_from(id).ok().and_then(Self::from_repr)
    }

    /// Option by possibly abbreviated name, case insensitive: `ACT_POS`
    /// gives [`ActualPosition`](Self::ActualPosition).
    pub fn from_abbreviation(name: &str) -> GcsResult<Self> {
        find_abbreviated(name)
            .ok_or_else(|| GcsError::InvalidArgument(format!("unknown record option {name:?}")))
    }
}

impl TriggerSource {
    /// Wire value.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: i64) -> Option<Self> {
        u8::try_from(id).ok().and_then(Self::from_repr)
    }

    /// Source by possibly abbreviated name: `NEXT_CMD` gives
    /// [`NextCommandWithReset`](Self::NextCommandWithReset).
    pub fn from_abbreviation(name: &str) -> GcsResult<Self> {
        find_abbreviated(name)
            .ok_or_else(|| GcsError::InvalidArgument(format!("unknown trigger source {name:?}")))
    }
}

/// Record and trigger options listed by `HDR?`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HdrOptions {
    /// Supported record option ids
    pub record_options: Vec<i64>,
    /// Supported trigger source ids
    pub trigger_options: Vec<i64>,
    /// Lines of the "Additional information" section
    pub additional_info: Vec<String>,
}

impl HdrOptions {
    /// Parse an `HDR?` answer. Option lines look like `2=Actual position`.
    pub fn parse(answer: &str) -> Self {
        #[derive(PartialEq)]
        enum Section {
            None,
            Record,
            Trigger,
            Info,
        }
        let mut options = Self::default();
        let mut section = Section::None;
        for line in answer.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.starts_with('#') {
                section = if line.starts_with("#RecordOptions") {
                    Section::Record
                } else if line.starts_with("#TriggerOptions") {
                    Section::Trigger
                } else if line.starts_with("#Additional information") {
                    Section::Info
                } else {
                    Section::None
                };
                continue;
            }
            match section {
                Section::None => {}
                Section::Info => options.additional_info.push(line.to_string()),
                Section::Record | Section::Trigger => {
                    let key = line.split('=').next().unwrap_or_default().trim();
                    match parse_int(key) {
                        Ok(id) if section == Section::Record => options.record_options.push(id),
                        Ok(id) => options.trigger_options.push(id),
                        Err(_) => warn!("Could not parse HDR? line {line:?}"),
                    }
                }
            }
        }
        options
    }

    /// Points per table announced by an additional info line such as
    /// `8192 datapoints per table`.
    pub fn datapoints_per_table(&self) -> Option<usize> {
        self.additional_info
            .iter()
            .find(|line| line.contains("datapoints per table"))
            .and_then(|line| line.split_whitespace().next())
            .and_then(|token| token.parse().ok())
    }
}

impl Gcs2Commands {
    /// `DRC`: record `option` of `source` into `table`.
    pub fn drc(&mut self, table: u32, source: &str, option: RecordOption) -> GcsResult<()> {
        self.core
            .send(&format!("DRC {table} {source} {}", option.id()))
    }

    /// `DRC?`: `(source, option)` per table.
    pub fn qdrc(&mut self, tables: &[u32]) -> GcsResult<ItemMap<(String, i64)>> {
        let tables: Vec<String> = tables.iter().map(u32::to_string).collect();
        self.core
            .query_str("DRC?", tables)?
            .into_iter()
            .map(|(table, text)| {
                let mut fields = text.split_whitespace();
                match (fields.next(), fields.next()) {
                    (Some(source), Some(option)) => {
                        Ok((table, (source.to_string(), parse_int(option)?)))
                    }
                    _ => Err(GcsError::InvalidResponse(format!("DRC? answered {text:?}"))),
                }
            })
            .collect()
    }

    /// `DRT`: trigger source of `table`; table 0 addresses all tables.
    pub fn drt(&mut self, table: u32, source: TriggerSource, value: Option<&str>) -> GcsResult<()> {
        let args = format!("{table} {} {}", source.id(), value.unwrap_or("0"));
        self.core.send(&command_line("DRT", &args))
    }

    /// `DRT?`: trigger source id per table.
    pub fn qdrt(&mut self, tables: &[u32]) -> GcsResult<ItemMap<i64>> {
        let tables: Vec<String> = tables.iter().map(u32::to_string).collect();
        self.core
            .query_str("DRT?", tables)?
            .into_iter()
            .map(|(table, text)| {
                let source = text.split_whitespace().next().unwrap_or_default();
                Ok((table, parse_int(source)?))
            })
            .collect()
    }

    /// `DRR?`: start reading `count` points per table from `offset` (1
    /// based). Returns the header; rows arrive through the bulk pump.
    pub fn qdrr(&mut self, tables: &[u32], offset: u32, count: usize) -> GcsResult<GcsDataHeader> {
        let tables: Vec<String> = tables.iter().map(u32::to_string).collect();
        let command = command_line(&format!("DRR? {offset} {count}"), &tables.join(" "));
        self.core.messages_mut().read_gcsdata(&command, Some(count))
    }

    /// `DRL?`: points recorded so far per table.
    pub fn qdrl(&mut self, tables: &[u32]) -> GcsResult<ItemMap<i64>> {
        let tables: Vec<String> = tables.iter().map(u32::to_string).collect();
        self.core.query_i64("DRL?", tables)
    }

    /// `RTR`: record one point every `rate` servo cycles.
    pub fn rtr(&mut self, rate: u32) -> GcsResult<()> {
        self.core.send(&format!("RTR {rate}"))
    }

    /// `RTR?`
    pub fn qrtr(&mut self) -> GcsResult<i64> {
        parse_int(&self.core.query_text("RTR?")?)
    }

    /// `HDR?`: raw recorder help.
    pub fn qhdr(&mut self) -> GcsResult<String> {
        self.core.read("HDR?")
    }

    /// Options listed by `HDR?`.
    pub fn hdr_options(&mut self) -> GcsResult<HdrOptions> {
        Ok(HdrOptions::parse(&self.qhdr()?))
    }

    /// `TNR?`: number of record tables.
    pub fn qtnr(&mut self) -> GcsResult<i64> {
        parse_int(&self.core.query_text("TNR?")?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::gcs2;
    use super::*;
    use crate::commands::GcsCommands;
    use crate::test_util::ScriptedTransport;
    use std::time::Duration;

    #[test]
    fn test_abbreviation() {
        assert!(is_abbreviation("ACT", "ACTUAL"));
        assert!(is_abbreviation("POS", "POSITION"));
        assert!(is_abbreviation("", "POSITION"));
        assert!(!is_abbreviation("XPOS", "POSITION"));
        assert!(!is_abbreviation("POSX", "POSITION"));
    }

    #[test]
    fn test_record_option_lookup() {
        assert_eq!(RecordOption::from_abbreviation("ACT_POS").unwrap(), RecordOption::ActualPosition);
        assert_eq!(RecordOption::from_abbreviation("com_pos").unwrap(), RecordOption::CommandedPosition);
        assert_eq!(RecordOption::from_abbreviation("POS_ERR").unwrap(), RecordOption::PositionError);
        assert!(RecordOption::from_abbreviation("XYZ").is_err());
        assert_eq!(RecordOption::from_id(156), Some(RecordOption::FastAlignmentGradientScanPhaseRoutine));
        assert_eq!(RecordOption::from_id(11), None);
        assert_eq!(<&str>::from(RecordOption::Tw8SineRegister), "TW8_SINE_REGISTER");
    }

    #[test]
    fn test_trigger_source_lookup() {
        assert_eq!(TriggerSource::from_abbreviation("NEXT_CMD").unwrap(), TriggerSource::NextCommandWithReset);
        assert_eq!(TriggerSource::from_abbreviation("EXT").unwrap(), TriggerSource::ExternalTrigger);
        assert_eq!(TriggerSource::from_id(9), Some(TriggerSource::WaveGenerator));
    }

    #[test]
    fn test_hdr_options() {
        let answer = "#RecordOptions \n\
0=Nothing is recorded \n\
1=Commanded Position of Axis \n\
2=Real Position of Axis \n\
#TriggerOptions \n\
0=Default setting \n\
1=Any command changing position \n\
#Parameters to be set with SPA \n\
0x16000000=Data Record Table Rate \n\
#Additional information \n\
8 datarecorder tables \n\
8192 datapoints per table \n\
end of help\n";
        let options = HdrOptions::parse(answer);
        assert_eq!(options.record_options, [0, 1, 2]);
        assert_eq!(options.trigger_options, [0, 1]);
        assert_eq!(options.additional_info.len(), 3);
        assert_eq!(options.datapoints_per_table(), Some(8192));
    }

    #[test]
    fn test_recorder_commands() {
        let transport = ScriptedTransport::new()
            .expect_silence("DRC 1 X 2\n")
            .expect_silence("DRT 0 2 0\n")
            .expect("DRC? 1\n", "1=X 2\n")
            .expect("DRL? 1 2\n", "1=100 \n2=100\n")
            .expect_silence("RTR 10\n")
            .expect("RTR?\n", "10\n");
        let mut dev = gcs2(transport);
        dev.drc(1, "X", RecordOption::ActualPosition).unwrap();
        dev.drt(0, TriggerSource::NextCommandWithReset, None).unwrap();
        assert_eq!(dev.qdrc(&[1]).unwrap()["1"], ("X".to_string(), 2));
        let points = dev.qdrl(&[1, 2]).unwrap();
        assert_eq!(points["2"], 100);
        dev.rtr(10).unwrap();
        assert_eq!(dev.qrtr().unwrap(), 10);
    }

    #[test]
    fn test_qdrr_two_tables() {
        let header = "# TYPE = 1 \n# SEPARATOR = 32 \n# DIM = 2 \n# NDATA = 2 \n# NAME0 = Actual Position of axis X \n# NAME1 = Commanded Position of axis X \n# END_HEADER \n";
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect("DRR? 1 2 1 2\n", &format!("{header}0.1 0.0 \n0.2 0.3\n"))
            .expect("ERR?\n", "0\n");
        let mut dev = gcs2(transport);
        let header = dev.qdrr(&[1, 2], 1, 2).unwrap();
        assert_eq!(header.names().len(), 2);
        assert!(dev.wait_bulk(Duration::from_secs(1)).unwrap().is_done());
        let data = dev.buf_data().unwrap();
        assert_eq!(data.shape(), [2, 2]);
        assert_eq!(data[[1, 1]], 0.3);
    }
}

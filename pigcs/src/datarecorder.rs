//! Data recorder orchestration for GCS 2.0 controllers.
//!
//! [`DataRecorder`] wraps the `DRC`/`DRT`/`RTR`/`DRL?`/`DRR?` commands of a
//! [`Gcs2Commands`] handle. Sample rate, sample time, sample frequency and
//! record time are derived from each other through the servo cycle time and
//! the number of points per table.
//!
//! Servo cycle time and table size are read from parameters where the
//! controller provides them. Known models fall back to built-in tables; a
//! warning is logged whenever a table value is used.
//!
//! # Example
//!
//! ```no_run
//! use pigcs::datarecorder::{DataRecorder, PerTable};
//! use pigcs::gcs2::RecordOption;
//! use pigcs::{ConnectionSettings, GcsCommands, GcsDevice, Interface};
//!
//! let interface = Interface::TcpIp { host: "192.168.15.210".into(), port: 50000 };
//! let mut device = GcsDevice::open(&interface, ConnectionSettings::default())?;
//! let mut recorder = DataRecorder::new(device.as_gcs2()?);
//! recorder.set_options(PerTable::Each(vec![
//!     RecordOption::ActualPosition,
//!     RecordOption::CommandedPosition,
//! ]));
//! recorder.set_sample_time(0.001)?;
//! recorder.arm()?;
//! recorder.gcs().mov(("X", 10.0))?;
//! let (_header, data) = recorder.get_data(None, None, None)?;
//! println!("{} points per table", data.nrows());
//! # Ok::<(), pigcs::GcsError>(())
//! ```

use std::thread;
use std::time::{Duration, Instant};

use ndarray::Array2;
use tracing::{debug, warn};

use crate::commands::GcsCommands;
use crate::error::{GcsError, GcsResult};
use crate::gcs2::{Gcs2Commands, HdrOptions, RecordOption, TriggerSource};
use crate::gcsdata::{BufState, GcsDataHeader};
use crate::values::Value;

/// `SERVO_UPDATE_TIME` in seconds.
pub const PARAM_SERVO_UPDATE_TIME: u32 = 0x0E00_0200;
/// `DATA_REC_SET_POINTS`
pub const PARAM_DATA_REC_SET_POINTS: u32 = 0x1600_0201;
/// `DATA_REC_MAX_POINTS`, shared by all tables.
pub const PARAM_DATA_REC_MAX_POINTS: u32 = 0x1600_0200;
/// `DATA_REC_CHAN_NUMBER`
pub const PARAM_DATA_REC_CHAN_NUMBER: u32 = 0x1600_0300;
/// `RECORDCYCLES_PER_TRIGGER`
pub const PARAM_RECORD_CYCLES_PER_TRIGGER: u32 = 0x1600_0001;

/// Placeholder stored when `HDR?` has no additional information section.
pub const HDR_ADDITIONAL_INFO_NOT_AVAILABLE: &str = "No additional info available";

/// Parameters are read from this item.
const PARAM_ITEM: &str = "1";

/// Models whose parameters report a wrong value; their table entry wins.
const TABLE_ONLY_MODELS: &[&str] = &["C-702.00"];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Servo cycle time in seconds per model.
const SERVO_TIMES: &[(&str, f64)] = &[
    ("C-663.11", 50e-6),
    ("C-663.12", 50e-6),
    ("C-702.00", 100e-6),
    ("C-843", 410e-6),
    ("C-863.11", 50e-6),
    ("C-863.12", 50e-6),
    ("C-867.160", 50e-6),
    ("C-867.260", 50e-6),
    ("C-867.262", 50e-6),
    ("C-867.B0017", 100e-6),
    ("C-867.B0019", 100e-6),
    ("C-867.B024", 100e-6),
    ("C-867.OE", 50e-6),
    ("C-877", 100e-6),
    ("C-880", 4096e-6),
    ("C-884.4D", 50e-6),
    ("C-884.4DB", 50e-6),
    ("C-887", 100e-6),
    ("E-710", 200e-6),
    ("E-755", 200e-6),
    ("E-861", 50e-6),
    ("E-861.11C885", 50e-6),
    ("E-871.1A1", 50e-6),
    ("E-871.1A1N", 50e-6),
    ("E-873", 50e-6),
    ("E-873.1A1", 50e-6),
    ("E-873.3QTU", 50e-6),
    ("E-873.10C885", 50e-6),
];

/// Points per record table per model.
const MAX_NUM_VALUES: &[(&str, usize)] = &[
    ("C-663.10C885", 1024),
    ("C-663.11", 1024),
    ("C-663.12", 1024),
    ("C-702.00", 262_144),
    ("C-863.11", 1024),
    ("C-863.12", 1024),
    ("C-867.160", 8192),
    ("C-867.1U", 8192),
    ("C-867.260", 8192),
    ("C-867.262", 8192),
    ("C-867.2U", 8192),
    ("C-867.2U2", 8192),
    ("C-867.B0017", 8192),
    ("C-867.B0019", 8192),
    ("C-867.B024", 8192),
    ("C-867.OE", 1024),
    ("C-877", 1024),
    ("C-877.1U11", 1024),
    ("C-877.2U12", 1024),
    ("C-884.4D", 8192),
    ("C-884.4DB", 8192),
    ("E-761", 8192),
    ("E-861", 1024),
    ("E-861.11C885", 1024),
    ("E-871.1A1", 1024),
    ("E-871.1A1N", 1024),
    ("E-873", 1024),
    ("E-873.1A1", 1024),
    ("E-873.3QTU", 8192),
    ("E-873.10C885", 8192),
];

fn table_value<T: Copy>(table: &[(&str, T)], model: &str) -> Option<T> {
    table.iter().find(|(m, _)| *m == model).map(|(_, v)| *v)
}

/// A parameter value that is set and nonzero.
fn positive(value: Option<Value>) -> Option<f64> {
    value.and_then(|v| v.as_f64()).filter(|v| *v > 0.0)
}

/// Servo cycle time in seconds: parameter `0x0E000200`, then the model
/// table if `use_preset`.
pub fn servo_time(gcs: &mut Gcs2Commands, use_preset: bool) -> GcsResult<f64> {
    let model = gcs.core().controller_name()?;
    if TABLE_ONLY_MODELS.contains(&model.as_str()) {
        if let Some(time) = table_value(SERVO_TIMES, &model) {
            return Ok(time);
        }
    }
    if let Some(time) = positive(gcs.get_param(PARAM_ITEM, PARAM_SERVO_UPDATE_TIME)?) {
        return Ok(time);
    }
    if use_preset {
        if let Some(time) = table_value(SERVO_TIMES, &model) {
            warn!("{model} does not report its servo cycle time, using {time} s from the model table");
            return Ok(time);
        }
    }
    Err(GcsError::Unsupported(format!("servo cycle time of {model} is unknown")))
}

/// Points per record table.
///
/// Tried in order: `DATA_REC_SET_POINTS`, `DATA_REC_MAX_POINTS` divided by
/// `DATA_REC_CHAN_NUMBER` or by `TNR?`, `RECORDCYCLES_PER_TRIGGER`, the
/// "datapoints per table" line of `HDR?`, the model table.
pub fn max_num_values(
    gcs: &mut Gcs2Commands,
    use_preset: bool,
    hdr: Option<&HdrOptions>,
) -> GcsResult<usize> {
    let model = gcs.core().controller_name()?;
    if TABLE_ONLY_MODELS.contains(&model.as_str()) {
        if let Some(points) = table_value(MAX_NUM_VALUES, &model) {
            return Ok(points);
        }
    }
    if let Some(points) = positive(gcs.get_param(PARAM_ITEM, PARAM_DATA_REC_SET_POINTS)?) {
        return Ok(points as usize);
    }
    if let Some(max_points) = positive(gcs.get_param(PARAM_ITEM, PARAM_DATA_REC_MAX_POINTS)?) {
        if let Some(tables) = positive(gcs.get_param(PARAM_ITEM, PARAM_DATA_REC_CHAN_NUMBER)?) {
            return Ok((max_points / tables) as usize);
        }
        let tables = gcs.qtnr()?;
        if tables > 0 {
            return Ok(max_points as usize / tables as usize);
        }
    }
    if let Some(points) = positive(gcs.get_param(PARAM_ITEM, PARAM_RECORD_CYCLES_PER_TRIGGER)?) {
        return Ok(points as usize);
    }
    let fetched;
    let hdr = match hdr {
        Some(hdr) if !hdr.additional_info.is_empty() => Some(hdr),
        _ if gcs.supports("qHDR")? => {
            fetched = gcs.hdr_options()?;
            Some(&fetched)
        }
        _ => None,
    };
    if let Some(points) = hdr.and_then(HdrOptions::datapoints_per_table) {
        return Ok(points);
    }
    if use_preset {
        if let Some(points) = table_value(MAX_NUM_VALUES, &model) {
            warn!("{model} does not report its record table size, using {points} from the model table");
            return Ok(points);
        }
    }
    Err(GcsError::Unsupported(format!(
        "maximum number of data recorder values of {model} is unknown"
    )))
}

/// One setting for every record table, or one per table.
#[derive(Debug, Clone, PartialEq)]
pub enum PerTable<T> {
    /// Applies to all tables.
    Same(T),
    /// The i-th entry belongs to table i + 1. Its length sets the number of
    /// tables.
    Each(Vec<T>),
}

impl<T: Clone> PerTable<T> {
    fn table_count(&self) -> Option<usize> {
        match self {
            PerTable::Same(_) => None,
            PerTable::Each(values) => Some(values.len()),
        }
    }

    fn resolve(&self, tables: usize) -> GcsResult<Vec<T>> {
        match self {
            PerTable::Same(value) => Ok(vec![value.clone(); tables]),
            PerTable::Each(values) if values.len() == tables => Ok(values.clone()),
            PerTable::Each(values) if values.len() == 1 => Ok(vec![values[0].clone(); tables]),
            PerTable::Each(values) => Err(GcsError::ArityMismatch {
                items: tables,
                values: values.len(),
            }),
        }
    }
}

/// Set up and read the data recorder of a GCS 2.0 controller.
pub struct DataRecorder<'a> {
    gcs: &'a mut Gcs2Commands,
    servo_time: Option<f64>,
    num_values: Option<usize>,
    offset: Option<u32>,
    max_num_values: Option<usize>,
    sample_rate: Option<u32>,
    sources: Option<PerTable<String>>,
    options: Option<PerTable<RecordOption>>,
    triggers: Option<PerTable<TriggerSource>>,
    hdr: Option<HdrOptions>,
    header: Option<GcsDataHeader>,
    data: Option<Array2<f64>>,
    read_timeout: Duration,
}

impl<'a> DataRecorder<'a> {
    pub fn new(gcs: &'a mut Gcs2Commands) -> Self {
        debug!("Creating data recorder");
        let read_timeout = gcs.core_ref().timeout() * 10;
        Self {
            gcs,
            servo_time: None,
            num_values: None,
            offset: None,
            max_num_values: None,
            sample_rate: None,
            sources: None,
            options: None,
            triggers: None,
            hdr: None,
            header: None,
            data: None,
            read_timeout,
        }
    }

    /// The wrapped command handle.
    pub fn gcs(&mut self) -> &mut Gcs2Commands {
        self.gcs
    }

    /// How long [`read`](Self::read) waits for the bulk transfer.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    // ==================== HDR? ====================

    /// Parsed `HDR?`, fetched on first use.
    pub fn hdr_options(&mut self) -> GcsResult<&HdrOptions> {
        if self.hdr.is_none() {
            let mut hdr = self.gcs.hdr_options()?;
            if hdr.additional_info.is_empty() {
                hdr.additional_info
                    .push(HDR_ADDITIONAL_INFO_NOT_AVAILABLE.to_string());
            }
            self.hdr = Some(hdr);
        }
        self.hdr.as_ref().ok_or(GcsError::NotConnected)
    }

    /// Record option ids listed by `HDR?`.
    pub fn record_options(&mut self) -> GcsResult<Vec<i64>> {
        Ok(self.hdr_options()?.record_options.clone())
    }

    /// Trigger source ids listed by `HDR?`.
    pub fn trigger_options(&mut self) -> GcsResult<Vec<i64>> {
        Ok(self.hdr_options()?.trigger_options.clone())
    }

    pub fn additional_info(&mut self) -> GcsResult<Vec<String>> {
        Ok(self.hdr_options()?.additional_info.clone())
    }

    // ==================== Timing ====================

    /// Servo cycle time in seconds.
    pub fn servo_time(&mut self) -> GcsResult<f64> {
        if let Some(time) = self.servo_time {
            return Ok(time);
        }
        let time = servo_time(self.gcs, true)?;
        debug!("Servo cycle time is {time} s");
        self.servo_time = Some(time);
        Ok(time)
    }

    pub fn set_servo_time(&mut self, seconds: f64) {
        self.servo_time = Some(seconds);
    }

    /// Points per table the controller can hold.
    pub fn max_num_values(&mut self) -> GcsResult<usize> {
        if let Some(points) = self.max_num_values {
            return Ok(points);
        }
        let points = max_num_values(self.gcs, true, self.hdr.as_ref())?;
        debug!("Record tables hold {points} points");
        self.max_num_values = Some(points);
        Ok(points)
    }

    pub fn set_max_num_values(&mut self, points: usize) {
        self.max_num_values = Some(points);
    }

    /// Points to record per table; defaults to the maximum.
    pub fn num_values(&mut self) -> GcsResult<usize> {
        match self.num_values {
            Some(points) => Ok(points),
            None => {
                let max = self.max_num_values()?;
                self.num_values = Some(max);
                Ok(max)
            }
        }
    }

    /// Fails if `points` exceeds [`max_num_values`](Self::max_num_values).
    pub fn set_num_values(&mut self, points: usize) -> GcsResult<()> {
        let max = self.max_num_values()?;
        if points > max {
            return Err(GcsError::InvalidArgument(format!(
                "{points} exceeds the maximum number of data recorder values {max}"
            )));
        }
        self.num_values = Some(points);
        Ok(())
    }

    /// First point read back, 1 based.
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(1)
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset = Some(offset);
    }

    /// Servo cycles per recorded point, from `RTR?` if supported.
    pub fn sample_rate(&mut self) -> GcsResult<u32> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        let rate = if self.gcs.supports("qRTR")? {
            u32::try_from(self.gcs.qrtr()?).unwrap_or(1).max(1)
        } else {
            warn!("Controller does not support RTR?, assuming a sample rate of 1");
            1
        };
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    /// Send `RTR` with `rate` (at least 1).
    pub fn set_sample_rate(&mut self, rate: u32) -> GcsResult<()> {
        let rate = rate.max(1);
        if self.gcs.supports("RTR")? {
            self.gcs.rtr(rate)?;
            self.sample_rate = Some(rate);
        } else {
            warn!("Controller does not support RTR, sample rate stays 1");
            self.sample_rate = Some(1);
        }
        debug!("Sample rate set to {:?} servo cycles", self.sample_rate);
        Ok(())
    }

    /// Seconds between recorded points.
    pub fn sample_time(&mut self) -> GcsResult<f64> {
        Ok(f64::from(self.sample_rate()?) * self.servo_time()?)
    }

    pub fn set_sample_time(&mut self, seconds: f64) -> GcsResult<()> {
        let cycles = seconds / self.servo_time()?;
        self.set_sample_rate(cycles as u32)
    }

    /// Recorded points per second.
    pub fn sample_freq(&mut self) -> GcsResult<f64> {
        Ok(1.0 / self.sample_time()?)
    }

    pub fn set_sample_freq(&mut self, hertz: f64) -> GcsResult<()> {
        self.set_sample_time(1.0 / hertz)
    }

    /// Duration of a full recording in seconds.
    pub fn rec_time(&mut self) -> GcsResult<f64> {
        Ok(self.num_values()? as f64 * self.sample_time()?)
    }

    /// Record as many points as fit into `seconds` at the current sample time.
    pub fn set_rec_time(&mut self, seconds: f64) -> GcsResult<()> {
        let points = seconds / self.sample_time()?;
        self.set_num_values(points as usize)
    }

    /// Duration of a recording that fills the tables.
    pub fn rec_time_max(&mut self) -> GcsResult<f64> {
        Ok(self.max_num_values()? as f64 * self.sample_time()?)
    }

    /// Fill the tables over `seconds` by adjusting the sample time.
    pub fn set_rec_time_max(&mut self, seconds: f64) -> GcsResult<()> {
        let points = self.max_num_values()?;
        self.num_values = Some(points);
        self.set_sample_time(seconds / points as f64)
    }

    /// Time of each recorded point relative to the trigger.
    pub fn timescale(&mut self) -> GcsResult<Vec<f64>> {
        let sample_time = self.sample_time()?;
        let points = self.num_values()?;
        Ok((0..points).map(|i| sample_time * i as f64).collect())
    }

    // ==================== Tables ====================

    /// Record tables in use, `1..=n`. The first per-table list among
    /// sources, options and triggers decides `n`.
    pub fn rec_tables(&self) -> Vec<u32> {
        let count = [
            self.sources.as_ref().and_then(PerTable::table_count),
            self.options.as_ref().and_then(PerTable::table_count),
            self.triggers.as_ref().and_then(PerTable::table_count),
        ]
        .into_iter()
        .flatten()
        .next()
        .unwrap_or(1);
        (1..=count as u32).collect()
    }

    /// Recorded item per table; defaults to the first axis.
    pub fn sources(&mut self) -> GcsResult<Vec<String>> {
        let tables = self.rec_tables().len();
        let sources = match &self.sources {
            Some(sources) => sources.clone(),
            None => {
                let first = self
                    .gcs
                    .axes()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| GcsError::InvalidResponse("controller lists no axes".to_string()))?;
                PerTable::Same(first)
            }
        };
        sources.resolve(tables)
    }

    pub fn set_sources(&mut self, sources: PerTable<String>) {
        debug!("Record sources set to {sources:?}");
        self.sources = Some(sources);
    }

    pub fn clear_sources(&mut self) {
        self.sources = None;
    }

    /// Recorded signal per table; defaults to the actual position.
    pub fn options(&self) -> GcsResult<Vec<RecordOption>> {
        self.options
            .clone()
            .unwrap_or(PerTable::Same(RecordOption::ActualPosition))
            .resolve(self.rec_tables().len())
    }

    pub fn set_options(&mut self, options: PerTable<RecordOption>) {
        debug!("Record options set to {options:?}");
        self.options = Some(options);
    }

    pub fn clear_options(&mut self) {
        self.options = None;
    }

    /// Trigger setting; defaults to the next command, resetting the tables.
    pub fn triggers(&self) -> PerTable<TriggerSource> {
        self.triggers
            .clone()
            .unwrap_or(PerTable::Same(TriggerSource::NextCommandWithReset))
    }

    /// `Same` triggers all tables with `DRT 0`; `Each` sets them per table,
    /// a single entry applying to every table.
    pub fn set_triggers(&mut self, triggers: PerTable<TriggerSource>) {
        debug!("Trigger sources set to {triggers:?}");
        self.triggers = Some(triggers);
    }

    pub fn clear_triggers(&mut self) {
        self.triggers = None;
    }

    // ==================== Recording ====================

    /// Configure the tables and activate the trigger. Drops data read before.
    ///
    /// Error polling is off while a "next command" trigger is set, so the
    /// controller's transient busy state is not reported as an error.
    pub fn arm(&mut self) -> GcsResult<()> {
        self.header = None;
        self.data = None;
        let tables = self.rec_tables();
        if self.gcs.supports("DRC")? {
            let sources = self.sources()?;
            let options = self.options()?;
            for ((table, source), option) in tables.iter().zip(&sources).zip(&options) {
                self.gcs.drc(*table, source, *option)?;
            }
        } else {
            warn!("Controller does not support DRC");
        }
        if !self.gcs.supports("DRT")? {
            warn!("Controller does not support DRT");
            return Ok(());
        }
        let triggers = self.triggers();
        let next_command = match &triggers {
            PerTable::Same(t) => *t == TriggerSource::NextCommandWithReset,
            PerTable::Each(ts) => ts.contains(&TriggerSource::NextCommandWithReset),
        };
        let msgs = self.gcs.core().messages_mut();
        let saved = msgs.errcheck();
        if next_command {
            msgs.set_errcheck(false);
        }
        let result = match &triggers {
            PerTable::Same(source) => self.gcs.drt(0, *source, None),
            PerTable::Each(_) => triggers
                .resolve(tables.len())
                .and_then(|sources| {
                    tables
                        .iter()
                        .zip(sources)
                        .try_for_each(|(table, source)| self.gcs.drt(*table, source, None))
                }),
        };
        self.gcs.core().messages_mut().set_errcheck(saved);
        result
    }

    /// Block until every table holds [`num_values`](Self::num_values)
    /// points. Without `DRL?`, sleeps 1.2 times the record time.
    pub fn wait(&mut self, timeout: Option<Duration>) -> GcsResult<()> {
        let tables = self.rec_tables();
        let points = self.num_values()?;
        if !self.gcs.supports("qDRL")? {
            let wait = Duration::from_secs_f64(1.2 * self.rec_time()?);
            debug!("Waiting {wait:?} for the recording");
            thread::sleep(wait);
            return Ok(());
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let recorded = self.gcs.qdrl(&tables)?;
            let least = recorded.values().copied().min().unwrap_or(0);
            if least >= points as i64 {
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() > d) {
                return Err(GcsError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Read `count` points per table from `offset` with `DRR?` and wait for
    /// the transfer. `None` takes [`offset`](Self::offset) and
    /// [`num_values`](Self::num_values).
    pub fn read(
        &mut self,
        offset: Option<u32>,
        count: Option<usize>,
    ) -> GcsResult<(GcsDataHeader, Array2<f64>)> {
        let tables = self.rec_tables();
        let offset = offset.unwrap_or_else(|| self.offset());
        let count = match count {
            Some(count) => count,
            None => self.num_values()?,
        };
        let header = self.gcs.qdrr(&tables, offset, count)?;
        match self.gcs.wait_bulk(self.read_timeout)? {
            BufState::Done => Ok((header, self.gcs.buf_data()?)),
            _ => Err(self
                .gcs
                .buf_data()
                .err()
                .unwrap_or_else(|| GcsError::InvalidResponse("bulk read did not finish".to_string()))),
        }
    }

    /// [`wait`](Self::wait), then [`read`](Self::read). The result is kept
    /// for [`header`](Self::header) and [`data`](Self::data).
    pub fn get_data(
        &mut self,
        timeout: Option<Duration>,
        offset: Option<u32>,
        count: Option<usize>,
    ) -> GcsResult<(GcsDataHeader, Array2<f64>)> {
        self.wait(timeout)?;
        let (header, data) = self.read(offset, count)?;
        self.header = Some(header.clone());
        self.data = Some(data.clone());
        Ok((header, data))
    }

    /// Header of the last readout, reading the recorder if needed.
    pub fn header(&mut self) -> GcsResult<&GcsDataHeader> {
        if self.header.is_none() {
            self.get_data(None, None, None)?;
        }
        self.header.as_ref().ok_or(GcsError::NotConnected)
    }

    /// Data of the last readout, reading the recorder if needed.
    pub fn data(&mut self) -> GcsResult<&Array2<f64>> {
        if self.data.is_none() {
            self.get_data(None, None, None)?;
        }
        self.data.as_ref().ok_or(GcsError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::commands::tests::core;
    use crate::test_util::ScriptedTransport;

    const HPA: &str = "\
<PAM_ID>=\t<CMD_LEVEL>\t<MAX_ITEMS>\t<DATA_TYPE>\t<FUNCTION>\t<DESCRIPTION> \n\
0xe000200=\t0\t1\tFLOAT\tServo\tServo Update Time \n\
end of help\n";

    const HELP_ALL: &str = "\
The following commands are valid: \n\
DRC {<RecTableID> <Source> <RecOption>} Set Data Recorder Configuration \n\
DRT {<RecTableID> <TriggerSource> <Value>} Set Data Recorder Trigger Source \n\
DRL? [{<RecTableID>}] Get Number of Recorded Points \n\
DRR? [<StartPoint> <NumberOfPoints> [{<RecTableID>}]] Get Recorded Data \n\
RTR <RecordTableRate> Set Record Table Rate \n\
SPA? [{<ItemID> <PamID>}] Get Volatile Memory Parameters \n\
end of help\n";

    fn gcs2(transport: ScriptedTransport) -> Gcs2Commands {
        Gcs2Commands::new(core(transport))
    }

    #[test]
    fn test_servo_time_from_parameter() {
        let transport = ScriptedTransport::new()
            .expect("*IDN?\n", "PI,E-727,0123,1.0\n")
            .expect("HLP?\n", HELP_ALL)
            .expect("HPA?\n", HPA)
            .expect("SPA? 1 0xe000200\n", "1 0xe000200=5e-05\n");
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        assert_relative_eq!(recorder.servo_time().unwrap(), 5e-5);
    }

    #[test]
    fn test_model_tables_used_without_parameters() {
        let transport = ScriptedTransport::new()
            .expect("*IDN?\n", "PI,C-863.11,0123,1.0\n")
            .expect("HLP?\n", "MOV {<AxisID> <Position>} Set Target Position \nend of help\n");
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        assert_relative_eq!(recorder.servo_time().unwrap(), 50e-6);
        assert_eq!(recorder.max_num_values().unwrap(), 1024);
    }

    #[test]
    fn test_c702_ignores_parameters() {
        let transport = ScriptedTransport::new().expect("*IDN?\n", "PI,C-702.00,0123,1.0\n");
        let log = transport.log();
        let mut gcs = gcs2(transport);
        assert_relative_eq!(servo_time(&mut gcs, true).unwrap(), 100e-6);
        assert_eq!(max_num_values(&mut gcs, true, None).unwrap(), 262_144);
        assert_eq!(log.written(), ["*IDN?\n", "ERR?\n"]);
    }

    #[test]
    fn test_max_num_values_from_hdr() {
        let hdr = "#RecordOptions \n2=Real Position of Axis \n#Additional information \n4096 datapoints per table \nend of help\n";
        let transport = ScriptedTransport::new()
            .expect("*IDN?\n", "PI,E-999,0123,1.0\n")
            .expect("HLP?\n", "HDR? Get All Data Recorder Options \nend of help\n")
            .expect("HDR?\n", hdr);
        let mut gcs = gcs2(transport);
        assert_eq!(max_num_values(&mut gcs, false, None).unwrap(), 4096);
    }

    #[test]
    fn test_unknown_model_without_sources_fails() {
        let transport = ScriptedTransport::new()
            .expect("*IDN?\n", "PI,E-999,0123,1.0\n")
            .expect("HLP?\n", "MOV {<AxisID> <Position>} Set Target Position \nend of help\n");
        let mut gcs = gcs2(transport);
        assert!(servo_time(&mut gcs, true).unwrap_err().is_usage());
    }

    #[test]
    fn test_derived_timing() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", HELP_ALL)
            .expect_silence("RTR 8\n");
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        recorder.set_servo_time(1.0 / 1024.0);
        recorder.set_max_num_values(1000);
        recorder.set_sample_rate(8).unwrap();
        assert_relative_eq!(recorder.sample_time().unwrap(), 0.0078125);
        assert_relative_eq!(recorder.sample_freq().unwrap(), 128.0);
        recorder.set_rec_time(1.0).unwrap();
        assert_eq!(recorder.num_values().unwrap(), 128);
        assert_relative_eq!(recorder.rec_time_max().unwrap(), 7.8125);
        let timescale = recorder.timescale().unwrap();
        assert_eq!(timescale.len(), 128);
        assert_relative_eq!(timescale[1], 0.0078125);
        assert!(recorder.set_num_values(2000).is_err());
        assert_eq!(recorder.offset(), 1);
    }

    #[test]
    fn test_rec_tables_follow_first_list() {
        let mut gcs = gcs2(ScriptedTransport::new());
        let mut recorder = DataRecorder::new(&mut gcs);
        assert_eq!(recorder.rec_tables(), [1]);
        recorder.set_options(PerTable::Each(vec![
            RecordOption::ActualPosition,
            RecordOption::CommandedPosition,
        ]));
        recorder.set_triggers(PerTable::Each(vec![TriggerSource::Default]));
        assert_eq!(recorder.rec_tables(), [1, 2]);
        recorder.set_sources(PerTable::Each(vec!["1".into(), "2".into(), "3".into()]));
        assert_eq!(recorder.rec_tables(), [1, 2, 3]);
        assert!(recorder.options().is_err());
    }

    #[test]
    fn test_arm_suspends_errcheck_for_next_command_trigger() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", HELP_ALL)
            .expect("SAI?\n", "X \nY\n")
            .expect_silence("DRC 1 X 2\n")
            .expect_silence("DRC 2 X 1\n")
            .expect_silence("DRT 0 2 0\n");
        let log = transport.log();
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        recorder.set_options(PerTable::Each(vec![
            RecordOption::ActualPosition,
            RecordOption::CommandedPosition,
        ]));
        recorder.arm().unwrap();
        assert_eq!(log.written().last().map(String::as_str), Some("DRT 0 2 0\n"));
        assert!(log.is_done());
        assert!(gcs.core().messages().errcheck());
    }

    #[test]
    fn test_arm_per_table_triggers_keep_errcheck() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", HELP_ALL)
            .expect_silence("DRC 1 X 2\n")
            .expect_silence("DRC 2 X 2\n")
            .expect_silence("DRT 1 1 0\n")
            .expect_silence("DRT 2 1 0\n");
        let log = transport.log();
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        recorder.set_sources(PerTable::Same("X".into()));
        recorder.set_triggers(PerTable::Each(vec![
            TriggerSource::PositionChangingCommand,
            TriggerSource::PositionChangingCommand,
        ]));
        recorder.arm().unwrap();
        assert_eq!(log.written().last().map(String::as_str), Some("ERR?\n"));
    }

    #[test]
    fn test_wait_and_read() {
        let header = "# TYPE = 1 \n# SEPARATOR = 32 \n# DIM = 2 \n# NDATA = 3 \n# NAME0 = Actual Position of axis X \n# NAME1 = Commanded Position of axis X \n# END_HEADER \n";
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect("HLP?\n", HELP_ALL)
            .expect("ERR?\n", "0\n")
            .expect("DRL? 1 2\n", "1=3 \n2=3\n")
            .expect("ERR?\n", "0\n")
            .expect(
                "DRR? 1 3 1 2\n",
                &format!("{header}0.1 0.0 \n0.2 0.1 \n0.3 0.2\n"),
            )
            .expect("ERR?\n", "0\n");
        let mut gcs = gcs2(transport);
        let mut recorder = DataRecorder::new(&mut gcs);
        recorder.set_max_num_values(3);
        recorder.set_options(PerTable::Each(vec![
            RecordOption::ActualPosition,
            RecordOption::CommandedPosition,
        ]));
        let (header, data) = recorder
            .get_data(Some(Duration::from_secs(1)), None, None)
            .unwrap();
        assert_eq!(header.names().len(), 2);
        assert_eq!(data.shape(), [3, 2]);
        assert_relative_eq!(data[[2, 0]], 0.3);
        assert_eq!(recorder.data().unwrap().nrows(), 3);
    }
}

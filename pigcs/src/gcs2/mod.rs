//! GCS 2.0 command layer.
//!
//! [`Gcs2Commands`] adds the GCS 2.0 vocabulary to the shared
//! [`GcsCommands`] methods: vector and jog moves, stage assignment, soft
//! limits, the `SPA`/`SEP` parameter family with schema-driven coercion, the
//! wave generator, the data recorder, macros and coordinate systems.
//!
//! Parameters are typed through the `HPA?` schema, fetched on first use and
//! dropped whenever `CCL` changes the command level.

mod coords;
mod macros;
mod recorder;
mod wavegen;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::commands::GcsCommands;
use crate::core::{command_line, GcsCore};
use crate::error::{GcsError, GcsResult};
use crate::items::{parse_nested_values, IntoItemValues, IntoItems, ItemMap};
use crate::schema::{parse_param_id, Gcs2Schema};
use crate::values::{format_hex, format_typed, parse_int, Value};

pub use coords::CoordinateSystemType;
pub use recorder::{HdrOptions, RecordOption, TriggerSource};
pub use wavegen::{WaveAppend, Waveform};

/// Parameter values by item, then parameter id.
pub type ParamMap = IndexMap<String, IndexMap<u32, Value>>;

/// Commands of a GCS 2.0 controller.
pub struct Gcs2Commands {
    core: GcsCore,
    schema: Option<Gcs2Schema>,
    /// Error polling state saved by `MAC BEG` while a macro is recorded
    macro_errcheck: Option<bool>,
}

impl GcsCommands for Gcs2Commands {
    fn core(&mut self) -> &mut GcsCore {
        &mut self.core
    }

    fn core_ref(&self) -> &GcsCore {
        &self.core
    }

    fn invalidate_schema(&mut self) {
        self.schema = None;
    }
}

/// Expand `(items, params)` so that a single item applies to every parameter.
fn pair_items(items: Vec<String>, params: &[u32]) -> GcsResult<Vec<(String, u32)>> {
    match (items.len(), params.len()) {
        (0, 0) => Ok(Vec::new()),
        (1, n) if n > 0 => Ok(params.iter().map(|p| (items[0].clone(), *p)).collect()),
        (n, m) if n == m => Ok(items.into_iter().zip(params.iter().copied()).collect()),
        (n, m) => Err(GcsError::ArityMismatch { items: n, values: m }),
    }
}

impl Gcs2Commands {
    pub fn new(core: GcsCore) -> Self {
        Self {
            core,
            schema: None,
            macro_errcheck: None,
        }
    }

    /// Give the shared state back, e.g. to rebind the handle.
    pub fn into_core(self) -> GcsCore {
        self.core
    }

    // ==================== Motion ====================

    /// `MVE`: vector move, all axes arrive at the same time.
    pub fn mve(&mut self, targets: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("MVE", targets)
    }

    /// `REF`: reference move to the reference switch. No axes means all.
    ///
    /// The stop error of an aborted reference move is swallowed.
    pub fn ref_axes(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        let items = axes.into_items();
        self.core.send_reference(&command_line("REF", &items.join(" ")))
    }

    /// `JOG`: start a constant velocity move per joystick axis.
    pub fn jog(&mut self, velocities: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("JOG", velocities)
    }

    /// `JOG?`
    pub fn qjog(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core.query_f64("JOG?", axes)
    }

    /// `POS`: declare the current position without moving.
    pub fn pos(&mut self, positions: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("POS", positions)
    }

    // ==================== Configuration ====================

    /// `CST`: assign stages to axes. Clears the cached axis lists.
    pub fn cst(&mut self, stages: impl IntoItemValues<String>) -> GcsResult<()> {
        let result = self.core.set_items("CST", stages);
        self.core.invalidate_axes();
        result
    }

    /// `CST?`: assigned stage per axis.
    pub fn qcst(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.core.query_str("CST?", axes)
    }

    /// `NLM`: lower soft limit.
    pub fn nlm(&mut self, limits: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("NLM", limits)
    }

    /// `NLM?`
    pub fn qnlm(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core.query_f64("NLM?", axes)
    }

    /// `PLM`: upper soft limit.
    pub fn plm(&mut self, limits: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("PLM", limits)
    }

    /// `PLM?`
    pub fn qplm(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core.query_f64("PLM?", axes)
    }

    /// `SSL`: switch the soft limits on or off.
    pub fn ssl(&mut self, states: impl IntoItemValues<bool>) -> GcsResult<()> {
        self.core.set_items("SSL", states)
    }

    /// `SSL?`
    pub fn qssl(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.core.query_bool("SSL?", axes)
    }

    /// `CCL`: change the command level.
    ///
    /// Levels above 0 need the password. The supported-command set and the
    /// parameter schema are dropped, whether or not the change succeeded.
    pub fn ccl(&mut self, level: u32, password: Option<&str>) -> GcsResult<()> {
        let args = match password {
            Some(password) => format!("{level} {password}"),
            None => level.to_string(),
        };
        let result = self.core.send(&command_line("CCL", &args));
        self.core.invalidate_capabilities();
        self.invalidate_schema();
        result
    }

    /// `CCL?`: current command level.
    pub fn qccl(&mut self) -> GcsResult<i64> {
        parse_int(&self.core.query_text("CCL?")?)
    }

    // ==================== Parameters ====================

    /// `HPA?`: raw parameter help listing.
    pub fn qhpa(&mut self) -> GcsResult<String> {
        self.core.read("HPA?")
    }

    /// Parameter types from `HPA?`, fetched on first use.
    ///
    /// Firmware without `HPA?` gets an empty schema; values are then guessed.
    pub fn schema(&mut self) -> GcsResult<&Gcs2Schema> {
        if self.schema.is_none() {
            let schema = match self.qhpa() {
                Ok(answer) => Gcs2Schema::from_hpa(&answer)?,
                Err(GcsError::Controller(e)) => {
                    warn!("HPA? failed, parameter values will be guessed: {e}");
                    Gcs2Schema::default()
                }
                Err(e) => return Err(e),
            };
            self.schema = Some(schema);
        }
        self.schema.as_ref().ok_or(GcsError::NotConnected)
    }

    /// Build `item 0xid value` triples, formatting each value per its type.
    fn param_args(&mut self, items: Vec<String>, params: &[u32], values: &[Value]) -> GcsResult<String> {
        let pairs = pair_items(items, params)?;
        if pairs.is_empty() {
            return Err(GcsError::InvalidArgument("no parameters given".to_string()));
        }
        if pairs.len() != values.len() {
            return Err(GcsError::ArityMismatch {
                items: pairs.len(),
                values: values.len(),
            });
        }
        let format = self.core.float_format();
        let schema = self.schema()?;
        pairs
            .iter()
            .zip(values)
            .map(|((item, id), value)| {
                let text = format_typed(value, schema.value_kind(*id), &format)?;
                Ok(format!("{item} {} {text}", format_hex(*id)))
            })
            .collect::<GcsResult<Vec<_>>>()
            .map(|args| args.join(" "))
    }

    /// `item 0xid` pairs for queries.
    fn param_query_args(items: Vec<String>, params: &[u32]) -> GcsResult<String> {
        Ok(pair_items(items, params)?
            .iter()
            .map(|(item, id)| format!("{item} {}", format_hex(*id)))
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Parse `item 0xid=value` lines through the schema.
    fn parse_params(&mut self, answer: &str) -> GcsResult<ParamMap> {
        let schema = self.schema()?;
        let nested = parse_nested_values(answer, |_, param| {
            parse_param_id(param)
                .map(|id| schema.value_kind(id))
                .unwrap_or_default()
        })?;
        nested
            .into_iter()
            .map(|(item, params)| {
                let params = params
                    .into_iter()
                    .map(|(id, value)| Ok((parse_param_id(&id)?, value)))
                    .collect::<GcsResult<IndexMap<u32, Value>>>()?;
                Ok((item, params))
            })
            .collect()
    }

    /// `SPA`: set parameters in volatile memory.
    ///
    /// A single item applies to every parameter; otherwise items, parameters
    /// and values must have the same length.
    pub fn spa(&mut self, items: impl IntoItems, params: &[u32], values: &[Value]) -> GcsResult<()> {
        let args = self.param_args(items.into_items(), params, values)?;
        self.core.send(&command_line("SPA", &args))
    }

    /// `SPA?`: parameters from volatile memory, typed through the schema.
    ///
    /// No items and no parameters asks for everything.
    pub fn qspa(&mut self, items: impl IntoItems, params: &[u32]) -> GcsResult<ParamMap> {
        let args = Self::param_query_args(items.into_items(), params)?;
        let answer = self.core.read(&command_line("SPA?", &args))?;
        self.parse_params(&answer)
    }

    /// `SEP`: set parameters in non-volatile memory.
    pub fn sep(
        &mut self,
        password: &str,
        items: impl IntoItems,
        params: &[u32],
        values: &[Value],
    ) -> GcsResult<()> {
        let args = self.param_args(items.into_items(), params, values)?;
        self.core.send(&format!("SEP {password} {args}"))
    }

    /// `SEP?`: parameters from non-volatile memory.
    pub fn qsep(&mut self, items: impl IntoItems, params: &[u32]) -> GcsResult<ParamMap> {
        let args = Self::param_query_args(items.into_items(), params)?;
        let answer = self.core.read(&command_line("SEP?", &args))?;
        self.parse_params(&answer)
    }

    /// `WPA`: copy parameters from volatile to non-volatile memory. No
    /// parameters means all.
    pub fn wpa(&mut self, password: &str, items: impl IntoItems, params: &[u32]) -> GcsResult<()> {
        let args = Self::param_query_args(items.into_items(), params)?;
        self.core.send(&command_line(&format!("WPA {password}"), &args))
    }

    /// `DPA`: restore factory defaults in volatile memory.
    pub fn dpa(&mut self, password: &str, items: impl IntoItems, params: &[u32]) -> GcsResult<()> {
        let args = Self::param_query_args(items.into_items(), params)?;
        self.core.send(&command_line(&format!("DPA {password}"), &args))
    }

    /// `RPA`: reload parameters from non-volatile memory.
    pub fn rpa(&mut self, items: impl IntoItems, params: &[u32]) -> GcsResult<()> {
        let args = Self::param_query_args(items.into_items(), params)?;
        self.core.send(&command_line("RPA", &args))
    }

    /// Value of parameter `id` of `item`, or `None` if the controller does
    /// not know it.
    ///
    /// Safe to use as a feature probe: ids outside the schema and controller
    /// errors give `None`.
    pub fn get_param(&mut self, item: &str, id: u32) -> GcsResult<Option<Value>> {
        if !self.supports("qSPA")? {
            return Ok(None);
        }
        let schema = self.schema()?;
        if !schema.is_empty() && !schema.contains(id) {
            debug!("Parameter {} is not listed by HPA?", format_hex(id));
            return Ok(None);
        }
        match self.qspa(item, &[id]) {
            Ok(mut values) => Ok(values
                .shift_remove(item)
                .and_then(|mut params| params.shift_remove(&id))),
            Err(GcsError::Controller(e)) => {
                debug!("Parameter {} not readable: {e}", format_hex(id));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::core;
    use crate::test_util::ScriptedTransport;

    const HPA: &str = "\
<PAM_ID>=\t<CMD_LEVEL>\t<MAX_ITEMS>\t<DATA_TYPE>\t<FUNCTION>\t<DESCRIPTION> \n\
0x1=\t0\t4\tFLOAT\tMotor\tP Term \n\
0xe000200=\t0\t1\tFLOAT\tServo\tServo Update Time \n\
0x16000201=\t0\t1\tINT\tRecorder\tData Rec Set Points \n\
end of help\n";

    pub(crate) fn gcs2(transport: ScriptedTransport) -> Gcs2Commands {
        Gcs2Commands::new(core(transport))
    }

    #[test]
    fn test_pair_items_broadcasts_single_item() {
        let pairs = pair_items(vec!["1".into()], &[1, 2]).unwrap();
        assert_eq!(pairs, [("1".to_string(), 1), ("1".to_string(), 2)]);
        assert!(pair_items(vec!["1".into(), "2".into()], &[1, 2, 3]).is_err());
        assert!(pair_items(Vec::new(), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_spa_formats_through_schema() {
        let transport = ScriptedTransport::new()
            .expect("HPA?\n", HPA)
            .expect_silence("SPA 1 0x1 0.25 1 0x16000201 100\n");
        let log = transport.log();
        let mut dev = gcs2(transport);
        dev.spa("1", &[0x1, 0x1600_0201], &[Value::Float(0.25), Value::Float(100.0)])
            .unwrap();
        assert!(log.is_done());
    }

    #[test]
    fn test_spa_arity_checked_before_sending() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let mut dev = gcs2(transport);
        let err = dev.spa(["1", "2"], &[0x1, 0x1], &[Value::Int(1)]).unwrap_err();
        assert!(err.is_usage());
        assert!(log.written().is_empty());
    }

    #[test]
    fn test_qspa_typed_nested() {
        let transport = ScriptedTransport::new()
            .expect("SPA? 1 0x1 2 0x16000201\n", "1 0x1=0.5 \n2 0x16000201=1024\n")
            .expect("HPA?\n", HPA);
        let mut dev = gcs2(transport);
        let values = dev.qspa(["1", "2"], &[0x1, 0x1600_0201]).unwrap();
        assert_eq!(values["1"][&0x1], Value::Float(0.5));
        assert_eq!(values["2"][&0x1600_0201], Value::Int(1024));
    }

    #[test]
    fn test_get_param_outside_schema_is_none() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", "SPA? [{<ItemID> <PamID>}]\n")
            .expect("HPA?\n", HPA)
            .expect("SPA? 1 0xe000200\n", "1 0xe000200=5e-05\n");
        let mut dev = gcs2(transport);
        assert_eq!(dev.get_param("1", 0x1600_0200).unwrap(), None);
        assert_eq!(dev.get_param("1", 0x0E00_0200).unwrap(), Some(Value::Float(5e-5)));
    }

    #[test]
    fn test_ccl_drops_capabilities_and_schema() {
        let transport = ScriptedTransport::new()
            .expect("HPA?\n", HPA)
            .expect_silence("CCL 1 advanced\n")
            .expect("HPA?\n", HPA);
        let log = transport.log();
        let mut dev = gcs2(transport);
        assert_eq!(dev.schema().unwrap().len(), 3);
        dev.ccl(1, Some("advanced")).unwrap();
        assert_eq!(dev.schema().unwrap().len(), 3);
        assert!(log.is_done());
    }

    #[test]
    fn test_schema_falls_back_when_hpa_unknown() {
        let transport = ScriptedTransport::new().expect_error("HPA?\n", 2);
        let mut dev = gcs2(transport);
        assert!(dev.schema().unwrap().is_empty());
    }

    #[test]
    fn test_cst_invalidates_axes() {
        let transport = ScriptedTransport::new()
            .expect("SAI?\n", "1\n")
            .expect_silence("CST 1 M-110.1DG\n")
            .expect("SAI?\n", "1 \n2\n");
        let mut dev = gcs2(transport);
        assert_eq!(dev.axes().unwrap(), ["1"]);
        dev.cst(("1", "M-110.1DG".to_string())).unwrap();
        assert_eq!(dev.axes().unwrap(), ["1", "2"]);
    }

    #[test]
    fn test_ref_swallows_stop() {
        let transport = ScriptedTransport::new().expect_error("REF 1\n", 10);
        let mut dev = gcs2(transport);
        dev.ref_axes("1").unwrap();
    }
}

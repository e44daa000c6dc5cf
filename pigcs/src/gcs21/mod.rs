//! GCS 2.1 command layer.
//!
//! [`Gcs21Commands`] adds the GCS 2.1 vocabulary to the shared
//! [`GcsCommands`] methods. Parameters are addressed by memory type,
//! container unit, function unit and id (`SPV RAM AXIS_1 PID 0x7000100`),
//! status is read per container unit with `STV?`, and discovery commands
//! answer in blocks.
//!
//! The parameter schema comes from `USG? PAM`. Changing the user command
//! level with `UCL` changes which parameters are visible, so it drops both
//! the schema and the supported-command set.

mod params;
mod recorder;
mod status;

use tracing::warn;

use crate::blocks::{parse_block_answer, Block};
use crate::commands::GcsCommands;
use crate::core::{command_line, GcsCore};
use crate::error::{GcsError, GcsResult, Syntax};
use crate::items::{IntoItemValues, IntoItems, ItemMap};
use crate::schema::Gcs21Schema;
use crate::values::{format_hex, parse_int};

pub use params::{ParamAddress, SpvMap};
pub use recorder::{RecState, RecTrigger};
pub use status::{AxisStatus, SystemStatus, UnitStatus};

/// PAM id of the lower travel limit of an axis.
pub const PAMID_NEGATIVE_AXIS_LIMIT: u32 = 0x121;
/// PAM id of the upper travel limit of an axis.
pub const PAMID_POSITIVE_AXIS_LIMIT: u32 = 0x122;

/// Commands of a GCS 2.1 controller.
pub struct Gcs21Commands {
    core: GcsCore,
    schema: Option<Gcs21Schema>,
}

impl GcsCommands for Gcs21Commands {
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

impl Gcs21Commands {
    /// Bind `core` to the GCS 2.1 vocabulary and error codes.
    pub fn new(mut core: GcsCore) -> Self {
        core.messages_mut().set_syntax(Syntax::Gcs21);
        Self { core, schema: None }
    }

    pub fn into_core(self) -> GcsCore {
        self.core
    }

    // ==================== Discovery ====================

    /// `USG?`: user guide sections (`CMD`, `SYS`, `PAM`, `HW`) as blocks.
    pub fn qusg(&mut self, args: &str) -> GcsResult<Vec<Block>> {
        let answer = self.core.read_block(&command_line("USG?", args))?;
        parse_block_answer(&answer)
    }

    /// Parameter types from `USG? PAM`, fetched on first use.
    pub fn schema(&mut self) -> GcsResult<&Gcs21Schema> {
        if self.schema.is_none() {
            let schema = match self.qusg("PAM") {
                Ok(blocks) => Gcs21Schema::from_blocks(&blocks)?,
                Err(GcsError::Controller(e)) => {
                    warn!("USG? PAM failed, parameter values will be guessed: {e}");
                    Gcs21Schema::default()
                }
                Err(e) => return Err(e),
            };
            self.schema = Some(schema);
        }
        self.schema.as_ref().ok_or(GcsError::NotConnected)
    }

    // ==================== Command level ====================

    /// `UCL`: change the user command level.
    ///
    /// The supported-command set and parameter schema are dropped and
    /// fetched again on next use.
    pub fn ucl(&mut self, level: &str, password: Option<&str>) -> GcsResult<()> {
        let args = match password {
            Some(password) => format!("{level} {password}"),
            None => level.to_string(),
        };
        let result = self.core.send(&command_line("UCL", &args));
        self.core.invalidate_capabilities();
        self.invalidate_schema();
        result
    }

    /// `UCL?`: current user command level.
    pub fn qucl(&mut self) -> GcsResult<String> {
        self.core.query_text("UCL?")
    }

    // ==================== Axes ====================

    /// `EAX`: enable or disable axes.
    pub fn eax(&mut self, states: impl IntoItemValues<bool>) -> GcsResult<()> {
        self.core.set_items("EAX", states)
    }

    /// `EAX?`
    pub fn qeax(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.core.query_bool("EAX?", axes)
    }

    /// `SAM`: set the control mode of axes (`0x0` open loop, `0x2` position
    /// control, ...).
    pub fn sam(&mut self, modes: impl IntoItemValues<u32>) -> GcsResult<()> {
        let (axes, modes) = modes.into_item_values()?;
        let modes: Vec<String> = modes.into_iter().map(format_hex).collect();
        self.core.set_items("SAM", (axes, modes))
    }

    /// `SAM?`: control mode per axis.
    pub fn qsam(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<u32>> {
        self.core
            .query_str("SAM?", axes)?
            .into_iter()
            .map(|(axis, mode)| {
                let mode = u32::try_from(parse_int(&mode)?)
                    .map_err(|_| GcsError::ParseError(format!("control mode {mode:?}")))?;
                Ok((axis, mode))
            })
            .collect()
    }

    /// `RES`: reset the error state of axes.
    pub fn res(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        self.core.send_items("RES", axes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::commands::tests::core;
    use crate::test_util::ScriptedTransport;

    pub(crate) const USG_PAM: &str = "#Parameter Overview: <Parameter ID>\t<Data Type>\t<Dimension>\n\
0x7000100\tFLOAT32\t1\n\
0x121\tFLOAT32\t1\n\
0x122\tFLOAT32\t1\n\
0x1\tINT32\t1\n\
#END\n";

    pub(crate) fn gcs21(transport: ScriptedTransport) -> Gcs21Commands {
        Gcs21Commands::new(core(transport))
    }

    #[test]
    fn test_new_binds_gcs21_errors() {
        let transport = ScriptedTransport::new().expect_error("EAX AXIS_1 1\n", 21448);
        let mut dev = gcs21(transport);
        assert_eq!(dev.syntax(), Syntax::Gcs21);
        let err = dev.eax(("AXIS_1", true)).unwrap_err();
        match err {
            GcsError::Controller(e) => {
                assert!(crate::error::ErrorInfo::name(&e).contains("AXIS_DISABLED"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_sam_sends_hex_modes() {
        let transport = ScriptedTransport::new()
            .expect_silence("SAM AXIS_1 0x2 AXIS_2 0x0\n")
            .expect("SAM? AXIS_1\n", "AXIS_1=0x2\n");
        let mut dev = gcs21(transport);
        dev.sam(vec![("AXIS_1", 2), ("AXIS_2", 0)]).unwrap();
        assert_eq!(dev.qsam("AXIS_1").unwrap()["AXIS_1"], 2);
    }

    #[test]
    fn test_ucl_drops_schema_and_capabilities() {
        let transport = ScriptedTransport::new()
            .expect("USG? PAM\n", USG_PAM)
            .expect_silence("UCL ADVANCED secret\n")
            .expect("USG? PAM\n", USG_PAM);
        let log = transport.log();
        let mut dev = gcs21(transport);
        assert_eq!(dev.schema().unwrap().len(), 4);
        dev.ucl("ADVANCED", Some("secret")).unwrap();
        assert_eq!(dev.schema().unwrap().len(), 4);
        assert!(log.is_done());
    }

    #[test]
    fn test_eax_and_res() {
        let transport = ScriptedTransport::new()
            .expect_silence("EAX AXIS_1 1\n")
            .expect("EAX? AXIS_1\n", "AXIS_1=1\n")
            .expect_silence("RES AXIS_1\n");
        let mut dev = gcs21(transport);
        dev.eax(("AXIS_1", true)).unwrap();
        assert!(dev.qeax("AXIS_1").unwrap()["AXIS_1"]);
        dev.res("AXIS_1").unwrap();
    }
}

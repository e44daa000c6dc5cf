//! Command vocabulary shared by GCS 2.0 and GCS 2.1 controllers.
//!
//! [`GcsCommands`] provides one method per command as a default
//! implementation over [`GcsCore`]. The protocol layers
//! ([`Gcs2Commands`](crate::gcs2::Gcs2Commands),
//! [`Gcs21Commands`](crate::gcs21::Gcs21Commands)) and the dispatcher
//! ([`GcsDevice`](crate::GcsDevice)) implement the trait and add their own
//! commands on top.
//!
//! Method names are the manual's mnemonics in snake case: `mov` sends `MOV`,
//! `qpos` sends `POS?`, `is_moving` sends control byte `#5`.
//!
//! # Example
//!
//! ```no_run
//! use pigcs::{ConnectionSettings, GcsCommands, GcsDevice, Interface};
//!
//! let interface = Interface::TcpIp { host: "192.168.15.210".into(), port: 50000 };
//! let mut device = GcsDevice::open(&interface, ConnectionSettings::default())?;
//! device.svo(("1", true))?;
//! device.mov(("1", 12.5))?;
//! let pos = device.qpos("1")?;
//! println!("axis 1 at {}", pos["1"]);
//! # Ok::<(), pigcs::GcsError>(())
//! ```

use std::time::Duration;

use ndarray::Array2;
use tracing::warn;

use crate::core::GcsCore;
use crate::error::{GcsError, GcsResult, Syntax};
use crate::gcsdata::{BufState, GcsDataHeader};
use crate::items::{parse_item_values, IntoItemValues, IntoItems, ItemMap};
use crate::values::{parse_float, parse_hex_word, parse_int, ValueKind};

/// Control byte answered with `±` (0xB1) when the controller is ready.
const READY: char = '\u{b1}';
/// Control byte answered with `°` (0xB0) while the controller is busy.
const NOT_READY: char = '\u{b0}';

/// Map bits of `word` to `requested` items by their position in `all`.
///
/// An empty request reports every item of `all`.
pub fn bit_coded_items(word: u64, all: &[String], requested: &[String]) -> GcsResult<ItemMap<bool>> {
    let requested = if requested.is_empty() { all } else { requested };
    requested
        .iter()
        .map(|item| {
            let index = all
                .iter()
                .position(|a| a == item)
                .ok_or_else(|| GcsError::InvalidArgument(format!("unknown item {item:?}")))?;
            Ok((item.clone(), index < 64 && word & (1 << index) != 0))
        })
        .collect()
}

/// Commands available on every controller.
pub trait GcsCommands {
    /// Shared command state.
    fn core(&mut self) -> &mut GcsCore;

    /// Shared command state, read-only.
    fn core_ref(&self) -> &GcsCore;

    /// Drop the cached parameter schema. Layers without a schema ignore this.
    fn invalidate_schema(&mut self) {}

    /// Protocol variant.
    fn syntax(&self) -> Syntax {
        self.core_ref().syntax()
    }

    /// True if the firmware implements `name` (`qDRL`, `MAC_BEG`, `IsMoving`).
    fn supports(&mut self, name: &str) -> GcsResult<bool> {
        self.core().supports(name)
    }

    /// Enabled axes.
    fn axes(&mut self) -> GcsResult<Vec<String>> {
        self.core().axes()
    }

    /// All axes including disabled ones.
    fn allaxes(&mut self) -> GcsResult<Vec<String>> {
        self.core().allaxes()
    }

    /// Number of enabled axes.
    fn numaxes(&mut self) -> GcsResult<usize> {
        Ok(self.axes()?.len())
    }

    // ==================== Identification ====================

    /// `*IDN?`
    fn qidn(&mut self) -> GcsResult<String> {
        self.core().idn()
    }

    /// `CSV?`: command syntax version, e.g. `2.0` or `2.1`.
    fn qcsv(&mut self) -> GcsResult<f64> {
        parse_float(&self.core().query_text("CSV?")?)
    }

    /// `VER?`: firmware and library versions, one per line.
    fn qver(&mut self) -> GcsResult<String> {
        self.core().query_text("VER?")
    }

    /// `SSN?`: serial number.
    fn qssn(&mut self) -> GcsResult<String> {
        self.core().query_text("SSN?")
    }

    /// `HLP?`: command help listing.
    fn qhlp(&mut self) -> GcsResult<String> {
        self.core().read("HLP?")
    }

    /// `ERR?`: current error code. Never error checked itself.
    fn qerr(&mut self) -> GcsResult<i64> {
        self.core().messages_mut().query_error()
    }

    /// `RBT`: reboot the controller.
    ///
    /// The controller drops the link while rebooting, so transport errors are
    /// swallowed. All cached controller state is cleared.
    fn rbt(&mut self) -> GcsResult<()> {
        let result = self.core().send("RBT");
        self.core().reset_caches();
        self.invalidate_schema();
        match result {
            Err(e) if e.is_transport() => {
                warn!("Ignoring transport error during reboot: {e}");
                Ok(())
            }
            other => other,
        }
    }

    // ==================== Bulk data ====================

    /// Progress of the last bulk data query (`DRR?`, `REC_DAT?`, `GWD?`).
    fn buf_state(&self) -> BufState {
        self.core_ref().messages().buf_state()
    }

    /// Rows of the last completed bulk data query.
    fn buf_data(&self) -> GcsResult<Array2<f64>> {
        self.core_ref().messages().buf_data()
    }

    /// Header of the last bulk data query.
    fn buf_header(&self) -> Option<GcsDataHeader> {
        self.core_ref().messages().buf_header()
    }

    /// Block until the bulk pump finishes and the handle is usable again.
    fn wait_bulk(&mut self, timeout: Duration) -> GcsResult<BufState> {
        self.core().messages_mut().wait_bulk(timeout)
    }

    // ==================== Motion ====================

    /// `MOV`: absolute move.
    fn mov(&mut self, targets: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core().set_items("MOV", targets)
    }

    /// `MVR`: relative move.
    fn mvr(&mut self, distances: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core().set_items("MVR", distances)
    }

    /// `GOH`: move to the home position. No axes means all.
    fn goh(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        self.core().send_items("GOH", axes)
    }

    /// `STP`: stop all axes. With `noraise` the resulting stop error is swallowed.
    fn stp(&mut self, noraise: bool) -> GcsResult<()> {
        self.core().send_stop("STP", noraise)
    }

    /// `HLT`: halt axes smoothly. No axes means all.
    fn hlt(&mut self, axes: impl IntoItems, noraise: bool) -> GcsResult<()> {
        let items = axes.into_items();
        let line = crate::core::command_line("HLT", &items.join(" "));
        self.core().send_stop(&line, noraise)
    }

    /// `SVO`: switch servo control.
    fn svo(&mut self, states: impl IntoItemValues<bool>) -> GcsResult<()> {
        self.core().set_items("SVO", states)
    }

    /// `SVO?`
    fn qsvo(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.core().query_bool("SVO?", axes)
    }

    /// `VEL`: closed loop velocity.
    fn vel(&mut self, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core().set_items("VEL", values)
    }

    /// `VEL?`
    fn qvel(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("VEL?", axes)
    }

    /// `ACC`: closed loop acceleration.
    fn acc(&mut self, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core().set_items("ACC", values)
    }

    /// `ACC?`
    fn qacc(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("ACC?", axes)
    }

    /// `DEC`: closed loop deceleration.
    fn dec(&mut self, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core().set_items("DEC", values)
    }

    /// `DEC?`
    fn qdec(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("DEC?", axes)
    }

    /// `FRF`: reference move to the reference switch. No axes means all.
    fn frf(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        let items = axes.into_items();
        self.core()
            .send_reference(&crate::core::command_line("FRF", &items.join(" ")))
    }

    /// `FNL`: reference move to the negative limit.
    fn fnl(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        let items = axes.into_items();
        self.core()
            .send_reference(&crate::core::command_line("FNL", &items.join(" ")))
    }

    /// `FPL`: reference move to the positive limit.
    fn fpl(&mut self, axes: impl IntoItems) -> GcsResult<()> {
        let items = axes.into_items();
        self.core()
            .send_reference(&crate::core::command_line("FPL", &items.join(" ")))
    }

    /// `FRF?`: referencing result per axis.
    fn qfrf(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.core().query_bool("FRF?", axes)
    }

    // ==================== State ====================

    /// `POS?`: current positions.
    fn qpos(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("POS?", axes)
    }

    /// `MOV?`: target positions.
    fn qmov(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("MOV?", axes)
    }

    /// `ONT?`: on-target state.
    fn qont(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        self.core().query_bool("ONT?", axes)
    }

    /// `TMN?`: lower travel range limit.
    fn qtmn(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("TMN?", axes)
    }

    /// `TMX?`: upper travel range limit.
    fn qtmx(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core().query_f64("TMX?", axes)
    }

    /// `PUN?`: position units.
    fn qpun(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.core().query_str("PUN?", axes)
    }

    // ==================== Configuration ====================

    /// `SAI`: rename axes. Clears the cached axis lists.
    fn sai(&mut self, names: impl IntoItemValues<String>) -> GcsResult<()> {
        let result = self.core().set_items("SAI", names);
        self.core().invalidate_axes();
        result
    }

    /// `SAI?`: enabled axes, freshly queried.
    fn qsai(&mut self) -> GcsResult<Vec<String>> {
        self.core().invalidate_axes();
        self.core().axes()
    }

    /// `SAI? ALL`: all axes, freshly queried.
    fn qsai_all(&mut self) -> GcsResult<Vec<String>> {
        self.core().invalidate_axes();
        self.core().allaxes()
    }

    // ==================== Control bytes ====================

    /// `#3`: positions of all axes, answered like `POS?`.
    fn get_pos_status(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        let items = axes.into_items();
        let answer = self.core().messages_mut().read_control(3)?;
        let parsed = parse_item_values(&answer, &items, ValueKind::Float)?;
        parsed
            .into_iter()
            .map(|(axis, v)| {
                v.as_f64()
                    .map(|f| (axis.clone(), f))
                    .ok_or_else(|| GcsError::ParseError(format!("position of {axis}: {v}")))
            })
            .collect()
    }

    /// `#4`: status register per axis.
    fn get_status(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<u64>> {
        let items = axes.into_items();
        let answer = self.core().messages_mut().read_control(4)?;
        parse_item_values(&answer, &items, ValueKind::Str)?
            .into_iter()
            .map(|(axis, v)| Ok((axis, parse_hex_word(&v.to_string())?)))
            .collect()
    }

    /// `#5`: motion state per axis, from a bit word over all axes.
    fn is_moving(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        let items = axes.into_items();
        let word = parse_hex_word(&self.core().control(5)?)?;
        let all = self.allaxes()?;
        bit_coded_items(word, &all, &items)
    }

    /// `#6`: position changed since last `POS?`, per axis.
    fn has_pos_changed(&mut self, axes: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        let items = axes.into_items();
        let word = parse_hex_word(&self.core().control(6)?)?;
        let all = self.allaxes()?;
        bit_coded_items(word, &all, &items)
    }

    /// `#7`: true once the controller accepts new commands.
    fn is_controller_ready(&mut self) -> GcsResult<bool> {
        let answer = self.core().control(7)?;
        match answer.chars().next() {
            Some(READY) => Ok(true),
            Some(NOT_READY) => Ok(false),
            _ => Err(GcsError::InvalidResponse(format!("#7 answered {answer:?}"))),
        }
    }

    /// `#8`: true while a macro runs.
    fn is_running_macro(&mut self) -> GcsResult<bool> {
        Ok(parse_int(&self.core().control(8)?)? != 0)
    }

    /// `#9`: running state per wave generator (`1`, `2`, ...).
    ///
    /// Without generators, reports as many generators as `TWG?` lists, or up
    /// to the highest running one if `TWG?` is unavailable.
    fn is_generator_running(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<bool>> {
        let requested = generators.into_items();
        let word = parse_hex_word(&self.core().control(9)?)?;
        let count = if !requested.is_empty() {
            requested
                .iter()
                .filter_map(|g| g.parse::<usize>().ok())
                .max()
                .unwrap_or(0)
        } else if self.supports("qTWG")? {
            let n = parse_int(&self.core().query_text("TWG?")?)?;
            usize::try_from(n).unwrap_or(0)
        } else {
            (64 - word.leading_zeros() as usize).max(1)
        };
        let all: Vec<String> = (1..=count).map(|i| i.to_string()).collect();
        bit_coded_items(word, &all, &requested)
    }

    /// `#11`: free slots in the dynamic move buffer.
    fn get_dynamic_move_buffer_size(&mut self) -> GcsResult<i64> {
        parse_int(&self.core().control(11)?)
    }

    /// `#24`: stop all axes immediately.
    ///
    /// The control byte is not error checked; the following `ERR?` poll
    /// swallows the stop error if `noraise`.
    fn stop_all(&mut self, noraise: bool) -> GcsResult<()> {
        self.core().messages_mut().send_control(24)?;
        self.core().check_after_control(noraise)
    }

    /// `#27`: abort the controller's system.
    fn system_abort(&mut self) -> GcsResult<()> {
        self.core().messages_mut().send_control(27)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::messages::GcsMessages;
    use crate::test_util::ScriptedTransport;

    /// Common vocabulary without any protocol specific commands.
    pub(crate) struct Bare(pub GcsCore);

    impl GcsCommands for Bare {
        fn core(&mut self) -> &mut GcsCore {
            &mut self.0
        }

        fn core_ref(&self) -> &GcsCore {
            &self.0
        }
    }

    pub(crate) fn core(transport: ScriptedTransport) -> GcsCore {
        let settings = ConnectionSettings {
            timeout_ms: 200,
            ..ConnectionSettings::default()
        };
        GcsCore::new(GcsMessages::new(Box::new(transport), settings).unwrap())
    }

    fn bare(transport: ScriptedTransport) -> Bare {
        Bare(core(transport))
    }

    #[test]
    fn test_mov_and_qpos() {
        let transport = ScriptedTransport::new()
            .expect_silence("MOV X 12.5\n")
            .expect("POS? X\n", "X=12.5000\n");
        let mut dev = bare(transport);
        dev.mov(("X", 12.5)).unwrap();
        assert_eq!(dev.qpos("X").unwrap()["X"], 12.5);
    }

    #[test]
    fn test_mov_arity_is_checked() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let mut dev = bare(transport);
        let err = dev.mov((vec!["1", "2", "3"], vec![1.0, 2.0])).unwrap_err();
        assert!(matches!(err, GcsError::ArityMismatch { items: 3, values: 2 }));
        assert!(log.written().is_empty());
    }

    #[test]
    fn test_svo_sends_booleans() {
        let transport = ScriptedTransport::new()
            .expect_silence("SVO 1 1 2 0\n")
            .expect("SVO?\n", "1=1 \n2=0\n");
        let mut dev = bare(transport);
        dev.svo((["1", "2"], [true, false])).unwrap();
        let servo = dev.qsvo(()).unwrap();
        assert_eq!(servo.into_iter().collect::<Vec<_>>(), [("1".to_string(), true), ("2".to_string(), false)]);
    }

    #[test]
    fn test_reference_swallows_stop() {
        let transport = ScriptedTransport::new().expect_error("FRF X\n", 10);
        let mut dev = bare(transport);
        dev.frf("X").unwrap();
    }

    #[test]
    fn test_hlt_raises_without_noraise() {
        let transport = ScriptedTransport::new()
            .expect_error("HLT 1\n", 10)
            .expect_error("HLT\n", 10);
        let mut dev = bare(transport);
        assert!(dev.hlt("1", false).unwrap_err().is_controller_code(10));
        dev.hlt((), true).unwrap();
    }

    #[test]
    fn test_stop_all_noraise_checks_error() {
        let transport = ScriptedTransport::new()
            .expect_silence("\x18")
            .expect("ERR?\n", "10\n")
            .expect_silence("\x18")
            .expect("ERR?\n", "10\n");
        let log = transport.log();
        let mut dev = bare(transport);
        dev.stop_all(true).unwrap();
        assert!(dev.stop_all(false).unwrap_err().is_stop());
        assert!(log.is_done());
    }

    #[test]
    fn test_is_moving_bits_over_all_axes() {
        let transport = ScriptedTransport::new()
            .expect("\x05", "5\n")
            .expect("SAI? ALL\n", "A \nB \nC\n");
        let mut dev = bare(transport);
        let moving = dev.is_moving(()).unwrap();
        assert_eq!(moving["A"], true);
        assert_eq!(moving["B"], false);
        assert_eq!(moving["C"], true);
    }

    #[test]
    fn test_is_controller_ready() {
        let transport = ScriptedTransport::new()
            .expect("\x07", "\u{b1}\n")
            .expect("\x07", "\u{b0}\n");
        let mut dev = bare(transport);
        assert!(dev.is_controller_ready().unwrap());
        assert!(!dev.is_controller_ready().unwrap());
    }

    #[test]
    fn test_get_status_hex_per_axis() {
        let transport = ScriptedTransport::new().expect("\x04", "1=0x9000 \n2=0x1\n");
        let mut dev = bare(transport);
        let status = dev.get_status(()).unwrap();
        assert_eq!(status["1"], 0x9000);
        assert_eq!(status["2"], 1);
    }

    #[test]
    fn test_generator_bits_without_twg() {
        let transport = ScriptedTransport::new()
            .expect("\x09", "6\n")
            .expect("HLP?\n", "MOV {<AxisID> <Pos>}\n");
        let mut dev = bare(transport);
        let running = dev.is_generator_running(()).unwrap();
        assert_eq!(running.len(), 3);
        assert!(!running["1"]);
        assert!(running["2"]);
        assert!(running["3"]);
    }

    #[test]
    fn test_rbt_clears_axes_and_tolerates_link_loss() {
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect("SAI?\n", "1\n")
            .expect("ERR?\n", "0\n")
            .expect_silence("RBT\n")
            .expect_silence("ERR?\n")
            .expect("SAI?\n", "1 \n2\n")
            .expect("ERR?\n", "0\n");
        let mut dev = bare(transport);
        assert_eq!(dev.axes().unwrap(), ["1"]);
        // the controller never answers ERR? after RBT
        dev.rbt().unwrap();
        assert_eq!(dev.axes().unwrap(), ["1", "2"]);
    }

    #[test]
    fn test_bit_coded_items_rejects_unknown() {
        let all = vec!["1".to_string(), "2".to_string()];
        assert!(bit_coded_items(1, &all, &["3".to_string()]).is_err());
        assert_eq!(bit_coded_items(2, &all, &["2".to_string()]).unwrap()["2"], true);
    }
}

//! Waiting, stopping and start-up helpers on top of the command layers.
//!
//! The wait functions poll until a condition holds or
//! [`WaitOptions::timeout`] elapses, in which case they fail with
//! [`GcsError::Timeout`]. On-target and referenced state come from `ONT?`
//! and `FRF?` on GCS 2.0 controllers and from `STV?` status words on GCS 2.1
//! controllers; [`AxisFlags`] hides the difference.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::commands::GcsCommands;
use crate::device::GcsDevice;
use crate::error::{GcsError, GcsResult};
use crate::gcs2::Gcs2Commands;
use crate::gcs21::{
    AxisStatus, Gcs21Commands, ParamAddress, UnitStatus, PAMID_NEGATIVE_AXIS_LIMIT,
    PAMID_POSITIVE_AXIS_LIMIT,
};
use crate::items::ItemMap;
use crate::schema::MemoryType;

/// Timing of a wait loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// Pause between two polls.
    pub poll_interval: Duration,
    /// Pause before the first poll.
    pub pre_delay: Duration,
    /// Pause after the condition is met.
    pub post_delay: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(100),
            pre_delay: Duration::ZERO,
            post_delay: Duration::ZERO,
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Poll `done` until it returns true.
    fn poll(&self, what: &str, mut done: impl FnMut() -> GcsResult<bool>) -> GcsResult<()> {
        if !self.pre_delay.is_zero() {
            thread::sleep(self.pre_delay);
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            if done()? {
                break;
            }
            if Instant::now() >= deadline {
                warn!("{what} timed out after {:?}", self.timeout);
                return Err(GcsError::Timeout);
            }
            thread::sleep(self.poll_interval);
        }
        if !self.post_delay.is_zero() {
            thread::sleep(self.post_delay);
        }
        Ok(())
    }
}

/// Per-axis state used by the wait helpers.
pub trait AxisFlags: GcsCommands {
    /// On-target state per axis.
    fn on_target_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>>;

    /// Referenced state per axis. Fails if an axis reports an error.
    fn referenced_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>>;

    /// Block until the motion stopped by `#24` has come to rest.
    fn settle_after_stop(&mut self, options: &WaitOptions) -> GcsResult<()>;
}

impl AxisFlags for Gcs2Commands {
    fn on_target_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        self.qont(axes)
    }

    fn referenced_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        self.qfrf(axes)
    }

    fn settle_after_stop(&mut self, options: &WaitOptions) -> GcsResult<()> {
        wait_on_ready(self, options)
    }
}

impl AxisFlags for Gcs21Commands {
    fn on_target_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        self.get_axes_status_flag(axes, AxisStatus::ON_TARGET, true)
    }

    fn referenced_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        self.get_axes_status_flag(axes, AxisStatus::REFERENCED, true)
    }

    fn settle_after_stop(&mut self, options: &WaitOptions) -> GcsResult<()> {
        options.poll("stop", || {
            let moving = self.get_axes_status_flag((), AxisStatus::IN_MOTION, false)?;
            Ok(!moving.values().any(|m| *m))
        })
    }
}

impl AxisFlags for GcsDevice {
    fn on_target_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        match self {
            GcsDevice::Gcs2(dev) => dev.on_target_flags(axes),
            GcsDevice::Gcs21(dev) => dev.on_target_flags(axes),
        }
    }

    fn referenced_flags(&mut self, axes: &[String]) -> GcsResult<ItemMap<bool>> {
        match self {
            GcsDevice::Gcs2(dev) => dev.referenced_flags(axes),
            GcsDevice::Gcs21(dev) => dev.referenced_flags(axes),
        }
    }

    fn settle_after_stop(&mut self, options: &WaitOptions) -> GcsResult<()> {
        match self {
            GcsDevice::Gcs2(dev) => dev.settle_after_stop(options),
            GcsDevice::Gcs21(dev) => dev.settle_after_stop(options),
        }
    }
}

/// `axes`, or every enabled axis if empty.
fn axes_or_all<C: GcsCommands + ?Sized>(dev: &mut C, axes: &[String]) -> GcsResult<Vec<String>> {
    if axes.is_empty() {
        dev.axes()
    } else {
        Ok(axes.to_vec())
    }
}

/// Wait until every axis in `axes` (all if empty) is on target.
pub fn wait_on_target<C: AxisFlags>(dev: &mut C, axes: &[String], options: &WaitOptions) -> GcsResult<()> {
    let axes = axes_or_all(dev, axes)?;
    debug!("Waiting for {axes:?} to reach target");
    options.poll("wait_on_target", || {
        Ok(dev.on_target_flags(&axes)?.values().all(|t| *t))
    })
}

/// Wait until the controller accepts commands again (`#7`).
///
/// Controllers without `#7` return at once.
pub fn wait_on_ready<C: GcsCommands + ?Sized>(dev: &mut C, options: &WaitOptions) -> GcsResult<()> {
    if !dev.supports("IsControllerReady")? {
        debug!("Controller has no ready status, not waiting");
        return Ok(());
    }
    options.poll("wait_on_ready", || dev.is_controller_ready())
}

/// Wait until every axis in `axes` (all if empty) is referenced.
///
/// On timeout all axes are stopped before [`GcsError::Timeout`] is returned.
pub fn wait_on_referencing<C: AxisFlags>(
    dev: &mut C,
    axes: &[String],
    options: &WaitOptions,
) -> GcsResult<()> {
    let axes = axes_or_all(dev, axes)?;
    if axes.is_empty() {
        return Ok(());
    }
    let started = Instant::now();
    wait_on_ready(dev, options)?;
    let remaining = WaitOptions {
        timeout: options.timeout.saturating_sub(started.elapsed()),
        pre_delay: Duration::ZERO,
        ..*options
    };
    let result = remaining.poll("wait_on_referencing", || {
        Ok(dev.referenced_flags(&axes)?.values().all(|r| *r))
    });
    if matches!(result, Err(GcsError::Timeout)) {
        stop_all(dev, options)?;
        return Err(GcsError::Timeout);
    }
    result
}

/// Wait until no macro is running (`#8`).
pub fn wait_on_macro<C: GcsCommands + ?Sized>(dev: &mut C, options: &WaitOptions) -> GcsResult<()> {
    dev.core().require("IsRunningMacro")?;
    options.poll("wait_on_macro", || Ok(!dev.is_running_macro()?))
}

/// Stop all axes with `#24` and wait until they have come to rest.
pub fn stop_all<C: AxisFlags>(dev: &mut C, options: &WaitOptions) -> GcsResult<()> {
    info!("Stopping all axes");
    dev.stop_all(true)?;
    dev.settle_after_stop(options)
}

/// Move each axis to the middle of its travel range, read from the RAM
/// limit parameters `0x121` and `0x122`.
pub fn move_to_middle(dev: &mut Gcs21Commands, axes: &[String]) -> GcsResult<()> {
    let axes = axes_or_all(dev, axes)?;
    let mut targets = Vec::with_capacity(axes.len());
    for axis in axes {
        let limit = |id| ParamAddress::new(MemoryType::RAM).unit(axis.as_str()).function("-").param(id);
        let min = limit_value(dev, &limit(PAMID_NEGATIVE_AXIS_LIMIT))?;
        let max = limit_value(dev, &limit(PAMID_POSITIVE_AXIS_LIMIT))?;
        targets.push((axis, min + (max - min) / 2.0));
    }
    dev.mov(targets)
}

fn limit_value(dev: &mut Gcs21Commands, address: &ParamAddress) -> GcsResult<f64> {
    dev.get_param(address)?
        .and_then(|v| v.as_f64())
        .ok_or_else(|| GcsError::InvalidResponse(format!("no travel limit at {address}")))
}

/// Choices for [`startup_gcs21`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartupOptions {
    /// Leave axes disabled.
    pub skip_enable: bool,
    /// Reference axes that are not referenced yet.
    pub reference: bool,
    /// Reference every axis, referenced or not.
    pub force_reference: bool,
    /// Servo state to set on all axes at the end.
    pub servo: Option<bool>,
    pub wait: WaitOptions,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            skip_enable: false,
            reference: false,
            force_reference: false,
            servo: Some(true),
            wait: WaitOptions::default(),
        }
    }
}

/// Make a GCS 2.1 controller ready to use: stop all axes, enable them,
/// reference them if asked, then set the servo state.
pub fn startup_gcs21(dev: &mut Gcs21Commands, options: &StartupOptions) -> GcsResult<()> {
    info!("Starting up {}", dev.core().controller_name()?);
    stop_and_restore(dev, &options.wait)?;
    if !options.skip_enable && dev.supports("EAX")? {
        for axis in dev.axes()? {
            dev.eax((axis.as_str(), true))?;
        }
    }
    if options.reference || options.force_reference {
        reference_and_wait(dev, options)?;
    }
    if let Some(servo) = options.servo {
        if dev.supports("SVO")? {
            let axes = dev.axes()?;
            let states = vec![servo; axes.len()];
            dev.svo((axes, states))?;
        } else {
            warn!("Controller does not support SVO, servo state left as is");
        }
    }
    Ok(())
}

/// Stop all axes, then enable the axes that were enabled before and restore
/// their control mode.
fn stop_and_restore(dev: &mut Gcs21Commands, options: &WaitOptions) -> GcsResult<()> {
    let before = dev.qstv(())?;
    stop_all(dev, options)?;
    for (unit, status) in before {
        let UnitStatus::Axis(status) = status else {
            continue;
        };
        if status.contains(AxisStatus::ENABLED) {
            dev.eax((unit.as_str(), true))?;
            dev.sam((unit.as_str(), status.control_mode()))?;
        }
    }
    dev.core().messages_mut().check_error()
}

/// Reference axes in open loop, wait, then restore their control mode.
fn reference_and_wait(dev: &mut Gcs21Commands, options: &StartupOptions) -> GcsResult<()> {
    let mut modes = Vec::new();
    for (unit, status) in dev.qstv(())? {
        let Some(status) = status.axis() else {
            continue;
        };
        if options.force_reference || !status.contains(AxisStatus::REFERENCED) {
            dev.sam((unit.as_str(), 0))?;
            dev.frf(unit.as_str())?;
            modes.push((unit, status.control_mode()));
        }
    }
    let axes: Vec<String> = modes.iter().map(|(axis, _)| axis.clone()).collect();
    debug!("Referencing {axes:?}");
    if !axes.is_empty() {
        wait_on_referencing(dev, &axes, &options.wait)?;
    }
    for (axis, mode) in modes {
        dev.sam((axis.as_str(), mode))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::core;
    use crate::gcs21::tests::{gcs21, USG_PAM};
    use crate::test_util::ScriptedTransport;

    const USG_CMD: &str = "#Command Overview:\tCommand\tArguments\tDescription\n\
EAX\t<AxisID> <State>\tEnable axis\n\
FRF\t<AxisID>\tReference move\n\
SAM\t<AxisID> <Mode>\tSet axis mode\n\
STV?\t<Unit>\tGet status value\n\
#END\n";

    fn fast() -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(1),
            ..WaitOptions::default()
        }
    }

    fn gcs2(transport: ScriptedTransport) -> Gcs2Commands {
        Gcs2Commands::new(core(transport))
    }

    #[test]
    fn test_wait_on_target_polls_ont() {
        let transport = ScriptedTransport::new()
            .expect("ONT? X\n", "X=0\n")
            .expect("ONT? X\n", "X=1\n");
        let log = transport.log();
        let mut dev = gcs2(transport);
        wait_on_target(&mut dev, &["X".to_string()], &fast()).unwrap();
        assert!(log.is_done());
    }

    #[test]
    fn test_wait_on_target_times_out() {
        let transport = ScriptedTransport::new()
            .expect("SAI?\n", "X\n")
            .expect("ONT? X\n", "X=0\n");
        let mut dev = gcs2(transport);
        let options = WaitOptions {
            timeout: Duration::ZERO,
            ..fast()
        };
        assert!(matches!(
            wait_on_target(&mut dev, &[], &options),
            Err(GcsError::Timeout)
        ));
    }

    #[test]
    fn test_wait_on_ready_without_ready_status() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", "MOV {<AxisID> <Position>} Set Target Position \nend of help\n");
        let log = transport.log();
        let mut dev = gcs2(transport);
        wait_on_ready(&mut dev, &fast()).unwrap();
        assert!(log.written().iter().all(|w| w != "\x07"));
    }

    #[test]
    fn test_wait_on_macro() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", "#8 Request Macro Running \nend of help\n")
            .expect("\x08", "1\n")
            .expect("\x08", "0\n");
        let log = transport.log();
        let mut dev = gcs2(transport);
        wait_on_macro(&mut dev, &fast()).unwrap();
        assert!(log.is_done());
    }

    #[test]
    fn test_referencing_timeout_stops_axes() {
        let transport = ScriptedTransport::new()
            .expect("HLP?\n", "FRF [{<AxisID>}] Reference Axis \nend of help\n")
            .expect("FRF? X\n", "X=0\n")
            .expect_silence("\x18");
        let log = transport.log();
        let mut dev = gcs2(transport);
        let options = WaitOptions {
            timeout: Duration::ZERO,
            ..fast()
        };
        let err = wait_on_referencing(&mut dev, &["X".to_string()], &options).unwrap_err();
        assert!(matches!(err, GcsError::Timeout));
        assert!(log.written().contains(&"\x18".to_string()));
    }

    #[test]
    fn test_gcs21_wait_on_target_uses_status_words() {
        let transport = ScriptedTransport::new()
            .expect("STV? AXIS_1\n", "AXIS_1=0x2\n")
            .expect("STV? AXIS_1\n", "AXIS_1=0x2002\n");
        let mut dev = gcs21(transport);
        wait_on_target(&mut dev, &["AXIS_1".to_string()], &fast()).unwrap();
    }

    #[test]
    fn test_move_to_middle() {
        let transport = ScriptedTransport::new()
            .expect("SPV? RAM AXIS_1 - 0x121\n", "RAM AXIS_1 - 0x121=-4\n")
            .expect("USG? PAM\n", USG_PAM)
            .expect("SPV? RAM AXIS_1 - 0x122\n", "RAM AXIS_1 - 0x122=6\n")
            .expect_silence("MOV AXIS_1 1\n");
        let log = transport.log();
        let mut dev = gcs21(transport);
        move_to_middle(&mut dev, &["AXIS_1".to_string()]).unwrap();
        assert!(log.is_done());
    }

    #[test]
    fn test_startup_sequence() {
        let transport = ScriptedTransport::new()
            .expect("*IDN?\n", "PI,C-885.M1,0,01.00.00.00\n")
            .expect("STV?\n", "AXIS_1=0x22 \nSYS=0x0\n")
            .expect_silence("\x18")
            .expect("STV?\n", "AXIS_1=0x0 \nSYS=0x0\n")
            .expect_silence("EAX AXIS_1 1\n")
            .expect_silence("SAM AXIS_1 0x2\n")
            .expect("USG? CMD\n", USG_CMD)
            .expect("SAI?\n", "AXIS_1\n")
            .expect_silence("EAX AXIS_1 1\n")
            .expect("STV?\n", "AXIS_1=0x22 \nSYS=0x0\n")
            .expect_silence("SAM AXIS_1 0x0\n")
            .expect_silence("FRF AXIS_1\n")
            .expect("STV? AXIS_1\n", "AXIS_1=0x20022\n")
            .expect("STV? AXIS_1\n", "AXIS_1=0x1022\n")
            .expect_silence("SAM AXIS_1 0x2\n");
        let log = transport.log();
        let mut dev = gcs21(transport);
        let options = StartupOptions {
            reference: true,
            servo: None,
            wait: fast(),
            ..StartupOptions::default()
        };
        startup_gcs21(&mut dev, &options).unwrap();
        assert!(log.is_done());
        assert_eq!(log.written().last().map(String::as_str), Some("ERR?\n"));
    }
}

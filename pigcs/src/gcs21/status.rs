//! Status words of GCS 2.1 container units (`STV?`).

use bitflags::bitflags;

use super::Gcs21Commands;
use crate::error::{ControllerError, GcsError, GcsResult};
use crate::items::{IntoItems, ItemMap};
use crate::values::parse_int;

bitflags! {
    /// Status word of an axis container unit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AxisStatus: u32 {
        /// Axis error
        const ERROR = 1 << 0;
        /// Axis enabled (`EAX?`)
        const ENABLED = 1 << 1;
        /// Fault reaction active (`FRA`)
        const FAULT = 1 << 2;
        /// Closed loop
        const CLOSED_LOOP = 1 << 3;
        /// Control mode bits 4..11 (`MOP`)
        const MOP = 0xFF << 4;
        /// Referenced (`FRF?`)
        const REFERENCED = 1 << 12;
        /// On target (`ONT?`)
        const ON_TARGET = 1 << 13;
        /// Internal process running (`IPR`)
        const PROCESS_RUNNING = 1 << 14;
        /// Positive limit switch active
        const POSITIVE_LIMIT = 1 << 15;
        /// Negative limit switch active
        const NEGATIVE_LIMIT = 1 << 16;
        /// Reference move running
        const REFERENCING = 1 << 17;
        /// In motion
        const IN_MOTION = 1 << 18;
    }
}

impl AxisStatus {
    /// Control mode (`MOP`) as set with `SAM`.
    pub fn control_mode(self) -> u32 {
        (self.bits() >> 4) & 0xFF
    }
}

bitflags! {
    /// Status word of the system container unit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SystemStatus: u32 {
        const COMMAND_ERROR = 1 << 0;
        const CRITICAL_ERROR = 1 << 1;
        const INFORMATION = 1 << 2;
        const WARNING = 1 << 3;
    }
}

/// Decoded status word of one container unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Container unit whose name contains `AXIS`
    Axis(AxisStatus),
    /// Container unit whose name contains `SYS`
    System(SystemStatus),
    /// Any other container unit
    Raw(u32),
}

impl UnitStatus {
    /// Decode `word` by the kind of container unit `unit` names.
    pub fn decode(unit: &str, word: u32) -> Self {
        if unit.contains("AXIS") {
            UnitStatus::Axis(AxisStatus::from_bits_retain(word))
        } else if unit.contains("SYS") {
            UnitStatus::System(SystemStatus::from_bits_retain(word))
        } else {
            UnitStatus::Raw(word)
        }
    }

    /// The undecoded status word.
    pub fn word(self) -> u32 {
        match self {
            UnitStatus::Axis(s) => s.bits(),
            UnitStatus::System(s) => s.bits(),
            UnitStatus::Raw(w) => w,
        }
    }

    pub fn axis(self) -> Option<AxisStatus> {
        match self {
            UnitStatus::Axis(s) => Some(s),
            _ => None,
        }
    }
}

impl Gcs21Commands {
    /// `STV?`: status per container unit. No units means all.
    pub fn qstv(&mut self, units: impl IntoItems) -> GcsResult<ItemMap<UnitStatus>> {
        self.core
            .query_str("STV?", units)?
            .into_iter()
            .map(|(unit, word)| {
                let word = u32::try_from(parse_int(&word)?)
                    .map_err(|_| GcsError::ParseError(format!("status word {word:?} of {unit}")))?;
                let status = UnitStatus::decode(&unit, word);
                Ok((unit, status))
            })
            .collect()
    }

    /// Read one status flag per axis from `STV?`.
    ///
    /// With `raise_on_axis_error`, an axis with its error bit set fails the
    /// call with the pending controller error.
    pub fn get_axes_status_flag(
        &mut self,
        axes: impl IntoItems,
        flag: AxisStatus,
        raise_on_axis_error: bool,
    ) -> GcsResult<ItemMap<bool>> {
        let mut flags = ItemMap::new();
        for (unit, status) in self.qstv(axes)? {
            let Some(status) = status.axis() else {
                continue;
            };
            if raise_on_axis_error && status.contains(AxisStatus::ERROR) {
                let code = self.core.messages_mut().query_error()?;
                if code != 0 {
                    return Err(ControllerError::from_code(self.core.syntax(), code)?.into());
                }
                return Err(GcsError::InvalidResponse(format!(
                    "{unit} reports an axis error"
                )));
            }
            flags.insert(unit, status.contains(flag));
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::gcs21;
    use super::*;
    use crate::test_util::ScriptedTransport;

    #[test]
    fn test_decode_axis_word() {
        let status = UnitStatus::decode("AXIS_1", 0x0000_3022);
        let axis = status.axis().unwrap();
        assert!(axis.contains(AxisStatus::ENABLED));
        assert!(axis.contains(AxisStatus::REFERENCED));
        assert!(axis.contains(AxisStatus::ON_TARGET));
        assert!(!axis.contains(AxisStatus::IN_MOTION));
        assert_eq!(axis.control_mode(), 2);
        assert_eq!(status.word(), 0x3022);
    }

    #[test]
    fn test_decode_system_and_other_units() {
        let sys = UnitStatus::decode("SYS", 0b1001);
        assert_eq!(
            sys,
            UnitStatus::System(SystemStatus::COMMAND_ERROR | SystemStatus::WARNING)
        );
        assert_eq!(UnitStatus::decode("IN_1", 7), UnitStatus::Raw(7));
    }

    #[test]
    fn test_qstv_and_flag() {
        let transport = ScriptedTransport::new()
            .expect("STV?\n", "AXIS_1=0x3022 \nAXIS_2=0x2 \nSYS=0x0\n")
            .expect("STV? AXIS_1 AXIS_2\n", "AXIS_1=0x3022 \nAXIS_2=0x2\n");
        let mut dev = gcs21(transport);
        let all = dev.qstv(()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all["SYS"], UnitStatus::System(SystemStatus::empty()));
        let referenced = dev
            .get_axes_status_flag(["AXIS_1", "AXIS_2"], AxisStatus::REFERENCED, true)
            .unwrap();
        assert!(referenced["AXIS_1"]);
        assert!(!referenced["AXIS_2"]);
    }

    #[test]
    fn test_axis_error_raises_controller_error() {
        let transport = ScriptedTransport::new()
            .auto_err(false)
            .expect("STV? AXIS_1\n", "AXIS_1=0x1\n")
            .expect("ERR?\n", "0\n")
            .expect("ERR?\n", "21448\n");
        let mut dev = gcs21(transport);
        let err = dev
            .get_axes_status_flag("AXIS_1", AxisStatus::ON_TARGET, true)
            .unwrap_err();
        assert_eq!(err.controller_code(), Some(21448));
    }
}

//! GCS 2.0 error codes.
//!
//! GCS 2.0 controllers report errors as small signed integers. Positive
//! codes come from the controller firmware, negative codes are raised on the
//! host side (communication and library errors). The table below maps each
//! known code to its symbolic name and a description.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::ErrorInfo;

/// A GCS 2.0 controller or host error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gcs2Error(pub i32);

impl Gcs2Error {
    /// No error.
    pub const E0_NO_ERROR: i32 = 0;
    /// Parameter syntax error.
    pub const E1_PARAM_SYNTAX: i32 = 1;
    /// Unknown command.
    pub const E2_UNKNOWN_COMMAND: i32 = 2;
    /// Position out of limits.
    pub const E7_POS_OUT_OF_LIMITS: i32 = 7;
    /// Controller was stopped by command.
    pub const E10_STOP: i32 = 10;
    /// Parameter out of range.
    pub const E17_PARAM_OUT_OF_RANGE: i32 = 17;
    /// Unknown parameter.
    pub const E54_UNKNOWN_PARAMETER: i32 = 54;
    /// Host side: communication error.
    pub const E1_COM_ERROR: i32 = -1;
    /// Host side: timeout while receiving.
    pub const E7_TIMEOUT: i32 = -7;
    /// Host side: unexpected response.
    pub const UNEXPECTED_RESPONSE: i32 = -1004;
    /// Host side: invalid parameter id in `SPA`.
    pub const INVALID_SPA_CMD_ID: i32 = -1020;

    /// Wrap a raw code.
    pub fn new(code: i32) -> Self {
        Self(code)
    }

    /// True if the controller reported "stopped by command".
    pub fn is_stop(&self) -> bool {
        self.0 == Self::E10_STOP
    }
}

impl ErrorInfo for Gcs2Error {
    fn code(&self) -> i64 {
        i64::from(self.0)
    }

    fn name(&self) -> String {
        match lookup(self.0) {
            Some((name, _)) => name.to_string(),
            None => format!("E{}_UNKNOWN", self.0),
        }
    }

    fn message(&self) -> String {
        match lookup(self.0) {
            Some((_, message)) => message.to_string(),
            None => format!("Unknown error ({})", self.0),
        }
    }
}

fn lookup(code: i32) -> Option<(&'static str, &'static str)> {
    GCS2_ERROR_INDEX.get(&code).copied()
}

static GCS2_ERROR_INDEX: Lazy<HashMap<i32, (&'static str, &'static str)>> = Lazy::new(|| {
    GCS2_ERRORS
        .iter()
        .map(|&(code, name, message)| (code, (name, message)))
        .collect()
});

/// `(code, name, description)` for every known GCS 2.0 error.
const GCS2_ERRORS: &[(i32, &str, &str)] = &[
    (0, "PI_CNTR_NO_ERROR", "No error"),
    (1, "PI_CNTR_PARAM_SYNTAX", "Parameter syntax error"),
    (2, "PI_CNTR_UNKNOWN_COMMAND", "Unknown command"),
    (3, "PI_CNTR_COMMAND_TOO_LONG", "Command length out of limits or command buffer overrun"),
    (4, "PI_CNTR_SCAN_ERROR", "Error while scanning"),
    (5, "PI_CNTR_MOVE_WITHOUT_REF_OR_NO_SERVO", "Unallowable move attempted on unreferenced axis, or move attempted with servo off"),
    (6, "PI_CNTR_INVALID_SGA_PARAM", "Parameter for SGA not valid"),
    (7, "PI_CNTR_POS_OUT_OF_LIMITS", "Position out of limits"),
    (8, "PI_CNTR_VEL_OUT_OF_LIMITS", "Velocity out of limits"),
    (9, "PI_CNTR_SET_PIVOT_NOT_POSSIBLE", "Attempt to set pivot point while U,V and W not all 0"),
    (10, "PI_CNTR_STOP", "Controller was stopped by command"),
    (11, "PI_CNTR_SST_OR_SCAN_RANGE", "Parameter for SST or for one of the embedded scan algorithms out of range"),
    (12, "PI_CNTR_INVALID_SCAN_AXES", "Invalid axis combination for fast scan"),
    (13, "PI_CNTR_INVALID_NAV_PARAM", "Parameter for NAV out of range"),
    (14, "PI_CNTR_INVALID_ANALOG_INPUT", "Invalid analog channel"),
    (15, "PI_CNTR_INVALID_AXIS_IDENTIFIER", "Invalid axis identifier"),
    (16, "PI_CNTR_INVALID_STAGE_NAME", "Unknown stage name"),
    (17, "PI_CNTR_PARAM_OUT_OF_RANGE", "Parameter out of range"),
    (18, "PI_CNTR_INVALID_MACRO_NAME", "Invalid macro name"),
    (19, "PI_CNTR_MACRO_RECORD", "Error while recording macro"),
    (20, "PI_CNTR_MACRO_NOT_FOUND", "Macro not found"),
    (21, "PI_CNTR_AXIS_HAS_NO_BRAKE", "Axis has no brake"),
    (22, "PI_CNTR_DOUBLE_AXIS", "Axis identifier specified more than once"),
    (23, "PI_CNTR_ILLEGAL_AXIS", "Illegal axis"),
    (24, "PI_CNTR_PARAM_NR", "Incorrect number of parameters"),
    (25, "PI_CNTR_INVALID_REAL_NR", "Invalid floating point number"),
    (26, "PI_CNTR_MISSING_PARAM", "Parameter missing"),
    (27, "PI_CNTR_SOFT_LIMIT_OUT_OF_RANGE", "Soft limit out of range"),
    (28, "PI_CNTR_NO_MANUAL_PAD", "No manual pad found"),
    (29, "PI_CNTR_NO_JUMP", "No more step-response values"),
    (30, "PI_CNTR_INVALID_JUMP", "No step-response values recorded"),
    (31, "PI_CNTR_AXIS_HAS_NO_REFERENCE", "Axis has no reference sensor"),
    (32, "PI_CNTR_STAGE_HAS_NO_LIM_SWITCH", "Axis has no limit switch"),
    (33, "PI_CNTR_NO_RELAY_CARD", "No relay card installed"),
    (34, "PI_CNTR_CMD_NOT_ALLOWED_FOR_STAGE", "Command not allowed for selected stage(s)"),
    (35, "PI_CNTR_NO_DIGITAL_INPUT", "No digital input installed"),
    (36, "PI_CNTR_NO_DIGITAL_OUTPUT", "No digital output configured"),
    (37, "PI_CNTR_NO_MCM", "No more MCM responses"),
    (38, "PI_CNTR_INVALID_MCM", "No MCM values recorded"),
    (39, "PI_CNTR_INVALID_CNTR_NUMBER", "Controller number invalid"),
    (40, "PI_CNTR_NO_JOYSTICK_CONNECTED", "No joystick configured"),
    (41, "PI_CNTR_INVALID_EGE_AXIS", "Invalid axis for electronic gearing, axis cannot be slave"),
    (42, "PI_CNTR_SLAVE_POSITION_OUT_OF_RANGE", "Position of slave axis is out of range"),
    (43, "PI_CNTR_COMMAND_EGE_SLAVE", "Slave axis cannot be commanded directly when electronic gearing is enabled"),
    (44, "PI_CNTR_JOYSTICK_CALIBRATION_FAILED", "Calibration of joystick failed"),
    (45, "PI_CNTR_REFERENCING_FAILED", "Referencing failed"),
    (46, "PI_CNTR_OPM_MISSING", "OPM (Optical Power Meter) missing"),
    (47, "PI_CNTR_OPM_NOT_INITIALIZED", "OPM (Optical Power Meter) not initialized or cannot be initialized"),
    (48, "PI_CNTR_OPM_COM_ERROR", "OPM (Optical Power Meter) communication error"),
    (49, "PI_CNTR_MOVE_TO_LIMIT_SWITCH_FAILED", "Move to limit switch failed"),
    (50, "PI_CNTR_REF_WITH_REF_DISABLED", "Attempt to reference axis with referencing disabled"),
    (51, "PI_CNTR_AXIS_UNDER_JOYSTICK_CONTROL", "Selected axis is controlled by joystick"),
    (52, "PI_CNTR_COMMUNICATION_ERROR", "Controller detected communication error"),
    (53, "PI_CNTR_DYNAMIC_MOVE_IN_PROCESS", "MOV! motion still in progress"),
    (54, "PI_CNTR_UNKNOWN_PARAMETER", "Unknown parameter"),
    (55, "PI_CNTR_NO_REP_RECORDED", "No commands were recorded with REP"),
    (56, "PI_CNTR_INVALID_PASSWORD", "Password invalid"),
    (57, "PI_CNTR_INVALID_RECORDER_CHAN", "Data record table does not exist"),
    (58, "PI_CNTR_INVALID_RECORDER_SRC_OPT", "Source does not exist, number too low or too high"),
    (59, "PI_CNTR_INVALID_RECORDER_SRC_CHAN", "Source record table number too low or too high"),
    (60, "PI_CNTR_PARAM_PROTECTION", "Protected Param: current Command Level (CCL) too low"),
    (61, "PI_CNTR_AUTOZERO_RUNNING", "Command execution not possible while autozero is running"),
    (62, "PI_CNTR_NO_LINEAR_AXIS", "Autozero requires at least one linear axis"),
    (63, "PI_CNTR_INIT_RUNNING", "Initialization still in progress"),
    (64, "PI_CNTR_READ_ONLY_PARAMETER", "Parameter is read-only"),
    (65, "PI_CNTR_PAM_NOT_FOUND", "Parameter not found in non-volatile memory"),
    (66, "PI_CNTR_VOL_OUT_OF_LIMITS", "Voltage out of limits"),
    (67, "PI_CNTR_WAVE_TOO_LARGE", "Not enough memory available for requested wave curve"),
    (68, "PI_CNTR_NOT_ENOUGH_DDL_MEMORY", "Not enough memory available for DDL table, DDL cannot be started"),
    (69, "PI_CNTR_DDL_TIME_DELAY_TOO_LARGE", "Time delay larger than DDL table, DDL cannot be started"),
    (70, "PI_CNTR_DIFFERENT_ARRAY_LENGTH", "The requested arrays have different lengths, query them separately"),
    (71, "PI_CNTR_GEN_SINGLE_MODE_RESTART", "Attempt to restart the generator while it is running in single step mode"),
    (72, "PI_CNTR_ANALOG_TARGET_ACTIVE", "Motion commands and wave generator activation are not allowed when analog target is active"),
    (73, "PI_CNTR_WAVE_GENERATOR_ACTIVE", "Motion commands are not allowed when wave generator is active"),
    (74, "PI_CNTR_AUTOZERO_DISABLED", "No sensor channel or no piezo channel connected to selected axis"),
    (75, "PI_CNTR_NO_WAVE_SELECTED", "Generator started (WGO) without having selected a wave table (WSL)"),
    (76, "PI_CNTR_IF_BUFFER_OVERRUN", "Interface buffer did overrun and command couldn't be received correctly"),
    (77, "PI_CNTR_NOT_ENOUGH_RECORDED_DATA", "Data record table does not hold enough recorded data"),
    (78, "PI_CNTR_TABLE_DEACTIVATED", "Data record table is not configured for recording"),
    (79, "PI_CNTR_OPENLOOP_VALUE_SET_WHEN_SERVO_ON", "Open-loop commands are not allowed when servo is on"),
    (80, "PI_CNTR_RAM_ERROR", "Hardware error affecting RAM"),
    (81, "PI_CNTR_MACRO_UNKNOWN_COMMAND", "Not macro command"),
    (82, "PI_CNTR_MACRO_PC_ERROR", "Macro counter out of range"),
    (83, "PI_CNTR_JOYSTICK_ACTIVE", "Joystick is active"),
    (84, "PI_CNTR_MOTOR_IS_OFF", "Motor is off"),
    (85, "PI_CNTR_ONLY_IN_MACRO", "Macro-only command"),
    (86, "PI_CNTR_JOYSTICK_UNKNOWN_AXIS", "Invalid joystick axis"),
    (87, "PI_CNTR_JOYSTICK_UNKNOWN_ID", "Joystick unknown"),
    (88, "PI_CNTR_REF_MODE_IS_SET", "Move without referenced stage"),
    (89, "PI_CNTR_NOT_ALLOWED_IN_CURRENT_MOTION_MODE", "Command not allowed in current motion mode"),
    (90, "PI_CNTR_DIO_AND_TRACING_NOT_POSSIBLE", "No tracing possible while digital IOs are used on this HW revision"),
    (91, "PI_CNTR_COLLISION", "Move not possible, would cause collision"),
    (92, "PI_CNTR_SLAVE_NOT_FAST_ENOUGH", "Stage is not capable of following the master"),
    (93, "PI_CNTR_CMD_NOT_ALLOWED_WHILE_AXIS_IN_MOTION", "This command is not allowed while the affected axis or its master is in motion"),
    (94, "PI_CNTR_OPEN_LOOP_JOYSTICK_ENABLED", "Servo cannot be switched on when open-loop joystick control is enabled"),
    (95, "PI_CNTR_INVALID_SERVO_STATE_FOR_PARAMETER", "This parameter cannot be changed in current servo mode"),
    (96, "PI_CNTR_UNKNOWN_STAGE_NAME", "Unknown stage name"),
    (100, "PI_LABVIEW_ERROR", "PI LabVIEW driver reports error"),
    (200, "PI_CNTR_NO_AXIS", "No stage connected to axis"),
    (201, "PI_CNTR_NO_AXIS_PARAM_FILE", "File with axis parameters not found"),
    (202, "PI_CNTR_INVALID_AXIS_PARAM_FILE", "Invalid axis parameter file"),
    (203, "PI_CNTR_NO_AXIS_PARAM_BACKUP", "Backup file with axis parameters not found"),
    (204, "PI_CNTR_RESERVED_204", "PI internal error code 204"),
    (205, "PI_CNTR_SMO_WITH_SERVO_ON", "SMO with servo on"),
    (206, "PI_CNTR_UUDECODE_INCOMPLETE_HEADER", "uudecode: incomplete header"),
    (207, "PI_CNTR_UUDECODE_NOTHING_TO_DECODE", "uudecode: nothing to decode"),
    (208, "PI_CNTR_UUDECODE_ILLEGAL_FORMAT", "uudecode: illegal UUE format"),
    (209, "PI_CNTR_CRC32_ERROR", "CRC32 error"),
    (210, "PI_CNTR_ILLEGAL_FILENAME", "Illegal file name (must be 8-0 format)"),
    (211, "PI_CNTR_FILE_NOT_FOUND", "File not found on controller"),
    (212, "PI_CNTR_FILE_WRITE_ERROR", "Error writing file on controller"),
    (213, "PI_CNTR_DTR_HINDERS_VELOCITY_CHANGE", "VEL command not allowed in DTR command mode"),
    (214, "PI_CNTR_POSITION_UNKNOWN", "Position calculations failed"),
    (215, "PI_CNTR_CONN_POSSIBLY_BROKEN", "The connection between controller and stage may be broken"),
    (216, "PI_CNTR_ON_LIMIT_SWITCH", "The connected stage has driven into a limit switch, some controllers need CLR to resume operation"),
    (217, "PI_CNTR_UNEXPECTED_STRUT_STOP", "Strut test command failed because of an unexpected strut stop"),
    (218, "PI_CNTR_POSITION_BASED_ON_ESTIMATION", "While MOV! is running position can only be estimated"),
    (219, "PI_CNTR_POSITION_BASED_ON_INTERPOLATION", "Position was calculated during MOV motion"),
    (230, "PI_CNTR_INVALID_HANDLE", "Invalid handle"),
    (231, "PI_CNTR_NO_BIOS_FOUND", "No bios found"),
    (232, "PI_CNTR_SAVE_SYS_CFG_FAILED", "Save system configuration failed"),
    (233, "PI_CNTR_LOAD_SYS_CFG_FAILED", "Load system configuration failed"),
    (301, "PI_CNTR_SEND_BUFFER_OVERFLOW", "Send buffer overflow"),
    (302, "PI_CNTR_VOLTAGE_OUT_OF_LIMITS", "Voltage out of limits"),
    (303, "PI_CNTR_OPEN_LOOP_MOTION_SET_WHEN_SERVO_ON", "Open-loop motion attempted when servo ON"),
    (304, "PI_CNTR_RECEIVING_BUFFER_OVERFLOW", "Received command is too long"),
    (305, "PI_CNTR_EEPROM_ERROR", "Error while reading/writing EEPROM"),
    (306, "PI_CNTR_I2C_ERROR", "Error on I2C bus"),
    (307, "PI_CNTR_RECEIVING_TIMEOUT", "Timeout while receiving command"),
    (308, "PI_CNTR_TIMEOUT", "A lengthy operation has not finished in the expected time"),
    (309, "PI_CNTR_MACRO_OUT_OF_SPACE", "Insufficient space to store macro"),
    (310, "PI_CNTR_EUI_OLDVERSION_CFGDATA", "Configuration data has old version number"),
    (311, "PI_CNTR_EUI_INVALIDCFGDATA", "Invalid configuration data"),
    (333, "PI_CNTR_HARDWARE_ERROR", "Internal hardware error"),
    (400, "PI_CNTR_WAV_INDEX_ERROR", "Wave generator index error"),
    (401, "PI_CNTR_WAV_NOT_DEFINED", "Wave table not defined"),
    (402, "PI_CNTR_WAV_TYPE_NOT_SUPPORTED", "Wave type not supported"),
    (403, "PI_CNTR_WAV_LENGTH_EXCEEDS_LIMIT", "Wave length exceeds limit"),
    (404, "PI_CNTR_WAV_PARAMETER_NR", "Wave parameter number error"),
    (405, "PI_CNTR_WAV_PARAMETER_OUT_OF_LIMIT", "Wave parameter out of range"),
    (406, "PI_CNTR_WGO_BIT_NOT_SUPPORTED", "WGO command bit not supported"),
    (500, "PI_CNTR_EMERGENCY_STOP_BUTTON_ACTIVATED", "The \"red knob\" is still set and disables system"),
    (501, "PI_CNTR_EMERGENCY_STOP_BUTTON_WAS_ACTIVATED", "The \"red knob\" was activated and still disables system, reanimation required"),
    (502, "PI_CNTR_REDUNDANCY_LIMIT_EXCEEDED", "Position consistency check failed"),
    (503, "PI_CNTR_COLLISION_SWITCH_ACTIVATED", "Hardware collision sensor(s) are activated"),
    (504, "PI_CNTR_FOLLOWING_ERROR", "Strut following error occurred, e.g. caused by overload or encoder failure"),
    (555, "PI_CNTR_UNKNOWN_ERROR", "BasMac: unknown controller error"),
    (601, "PI_CNTR_NOT_ENOUGH_MEMORY", "Not enough memory"),
    (602, "PI_CNTR_HW_VOLTAGE_ERROR", "Hardware voltage error"),
    (603, "PI_CNTR_HW_TEMPERATURE_ERROR", "Hardware temperature out of range"),
    (1000, "PI_CNTR_TOO_MANY_NESTED_MACROS", "Too many nested macros"),
    (1001, "PI_CNTR_MACRO_ALREADY_DEFINED", "Macro already defined"),
    (1002, "PI_CNTR_NO_MACRO_RECORDING", "Macro recording not activated"),
    (1003, "PI_CNTR_INVALID_MAC_PARAM", "Invalid parameter for MAC"),
    (1004, "PI_CNTR_MACRO_DELETE_ERROR", "Deleting macro failed"),
    (1005, "PI_CNTR_CONTROLLER_BUSY", "Controller is busy with some lengthy operation"),
    (1006, "PI_CNTR_INVALID_IDENTIFIER", "Invalid identifier (invalid special characters)"),
    (1007, "PI_CNTR_UNKNOWN_VARIABLE_OR_ARGUMENT", "Variable or argument not defined"),
    (1008, "PI_CNTR_RUNNING_MACRO", "Controller is (already) running a macro"),
    (1009, "PI_CNTR_MACRO_INVALID_OPERATOR", "Invalid or missing operator for condition"),
    (1063, "PI_CNTR_EXT_PROFILE_UNALLOWED_CMD", "User profile mode: command not allowed"),
    (-1, "COM_ERROR", "Error during com operation (could not be specified)"),
    (-2, "SEND_ERROR", "Error while sending data"),
    (-3, "REC_ERROR", "Error while receiving data"),
    (-4, "NOT_CONNECTED_ERROR", "Not connected (no port with given ID open)"),
    (-5, "COM_BUFFER_OVERFLOW", "Buffer overflow"),
    (-6, "CONNECTION_FAILED", "Error while opening port"),
    (-7, "COM_TIMEOUT", "Timeout error"),
    (-8, "COM_MULTILINE_RESPONSE", "There are more lines waiting in buffer"),
    (-9, "COM_INVALID_ID", "There is no interface or DLL handle with the given ID"),
    (-10, "COM_NOTIFY_EVENT_ERROR", "Event/message for notification could not be opened"),
    (-11, "COM_NOT_IMPLEMENTED", "Function not supported by this interface type"),
    (-12, "COM_ECHO_ERROR", "Error while sending \"echoed\" data"),
    (-13, "COM_GPIB_EDVR", "IEEE488: System error"),
    (-14, "COM_GPIB_ECIC", "IEEE488: Function requires GPIB board to be CIC"),
    (-15, "COM_GPIB_ENOL", "IEEE488: Write function detected no listeners"),
    (-16, "COM_GPIB_EADR", "IEEE488: Interface board not addressed correctly"),
    (-17, "COM_GPIB_EARG", "IEEE488: Invalid argument to function call"),
    (-18, "COM_GPIB_ESAC", "IEEE488: Function requires GPIB board to be SAC"),
    (-19, "COM_GPIB_EABO", "IEEE488: I/O operation aborted"),
    (-20, "COM_GPIB_ENEB", "IEEE488: Interface board not found"),
    (-9999, "COM_PORT_NOT_EXIST", "COM port does not exist"),
    (-1001, "PI_UNKNOWN_AXIS_IDENTIFIER", "Unknown axis identifier"),
    (-1002, "PI_NR_NAV_OUT_OF_RANGE", "Number for NAV out of range, must be in [1,10000]"),
    (-1003, "PI_INVALID_SGA", "Invalid value for SGA, must be one of 1, 10, 100, 1000"),
    (-1004, "PI_UNEXPECTED_RESPONSE", "Controller sent unexpected response"),
    (-1005, "PI_NO_MANUAL_PAD", "No manual control pad installed, calls to SMA and related commands are not allowed"),
    (-1006, "PI_INVALID_MANUAL_PAD_KNOB", "Invalid number for manual control pad knob"),
    (-1007, "PI_INVALID_MANUAL_PAD_AXIS", "Axis not currently controlled by a manual control pad"),
    (-1008, "PI_CONTROLLER_BUSY", "Controller is busy with some lengthy operation"),
    (-1009, "PI_THREAD_ERROR", "Internal error, could not start thread"),
    (-1010, "PI_IN_MACRO_MODE", "Controller is (already) in macro mode, command not valid in macro mode"),
    (-1011, "PI_NOT_IN_MACRO_MODE", "Controller not in macro mode, command not valid unless macro mode active"),
    (-1012, "PI_MACRO_FILE_ERROR", "Could not open file to write or read macro"),
    (-1013, "PI_NO_MACRO_OR_EMPTY", "No macro with given name on controller, or macro is empty"),
    (-1014, "PI_MACRO_EDITOR_ERROR", "Internal error in macro editor"),
    (-1015, "PI_INVALID_ARGUMENT", "One or more arguments given to function is invalid"),
    (-1016, "PI_AXIS_ALREADY_EXISTS", "Axis identifier is already in use by a connected stage"),
    (-1017, "PI_INVALID_AXIS_IDENTIFIER", "Invalid axis identifier"),
    (-1018, "PI_COM_ARRAY_ERROR", "Could not access array data in COM server"),
    (-1019, "PI_COM_ARRAY_RANGE_ERROR", "Range of array does not fit the number of parameters"),
    (-1020, "PI_INVALID_SPA_CMD_ID", "Invalid parameter ID given to SPA or SPA?"),
    (-1021, "PI_NR_AVG_OUT_OF_RANGE", "Number for AVG out of range, must be > 0"),
    (-1022, "PI_WAV_SAMPLES_OUT_OF_RANGE", "Incorrect number of samples given to WAV"),
    (-1023, "PI_WAV_FAILED", "Generation of wave failed"),
    (-1024, "PI_MOTION_ERROR", "Motion error: position error too large, servo is switched off automatically"),
    (-1025, "PI_RUNNING_MACRO", "Controller is (already) running a macro"),
    (-1049, "PI_PARAMETER_DB_AND_HPA_MISMATCH_LOOSE", "Parameter database and HPA? answer do not match"),
    (-1050, "PI_PARAMETER_DB_AND_HPA_MISMATCH_STRICT", "Parameter database and HPA? answer do not match, strict"),
    (-1051, "PI_PARAMETER_DB_AND_HPA_MISMATCH", "Parameter database and HPA? answer do not match"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_translate() {
        let err = Gcs2Error::new(Gcs2Error::E10_STOP);
        assert!(err.is_stop());
        assert_eq!(err.name(), "PI_CNTR_STOP");
        assert_eq!(err.message(), "Controller was stopped by command");

        assert_eq!(
            Gcs2Error::new(Gcs2Error::UNEXPECTED_RESPONSE).name(),
            "PI_UNEXPECTED_RESPONSE"
        );
        assert_eq!(Gcs2Error::new(Gcs2Error::E7_TIMEOUT).name(), "COM_TIMEOUT");
    }

    #[test]
    fn test_unknown_code_has_fallback() {
        let err = Gcs2Error::new(31337);
        assert_eq!(err.message(), "Unknown error (31337)");
        assert_eq!(err.name(), "E31337_UNKNOWN");
        assert_eq!(err.module_id(), None);
    }

    #[test]
    fn test_table_has_unique_codes() {
        let mut seen = std::collections::HashSet::new();
        for (code, _, _) in GCS2_ERRORS {
            assert!(seen.insert(*code), "duplicate code {code}");
        }
    }
}

//! Command registry.
//!
//! Every command the crate exposes is listed once with its wire form and the
//! shape of its answer. Method names follow the controller manuals:
//!
//! - set commands use the mnemonic (`MOV`),
//! - queries carry a `q` prefix (`qMOV` is `MOV?`),
//! - sub-commands are joined with `_` (`MAC_BEG` is `MAC BEG`),
//! - control bytes have descriptive names (`IsMoving` is `#5`).
//!
//! The Rust methods of [`GcsCommands`](crate::GcsCommands) are the same
//! names in snake case (`qpos`, `mac_beg`, `is_moving`).
//!
//! The registry backs [`supports`](crate::GcsCommands::supports) and the
//! generic dispatch of the command line tool.

use crate::error::Syntax;

/// How a command answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// No answer; only `ERR?` is checked
    None,
    /// Free text, possibly multi-line
    Line,
    /// `item=value` lines
    ItemValues,
    /// `item param=value` lines
    Nested,
    /// `#Header:` / `#END` block
    Block,
    /// Bulk data with a `# END_HEADER` preamble
    GcsData,
    /// Single unterminated byte with a one-line answer
    Control,
}

/// Which protocol variants implement a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Both GCS 2.0 and GCS 2.1
    Common,
    /// GCS 2.0 only
    Gcs2,
    /// GCS 2.1 only
    Gcs21,
}

/// One registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    /// Method name (`qPOS`)
    pub name: &'static str,
    /// Text sent on the wire before arguments (`POS?`)
    pub wire: &'static str,
    /// Answer shape
    pub shape: ResponseShape,
    /// Protocol variants
    pub availability: Availability,
}

impl CommandInfo {
    /// First wire token, as listed by `HLP?` (`MAC` for `MAC BEG`).
    pub fn token(&self) -> &'static str {
        self.wire.split_whitespace().next().unwrap_or(self.wire)
    }

    /// True for queries and control bytes that answer.
    pub fn is_query(&self) -> bool {
        self.shape != ResponseShape::None
    }

    /// The byte value of a `#N` control command.
    pub fn control_byte(&self) -> Option<u8> {
        self.wire.strip_prefix('#')?.parse().ok()
    }

    /// True if a controller speaking `syntax` implements this command.
    pub fn available_for(&self, syntax: Syntax) -> bool {
        match self.availability {
            Availability::Common => true,
            Availability::Gcs2 => syntax == Syntax::Gcs2,
            Availability::Gcs21 => syntax == Syntax::Gcs21,
        }
    }
}

const fn cmd(
    name: &'static str,
    wire: &'static str,
    shape: ResponseShape,
    availability: Availability,
) -> CommandInfo {
    CommandInfo {
        name,
        wire,
        shape,
        availability,
    }
}

use Availability::{Common, Gcs2, Gcs21};
use ResponseShape::{Block, Control, GcsData, ItemValues, Line, Nested, None as NoAnswer};

static COMMANDS: &[CommandInfo] = &[
    // ===== Identification =====
    cmd("qIDN", "*IDN?", Line, Common),
    cmd("qCSV", "CSV?", Line, Common),
    cmd("qVER", "VER?", Line, Common),
    cmd("qSSN", "SSN?", Line, Common),
    cmd("qHLP", "HLP?", Line, Common),
    cmd("qERR", "ERR?", Line, Common),
    cmd("RBT", "RBT", NoAnswer, Common),
    // ===== Motion =====
    cmd("MOV", "MOV", NoAnswer, Common),
    cmd("MVR", "MVR", NoAnswer, Common),
    cmd("MVE", "MVE", NoAnswer, Gcs2),
    cmd("GOH", "GOH", NoAnswer, Common),
    cmd("JOG", "JOG", NoAnswer, Gcs2),
    cmd("qJOG", "JOG?", ItemValues, Gcs2),
    cmd("STP", "STP", NoAnswer, Common),
    cmd("HLT", "HLT", NoAnswer, Common),
    cmd("POS", "POS", NoAnswer, Gcs2),
    cmd("SVO", "SVO", NoAnswer, Common),
    cmd("qSVO", "SVO?", ItemValues, Common),
    cmd("VEL", "VEL", NoAnswer, Common),
    cmd("qVEL", "VEL?", ItemValues, Common),
    cmd("ACC", "ACC", NoAnswer, Common),
    cmd("qACC", "ACC?", ItemValues, Common),
    cmd("DEC", "DEC", NoAnswer, Common),
    cmd("qDEC", "DEC?", ItemValues, Common),
    cmd("REF", "REF", NoAnswer, Gcs2),
    cmd("FRF", "FRF", NoAnswer, Common),
    cmd("FNL", "FNL", NoAnswer, Common),
    cmd("FPL", "FPL", NoAnswer, Common),
    cmd("qFRF", "FRF?", ItemValues, Common),
    // ===== State =====
    cmd("qPOS", "POS?", ItemValues, Common),
    cmd("qMOV", "MOV?", ItemValues, Common),
    cmd("qONT", "ONT?", ItemValues, Common),
    cmd("qTMN", "TMN?", ItemValues, Common),
    cmd("qTMX", "TMX?", ItemValues, Common),
    cmd("qPUN", "PUN?", ItemValues, Common),
    // ===== Control bytes =====
    cmd("GetPosStatus", "#3", Control, Common),
    cmd("GetStatus", "#4", Control, Common),
    cmd("IsMoving", "#5", Control, Common),
    cmd("HasPosChanged", "#6", Control, Common),
    cmd("IsControllerReady", "#7", Control, Common),
    cmd("IsRunningMacro", "#8", Control, Common),
    cmd("IsGeneratorRunning", "#9", Control, Common),
    cmd("GetDynamicMoveBufferSize", "#11", Control, Common),
    cmd("StopAll", "#24", NoAnswer, Common),
    cmd("SystemAbort", "#27", NoAnswer, Common),
    // ===== Configuration =====
    cmd("CST", "CST", NoAnswer, Gcs2),
    cmd("qCST", "CST?", ItemValues, Gcs2),
    cmd("SAI", "SAI", NoAnswer, Common),
    cmd("qSAI", "SAI?", Line, Common),
    cmd("qSAI_ALL", "SAI? ALL", Line, Common),
    cmd("NLM", "NLM", NoAnswer, Gcs2),
    cmd("qNLM", "NLM?", ItemValues, Gcs2),
    cmd("PLM", "PLM", NoAnswer, Gcs2),
    cmd("qPLM", "PLM?", ItemValues, Gcs2),
    cmd("SSL", "SSL", NoAnswer, Gcs2),
    cmd("qSSL", "SSL?", ItemValues, Gcs2),
    cmd("CCL", "CCL", NoAnswer, Gcs2),
    cmd("qCCL", "CCL?", Line, Gcs2),
    // ===== Parameters (GCS 2.0) =====
    cmd("SPA", "SPA", NoAnswer, Gcs2),
    cmd("qSPA", "SPA?", Nested, Gcs2),
    cmd("SEP", "SEP", NoAnswer, Gcs2),
    cmd("qSEP", "SEP?", Nested, Gcs2),
    cmd("WPA", "WPA", NoAnswer, Gcs2),
    cmd("DPA", "DPA", NoAnswer, Gcs2),
    cmd("RPA", "RPA", NoAnswer, Gcs2),
    cmd("qHPA", "HPA?", Line, Gcs2),
    // ===== Wave generator =====
    cmd("WAV", "WAV", NoAnswer, Gcs2),
    cmd("qWAV", "WAV?", Nested, Gcs2),
    cmd("WGO", "WGO", NoAnswer, Gcs2),
    cmd("qWGO", "WGO?", ItemValues, Gcs2),
    cmd("WSL", "WSL", NoAnswer, Gcs2),
    cmd("qWSL", "WSL?", ItemValues, Gcs2),
    cmd("WGC", "WGC", NoAnswer, Gcs2),
    cmd("qWGC", "WGC?", ItemValues, Gcs2),
    cmd("WOS", "WOS", NoAnswer, Gcs2),
    cmd("qWOS", "WOS?", ItemValues, Gcs2),
    cmd("WTR", "WTR", NoAnswer, Gcs2),
    cmd("qWTR", "WTR?", Line, Gcs2),
    cmd("TWS", "TWS", NoAnswer, Gcs2),
    cmd("qTWS", "TWS?", GcsData, Gcs2),
    cmd("qTWG", "TWG?", Line, Gcs2),
    cmd("qGWD", "GWD?", GcsData, Gcs2),
    // ===== Data recorder (GCS 2.0) =====
    cmd("DRC", "DRC", NoAnswer, Gcs2),
    cmd("qDRC", "DRC?", Line, Gcs2),
    cmd("DRT", "DRT", NoAnswer, Gcs2),
    cmd("qDRT", "DRT?", Line, Gcs2),
    cmd("qDRR", "DRR?", GcsData, Gcs2),
    cmd("qDRL", "DRL?", ItemValues, Gcs2),
    cmd("RTR", "RTR", NoAnswer, Gcs2),
    cmd("qRTR", "RTR?", Line, Gcs2),
    cmd("qHDR", "HDR?", Line, Gcs2),
    cmd("qTNR", "TNR?", Line, Gcs2),
    // ===== Macros =====
    cmd("MAC_BEG", "MAC BEG", NoAnswer, Gcs2),
    cmd("MAC_END", "MAC END", NoAnswer, Gcs2),
    cmd("MAC_START", "MAC START", NoAnswer, Gcs2),
    cmd("MAC_NSTART", "MAC NSTART", NoAnswer, Gcs2),
    cmd("MAC_DEL", "MAC DEL", NoAnswer, Gcs2),
    cmd("MAC_DEF", "MAC DEF", NoAnswer, Gcs2),
    cmd("qMAC_DEF", "MAC DEF?", Line, Gcs2),
    cmd("qMAC", "MAC?", Line, Gcs2),
    // ===== Coordinate systems =====
    cmd("KLD", "KLD", NoAnswer, Gcs2),
    cmd("KSB", "KSB", NoAnswer, Gcs2),
    cmd("KSD", "KSD", NoAnswer, Gcs2),
    cmd("KST", "KST", NoAnswer, Gcs2),
    cmd("KSW", "KSW", NoAnswer, Gcs2),
    cmd("KSF", "KSF", NoAnswer, Gcs2),
    cmd("KLF", "KLF", NoAnswer, Gcs2),
    cmd("KLN", "KLN", NoAnswer, Gcs2),
    cmd("KCP", "KCP", NoAnswer, Gcs2),
    cmd("KEN", "KEN", NoAnswer, Gcs2),
    cmd("KRM", "KRM", NoAnswer, Gcs2),
    cmd("qKLN", "KLN?", Line, Gcs2),
    cmd("qKEN", "KEN?", Line, Gcs2),
    cmd("qKET", "KET?", Line, Gcs2),
    cmd("qKLS", "KLS?", Line, Gcs2),
    cmd("qKLT", "KLT?", Line, Gcs2),
    // ===== GCS 2.1 =====
    cmd("SPV", "SPV", NoAnswer, Gcs21),
    cmd("qSPV", "SPV?", Line, Gcs21),
    cmd("CPA", "CPA", NoAnswer, Gcs21),
    cmd("UCL", "UCL", NoAnswer, Gcs21),
    cmd("qUCL", "UCL?", Line, Gcs21),
    cmd("EAX", "EAX", NoAnswer, Gcs21),
    cmd("qEAX", "EAX?", ItemValues, Gcs21),
    cmd("SAM", "SAM", NoAnswer, Gcs21),
    cmd("qSAM", "SAM?", ItemValues, Gcs21),
    cmd("RES", "RES", NoAnswer, Gcs21),
    cmd("qSTV", "STV?", ItemValues, Gcs21),
    cmd("qUSG", "USG?", Block, Gcs21),
    cmd("REC_TRACE", "REC_TRACE", NoAnswer, Gcs21),
    cmd("qREC_TRACE", "REC_TRACE?", Line, Gcs21),
    cmd("REC_TRG", "REC_TRG", NoAnswer, Gcs21),
    cmd("qREC_TRG", "REC_TRG?", Line, Gcs21),
    cmd("REC_RATE", "REC_RATE", NoAnswer, Gcs21),
    cmd("qREC_RATE", "REC_RATE?", Line, Gcs21),
    cmd("REC_START", "REC_START", NoAnswer, Gcs21),
    cmd("REC_STOP", "REC_STOP", NoAnswer, Gcs21),
    cmd("qREC_STATE", "REC_STATE?", Line, Gcs21),
    cmd("qREC_DAT", "REC_DAT?", GcsData, Gcs21),
];

/// Every registered command.
pub fn all() -> &'static [CommandInfo] {
    COMMANDS
}

/// Find a command by method name (`qPOS`) or wire form (`POS?`).
///
/// Method names match exactly; wire forms match case-insensitively.
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    let name = name.trim();
    COMMANDS
        .iter()
        .find(|c| c.name == name)
        .or_else(|| COMMANDS.iter().find(|c| c.wire.eq_ignore_ascii_case(name)))
}

/// Wire form for a method name. Unregistered names follow the naming
/// convention: `qFOO` becomes `FOO?`, everything else is sent as is.
pub fn wire_name(name: &str) -> String {
    match lookup(name) {
        Some(info) => info.wire.to_string(),
        None => match name.strip_prefix('q') {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => format!("{rest}?"),
            _ => name.to_string(),
        },
    }
}

/// Method name for a wire form (`POS?` gives `qPOS`).
pub fn method_name(wire: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|c| c.wire.eq_ignore_ascii_case(wire.trim()))
        .map(|c| c.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_method_names_unique() {
        let mut seen = HashSet::new();
        for info in all() {
            assert!(seen.insert(info.name), "duplicate {}", info.name);
        }
    }

    #[test]
    fn test_lookup_by_name_and_wire() {
        assert_eq!(lookup("qPOS").unwrap().wire, "POS?");
        assert_eq!(lookup("pos?").unwrap().name, "qPOS");
        assert_eq!(lookup("IsMoving").unwrap().control_byte(), Some(5));
        assert!(lookup("NOPE").is_none());
    }

    #[test]
    fn test_wire_name_convention() {
        assert_eq!(wire_name("qIDN"), "*IDN?");
        assert_eq!(wire_name("MAC_BEG"), "MAC BEG");
        assert_eq!(wire_name("qFOO"), "FOO?");
        assert_eq!(wire_name("FOO"), "FOO");
        assert_eq!(method_name("STV?"), Some("qSTV"));
    }

    #[test]
    fn test_token_and_availability() {
        let info = lookup("MAC_START").unwrap();
        assert_eq!(info.token(), "MAC");
        assert!(info.available_for(Syntax::Gcs2));
        assert!(!info.available_for(Syntax::Gcs21));
        assert!(lookup("qSPV").unwrap().available_for(Syntax::Gcs21));
        assert!(!lookup("MOV").unwrap().is_query());
        assert!(lookup("IsMoving").unwrap().is_query());
        assert!(!lookup("StopAll").unwrap().is_query());
        assert_eq!(lookup("StopAll").unwrap().control_byte(), Some(24));
    }
}

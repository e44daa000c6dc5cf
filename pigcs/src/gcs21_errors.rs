//! GCS 2.1 error codes.
//!
//! A GCS 2.1 error is a packed 32-bit word:
//!
//! ```text
//! | reserved (12) | module (12) | class (4) | id (8) |
//! ```
//!
//! The translation table (`data/gcs21_errors.json`) has three sub-tables:
//! `modules` and `classes` keyed by symbolic name with a numeric `id`, and
//! `errors` keyed by the full symbolic error name with its `id`, `module` and
//! `class`. A code resolves only when all three lookups agree.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::warn;

use crate::error::ErrorInfo;

const ERROR_TABLE_JSON: &str = include_str!("../data/gcs21_errors.json");

#[derive(Debug, Clone, Deserialize)]
struct TableEntry {
    id: u32,
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEntry {
    id: u32,
    module: String,
    class: String,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorTable {
    modules: HashMap<String, TableEntry>,
    classes: HashMap<String, TableEntry>,
    errors: HashMap<String, ErrorEntry>,
}

static ERROR_TABLE: Lazy<ErrorTable> = Lazy::new(|| {
    serde_json::from_str(ERROR_TABLE_JSON).unwrap_or_else(|e| {
        warn!("GCS 2.1 error table is malformed: {e}");
        ErrorTable::default()
    })
});

/// Everything the table knows about one code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gcs21ErrorDescription {
    /// Symbolic name, e.g. `PI_ERROR_MOTION_AXIS_DISABLED`
    pub name: String,
    /// Short error description
    pub description: String,
    /// Module name (`MOTION`, `PARAM`, ...)
    pub module: String,
    /// Module description
    pub module_description: String,
    /// Class name (`STATE`, `CONFIG`, ...)
    pub class: String,
    /// Class description
    pub class_description: String,
}

/// A packed GCS 2.1 error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gcs21Error {
    code: u32,
}

impl Gcs21Error {
    /// No error.
    pub const NO_ERROR: u32 = 0;
    /// Motion: axis disabled.
    pub const MOTION_AXIS_DISABLED: u32 = 21448;
    /// Motion: on limit switch.
    pub const MOTION_ON_LIMIT_SWITCH: u32 = 21255;
    /// Motion: stopped by command.
    pub const MOTION_STOP: u32 = 21870;
    /// Command: stopped by command.
    pub const CMD_STOP: u32 = 9582;
    /// Parameter: unknown parameter id.
    pub const PARAM_UNKNOWN_PARAMETER_ID: u32 = 17154;

    /// Wrap a raw code.
    pub fn new(code: u32) -> Self {
        Self { code }
    }

    /// Build the code for `{module, class, id}`.
    pub fn from_parts(module_id: u16, class_id: u8, error_id: u8) -> Self {
        Self::new(parse_to_errorcode(module_id, class_id, error_id))
    }

    /// Raw packed code.
    pub fn raw(&self) -> u32 {
        self.code
    }

    /// `(module_id, class_id, error_id)` decomposition.
    pub fn decompose(&self) -> (u16, u8, u8) {
        parse_errorcode(self.code)
    }

    /// True for the zero code.
    pub fn is_no_error(&self) -> bool {
        self.code == Self::NO_ERROR
    }

    /// Table entry for this code, if all three sub-tables resolve.
    pub fn describe(&self) -> Option<Gcs21ErrorDescription> {
        let (module_id, class_id, error_id) = self.decompose();
        let table = &*ERROR_TABLE;

        let (module, module_entry) = table
            .modules
            .iter()
            .find(|(_, m)| m.id == u32::from(module_id))?;
        let (class, class_entry) = table
            .classes
            .iter()
            .find(|(_, c)| c.id == u32::from(class_id))?;
        let (name, entry) = table.errors.iter().find(|(_, e)| {
            e.id == u32::from(error_id) && &e.module == module && &e.class == class
        })?;

        Some(Gcs21ErrorDescription {
            name: name.clone(),
            description: entry.description.clone(),
            module: module.clone(),
            module_description: module_entry.description.clone(),
            class: class.clone(),
            class_description: class_entry.description.clone(),
        })
    }
}

/// Split a packed code into `(module_id, class_id, error_id)`.
pub fn parse_errorcode(code: u32) -> (u16, u8, u8) {
    let module_id = ((code >> 12) & 0xFFF) as u16;
    let class_id = ((code >> 8) & 0xF) as u8;
    let error_id = (code & 0xFF) as u8;
    (module_id, class_id, error_id)
}

/// Pack `{module, class, id}` into a code.
pub fn parse_to_errorcode(module_id: u16, class_id: u8, error_id: u8) -> u32 {
    ((u32::from(module_id) << 12) & 0x00FF_F000)
        | ((u32::from(class_id) << 8) & 0x0000_0F00)
        | u32::from(error_id)
}

impl ErrorInfo for Gcs21Error {
    fn code(&self) -> i64 {
        i64::from(self.code)
    }

    fn module_id(&self) -> Option<u16> {
        Some(self.decompose().0)
    }

    fn class_id(&self) -> Option<u8> {
        Some(self.decompose().1)
    }

    fn error_id(&self) -> Option<u8> {
        Some(self.decompose().2)
    }

    fn name(&self) -> String {
        if self.is_no_error() {
            return "PI_ERROR_NO_ERROR".to_string();
        }
        match self.describe() {
            Some(desc) => desc.name,
            None => {
                let (m, c, i) = self.decompose();
                format!("PI_ERROR_UNKNOWN_{m}_{c}_{i}")
            }
        }
    }

    fn message(&self) -> String {
        if self.is_no_error() {
            return "No error".to_string();
        }
        match self.describe() {
            Some(desc) => format!(
                "ERROR: {}\n{} ({}): {}: {} ({})\n{} ({})",
                self.code,
                desc.module_description,
                self.decompose().0,
                desc.name,
                desc.description,
                self.decompose().2,
                desc.class_description,
                self.decompose().1,
            ),
            None => {
                let (m, c, i) = self.decompose();
                format!("Unknown error: module={m} class={c} id={i}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_limit_switch() {
        let err = Gcs21Error::new(Gcs21Error::MOTION_ON_LIMIT_SWITCH);
        assert_eq!(err.decompose(), (5, 3, 7));
        let desc = err.describe().unwrap();
        assert_eq!(desc.name, "PI_ERROR_MOTION_ON_LIMIT_SWITCH");
        assert_eq!(desc.module, "MOTION");
    }

    #[test]
    fn test_axis_disabled_message() {
        let err = Gcs21Error::new(Gcs21Error::MOTION_AXIS_DISABLED);
        assert_eq!(err.module_id(), Some(5));
        assert_eq!(err.class_id(), Some(3));
        assert_eq!(err.error_id(), Some(200));

        let desc = err.describe().unwrap();
        assert_eq!(desc.class, "STATE");

        let msg = err.message();
        assert!(msg.starts_with("ERROR: 21448\n"));
        assert!(msg.contains("PI_ERROR_MOTION_AXIS_DISABLED"));
        assert!(msg.contains("Motion (5)"));
    }

    #[test]
    fn test_zero_is_no_error() {
        let err = Gcs21Error::new(0);
        assert!(err.is_no_error());
        assert_eq!(err.name(), "PI_ERROR_NO_ERROR");
        assert_eq!(err.decompose(), (0, 0, 0));
    }

    #[test]
    fn test_unknown_code_message() {
        let err = Gcs21Error::from_parts(0x7AB, 4, 99);
        assert_eq!(err.decompose(), (0x7AB, 4, 99));
        assert_eq!(err.describe(), None);
        assert_eq!(
            err.message(),
            format!("Unknown error: module={} class=4 id=99", 0x7AB)
        );
    }

    #[test]
    fn test_pack_ignores_reserved_bits() {
        assert_eq!(parse_errorcode(0xFF00_0000 | 21448), (5, 3, 200));
        assert_eq!(parse_to_errorcode(5, 3, 200), 21448);
    }

    #[test]
    fn test_every_table_entry_round_trips() {
        for (name, entry) in &ERROR_TABLE.errors {
            let module_id = ERROR_TABLE.modules[&entry.module].id as u16;
            let class_id = ERROR_TABLE.classes[&entry.class].id as u8;
            let err = Gcs21Error::from_parts(module_id, class_id, entry.id as u8);
            assert_eq!(&err.name(), name);
        }
    }
}

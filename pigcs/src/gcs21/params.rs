//! GCS 2.1 parameters: `SPV`, `SPV?` and `CPA`.
//!
//! A parameter lives at `memtype container_unit function_unit id`. Queries
//! and copies accept any prefix of that address; the missing tail means
//! "everything below".

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::debug;

use super::Gcs21Commands;
use crate::core::command_line;
use crate::error::{GcsError, GcsResult};
use crate::items::split_answer;
use crate::schema::{parse_param_id, MemoryType};
use crate::values::{format_hex, format_typed, Value, ValueKind};

/// Parameter values as `{memtype: {container: {function: {id: value}}}}`.
pub type SpvMap = IndexMap<MemoryType, IndexMap<String, IndexMap<String, IndexMap<u32, Value>>>>;

/// A full or partial parameter address.
///
/// ```
/// use pigcs::gcs21::ParamAddress;
/// use pigcs::schema::MemoryType;
///
/// let addr = ParamAddress::new(MemoryType::RAM).unit("AXIS_1").function("PID").param(0x7000100);
/// assert_eq!(addr.to_string(), "RAM AXIS_1 PID 0x7000100");
/// assert_eq!(ParamAddress::new(MemoryType::FLASH).unit("AXIS_1").to_string(), "FLASH AXIS_1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamAddress {
    pub memtype: MemoryType,
    pub container: Option<String>,
    pub function: Option<String>,
    pub id: Option<u32>,
}

impl ParamAddress {
    pub fn new(memtype: MemoryType) -> Self {
        Self {
            memtype,
            container: None,
            function: None,
            id: None,
        }
    }

    /// Narrow to a container unit (`AXIS_1`, `SYS`).
    pub fn unit(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Narrow to a function unit (`PID`, `-` for the container itself).
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Narrow to one parameter.
    pub fn param(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// True if every part is given.
    pub fn is_complete(&self) -> bool {
        self.container.is_some() && self.function.is_some() && self.id.is_some()
    }

    /// Arguments for `SPV?`/`CPA`. A part may only be given if the parts
    /// before it are.
    fn args(&self) -> GcsResult<String> {
        let mut args = vec![self.memtype.to_string()];
        let tail = [
            self.container.clone(),
            self.function.clone(),
            self.id.map(format_hex),
        ];
        let mut ended = false;
        for part in tail {
            match part {
                Some(_) if ended => {
                    return Err(GcsError::InvalidArgument(format!(
                        "parameter address {self:?} skips a level"
                    )))
                }
                Some(part) => args.push(part),
                None => ended = true,
            }
        }
        Ok(args.join(" "))
    }
}

impl fmt::Display for ParamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.args() {
            Ok(args) => f.write_str(&args),
            Err(_) => write!(f, "{} <invalid>", self.memtype),
        }
    }
}

impl Gcs21Commands {
    fn param_kind(&mut self, memtype: MemoryType, container: &str, function: &str, id: u32) -> GcsResult<ValueKind> {
        let schema = self.schema()?;
        let array = schema.get(id).is_some_and(|p| p.is_array());
        Ok(if array {
            ValueKind::Str
        } else {
            schema.value_kind(memtype, container, function, id)
        })
    }

    /// `SPV`: set one parameter. The value is formatted per its schema type.
    pub fn spv(&mut self, address: &ParamAddress, value: &Value) -> GcsResult<()> {
        self.spv_many(&[(address.clone(), value.clone())])
    }

    /// `SPV` with several parameters in one command.
    pub fn spv_many(&mut self, values: &[(ParamAddress, Value)]) -> GcsResult<()> {
        if values.is_empty() {
            return Err(GcsError::InvalidArgument("no parameters given".to_string()));
        }
        let format = self.core.float_format();
        let mut args = Vec::with_capacity(values.len());
        for (address, value) in values {
            let (Some(container), Some(function), Some(id)) =
                (&address.container, &address.function, address.id)
            else {
                return Err(GcsError::InvalidArgument(format!(
                    "SPV needs a complete address, got {address}"
                )));
            };
            let kind = self.param_kind(address.memtype, container, function, id)?;
            args.push(format!("{address} {}", format_typed(value, kind, &format)?));
        }
        self.core.send(&command_line("SPV", &args.join(" ")))
    }

    /// Set every value of a `{memtype: {unit: {function: {id: value}}}}` map.
    pub fn spv_map(&mut self, values: &SpvMap) -> GcsResult<()> {
        let mut flat = Vec::new();
        for (memtype, units) in values {
            for (container, functions) in units {
                for (function, params) in functions {
                    for (id, value) in params {
                        let address = ParamAddress::new(*memtype)
                            .unit(container.as_str())
                            .function(function.as_str())
                            .param(*id);
                        flat.push((address, value.clone()));
                    }
                }
            }
        }
        self.spv_many(&flat)
    }

    /// `SPV?`: values below `address`, typed through the schema.
    pub fn qspv(&mut self, address: &ParamAddress) -> GcsResult<SpvMap> {
        self.qspv_many(std::slice::from_ref(address))
    }

    /// `SPV?` for several addresses in one query.
    pub fn qspv_many(&mut self, addresses: &[ParamAddress]) -> GcsResult<SpvMap> {
        let args = addresses
            .iter()
            .map(ParamAddress::args)
            .collect::<GcsResult<Vec<_>>>()?;
        let answer = self.core.read(&command_line("SPV?", &args.join(" ")))?;
        self.parse_spv(&answer)
    }

    /// Parse `memtype unit function id=value` lines.
    fn parse_spv(&mut self, answer: &str) -> GcsResult<SpvMap> {
        let mut parsed = SpvMap::new();
        for line in split_answer(answer) {
            let [memtype, container, function, id] = line.keys.as_slice() else {
                return Err(GcsError::InvalidResponse(format!(
                    "expected 'memtype unit function id=value', got {:?}",
                    line.keys
                )));
            };
            let memtype = MemoryType::from_str(memtype)
                .map_err(|_| GcsError::InvalidResponse(format!("unknown memory type {memtype:?}")))?;
            let id = parse_param_id(id)?;
            let kind = self.param_kind(memtype, container, function, id)?;
            parsed
                .entry(memtype)
                .or_default()
                .entry(container.clone())
                .or_default()
                .entry(function.clone())
                .or_default()
                .insert(id, Value::coerce(&line.value, kind)?);
        }
        debug!("SPV? returned {} memory types", parsed.len());
        Ok(parsed)
    }

    /// One parameter value, or `None` if the controller does not list it.
    pub fn get_param(&mut self, address: &ParamAddress) -> GcsResult<Option<Value>> {
        let (Some(container), Some(function), Some(id)) =
            (address.container.clone(), address.function.clone(), address.id)
        else {
            return Err(GcsError::InvalidArgument(format!(
                "get_param needs a complete address, got {address}"
            )));
        };
        let values = match self.qspv(address) {
            Ok(values) => values,
            Err(GcsError::Controller(e)) => {
                debug!("SPV? {address} failed: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(values
            .get(&address.memtype)
            .and_then(|units| units.get(&container))
            .and_then(|functions| functions.get(&function))
            .and_then(|params| params.get(&id))
            .cloned())
    }

    /// `CPA`: copy parameters below `target`'s address from `source` memory
    /// into `target.memtype` (`CPA RAM FLASH AXIS_1`).
    pub fn cpa(&mut self, source: MemoryType, target: &ParamAddress) -> GcsResult<()> {
        let args = format!("{source} {}", target.args()?);
        self.core.send(&command_line("CPA", &args))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{gcs21, USG_PAM};
    use super::*;
    use crate::test_util::ScriptedTransport;

    fn pid_gain() -> ParamAddress {
        ParamAddress::new(MemoryType::RAM)
            .unit("AXIS_1")
            .function("PID")
            .param(0x0700_0100)
    }

    #[test]
    fn test_partial_address_args() {
        assert_eq!(ParamAddress::new(MemoryType::RAM).args().unwrap(), "RAM");
        assert_eq!(pid_gain().args().unwrap(), "RAM AXIS_1 PID 0x7000100");
        let skipped = ParamAddress::new(MemoryType::RAM).function("PID");
        assert!(skipped.args().is_err());
        assert!(pid_gain().is_complete());
    }

    #[test]
    fn test_spv_round_trip() {
        let transport = ScriptedTransport::new()
            .expect("USG? PAM\n", USG_PAM)
            .expect_silence("SPV RAM AXIS_1 PID 0x7000100 0.25\n")
            .expect("SPV? RAM AXIS_1 PID 0x7000100\n", "RAM AXIS_1 PID 0x7000100=0.25\n");
        let mut dev = gcs21(transport);
        dev.spv(&pid_gain(), &Value::Float(0.25)).unwrap();
        let values = dev.qspv(&pid_gain()).unwrap();
        assert_eq!(values[&MemoryType::RAM]["AXIS_1"]["PID"][&0x0700_0100], Value::Float(0.25));
    }

    #[test]
    fn test_spv_rejects_partial_address() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let mut dev = gcs21(transport);
        let partial = ParamAddress::new(MemoryType::RAM).unit("AXIS_1");
        assert!(dev.spv(&partial, &Value::Int(1)).unwrap_err().is_usage());
        assert!(log.written().is_empty());
    }

    #[test]
    fn test_qspv_prefix_lists_everything_below() {
        let transport = ScriptedTransport::new()
            .expect(
                "SPV? RAM AXIS_1\n",
                "RAM AXIS_1 - 0x121=-5 \nRAM AXIS_1 - 0x122=5 \nRAM AXIS_1 PID 0x7000100=0.25\n",
            )
            .expect("USG? PAM\n", USG_PAM);
        let mut dev = gcs21(transport);
        let values = dev
            .qspv(&ParamAddress::new(MemoryType::RAM).unit("AXIS_1"))
            .unwrap();
        let axis = &values[&MemoryType::RAM]["AXIS_1"];
        assert_eq!(axis["-"][&0x121], Value::Float(-5.0));
        assert_eq!(axis["-"][&0x122], Value::Float(5.0));
        assert_eq!(axis.len(), 2);
    }

    #[test]
    fn test_cpa_and_missing_param() {
        let transport = ScriptedTransport::new()
            .expect_silence("CPA RAM FLASH AXIS_1\n")
            .expect("SPV? RAM AXIS_1 PID 0x7000100\n", "\n")
            .expect("ERR?\n", "49153\n");
        let mut dev = gcs21(transport);
        let target = ParamAddress::new(MemoryType::FLASH).unit("AXIS_1");
        dev.cpa(MemoryType::RAM, &target).unwrap();
        assert_eq!(dev.get_param(&pid_gain()).unwrap(), None);
    }
}

//! Parameter schemas discovered from the controller.
//!
//! The controller describes its own parameters, and the schema decides how
//! `SPA?`/`SPV?` answers are coerced and how `SPA`/`SPV` values are written.
//!
//! - **GCS 2.0**: `HPA?` answers one line per parameter:
//!
//!   ```text
//!   <PamID>=<CmdLevel>TAB<MaxItem>TAB<DataType>TAB<FuncGroup>TAB<Description>
//!   ```
//!
//!   with data types `INT`, `FLOAT` and `CHAR`.
//! - **GCS 2.1**: `USG? PAM` answers a "Parameter Overview" block whose rows
//!   carry sub-blocks with the memory types and units a parameter exists in.
//!
//! A schema is valid for one command level; the command layer drops it when
//! `CCL`/`UCL` changes the level.

use std::str::FromStr;

use indexmap::IndexMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, trace};

use crate::blocks::{keys, names, Block};
use crate::error::{GcsError, GcsResult};
use crate::values::{parse_int, ValueKind};

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(ascii_case_insensitive)]
#[allow(clippy::upper_case_acronyms)]
pub enum DataType {
    #[strum(serialize = "INT8")]
    Int8,
    #[strum(serialize = "UINT8")]
    UInt8,
    #[strum(serialize = "INT16")]
    Int16,
    #[strum(serialize = "UINT16")]
    UInt16,
    #[strum(to_string = "INT32", serialize = "INT")]
    Int32,
    #[strum(serialize = "UINT32")]
    UInt32,
    #[strum(serialize = "INT64")]
    Int64,
    #[strum(serialize = "UINT64")]
    UInt64,
    #[strum(to_string = "FLOAT32", serialize = "FLOAT")]
    Float32,
    #[strum(to_string = "FLOAT64", serialize = "DOUBLE")]
    Float64,
    #[strum(to_string = "STRING32", serialize = "CHAR")]
    String32,
    #[strum(serialize = "VOID")]
    Void,
}

impl DataType {
    /// How answer tokens of this type are coerced.
    pub fn value_kind(self) -> ValueKind {
        match self {
            DataType::Int8
            | DataType::UInt8
            | DataType::Int16
            | DataType::UInt16
            | DataType::Int32
            | DataType::UInt32
            | DataType::Int64
            | DataType::UInt64 => ValueKind::Int,
            DataType::Float32 | DataType::Float64 => ValueKind::Float,
            DataType::String32 | DataType::Void => ValueKind::Str,
        }
    }
}

/// GCS 2.1 parameter storage tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(ascii_case_insensitive)]
#[allow(clippy::upper_case_acronyms)]
pub enum MemoryType {
    /// Transient working copy
    TMP,
    /// Volatile memory, active until reboot
    RAM,
    /// Non-volatile memory, loaded at startup
    FLASH,
}

/// Role of a GCS 2.1 parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ParameterClass {
    #[strum(serialize = "Configuration")]
    Configuration,
    #[strum(serialize = "Unit Output")]
    Output,
    #[strum(serialize = "Unit Input")]
    Input,
    #[strum(serialize = "Unit Input-Output")]
    InputOutput,
}

/// Parse a parameter id (`0x7000100` or decimal).
pub fn parse_param_id(text: &str) -> GcsResult<u32> {
    let id = parse_int(text)?;
    u32::try_from(id).map_err(|_| GcsError::ParseError(format!("parameter id out of range: {text}")))
}

/// Parse a dimension cell (`1`, `4x2`, `[4, 2]`) into its extents.
pub fn parse_dimension(text: &str) -> Vec<usize> {
    let dims: Vec<usize> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|t| t.parse().ok())
        .collect();
    if dims.is_empty() {
        vec![1]
    } else {
        dims
    }
}

/// Indices of every element of an N-D parameter in row-major order.
///
/// `[4, 2]` gives `[0,0], [0,1], [1,0], ... [3,1]`.
pub fn parameter_indices(dimension: &[usize]) -> Vec<Vec<usize>> {
    if dimension.is_empty() {
        return Vec::new();
    }
    let total: usize = dimension.iter().product();
    (0..total)
        .map(|mut flat| {
            let mut index = vec![0; dimension.len()];
            for (slot, extent) in index.iter_mut().zip(dimension).rev() {
                *slot = flat % extent;
                flat /= extent;
            }
            index
        })
        .collect()
}

// ==================== GCS 2.0 ====================

/// One `HPA?` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Gcs2ParamInfo {
    /// Parameter id
    pub id: u32,
    /// Declared type
    pub data_type: DataType,
    /// Command level required to write
    pub command_level: Option<u32>,
    /// Number of items the parameter applies to
    pub max_items: Option<u32>,
    /// Functional group ("Servo", "System", ...)
    pub group: String,
    /// Human-readable name
    pub description: String,
}

/// Parameter types of a GCS 2.0 controller, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gcs2Schema {
    params: IndexMap<u32, Gcs2ParamInfo>,
}

impl Gcs2Schema {
    /// Parse an `HPA?` answer. Lines that are not parameter entries (titles,
    /// possible-value annotations) are skipped.
    pub fn from_hpa(answer: &str) -> GcsResult<Self> {
        let mut params = IndexMap::new();
        for line in answer.lines() {
            let line = line.trim_end();
            let Some((id, rest)) = line.split_once('=') else {
                continue;
            };
            let Ok(id) = parse_param_id(id) else {
                trace!("HPA? skipping line {line:?}");
                continue;
            };
            let fields: Vec<&str> = rest.split('\t').map(str::trim).collect();
            let Some(pos) = fields.iter().position(|f| DataType::from_str(f).is_ok()) else {
                return Err(GcsError::InvalidResponse(format!(
                    "HPA? entry without data type: {line:?}"
                )));
            };
            let data_type = DataType::from_str(fields[pos])
                .map_err(|_| GcsError::InvalidResponse(format!("bad data type in {line:?}")))?;
            let numeric = |i: Option<usize>| i.and_then(|i| fields.get(i)).and_then(|f| f.parse().ok());
            let text = |i: usize| fields.get(i).map(|f| f.to_string()).unwrap_or_default();
            params.insert(
                id,
                Gcs2ParamInfo {
                    id,
                    data_type,
                    command_level: numeric(pos.checked_sub(2)),
                    max_items: numeric(pos.checked_sub(1)),
                    group: text(pos + 1),
                    description: text(pos + 2),
                },
            );
        }
        debug!("Parsed {} parameters from HPA?", params.len());
        Ok(Self { params })
    }

    /// Entry for `id`.
    pub fn get(&self, id: u32) -> Option<&Gcs2ParamInfo> {
        self.params.get(&id)
    }

    /// True if `id` is described.
    pub fn contains(&self, id: u32) -> bool {
        self.params.contains_key(&id)
    }

    /// Coercion for `id`; unknown ids are guessed.
    pub fn value_kind(&self, id: u32) -> ValueKind {
        self.get(id)
            .map(|p| p.data_type.value_kind())
            .unwrap_or(ValueKind::Guess)
    }

    /// All entries in answer order.
    pub fn iter(&self) -> impl Iterator<Item = &Gcs2ParamInfo> {
        self.params.values()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

// ==================== GCS 2.1 ====================

/// One row of the "Parameter Overview" block.
#[derive(Debug, Clone, PartialEq)]
pub struct Gcs21ParamInfo {
    /// Parameter id
    pub id: u32,
    /// Declared type
    pub data_type: DataType,
    /// User command level needed to read
    pub read_level: Option<u32>,
    /// User command level needed to write
    pub write_level: Option<u32>,
    /// Lower bound as sent by the controller
    pub min: Option<String>,
    /// Upper bound as sent by the controller
    pub max: Option<String>,
    /// Extents; `[1]` for scalars
    pub dimension: Vec<usize>,
    /// Parameter role
    pub class: Option<ParameterClass>,
    /// Human-readable name
    pub description: String,
    /// Memory types the parameter lives in (empty = all)
    pub memory_types: Vec<MemoryType>,
    /// `(container unit, function unit)` pairs it applies to (empty = all)
    pub units: Vec<(String, String)>,
}

impl Gcs21ParamInfo {
    /// True for N-D parameters.
    pub fn is_array(&self) -> bool {
        self.dimension.iter().product::<usize>() > 1
    }

    fn applies_to(&self, memtype: MemoryType, container: &str, function: &str) -> bool {
        let mem_ok = self.memory_types.is_empty() || self.memory_types.contains(&memtype);
        let unit_ok = self.units.is_empty()
            || self
                .units
                .iter()
                .any(|(cu, fu)| cu == container && (fu == function || fu.is_empty()));
        mem_ok && unit_ok
    }
}

/// Typed tree `{memtype: {container unit: {function unit: {pid: type}}}}`.
pub type Gcs21SchemaTree =
    IndexMap<MemoryType, IndexMap<String, IndexMap<String, IndexMap<u32, DataType>>>>;

/// Parameter types of a GCS 2.1 controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gcs21Schema {
    params: IndexMap<u32, Gcs21ParamInfo>,
}

impl Gcs21Schema {
    /// Build from the blocks of a `USG? PAM` answer.
    pub fn from_blocks(blocks: &[Block]) -> GcsResult<Self> {
        let mut params = IndexMap::new();
        for block in blocks.iter().filter(|b| b.name == names::PARAM_OVERVIEW) {
            for row in &block.rows {
                let Some(id) = row.get(keys::PARAM_ID) else {
                    continue;
                };
                let id = parse_param_id(id)?;
                let data_type = row
                    .get(keys::DATA_TYPE)
                    .and_then(|t| DataType::from_str(t.trim()).ok())
                    .unwrap_or(DataType::Void);
                let memory_types = row
                    .find_subblock_with_key(names::RELATED_MEMORY_TYPES)
                    .map(|b| {
                        b.rows
                            .iter()
                            .filter_map(|r| r.fields.values().next())
                            .filter_map(|m| MemoryType::from_str(m.trim()).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                let units = row
                    .find_subblock_with_key(names::RELATED_UNITS)
                    .map(|b| {
                        b.rows
                            .iter()
                            .filter_map(|r| {
                                let cu = r.get(keys::CONTAINER_UNIT)?;
                                let fu = r.get(keys::FUNCTION_UNIT).unwrap_or_default();
                                Some((cu.to_string(), fu.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let level = |key: &str| row.get(key).and_then(|v| parse_int(v).ok()).map(|v| v as u32);
                params.insert(
                    id,
                    Gcs21ParamInfo {
                        id,
                        data_type,
                        read_level: level(keys::READ_ACCESS_LEVEL),
                        write_level: level(keys::WRITE_ACCESS_LEVEL),
                        min: row.get(keys::MIN_VALUE).map(str::to_string),
                        max: row.get(keys::MAX_VALUE).map(str::to_string),
                        dimension: row.get(keys::DIMENSION).map(parse_dimension).unwrap_or_else(|| vec![1]),
                        class: row
                            .get(keys::PARAMETER_TYPE)
                            .and_then(|c| ParameterClass::from_str(c.trim()).ok()),
                        description: row.get(keys::PARAM_DESCRIPTION).unwrap_or_default().to_string(),
                        memory_types,
                        units,
                    },
                );
            }
        }
        debug!("Parsed {} parameters from USG? PAM", params.len());
        Ok(Self { params })
    }

    /// Entry for `id`.
    pub fn get(&self, id: u32) -> Option<&Gcs21ParamInfo> {
        self.params.get(&id)
    }

    /// Entry for `id` if it exists at this address.
    pub fn lookup(
        &self,
        memtype: MemoryType,
        container: &str,
        function: &str,
        id: u32,
    ) -> Option<&Gcs21ParamInfo> {
        self.get(id)
            .filter(|p| p.applies_to(memtype, container, function))
    }

    /// Coercion for an address; falls back to the id alone, then guesses.
    pub fn value_kind(&self, memtype: MemoryType, container: &str, function: &str, id: u32) -> ValueKind {
        self.lookup(memtype, container, function, id)
            .or_else(|| self.get(id))
            .map(|p| p.data_type.value_kind())
            .unwrap_or(ValueKind::Guess)
    }

    /// All entries in answer order.
    pub fn iter(&self) -> impl Iterator<Item = &Gcs21ParamInfo> {
        self.params.values()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Expand into the addressed tree. Parameters without unit information
    /// are listed under container unit `*` and function unit `-`.
    pub fn tree(&self) -> Gcs21SchemaTree {
        let mut tree = Gcs21SchemaTree::new();
        for param in self.params.values() {
            let memtypes: Vec<MemoryType> = if param.memory_types.is_empty() {
                vec![MemoryType::RAM]
            } else {
                param.memory_types.clone()
            };
            let units = if param.units.is_empty() {
                vec![("*".to_string(), "-".to_string())]
            } else {
                param.units.clone()
            };
            for memtype in &memtypes {
                for (cu, fu) in &units {
                    tree.entry(*memtype)
                        .or_default()
                        .entry(cu.clone())
                        .or_default()
                        .entry(fu.clone())
                        .or_default()
                        .insert(param.id, param.data_type);
                }
            }
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::parse_block_answer;

    #[test]
    fn test_data_type_names() {
        assert_eq!(DataType::from_str("FLOAT32").unwrap(), DataType::Float32);
        assert_eq!(DataType::from_str("INT").unwrap(), DataType::Int32);
        assert_eq!(DataType::from_str("char").unwrap(), DataType::String32);
        assert_eq!(DataType::UInt64.to_string(), "UINT64");
        assert_eq!(DataType::UInt16.value_kind(), ValueKind::Int);
        assert_eq!(DataType::Float64.value_kind(), ValueKind::Float);
        assert!(DataType::from_str("Servo").is_err());
    }

    #[test]
    fn test_memory_types() {
        assert_eq!(MemoryType::from_str("ram").unwrap(), MemoryType::RAM);
        assert_eq!(MemoryType::FLASH.as_ref(), "FLASH");
        assert_eq!(
            ParameterClass::from_str("Unit Input-Output").unwrap(),
            ParameterClass::InputOutput
        );
    }

    #[test]
    fn test_parameter_indices() {
        assert_eq!(
            parameter_indices(&[4, 2]),
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![1, 0],
                vec![1, 1],
                vec![2, 0],
                vec![2, 1],
                vec![3, 0],
                vec![3, 1]
            ]
        );
        assert_eq!(parameter_indices(&[3]), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(parameter_indices(&[2, 0]).len(), 0);
        assert_eq!(parse_dimension("4x2"), vec![4, 2]);
        assert_eq!(parse_dimension(""), vec![1]);
    }

    #[test]
    fn test_gcs2_schema_from_hpa() {
        let answer = "#Possible parameters:\n\
0x1=\t0\t4\tINT\tServo\tP term 1 \n\
0x7000000=\t1\t4\tFLOAT\tServo\tTravel range \n\
0xd003300=\t0\t1\tCHAR\tSystem\tIdentification\n";
        let schema = Gcs2Schema::from_hpa(answer).unwrap();
        assert_eq!(schema.len(), 3);
        let p = schema.get(0x1).unwrap();
        assert_eq!(p.data_type, DataType::Int32);
        assert_eq!(p.command_level, Some(0));
        assert_eq!(p.max_items, Some(4));
        assert_eq!(p.group, "Servo");
        assert_eq!(p.description, "P term 1");
        assert_eq!(schema.value_kind(0x7000000), ValueKind::Float);
        assert_eq!(schema.value_kind(0xd003300), ValueKind::Str);
        assert_eq!(schema.value_kind(0x42), ValueKind::Guess);
    }

    #[test]
    fn test_gcs21_schema_from_usg() {
        let answer = "#Parameter Overview: <Parameter ID>\t<Data Type>\t<READ-UCL>\t<WRITE-UCL>\t<Dimension>\t<Parameter Type>\t<Parameter Description>\n\
0x07000100\tFLOAT32\t0\t1\t1\tConfiguration\tPID P term\n\
#Related Memory Types: Memory\n\
RAM\n\
FLASH\n\
#END\n\
#Related Units: <Container Unit>\t<Function Unit>\n\
AXIS_1\tPID\n\
AXIS_2\tPID\n\
#END\n\
0x16000201\tUINT32\t0\t3\t2x3\tUnit Output\tMax points\n\
#END\n";
        let blocks = parse_block_answer(answer).unwrap();
        let schema = Gcs21Schema::from_blocks(&blocks).unwrap();
        assert_eq!(schema.len(), 2);

        let pid = schema.get(0x0700_0100).unwrap();
        assert_eq!(pid.memory_types, [MemoryType::RAM, MemoryType::FLASH]);
        assert_eq!(pid.units.len(), 2);
        assert_eq!(pid.write_level, Some(1));
        assert_eq!(pid.class, Some(ParameterClass::Configuration));
        assert!(schema
            .lookup(MemoryType::RAM, "AXIS_1", "PID", 0x0700_0100)
            .is_some());
        assert!(schema
            .lookup(MemoryType::TMP, "AXIS_1", "PID", 0x0700_0100)
            .is_none());
        assert_eq!(
            schema.value_kind(MemoryType::RAM, "AXIS_1", "PID", 0x0700_0100),
            ValueKind::Float
        );

        let rec = schema.get(0x1600_0201).unwrap();
        assert!(rec.is_array());
        assert_eq!(rec.dimension, [2, 3]);

        let tree = schema.tree();
        assert_eq!(
            tree[&MemoryType::FLASH]["AXIS_2"]["PID"][&0x0700_0100],
            DataType::Float32
        );
        assert!(tree[&MemoryType::RAM]["*"]["-"].contains_key(&0x1600_0201));
    }
}

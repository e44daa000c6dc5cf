//! Block answers (`#<name>: <col>\t<col>` ... `#END`).
//!
//! GCS 2.1 discovery commands (`USG?`, `REC?`, `UCL?` help forms) answer in
//! blocks. A header line names the block and its columns, tab-separated rows
//! follow, and `#END` closes the block:
//!
//! ```text
//! #Parameter Overview: <Parameter ID>\t<Data Type>\t<Dimension>
//! 0x07000100\tFLOAT32\t1
//! #Related Memory Types: Memory
//! RAM
//! FLASH
//! #END
//! #END
//! ```
//!
//! A block opened inside another block belongs to the row above it and is
//! parsed recursively into that row's sub-blocks (`SUB_1`, `SUB_2`, ...).

use indexmap::IndexMap;

use crate::error::{GcsError, GcsResult};

/// Name of the user command level block.
pub const BLOCK_USER_COMMAND_LEVEL: &str = "User Command Level";

/// Well-known block names.
pub mod names {
    pub const PARAM_OVERVIEW: &str = "Parameter Overview";
    pub const CONTENTS_OVERVIEW: &str = "Contents Overview";
    pub const COMMAND_OVERVIEW: &str = "Command Overview";
    pub const RELATED_UNITS: &str = "Related Units";
    pub const RELATED_CONFIGURATION_TYPES: &str = "Related Configuration Types";
    pub const RELATED_MEMORY_TYPES: &str = "Related Memory Types";
    pub const UNIT_OVERVIEW: &str = "Unit Overview";
}

/// Well-known column keys.
pub mod keys {
    pub const CONTAINER_UNITS: &str = "Container Unit Contents";
    pub const CONTAINER_UNIT: &str = "Container Unit";
    pub const FUNCTION_UNITS: &str = "Function Unit Contents";
    pub const FUNCTION_UNIT: &str = "Function Unit";
    pub const DESCRIPTION: &str = "Description";
    pub const UNIT_DESCRIPTION: &str = "Unit Description";
    pub const UNIT_ADDRESS: &str = "Unit Address";
    pub const PARAM_DESCRIPTION: &str = "Parameter Description";
    pub const PARAM_ID: &str = "Parameter ID";
    pub const DATA_TYPE: &str = "Data Type";
    pub const READ_ACCESS_LEVEL: &str = "READ-UCL";
    pub const WRITE_ACCESS_LEVEL: &str = "WRITE-UCL";
    pub const MIN_VALUE: &str = "MINVALUE";
    pub const MAX_VALUE: &str = "MAXVALUE";
    pub const DIMENSION: &str = "Dimension";
    pub const PARAMETER_TYPE: &str = "Parameter Type";
    pub const COMMAND_LEVEL_NAME: &str = "Command Level Name";
    pub const RECORDER_TRIGGER: &str = "Recorder Trigger";
    pub const RECORDER_TRACE_INFO: &str = "Recorder Trace Information";
    pub const RECORDABLE_TYPE_OVERVIEW: &str = "Recordable DataType Overview";
    pub const RECORDER_HEADER_FORMAT: &str = "Recorder Header Format";
    pub const RECORDER_TRIGGER_RECURRING: &str = "Recorder Trigger Recurring";
    pub const ALIAS: &str = "Alias";
    pub const OPTIONS: &str = "Options";
    pub const OPTION1: &str = "Option1";
    pub const OPTION2: &str = "Option2";
    pub const MAX_TRACES: &str = "Max Traces";
    pub const MAX_POINTS_PER_TRACE: &str = "NumPoints pro Trace";
    pub const VALUE: &str = "Value";
    pub const SECTION: &str = "Section";
    pub const TYPE: &str = "Type";
    pub const COMMAND: &str = "Command";
    pub const ARGUMENTS: &str = "Arguments";
    pub const NAME: &str = "Name";
    pub const TRIGGER_OPTION_TYPES: &str = "Trigger Option Types";
}

/// One named block with its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Name from the header line (`#<name>:`)
    pub name: String,
    /// Column names from the header line, `<>` stripped
    pub columns: Vec<String>,
    /// Data rows in answer order
    pub rows: Vec<BlockRow>,
}

/// One record of a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockRow {
    /// Column name → cell text
    pub fields: IndexMap<String, String>,
    /// Nested block groups in order; group `n` is `SUB_{n+1}`
    pub sub_blocks: Vec<Vec<Block>>,
}

impl BlockRow {
    /// Cell text of `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Sub-block group `SUB_{index}` (1-based).
    pub fn sub(&self, index: usize) -> Option<&[Block]> {
        index
            .checked_sub(1)
            .and_then(|i| self.sub_blocks.get(i))
            .map(Vec::as_slice)
    }

    /// First sub-block named `name`, searching `SUB_1`, `SUB_2`, ... in order.
    pub fn find_subblock_with_key(&self, name: &str) -> Option<&Block> {
        self.sub_blocks
            .iter()
            .flat_map(|group| group.iter())
            .find(|block| block.name == name)
    }
}

impl Block {
    /// Cells of `column` in row order (rows lacking it are skipped).
    pub fn column(&self, column: &str) -> Vec<&str> {
        self.rows.iter().filter_map(|row| row.get(column)).collect()
    }
}

/// Result of [`subdict_by_key`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockEntry<'a> {
    /// A block with that name
    Block(&'a Block),
    /// A cell in a column with that name
    Field(&'a str),
}

/// Depth-first search for the first block or column named `key`.
pub fn subdict_by_key<'a>(blocks: &'a [Block], key: &str) -> Option<BlockEntry<'a>> {
    for block in blocks {
        if block.name == key {
            return Some(BlockEntry::Block(block));
        }
        for row in &block.rows {
            if let Some(value) = row.get(key) {
                return Some(BlockEntry::Field(value));
            }
            for group in &row.sub_blocks {
                if let Some(found) = subdict_by_key(group, key) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// First block named `name` at any depth.
pub fn find_block<'a>(blocks: &'a [Block], name: &str) -> Option<&'a Block> {
    blocks.iter().find_map(|block| {
        if block.name == name {
            return Some(block);
        }
        block
            .rows
            .iter()
            .flat_map(|row| row.sub_blocks.iter())
            .find_map(|group| find_block(group, name))
    })
}

// ==================== Parsing ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Outside,
    NewMain,
    InMain,
    InSub,
    EndSub,
    EndMain,
}

fn is_end(line: &str) -> bool {
    line.starts_with("#END") || line.starts_with("#end")
}

/// Classify each line by nesting depth.
fn classify<'a>(lines: &[&'a str]) -> Vec<(&'a str, LineStatus)> {
    let mut depth = 0usize;
    let mut status = LineStatus::Outside;
    lines
        .iter()
        .map(|&line| {
            if is_end(line) {
                depth = depth.saturating_sub(1);
                status = match depth {
                    0 => LineStatus::EndMain,
                    1 => LineStatus::EndSub,
                    _ => LineStatus::InSub,
                };
            } else if line.starts_with('#') {
                match depth {
                    0 => status = LineStatus::NewMain,
                    1 => status = LineStatus::InSub,
                    _ => {}
                }
                depth += 1;
            } else if depth == 1 {
                status = LineStatus::InMain;
            }
            (line, status)
        })
        .collect()
}

fn parse_header(line: &str) -> (String, Vec<String>) {
    let (name, columns) = line.split_once(':').unwrap_or((line, ""));
    let name = name.replace('#', "").trim().to_string();
    let columns = columns
        .split('\t')
        .map(|c| c.trim().replace(['<', '>'], ""))
        .filter(|c| !c.is_empty())
        .collect();
    (name, columns)
}

/// Parse a block answer into its top-level blocks.
///
/// # Errors
///
/// [`GcsError::InvalidResponse`] if a row has a different number of cells
/// than its header has columns, or a sub-block precedes every row.
pub fn parse_block_answer(answer: &str) -> GcsResult<Vec<Block>> {
    let lines: Vec<&str> = answer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    parse_lines(&lines)
}

fn parse_lines(lines: &[&str]) -> GcsResult<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut current = Block::default();
    let mut sub_lines: Vec<&str> = Vec::new();

    for (line, status) in classify(lines) {
        match status {
            LineStatus::Outside => {}
            LineStatus::NewMain => {
                let (name, columns) = parse_header(line);
                current = Block {
                    name,
                    columns,
                    rows: Vec::new(),
                };
            }
            LineStatus::InMain => {
                let cells: Vec<&str> = line.split('\t').collect();
                if cells.len() != current.columns.len() {
                    return Err(GcsError::InvalidResponse(format!(
                        "block {:?}: {} columns {:?} but row {:?}",
                        current.name,
                        current.columns.len(),
                        current.columns,
                        cells
                    )));
                }
                let fields = current
                    .columns
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| (column.clone(), cell.to_string()))
                    .collect();
                current.rows.push(BlockRow {
                    fields,
                    sub_blocks: Vec::new(),
                });
            }
            LineStatus::InSub => sub_lines.push(line),
            LineStatus::EndSub => {
                sub_lines.push(line);
                let group = parse_lines(&sub_lines)?;
                sub_lines.clear();
                let row = current.rows.last_mut().ok_or_else(|| {
                    GcsError::InvalidResponse(format!(
                        "block {:?}: sub-block before first row",
                        current.name
                    ))
                })?;
                row.sub_blocks.push(group);
            }
            LineStatus::EndMain => blocks.push(std::mem::take(&mut current)),
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USG_PAM: &str = "#Parameter Overview: <Parameter ID>\t<Data Type>\t<Dimension>\n\
0x07000100\tFLOAT32\t1\n\
#Related Memory Types: Memory\n\
RAM\n\
FLASH\n\
#END\n\
#Related Units: <Container Unit>\t<Function Unit>\n\
AXIS_1\tPID\n\
#END\n\
0x16000201\tUINT32\t1\n\
#END\n";

    #[test]
    fn test_parse_nested_blocks() {
        let blocks = parse_block_answer(USG_PAM).unwrap();
        assert_eq!(blocks.len(), 1);
        let params = &blocks[0];
        assert_eq!(params.name, names::PARAM_OVERVIEW);
        assert_eq!(params.columns, ["Parameter ID", "Data Type", "Dimension"]);
        assert_eq!(params.rows.len(), 2);
        assert_eq!(params.column(keys::PARAM_ID), ["0x07000100", "0x16000201"]);

        let first = &params.rows[0];
        assert_eq!(first.sub_blocks.len(), 2);
        let memory = first.sub(1).unwrap();
        assert_eq!(memory[0].name, names::RELATED_MEMORY_TYPES);
        assert_eq!(memory[0].column("Memory"), ["RAM", "FLASH"]);
        assert!(first.sub(3).is_none());
        assert!(params.rows[1].sub_blocks.is_empty());
    }

    #[test]
    fn test_find_subblock_with_key() {
        let blocks = parse_block_answer(USG_PAM).unwrap();
        let row = &blocks[0].rows[0];
        let units = row.find_subblock_with_key(names::RELATED_UNITS).unwrap();
        assert_eq!(units.rows[0].get(keys::CONTAINER_UNIT), Some("AXIS_1"));
        assert!(row.find_subblock_with_key("Missing").is_none());
    }

    #[test]
    fn test_subdict_by_key_searches_depth_first() {
        let blocks = parse_block_answer(USG_PAM).unwrap();
        assert_eq!(
            subdict_by_key(&blocks, keys::FUNCTION_UNIT),
            Some(BlockEntry::Field("PID"))
        );
        match subdict_by_key(&blocks, names::RELATED_MEMORY_TYPES) {
            Some(BlockEntry::Block(block)) => assert_eq!(block.rows.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(find_block(&blocks, names::RELATED_UNITS).is_some());
        assert!(subdict_by_key(&blocks, "nothing").is_none());
    }

    #[test]
    fn test_multiple_main_blocks() {
        let answer = "#Unit Overview: Unit\tDescription\nAXIS_1\tAxis 1\n#END\n\
#User Command Level: Name\tValue\nADVANCED\t1\n#END\n";
        let blocks = parse_block_answer(answer).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].name, BLOCK_USER_COMMAND_LEVEL);
        assert_eq!(blocks[1].rows[0].get("Value"), Some("1"));
    }

    #[test]
    fn test_column_mismatch_is_rejected() {
        let answer = "#Command Overview: Command\tArguments\nMOV\n#END\n";
        assert!(matches!(
            parse_block_answer(answer),
            Err(GcsError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_leading_tabs_are_ignored() {
        let answer = "\t#Command Overview: Command\tArguments\n\tMOV\t<AxisID> <Pos>\n#END\n";
        let blocks = parse_block_answer(answer).unwrap();
        assert_eq!(blocks[0].rows[0].get(keys::COMMAND), Some("MOV"));
    }
}

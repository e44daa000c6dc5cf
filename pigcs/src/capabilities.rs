//! Supported-command cache.
//!
//! Built once from the controller's self description: the flat `HLP?`
//! listing on GCS 2.0 firmware or the `USG? CMD` block on GCS 2.1. Entries
//! are upper-case wire tokens (`MOV`, `POS?`, `MAC BEG`, `#5`).

use std::collections::BTreeSet;

use crate::blocks::{keys, Block};
use crate::registry;

/// Set of commands the connected firmware implements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    commands: BTreeSet<String>,
}

/// A token that looks like a GCS command: `MOV`, `POS?`, `*IDN?`, `#5`.
fn is_command_token(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '#' || first == '*' || first.is_ascii_uppercase())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || "_?*#".contains(c))
}

/// A sub-command word like `BEG` in `MAC BEG`.
fn is_subcommand_token(token: &str) -> bool {
    token.len() > 1 && token.chars().all(|c| c.is_ascii_uppercase() || c == '?')
}

impl Capabilities {
    /// Build from explicit wire tokens.
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Parse an `HLP?` answer.
    ///
    /// Each line starts with the command, followed by its argument syntax and
    /// a description. Lines that do not start with a command token are
    /// skipped. A following upper-case word is kept as sub-command form.
    pub fn from_help(answer: &str) -> Self {
        let mut commands = BTreeSet::new();
        for line in answer.lines() {
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            if !is_command_token(first) {
                continue;
            }
            commands.insert(first.to_string());
            if let Some(second) = tokens.next().filter(|t| is_subcommand_token(t)) {
                commands.insert(format!("{first} {second}"));
            }
        }
        Self { commands }
    }

    /// Collect the `Command` column of a `USG? CMD` answer, sub-blocks included.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        fn collect(blocks: &[Block], commands: &mut BTreeSet<String>) {
            for block in blocks {
                for row in &block.rows {
                    if let Some(command) = row.get(keys::COMMAND) {
                        let command = command.trim().to_ascii_uppercase();
                        if !command.is_empty() {
                            commands.insert(command);
                        }
                    }
                    for sub in &row.sub_blocks {
                        collect(sub, commands);
                    }
                }
            }
        }
        let mut commands = BTreeSet::new();
        collect(blocks, &mut commands);
        Self { commands }
    }

    /// True if `wire` (e.g. `MAC BEG` or `POS?`) is listed. Multi-word forms
    /// fall back to their first token.
    pub fn contains(&self, wire: &str) -> bool {
        let wire = wire.trim().to_ascii_uppercase();
        if self.commands.contains(&wire) {
            return true;
        }
        match wire.split_once(' ') {
            Some((first, _)) => self.commands.contains(first),
            None => false,
        }
    }

    /// True if the command behind method name `name` (`qPOS`, `MAC_BEG`) is listed.
    pub fn supports(&self, name: &str) -> bool {
        self.contains(&registry::wire_name(name))
    }

    /// Listed commands, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    /// Number of listed commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

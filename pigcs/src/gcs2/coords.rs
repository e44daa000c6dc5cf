//! Coordinate systems of hexapod and multi-axis controllers.
//!
//! A coordinate system is created under a name with one of the `KS*`/`KLD`
//! commands, linked into a chain with `KLN` and activated with `KEN`.

use indexmap::IndexMap;
use strum::{AsRefStr, EnumString};

use super::Gcs2Commands;
use crate::core::command_line;
use crate::error::GcsResult;
use crate::items::{parse_nested_values, split_answer, IntoItemValues, IntoItems, ItemMap};
use crate::values::{parse_float, ValueKind};

/// Kind of coordinate system, as used by `KEN?` and `KET?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum CoordinateSystemType {
    #[strum(serialize = "KSD")]
    Directed,
    #[strum(serialize = "KSB")]
    Base,
    #[strum(serialize = "KST")]
    Tool,
    #[strum(serialize = "KSW")]
    Work,
    #[strum(serialize = "KLD")]
    Levelling,
    #[strum(serialize = "KSF")]
    Fixed,
    #[strum(serialize = "ZERO")]
    Zero,
}

impl Gcs2Commands {
    fn define_system(
        &mut self,
        wire: &str,
        name: &str,
        values: impl IntoItemValues<f64>,
    ) -> GcsResult<()> {
        self.core.set_items(&format!("{wire} {name}"), values)
    }

    /// `KLD`: levelling system `name` from axis values.
    pub fn kld(&mut self, name: &str, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.define_system("KLD", name, values)
    }

    /// `KSB`: base system.
    pub fn ksb(&mut self, name: &str, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.define_system("KSB", name, values)
    }

    /// `KSD`: directed system.
    pub fn ksd(&mut self, name: &str, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.define_system("KSD", name, values)
    }

    /// `KST`: tool system.
    pub fn kst(&mut self, name: &str, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.define_system("KST", name, values)
    }

    /// `KSW`: work system.
    pub fn ksw(&mut self, name: &str, values: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.define_system("KSW", name, values)
    }

    /// `KSF`: fixed system at the current position.
    pub fn ksf(&mut self, name: &str) -> GcsResult<()> {
        self.core.send(&format!("KSF {name}"))
    }

    /// `KLF`: levelling system from the current position.
    pub fn klf(&mut self, name: &str) -> GcsResult<()> {
        self.core.send(&format!("KLF {name}"))
    }

    /// `KLN`: link `child` to `parent`.
    pub fn kln(&mut self, child: &str, parent: &str) -> GcsResult<()> {
        self.core.send(&format!("KLN {child} {parent}"))
    }

    /// `KCP`: copy `source` to a new system `destination`.
    pub fn kcp(&mut self, source: &str, destination: &str) -> GcsResult<()> {
        self.core.send(&format!("KCP {source} {destination}"))
    }

    /// `KEN`: activate `name`; `ZERO` deactivates all systems.
    pub fn ken(&mut self, name: &str) -> GcsResult<()> {
        self.core.send(&format!("KEN {name}"))
    }

    /// `KRM`: remove systems.
    pub fn krm(&mut self, names: impl IntoItems) -> GcsResult<()> {
        self.core.send_items("KRM", names)
    }

    /// `KLN?`: parent per child system.
    pub fn qkln(&mut self, names: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.core.query_str("KLN?", names)
    }

    /// `KEN?`: enabled system per type.
    pub fn qken(&mut self, types: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.core.query_str("KEN?", types)
    }

    /// `KET?`: type per system.
    pub fn qket(&mut self, names: impl IntoItems) -> GcsResult<ItemMap<String>> {
        self.core.query_str("KET?", names)
    }

    /// `KLS?`: axis values per system.
    pub fn qkls(
        &mut self,
        names: impl IntoItems,
    ) -> GcsResult<IndexMap<String, ItemMap<f64>>> {
        let names = names.into_items();
        let answer = self.core.read(&command_line("KLS?", &names.join(" ")))?;
        let nested = parse_nested_values(&answer, |_, _| ValueKind::Float)?;
        Ok(nested
            .into_iter()
            .map(|(name, axes)| {
                let values = axes
                    .into_iter()
                    .filter_map(|(axis, value)| value.as_f64().map(|v| (axis, v)))
                    .collect();
                (name, values)
            })
            .collect())
    }

    /// `KLT?`: resulting transformation from `start` to `end`.
    pub fn qklt(&mut self, start: Option<&str>, end: Option<&str>) -> GcsResult<ItemMap<f64>> {
        let args: Vec<&str> = start.into_iter().chain(end).collect();
        let answer = self.core.read(&command_line("KLT?", &args.join(" ")))?;
        split_answer(&answer)
            .into_iter()
            .map(|line| {
                let axis = line.keys.last().cloned().unwrap_or_default();
                Ok((axis, parse_float(&line.value)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::gcs2;
    use super::*;
    use crate::test_util::ScriptedTransport;

    #[test]
    fn test_define_and_link() {
        let transport = ScriptedTransport::new()
            .expect_silence("KSW WORK1 X 1 Z 0.5\n")
            .expect_silence("KLN WORK1 ZERO\n")
            .expect_silence("KEN WORK1\n")
            .expect("KEN?\n", "KSW=WORK1 \nKLD=LEVEL1\n")
            .expect_silence("KRM WORK1 LEVEL1\n");
        let mut dev = gcs2(transport);
        dev.ksw("WORK1", vec![("X", 1.0), ("Z", 0.5)]).unwrap();
        dev.kln("WORK1", "ZERO").unwrap();
        dev.ken("WORK1").unwrap();
        let enabled = dev.qken(()).unwrap();
        assert_eq!(enabled["KSW"], "WORK1");
        assert_eq!(
            "KLD".parse::<CoordinateSystemType>().unwrap(),
            CoordinateSystemType::Levelling
        );
        dev.krm("WORK1 LEVEL1").unwrap();
    }

    #[test]
    fn test_qkls_nested() {
        let transport = ScriptedTransport::new().expect(
            "KLS? WORK1\n",
            "WORK1 X=1.0 \nWORK1 Z=0.5\n",
        );
        let mut dev = gcs2(transport);
        let systems = dev.qkls("WORK1").unwrap();
        assert_eq!(systems["WORK1"]["Z"], 0.5);
    }

    #[test]
    fn test_qklt() {
        let transport = ScriptedTransport::new()
            .expect("KLT? ZERO WORK1\n", "ZERO WORK1 X=1.0 \nZERO WORK1 U=0\n");
        let mut dev = gcs2(transport);
        let values = dev.qklt(Some("ZERO"), Some("WORK1")).unwrap();
        assert_eq!(values["X"], 1.0);
        assert_eq!(values.len(), 2);
    }
}

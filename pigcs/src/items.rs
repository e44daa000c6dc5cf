//! Item lists and item→value maps.
//!
//! Most GCS commands address "items" (axes, channels, wave generators,
//! record tables, container units) and take or return one value per item:
//!
//! ```text
//! MOV 1 12.5 2 -3.0
//! POS? 1 2        ->  1=12.5 \n2=-3.0\n
//! ```
//!
//! [`IntoItems`] and [`IntoItemValues`] accept the shapes callers naturally
//! have (a single item, a slice, parallel lists, an ordered map) and produce
//! canonical parallel lists, checking arity before anything is written.
//! The `parse_*` functions split answers into ordered [`ItemMap`]s.

use indexmap::IndexMap;

use crate::config::FloatFormat;
use crate::error::{GcsError, GcsResult};
use crate::values::{ToWire, Value, ValueKind};

/// Ordered mapping from item id to value. Order follows the request, or the
/// controller's answer when the request named no items.
pub type ItemMap<V = Value> = IndexMap<String, V>;

/// Two-level ordered mapping (`{item: {parameter: value}}`).
pub type NestedItemMap<V = Value> = IndexMap<String, IndexMap<String, V>>;

// ==================== Item lists ====================

/// Anything that names zero or more items.
///
/// A string is split on whitespace, so `"1 2"` names two items. `()` names
/// none, which queries address as "all items".
pub trait IntoItems {
    /// The item ids in order.
    fn into_items(self) -> Vec<String>;
}

impl IntoItems for () {
    fn into_items(self) -> Vec<String> {
        Vec::new()
    }
}

impl IntoItems for &str {
    fn into_items(self) -> Vec<String> {
        self.split_whitespace().map(str::to_string).collect()
    }
}

impl IntoItems for String {
    fn into_items(self) -> Vec<String> {
        self.as_str().into_items()
    }
}

impl IntoItems for &String {
    fn into_items(self) -> Vec<String> {
        self.as_str().into_items()
    }
}

impl IntoItems for u32 {
    fn into_items(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl<S: AsRef<str>> IntoItems for &[S] {
    fn into_items(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoItems for Vec<S> {
    fn into_items(self) -> Vec<String> {
        self.as_slice().into_items()
    }
}

impl<S: AsRef<str>> IntoItems for &Vec<S> {
    fn into_items(self) -> Vec<String> {
        self.as_slice().into_items()
    }
}

impl<S: AsRef<str>, const N: usize> IntoItems for [S; N] {
    fn into_items(self) -> Vec<String> {
        self.as_slice().into_items()
    }
}

// ==================== Item/value pairs ====================

/// Anything that pairs items with values.
///
/// Accepted shapes: a single `(item, value)` pair, parallel
/// `(items, values)` slices or vectors, a list of pairs and an ordered map.
pub trait IntoItemValues<V> {
    /// Canonical `(items, values)`.
    ///
    /// # Errors
    ///
    /// [`GcsError::ArityMismatch`] if the parallel lists differ in length.
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)>;
}

fn check_arity<V>(items: Vec<String>, values: Vec<V>) -> GcsResult<(Vec<String>, Vec<V>)> {
    if items.len() != values.len() {
        return Err(GcsError::ArityMismatch {
            items: items.len(),
            values: values.len(),
        });
    }
    Ok((items, values))
}

impl<V> IntoItemValues<V> for (&str, V) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok((vec![self.0.to_string()], vec![self.1]))
    }
}

impl<V> IntoItemValues<V> for (String, V) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok((vec![self.0], vec![self.1]))
    }
}

impl<V> IntoItemValues<V> for (u32, V) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok((vec![self.0.to_string()], vec![self.1]))
    }
}

impl<S: AsRef<str>, V: Clone> IntoItemValues<V> for (&[S], &[V]) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        check_arity(self.0.into_items(), self.1.to_vec())
    }
}

impl<S: AsRef<str>, V> IntoItemValues<V> for (Vec<S>, Vec<V>) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        check_arity(self.0.into_items(), self.1)
    }
}

impl<S: AsRef<str>, V, const N: usize, const M: usize> IntoItemValues<V> for ([S; N], [V; M]) {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        check_arity(self.0.into_items(), Vec::from(self.1))
    }
}

impl<S: AsRef<str>, V> IntoItemValues<V> for Vec<(S, V)> {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok(self
            .into_iter()
            .map(|(item, value)| (item.as_ref().to_string(), value))
            .unzip())
    }
}

impl<V> IntoItemValues<V> for ItemMap<V> {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok(self.into_iter().unzip())
    }
}

impl<V: Clone> IntoItemValues<V> for &ItemMap<V> {
    fn into_item_values(self) -> GcsResult<(Vec<String>, Vec<V>)> {
        Ok(self.iter().map(|(k, v)| (k.clone(), v.clone())).unzip())
    }
}

/// Interleave items and values: `1 12.5 2 -3`.
pub fn join_pairs<V: ToWire>(items: &[String], values: &[V], format: &FloatFormat) -> String {
    items
        .iter()
        .zip(values)
        .map(|(item, value)| format!("{item} {}", value.to_wire(format)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join values only: `1 0 1`.
pub fn join_values<V: ToWire>(values: &[V], format: &FloatFormat) -> String {
    values
        .iter()
        .map(|v| v.to_wire(format))
        .collect::<Vec<_>>()
        .join(" ")
}

// ==================== Answer parsing ====================

/// One answer line split at its first `=`: `1 0x1 = 5` gives keys
/// `["1", "0x1"]` and value `5`. Lines without `=` have no keys.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerLine {
    /// Whitespace-separated tokens left of `=`
    pub keys: Vec<String>,
    /// Trimmed text right of `=` (or the whole line)
    pub value: String,
}

/// Split an answer into [`AnswerLine`]s, skipping blank lines.
pub fn split_answer(answer: &str) -> Vec<AnswerLine> {
    answer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('=') {
            Some((keys, value)) => AnswerLine {
                keys: keys.split_whitespace().map(str::to_string).collect(),
                value: value.trim().to_string(),
            },
            None => AnswerLine {
                keys: Vec::new(),
                value: line.to_string(),
            },
        })
        .collect()
}

/// Parse `item=value` lines into a map coerced to `kind`.
///
/// If `items` is non-empty the result follows its order and every item must
/// be answered. Otherwise the controller's order is kept.
pub fn parse_item_values(answer: &str, items: &[String], kind: ValueKind) -> GcsResult<ItemMap> {
    let mut parsed = ItemMap::new();
    for line in split_answer(answer) {
        let Some(key) = line.keys.first() else {
            return Err(GcsError::InvalidResponse(format!(
                "expected item=value, got {:?}",
                line.value
            )));
        };
        parsed.insert(key.clone(), Value::coerce(&line.value, kind)?);
    }
    if items.is_empty() {
        return Ok(parsed);
    }
    items
        .iter()
        .map(|item| {
            parsed
                .get(item)
                .or_else(|| {
                    parsed
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(item))
                        .map(|(_, v)| v)
                })
                .cloned()
                .map(|v| (item.clone(), v))
                .ok_or_else(|| GcsError::InvalidResponse(format!("no answer for item {item:?}")))
        })
        .collect()
}

/// Like [`parse_item_values`] but converting each value with `convert`.
pub fn parse_item_map<T>(
    answer: &str,
    items: &[String],
    kind: ValueKind,
    convert: impl Fn(&Value) -> Option<T>,
) -> GcsResult<ItemMap<T>> {
    parse_item_values(answer, items, kind)?
        .into_iter()
        .map(|(item, value)| {
            convert(&value)
                .map(|v| (item.clone(), v))
                .ok_or_else(|| {
                    GcsError::ParseError(format!("unexpected value {value} for item {item}"))
                })
        })
        .collect()
}

/// Parse `item param=value` lines into `{item: {param: value}}`.
///
/// `kind` picks the target type per `(item, param)`.
pub fn parse_nested_values(
    answer: &str,
    kind: impl Fn(&str, &str) -> ValueKind,
) -> GcsResult<NestedItemMap> {
    let mut parsed = NestedItemMap::new();
    for line in split_answer(answer) {
        let [item, param] = line.keys.as_slice() else {
            return Err(GcsError::InvalidResponse(format!(
                "expected 'item param=value', got keys {:?}",
                line.keys
            )));
        };
        let value = Value::coerce(&line.value, kind(item, param))?;
        parsed
            .entry(item.clone())
            .or_default()
            .insert(param.clone(), value);
    }
    Ok(parsed)
}

/// Parse whitespace-separated value tokens.
pub fn parse_values(answer: &str, kind: ValueKind) -> GcsResult<Vec<Value>> {
    answer
        .split_whitespace()
        .map(|token| Value::coerce(token, kind))
        .collect()
}

/// Parse the single value of a one-line answer.
pub fn parse_single(answer: &str, kind: ValueKind) -> GcsResult<Value> {
    let lines = split_answer(answer);
    match lines.as_slice() {
        [line] => Value::coerce(&line.value, kind),
        _ => Err(GcsError::InvalidResponse(format!(
            "expected one value, got {answer:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_items_shapes() {
        assert!(().into_items().is_empty());
        assert_eq!("1 2".into_items(), ["1", "2"]);
        assert_eq!(["X", "Y"].into_items(), ["X", "Y"]);
        assert_eq!(vec!["A".to_string()].into_items(), ["A"]);
        assert_eq!(3u32.into_items(), ["3"]);
    }

    #[test]
    fn test_into_item_values_shapes() {
        let (items, values) = ("X", 1.5).into_item_values().unwrap();
        assert_eq!((items, values), (vec!["X".to_string()], vec![1.5]));

        let (items, values) = (["1", "2"], [0.5, 1.0]).into_item_values().unwrap();
        assert_eq!(items, ["1", "2"]);
        assert_eq!(values, [0.5, 1.0]);

        let mut map: ItemMap<bool> = IndexMap::new();
        map.insert("B".to_string(), true);
        map.insert("A".to_string(), false);
        let (items, values) = map.into_item_values().unwrap();
        assert_eq!(items, ["B", "A"]);
        assert_eq!(values, [true, false]);
    }

    #[test]
    fn test_arity_mismatch() {
        let err = (vec!["1", "2"], vec![1.0]).into_item_values().unwrap_err();
        assert!(matches!(err, GcsError::ArityMismatch { items: 2, values: 1 }));
        assert!(err.is_usage());
    }

    #[test]
    fn test_join_pairs() {
        let format = FloatFormat::default();
        let items = vec!["1".to_string(), "2".to_string()];
        assert_eq!(join_pairs(&items, &[12.5, -3.0], &format), "1 12.5 2 -3");
        assert_eq!(join_values(&[true, false], &format), "1 0");
    }

    #[test]
    fn test_parse_item_values_follows_request_order() {
        let answer = "1=0.5 \n2=1.25\n";
        let items = vec!["2".to_string(), "1".to_string()];
        let parsed = parse_item_values(answer, &items, ValueKind::Float).unwrap();
        let keys: Vec<_> = parsed.keys().cloned().collect();
        assert_eq!(keys, ["2", "1"]);
        assert_eq!(parsed["1"], Value::Float(0.5));

        let all = parse_item_values(answer, &[], ValueKind::Float).unwrap();
        assert_eq!(all.keys().next().map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_item_values_missing_item() {
        let items = vec!["3".to_string()];
        assert!(parse_item_values("1=0\n", &items, ValueKind::Int).is_err());
        assert!(parse_item_values("garbage\n", &[], ValueKind::Int).is_err());
    }

    #[test]
    fn test_parse_nested_values() {
        let answer = "1 0x1=0.5 \n1 0x2=3 \n2 0x1=0.25\n";
        let parsed = parse_nested_values(answer, |_, p| {
            if p == "0x2" {
                ValueKind::Int
            } else {
                ValueKind::Float
            }
        })
        .unwrap();
        assert_eq!(parsed["1"]["0x2"], Value::Int(3));
        assert_eq!(parsed["2"]["0x1"], Value::Float(0.25));
    }

    #[test]
    fn test_parse_single_and_values() {
        assert_eq!(parse_single("2.1\n", ValueKind::Float).unwrap(), Value::Float(2.1));
        assert!(parse_single("1 \n2\n", ValueKind::Float).is_err());
        assert_eq!(
            parse_values("1 2 3\n", ValueKind::Int).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }
}

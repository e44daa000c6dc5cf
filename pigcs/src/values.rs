//! Typed values exchanged with the controller.
//!
//! Controller answers are text. A [`Value`] is the tagged result of coercing
//! one answer token to the type a command (or the parameter schema) declares.
//! [`ValueKind::Guess`] tries integer, then float, then string.
//!
//! The outbound direction goes through [`ToWire`], which formats floats with
//! the handle's [`FloatFormat`] and booleans as `0`/`1`.

use std::fmt;

use indexmap::IndexMap;

use crate::config::FloatFormat;
use crate::error::{GcsError, GcsResult};

/// A coerced answer token.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer (decimal or `0x` hex on the wire)
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Boolean sent as `0`/`1`
    Bool(bool),
    /// Anything else, trimmed
    Str(String),
}

/// Target type for [`Value::coerce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// [`Value::Int`]
    Int,
    /// [`Value::Float`]
    Float,
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Str`]
    Str,
    /// Integer first, then float, then string
    #[default]
    Guess,
}

impl Value {
    /// Convert `token` to `kind`.
    pub fn coerce(token: &str, kind: ValueKind) -> GcsResult<Self> {
        let token = token.trim();
        match kind {
            ValueKind::Int => parse_int(token).map(Value::Int),
            ValueKind::Float => parse_float(token).map(Value::Float),
            ValueKind::Bool => parse_bool(token).map(Value::Bool),
            ValueKind::Str => Ok(Value::Str(token.to_string())),
            ValueKind::Guess => Ok(Self::guess(token)),
        }
    }

    /// Integer, then float, then string.
    pub fn guess(token: &str) -> Self {
        let token = token.trim();
        if let Ok(i) = parse_int(token) {
            Value::Int(i)
        } else if let Ok(f) = token.parse::<f64>() {
            Value::Float(f)
        } else {
            Value::Str(token.to_string())
        }
    }

    /// The [`ValueKind`] this value was coerced to.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Str(_) => ValueKind::Str,
        }
    }

    /// Numeric view; integers and booleans widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => parse_float(s).ok(),
        }
    }

    /// Integer view; floats only if they are integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(_) => None,
            Value::Str(s) => parse_int(s).ok(),
        }
    }

    /// Boolean view; numbers are true when nonzero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => parse_bool(s).ok(),
        }
    }

    /// String payload, if this is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ==================== Token parsing ====================

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
pub fn parse_int(token: &str) -> GcsResult<i64> {
    let token = token.trim();
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    };
    parsed
        .map(|v| if negative { -v } else { v })
        .map_err(|_| GcsError::ParseError(format!("invalid integer {token:?}")))
}

/// Parse a float, accepting hex integers and engineering suffixes.
pub fn parse_float(token: &str) -> GcsResult<f64> {
    let token = token.trim();
    if let Ok(v) = token.parse::<f64>() {
        return Ok(v);
    }
    if let Ok(i) = parse_int(token) {
        return Ok(i as f64);
    }
    parse_engineering(token)
}

/// Parse `0`/`1` (or `true`/`false`) into a boolean.
pub fn parse_bool(token: &str) -> GcsResult<bool> {
    let token = token.trim();
    if token.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    parse_int(token)
        .map(|v| v != 0)
        .map_err(|_| GcsError::ParseError(format!("invalid boolean {token:?}")))
}

// ==================== Engineering notation ====================

const SI_PREFIXES: &[(char, i32)] = &[
    ('y', -24),
    ('z', -21),
    ('a', -18),
    ('f', -15),
    ('p', -12),
    ('n', -9),
    ('u', -6),
    ('µ', -6),
    ('m', -3),
    ('k', 3),
    ('M', 6),
    ('G', 9),
    ('T', 12),
    ('P', 15),
    ('E', 18),
    ('Z', 21),
    ('Y', 24),
];

fn prefix_exponent(c: char) -> Option<i32> {
    SI_PREFIXES.iter().find(|(p, _)| *p == c).map(|(_, e)| *e)
}

fn exponent_prefix(exp: i32) -> Option<char> {
    SI_PREFIXES
        .iter()
        .find(|(p, e)| *e == exp && *p != 'µ')
        .map(|(p, _)| *p)
}

/// Parse a number with an optional SI suffix: `1.717k`, `450M`, `100.00n`.
///
/// The mantissa is rescaled textually so the result is the correctly
/// rounded value of the written number.
pub fn parse_engineering(text: &str) -> GcsResult<f64> {
    let text = text.trim();
    let invalid = || GcsError::ParseError(format!("invalid engineering value {text:?}"));
    let Some(last) = text.chars().last() else {
        return Err(invalid());
    };
    match prefix_exponent(last) {
        Some(exp) => {
            let mantissa = &text[..text.len() - last.len_utf8()];
            mantissa.trim().parse::<f64>().map_err(|_| invalid())?;
            format!("{}e{exp}", mantissa.trim())
                .parse::<f64>()
                .map_err(|_| invalid())
        }
        None => text.parse::<f64>().map_err(|_| invalid()),
    }
}

/// Format `value` in engineering notation (`1717.0` -> `1.717k`).
///
/// Uses the shortest digit string that parses back to `value`.
pub fn format_engineering(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let sci = format!("{:e}", value.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return value.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return value.to_string();
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let exp3 = (exp.div_euclid(3) * 3).clamp(-24, 24);
    let int_len = 1 + exp - exp3;

    let body = if int_len <= 0 {
        format!("0.{}{}", "0".repeat(int_len.unsigned_abs() as usize), digits)
    } else {
        let int_len = int_len as usize;
        if digits.len() <= int_len {
            format!("{digits}{}", "0".repeat(int_len - digits.len()))
        } else {
            format!("{}.{}", &digits[..int_len], &digits[int_len..])
        }
    };
    let sign = if value < 0.0 { "-" } else { "" };
    match exponent_prefix(exp3) {
        Some(prefix) => format!("{sign}{body}{prefix}"),
        None => format!("{sign}{body}"),
    }
}

// ==================== Flag words ====================

/// Parse a hexadecimal flag word as answered by `#5`, `#6` and `#9`.
pub fn parse_hex_word(answer: &str) -> GcsResult<u64> {
    let token = answer.trim();
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16)
        .map_err(|_| GcsError::ParseError(format!("invalid flag word {token:?}")))
}

/// Map bit `i` of `word` to `items[i]`.
pub fn bits_to_items<S: AsRef<str>>(word: u64, items: &[S]) -> IndexMap<String, bool> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let set = i < 64 && word & (1 << i) != 0;
            (item.as_ref().to_string(), set)
        })
        .collect()
}

/// Format a parameter id the way the controller expects it (`0x7000100`).
pub fn format_hex(id: u32) -> String {
    format!("0x{id:x}")
}

// ==================== Outbound formatting ====================

/// A command argument that can be written to the wire.
pub trait ToWire {
    /// Text for the command line; floats use `format`.
    fn to_wire(&self, format: &FloatFormat) -> String;
}

impl ToWire for f64 {
    fn to_wire(&self, format: &FloatFormat) -> String {
        format.format(*self)
    }
}

impl ToWire for f32 {
    fn to_wire(&self, format: &FloatFormat) -> String {
        format.format(f64::from(*self))
    }
}

impl ToWire for bool {
    fn to_wire(&self, _format: &FloatFormat) -> String {
        u8::from(*self).to_string()
    }
}

macro_rules! int_to_wire {
    ($($t:ty),*) => {
        $(impl ToWire for $t {
            fn to_wire(&self, _format: &FloatFormat) -> String {
                self.to_string()
            }
        })*
    };
}

int_to_wire!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl ToWire for str {
    fn to_wire(&self, _format: &FloatFormat) -> String {
        self.to_string()
    }
}

impl ToWire for &str {
    fn to_wire(&self, _format: &FloatFormat) -> String {
        (*self).to_string()
    }
}

impl ToWire for String {
    fn to_wire(&self, _format: &FloatFormat) -> String {
        self.clone()
    }
}

impl ToWire for Value {
    fn to_wire(&self, format: &FloatFormat) -> String {
        match self {
            Value::Float(v) => format.format(*v),
            other => other.to_string(),
        }
    }
}

/// Format `value` as the declared parameter type `kind` expects it.
///
/// # Errors
///
/// [`GcsError::InvalidArgument`] if the value cannot be represented, e.g. a
/// fractional float for an integer parameter.
pub fn format_typed(value: &Value, kind: ValueKind, format: &FloatFormat) -> GcsResult<String> {
    let mismatch = || GcsError::InvalidArgument(format!("{value} is not a valid {kind:?} value"));
    match kind {
        ValueKind::Int => value.as_i64().map(|i| i.to_string()).ok_or_else(mismatch),
        ValueKind::Float => value.as_f64().map(|f| format.format(f)).ok_or_else(mismatch),
        ValueKind::Bool => value.as_bool().map(|b| u8::from(b).to_string()).ok_or_else(mismatch),
        ValueKind::Str => Ok(value.to_string()),
        ValueKind::Guess => Ok(value.to_wire(format)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_format_typed() {
        let format = FloatFormat::default();
        assert_eq!(format_typed(&Value::Float(3.0), ValueKind::Int, &format).unwrap(), "3");
        assert!(format_typed(&Value::Float(3.5), ValueKind::Int, &format).is_err());
        assert_eq!(format_typed(&Value::Int(2), ValueKind::Float, &format).unwrap(), "2");
        assert_eq!(format_typed(&Value::Bool(true), ValueKind::Bool, &format).unwrap(), "1");
        assert_eq!(format_typed(&Value::from("abc"), ValueKind::Str, &format).unwrap(), "abc");
    }

    #[test]
    fn test_coerce_kinds() {
        assert_eq!(Value::coerce(" 0x1A ", ValueKind::Int).unwrap(), Value::Int(26));
        assert_eq!(Value::coerce("-12", ValueKind::Int).unwrap(), Value::Int(-12));
        assert_eq!(Value::coerce("2.5", ValueKind::Float).unwrap(), Value::Float(2.5));
        assert_eq!(Value::coerce("1", ValueKind::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::coerce("0", ValueKind::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            Value::coerce("µm ", ValueKind::Str).unwrap(),
            Value::Str("µm".to_string())
        );
        assert!(Value::coerce("abc", ValueKind::Int).is_err());
        assert!(Value::coerce("x", ValueKind::Bool).is_err());
    }

    #[test]
    fn test_guess_order() {
        assert_eq!(Value::guess("42"), Value::Int(42));
        assert_eq!(Value::guess("0x10"), Value::Int(16));
        assert_eq!(Value::guess("4.2e1"), Value::Float(42.0));
        assert_eq!(Value::guess("AXIS_1"), Value::Str("AXIS_1".to_string()));
    }

    #[test]
    fn test_value_views() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Str("1".into()).as_bool(), Some(true));
        assert_eq!(Value::Bool(true).to_string(), "1");
    }

    #[test]
    fn test_parse_engineering() {
        assert_eq!(parse_engineering("1.717k").unwrap(), 1717.0);
        assert_eq!(parse_engineering("450M").unwrap(), 450e6);
        assert_eq!(parse_engineering("100.00n").unwrap(), 100e-9);
        assert_eq!(parse_engineering("3µ").unwrap(), 3e-6);
        assert_eq!(parse_engineering("12.5").unwrap(), 12.5);
        assert!(parse_engineering("k").is_err());
        assert!(parse_engineering("").is_err());
    }

    #[test]
    fn test_format_engineering() {
        assert_eq!(format_engineering(1717.0), "1.717k");
        assert_eq!(format_engineering(450e6), "450M");
        assert_eq!(format_engineering(100e-9), "100n");
        assert_eq!(format_engineering(-0.0025), "-2.5m");
        assert_eq!(format_engineering(12.5), "12.5");
        assert_eq!(format_engineering(0.0), "0");
    }

    #[test]
    fn test_engineering_round_trip() {
        for v in [1717.0, 450e6, 100e-9, 1.0 / 3.0, 6.02214076e23, 1.5e-30, -7.25e4] {
            let parsed = parse_engineering(&format_engineering(v)).unwrap();
            assert_relative_eq!(parsed, v, max_relative = f64::EPSILON);
        }
    }

    #[test]
    fn test_flag_words() {
        assert_eq!(parse_hex_word("0x5\n").unwrap(), 5);
        assert_eq!(parse_hex_word("A").unwrap(), 10);
        assert!(parse_hex_word("zz").is_err());

        let moving = bits_to_items(0b101, &["1", "2", "3"]);
        assert_eq!(moving.get("1"), Some(&true));
        assert_eq!(moving.get("2"), Some(&false));
        assert_eq!(moving.get("3"), Some(&true));
    }

    #[test]
    fn test_to_wire() {
        let format = FloatFormat::default();
        assert_eq!(2.5f64.to_wire(&format), "2.5");
        assert_eq!(true.to_wire(&format), "1");
        assert_eq!(7u32.to_wire(&format), "7");
        assert_eq!("X".to_wire(&format), "X");
        assert_eq!(Value::Float(0.1).to_wire(&format), "0.1");
        assert_eq!(format_hex(0x0700_0100), "0x7000100");
    }
}

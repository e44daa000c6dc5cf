//! Per-handle connection settings.
//!
//! Every controller handle carries a [`ConnectionSettings`] describing how
//! the framing layer behaves: whether `ERR?` is polled after each command,
//! whether that poll rides in the same transmission, the read timeout, how
//! floats are written on the wire, and an optional traffic log file.
//!
//! Settings can be loaded from JSON:
//!
//! ```
//! use pigcs::ConnectionSettings;
//!
//! let settings = ConnectionSettings::from_json(r#"{ "timeout_ms": 30000, "embederr": true }"#)?;
//! assert!(settings.errcheck);
//! assert!(settings.embederr);
//! assert_eq!(settings.timeout().as_secs(), 30);
//! # Ok::<(), pigcs::GcsError>(())
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GcsError, GcsResult};

/// Default read timeout, matching the vendor driver.
pub const DEFAULT_TIMEOUT_MS: u64 = 7000;

/// Options recognised by a controller handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Query `ERR?` after every command and raise on a nonzero code.
    pub errcheck: bool,
    /// Append `ERR?` to the same transmission as each command.
    pub embederr: bool,
    /// Timeout applied to each line read, in milliseconds.
    pub timeout_ms: u64,
    /// How floats are formatted in outgoing commands.
    pub float_format: FloatFormat,
    /// Append human-readable traffic to this file.
    pub logfile_path: Option<PathBuf>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            errcheck: true,
            embederr: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            float_format: FloatFormat::default(),
            logfile_path: None,
        }
    }
}

impl ConnectionSettings {
    /// Parse settings from a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> GcsResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| GcsError::InvalidArgument(format!("invalid settings: {e}")))
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> GcsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Read timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Notation of a [`FloatFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatNotation {
    /// `%g`: shortest of fixed and exponent, trailing zeros removed
    General,
    /// `%f`: fixed point
    Fixed,
    /// `%e`: exponent
    Exponent,
}

/// A printf-style float specifier: `.12g`, `.3f`, `.6e`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    /// Significant digits for `g`, digits after the point for `f` and `e`
    pub precision: usize,
    /// Output notation
    pub notation: FloatNotation,
}

impl Default for FloatFormat {
    fn default() -> Self {
        Self {
            precision: 12,
            notation: FloatNotation::General,
        }
    }
}

impl FloatFormat {
    /// Format `value` for the wire.
    pub fn format(&self, value: f64) -> String {
        if value.is_nan() {
            return "nan".to_string();
        }
        if value.is_infinite() {
            return if value > 0.0 { "inf" } else { "-inf" }.to_string();
        }
        match self.notation {
            FloatNotation::Fixed => format!("{:.*}", self.precision, value),
            FloatNotation::Exponent => c_exponent(value, self.precision),
            FloatNotation::General => c_general(value, self.precision),
        }
    }
}

/// `%.{p}e` as C prints it: `1.500000e+03`.
fn c_exponent(value: f64, precision: usize) -> String {
    let rust = format!("{:.*e}", precision, value);
    let (mantissa, exp) = rust.split_once('e').unwrap_or((rust.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

/// `%.{p}g` as C prints it.
fn c_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let p = precision.max(1);
    // Exponent after rounding to p significant digits.
    let rounded = format!("{:.*e}", p - 1, value);
    let exp: i32 = rounded
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= p as i32 {
        let text = c_exponent(value, p - 1);
        match text.split_once('e') {
            Some((mantissa, tail)) => format!("{}e{}", strip_fraction_zeros(mantissa), tail),
            None => text,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        strip_fraction_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_fraction_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

impl FromStr for FloatFormat {
    type Err = GcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim().trim_start_matches('%');
        let invalid = || GcsError::InvalidArgument(format!("invalid float format: {s:?}"));

        let kind = spec.chars().last().ok_or_else(invalid)?;
        let notation = match kind {
            'g' | 'G' => FloatNotation::General,
            'f' | 'F' => FloatNotation::Fixed,
            'e' | 'E' => FloatNotation::Exponent,
            _ => return Err(invalid()),
        };
        let body = &spec[..spec.len() - kind.len_utf8()];
        let precision = match body.strip_prefix('.') {
            Some(digits) => digits.parse().map_err(|_| invalid())?,
            None if body.is_empty() => 6,
            None => return Err(invalid()),
        };
        Ok(Self {
            precision,
            notation,
        })
    }
}

impl fmt::Display for FloatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.notation {
            FloatNotation::General => 'g',
            FloatNotation::Fixed => 'f',
            FloatNotation::Exponent => 'e',
        };
        write!(f, ".{}{}", self.precision, kind)
    }
}

impl Serialize for FloatFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FloatFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

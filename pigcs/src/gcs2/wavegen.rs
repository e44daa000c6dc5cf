//! Wave generator commands.
//!
//! A wave table holds a waveform built from segments (`WAV`); a wave
//! generator plays a table (`WSL`) on its axis, scaled by the table rate
//! (`WTR`), shifted by an offset (`WOS`) and repeated `WGC` times once
//! started with `WGO`.

use indexmap::IndexMap;
use strum::AsRefStr;

use super::Gcs2Commands;
use crate::core::command_line;
use crate::error::{GcsError, GcsResult};
use crate::gcsdata::GcsDataHeader;
use crate::items::{join_values, parse_nested_values, IntoItemValues, IntoItems, ItemMap};
use crate::values::{parse_int, ValueKind};

/// How a `WAV` segment combines with the table's current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr)]
pub enum WaveAppend {
    /// Clear the table first
    #[default]
    #[strum(serialize = "X")]
    Clear,
    /// Append after the last point
    #[strum(serialize = "&")]
    Append,
    /// Add point by point to the existing content
    #[strum(serialize = "+")]
    Add,
}

/// One `WAV` segment.
///
/// Lengths and point indices count wave table points; `center` is the
/// point where a curve reaches its maximum.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum Waveform {
    /// Full sine period.
    #[strum(serialize = "SIN")]
    Sin {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        wave_length: u32,
        start_point: u32,
        center: u32,
    },
    /// Sine segment with configurable center point.
    #[strum(serialize = "SIN_P")]
    SinP {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        wave_length: u32,
        start_point: u32,
        center: u32,
    },
    /// Triangle with smoothed turning points.
    #[strum(serialize = "RAMP")]
    Ramp {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        wave_length: u32,
        start_point: u32,
        speed_up_down: u32,
        center: u32,
    },
    /// Single line with smoothed ends.
    #[strum(serialize = "LIN")]
    Lin {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        wave_length: u32,
        start_point: u32,
        speed_up_down: u32,
    },
    /// Polynomial `a0 + a1 (x - x0) + a2 (x - x0)^2 ...`.
    #[strum(serialize = "POL")]
    Pol {
        start_point: u32,
        wave_length: u32,
        x0: f64,
        coefficients: Vec<f64>,
    },
    /// Explicit points.
    #[strum(serialize = "PNT")]
    Pnt { start_point: u32, points: Vec<f64> },
    /// Linear frequency sweep.
    #[strum(serialize = "SWEEP")]
    Sweep {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        start_frequency: f64,
        stop_frequency: f64,
    },
    /// White noise.
    #[strum(serialize = "NOISE")]
    Noise {
        amplitude: f64,
        offset: f64,
        seg_length: u32,
    },
    /// Tangent segment.
    #[strum(serialize = "TAN")]
    Tan {
        seg_length: u32,
        amplitude: f64,
        offset: f64,
        wave_length: u32,
        start_point: u32,
        center: u32,
    },
}

impl Waveform {
    /// Arguments after the wave type, in wire order.
    fn arguments(&self) -> Vec<f64> {
        match self {
            Waveform::Sin {
                seg_length,
                amplitude,
                offset,
                wave_length,
                start_point,
                center,
            }
            | Waveform::SinP {
                seg_length,
                amplitude,
                offset,
                wave_length,
                start_point,
                center,
            }
            | Waveform::Tan {
                seg_length,
                amplitude,
                offset,
                wave_length,
                start_point,
                center,
            } => vec![
                f64::from(*seg_length),
                *amplitude,
                *offset,
                f64::from(*wave_length),
                f64::from(*start_point),
                f64::from(*center),
            ],
            Waveform::Ramp {
                seg_length,
                amplitude,
                offset,
                wave_length,
                start_point,
                speed_up_down,
                center,
            } => vec![
                f64::from(*seg_length),
                *amplitude,
                *offset,
                f64::from(*wave_length),
                f64::from(*start_point),
                f64::from(*speed_up_down),
                f64::from(*center),
            ],
            Waveform::Lin {
                seg_length,
                amplitude,
                offset,
                wave_length,
                start_point,
                speed_up_down,
            } => vec![
                f64::from(*seg_length),
                *amplitude,
                *offset,
                f64::from(*wave_length),
                f64::from(*start_point),
                f64::from(*speed_up_down),
            ],
            Waveform::Pol {
                start_point,
                wave_length,
                x0,
                coefficients,
            } => {
                let mut args = vec![
                    f64::from(*start_point),
                    f64::from(*wave_length),
                    *x0,
                    coefficients.len() as f64,
                ];
                args.extend(coefficients);
                args
            }
            Waveform::Pnt { start_point, points } => {
                let mut args = vec![f64::from(*start_point), points.len() as f64];
                args.extend(points);
                args
            }
            Waveform::Sweep {
                seg_length,
                amplitude,
                offset,
                start_frequency,
                stop_frequency,
            } => vec![
                f64::from(*seg_length),
                *amplitude,
                *offset,
                *start_frequency,
                *stop_frequency,
            ],
            Waveform::Noise {
                amplitude,
                offset,
                seg_length,
            } => vec![*amplitude, *offset, f64::from(*seg_length)],
        }
    }

    fn validate(&self) -> GcsResult<()> {
        match self {
            Waveform::Pnt { points, .. } if points.is_empty() => {
                Err(GcsError::InvalidArgument("PNT needs at least one point".to_string()))
            }
            Waveform::Pol { coefficients, .. } if coefficients.is_empty() => {
                Err(GcsError::InvalidArgument("POL needs at least one coefficient".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl Gcs2Commands {
    /// `WAV`: write one segment into wave table `table`.
    pub fn wav(&mut self, table: u32, append: WaveAppend, waveform: &Waveform) -> GcsResult<()> {
        waveform.validate()?;
        let args = join_values(&waveform.arguments(), &self.core.float_format());
        self.core.send(&format!(
            "WAV {table} {} {} {args}",
            append.as_ref(),
            waveform.as_ref()
        ))
    }

    /// `WAV?`: wave table parameters, e.g. parameter 1 is the table length.
    pub fn qwav(&mut self, tables: &[u32], params: &[u32]) -> GcsResult<IndexMap<String, IndexMap<u32, f64>>> {
        if tables.len() != params.len() {
            return Err(GcsError::ArityMismatch {
                items: tables.len(),
                values: params.len(),
            });
        }
        let args: Vec<String> = tables
            .iter()
            .zip(params)
            .map(|(t, p)| format!("{t} {p}"))
            .collect();
        let answer = self.core.read(&command_line("WAV?", &args.join(" ")))?;
        parse_nested_values(&answer, |_, _| ValueKind::Float)?
            .into_iter()
            .map(|(table, params)| {
                let params = params
                    .into_iter()
                    .map(|(param, value)| {
                        let id = u32::try_from(parse_int(&param)?)
                            .map_err(|_| GcsError::ParseError(format!("bad WAV? parameter {param}")))?;
                        let value = value
                            .as_f64()
                            .ok_or_else(|| GcsError::ParseError(format!("bad WAV? value {value}")))?;
                        Ok((id, value))
                    })
                    .collect::<GcsResult<IndexMap<u32, f64>>>()?;
                Ok((table, params))
            })
            .collect()
    }

    /// `WGO`: start mode per generator (0 stops, bit 0 starts immediately).
    pub fn wgo(&mut self, modes: impl IntoItemValues<u32>) -> GcsResult<()> {
        self.core.set_items("WGO", modes)
    }

    /// `WGO?`
    pub fn qwgo(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<i64>> {
        self.core.query_i64("WGO?", generators)
    }

    /// `WSL`: connect generators to wave tables.
    pub fn wsl(&mut self, tables: impl IntoItemValues<u32>) -> GcsResult<()> {
        self.core.set_items("WSL", tables)
    }

    /// `WSL?`
    pub fn qwsl(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<i64>> {
        self.core.query_i64("WSL?", generators)
    }

    /// `WGC`: number of output cycles, 0 for endless.
    pub fn wgc(&mut self, cycles: impl IntoItemValues<u32>) -> GcsResult<()> {
        self.core.set_items("WGC", cycles)
    }

    /// `WGC?`
    pub fn qwgc(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<i64>> {
        self.core.query_i64("WGC?", generators)
    }

    /// `WOS`: offset added to the generator output.
    pub fn wos(&mut self, offsets: impl IntoItemValues<f64>) -> GcsResult<()> {
        self.core.set_items("WOS", offsets)
    }

    /// `WOS?`
    pub fn qwos(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<f64>> {
        self.core.query_f64("WOS?", generators)
    }

    /// `WTR`: output a table point every `rate` servo cycles, with the given
    /// interpolation (0 none, 1 linear). Generator 0 addresses all.
    pub fn wtr(&mut self, generator: u32, rate: u32, interpolation: u32) -> GcsResult<()> {
        self.core.send(&format!("WTR {generator} {rate} {interpolation}"))
    }

    /// `WTR?`: `(rate, interpolation)` per generator.
    pub fn qwtr(&mut self, generators: impl IntoItems) -> GcsResult<ItemMap<(u32, u32)>> {
        self.core
            .query_str("WTR?", generators)?
            .into_iter()
            .map(|(generator, text)| {
                let fields = text
                    .split_whitespace()
                    .map(|t| parse_int(t).map(|v| v as u32))
                    .collect::<GcsResult<Vec<u32>>>()?;
                match fields.as_slice() {
                    [rate, interpolation] => Ok((generator, (*rate, *interpolation))),
                    [rate] => Ok((generator, (*rate, 0))),
                    _ => Err(GcsError::InvalidResponse(format!("WTR? answered {text:?}"))),
                }
            })
            .collect()
    }

    /// `TWC`: clear all trigger points.
    pub fn twc(&mut self) -> GcsResult<()> {
        self.core.send("TWC")
    }

    /// `TWS`: set or clear the trigger output at wave table points.
    pub fn tws(&mut self, lines: &[u32], points: &[u32], switches: &[bool]) -> GcsResult<()> {
        if lines.len() != points.len() || lines.len() != switches.len() {
            return Err(GcsError::ArityMismatch {
                items: lines.len(),
                values: points.len().min(switches.len()),
            });
        }
        if lines.is_empty() {
            return Err(GcsError::InvalidArgument("TWS needs at least one point".to_string()));
        }
        let args: Vec<String> = lines
            .iter()
            .zip(points)
            .zip(switches)
            .map(|((line, point), on)| format!("{line} {point} {}", u8::from(*on)))
            .collect();
        self.core.send(&format!("TWS {}", args.join(" ")))
    }

    /// `TWS?`: trigger states as bulk data, one column per line.
    pub fn qtws(&mut self, lines: &[u32], offset: u32, count: usize) -> GcsResult<GcsDataHeader> {
        let lines: Vec<String> = lines.iter().map(u32::to_string).collect();
        let command = command_line(&format!("TWS? {offset} {count}"), &lines.join(" "));
        self.core.messages_mut().read_gcsdata(&command, Some(count))
    }

    /// `TWG?`: number of wave generators.
    pub fn qtwg(&mut self) -> GcsResult<i64> {
        parse_int(&self.core.query_text("TWG?")?)
    }

    /// `GWD?`: wave table content as bulk data, one column per table.
    pub fn qgwd(&mut self, tables: &[u32], offset: u32, count: usize) -> GcsResult<GcsDataHeader> {
        let tables: Vec<String> = tables.iter().map(u32::to_string).collect();
        let command = command_line(&format!("GWD? {offset} {count}"), &tables.join(" "));
        self.core.messages_mut().read_gcsdata(&command, Some(count))
    }
}

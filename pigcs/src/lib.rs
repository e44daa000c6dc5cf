//! Client library for Physik Instrumente (PI) motion controllers.
//!
//! Controllers speak one of two dialects of PI's General Command Set over
//! RS-232, USB, TCP/IP or a daisy chain: GCS 2.0 (flat integer error codes,
//! `SPA` parameters addressed by item and id) and GCS 2.1 (packed error
//! codes, `SPV` parameters addressed by memory type and container unit).
//!
//! # Layers
//!
//! - [`transport`] - byte links and the daisy-chain multiplexer
//! - [`messages`] - line framing, error polling, bulk data pump
//! - [`core`] - typed queries and caches shared by both dialects
//! - [`commands`] - the common vocabulary ([`GcsCommands`])
//! - [`gcs2`] / [`gcs21`] - dialect specific commands
//! - [`device`] - dialect detection and [`GcsDevice`]
//! - [`datarecorder`] / [`tools`] - higher level helpers
//!
//! # Example
//!
//! ```no_run
//! use pigcs::{ConnectionSettings, GcsCommands, GcsDevice, Interface};
//!
//! let interface = Interface::TcpIp { host: "192.168.15.210".into(), port: 50000 };
//! let mut device = GcsDevice::open(&interface, ConnectionSettings::default())?;
//! println!("{}", device.qidn()?);
//! device.svo(("X", true))?;
//! device.mov(("X", 12.5))?;
//! # Ok::<(), pigcs::GcsError>(())
//! ```

pub mod blocks;
pub mod capabilities;
pub mod commands;
pub mod config;
pub mod core;
pub mod datarecorder;
pub mod device;
pub mod error;
pub mod gcs2;
pub mod gcs21;
pub mod gcsdata;
pub mod items;
pub mod messages;
pub mod registry;
pub mod schema;
pub mod tools;
pub mod transport;
pub mod values;

mod gcs21_errors;
mod gcs2_errors;

#[cfg(test)]
mod test_util;

pub use commands::GcsCommands;
pub use config::{ConnectionSettings, FloatFormat};
pub use device::{DaisyChainConnection, DaisyChainOptions, GcsDevice};
pub use error::{ControllerError, ErrorInfo, GcsError, GcsResult, Syntax};
pub use gcsdata::{BufState, GcsDataHeader};
pub use items::ItemMap;
pub use messages::GcsMessages;
pub use transport::{DaisyChain, Interface, SerialTransport, TcpTransport, Transport};
pub use values::Value;

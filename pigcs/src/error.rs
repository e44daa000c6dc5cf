//! Error types shared by every layer of the GCS client.
//!
//! Errors fall into five kinds:
//!
//! - **Transport**: [`GcsError::Io`], [`GcsError::ConnectionFailed`],
//!   [`GcsError::NotConnected`], [`GcsError::Timeout`], [`GcsError::Cancelled`]
//! - **Protocol**: [`GcsError::InvalidResponse`], [`GcsError::ParseError`]
//! - **Controller**: [`GcsError::Controller`] carrying either a flat GCS 2.0
//!   code or a packed GCS 2.1 code (see [`ControllerError`])
//! - **Usage**: [`GcsError::InvalidArgument`], [`GcsError::ArityMismatch`],
//!   [`GcsError::Unsupported`], raised before anything is written
//! - **Interface**: [`GcsError::UnsupportedInterface`]
//!
//! Both controller code spaces implement [`ErrorInfo`], so callers can inspect
//! the code, its decomposition and a translated message without caring which
//! protocol the controller speaks.

use std::fmt;

use thiserror::Error;

use crate::gcs21_errors::Gcs21Error;
use crate::gcs2_errors::Gcs2Error;

/// Errors that can occur while talking to a PI controller.
#[derive(Error, Debug)]
pub enum GcsError {
    /// Low-level I/O error (socket or serial read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Failed to establish a connection to the controller.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport is closed (or was never opened).
    #[error("Not connected")]
    NotConnected,

    /// No complete response received within the timeout period.
    #[error("Timeout waiting for response")]
    Timeout,

    /// A pending read was aborted because the connection was closed.
    #[error("Operation cancelled: connection closed")]
    Cancelled,

    /// Response from controller doesn't match the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to parse a value out of a response.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Controller reported an error via `ERR?`.
    #[error("{0}")]
    Controller(ControllerError),

    /// Caller passed an argument the command cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Parallel item and value lists have different lengths.
    #[error("Argument count mismatch: {items} items but {values} values")]
    ArityMismatch {
        /// Number of items (axes, channels, tables) passed
        items: usize,
        /// Number of values passed
        values: usize,
    },

    /// The connected firmware does not implement the command.
    #[error("Command {0} is not supported by the controller")]
    Unsupported(String),

    /// The interface needs a vendor driver and must be supplied as a transport.
    #[error("Interface {0} cannot be opened directly, supply a transport for it")]
    UnsupportedInterface(String),
}

/// Result type for GCS operations.
pub type GcsResult<T> = Result<T, GcsError>;

impl GcsError {
    /// Controller error code, if this is a controller error.
    pub fn controller_code(&self) -> Option<i64> {
        match self {
            GcsError::Controller(err) => Some(err.code()),
            _ => None,
        }
    }

    /// True if this is a controller error with exactly `code`.
    pub fn is_controller_code(&self, code: i64) -> bool {
        self.controller_code() == Some(code)
    }

    /// True for errors raised by the byte channel (lost link, timeout, cancel).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GcsError::Io(_)
                | GcsError::Serial(_)
                | GcsError::ConnectionFailed(_)
                | GcsError::NotConnected
                | GcsError::Timeout
                | GcsError::Cancelled
        )
    }

    /// True for errors raised before anything was written to the wire.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            GcsError::InvalidArgument(_) | GcsError::ArityMismatch { .. } | GcsError::Unsupported(_)
        )
    }

    /// True for a controller "stopped by command" error.
    pub fn is_stop(&self) -> bool {
        matches!(self, GcsError::Controller(err) if err.is_stop())
    }

    pub(crate) fn poisoned() -> Self {
        GcsError::InvalidResponse("connection state lock poisoned".to_string())
    }
}

impl From<ControllerError> for GcsError {
    fn from(err: ControllerError) -> Self {
        GcsError::Controller(err)
    }
}

/// Common view over both controller error code spaces.
///
/// GCS 2.0 errors only have a flat code; the module/class/id accessors
/// return `None` for them.
pub trait ErrorInfo {
    /// Raw error code as reported by `ERR?`.
    fn code(&self) -> i64;

    /// GCS 2.1 module (functional group) id.
    fn module_id(&self) -> Option<u16> {
        None
    }

    /// GCS 2.1 error class id.
    fn class_id(&self) -> Option<u8> {
        None
    }

    /// GCS 2.1 error id within its module and class.
    fn error_id(&self) -> Option<u8> {
        None
    }

    /// Symbolic name such as `PI_CNTR_STOP` or `PI_ERROR_MOTION_AXIS_DISABLED`.
    fn name(&self) -> String;

    /// Human-readable translation.
    fn message(&self) -> String;
}

/// Which protocol family is bound to a connection.
///
/// Selects the error taxonomy used to translate `ERR?` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Syntax {
    /// GCS 2.0: flat integer codes.
    #[default]
    Gcs2,
    /// GCS 2.1: packed `{module, class, id}` codes.
    Gcs21,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Gcs2 => write!(f, "GCS 2.0"),
            Syntax::Gcs21 => write!(f, "GCS 2.1"),
        }
    }
}

/// An error reported by the controller itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// GCS 2.0 flat error code.
    Gcs2(Gcs2Error),
    /// GCS 2.1 packed error code.
    Gcs21(Gcs21Error),
}

impl ControllerError {
    /// Build the controller error for `code` in the given protocol family.
    ///
    /// Codes outside the family's range are an invalid response ([`GcsError::InvalidResponse`]).
    pub fn from_code(syntax: Syntax, code: i64) -> GcsResult<Self> {
        let out_of_range = |_| {
            GcsError::InvalidResponse(format!("error code {code} out of range for {syntax}"))
        };
        Ok(match syntax {
            Syntax::Gcs2 => {
                ControllerError::Gcs2(Gcs2Error::new(i32::try_from(code).map_err(out_of_range)?))
            }
            Syntax::Gcs21 => {
                ControllerError::Gcs21(Gcs21Error::new(u32::try_from(code).map_err(out_of_range)?))
            }
        })
    }

    /// True for the "stopped by command" codes raised after `STP`/`HLT`/`#24`.
    pub fn is_stop(&self) -> bool {
        match self {
            ControllerError::Gcs2(err) => err.is_stop(),
            ControllerError::Gcs21(err) => {
                matches!(err.raw(), Gcs21Error::MOTION_STOP | Gcs21Error::CMD_STOP)
            }
        }
    }

    fn info(&self) -> &dyn ErrorInfo {
        match self {
            ControllerError::Gcs2(err) => err,
            ControllerError::Gcs21(err) => err,
        }
    }
}

impl ErrorInfo for ControllerError {
    fn code(&self) -> i64 {
        self.info().code()
    }

    fn module_id(&self) -> Option<u16> {
        self.info().module_id()
    }

    fn class_id(&self) -> Option<u8> {
        self.info().class_id()
    }

    fn error_id(&self) -> Option<u8> {
        self.info().error_id()
    }

    fn name(&self) -> String {
        self.info().name()
    }

    fn message(&self) -> String {
        self.info().message()
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Controller error {}: {}", self.code(), self.message())
    }
}

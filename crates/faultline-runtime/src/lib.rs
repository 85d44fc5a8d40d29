//! Host fault system
//!
//! This crate implements the runtime layer that faults are reported through:
//! - Error levels (E_ERROR, E_WARNING, E_NOTICE, etc.) and fault records
//! - The live error_reporting mask and mask expressions
//! - Throwables (ErrorException, Exception)
//! - The request lifecycle: error/exception handlers, shutdown functions,
//!   error_get_last, the @ operator
//! - INI configuration and request output
//!
//! Equivalent to the error parts of php-src/main/

pub mod error;
pub mod ini;
pub mod mask;
pub mod output;
pub mod runtime;
pub mod throwable;

pub use error::{ErrorLevel, Fault};
pub use ini::IniSystem;
pub use mask::{parse_mask, MaskError, ReportingMask};
pub use output::{DisplayMode, OutputBuffer};
pub use runtime::{
    ErrorCallback, ExceptionCallback, ExitStatus, Interception, Runtime, ShutdownCallback,
    Termination, Unwind,
};
pub use throwable::{ErrorException, Exception, Throwable, Thrown};

//! faultline - route every runtime fault to a single handler
//!
//! This is the root integration package that ties together the host fault
//! system (`faultline-runtime`) and the error registrar
//! (`faultline-handler`), plus the fault-script interpreter used by the CLI
//! and the scenario tests.

pub mod script;
pub mod transcript;

pub use faultline_handler::{
    default_builder, is_fatal_level, register, Builder, Dispatch, ErrorRegistrar, FATAL_LEVELS,
};
pub use faultline_runtime::{
    parse_mask, ErrorException, ErrorLevel, Exception, ExitStatus, Fault, IniSystem, Interception,
    Runtime, Termination, Throwable, Thrown, Unwind,
};
pub use script::{parse_script, Script, ScriptError};
pub use transcript::{run_with_registrar, DispatchRecord, Transcript};

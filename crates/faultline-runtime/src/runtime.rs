//! The request runtime.
//!
//! Owns the reporting mask, the installed error/exception handlers, the
//! shutdown function queue and the last recorded fault. A request is run
//! with [`Runtime::run`]; faults are reported with [`Runtime::raise`] and
//! propagate as [`Unwind`] values through `?`.
//!
//! Reference: php-src/main/main.c (php_error_cb, php_request_shutdown),
//! php-src/Zend/zend.c (zend_user_exception_handler)

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::{ErrorLevel, Fault};
use crate::ini::IniSystem;
use crate::mask::{parse_mask, ReportingMask};
use crate::output::{DisplayMode, OutputBuffer};
use crate::throwable::{Exception, Thrown, Throwable};

/// Answer of an error handler for one fault.
#[derive(Debug)]
pub enum Interception {
    /// Let default handling record and display the fault.
    FallThrough,
    /// The handler dealt with it; nothing else happens.
    Handled,
    /// Unwind the current operation with this throwable.
    Raise(Thrown),
}

/// Non-local exit from a running request.
#[derive(Debug, Error)]
pub enum Unwind {
    /// A catchable throwable.
    #[error("Uncaught {}: {}", .0.class_name(), .0.message())]
    Throw(Thrown),
    /// A fatal fault; it has already been recorded as the last error.
    #[error("{0}")]
    Fatal(Fault),
    #[error("exit({0})")]
    Exit(i32),
}

impl Unwind {
    /// The throwable, if this unwind can be caught.
    pub fn into_thrown(self) -> Result<Thrown, Unwind> {
        match self {
            Unwind::Throw(thrown) => Ok(thrown),
            other => Err(other),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Normal,
    Exit,
    /// A throwable reached the top of the request.
    Uncaught,
    Fatal,
    Panic,
}

/// Exit status of [`Runtime::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
    pub termination: Termination,
}

impl ExitStatus {
    fn new(code: i32, termination: Termination) -> Self {
        Self { code, termination }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Error handler callback (set_error_handler).
pub type ErrorCallback = Box<dyn Fn(&Fault) -> Interception>;
/// Uncaught throwable handler (set_exception_handler).
pub type ExceptionCallback = Rc<dyn Fn(Thrown)>;
/// Function run at request shutdown (register_shutdown_function).
pub type ShutdownCallback = Box<dyn FnOnce(&mut Runtime)>;

struct InstalledErrorHandler {
    callback: ErrorCallback,
    /// Levels routed to the callback.
    levels: u32,
}

/// The fault system of one request.
pub struct Runtime {
    ini: IniSystem,
    reporting: ReportingMask,
    /// Saved reporting values for the @ operator.
    silence_stack: Vec<u32>,
    error_handler: Option<InstalledErrorHandler>,
    exception_handler: Option<ExceptionCallback>,
    shutdown_functions: Vec<ShutdownCallback>,
    last_error: Option<Fault>,
    output: OutputBuffer,
}

impl Runtime {
    /// Create a runtime with default configuration (E_ALL, display on).
    pub fn new() -> Self {
        Self::with_config(IniSystem::new())
    }

    /// Create a runtime from an INI store.
    pub fn with_config(ini: IniSystem) -> Self {
        let reporting = match parse_mask(ini.get("error_reporting")) {
            Ok(mask) => mask,
            Err(err) => {
                warn!(%err, "invalid error_reporting, using E_ALL");
                ErrorLevel::ALL
            }
        };

        Self {
            ini,
            reporting: ReportingMask::new(reporting),
            silence_stack: Vec::new(),
            error_handler: None,
            exception_handler: None,
            shutdown_functions: Vec::new(),
            last_error: None,
            output: OutputBuffer::new(),
        }
    }

    pub fn ini(&self) -> &IniSystem {
        &self.ini
    }

    /// Change a directive at runtime (ini_set). Returns the old value.
    ///
    /// Setting `error_reporting` also updates the live mask.
    pub fn ini_set(&mut self, name: &str, value: &str) -> Option<String> {
        if name == "error_reporting" {
            let mask = match parse_mask(value) {
                Ok(mask) => mask,
                Err(err) => {
                    warn!(%err, value, "ini_set(error_reporting) rejected");
                    return None;
                }
            };
            let old = self.ini.set(name, value)?;
            self.reporting.set(mask);
            return Some(old);
        }
        self.ini.set(name, value)
    }

    /// Get the current error_reporting level.
    pub fn error_reporting(&self) -> u32 {
        self.reporting.get()
    }

    /// Set the error_reporting level. Returns the previous value.
    pub fn set_error_reporting(&mut self, level: u32) -> u32 {
        self.reporting.set(level)
    }

    /// A handle that always reads the current error_reporting level.
    pub fn reporting_mask(&self) -> ReportingMask {
        self.reporting.clone()
    }

    /// Begin error suppression (@ operator). Saves current level and sets to 0.
    pub fn begin_silence(&mut self) {
        let saved = self.reporting.set(0);
        self.silence_stack.push(saved);
    }

    /// End error suppression (@ operator). Restores previous level.
    pub fn end_silence(&mut self) {
        if let Some(level) = self.silence_stack.pop() {
            self.reporting.set(level);
        }
    }

    /// Check if errors are currently suppressed (@ operator active).
    pub fn is_silenced(&self) -> bool {
        !self.silence_stack.is_empty()
    }

    /// Drop every open @ scope, restoring the level saved by the outermost.
    fn unwind_silence(&mut self) {
        if let Some(&level) = self.silence_stack.first() {
            debug!(level, "restoring error_reporting left by @");
            self.reporting.set(level);
        }
        self.silence_stack.clear();
    }

    /// Install an error handler for `levels`. Returns the previous one (if any).
    pub fn set_error_handler(
        &mut self,
        handler: Option<ErrorCallback>,
        levels: u32,
    ) -> Option<ErrorCallback> {
        let new = handler.map(|callback| InstalledErrorHandler { callback, levels });
        std::mem::replace(&mut self.error_handler, new).map(|old| old.callback)
    }

    /// Install an uncaught throwable handler. Returns the previous one (if any).
    pub fn set_exception_handler(
        &mut self,
        handler: Option<ExceptionCallback>,
    ) -> Option<ExceptionCallback> {
        std::mem::replace(&mut self.exception_handler, handler)
    }

    pub fn exception_handler(&self) -> Option<&ExceptionCallback> {
        self.exception_handler.as_ref()
    }

    /// Queue a function to run at request shutdown.
    pub fn register_shutdown_function(&mut self, callback: ShutdownCallback) {
        self.shutdown_functions.push(callback);
    }

    /// The most recent fault that went through default handling.
    pub fn error_get_last(&self) -> Option<&Fault> {
        self.last_error.as_ref()
    }

    pub fn error_clear_last(&mut self) {
        self.last_error = None;
    }

    /// Handle for the request output.
    pub fn output(&self) -> OutputBuffer {
        self.output.clone()
    }

    /// Write to the request output.
    pub fn echo(&self, text: &str) {
        self.output.write(text);
    }

    /// Report a fault detected during execution.
    ///
    /// An installed handler sees user-handleable levels it was registered
    /// for; whatever it does not handle gets default handling. Fatal levels
    /// that reach default handling terminate the request.
    pub fn raise(&mut self, fault: Fault) -> Result<(), Unwind> {
        if fault.level.is_user_handleable() {
            if let Some(handler) = &self.error_handler {
                if fault.level.is_in(handler.levels) {
                    match (handler.callback)(&fault) {
                        Interception::Raise(thrown) => {
                            debug!(
                                level = %fault.level,
                                class = thrown.class_name(),
                                "error handler raised"
                            );
                            return Err(Unwind::Throw(thrown));
                        }
                        Interception::Handled => return Ok(()),
                        Interception::FallThrough => {}
                    }
                }
            }
        }

        self.report_default(fault.clone());

        if fault.level.is_fatal() {
            Err(Unwind::Fatal(fault))
        } else {
            Ok(())
        }
    }

    /// trigger_error(): raise a user-level fault.
    ///
    /// Non-user levels throw a `ValueError`.
    pub fn trigger_error(
        &mut self,
        level: ErrorLevel,
        message: &str,
        file: &str,
        line: u32,
    ) -> Result<(), Unwind> {
        if !level.is_user() {
            return Err(self.throw(
                Exception::named(
                    "ValueError",
                    "trigger_error(): Argument #2 ($error_level) must be one of \
                     E_USER_ERROR, E_USER_WARNING, E_USER_NOTICE, or E_USER_DEPRECATED",
                )
                .at(file, line),
            ));
        }
        self.raise(Fault::new(level, message, file, line))
    }

    /// Wrap a throwable for propagation.
    pub fn throw<T: Throwable>(&self, throwable: T) -> Unwind {
        Unwind::Throw(Box::new(throwable))
    }

    /// exit(): end the request with `code`.
    pub fn exit(&self, code: i32) -> Unwind {
        Unwind::Exit(code)
    }

    /// Record, display and log a fault the way the runtime does when nobody
    /// handles it.
    fn report_default(&mut self, fault: Fault) {
        if fault.level.is_in(self.reporting.get()) {
            DisplayMode::from_ini(self.ini.get("display_errors")).display(&fault, &self.output);
            if self.ini.get_bool("log_errors") {
                if fault.level.is_fatal() {
                    error!(level = %fault.level, file = %fault.file, line = fault.line, "{}", fault.message);
                } else {
                    warn!(level = %fault.level, file = %fault.file, line = fault.line, "{}", fault.message);
                }
            }
        }
        self.last_error = Some(fault);
    }

    /// Run a request to completion, then shut down.
    ///
    /// An `Unwind::Throw` escaping `script` goes to the exception handler. A
    /// panic is recorded as an E_ERROR fault. Shutdown functions always run,
    /// with any @ scope the script left open closed first.
    pub fn run<F>(&mut self, script: F) -> ExitStatus
    where
        F: FnOnce(&mut Runtime) -> Result<(), Unwind>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| script(self)));
        self.unwind_silence();

        let status = match outcome {
            Ok(Ok(())) => ExitStatus::new(0, Termination::Normal),
            Ok(Err(unwind)) => self.settle(unwind),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                debug!(%message, "request panicked");
                self.report_default(Fault::new(ErrorLevel::Error, message, "Unknown", 0));
                ExitStatus::new(255, Termination::Panic)
            }
        };

        self.shutdown();
        status
    }

    fn settle(&mut self, unwind: Unwind) -> ExitStatus {
        match unwind {
            Unwind::Throw(thrown) => {
                match self.exception_handler.clone() {
                    Some(handler) => handler(thrown),
                    None => {
                        let fault = Fault::new(
                            ErrorLevel::Error,
                            format!("Uncaught {}: {}", thrown.class_name(), thrown.message()),
                            thrown.file(),
                            thrown.line(),
                        );
                        self.report_default(fault);
                    }
                }
                ExitStatus::new(255, Termination::Uncaught)
            }
            Unwind::Fatal(_) => ExitStatus::new(255, Termination::Fatal),
            Unwind::Exit(code) => ExitStatus::new(code, Termination::Exit),
        }
    }

    /// Run shutdown functions in registration order, including any queued
    /// while shutting down.
    fn shutdown(&mut self) {
        while !self.shutdown_functions.is_empty() {
            let pending = std::mem::take(&mut self.shutdown_functions);
            for callback in pending {
                callback(self);
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

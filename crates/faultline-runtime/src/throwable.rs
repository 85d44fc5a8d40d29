//! Throwable values.
//!
//! Anything that can unwind a request implements [`Throwable`]. Faults are
//! normalized into [`ErrorException`]; explicit throws usually use
//! [`Exception`].

use std::any::Any;

use thiserror::Error;

use crate::error::{ErrorLevel, Fault};

/// A value that can be thrown through the runtime.
pub trait Throwable: std::error::Error + Any {
    /// Class name shown in uncaught messages ("ErrorException").
    fn class_name(&self) -> &str;
    fn message(&self) -> &str;
    fn file(&self) -> &str;
    fn line(&self) -> u32;

    /// Severity carried by throwables built from faults.
    fn severity(&self) -> Option<ErrorLevel> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// An owned thrown value.
pub type Thrown = Box<dyn Throwable>;

impl dyn Throwable {
    /// Downcast to a concrete throwable type.
    pub fn downcast_ref<T: Throwable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Throwable>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A fault converted into a throwable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ErrorException {
    pub message: String,
    pub severity: ErrorLevel,
    pub file: String,
    pub line: u32,
}

impl ErrorException {
    pub fn new(
        severity: ErrorLevel,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            file: file.into(),
            line,
        }
    }

    pub fn from_fault(fault: &Fault) -> Self {
        Self::new(fault.level, fault.message.clone(), fault.file.clone(), fault.line)
    }
}

impl Throwable for ErrorException {
    fn class_name(&self) -> &str {
        "ErrorException"
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn severity(&self) -> Option<ErrorLevel> {
        Some(self.severity)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A general-purpose exception for explicit throws.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Exception {
    class: String,
    pub message: String,
    pub code: i64,
    pub file: String,
    pub line: u32,
}

impl Exception {
    /// A plain `Exception` with no location.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Exception", message)
    }

    /// An exception reported under a different class name ("ValueError").
    pub fn named(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            code: 0,
            file: String::new(),
            line: 0,
        }
    }

    /// Set the throw location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }
}

impl Throwable for Exception {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exception_from_fault() {
        let fault = Fault::new(ErrorLevel::Notice, "Undefined index", "a.php", 3);
        let exc = ErrorException::from_fault(&fault);
        assert_eq!(exc.severity, ErrorLevel::Notice);
        assert_eq!(exc.to_string(), "Undefined index");
        assert_eq!(exc.file(), "a.php");
        assert_eq!(exc.line(), 3);
    }

    #[test]
    fn test_downcast_thrown() {
        let thrown: Thrown = Box::new(Exception::new("boom").at("b.php", 9).with_code(7));
        assert!(thrown.is::<Exception>());
        assert!(!thrown.is::<ErrorException>());
        assert_eq!(thrown.severity(), None);

        let exc = thrown.downcast_ref::<Exception>().unwrap();
        assert_eq!(exc.code, 7);
        assert_eq!(exc.class_name(), "Exception");
    }

    #[test]
    fn test_named_exception() {
        let exc = Exception::named("ValueError", "bad level");
        assert_eq!(exc.class_name(), "ValueError");
        assert_eq!(exc.file(), "");
        assert_eq!(exc.line(), 0);
    }
}

//! Request output and default error display.
//!
//! The runtime writes echoed text and displayed errors into an
//! [`OutputBuffer`]. Handles are cheap clones of one shared buffer so that
//! callbacks installed on the runtime can append to the same stream.
//!
//! Reference: php-src/main/output.c, php-src/main/main.c (php_error_cb)

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Fault;

/// Shared request output.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    contents: Rc<RefCell<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the output.
    pub fn write(&self, data: &str) {
        self.contents.borrow_mut().push_str(data);
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> String {
        self.contents.borrow().clone()
    }

    /// Take the output, leaving the buffer empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.contents.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.contents.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.borrow().is_empty()
    }
}

/// Where default error display goes (the `display_errors` directive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Off,
    /// Into the request output.
    Output,
    Stderr,
}

impl DisplayMode {
    /// Interpret a `display_errors` value ("1", "On", "stderr", "0", ...).
    pub fn from_ini(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "stderr" => DisplayMode::Stderr,
            "stdout" | "1" | "on" | "yes" | "true" => DisplayMode::Output,
            _ => DisplayMode::Off,
        }
    }

    /// Display `fault` according to this mode.
    pub fn display(self, fault: &Fault, output: &OutputBuffer) {
        match self {
            DisplayMode::Off => {}
            DisplayMode::Output => output.write(&format!("\n{}\n", fault.format())),
            DisplayMode::Stderr => eprintln!("{}", fault.format()),
        }
    }
}

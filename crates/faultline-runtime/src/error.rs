//! Error levels and fault records.
//!
//! Implements the E_* severity bitmask and the raw fault tuple that the
//! runtime hands to interceptors at the moment a fault is detected.
//!
//! Reference: php-src/Zend/zend_errors.h

use std::fmt;

/// Error levels (bitmask).
///
/// Reference: php-src/Zend/zend_errors.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorLevel {
    /// Fatal error; execution cannot continue.
    Error = 1, // E_ERROR
    /// Non-fatal warning; execution continues.
    Warning = 2, // E_WARNING
    /// Parser error.
    Parse = 4, // E_PARSE
    /// Informational notice.
    Notice = 8, // E_NOTICE
    /// Fatal error triggered by the core.
    CoreError = 16, // E_CORE_ERROR
    /// Warning triggered by the core.
    CoreWarning = 32, // E_CORE_WARNING
    /// Fatal error during compilation.
    CompileError = 64, // E_COMPILE_ERROR
    /// Warning during compilation.
    CompileWarning = 128, // E_COMPILE_WARNING
    /// User-triggered error (trigger_error).
    UserError = 256, // E_USER_ERROR
    /// User-triggered warning.
    UserWarning = 512, // E_USER_WARNING
    /// User-triggered notice.
    UserNotice = 1024, // E_USER_NOTICE
    /// Coding standards suggestion.
    Strict = 2048, // E_STRICT
    /// Catchable fatal error.
    RecoverableError = 4096, // E_RECOVERABLE_ERROR
    /// Feature deprecation notice.
    Deprecated = 8192, // E_DEPRECATED
    /// User-triggered deprecation.
    UserDeprecated = 16384, // E_USER_DEPRECATED
}

impl ErrorLevel {
    /// E_ALL: every error level combined.
    pub const ALL: u32 = 32767;

    /// Every level, in bit order.
    pub const LEVELS: [ErrorLevel; 15] = [
        ErrorLevel::Error,
        ErrorLevel::Warning,
        ErrorLevel::Parse,
        ErrorLevel::Notice,
        ErrorLevel::CoreError,
        ErrorLevel::CoreWarning,
        ErrorLevel::CompileError,
        ErrorLevel::CompileWarning,
        ErrorLevel::UserError,
        ErrorLevel::UserWarning,
        ErrorLevel::UserNotice,
        ErrorLevel::Strict,
        ErrorLevel::RecoverableError,
        ErrorLevel::Deprecated,
        ErrorLevel::UserDeprecated,
    ];

    /// Get the bitmask value.
    pub fn mask(self) -> u32 {
        self as u32
    }

    /// Whether `mask` has this level's bit set.
    pub fn is_in(self, mask: u32) -> bool {
        self.mask() & mask != 0
    }

    /// Check if this level stops execution when it reaches default handling.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorLevel::Error
                | ErrorLevel::Parse
                | ErrorLevel::CoreError
                | ErrorLevel::CompileError
                | ErrorLevel::UserError
                | ErrorLevel::RecoverableError
        )
    }

    /// Whether an installed error handler may see this level.
    ///
    /// Engine-level fatals and core/compile warnings bypass user handlers.
    pub fn is_user_handleable(self) -> bool {
        !matches!(
            self,
            ErrorLevel::Error
                | ErrorLevel::Parse
                | ErrorLevel::CoreError
                | ErrorLevel::CoreWarning
                | ErrorLevel::CompileError
                | ErrorLevel::CompileWarning
        )
    }

    /// Levels accepted by trigger_error().
    pub fn is_user(self) -> bool {
        matches!(
            self,
            ErrorLevel::UserError
                | ErrorLevel::UserWarning
                | ErrorLevel::UserNotice
                | ErrorLevel::UserDeprecated
        )
    }

    /// Get the constant name for this error level (e.g., "E_WARNING").
    pub fn name(self) -> &'static str {
        match self {
            ErrorLevel::Error => "E_ERROR",
            ErrorLevel::Warning => "E_WARNING",
            ErrorLevel::Parse => "E_PARSE",
            ErrorLevel::Notice => "E_NOTICE",
            ErrorLevel::CoreError => "E_CORE_ERROR",
            ErrorLevel::CoreWarning => "E_CORE_WARNING",
            ErrorLevel::CompileError => "E_COMPILE_ERROR",
            ErrorLevel::CompileWarning => "E_COMPILE_WARNING",
            ErrorLevel::UserError => "E_USER_ERROR",
            ErrorLevel::UserWarning => "E_USER_WARNING",
            ErrorLevel::UserNotice => "E_USER_NOTICE",
            ErrorLevel::Strict => "E_STRICT",
            ErrorLevel::RecoverableError => "E_RECOVERABLE_ERROR",
            ErrorLevel::Deprecated => "E_DEPRECATED",
            ErrorLevel::UserDeprecated => "E_USER_DEPRECATED",
        }
    }

    /// Get the display label (e.g., "Warning", "Fatal error").
    pub fn label(self) -> &'static str {
        match self {
            ErrorLevel::Error
            | ErrorLevel::CoreError
            | ErrorLevel::CompileError
            | ErrorLevel::UserError => "Fatal error",
            ErrorLevel::Warning
            | ErrorLevel::CoreWarning
            | ErrorLevel::CompileWarning
            | ErrorLevel::UserWarning => "Warning",
            ErrorLevel::Parse => "Parse error",
            ErrorLevel::Notice | ErrorLevel::UserNotice => "Notice",
            ErrorLevel::Strict => "Strict Standards",
            ErrorLevel::RecoverableError => "Recoverable fatal error",
            ErrorLevel::Deprecated | ErrorLevel::UserDeprecated => "Deprecated",
        }
    }

    /// Try to convert a u32 to an ErrorLevel.
    pub fn from_u32(val: u32) -> Option<Self> {
        Self::LEVELS.into_iter().find(|level| level.mask() == val)
    }

    /// Look up a level by its constant name ("E_NOTICE").
    pub fn from_name(name: &str) -> Option<Self> {
        Self::LEVELS.into_iter().find(|level| level.name() == name)
    }

    /// Names of the levels set in `mask`, in bit order.
    pub fn names_in(mask: u32) -> Vec<&'static str> {
        Self::LEVELS
            .into_iter()
            .filter(|level| level.is_in(mask))
            .map(ErrorLevel::name)
            .collect()
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One detected fault: level, message and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Error level.
    pub level: ErrorLevel,
    /// Error message.
    pub message: String,
    /// File where the fault occurred.
    pub file: String,
    /// Line number.
    pub line: u32,
}

impl Fault {
    /// Create a new fault record.
    pub fn new(
        level: ErrorLevel,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            file: file.into(),
            line,
        }
    }

    /// Format the way default error display prints it.
    pub fn format(&self) -> String {
        format!(
            "{}: {} in {} on line {}",
            self.level.label(),
            self.message,
            self.file,
            self.line
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

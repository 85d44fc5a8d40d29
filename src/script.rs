//! Fault scripts.
//!
//! A small line-oriented language for driving a [`Runtime`] through faults,
//! throws and exits. Used by the CLI and the scenario tests.
//!
//! ```text
//! # comment
//! echo "text"
//! error_reporting E_ALL & ~E_NOTICE
//! ini display_errors=0
//! trigger E_USER_WARNING "message" at file.php:12
//! fault E_WARNING "message" at file.php:12
//! @fault E_NOTICE "silenced" at file.php:3
//! try fault E_WARNING "caught locally" at file.php:4
//! throw RuntimeException "message" at file.php:7
//! exit 3
//! panic "message"
//! ```
//!
//! `echo` writes its text followed by a newline. `@` silences one statement;
//! `try` catches a throwable raised by one statement and echoes
//! `Caught <class>: <message>`.

use faultline_runtime::{
    parse_mask, ErrorLevel, Exception, Fault, MaskError, Runtime, Throwable, Unwind,
};
use thiserror::Error;
use tracing::warn;

/// Errors from [`parse_script`], with 1-based line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: unknown statement '{keyword}'")]
    UnknownStatement { line: usize, keyword: String },
    #[error("line {line}: unknown error level '{name}'")]
    UnknownLevel { line: usize, name: String },
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
    #[error("line {line}: invalid mask: {source}")]
    Mask {
        line: usize,
        #[source]
        source: MaskError,
    },
}

/// How a statement is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    /// `@` prefix: error_reporting is 0 while the statement runs.
    Silenced,
    /// `try` prefix: a thrown value is caught and reported.
    Caught,
}

/// Source location written as `at file:line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Echo(String),
    ErrorReporting(u32),
    Ini { name: String, value: String },
    /// Engine-detected fault of any level.
    Fault {
        level: ErrorLevel,
        message: String,
        at: Location,
    },
    /// trigger_error() call.
    Trigger {
        level: ErrorLevel,
        message: String,
        at: Location,
    },
    Throw {
        class: String,
        message: String,
        at: Location,
    },
    Exit(i32),
    Panic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based source line.
    pub line: usize,
    pub guard: Guard,
    pub op: Op,
}

/// A parsed fault script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    /// Run every statement against `runtime`, stopping at the first unwind.
    pub fn execute(&self, runtime: &mut Runtime) -> Result<(), Unwind> {
        for statement in &self.statements {
            statement.execute(runtime)?;
        }
        Ok(())
    }

    /// Whether any statement is a `panic`.
    pub fn has_panic(&self) -> bool {
        self.statements
            .iter()
            .any(|statement| matches!(statement.op, Op::Panic(_)))
    }
}

impl Statement {
    fn execute(&self, runtime: &mut Runtime) -> Result<(), Unwind> {
        if self.guard == Guard::Silenced {
            runtime.begin_silence();
        }
        let result = self.op.execute(runtime);
        if self.guard == Guard::Silenced {
            runtime.end_silence();
        }

        match (self.guard, result) {
            (Guard::Caught, Err(Unwind::Throw(thrown))) => {
                runtime.echo(&format!(
                    "Caught {}: {}\n",
                    thrown.class_name(),
                    thrown.message()
                ));
                Ok(())
            }
            (_, result) => result,
        }
    }
}

impl Op {
    fn execute(&self, runtime: &mut Runtime) -> Result<(), Unwind> {
        match self {
            Op::Echo(text) => {
                runtime.echo(text);
                runtime.echo("\n");
                Ok(())
            }
            Op::ErrorReporting(mask) => {
                runtime.set_error_reporting(*mask);
                Ok(())
            }
            Op::Ini { name, value } => {
                if runtime.ini_set(name, value).is_none() {
                    warn!(%name, %value, "ini_set failed");
                }
                Ok(())
            }
            Op::Fault { level, message, at } => {
                runtime.raise(Fault::new(*level, message.as_str(), at.file.as_str(), at.line))
            }
            Op::Trigger { level, message, at } => {
                runtime.trigger_error(*level, message, &at.file, at.line)
            }
            Op::Throw { class, message, at } => Err(runtime.throw(
                Exception::named(class.as_str(), message.as_str()).at(at.file.as_str(), at.line),
            )),
            Op::Exit(code) => Err(runtime.exit(*code)),
            Op::Panic(message) => panic!("{}", message),
        }
    }
}

/// Parse a fault script.
pub fn parse_script(source: &str) -> Result<Script, ScriptError> {
    let mut statements = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        statements.push(parse_statement(line, text)?);
    }
    Ok(Script { statements })
}

fn parse_statement(line: usize, text: &str) -> Result<Statement, ScriptError> {
    let (guard, text) = if let Some(rest) = text.strip_prefix('@') {
        (Guard::Silenced, rest.trim_start())
    } else if let Some(rest) = text.strip_prefix("try ") {
        (Guard::Caught, rest.trim_start())
    } else {
        (Guard::None, text)
    };

    let (keyword, rest) = match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (text, ""),
    };
    let mut cursor = Cursor { line, rest };

    let op = match keyword {
        "echo" => Op::Echo(cursor.string()?),
        "error_reporting" => {
            let mask = parse_mask(cursor.rest).map_err(|source| ScriptError::Mask { line, source })?;
            cursor.rest = "";
            Op::ErrorReporting(mask)
        }
        "ini" => {
            let (name, value) = cursor.rest.split_once('=').ok_or_else(|| ScriptError::Syntax {
                line,
                reason: "expected name=value".to_string(),
            })?;
            let op = Op::Ini {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            };
            cursor.rest = "";
            op
        }
        "fault" | "trigger" => {
            let level = cursor.level()?;
            let message = cursor.string()?;
            let at = cursor.location()?;
            if keyword == "fault" {
                Op::Fault { level, message, at }
            } else {
                Op::Trigger { level, message, at }
            }
        }
        "throw" => {
            let class = if cursor.rest.starts_with('"') {
                "Exception".to_string()
            } else {
                cursor.word()?.to_string()
            };
            let message = cursor.string()?;
            let at = cursor.location()?;
            Op::Throw { class, message, at }
        }
        "exit" => {
            let code = if cursor.rest.is_empty() {
                0
            } else {
                let word = cursor.word()?;
                word.parse::<i32>().map_err(|_| ScriptError::Syntax {
                    line,
                    reason: format!("invalid exit code '{}'", word),
                })?
            };
            Op::Exit(code)
        }
        "panic" => Op::Panic(cursor.string()?),
        other => {
            return Err(ScriptError::UnknownStatement {
                line,
                keyword: other.to_string(),
            })
        }
    };

    cursor.finish()?;
    Ok(Statement { line, guard, op })
}

/// Tokenizer over the arguments of one statement.
struct Cursor<'a> {
    line: usize,
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn syntax(&self, reason: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn word(&mut self) -> Result<&'a str, ScriptError> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            return Err(self.syntax("unexpected end of line"));
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (word, tail) = rest.split_at(end);
        self.rest = tail.trim_start();
        Ok(word)
    }

    fn level(&mut self) -> Result<ErrorLevel, ScriptError> {
        let name = self.word()?;
        ErrorLevel::from_name(name).ok_or_else(|| ScriptError::UnknownLevel {
            line: self.line,
            name: name.to_string(),
        })
    }

    /// A double-quoted string with `\"`, `\\` and `\n` escapes.
    fn string(&mut self) -> Result<String, ScriptError> {
        let rest = self.rest.trim_start();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, '"')) => {}
            _ => return Err(self.syntax("expected a quoted string")),
        }

        let mut value = String::new();
        let mut escaped = false;
        for (idx, c) in chars {
            if escaped {
                value.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                self.rest = rest[idx + 1..].trim_start();
                return Ok(value);
            } else {
                value.push(c);
            }
        }
        Err(self.syntax("unterminated string"))
    }

    /// `at file:line`
    fn location(&mut self) -> Result<Location, ScriptError> {
        if self.word()? != "at" {
            return Err(self.syntax("expected 'at file:line'"));
        }
        let text = self.word()?;
        let (file, line) = text
            .rsplit_once(':')
            .ok_or_else(|| self.syntax(format!("invalid location '{}'", text)))?;
        let line = line
            .parse::<u32>()
            .map_err(|_| self.syntax(format!("invalid line number '{}'", line)))?;
        Ok(Location {
            file: file.to_string(),
            line,
        })
    }

    fn finish(&self) -> Result<(), ScriptError> {
        if self.rest.trim().is_empty() {
            Ok(())
        } else {
            Err(self.syntax(format!("unexpected trailing input '{}'", self.rest.trim())))
        }
    }
}

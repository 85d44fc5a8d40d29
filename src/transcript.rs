//! Running a script with the error registrar installed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use faultline_handler::ErrorRegistrar;
use faultline_runtime::{ErrorLevel, ExitStatus, IniSystem, Runtime, Throwable};
use tracing::info;

use crate::script::Script;

/// One value delivered to the dispatch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub class: String,
    pub severity: Option<ErrorLevel>,
    pub message: String,
    pub file: String,
    pub line: u32,
}

impl DispatchRecord {
    pub fn from_throwable(thrown: &dyn Throwable) -> Self {
        Self {
            class: thrown.class_name().to_string(),
            severity: thrown.severity(),
            message: thrown.message().to_string(),
            file: thrown.file().to_string(),
            line: thrown.line(),
        }
    }
}

impl fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatched {}", self.class)?;
        if let Some(level) = self.severity {
            write!(f, " [{}]", level)?;
        }
        write!(f, ": {} in {} on line {}", self.message, self.file, self.line)
    }
}

/// Everything observable from one registrar-driven run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Request output with dispatch lines interleaved where they happened.
    pub output: String,
    pub dispatched: Vec<DispatchRecord>,
    pub status: ExitStatus,
}

/// Run `script` on a fresh runtime with every fault in `mask` dispatched.
pub fn run_with_registrar(script: &Script, mask: u32, ini: IniSystem) -> Transcript {
    let mut runtime = Runtime::with_config(ini);
    let records = Rc::new(RefCell::new(Vec::new()));

    let output = runtime.output();
    let sink = Rc::clone(&records);
    ErrorRegistrar::new(move |thrown| {
        let record = DispatchRecord::from_throwable(thrown.as_ref());
        info!(class = %record.class, file = %record.file, line = record.line, "{}", record.message);
        output.write(&format!("{}\n", record));
        sink.borrow_mut().push(record);
    })
    .register(&mut runtime, mask);

    let status = runtime.run(|rt| script.execute(rt));
    let dispatched = records.take();

    Transcript {
        output: runtime.output().take(),
        dispatched,
        status,
    }
}

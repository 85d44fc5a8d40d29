//! Global error handler registration.
//!
//! [`ErrorRegistrar`] forwards every observed fault to one dispatch callback:
//! - non-fatal faults become throwables at the point they occur and unwind
//!   like an explicit throw
//! - anything uncaught, thrown or converted, reaches `dispatch`
//! - fatal faults that never had a catch opportunity are dispatched from a
//!   shutdown function
//!
//! Non-fatal faults whose level is outside the reporting mask keep the
//! runtime's default behavior and are never dispatched. A fatal left as the
//! last error is dispatched at shutdown whatever the mask says.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use faultline_handler::ErrorRegistrar;
//! use faultline_runtime::{ErrorLevel, Fault, Runtime, Throwable};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let mut rt = Runtime::new();
//! ErrorRegistrar::new(move |err| sink.borrow_mut().push(err.message().to_string()))
//!     .register(&mut rt, ErrorLevel::ALL);
//!
//! rt.run(|rt| rt.raise(Fault::new(ErrorLevel::Warning, "careful", "app.php", 3)));
//! assert_eq!(*seen.borrow(), vec!["careful".to_string()]);
//! ```

use std::rc::Rc;

use faultline_runtime::{
    ErrorException, ErrorLevel, ExceptionCallback, Fault, Interception, Runtime, Thrown,
};
use tracing::debug;

/// Receives every observed fault.
pub type Dispatch = Rc<dyn Fn(Thrown)>;

/// Converts `(level, message, file, line)` into the dispatched throwable.
pub type Builder = Rc<dyn Fn(ErrorLevel, &str, &str, u32) -> Thrown>;

/// Levels the shutdown function dispatches from error_get_last().
pub const FATAL_LEVELS: [ErrorLevel; 6] = [
    ErrorLevel::Error,
    ErrorLevel::CoreError,
    ErrorLevel::CompileError,
    ErrorLevel::Parse,
    ErrorLevel::RecoverableError,
    ErrorLevel::UserError,
];

pub fn is_fatal_level(level: ErrorLevel) -> bool {
    FATAL_LEVELS.contains(&level)
}

/// The builder used when none is given: an [`ErrorException`] carrying the
/// fault's level and location.
pub fn default_builder() -> Builder {
    Rc::new(|level: ErrorLevel, message: &str, file: &str, line: u32| {
        Box::new(ErrorException::new(level, message, file, line)) as Thrown
    })
}

/// Dispatch callback plus fault builder, ready to be installed on a runtime.
#[derive(Clone)]
pub struct ErrorRegistrar {
    dispatch: Dispatch,
    builder: Builder,
}

impl ErrorRegistrar {
    /// A registrar using [`default_builder`].
    pub fn new<D>(dispatch: D) -> Self
    where
        D: Fn(Thrown) + 'static,
    {
        Self {
            dispatch: Rc::new(dispatch),
            builder: default_builder(),
        }
    }

    /// Replace the fault builder.
    pub fn with_builder<B>(mut self, builder: B) -> Self
    where
        B: Fn(ErrorLevel, &str, &str, u32) -> Thrown + 'static,
    {
        self.builder = Rc::new(builder);
        self
    }

    /// Convert a fault with the configured builder.
    pub fn build(&self, fault: &Fault) -> Thrown {
        (self.builder)(fault.level, &fault.message, &fault.file, fault.line)
    }

    /// Decide what happens to `fault` given the reporting mask in effect.
    pub fn intercept(&self, reporting: u32, fault: &Fault) -> Interception {
        if !fault.level.is_in(reporting) {
            debug!(level = %fault.level, "fault outside error_reporting, passing through");
            return Interception::FallThrough;
        }
        debug!(level = %fault.level, file = %fault.file, line = fault.line, "raising fault");
        Interception::Raise(self.build(fault))
    }

    /// Install the handlers on `runtime` and set its reporting mask.
    ///
    /// Registering again replaces the error and exception handlers; shutdown
    /// functions from earlier registrations stop acting once their dispatch
    /// is no longer the installed exception handler.
    pub fn register(&self, runtime: &mut Runtime, reporting_mask: u32) {
        runtime.set_error_reporting(reporting_mask);
        debug!(
            levels = ?ErrorLevel::names_in(reporting_mask),
            "registering error handler"
        );

        // The handler sees the levels reported right now but filters on the
        // mask in effect when each fault arrives.
        let levels = runtime.error_reporting();
        let live = runtime.reporting_mask();
        let interceptor = self.clone();
        runtime.set_error_handler(
            Some(Box::new(move |fault: &Fault| {
                interceptor.intercept(live.get(), fault)
            })),
            levels,
        );

        // Fresh allocation per registration: its address identifies this
        // registration in the shutdown function below.
        let dispatch = Rc::clone(&self.dispatch);
        let installed: ExceptionCallback = Rc::new(move |thrown: Thrown| dispatch(thrown));
        runtime.set_exception_handler(Some(Rc::clone(&installed)));

        let builder = Rc::clone(&self.builder);
        runtime.register_shutdown_function(Box::new(move |rt: &mut Runtime| {
            let current = rt
                .exception_handler()
                .is_some_and(|handler| Rc::ptr_eq(handler, &installed));
            if !current {
                debug!("superseded registration, skipping fatal check");
                return;
            }

            let Some(fault) = rt.error_get_last().cloned() else {
                return;
            };
            if !is_fatal_level(fault.level) {
                return;
            }

            debug!(level = %fault.level, file = %fault.file, line = fault.line, "dispatching fatal");
            installed(builder(fault.level, &fault.message, &fault.file, fault.line));
        }));
    }
}

/// Register `dispatch` for every fault in `reporting_mask`.
///
/// `builder` defaults to [`default_builder`].
pub fn register<D>(runtime: &mut Runtime, reporting_mask: u32, dispatch: D, builder: Option<Builder>)
where
    D: Fn(Thrown) + 'static,
{
    let mut registrar = ErrorRegistrar::new(dispatch);
    if let Some(builder) = builder {
        registrar.builder = builder;
    }
    registrar.register(runtime, reporting_mask);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use faultline_runtime::{Exception, Termination, Throwable, Unwind};

    use super::*;

    type Seen = Rc<RefCell<Vec<Thrown>>>;

    fn collector() -> (Seen, impl Fn(Thrown) + 'static) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |thrown: Thrown| sink.borrow_mut().push(thrown))
    }

    fn quiet_runtime() -> Runtime {
        let mut rt = Runtime::new();
        rt.ini_set("display_errors", "0");
        rt
    }

    fn warning_or_error() -> u32 {
        ErrorLevel::Warning.mask() | ErrorLevel::Error.mask()
    }

    #[test]
    fn test_fatal_levels() {
        assert!(is_fatal_level(ErrorLevel::Parse));
        assert!(is_fatal_level(ErrorLevel::RecoverableError));
        assert!(!is_fatal_level(ErrorLevel::CompileWarning));
        assert!(FATAL_LEVELS.iter().all(|level| level.is_fatal()));
    }

    #[test]
    fn test_intercept_filters_on_given_mask() {
        let registrar = ErrorRegistrar::new(|_| {});
        let fault = Fault::new(ErrorLevel::Notice, "n", "a.php", 1);

        assert!(matches!(
            registrar.intercept(ErrorLevel::Warning.mask(), &fault),
            Interception::FallThrough
        ));
        match registrar.intercept(ErrorLevel::ALL, &fault) {
            Interception::Raise(thrown) => {
                let exc = thrown.downcast_ref::<ErrorException>().unwrap();
                assert_eq!(exc.severity, ErrorLevel::Notice);
                assert_eq!((exc.file.as_str(), exc.line), ("a.php", 1));
            }
            other => panic!("expected a raise, got {:?}", other),
        }
    }

    #[test]
    fn test_register_sets_reporting_mask() {
        let mut rt = quiet_runtime();
        register(&mut rt, warning_or_error(), |_| {}, None);
        assert_eq!(rt.error_reporting(), 3);
        assert!(rt.exception_handler().is_some());
    }

    #[test]
    fn test_excluded_level_is_not_dispatched() {
        let (seen, dispatch) = collector();
        let mut rt = Runtime::new();
        ErrorRegistrar::new(dispatch).register(&mut rt, warning_or_error());

        let status = rt.run(|rt| rt.raise(Fault::new(ErrorLevel::Notice, "skip me", "a.php", 2)));

        assert!(status.success());
        assert!(seen.borrow().is_empty());
        // default handling still records the fault, but does not display it
        assert_eq!(rt.error_get_last().unwrap().message, "skip me");
        assert!(rt.output().is_empty());
    }

    #[test]
    fn test_included_warning_dispatched_once_with_builder_output() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch)
            .with_builder(|level, message, file, line| {
                Box::new(Exception::named("Built", format!("{level}: {message}")).at(file, line))
                    as Thrown
            })
            .register(&mut rt, warning_or_error());

        let status = rt.run(|rt| {
            rt.raise(Fault::new(ErrorLevel::Warning, "disk full", "io.php", 40))?;
            rt.echo("not reached");
            Ok(())
        });

        assert_eq!(status.termination, Termination::Uncaught);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].class_name(), "Built");
        assert_eq!(seen[0].message(), "E_WARNING: disk full");
        assert_eq!((seen[0].file(), seen[0].line()), ("io.php", 40));
        assert!(rt.output().is_empty());
    }

    #[test]
    fn test_raised_fault_can_be_caught_by_the_script() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        rt.run(|rt| {
            match rt.raise(Fault::new(ErrorLevel::Warning, "w", "a.php", 1)) {
                Err(Unwind::Throw(thrown)) => assert!(thrown.is::<ErrorException>()),
                other => panic!("expected a throw, got {:?}", other),
            }
            Ok(())
        });

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_explicit_throw_dispatched_as_is() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        rt.run(|rt| Err(rt.throw(Exception::new("explicit").with_code(42))));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        let exc = seen[0].downcast_ref::<Exception>().unwrap();
        assert_eq!(exc.message, "explicit");
        assert_eq!(exc.code, 42);
    }

    #[test]
    fn test_fatal_dispatched_from_shutdown() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, warning_or_error());

        let status = rt.run(|rt| {
            rt.raise(Fault::new(ErrorLevel::Error, "Allowed memory size exhausted", "big.php", 7))
        });

        assert_eq!(status.termination, Termination::Fatal);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity(), Some(ErrorLevel::Error));
        assert_eq!(seen[0].message(), "Allowed memory size exhausted");
        assert_eq!((seen[0].file(), seen[0].line()), ("big.php", 7));
    }

    #[test]
    fn test_fatal_outside_mask_is_still_dispatched() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::Warning.mask());

        rt.run(|rt| rt.raise(Fault::new(ErrorLevel::Parse, "syntax error", "p.php", 1)));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity(), Some(ErrorLevel::Parse));
        assert_eq!(seen[0].message(), "syntax error");
    }

    #[test]
    fn test_non_fatal_last_error_is_not_dispatched_at_shutdown() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::Warning.mask());

        rt.run(|rt| rt.raise(Fault::new(ErrorLevel::Deprecated, "old api", "d.php", 1)));

        assert!(seen.borrow().is_empty());
        assert_eq!(rt.error_get_last().unwrap().level, ErrorLevel::Deprecated);
    }

    #[test]
    fn test_panic_reaches_dispatch_as_fatal() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        rt.run(|_| panic!("stack overflow"));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message(), "stack overflow");
        assert_eq!(seen[0].severity(), Some(ErrorLevel::Error));
    }

    #[test]
    fn test_mask_is_read_live() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        rt.run(|rt| {
            rt.set_error_reporting(ErrorLevel::Error.mask());
            rt.raise(Fault::new(ErrorLevel::Warning, "filtered now", "a.php", 1))?;
            rt.set_error_reporting(ErrorLevel::ALL);
            rt.raise(Fault::new(ErrorLevel::Warning, "observed", "a.php", 2))
        });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message(), "observed");
    }

    #[test]
    fn test_silence_operator_suppresses_dispatch() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        let status = rt.run(|rt| {
            rt.begin_silence();
            let result = rt.raise(Fault::new(ErrorLevel::Warning, "silenced", "a.php", 1));
            rt.end_silence();
            result
        });

        assert!(status.success());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_handler_levels_fixed_at_registration() {
        let (seen, dispatch) = collector();
        let mut rt = Runtime::new();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::Warning.mask());

        // Widening the mask later does not route notices to the handler;
        // they get default handling instead.
        rt.run(|rt| {
            rt.set_error_reporting(ErrorLevel::ALL);
            rt.raise(Fault::new(ErrorLevel::Notice, "n", "a.php", 5))
        });

        assert!(seen.borrow().is_empty());
        assert_eq!(
            rt.output().contents(),
            "\nNotice: n in a.php on line 5\n"
        );
    }

    #[test]
    fn test_reregistration_replaces_handlers_without_double_fatal() {
        let (first_seen, first) = collector();
        let (second_seen, second) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(first).register(&mut rt, ErrorLevel::ALL);
        ErrorRegistrar::new(second).register(&mut rt, ErrorLevel::ALL);

        rt.run(|rt| rt.raise(Fault::new(ErrorLevel::CoreError, "core", "c.php", 1)));

        assert!(first_seen.borrow().is_empty());
        assert_eq!(second_seen.borrow().len(), 1);
    }

    #[test]
    fn test_reregistration_with_different_mask() {
        let (first_seen, first) = collector();
        let (second_seen, second) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(first).register(&mut rt, ErrorLevel::Warning.mask());
        ErrorRegistrar::new(second).register(&mut rt, ErrorLevel::Notice.mask());
        assert_eq!(rt.error_reporting(), ErrorLevel::Notice.mask());

        let status = rt.run(|rt| {
            rt.raise(Fault::new(ErrorLevel::Warning, "no longer observed", "a.php", 1))?;
            rt.raise(Fault::new(ErrorLevel::Notice, "observed now", "a.php", 2))
        });

        assert_eq!(status.termination, Termination::Uncaught);
        assert!(first_seen.borrow().is_empty());
        let seen = second_seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].severity(), Some(ErrorLevel::Notice));
        assert_eq!(seen[0].message(), "observed now");
        // the warning went through default handling
        assert_eq!(rt.error_get_last().unwrap().message, "no longer observed");
    }

    #[test]
    fn test_panic_under_silence_reaches_dispatch() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        rt.run(|rt| {
            rt.begin_silence();
            panic!("boom under @")
        });

        assert_eq!(rt.error_reporting(), ErrorLevel::ALL);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message(), "boom under @");
    }

    #[test]
    fn test_register_free_function_with_builder() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        let builder: Builder = Rc::new(|level: ErrorLevel, message: &str, _file: &str, _line: u32| {
            Box::new(Exception::new(format!("[{}] {}", level.label(), message))) as Thrown
        });
        register(&mut rt, ErrorLevel::ALL, dispatch, Some(builder));

        rt.run(|rt| rt.trigger_error(ErrorLevel::UserWarning, "custom", "u.php", 3));

        assert_eq!(seen.borrow()[0].message(), "[Warning] custom");
    }

    #[test]
    fn test_user_error_is_catchable_when_observed() {
        let (seen, dispatch) = collector();
        let mut rt = quiet_runtime();
        ErrorRegistrar::new(dispatch).register(&mut rt, ErrorLevel::ALL);

        let status = rt.run(|rt| rt.trigger_error(ErrorLevel::UserError, "user fatal", "u.php", 9));

        // Raised through the error handler, so it is dispatched once as an
        // uncaught throwable and never recorded for the shutdown check.
        assert_eq!(status.termination, Termination::Uncaught);
        assert_eq!(seen.borrow().len(), 1);
        assert!(rt.error_get_last().is_none());
    }
}

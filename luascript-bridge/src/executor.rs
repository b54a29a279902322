//! Protected call path for every entry into interpreter code.
//!
//! The executor tracks the *current unit scope*: the output sink and the
//! diagnostics flag of the script unit whose code is running. Entering a call
//! installs the owning unit's scope and the guard restores the previous one
//! when it goes out of scope, whatever the outcome of the call.

use crate::error::{Diagnostic, Stage};
use crate::output::{NullSink, OutputSink};
use mlua::{Function, Lua, MultiValue};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Output sink and diagnostics flag of one script unit.
#[derive(Clone)]
pub struct UnitScope {
    pub sink: Rc<dyn OutputSink>,
    pub debug: bool,
}

impl UnitScope {
    pub fn new(sink: Rc<dyn OutputSink>, debug: bool) -> Self {
        Self { sink, debug }
    }

    /// Scope used before any unit has run.
    pub fn detached(debug: bool) -> Self {
        Self::new(Rc::new(NullSink), debug)
    }
}

pub struct Executor {
    current: RefCell<UnitScope>,
}

/// Restores the previous scope on drop.
#[must_use = "the scope is restored as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    executor: &'a Executor,
    previous: Option<UnitScope>,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.executor.current.borrow_mut() = previous;
        }
    }
}

impl Executor {
    pub fn new(initial: UnitScope) -> Self {
        Self {
            current: RefCell::new(initial),
        }
    }

    pub fn current(&self) -> UnitScope {
        self.current.borrow().clone()
    }

    pub fn debug_enabled(&self) -> bool {
        self.current.borrow().debug
    }

    /// Makes `scope` current until the returned guard is dropped.
    pub fn enter(&self, scope: UnitScope) -> ScopeGuard<'_> {
        let previous = std::mem::replace(&mut *self.current.borrow_mut(), scope);
        ScopeGuard {
            executor: self,
            previous: Some(previous),
        }
    }

    /// Appends a line to the current sink.
    pub fn write_line(&self, line: &str) {
        // Sink cloned out: writing must not hold the borrow.
        let sink = Rc::clone(&self.current.borrow().sink);
        sink.write_line(line);
    }

    /// `[LuaDebug]` line, only when diagnostics are on.
    pub fn debug_line(&self, message: &str) {
        if self.debug_enabled() {
            self.write_line(&format!("[LuaDebug] {message}"));
        }
    }

    /// Reports a failure to the current unit, or drops it silently.
    pub fn report(&self, diagnostic: &Diagnostic) {
        debug!(stage = %diagnostic.stage, message = %diagnostic.message, "script failure");
        if self.debug_enabled() {
            self.write_line(&diagnostic.to_string());
        }
    }

    /// Compiles and runs `source` as a top-level chunk under `scope`.
    ///
    /// Compile failures report `syntax`, raises during execution `runtime`.
    /// Return values are discarded.
    pub fn run_source(
        &self,
        lua: &Lua,
        source: &str,
        chunk_name: &str,
        scope: UnitScope,
    ) -> Result<(), Diagnostic> {
        let _guard = self.enter(scope);
        let chunk = match lua
            .load(source)
            .set_name(format!("={chunk_name}"))
            .into_function()
        {
            Ok(chunk) => chunk,
            Err(e) => return Err(self.fail(Stage::Syntax, &e)),
        };
        chunk
            .call::<()>(())
            .map_err(|e| self.fail(Stage::Runtime, &e))
    }

    /// Calls an interpreter function as an asynchronous callback of the unit
    /// that owns `scope`. A raise is reported with stage `callback` and never
    /// propagates further.
    pub fn call(
        &self,
        function: &Function,
        args: MultiValue,
        scope: UnitScope,
    ) -> Result<(), Diagnostic> {
        let _guard = self.enter(scope);
        function
            .call::<()>(args)
            .map_err(|e| self.fail(Stage::Callback, &e))
    }

    fn fail(&self, stage: Stage, error: &mlua::Error) -> Diagnostic {
        let diagnostic = Diagnostic::new(stage, describe(error));
        self.report(&diagnostic);
        diagnostic
    }
}

/// Error text including the traceback the interpreter attached, if any.
pub fn describe(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BufferSink;

    fn scope(debug: bool) -> (UnitScope, BufferSink) {
        let sink = BufferSink::new();
        (UnitScope::new(Rc::new(sink.clone()), debug), sink)
    }

    #[test]
    fn syntax_error_is_reported_as_syntax() {
        let lua = Lua::new();
        let executor = Executor::new(UnitScope::detached(false));
        let (unit, sink) = scope(true);

        let err = executor
            .run_source(&lua, "local x = = 1", "unit", unit)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Syntax);
        assert!(sink.lines()[0].starts_with("[LuaError] syntax: "));
    }

    #[test]
    fn runtime_error_is_reported_as_runtime() {
        let lua = Lua::new();
        let executor = Executor::new(UnitScope::detached(false));
        let (unit, sink) = scope(true);

        let err = executor
            .run_source(&lua, "error('boom')", "unit", unit)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Runtime);
        assert!(err.message.contains("boom"));
        assert!(sink.contents().starts_with("[LuaError] runtime: "));
    }

    #[test]
    fn failures_are_silent_without_diagnostics() {
        let lua = Lua::new();
        let executor = Executor::new(UnitScope::detached(false));
        let (unit, sink) = scope(false);

        assert!(executor.run_source(&lua, "error('x')", "unit", unit).is_err());
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn previous_scope_is_restored_after_failure() {
        let lua = Lua::new();
        let (outer, outer_sink) = scope(true);
        let executor = Executor::new(outer);
        let (inner, inner_sink) = scope(true);

        let function: Function = lua.load("return function() error('cb') end").eval().unwrap();
        let err = executor
            .call(&function, MultiValue::new(), inner)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Callback);
        assert_eq!(inner_sink.lines().len(), 1);

        executor.write_line("after");
        assert_eq!(outer_sink.lines(), vec!["after"]);
    }

    #[test]
    fn return_values_are_discarded() {
        let lua = Lua::new();
        let executor = Executor::new(UnitScope::detached(false));
        let (unit, _) = scope(false);
        assert!(executor.run_source(&lua, "return 1, 2, 3", "unit", unit).is_ok());
    }
}

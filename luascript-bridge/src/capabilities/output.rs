use super::register;
use crate::context::InterpreterState;
use crate::marshal::join_values;
use mlua::{Table, Variadic, Value};
use std::rc::Rc;

/// `display(...)` on the bridge table plus the global `print` override.
pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    register(state, bridge, "display", |state, lua, args: Variadic<Value>| {
        let line = join_values(lua, &args, " ")?;
        state.executor.write_line(&line);
        Ok(())
    })?;

    let globals = state.lua.globals();
    register(state, &globals, "print", |state, lua, args: Variadic<Value>| {
        let line = join_values(lua, &args, "\t")?;
        state.executor.write_line(&line);
        Ok(())
    })
}

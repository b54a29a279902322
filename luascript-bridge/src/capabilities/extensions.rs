use super::{register, Args};
use crate::context::InterpreterState;
use mlua::{MultiValue, Table, Value};
use std::rc::Rc;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // call_host(name, ...) -> nil | result | "error: ..."
    register(state, bridge, "call_host", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let name = args.string(lua, 0)?;
        let rest = (1..args.len())
            .map(|i| args.display(lua, i))
            .collect::<mlua::Result<Vec<_>>>()?;
        match state.services.extensions.call(&name, &rest) {
            Some(result) => lua.create_string(result).map(Value::String),
            None => Ok(Value::Nil),
        }
    })
}

//! `storage_*`: string key-value storage. Store failures are logged and
//! surface to scripts as `nil`, `false` or an empty table.

use super::{register, Args};
use crate::context::InterpreterState;
use luascript_storage::StorageResult;
use mlua::{MultiValue, Table, Value};
use std::rc::Rc;
use tracing::warn;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    register(state, bridge, "storage_get", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let key = args.string(lua, 0)?;
        match logged("get", state.services.storage.get(&key)).flatten() {
            Some(value) => lua.create_string(value).map(Value::String),
            None => Ok(Value::Nil),
        }
    })?;

    register(state, bridge, "storage_set", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let key = args.string(lua, 0)?;
        // Stored values are UTF-8 text.
        let Some(value) = args.utf8(lua, 1)? else {
            warn!(key = %key, "storage value is not valid UTF-8");
            return Ok(false);
        };
        Ok(logged("set", state.services.storage.set(&key, &value)).is_some())
    })?;

    register(state, bridge, "storage_remove", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let key = args.string(lua, 0)?;
        Ok(logged("remove", state.services.storage.remove(&key)).unwrap_or(false))
    })?;

    register(state, bridge, "storage_clear", |state, _, _: MultiValue| {
        Ok(logged("clear", state.services.storage.clear()).is_some())
    })?;

    register(state, bridge, "storage_keys", |state, lua, _: MultiValue| {
        let keys = logged("keys", state.services.storage.keys()).unwrap_or_default();
        lua.create_sequence_from(keys)
    })
}

fn logged<T>(operation: &str, result: StorageResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, error = %e, "storage operation failed");
            None
        }
    }
}

//! Stable handles for interpreter-side callables.
//!
//! Functions are stored in the Lua registry once per function value and are
//! reference counted: every consumer (binding, timer, request, socket slot,
//! crypto job) holds one count and releases it when done.

use crate::executor::UnitScope;
use mlua::{Function, Lua, RegistryKey, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Registry id of a stored function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}

/// How the host refers to a script callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallableHandle {
    /// Global name, looked up at every invocation.
    Name(String),
    /// Function stored in the registry.
    Ref(HandleId),
}

impl fmt::Display for CallableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Ref(id) => id.fmt(f),
        }
    }
}

/// A handle together with the unit that registered it.
#[derive(Clone)]
pub struct Callback {
    pub handle: CallableHandle,
    pub owner: UnitScope,
}

struct Entry {
    key: RegistryKey,
    pointer: usize,
    count: usize,
}

#[derive(Default)]
pub struct CallbackRegistry {
    entries: RefCell<HashMap<HandleId, Entry>>,
    by_pointer: RefCell<HashMap<usize, HandleId>>,
    next_id: Cell<u64>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns a script argument into a handle, taking one count for `Ref`s.
    ///
    /// Functions become `Ref`s (the same function value always yields the same
    /// id), strings and numbers become `Name`s. Anything else is an argument
    /// error raised back into the script.
    pub fn retain_value(&self, lua: &Lua, value: &Value) -> mlua::Result<CallableHandle> {
        match value {
            Value::Function(function) => {
                self.retain_function(lua, function, value.to_pointer() as usize)
            }
            Value::String(name) => Ok(CallableHandle::Name(name.to_string_lossy())),
            Value::Integer(n) => Ok(CallableHandle::Name(n.to_string())),
            Value::Number(n) => Ok(CallableHandle::Name(n.to_string())),
            other => Err(mlua::Error::runtime(format!(
                "bad callback (function or global name expected, got {})",
                other.type_name()
            ))),
        }
    }

    fn retain_function(
        &self,
        lua: &Lua,
        function: &Function,
        pointer: usize,
    ) -> mlua::Result<CallableHandle> {
        let existing = self.by_pointer.borrow().get(&pointer).copied();
        if let Some(id) = existing {
            if let Some(entry) = self.entries.borrow_mut().get_mut(&id) {
                entry.count += 1;
                trace!(handle = %id, count = entry.count, "retained callback");
                return Ok(CallableHandle::Ref(id));
            }
        }

        let key = lua.create_registry_value(function.clone())?;
        let id = HandleId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.entries.borrow_mut().insert(
            id,
            Entry {
                key,
                pointer,
                count: 1,
            },
        );
        self.by_pointer.borrow_mut().insert(pointer, id);
        trace!(handle = %id, "registered callback");
        Ok(CallableHandle::Ref(id))
    }

    /// Drops one count; the function leaves the registry at zero.
    pub fn release(&self, handle: &CallableHandle) {
        let CallableHandle::Ref(id) = handle else {
            return;
        };
        let removed = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(id) {
                Some(entry) if entry.count > 1 => {
                    entry.count -= 1;
                    None
                }
                Some(_) => entries.remove(id),
                None => None,
            }
        };
        if let Some(entry) = removed {
            self.by_pointer.borrow_mut().remove(&entry.pointer);
            trace!(handle = %id, "released callback");
            // Dropping the key frees the registry slot.
            drop(entry.key);
        }
    }

    /// Looks the handle up. `Ok(None)` means nothing callable is there.
    pub fn resolve(&self, lua: &Lua, handle: &CallableHandle) -> mlua::Result<Option<Function>> {
        match handle {
            CallableHandle::Name(name) => match lua.globals().get::<Value>(name.as_str())? {
                Value::Function(function) => Ok(Some(function)),
                _ => Ok(None),
            },
            CallableHandle::Ref(id) => {
                let entries = self.entries.borrow();
                match entries.get(id) {
                    Some(entry) => lua.registry_value::<Function>(&entry.key).map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    /// Number of functions currently held.
    pub fn live_count(&self) -> usize {
        self.entries.borrow().len()
    }
}

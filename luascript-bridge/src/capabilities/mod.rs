//! Host functions callable from Lua.
//!
//! Everything is installed once into the global `__LS_BRIDGE` table and is
//! also reachable through `require("luascript")`.

mod assets;
mod crypto;
mod documents;
mod dom;
mod events;
mod extensions;
mod net;
mod output;
mod sockets;
mod storage;
mod timers;

pub(crate) use sockets::ConnectionSlot;
pub(crate) use timers::TimerSlot;

use crate::callbacks::Callback;
use crate::context::InterpreterState;
use crate::marshal::stringify;
use mlua::{FromLuaMulti, IntoLuaMulti, Lua, MultiValue, Table, Value};
use std::rc::{Rc, Weak};

pub(crate) const BRIDGE_GLOBAL: &str = "__LS_BRIDGE";
pub(crate) const BUILTIN_MODULE: &str = "luascript";

const PRELUDE: &str = include_str!("prelude.lua");

pub(crate) fn install(state: &Rc<InterpreterState>) -> mlua::Result<()> {
    let bridge = state.lua.create_table()?;

    output::install(state, &bridge)?;
    dom::install(state, &bridge)?;
    events::install(state, &bridge)?;
    net::install(state, &bridge)?;
    timers::install(state, &bridge)?;
    sockets::install(state, &bridge)?;
    storage::install(state, &bridge)?;
    crypto::install(state, &bridge)?;
    assets::install(state, &bridge)?;
    extensions::install(state, &bridge)?;
    documents::install(state, &bridge)?;

    state.lua.globals().set(BRIDGE_GLOBAL, bridge)?;
    state
        .preloader
        .register(&state.lua, BUILTIN_MODULE, PRELUDE, "builtin")
}

/// Adds `name` to `table`, backed by `f`. The function holds the state weakly.
fn register<A, R, F>(
    state: &Rc<InterpreterState>,
    table: &Table,
    name: &str,
    f: F,
) -> mlua::Result<()>
where
    A: FromLuaMulti,
    R: IntoLuaMulti,
    F: Fn(&Rc<InterpreterState>, &Lua, A) -> mlua::Result<R> + 'static,
{
    let weak: Weak<InterpreterState> = Rc::downgrade(state);
    let function = state.lua.create_function(move |lua, args: A| {
        let state = weak
            .upgrade()
            .ok_or_else(|| mlua::Error::runtime("luascript bridge has been shut down"))?;
        f(&state, lua, args)
    })?;
    table.set(name, function)
}

/// Positional arguments with trailing `nil`s removed, so `f(a, nil)` counts as
/// one argument.
pub(crate) struct Args(Vec<Value>);

impl Args {
    pub fn new(values: MultiValue) -> Self {
        let mut values: Vec<Value> = values.into_iter().collect();
        while matches!(values.last(), Some(Value::Nil)) {
            values.pop();
        }
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Value {
        self.0.get(index).cloned().unwrap_or(Value::Nil)
    }

    /// Strings and numbers as text; anything else is the empty string.
    pub fn string(&self, lua: &Lua, index: usize) -> mlua::Result<String> {
        match self.get(index) {
            Value::String(s) => Ok(s.to_string_lossy()),
            v @ (Value::Integer(_) | Value::Number(_)) => stringify(lua, &v),
            _ => Ok(String::new()),
        }
    }

    /// Raw bytes of a string argument; numbers use their text form and
    /// anything else is empty.
    pub fn bytes(&self, lua: &Lua, index: usize) -> mlua::Result<Vec<u8>> {
        match self.get(index) {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            _ => self.string(lua, index).map(String::into_bytes),
        }
    }

    /// Like [`Args::string`] but `None` for strings that are not valid UTF-8.
    pub fn utf8(&self, lua: &Lua, index: usize) -> mlua::Result<Option<String>> {
        match self.get(index) {
            Value::String(s) => Ok(s.to_str().ok().map(|text| (*text).to_owned())),
            _ => self.string(lua, index).map(Some),
        }
    }

    /// Like [`Args::string`] but `None` when the argument is absent or not
    /// string-like.
    pub fn opt_string(&self, lua: &Lua, index: usize) -> mlua::Result<Option<String>> {
        match self.get(index) {
            Value::String(_) | Value::Integer(_) | Value::Number(_) => {
                self.string(lua, index).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Numbers and numeric strings.
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.get(index) {
            Value::Integer(n) => Some(n as f64),
            Value::Number(n) => Some(n),
            Value::String(s) => s.to_string_lossy().trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer id argument; anything unusable maps to 0, which is never issued.
    pub fn id(&self, index: usize) -> u64 {
        self.number(index)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map_or(0, |n| n as u64)
    }

    /// Any value rendered with `tostring`.
    pub fn display(&self, lua: &Lua, index: usize) -> mlua::Result<String> {
        stringify(lua, &self.get(index))
    }

    /// Retains the callable at `index` on behalf of the running unit.
    pub fn callback(
        &self,
        state: &InterpreterState,
        lua: &Lua,
        index: usize,
    ) -> mlua::Result<Callback> {
        let handle = state.callbacks.retain_value(lua, &self.get(index))?;
        Ok(state.callback(handle))
    }

    /// Like [`Args::callback`] but `nil` is accepted and yields `None`.
    pub fn opt_callback(
        &self,
        state: &InterpreterState,
        lua: &Lua,
        index: usize,
    ) -> mlua::Result<Option<Callback>> {
        match self.get(index) {
            Value::Nil => Ok(None),
            _ => self.callback(state, lua, index).map(Some),
        }
    }
}

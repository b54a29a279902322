//! Host <-> interpreter value conversion.
//!
//! Only primitives cross the boundary: nil, numbers, booleans and strings.
//! Anything else is turned into its `tostring` form on the way out of Lua.

use mlua::{IntoLua, Lua, Value};

/// A primitive value passed from the host into a Lua callback.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Number(f64),
    Bool(bool),
    String(String),
}

impl IntoLua for HostValue {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            HostValue::Null => Ok(Value::Nil),
            HostValue::Bool(b) => Ok(Value::Boolean(b)),
            // Integral numbers (status codes, sizes, ids) stay integers so that
            // `tostring(status)` prints `200` rather than `200.0`.
            HostValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                Ok(Value::Integer(n as i64))
            }
            HostValue::Number(n) => Ok(Value::Number(n)),
            HostValue::String(s) => lua.create_string(&s).map(Value::String),
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u16> for HostValue {
    fn from(n: u16) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for HostValue {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// `tostring(value)` using the interpreter's own rules (including `__tostring`).
/// Bytes that are not UTF-8 come out as U+FFFD.
pub fn stringify(lua: &Lua, value: &Value) -> mlua::Result<String> {
    let tostring: mlua::Function = lua.globals().get("tostring")?;
    let text = tostring.call::<mlua::String>(value.clone())?;
    Ok(text.to_string_lossy())
}

/// Stringifies every value and joins them with `separator`.
pub fn join_values(lua: &Lua, values: &[Value], separator: &str) -> mlua::Result<String> {
    let parts = values
        .iter()
        .map(|v| stringify(lua, v))
        .collect::<mlua::Result<Vec<_>>>()?;
    Ok(parts.join(separator))
}

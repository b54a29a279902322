//! Selector-based DOM helpers.
//!
//! `text`, `html` and `attr` are two-mode: with a value argument they write
//! and return nothing, without one they read. A missing element reads as
//! `nil` and ignores writes.

use super::{register, Args};
use crate::context::InterpreterState;
use crate::dom::{Document, NodeId};
use mlua::{Lua, MultiValue, Table, Value};
use std::rc::Rc;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    register(state, bridge, "text", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let document = &state.services.document;
        let Some(node) = select(document.as_ref(), &args.string(lua, 0)?) else {
            return Ok(read(Value::Nil));
        };
        if args.len() >= 2 {
            document.set_text(node, &args.string(lua, 1)?);
            return Ok(MultiValue::new());
        }
        read_string(lua, document.text(node))
    })?;

    register(state, bridge, "html", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let document = &state.services.document;
        let Some(node) = select(document.as_ref(), &args.string(lua, 0)?) else {
            return Ok(read(Value::Nil));
        };
        if args.len() >= 2 {
            document.set_inner_html(node, &args.string(lua, 1)?);
            return Ok(MultiValue::new());
        }
        read_string(lua, document.inner_html(node))
    })?;

    register(state, bridge, "attr", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let document = &state.services.document;
        let Some(node) = select(document.as_ref(), &args.string(lua, 0)?) else {
            return Ok(read(Value::Nil));
        };
        let name = args.string(lua, 1)?;
        if args.len() >= 3 {
            document.set_attribute(node, &name, &args.string(lua, 2)?);
            return Ok(MultiValue::new());
        }
        let value = document.attribute(node, &name).unwrap_or_default();
        read_string(lua, value)
    })?;

    register(state, bridge, "addClass", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let class = args.string(lua, 1)?;
        with_class(state, &args.string(lua, 0)?, |document, node| {
            document.add_class(node, &class)
        });
        Ok(())
    })?;

    register(state, bridge, "removeClass", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let class = args.string(lua, 1)?;
        with_class(state, &args.string(lua, 0)?, |document, node| {
            document.remove_class(node, &class)
        });
        Ok(())
    })?;

    register(state, bridge, "toggleClass", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let class = args.string(lua, 1)?;
        with_class(state, &args.string(lua, 0)?, |document, node| {
            document.toggle_class(node, &class);
        });
        Ok(())
    })
}

fn read(value: Value) -> MultiValue {
    MultiValue::from_vec(vec![value])
}

fn read_string(lua: &Lua, value: String) -> mlua::Result<MultiValue> {
    lua.create_string(value).map(|s| read(Value::String(s)))
}

fn select(document: &dyn Document, selector: &str) -> Option<NodeId> {
    document.query_selector(selector)
}

fn with_class(state: &InterpreterState, selector: &str, f: impl FnOnce(&dyn Document, NodeId)) {
    let document = state.services.document.as_ref();
    if let Some(node) = select(document, selector) {
        f(document, node);
    }
}

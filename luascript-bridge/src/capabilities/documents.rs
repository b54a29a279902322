//! `doc_*`: document sessions addressed by the id `doc_create` returns.
//! Unknown ids are no-ops that return `false` (or `nil` for `doc_export`).

use super::{register, Args};
use crate::context::InterpreterState;
use crate::documents::TextPlacement;
use crate::marshal::stringify;
use mlua::{Lua, MultiValue, Table, Value};
use std::rc::Rc;

const DEFAULT_TITLE: &str = "Untitled";

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    register(state, bridge, "doc_create", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let title = args
            .opt_string(lua, 0)?
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        Ok(state.documents.create(&title))
    })?;

    register(state, bridge, "doc_add_page", |state, _, values: MultiValue| {
        let args = Args::new(values);
        Ok(state.documents.add_page(args.id(0)))
    })?;

    // doc_add_text(id, text[, x, y, size])
    register(state, bridge, "doc_add_text", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let placement = TextPlacement {
            x: args.number(2),
            y: args.number(3),
            size: args.number(4).filter(|s| *s > 0.0),
        };
        Ok(state
            .documents
            .add_text(args.id(0), &args.display(lua, 1)?, placement))
    })?;

    // doc_add_table(id, rows) with rows a list of lists
    register(state, bridge, "doc_add_table", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let Value::Table(rows) = args.get(1) else {
            return Ok(false);
        };
        Ok(state.documents.add_table(args.id(0), table_rows(lua, &rows)?))
    })?;

    register(state, bridge, "doc_save", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let id = args.id(0);
        let filename = args
            .opt_string(lua, 1)?
            .unwrap_or_else(|| format!("document-{id}.{}", state.documents.extension()));
        Ok(state.documents.save(id, &filename))
    })?;

    register(state, bridge, "doc_export", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        match state.documents.export(args.id(0)) {
            Some(contents) => lua.create_string(contents).map(Value::String),
            None => Ok(Value::Nil),
        }
    })?;

    register(state, bridge, "doc_close", |state, _, values: MultiValue| {
        let args = Args::new(values);
        Ok(state.documents.close(args.id(0)))
    })
}

fn table_rows(lua: &Lua, rows: &Table) -> mlua::Result<Vec<Vec<String>>> {
    let mut out = Vec::new();
    for row in rows.sequence_values::<Value>() {
        let cells = match row? {
            Value::Table(cells) => cells
                .sequence_values::<Value>()
                .map(|cell| cell.and_then(|c| stringify(lua, &c)))
                .collect::<mlua::Result<Vec<_>>>()?,
            other => vec![stringify(lua, &other)?],
        };
        out.push(cells);
    }
    Ok(out)
}

//! `http_get` and `http_request`.
//!
//! Requests run on the local task set; the handler is called exactly once with
//! the status and body, or with status 0 and the error text.

use super::{register, Args};
use crate::callbacks::Callback;
use crate::context::InterpreterState;
use crate::fetch::HttpRequest;
use crate::marshal::{stringify, HostValue};
use mlua::{Lua, MultiValue, Table, Value};
use std::rc::Rc;
use tracing::debug;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // http_get(url, handler) -> handler(status, body)
    register(state, bridge, "http_get", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let url = args.string(lua, 0)?;
        let callback = args.callback(state, lua, 1)?;
        spawn_request(state, HttpRequest::get(url), callback, false);
        Ok(())
    })?;

    // http_request(method, url, headers, body, handler) -> handler(status, body, headersJson)
    register(state, bridge, "http_request", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let method = args
            .opt_string(lua, 0)?
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string());
        let url = args.string(lua, 1)?;
        let headers = match args.get(2) {
            Value::Table(table) => header_pairs(lua, &table)?,
            _ => Vec::new(),
        };
        let body = args.opt_string(lua, 3)?;
        let callback = args.callback(state, lua, 4)?;

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
        };
        spawn_request(state, request, callback, true);
        Ok(())
    })
}

fn header_pairs(lua: &Lua, table: &Table) -> mlua::Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        let (name, value) = pair?;
        headers.push((
            stringify(lua, &name)?,
            stringify(lua, &value)?,
        ));
    }
    headers.sort();
    Ok(headers)
}

fn spawn_request(
    state: &Rc<InterpreterState>,
    request: HttpRequest,
    callback: Callback,
    with_headers: bool,
) {
    let weak = Rc::downgrade(state);
    let http = Rc::clone(&state.services.http);
    state.pending.begin();

    tokio::task::spawn_local(async move {
        debug!(method = %request.method, url = %request.url, "script request");
        let result = http.execute(request).await;
        let Some(state) = weak.upgrade() else {
            return;
        };

        let mut args = match &result {
            Ok(response) => vec![
                HostValue::from(response.status),
                HostValue::from(response.text()),
            ],
            Err(e) => vec![HostValue::from(0i64), HostValue::from(e.to_string())],
        };
        if with_headers {
            let headers = match &result {
                Ok(response) => response.headers_json(),
                Err(_) => "{}".to_string(),
            };
            args.push(HostValue::from(headers));
        }

        state.invoke_once(&callback, args);
        state.pending.end();
    });
}

//! `connect`, `send` and `close`.
//!
//! Handlers are `on_open(id)`, `on_message(id, text)`, `on_close(id, reason)`
//! and `on_error(id, message)`; any of them may be `nil`.

use super::{register, Args};
use crate::callbacks::Callback;
use crate::context::InterpreterState;
use crate::marshal::HostValue;
use crate::sockets::{SocketChannel, SocketEvent};
use mlua::{MultiValue, Table};
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Default)]
struct SocketHandlers {
    on_open: Option<Callback>,
    on_message: Option<Callback>,
    on_close: Option<Callback>,
    on_error: Option<Callback>,
}

impl SocketHandlers {
    fn all(&self) -> impl Iterator<Item = &Callback> {
        [&self.on_open, &self.on_message, &self.on_close, &self.on_error]
            .into_iter()
            .flatten()
    }
}

pub(crate) struct ConnectionSlot {
    handlers: SocketHandlers,
    outgoing: UnboundedSender<String>,
    open: bool,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSlot {
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // connect(url, on_open, on_message, on_close, on_error) -> id, 0 on failure
    register(state, bridge, "connect", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let url = args.string(lua, 0)?;
        let handlers = SocketHandlers {
            on_open: args.opt_callback(state, lua, 1)?,
            on_message: args.opt_callback(state, lua, 2)?,
            on_close: args.opt_callback(state, lua, 3)?,
            on_error: args.opt_callback(state, lua, 4)?,
        };
        Ok(connect(state, &url, handlers))
    })?;

    // send(id, text) -> false unless the connection is open
    register(state, bridge, "send", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let id = args.id(0);
        let text = args.string(lua, 1)?;
        let connections = state.connections.borrow();
        Ok(match connections.get(&id) {
            Some(slot) if slot.open => slot.outgoing.send(text).is_ok(),
            _ => false,
        })
    })?;

    // close(id) -> whether the id was known; on_close is not called
    register(state, bridge, "close", |state, _, values: MultiValue| {
        let args = Args::new(values);
        let id = args.id(0);
        let Some(slot) = forget(state, id) else {
            return Ok(false);
        };
        slot.abort();
        release(state, &slot.handlers);
        debug!(id, "socket closed by script");
        Ok(true)
    })
}

fn connect(state: &Rc<InterpreterState>, url: &str, handlers: SocketHandlers) -> u64 {
    let channel = match state.services.sockets.connect(url) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(url, error = %e, "socket connect rejected");
            release(state, &handlers);
            return 0;
        }
    };
    let SocketChannel { outgoing, mut incoming } = channel;

    let id = state.next_id();
    state.connections.borrow_mut().insert(
        id,
        ConnectionSlot {
            handlers,
            outgoing,
            open: false,
            task: None,
        },
    );
    state.pending.begin();

    let weak = Rc::downgrade(state);
    let task = tokio::task::spawn_local(async move {
        while let Some(event) = incoming.recv().await {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if !deliver(&state, id, event) {
                return;
            }
        }
        // Transport went away without a close event.
        if let Some(state) = weak.upgrade() {
            if let Some(slot) = forget(&state, id) {
                release(&state, &slot.handlers);
            }
        }
    });
    if let Some(slot) = state.connections.borrow_mut().get_mut(&id) {
        slot.task = Some(task);
    }
    debug!(id, url, "socket connecting");
    id
}

/// Routes one transport event to its handler. Returns `false` once the
/// connection is finished.
fn deliver(state: &InterpreterState, id: u64, event: SocketEvent) -> bool {
    let id_arg = HostValue::from(id as i64);
    match event {
        SocketEvent::Open => {
            let handler = {
                let mut connections = state.connections.borrow_mut();
                let Some(slot) = connections.get_mut(&id) else {
                    return false;
                };
                slot.open = true;
                slot.handlers.on_open.clone()
            };
            if let Some(handler) = handler {
                state.invoke(&handler, vec![id_arg]);
            }
            true
        }
        SocketEvent::Message(text) => {
            let Some(handler) = handler_of(state, id, |h| &h.on_message) else {
                return state.connections.borrow().contains_key(&id);
            };
            state.invoke(&handler, vec![id_arg, HostValue::from(text)]);
            true
        }
        SocketEvent::Error(message) => {
            let Some(handler) = handler_of(state, id, |h| &h.on_error) else {
                return state.connections.borrow().contains_key(&id);
            };
            state.invoke(&handler, vec![id_arg, HostValue::from(message)]);
            true
        }
        SocketEvent::Close { reason } => {
            let Some(slot) = forget(state, id) else {
                return false;
            };
            if let Some(handler) = &slot.handlers.on_close {
                state.invoke(handler, vec![id_arg, HostValue::from(reason)]);
            }
            release(state, &slot.handlers);
            false
        }
    }
}

fn handler_of(
    state: &InterpreterState,
    id: u64,
    pick: impl Fn(&SocketHandlers) -> &Option<Callback>,
) -> Option<Callback> {
    state
        .connections
        .borrow()
        .get(&id)
        .and_then(|slot| pick(&slot.handlers).clone())
}

/// Removes the connection; dropping its sender shuts the transport down.
fn forget(state: &InterpreterState, id: u64) -> Option<ConnectionSlot> {
    let slot = state.connections.borrow_mut().remove(&id)?;
    state.pending.end();
    Some(slot)
}

fn release(state: &InterpreterState, handlers: &SocketHandlers) {
    for handler in handlers.all() {
        state.callbacks.release(&handler.handle);
    }
}

use super::{register, Args};
use crate::context::InterpreterState;
use crate::dom::DomEvent;
use crate::marshal::HostValue;
use mlua::{MultiValue, Table};
use std::rc::Rc;
use tracing::debug;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // when(event, selector, handler)
    register(state, bridge, "when", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let event_type = args.string(lua, 0)?;
        let pattern = args.string(lua, 1)?;
        let callback = args.callback(state, lua, 2)?;
        if state.router.add(&event_type, &pattern, callback) {
            bind(state, &event_type);
        }
        Ok(())
    })?;

    // off(event, selector) -> removed?
    register(state, bridge, "off", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let event_type = args.string(lua, 0)?;
        let pattern = args.string(lua, 1)?;
        let Some(handlers) = state.router.remove(&event_type, &pattern) else {
            return Ok(false);
        };
        for handler in &handlers {
            state.callbacks.release(&handler.handle);
        }
        debug!(event_type = %event_type, pattern = %pattern, "removed event binding");
        Ok(true)
    })
}

/// Installs the single capture-phase listener for `event_type`.
fn bind(state: &Rc<InterpreterState>, event_type: &str) {
    let weak = Rc::downgrade(state);
    state.services.document.add_event_listener(
        event_type,
        true,
        Rc::new(move |event: &DomEvent| {
            if let Some(state) = weak.upgrade() {
                dispatch(&state, event);
            }
        }),
    );
    debug!(event_type, "bound DOM event");
    state
        .executor
        .debug_line(&format!("bound DOM event: {event_type}"));
}

/// Fans one occurrence out to every binding of its type, in registration
/// order. Each binding sees the closest ancestor-or-self of the origin that
/// matches its pattern; bindings with no match are skipped.
fn dispatch(state: &InterpreterState, event: &DomEvent) {
    let document = Rc::clone(&state.services.document);
    for binding in state.router.snapshot(&event.event_type) {
        let Some(node) = document.closest(event.target, &binding.pattern) else {
            continue;
        };
        let payload = vec![
            HostValue::from(event.event_type.as_str()),
            HostValue::from(binding.pattern.as_str()),
            HostValue::from(document.element_id(node)),
            HostValue::from(document.class_name(node)),
        ];
        for handler in &binding.handlers {
            state.invoke(handler, payload.clone());
        }
    }
}

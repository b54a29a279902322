//! `set_timeout`, `set_interval` and `clear_timer`.

use super::{register, Args};
use crate::callbacks::Callback;
use crate::context::InterpreterState;
use mlua::{MultiValue, Table};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

const MIN_INTERVAL_MS: f64 = 1.0;
/// Longer delays are clamped to this, the largest delay browsers honour.
const MAX_DELAY_MS: f64 = i32::MAX as f64;

pub(crate) struct TimerSlot {
    callback: Callback,
    task: JoinHandle<()>,
}

impl TimerSlot {
    pub fn abort(&self) {
        self.task.abort();
    }
}

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // set_timeout(ms, handler) -> id
    register(state, bridge, "set_timeout", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let delay = millis(args.number(0), 0.0);
        let callback = args.callback(state, lua, 1)?;
        Ok(schedule(state, delay, callback, false))
    })?;

    // set_interval(ms, handler) -> id
    register(state, bridge, "set_interval", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let period = millis(args.number(0), MIN_INTERVAL_MS);
        let callback = args.callback(state, lua, 1)?;
        Ok(schedule(state, period, callback, true))
    })?;

    // clear_timer(id); unknown ids are ignored
    register(state, bridge, "clear_timer", |state, _, values: MultiValue| {
        let args = Args::new(values);
        clear(state, args.id(0));
        Ok(())
    })
}

fn millis(requested: Option<f64>, floor: f64) -> Duration {
    let ms = requested
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
        .clamp(floor, MAX_DELAY_MS);
    Duration::from_secs_f64(ms / 1000.0)
}

fn schedule(
    state: &Rc<InterpreterState>,
    delay: Duration,
    callback: Callback,
    repeating: bool,
) -> u64 {
    let id = state.next_id();
    let weak = Rc::downgrade(state);

    let task = if repeating {
        tokio::task::spawn_local(async move {
            // An unrepresentable first deadline means the interval never ticks.
            let Some(start) = Instant::now().checked_add(delay) else {
                return;
            };
            let mut ticker = tokio::time::interval_at(start, delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                if !fire_interval(&state, id) {
                    break;
                }
            }
        })
    } else {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(state) = weak.upgrade() {
                fire_timeout(&state, id);
            }
        })
    };

    state
        .timers
        .borrow_mut()
        .insert(id, TimerSlot { callback, task });
    state.pending.begin();
    trace!(id, ?delay, repeating, "timer scheduled");
    id
}

fn fire_timeout(state: &InterpreterState, id: u64) {
    let Some(slot) = state.timers.borrow_mut().remove(&id) else {
        return;
    };
    state.invoke_once(&slot.callback, Vec::new());
    state.pending.end();
}

/// Returns whether the interval is still registered.
fn fire_interval(state: &InterpreterState, id: u64) -> bool {
    let callback = match state.timers.borrow().get(&id) {
        Some(slot) => slot.callback.clone(),
        None => return false,
    };
    state.invoke(&callback, Vec::new());
    state.timers.borrow().contains_key(&id)
}

fn clear(state: &InterpreterState, id: u64) {
    let Some(slot) = state.timers.borrow_mut().remove(&id) else {
        return;
    };
    slot.abort();
    state.callbacks.release(&slot.callback.handle);
    state.pending.end();
    trace!(id, "timer cleared");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(requested: f64, floor: f64) -> f64 {
        millis(Some(requested), floor).as_secs_f64() * 1000.0
    }

    #[test]
    fn delays_are_clamped_to_the_supported_range() {
        assert_eq!(millis(Some(-5.0), 0.0), Duration::ZERO);
        assert_eq!(millis(Some(f64::NAN), 0.0), Duration::ZERO);
        assert_eq!(millis(None, 0.0), Duration::ZERO);
        assert!((ms(0.0, MIN_INTERVAL_MS) - 1.0).abs() < 1e-3);
        assert!((ms(250.0, 0.0) - 250.0).abs() < 1e-3);
        assert!((ms(1e300, 0.0) - MAX_DELAY_MS).abs() < 1e-3);
    }
}

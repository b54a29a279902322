//! Delegated event bindings.
//!
//! Bindings are keyed by `(event type, target pattern)` and kept in
//! first-registration order. Each event type gets at most one host listener.
//! The router only records which types are bound and leaves installing the
//! listener to the caller.

use crate::callbacks::Callback;
use std::cell::RefCell;
use std::collections::HashSet;

struct Binding {
    event_type: String,
    pattern: String,
    handlers: Vec<Callback>,
}

/// Handlers of one binding, captured at dispatch time.
pub struct BindingSnapshot {
    pub pattern: String,
    pub handlers: Vec<Callback>,
}

#[derive(Default)]
pub struct EventRouter {
    bindings: RefCell<Vec<Binding>>,
    bound: RefCell<HashSet<String>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the binding. Returns `true` when `event_type` had
    /// no listener yet and the caller must install one.
    pub fn add(&self, event_type: &str, pattern: &str, callback: Callback) -> bool {
        {
            let mut bindings = self.bindings.borrow_mut();
            match bindings
                .iter_mut()
                .find(|b| b.event_type == event_type && b.pattern == pattern)
            {
                Some(binding) => binding.handlers.push(callback),
                None => bindings.push(Binding {
                    event_type: event_type.to_string(),
                    pattern: pattern.to_string(),
                    handlers: vec![callback],
                }),
            }
        }
        self.bound.borrow_mut().insert(event_type.to_string())
    }

    /// Removes a binding and hands back its handlers so their counts can be
    /// released. The event type stays bound.
    pub fn remove(&self, event_type: &str, pattern: &str) -> Option<Vec<Callback>> {
        let mut bindings = self.bindings.borrow_mut();
        let index = bindings
            .iter()
            .position(|b| b.event_type == event_type && b.pattern == pattern)?;
        Some(bindings.remove(index).handlers)
    }

    /// Bindings of `event_type` in registration order, copied so handlers
    /// added during a dispatch wait for the next occurrence.
    pub fn snapshot(&self, event_type: &str) -> Vec<BindingSnapshot> {
        self.bindings
            .borrow()
            .iter()
            .filter(|b| b.event_type == event_type)
            .map(|b| BindingSnapshot {
                pattern: b.pattern.clone(),
                handlers: b.handlers.clone(),
            })
            .collect()
    }

    pub fn is_bound(&self, event_type: &str) -> bool {
        self.bound.borrow().contains(event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallableHandle;
    use crate::executor::UnitScope;

    fn callback(name: &str) -> Callback {
        Callback {
            handle: CallableHandle::Name(name.to_string()),
            owner: UnitScope::detached(false),
        }
    }

    fn names(snapshot: &BindingSnapshot) -> Vec<String> {
        snapshot.handlers.iter().map(|c| c.handle.to_string()).collect()
    }

    #[test]
    fn first_binding_of_a_type_requests_a_listener() {
        let router = EventRouter::new();
        assert!(router.add("click", "#a", callback("one")));
        assert!(!router.add("click", "#b", callback("two")));
        assert!(!router.add("click", "#a", callback("three")));
        assert!(router.add("input", "#a", callback("four")));
        assert!(router.is_bound("click"));
        assert_eq!(router.snapshot("click")[0].handlers.len(), 2);
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let router = EventRouter::new();
        router.add("click", "#b", callback("b1"));
        router.add("click", "#a", callback("a1"));
        router.add("click", "#b", callback("b2"));
        router.add("input", "#b", callback("other"));

        let snapshot = router.snapshot("click");
        let patterns: Vec<&str> = snapshot.iter().map(|s| s.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["#b", "#a"]);
        assert_eq!(names(&snapshot[0]), vec!["b1", "b2"]);
    }

    #[test]
    fn remove_returns_handlers_and_keeps_type_bound() {
        let router = EventRouter::new();
        router.add("click", "#a", callback("one"));
        let removed = router.remove("click", "#a").unwrap();
        assert_eq!(removed.len(), 1);
        assert!(router.remove("click", "#a").is_none());
        assert!(router.snapshot("click").is_empty());
        assert!(router.is_bound("click"));
        assert!(!router.add("click", "#a", callback("again")));
    }
}

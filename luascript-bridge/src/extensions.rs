//! Host-provided named functions reachable through `call_host`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A host function. Arguments arrive stringified.
pub type ExtensionFn = Rc<dyn Fn(&[String]) -> Result<String, String>>;

/// Name -> host function table. Clones share the same table.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    handlers: Rc<RefCell<BTreeMap<String, ExtensionFn>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) `name`.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[String]) -> Result<String, String> + 'static,
    {
        self.handlers
            .borrow_mut()
            .insert(name.to_string(), Rc::new(handler));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.borrow_mut().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.borrow().keys().cloned().collect()
    }

    /// `None` for unknown names; failures come back as `"error: ..."`.
    pub fn call(&self, name: &str, args: &[String]) -> Option<String> {
        // Cloned out so a handler may register further extensions.
        let handler = self.handlers.borrow().get(name).cloned()?;
        Some(match handler(args) {
            Ok(result) => result,
            Err(e) => format!("error: {e}"),
        })
    }
}

//! Per-unit output sinks.
//!
//! Every script unit writes `print`/`display` lines and (opt-in) diagnostics
//! into exactly one append-only sink.

use crate::dom::{Document, NodeId};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Append-only line sink.
pub trait OutputSink {
    fn write_line(&self, line: &str);
}

/// Collects lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// All lines joined with `\n`.
    pub fn contents(&self) -> String {
        self.lines.borrow().join("\n")
    }
}

impl OutputSink for BufferSink {
    fn write_line(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}

/// Writes lines to stdout, optionally prefixed with the unit name.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink {
    prefix: Option<String>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl OutputSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = match &self.prefix {
            Some(prefix) => writeln!(out, "[{prefix}] {line}"),
            None => writeln!(out, "{line}"),
        };
    }
}

/// Appends lines to the text content of a document element (a `<pre>` placed
/// right after the script node).
pub struct ElementSink {
    document: Rc<dyn Document>,
    node: NodeId,
}

impl ElementSink {
    /// Inserts a fresh `<pre>` after `anchor` and returns a sink writing into it.
    pub fn after(document: Rc<dyn Document>, anchor: NodeId) -> Self {
        let node = document.insert_after(anchor, "pre");
        Self { document, node }
    }

    /// The element receiving the output.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl OutputSink for ElementSink {
    fn write_line(&self, line: &str) {
        let mut text = self.document.text(self.node);
        text.push_str(line);
        text.push('\n');
        self.document.set_text(self.node, &text);
    }
}

/// Discards everything. Used before any unit has run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

//! Document generation sessions behind the `doc_*` capabilities.
//!
//! Scripts build a page/block model through explicit session ids; rendering to
//! bytes is delegated to a [`DocumentRenderer`].

use crate::error::BridgeResult;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

pub const DEFAULT_MARGIN: f64 = 10.0;
pub const DEFAULT_FONT_SIZE: f64 = 12.0;
const LINE_SPACING: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
        x: f64,
        y: f64,
        size: f64,
    },
    Table {
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub blocks: Vec<Block>,
    #[serde(skip)]
    cursor: f64,
}

impl Page {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            cursor: DEFAULT_MARGIN,
        }
    }
}

/// Everything a script has put into one document so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentModel {
    pub title: String,
    pub pages: Vec<Page>,
}

impl DocumentModel {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            pages: vec![Page::new()],
        }
    }

    fn current_page(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }
}

/// Options for a text block; `None` fields take the page defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPlacement {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub size: Option<f64>,
}

/// Turns a finished model into file contents.
pub trait DocumentRenderer {
    fn render(&self, document: &DocumentModel) -> BridgeResult<Vec<u8>>;

    fn extension(&self) -> &str;
}

/// Renders the model as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl DocumentRenderer for JsonRenderer {
    fn render(&self, document: &DocumentModel) -> BridgeResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(document)?)
    }

    fn extension(&self) -> &str {
        "json"
    }
}

/// Live document sessions keyed by id.
pub struct DocumentSessions {
    renderer: Rc<dyn DocumentRenderer>,
    output_dir: PathBuf,
    sessions: RefCell<HashMap<u64, DocumentModel>>,
    next_id: Cell<u64>,
}

impl DocumentSessions {
    pub fn new(renderer: Rc<dyn DocumentRenderer>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            output_dir: output_dir.into(),
            sessions: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn create(&self, title: &str) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.sessions
            .borrow_mut()
            .insert(id, DocumentModel::new(title));
        debug!(id, title, "document session created");
        id
    }

    pub fn add_page(&self, id: u64) -> bool {
        self.with(id, |doc| doc.pages.push(Page::new())).is_some()
    }

    pub fn add_text(&self, id: u64, text: &str, placement: TextPlacement) -> bool {
        self.with(id, |doc| {
            let page = doc.current_page();
            let size = placement.size.unwrap_or(DEFAULT_FONT_SIZE);
            let y = placement.y.unwrap_or(page.cursor + size);
            page.cursor = page.cursor.max(y + size * (LINE_SPACING - 1.0));
            page.blocks.push(Block::Text {
                text: text.to_string(),
                x: placement.x.unwrap_or(DEFAULT_MARGIN),
                y,
                size,
            });
        })
        .is_some()
    }

    pub fn add_table(&self, id: u64, rows: Vec<Vec<String>>) -> bool {
        self.with(id, |doc| {
            let page = doc.current_page();
            page.cursor += DEFAULT_FONT_SIZE * LINE_SPACING * rows.len() as f64;
            page.blocks.push(Block::Table { rows });
        })
        .is_some()
    }

    /// Renders the session to `filename` inside the output directory.
    /// Only the final path component of `filename` is used.
    pub fn save(&self, id: u64, filename: &str) -> bool {
        let Some(name) = Path::new(filename).file_name() else {
            warn!(filename, "refusing to save document without a file name");
            return false;
        };
        let Some(bytes) = self.render(id) else {
            return false;
        };
        let path = self.output_dir.join(name);
        match std::fs::create_dir_all(&self.output_dir).and_then(|_| std::fs::write(&path, bytes)) {
            Ok(()) => {
                debug!(id, path = %path.display(), "document saved");
                true
            }
            Err(e) => {
                warn!(id, path = %path.display(), error = %e, "failed to save document");
                false
            }
        }
    }

    /// Rendered contents as text.
    pub fn export(&self, id: u64) -> Option<String> {
        self.render(id)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn close(&self, id: u64) -> bool {
        self.sessions.borrow_mut().remove(&id).is_some()
    }

    pub fn model(&self, id: u64) -> Option<DocumentModel> {
        self.sessions.borrow().get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn extension(&self) -> String {
        self.renderer.extension().to_string()
    }

    fn render(&self, id: u64) -> Option<Vec<u8>> {
        let model = self.model(id)?;
        match self.renderer.render(&model) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(id, error = %e, "document render failed");
                None
            }
        }
    }

    fn with<R>(&self, id: u64, f: impl FnOnce(&mut DocumentModel) -> R) -> Option<R> {
        self.sessions.borrow_mut().get_mut(&id).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sessions(dir: &Path) -> DocumentSessions {
        DocumentSessions::new(Rc::new(JsonRenderer), dir)
    }

    #[test]
    fn sessions_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let docs = sessions(dir.path());
        let a = docs.create("A");
        let b = docs.create("B");
        assert_ne!(a, b);

        assert!(docs.add_text(a, "hello", TextPlacement::default()));
        assert!(docs.add_page(b));
        assert_eq!(docs.model(a).unwrap().pages[0].blocks.len(), 1);
        assert_eq!(docs.model(b).unwrap().pages.len(), 2);
        assert_eq!(docs.live_count(), 2);
    }

    #[test]
    fn unknown_session_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let docs = sessions(dir.path());
        assert!(!docs.add_page(42));
        assert!(!docs.add_text(42, "x", TextPlacement::default()));
        assert!(!docs.save(42, "out.json"));
        assert_eq!(docs.export(42), None);
        assert!(!docs.close(42));
    }

    #[test]
    fn text_defaults_flow_down_the_page() {
        let dir = tempfile::tempdir().unwrap();
        let docs = sessions(dir.path());
        let id = docs.create("T");
        docs.add_text(id, "one", TextPlacement::default());
        docs.add_text(id, "two", TextPlacement::default());
        docs.add_text(
            id,
            "three",
            TextPlacement {
                x: Some(50.0),
                y: Some(100.0),
                size: Some(20.0),
            },
        );

        let blocks = docs.model(id).unwrap().pages[0].blocks.clone();
        let ys: Vec<f64> = blocks
            .iter()
            .map(|b| match b {
                Block::Text { y, .. } => *y,
                Block::Table { .. } => 0.0,
            })
            .collect();
        assert_eq!(ys, vec![22.0, 40.0, 100.0]);
    }

    #[test]
    fn save_writes_only_the_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let docs = sessions(dir.path());
        let id = docs.create("Report");
        docs.add_table(id, vec![vec!["a".into(), "b".into()]]);

        assert!(docs.save(id, "../../escape/report.json"));
        let saved = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        assert!(saved.contains("\"title\": \"Report\""));
        assert!(saved.contains("\"kind\": \"table\""));

        // Saving leaves the session open.
        assert!(docs.export(id).is_some());
        assert!(docs.close(id));
        assert_eq!(docs.export(id), None);
    }
}

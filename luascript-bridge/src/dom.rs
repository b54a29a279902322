//! Host document interface.
//!
//! The bridge never owns a DOM; it talks to one through [`Document`]. Reads and
//! writes are separate operations here, the Lua-facing capabilities pick one
//! based on how many arguments the script passed.
//!
//! [`MemoryDocument`] is a small element tree with a CSS subset
//! (type, `#id`, `.class`, `[attr]`, `[attr=value]`, descendant combinator,
//! selector lists). It backs headless runs and the test suite.

use std::cell::RefCell;
use std::rc::Rc;

/// Opaque element handle.
pub type NodeId = usize;

/// One occurrence of a host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub event_type: String,
    /// Element the event originated from.
    pub target: NodeId,
}

/// Host-side event listener.
pub type EventListener = Rc<dyn Fn(&DomEvent)>;

/// The document operations the bridge depends on.
///
/// All methods take `&self`; implementations use interior mutability because
/// the document is shared by every capability and the script host.
pub trait Document {
    /// First element in document order matching `selector`.
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    /// Every element in document order matching `selector`.
    fn query_selector_all(&self, selector: &str) -> Vec<NodeId>;

    /// Closest ancestor-or-self of `node` matching `selector`.
    fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId>;

    fn tag_name(&self, node: NodeId) -> String;

    fn text(&self, node: NodeId) -> String;
    fn set_text(&self, node: NodeId, text: &str);

    fn inner_html(&self, node: NodeId) -> String;
    fn set_inner_html(&self, node: NodeId, html: &str);

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    /// Creates a `tag` element as the next sibling of `anchor`.
    fn insert_after(&self, anchor: NodeId, tag: &str) -> NodeId;

    /// Registers a document-level listener for `event_type`.
    fn add_event_listener(&self, event_type: &str, capture: bool, listener: EventListener);

    fn element_id(&self, node: NodeId) -> String {
        self.attribute(node, "id").unwrap_or_default()
    }

    fn class_name(&self, node: NodeId) -> String {
        self.attribute(node, "class").unwrap_or_default()
    }

    fn add_class(&self, node: NodeId, class: &str) {
        let mut classes = class_list(&self.class_name(node));
        if class.is_empty() || classes.iter().any(|c| c == class) {
            return;
        }
        classes.push(class.to_string());
        self.set_attribute(node, "class", &classes.join(" "));
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        let classes = class_list(&self.class_name(node));
        if !classes.iter().any(|c| c == class) {
            return;
        }
        let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        self.set_attribute(node, "class", &kept.join(" "));
    }

    /// Returns whether the class is present afterwards.
    fn toggle_class(&self, node: NodeId, class: &str) -> bool {
        if class_list(&self.class_name(node)).iter().any(|c| c == class) {
            self.remove_class(node, class);
            false
        } else {
            self.add_class(node, class);
            !class.is_empty()
        }
    }
}

fn class_list(class_name: &str) -> Vec<String> {
    class_name.split_whitespace().map(str::to_string).collect()
}

// ============================================================
// In-memory document
// ============================================================

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    raw_html: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            raw_html: None,
            parent: None,
            children: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Listener {
    event_type: String,
    capture: bool,
    callback: EventListener,
}

/// Element tree kept entirely in memory.
pub struct MemoryDocument {
    nodes: RefCell<Vec<Node>>,
    listeners: RefCell<Vec<Listener>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// Creates `<html><body></body></html>`.
    pub fn new() -> Self {
        let doc = Self {
            nodes: RefCell::new(vec![Node::new("html")]),
            listeners: RefCell::new(Vec::new()),
        };
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body);
        doc
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn body(&self) -> NodeId {
        1
    }

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(Node::new(tag));
        nodes.len() - 1
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let mut nodes = self.nodes.borrow_mut();
        nodes[child].parent = Some(parent);
        nodes[parent].children.push(child);
    }

    /// Creates `tag` with `attributes` and appends it to `parent`.
    pub fn element(&self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(node, name, value);
        }
        self.append_child(parent, node);
        node
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Delivers an event: capture-phase listeners first, then bubbling ones,
    /// each group in registration order.
    pub fn dispatch_event(&self, event_type: &str, target: NodeId) {
        let event = DomEvent {
            event_type: event_type.to_string(),
            target,
        };
        let (capture, bubble): (Vec<_>, Vec<_>) = self
            .listeners
            .borrow()
            .iter()
            .filter(|l| l.event_type == event_type)
            .map(|l| (l.capture, Rc::clone(&l.callback)))
            .partition(|(capture, _)| *capture);
        for (_, listener) in capture.into_iter().chain(bubble) {
            listener(&event);
        }
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.event_type == event_type)
            .count()
    }

    fn detach(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        if let Some(parent) = nodes[node].parent.take() {
            nodes[parent].children.retain(|c| *c != node);
        }
    }

    fn clear_children(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let children = std::mem::take(&mut nodes[node].children);
        for child in children {
            nodes[child].parent = None;
        }
    }

    fn descendants(&self, node: NodeId, out: &mut Vec<NodeId>) {
        for child in self.children(node) {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn matches(&self, node: NodeId, selector: &[Complex]) -> bool {
        let nodes = self.nodes.borrow();
        selector.iter().any(|complex| complex.matches(&nodes, node))
    }

    fn outer_html(&self, node: NodeId) -> String {
        let (tag, attributes) = {
            let nodes = self.nodes.borrow();
            (nodes[node].tag.clone(), nodes[node].attributes.clone())
        };
        let mut out = format!("<{tag}");
        for (name, value) in attributes {
            out.push_str(&format!(" {name}=\"{}\"", escape(&value)));
        }
        out.push('>');
        out.push_str(&self.inner_html(node));
        out.push_str(&format!("</{tag}>"));
        out
    }
}

impl Document for MemoryDocument {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        let Some(parsed) = parse_selector_list(selector) else {
            return Vec::new();
        };
        let mut all = vec![self.root()];
        self.descendants(self.root(), &mut all);
        all.into_iter().filter(|n| self.matches(*n, &parsed)).collect()
    }

    fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let parsed = parse_selector_list(selector)?;
        let mut current = Some(node);
        while let Some(n) = current {
            if self.matches(n, &parsed) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.nodes.borrow()[node].tag.clone()
    }

    fn text(&self, node: NodeId) -> String {
        let mut out = self.nodes.borrow()[node].text.clone();
        for child in self.children(node) {
            out.push_str(&self.text(child));
        }
        out
    }

    fn set_text(&self, node: NodeId, text: &str) {
        self.clear_children(node);
        let mut nodes = self.nodes.borrow_mut();
        nodes[node].text = text.to_string();
        nodes[node].raw_html = None;
    }

    fn inner_html(&self, node: NodeId) -> String {
        let (text, raw) = {
            let nodes = self.nodes.borrow();
            (nodes[node].text.clone(), nodes[node].raw_html.clone())
        };
        if let Some(raw) = raw {
            return raw;
        }
        let mut out = escape(&text);
        for child in self.children(node) {
            out.push_str(&self.outer_html(child));
        }
        out
    }

    fn set_inner_html(&self, node: NodeId, html: &str) {
        self.clear_children(node);
        let mut nodes = self.nodes.borrow_mut();
        nodes[node].text = strip_tags(html);
        nodes[node].raw_html = Some(html.to_string());
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes.borrow()[node].attribute(name).map(str::to_string)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let attributes = &mut nodes[node].attributes;
        match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((name.to_ascii_lowercase(), value.to_string())),
        }
    }

    fn insert_after(&self, anchor: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        match self.parent(anchor) {
            Some(parent) => {
                let mut nodes = self.nodes.borrow_mut();
                let siblings = &mut nodes[parent].children;
                let at = siblings
                    .iter()
                    .position(|c| *c == anchor)
                    .map(|i| i + 1)
                    .unwrap_or(siblings.len());
                siblings.insert(at, node);
                nodes[node].parent = Some(parent);
            }
            None => self.append_child(self.body(), node),
        }
        node
    }

    fn add_event_listener(&self, event_type: &str, capture: bool, listener: EventListener) {
        self.listeners.borrow_mut().push(Listener {
            event_type: event_type.to_string(),
            capture,
            callback: listener,
        });
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

// ============================================================
// Selector subset
// ============================================================

#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && *tag != node.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        let classes = node.attribute("class").unwrap_or_default();
        if !self
            .classes
            .iter()
            .all(|c| classes.split_whitespace().any(|have| have == c))
        {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| {
            match (node.attribute(name), expected) {
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
                (None, _) => false,
            }
        })
    }
}

/// Compounds joined by descendant combinators, left to right.
#[derive(Debug, PartialEq)]
struct Complex(Vec<Compound>);

impl Complex {
    fn matches(&self, nodes: &[Node], node: NodeId) -> bool {
        let Some((last, ancestors)) = self.0.split_last() else {
            return false;
        };
        if !last.matches(&nodes[node]) {
            return false;
        }
        let mut current = nodes[node].parent;
        for compound in ancestors.iter().rev() {
            loop {
                let Some(n) = current else {
                    return false;
                };
                current = nodes[n].parent;
                if compound.matches(&nodes[n]) {
                    break;
                }
            }
        }
        true
    }
}

/// Returns `None` for selectors outside the supported subset.
fn parse_selector_list(selector: &str) -> Option<Vec<Complex>> {
    let list = split_outside_brackets(selector, |c| c == ',')
        .into_iter()
        .map(|part| {
            let compounds = split_outside_brackets(&part, char::is_whitespace)
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|s| parse_compound(&s))
                .collect::<Option<Vec<_>>>()?;
            (!compounds.is_empty()).then_some(Complex(compounds))
        })
        .collect::<Option<Vec<_>>>()?;
    (!list.is_empty()).then_some(list)
}

fn split_outside_brackets(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in input.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 && is_separator(c) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts.into_iter().map(|p| p.trim().to_string()).collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < chars.len() && is_ident_char(chars[*pos]) {
        *pos += 1;
    }
    (*pos > start).then(|| chars[start..*pos].iter().collect())
}

fn parse_compound(input: &str) -> Option<Compound> {
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;
    let mut compound = Compound::default();

    if chars.first() == Some(&'*') {
        compound.tag = Some("*".to_string());
        pos = 1;
    } else if let Some(tag) = take_ident(&chars, &mut pos) {
        compound.tag = Some(tag.to_ascii_lowercase());
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                compound.id = Some(take_ident(&chars, &mut pos)?);
            }
            '.' => {
                pos += 1;
                compound.classes.push(take_ident(&chars, &mut pos)?);
            }
            '[' => {
                let close = chars[pos..].iter().position(|c| *c == ']')? + pos;
                let inner: String = chars[pos + 1..close].iter().collect();
                compound.attributes.push(parse_attribute(&inner)?);
                pos = close + 1;
            }
            _ => return None,
        }
    }
    Some(compound)
}

fn parse_attribute(inner: &str) -> Option<(String, Option<String>)> {
    match inner.split_once('=') {
        None => {
            let name = inner.trim();
            (!name.is_empty()).then(|| (name.to_ascii_lowercase(), None))
        }
        Some((name, value)) => {
            let name = name.trim();
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (!name.is_empty()).then(|| (name.to_ascii_lowercase(), Some(unquoted.to_string())))
        }
    }
}

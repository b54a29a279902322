//! Script units: configuration, source acquisition, execution and output.

use crate::context::Bridge;
use crate::error::{Diagnostic, Stage};
use crate::executor::UnitScope;
use crate::fetch::resolve_url;
use crate::output::{ElementSink, NullSink, OutputSink};
use std::rc::Rc;
use tracing::{debug, info};

/// Markup that marks a script unit in a document.
pub const UNIT_SELECTOR: &str = "lua-script, script[type='lua']";

/// Where a unit's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    Inline(String),
    /// URL, resolved against the page URL.
    Remote(String),
}

/// One script to run.
#[derive(Clone)]
pub struct ScriptUnit {
    pub name: String,
    pub source: UnitSource,
    /// Module configuration applied before the unit runs.
    pub config: Option<String>,
    /// Diagnostics flag; `None` uses the bridge default.
    pub debug: Option<bool>,
    pub sink: Rc<dyn OutputSink>,
}

impl ScriptUnit {
    pub fn inline(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(name.into(), UnitSource::Inline(code.into()))
    }

    pub fn remote(name: impl Into<String>, src: impl Into<String>) -> Self {
        Self::new(name.into(), UnitSource::Remote(src.into()))
    }

    fn new(name: String, source: UnitSource) -> Self {
        Self {
            name,
            source,
            config: None,
            debug: None,
            sink: Rc::new(NullSink),
        }
    }

    pub fn with_config(mut self, config_url: impl Into<String>) -> Self {
        self.config = Some(config_url.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_sink(mut self, sink: Rc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    /// Source could not be obtained, failed to compile or raised.
    Failed(Diagnostic),
    /// Configuration failed; the unit never ran.
    Skipped(Diagnostic),
}

impl UnitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Completed => None,
            Self::Failed(d) | Self::Skipped(d) => Some(d),
        }
    }
}

/// Runs script units against one [`Bridge`], one after another.
pub struct ScriptHost {
    bridge: Bridge,
}

impl ScriptHost {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Applies the unit's configuration, obtains its source and runs it.
    /// Failures stay with the unit; the next unit runs regardless.
    pub async fn run_unit(&self, unit: &ScriptUnit) -> UnitOutcome {
        let scope = UnitScope::new(
            Rc::clone(&unit.sink),
            unit.debug.unwrap_or_else(|| self.bridge.default_debug()),
        );
        let executor = self.bridge.executor();
        debug!(unit = %unit.name, "running script unit");

        if let Some(config_url) = &unit.config {
            if let Err(e) = self.bridge.apply_config_in(config_url, &scope).await {
                let diagnostic = Diagnostic::new(Stage::Config, e.to_string());
                let _guard = executor.enter(scope);
                executor.report(&diagnostic);
                return UnitOutcome::Skipped(diagnostic);
            }
        }

        let code = match &unit.source {
            UnitSource::Inline(code) => code.clone(),
            UnitSource::Remote(src) => match self.fetch_source(src).await {
                Ok(code) => code,
                Err(diagnostic) => {
                    let _guard = executor.enter(scope);
                    executor.report(&diagnostic);
                    return UnitOutcome::Failed(diagnostic);
                }
            },
        };

        let outcome = match self.bridge.run_source(&code, &unit.name, scope.clone()) {
            Ok(()) => UnitOutcome::Completed,
            Err(diagnostic) => UnitOutcome::Failed(diagnostic),
        };

        let _guard = executor.enter(scope);
        executor.debug_line(&format!("finished script unit: {}", unit.name));
        outcome
    }

    /// Discovers every unit in the bridge's document, in document order, and
    /// runs them. Each unit node is hidden and gets a `<pre>` for its output
    /// right after it.
    pub async fn run_document(&self) -> Vec<UnitOutcome> {
        let document = self.bridge.document();
        let nodes = document.query_selector_all(UNIT_SELECTOR);
        info!(units = nodes.len(), "running document script units");

        let mut outcomes = Vec::with_capacity(nodes.len());
        let mut last_scope = None;
        for (index, node) in nodes.into_iter().enumerate() {
            document.set_attribute(node, "hidden", "");
            let sink: Rc<dyn OutputSink> = Rc::new(ElementSink::after(Rc::clone(&document), node));

            let tag = document.tag_name(node);
            let source = match document.attribute(node, "src") {
                Some(src) if tag != "lua-script" && !src.is_empty() => UnitSource::Remote(src),
                _ => UnitSource::Inline(document.text(node)),
            };
            let name = document
                .attribute(node, "id")
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{tag}[{index}]"));
            let debug = document.attribute(node, "debug").as_deref() == Some("true")
                || self.bridge.default_debug();

            let unit = ScriptUnit {
                name,
                source,
                config: document.attribute(node, "config").filter(|c| !c.is_empty()),
                debug: Some(debug),
                sink: Rc::clone(&sink),
            };
            outcomes.push(self.run_unit(&unit).await);
            last_scope = Some(UnitScope::new(sink, debug));
        }

        if let Some(scope) = last_scope {
            let executor = self.bridge.executor();
            let _guard = executor.enter(scope);
            executor.debug_line("runtime ready");
        }
        outcomes
    }

    async fn fetch_source(&self, src: &str) -> Result<String, Diagnostic> {
        let url = match &self.bridge.config().runtime.page_url {
            Some(page) => resolve_url(page, src).unwrap_or_else(|_| src.to_string()),
            None => src.to_string(),
        };
        self.bridge
            .http()
            .fetch_text(&url)
            .await
            .map_err(|e| Diagnostic::new(Stage::Source, e.to_string()))
    }
}

//! Shared helpers for bridge integration tests.

#![allow(dead_code)]

use luascript_bridge::{
    Bridge, BridgeConfig, BufferSink, KdfParams, MemoryDocument, MemoryHttpClient, ScriptHost,
    ScriptUnit, UnitOutcome,
};
use std::future::Future;
use std::rc::Rc;

pub const PAGE_URL: &str = "https://x/index.html";

/// A host over an in-memory document and HTTP client.
pub struct Harness {
    pub host: ScriptHost,
    pub document: Rc<MemoryDocument>,
    pub http: Rc<MemoryHttpClient>,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = BridgeConfig::default();
        config.runtime.page_url = Some(PAGE_URL.to_string());
        Self::with_config(config)
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let document = Rc::new(MemoryDocument::new());
        let http = Rc::new(MemoryHttpClient::new());
        let bridge = Bridge::builder()
            .config(config)
            .document(Rc::clone(&document) as _)
            .http(Rc::clone(&http) as _)
            .kdf_params(KdfParams::fast())
            .build()
            .unwrap();
        Self {
            host: ScriptHost::new(bridge),
            document,
            http,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        self.host.bridge()
    }

    /// Runs `code` as an inline unit with diagnostics on.
    pub async fn run(&self, code: &str) -> (UnitOutcome, BufferSink) {
        let sink = BufferSink::new();
        let outcome = self.run_into(code, &sink).await;
        (outcome, sink)
    }

    /// Runs `code` as an inline unit writing into an existing sink.
    pub async fn run_into(&self, code: &str, sink: &BufferSink) -> UnitOutcome {
        let unit = ScriptUnit::inline("test", code)
            .with_debug(true)
            .with_sink(Rc::new(sink.clone()));
        self.host.run_unit(&unit).await
    }

    /// Runs `code` and waits until every asynchronous operation has finished.
    pub async fn run_to_idle(&self, code: &str) -> (UnitOutcome, BufferSink) {
        let result = self.run(code).await;
        self.bridge().wait_idle().await;
        result
    }
}

/// Drives `future` on a local task set, as the bridge requires.
pub async fn local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(future).await
}

/// Output lines without diagnostics noise.
pub fn printed(sink: &BufferSink) -> Vec<String> {
    sink.lines()
        .into_iter()
        .filter(|line| !line.starts_with("[LuaDebug]"))
        .collect()
}

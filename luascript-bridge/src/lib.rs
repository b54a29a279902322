//! Embedding bridge between Lua 5.4 scripts and a document host.
//!
//! A [`Bridge`] owns one interpreter and exposes host capabilities to it
//! (DOM access, HTTP, timers, sockets, storage, crypto, assets, document
//! generation, host extensions). Host events come back into Lua through
//! callback handles, and every entry into Lua goes through one protected call
//! path that reports failures to the owning script unit.
//!
//! The bridge is single-threaded: drive it from a Tokio current-thread
//! runtime inside a [`tokio::task::LocalSet`].
//!
//! ```no_run
//! use luascript_bridge::{Bridge, BufferSink, ScriptHost, ScriptUnit};
//! use std::rc::Rc;
//!
//! # async fn run() -> luascript_bridge::BridgeResult<()> {
//! let host = ScriptHost::new(Bridge::builder().build()?);
//! let out = BufferSink::new();
//! let unit = ScriptUnit::inline("hello", "print('hi')").with_sink(Rc::new(out.clone()));
//! host.run_unit(&unit).await;
//! host.bridge().wait_idle().await;
//! assert_eq!(out.lines(), vec!["hi"]);
//! # Ok(())
//! # }
//! ```

mod callbacks;
mod capabilities;
mod context;
mod executor;
mod preload;
mod router;

pub mod assets;
pub mod config;
pub mod documents;
pub mod dom;
pub mod error;
pub mod extensions;
pub mod fetch;
pub mod host;
pub mod marshal;
pub mod output;
pub mod sockets;

pub use assets::AssetStore;
pub use callbacks::{CallableHandle, HandleId};
pub use config::BridgeConfig;
pub use context::{Bridge, BridgeBuilder};
pub use documents::{DocumentModel, DocumentRenderer, JsonRenderer};
pub use dom::{Document, DomEvent, MemoryDocument, NodeId};
pub use error::{BridgeError, BridgeResult, Diagnostic, Stage};
pub use executor::UnitScope;
pub use extensions::ExtensionRegistry;
pub use fetch::{
    directory_url, resolve_url, FetchError, HttpClient, HttpRequest, HttpResponse,
    LocalFileClient, MemoryHttpClient, ReqwestClient,
};
pub use host::{ScriptHost, ScriptUnit, UnitOutcome, UnitSource};
pub use output::{BufferSink, ElementSink, NullSink, OutputSink, StdoutSink};
pub use sockets::{SocketChannel, SocketConnector, SocketError, SocketEvent, TcpLineConnector};

pub use luascript_crypto::KdfParams;
pub use luascript_storage::{KeyValueStore, MemoryStore, SqliteStore};

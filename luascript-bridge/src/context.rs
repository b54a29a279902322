//! The interpreter state and the [`Bridge`] handle that owns it.
//!
//! All registries live in one [`InterpreterState`] behind an `Rc`. Lua
//! functions, DOM listeners and spawned tasks only hold `Weak` references, so
//! dropping the bridge tears everything down: pending tasks find the state
//! gone and stop.

use crate::assets::AssetStore;
use crate::callbacks::{CallableHandle, Callback, CallbackRegistry};
use crate::capabilities::{self, ConnectionSlot, TimerSlot};
use crate::config::BridgeConfig;
use crate::documents::{DocumentRenderer, DocumentSessions, JsonRenderer};
use crate::dom::{Document, MemoryDocument};
use crate::error::{BridgeResult, Diagnostic, Stage};
use crate::executor::{describe, Executor, UnitScope};
use crate::extensions::ExtensionRegistry;
use crate::fetch::{HttpClient, LocalFileClient, ReqwestClient};
use crate::marshal::HostValue;
use crate::preload::Preloader;
use crate::router::EventRouter;
use crate::sockets::{SocketConnector, TcpLineConnector};
use luascript_crypto::KdfParams;
use luascript_storage::{KeyValueStore, MemoryStore, SqliteStore};
use mlua::{IntoLua, Lua, MultiValue};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// External collaborators the capabilities talk to.
pub(crate) struct Services {
    pub document: Rc<dyn Document>,
    pub http: Rc<dyn HttpClient>,
    pub storage: Rc<dyn KeyValueStore>,
    pub sockets: Rc<dyn SocketConnector>,
    pub extensions: ExtensionRegistry,
    pub kdf: KdfParams,
}

/// Counts timers, sockets, requests and crypto jobs still in flight.
#[derive(Default)]
pub(crate) struct PendingOps {
    count: Cell<usize>,
    idle: Notify,
}

impl PendingOps {
    pub fn begin(&self) {
        self.count.set(self.count.get() + 1);
    }

    pub fn end(&self) {
        let remaining = self.count.get().saturating_sub(1);
        self.count.set(remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }
}

pub(crate) struct InterpreterState {
    pub lua: Lua,
    pub executor: Executor,
    pub callbacks: CallbackRegistry,
    pub router: EventRouter,
    pub preloader: Preloader,
    pub timers: RefCell<HashMap<u64, TimerSlot>>,
    pub connections: RefCell<HashMap<u64, ConnectionSlot>>,
    pub assets: AssetStore,
    pub documents: DocumentSessions,
    pub services: Services,
    pub pending: PendingOps,
    pub config: BridgeConfig,
    next_id: Cell<u64>,
}

impl InterpreterState {
    /// Next timer/connection id. Starts at 1; 0 means "failed".
    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Invokes a callback through the executor under its owner's scope.
    /// Failures are reported to the owner and go no further.
    pub fn invoke(&self, callback: &Callback, args: Vec<HostValue>) {
        let function = match self.callbacks.resolve(&self.lua, &callback.handle) {
            Ok(Some(function)) => function,
            Ok(None) => {
                let _guard = self.executor.enter(callback.owner.clone());
                self.executor
                    .debug_line(&format!("callback not found: {}", callback.handle));
                return;
            }
            Err(e) => {
                let _guard = self.executor.enter(callback.owner.clone());
                self.executor
                    .report(&Diagnostic::new(Stage::Callback, describe(&e)));
                return;
            }
        };

        let values = match args
            .into_iter()
            .map(|arg| arg.into_lua(&self.lua))
            .collect::<mlua::Result<Vec<_>>>()
        {
            Ok(values) => values,
            Err(e) => {
                let _guard = self.executor.enter(callback.owner.clone());
                self.executor
                    .report(&Diagnostic::new(Stage::Callback, describe(&e)));
                return;
            }
        };

        let _ = self
            .executor
            .call(&function, MultiValue::from_vec(values), callback.owner.clone());
    }

    /// Invokes a one-shot callback and drops the count it held.
    pub fn invoke_once(&self, callback: &Callback, args: Vec<HostValue>) {
        self.invoke(callback, args);
        self.callbacks.release(&callback.handle);
    }

    /// Callback owned by whichever unit is currently running.
    pub fn callback(&self, handle: CallableHandle) -> Callback {
        Callback {
            handle,
            owner: self.executor.current(),
        }
    }
}

impl Drop for InterpreterState {
    fn drop(&mut self) {
        for (_, slot) in self.timers.get_mut().drain() {
            slot.abort();
        }
        for (_, slot) in self.connections.get_mut().drain() {
            slot.abort();
        }
    }
}

/// Owner of one interpreter and everything registered against it.
pub struct Bridge {
    state: Rc<InterpreterState>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Runs `source` as a top-level chunk of the unit described by `scope`.
    pub fn run_source(
        &self,
        source: &str,
        chunk_name: &str,
        scope: UnitScope,
    ) -> Result<(), Diagnostic> {
        self.state
            .executor
            .run_source(&self.state.lua, source, chunk_name, scope)
    }

    /// Registers an inline module available through `require(name)`.
    pub fn register_module(&self, name: &str, source: &str) -> BridgeResult<()> {
        self.state
            .preloader
            .register(&self.state.lua, name, source, "inline")?;
        Ok(())
    }

    /// Applies a module configuration document: fetches it relative to the
    /// page URL and registers each listed module. Already-applied URLs are
    /// skipped without fetching. Debug lines go to the scope current at the
    /// time of the call.
    pub async fn apply_config(&self, config_url: &str) -> BridgeResult<usize> {
        let scope = self.state.executor.current();
        self.apply_config_in(config_url, &scope).await
    }

    pub(crate) async fn apply_config_in(
        &self,
        config_url: &str,
        scope: &UnitScope,
    ) -> BridgeResult<usize> {
        let state = &self.state;
        state
            .preloader
            .apply_config(
                &state.lua,
                state.services.http.as_ref(),
                &state.executor,
                scope,
                state.config.runtime.page_url.as_deref(),
                config_url,
            )
            .await
    }

    /// Resolves once no timers, sockets, requests or crypto jobs are pending.
    /// Intervals and open sockets keep the bridge busy until cleared/closed.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.state.pending.idle.notified();
            if self.state.pending.count() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Registered modules and where their source came from.
    pub fn modules(&self) -> Vec<(String, String)> {
        self.state.preloader.modules()
    }

    pub fn pending(&self) -> usize {
        self.state.pending.count()
    }

    pub fn lua(&self) -> &Lua {
        &self.state.lua
    }

    pub fn document(&self) -> Rc<dyn Document> {
        Rc::clone(&self.state.services.document)
    }

    pub fn http(&self) -> Rc<dyn HttpClient> {
        Rc::clone(&self.state.services.http)
    }

    pub fn extensions(&self) -> ExtensionRegistry {
        self.state.services.extensions.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    /// Diagnostics default for units that do not choose.
    pub fn default_debug(&self) -> bool {
        self.state.config.runtime.debug
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.state.executor
    }

    /// Script functions currently retained by the host.
    pub fn live_callbacks(&self) -> usize {
        self.state.callbacks.live_count()
    }

    pub fn live_assets(&self) -> usize {
        self.state.assets.len()
    }

    pub fn live_documents(&self) -> usize {
        self.state.documents.live_count()
    }

    pub fn is_event_bound(&self, event_type: &str) -> bool {
        self.state.router.is_bound(event_type)
    }
}

/// Configures and boots a [`Bridge`].
#[derive(Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    document: Option<Rc<dyn Document>>,
    http: Option<Rc<dyn HttpClient>>,
    storage: Option<Rc<dyn KeyValueStore>>,
    sockets: Option<Rc<dyn SocketConnector>>,
    renderer: Option<Rc<dyn DocumentRenderer>>,
    extensions: ExtensionRegistry,
    kdf: Option<KdfParams>,
}

impl BridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn document(mut self, document: Rc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn http(mut self, http: Rc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn storage(mut self, storage: Rc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn sockets(mut self, sockets: Rc<dyn SocketConnector>) -> Self {
        self.sockets = Some(sockets);
        self
    }

    pub fn renderer(mut self, renderer: Rc<dyn DocumentRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf = Some(params);
        self
    }

    /// Creates the interpreter and installs the capability table.
    pub fn build(self) -> BridgeResult<Bridge> {
        let config = self.config;

        let http: Rc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => {
                let network =
                    ReqwestClient::new(config.network.timeout(), &config.network.user_agent)?;
                Rc::new(LocalFileClient::new(Rc::new(network)))
            }
        };
        let storage: Rc<dyn KeyValueStore> = match (self.storage, &config.storage.path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Rc::new(SqliteStore::open(path, &config.storage.namespace)?),
            (None, None) => Rc::new(MemoryStore::new()),
        };
        let assets = match &config.assets.dir {
            Some(dir) => AssetStore::in_dir(dir)?,
            None => AssetStore::temporary()?,
        };
        let renderer = self.renderer.unwrap_or_else(|| Rc::new(JsonRenderer));
        let documents = DocumentSessions::new(renderer, config.documents.output_dir());

        let services = Services {
            document: self
                .document
                .unwrap_or_else(|| Rc::new(MemoryDocument::new())),
            http,
            storage,
            sockets: self.sockets.unwrap_or_else(|| Rc::new(TcpLineConnector)),
            extensions: self.extensions,
            kdf: self.kdf.unwrap_or_default(),
        };

        let state = Rc::new(InterpreterState {
            lua: Lua::new(),
            executor: Executor::new(UnitScope::detached(config.runtime.debug)),
            callbacks: CallbackRegistry::new(),
            router: EventRouter::new(),
            preloader: Preloader::new(),
            timers: RefCell::new(HashMap::new()),
            connections: RefCell::new(HashMap::new()),
            assets,
            documents,
            services,
            pending: PendingOps::default(),
            config,
            next_id: Cell::new(0),
        });
        capabilities::install(&state)?;

        info!(debug = state.config.runtime.debug, "bridge ready");
        debug!(page_url = ?state.config.runtime.page_url, "bridge page URL");
        Ok(Bridge { state })
    }
}

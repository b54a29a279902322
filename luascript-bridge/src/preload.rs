//! Lazily-initialized modules registered in `package.preload`.

use crate::error::{BridgeError, BridgeResult};
use crate::executor::{Executor, UnitScope};
use crate::fetch::{resolve_url, HttpClient};
use mlua::{Lua, MultiValue, Table, Value};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// `{ "modules": { "<name>": "<path>" } }`
#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    modules: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct Preloader {
    loaded_configs: RefCell<HashSet<String>>,
    /// Module name -> where its source came from.
    modules: RefCell<BTreeMap<String, String>>,
}

impl Preloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `source` as `package.preload[name]`.
    ///
    /// The source is compiled and run on the first `require(name)`; the
    /// loader returns the chunk's first result, or `true` when it returns
    /// nothing. `require` caches that value, so the chunk runs once.
    pub fn register(&self, lua: &Lua, name: &str, source: &str, origin: &str) -> mlua::Result<()> {
        let source = source.to_string();
        let chunk_name = format!("={name}");
        let loader = lua.create_function(move |lua, _: MultiValue| {
            let chunk = lua
                .load(source.as_str())
                .set_name(chunk_name.as_str())
                .into_function()?;
            let results = chunk.call::<MultiValue>(())?;
            Ok(match results.into_iter().next() {
                Some(value) if !value.is_nil() => value,
                _ => Value::Boolean(true),
            })
        })?;

        let package: Table = lua.globals().get("package")?;
        let preload: Table = package.get("preload")?;
        preload.set(name, loader)?;
        self.modules
            .borrow_mut()
            .insert(name.to_string(), origin.to_string());
        debug!(module = name, origin, "registered module");
        Ok(())
    }

    pub fn is_config_loaded(&self, absolute_url: &str) -> bool {
        self.loaded_configs.borrow().contains(absolute_url)
    }

    /// Registered module names and their origins.
    pub fn modules(&self) -> Vec<(String, String)> {
        self.modules
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Fetches the configuration document at `config_url` (relative to
    /// `page_url`) and registers every module it lists, resolving module
    /// paths against the configuration's own URL.
    ///
    /// A configuration already applied is skipped without fetching. A
    /// configuration only counts as applied once all of its modules loaded.
    /// Debug lines go to `scope`. Returns how many modules were registered.
    pub async fn apply_config(
        &self,
        lua: &Lua,
        http: &dyn HttpClient,
        executor: &Executor,
        scope: &UnitScope,
        page_url: Option<&str>,
        config_url: &str,
    ) -> BridgeResult<usize> {
        let absolute = page_url
            .and_then(|base| resolve_url(base, config_url).ok())
            .unwrap_or_else(|| config_url.to_string());
        if self.is_config_loaded(&absolute) {
            debug!(config = %absolute, "config already applied");
            return Ok(0);
        }

        let text = http.fetch_text(&absolute).await?;
        let document: ConfigDocument = serde_json::from_str(&text)
            .map_err(|e| BridgeError::Config(format!("{absolute}: {e}")))?;

        let mut registered = 0;
        for (name, path) in &document.modules {
            let module_url = resolve_url(&absolute, path).unwrap_or_else(|_| path.clone());
            let source = http.fetch_text(&module_url).await?;
            self.register(lua, name, &source, &module_url)?;
            // Never held across an await.
            let _guard = executor.enter(scope.clone());
            executor.debug_line(&format!("config module loaded: {name} <- {module_url}"));
            registered += 1;
        }

        self.loaded_configs.borrow_mut().insert(absolute.clone());
        info!(config = %absolute, modules = registered, "applied module config");
        Ok(registered)
    }
}

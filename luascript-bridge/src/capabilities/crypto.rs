//! `random_bytes`, `digest` and `derive_key`.
//!
//! Digests and key derivation run on the blocking pool and report back as
//! `handler(err, hex)`, where exactly one of the two is empty.

use super::{register, Args};
use crate::callbacks::Callback;
use crate::context::InterpreterState;
use crate::marshal::HostValue;
use luascript_crypto::{derive_key, digest_hex, random_hex, DigestAlgorithm};
use mlua::{MultiValue, Table};
use std::rc::Rc;
use tracing::debug;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // random_bytes(n) -> hex, n clamped to [1, 4096]
    register(state, bridge, "random_bytes", |_, _, values: MultiValue| {
        let args = Args::new(values);
        let requested = args.number(0).filter(|n| n.is_finite()).unwrap_or(0.0);
        Ok(random_hex(requested as i64))
    })?;

    // digest(alg, data, handler)
    register(state, bridge, "digest", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let algorithm = args.string(lua, 0)?;
        let data = args.bytes(lua, 1)?;
        let callback = args.callback(state, lua, 2)?;
        spawn_job(state, callback, move || {
            let algorithm: DigestAlgorithm = algorithm.parse().map_err(|e| format!("{e}"))?;
            Ok(digest_hex(algorithm, &data))
        });
        Ok(())
    })?;

    // derive_key(password, salt, handler)
    register(state, bridge, "derive_key", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let password = args.bytes(lua, 0)?;
        let salt = args.bytes(lua, 1)?;
        let callback = args.callback(state, lua, 2)?;
        let params = state.services.kdf.clone();
        spawn_job(state, callback, move || {
            derive_key(&password, &salt, &params)
                .map(|key| key.to_hex())
                .map_err(|e| e.to_string())
        });
        Ok(())
    })
}

fn spawn_job<F>(state: &Rc<InterpreterState>, callback: Callback, job: F)
where
    F: FnOnce() -> Result<String, String> + Send + 'static,
{
    let weak = Rc::downgrade(state);
    state.pending.begin();

    tokio::task::spawn_local(async move {
        let outcome = match tokio::task::spawn_blocking(job).await {
            Ok(outcome) => outcome,
            Err(e) => Err(format!("crypto job failed: {e}")),
        };
        let Some(state) = weak.upgrade() else {
            return;
        };
        debug!(ok = outcome.is_ok(), "crypto job finished");

        let (err, hex) = match outcome {
            Ok(hex) => (String::new(), hex),
            Err(e) => (e, String::new()),
        };
        state.invoke_once(&callback, vec![HostValue::from(err), HostValue::from(hex)]);
        state.pending.end();
    });
}

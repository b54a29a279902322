use super::{register, Args};
use crate::context::InterpreterState;
use crate::fetch::{FetchError, HttpRequest};
use crate::marshal::HostValue;
use mlua::{MultiValue, Table};
use std::rc::Rc;
use tracing::debug;

pub(super) fn install(state: &Rc<InterpreterState>, bridge: &Table) -> mlua::Result<()> {
    // load_asset(url, handler)
    //   -> handler(true, ref, size, contentType) | handler(false, err, 0, "")
    register(state, bridge, "load_asset", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        let url = args.string(lua, 0)?;
        let callback = args.callback(state, lua, 1)?;

        let weak = Rc::downgrade(state);
        let http = Rc::clone(&state.services.http);
        state.pending.begin();
        tokio::task::spawn_local(async move {
            let fetched = match http.execute(HttpRequest::get(url.as_str())).await {
                Ok(response) if response.is_success() => Ok(response),
                Ok(response) => Err(FetchError::Status {
                    url: url.clone(),
                    status: response.status,
                }
                .to_string()),
                Err(e) => Err(e.to_string()),
            };
            let Some(state) = weak.upgrade() else {
                return;
            };

            let stored = fetched.and_then(|response| {
                let content_type = response.content_type();
                state
                    .assets
                    .store(&response.body, &content_type)
                    .map(|reference| (reference, response.body.len(), content_type))
                    .map_err(|e| e.to_string())
            });
            let args = match stored {
                Ok((reference, size, content_type)) => {
                    debug!(url = %url, reference = %reference, size, "asset loaded");
                    vec![
                        HostValue::from(true),
                        HostValue::from(reference),
                        HostValue::from(size),
                        HostValue::from(content_type),
                    ]
                }
                Err(e) => vec![
                    HostValue::from(false),
                    HostValue::from(e),
                    HostValue::from(0i64),
                    HostValue::from(""),
                ],
            };
            state.invoke_once(&callback, args);
            state.pending.end();
        });
        Ok(())
    })?;

    // revoke_asset(ref) -> whether it was live
    register(state, bridge, "revoke_asset", |state, lua, values: MultiValue| {
        let args = Args::new(values);
        Ok(state.assets.revoke(&args.string(lua, 0)?))
    })
}

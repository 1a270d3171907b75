use scytheproto::{object, Object, Response, Value};

use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::{self, Session, PLUGIN_CATALOG};

/// The catalog, or one track's FX chain when `track_index` is given.
pub fn list_plugins(session: &mut Session, params: &Object) -> HandlerResult {
    if params::index_opt(params, "track_index")?.is_some() {
        let index = params::track_index(session, params)?;
        let fx: Vec<Value> = session
            .track(index)
            .map(|t| t.fx.iter().map(|name| Value::from(name.as_str())).collect())
            .unwrap_or_default();
        return Ok(Response::ok_with(object! { "track_index" => index, "fx" => fx }));
    }

    let plugins: Vec<Value> = PLUGIN_CATALOG
        .iter()
        .map(|(name, kind)| {
            Value::Object(object! {
                "name" => *name,
                "type" => *kind,
                "display_name" => session::plugin_display_name(name, kind),
            })
        })
        .collect();
    Ok(Response::ok_with(object! { "plugins" => plugins }))
}

pub fn load_plugin(session: &mut Session, params: &Object) -> HandlerResult {
    let index = params::track_index(session, params)?;
    let query = params::str_req(params, "plugin_name")?;
    let (name, kind) = session::find_plugin(query)
        .ok_or_else(|| HandlerError::invalid(format!("Plugin not found: {}", query)))?;

    let display = session::plugin_display_name(name, kind);
    let fx_index = session
        .add_fx(index, &display)
        .ok_or_else(|| HandlerError::invalid("Track not found"))?;

    Ok(Response::ok_with(object! { "fx_index" => fx_index, "plugin" => display.as_str() })
        .with_message(format!("Loaded {} on track {}", name, index)))
}

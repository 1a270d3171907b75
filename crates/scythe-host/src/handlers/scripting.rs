use anyhow::Context;
use scytheproto::{Object, Response};
use std::path::Path;
use tracing::debug;

use crate::lua::{self, ScriptError, ScriptOutput};
use crate::params;
use crate::registry::{HandlerError, HandlerResult};
use crate::session::Session;

fn respond(outcome: Result<ScriptOutput, ScriptError>) -> Response {
    match outcome {
        Ok(out) => {
            let mut response = Response::ok();
            if let Some(value) = out.value {
                response = response.with_result(value);
            }
            if !out.console.is_empty() {
                response = response.with_message(out.console);
            }
            response
        }
        Err(e) => {
            debug!(error = %e, "script failed");
            let console = e.console().to_string();
            let response = Response::fail(e.to_string());
            if console.is_empty() {
                response
            } else {
                response.with_message(console)
            }
        }
    }
}

pub fn execute_lua(session: &mut Session, params: &Object) -> HandlerResult {
    let code = params::str_req(params, "code")?;
    let script_params = match params.get("params") {
        Some(v) if !v.is_null() => {
            Some(v.as_object().ok_or_else(|| HandlerError::invalid("Invalid parameter: params"))?)
        }
        _ => None,
    };
    Ok(respond(lua::run_script(session, code, "execute_lua", script_params)))
}

pub fn execute_lua_file(session: &mut Session, params: &Object) -> HandlerResult {
    let path = params::str_req(params, "path")?;
    if !Path::new(path).is_file() {
        return Err(HandlerError::invalid(format!("File not found: {}", path)));
    }
    let code = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let chunk = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(respond(lua::run_script(session, &code, &chunk, None)))
}

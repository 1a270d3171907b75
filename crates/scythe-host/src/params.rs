//! Typed access to a request's parameter map.
//!
//! Absent or `null` keys are "missing"; present keys of the wrong shape are
//! "invalid". Both become ordinary failure Responses.

use scytheproto::{Object, Value};

use crate::registry::HandlerError;
use crate::session::Session;

fn missing(key: &str) -> HandlerError {
    HandlerError::invalid(format!("Missing parameter: {}", key))
}

fn invalid(key: &str) -> HandlerError {
    HandlerError::invalid(format!("Invalid parameter: {}", key))
}

fn present<'a>(params: &'a Object, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

pub fn f64_opt(params: &Object, key: &str) -> Result<Option<f64>, HandlerError> {
    match present(params, key) {
        None => Ok(None),
        Some(v) => v.as_f64().filter(|n| n.is_finite()).map(Some).ok_or_else(|| invalid(key)),
    }
}

pub fn f64_req(params: &Object, key: &str) -> Result<f64, HandlerError> {
    f64_opt(params, key)?.ok_or_else(|| missing(key))
}

pub fn i64_opt(params: &Object, key: &str) -> Result<Option<i64>, HandlerError> {
    match present(params, key) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| invalid(key)),
    }
}

pub fn i64_req(params: &Object, key: &str) -> Result<i64, HandlerError> {
    i64_opt(params, key)?.ok_or_else(|| missing(key))
}

/// A non-negative integer index.
pub fn index_opt(params: &Object, key: &str) -> Result<Option<usize>, HandlerError> {
    match i64_opt(params, key)? {
        None => Ok(None),
        Some(n) => usize::try_from(n).map(Some).map_err(|_| invalid(key)),
    }
}

pub fn index_req(params: &Object, key: &str) -> Result<usize, HandlerError> {
    index_opt(params, key)?.ok_or_else(|| missing(key))
}

pub fn str_opt<'a>(params: &'a Object, key: &str) -> Result<Option<&'a str>, HandlerError> {
    match present(params, key) {
        None => Ok(None),
        Some(v) => v.as_str().map(Some).ok_or_else(|| invalid(key)),
    }
}

pub fn str_req<'a>(params: &'a Object, key: &str) -> Result<&'a str, HandlerError> {
    str_opt(params, key)?.ok_or_else(|| missing(key))
}

/// Booleans also accept 0/1, which is what scripts tend to send.
pub fn bool_or(params: &Object, key: &str, default: bool) -> Result<bool, HandlerError> {
    match present(params, key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(v) => match v.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(invalid(key)),
        },
    }
}

pub fn array_req<'a>(params: &'a Object, key: &str) -> Result<&'a [Value], HandlerError> {
    match present(params, key) {
        None => Err(missing(key)),
        Some(v) => v.as_array().ok_or_else(|| invalid(key)),
    }
}

/// `track_index`, checked against the session.
pub fn track_index(session: &Session, params: &Object) -> Result<usize, HandlerError> {
    let index = index_req(params, "track_index")?;
    if session.track(index).is_none() {
        return Err(HandlerError::invalid("Track not found"));
    }
    Ok(index)
}

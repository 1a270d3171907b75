//! Command name to handler mapping, populated once at startup.

use scytheproto::{Object, Response};
use std::collections::HashMap;
use tracing::warn;

use crate::session::Session;

/// Why a handler did not produce a Response.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Expected validation problem; reported verbatim to the caller.
    #[error("{0}")]
    Invalid(String),

    /// Anything unexpected. The Dispatcher logs it and reports the chain.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        HandlerError::Invalid(message.into())
    }
}

pub type HandlerResult = Result<Response, HandlerError>;

/// A command body. Plain functions and closures implement this.
pub trait Handler {
    fn call(&self, session: &mut Session, params: &Object) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut Session, &Object) -> HandlerResult,
{
    fn call(&self, session: &mut Session, params: &Object) -> HandlerResult {
        self(session, params)
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`. A second registration replaces the first.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler + 'static) {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            warn!(command = %name, "handler replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

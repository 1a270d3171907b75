//! Resolve decoded requests to handlers and turn every outcome into a Response.
//!
//! Nothing a handler does escapes this module: validation failures, errors
//! and panics all come back as failure Responses, and each call is wrapped in
//! one undo block on the session.

use scytheproto::{DecodeMode, Request, Response};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, instrument, warn};

use crate::registry::{CommandRegistry, HandlerError};
use crate::session::Session;

/// Owns the registry and the session the handlers act on.
#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
    session: Session,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self::with_session(registry, Session::new())
    }

    pub fn with_session(registry: CommandRegistry, session: Session) -> Self {
        Self { registry, session }
    }

    /// Dispatcher with the full built-in command catalog.
    pub fn with_builtin_commands() -> Self {
        let mut registry = CommandRegistry::new();
        crate::handlers::register_all(&mut registry);
        Self::new(registry)
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Execute one request.
    #[instrument(skip(self, request), fields(command = %request.command))]
    pub fn dispatch(&mut self, request: &Request) -> Response {
        let Some(handler) = self.registry.get(&request.command) else {
            warn!("unknown command");
            return Response::fail(format!("Unknown command: {}", request.command));
        };

        self.session.begin_undo_block();
        let session = &mut self.session;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.call(session, &request.params)
        }));

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(HandlerError::Invalid(message))) => {
                debug!(%message, "rejected");
                Response::fail(message)
            }
            Ok(Err(HandlerError::Failed(e))) => {
                warn!(error = %format!("{:#}", e), "handler failed");
                Response::fail(format!("{:#}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "handler panicked");
                Response::fail(format!("Internal error in {}: {}", request.command, message))
            }
        };

        let label = if response.is_success() {
            request.command.clone()
        } else {
            format!("{} (failed)", request.command)
        };
        self.session.end_undo_block(&label);

        debug!(success = response.is_success(), "dispatched");
        response
    }

    /// Decode and execute one wire message. Undecodable input becomes a
    /// failure Response instead of an error.
    pub fn dispatch_bytes(&mut self, input: &[u8], mode: DecodeMode) -> Response {
        match Request::decode(input, mode) {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                warn!(error = %e, "malformed request");
                Response::fail(format!("Malformed request: {}", e))
            }
        }
    }

    /// One framed line from the socket. The host accepts lenient input.
    pub fn dispatch_line(&mut self, line: &str) -> Response {
        self.dispatch_bytes(line.as_bytes(), DecodeMode::Lenient)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

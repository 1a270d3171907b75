//! Transport-neutral request/response seam.

use async_trait::async_trait;
use scytheproto::{Request, Response};
use std::fmt;

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Socket,
    File,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Socket => write!(f, "socket"),
            TransportKind::File => write!(f, "file"),
        }
    }
}

/// One way of delivering a Request to the host and getting its Response.
///
/// Implementations must tolerate concurrent callers. Neither transport can
/// cancel a command once the host has it; a timeout only stops the wait.
#[async_trait]
pub trait Bridge: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, BridgeError>;

    fn kind(&self) -> TransportKind;
}

#[async_trait]
impl<B: Bridge + ?Sized> Bridge for &B {
    async fn send(&self, request: Request) -> Result<Response, BridgeError> {
        (**self).send(request).await
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }
}

#[async_trait]
impl<B: Bridge + ?Sized> Bridge for std::sync::Arc<B> {
    async fn send(&self, request: Request) -> Result<Response, BridgeError> {
        (**self).send(request).await
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }
}

#[async_trait]
impl<B: Bridge + ?Sized> Bridge for Box<B> {
    async fn send(&self, request: Request) -> Result<Response, BridgeError> {
        (**self).send(request).await
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }
}

//! Host side of the Scythe bridge.
//!
//! The host embeds a command [`Dispatcher`](dispatch::Dispatcher) behind two
//! transports that share it on one thread:
//!
//! - [`link::SocketLink`] dials the controller and exchanges newline-framed
//!   messages, reconnecting through [`connection::ConnectionManager`].
//! - [`poller::FilePoller`] watches a command file and writes a response file,
//!   deduplicating by timestamp.
//!
//! Both run as `spawn_local` tasks on a current-thread runtime, so a handler
//! never runs concurrently with another handler.

pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod link;
pub mod lua;
pub mod params;
pub mod poller;
pub mod registry;
pub mod session;
pub mod telemetry;

pub use connection::{ConnectionManager, ConnectionState};
pub use dispatch::Dispatcher;
pub use link::SocketLink;
pub use poller::{FilePoller, PollError, PollOutcome};
pub use registry::{CommandRegistry, Handler, HandlerError, HandlerResult};
pub use session::Session;

//! scythe - controller side of the Scythe host bridge
//!
//! This library provides:
//! - `bridge`: the [`Bridge`] trait both transports implement
//! - `socket`: [`SocketBridge`], a listener the host connects to
//! - `file`: [`FileBridge`], command/response files for sandboxed hosts
//! - `client`: [`BridgeClient`], typed calls for the host's command catalog
//!
//! ```ignore
//! let bridge = SocketBridge::bind(&config.socket).await?;
//! bridge.wait_for_host(Duration::from_secs(10)).await?;
//! let client = BridgeClient::new(bridge);
//! client.set_tempo(128.0).await?;
//! ```

pub mod bridge;
pub mod client;
pub mod error;
pub mod file;
pub mod socket;

pub use bridge::{Bridge, TransportKind};
pub use client::{BridgeClient, NoteSpec, ScriptOutput};
pub use error::BridgeError;
pub use file::FileBridge;
pub use socket::SocketBridge;

//! Remote agents reached over a persistent WebSocket.
//!
//! The control plane side is [`BridgeRegistry`]: one [`BridgeConnection`] per
//! agent name, with correlated request/response on top. The agent side lives
//! in [`agent`].

pub mod agent;
pub mod backoff;
pub mod connection;
pub mod protocol;
pub mod registry;

pub use connection::{BridgeConnection, BridgeError, Inbound};
pub use registry::{AgentInfo, BridgeEvent, BridgeRegistry};

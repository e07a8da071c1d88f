//! Server Module
//!
//! The transport-independent session protocol handler and the TCP
//! transport that feeds it.

pub mod connection;
pub mod handler;
pub mod tcp;

pub use connection::{ChannelConnection, ClientConnection};
pub use handler::{ConnectionState, SessionServer};
pub use tcp::GameServer;

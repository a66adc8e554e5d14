//! Client side of the LRDB line-delimited JSON debug protocol.
//!
//! A debuggable Lua VM listens on a TCP port and speaks one JSON object per
//! line: requests carry `{method, param, id}`, responses echo the id with a
//! `result`, and everything else is an unsolicited notification. This crate
//! provides the transport ([`Client`]), the protocol-version-aware value
//! codec ([`value`]) and the multi-port instance discovery scanner
//! ([`scan_range`]).

mod discovery;
mod error;
mod message;
mod transport;
pub mod value;

pub use discovery::{scan_range, Instance, InstanceState, DEFAULT_SCAN_PORTS};
pub use error::ClientError;
pub use message::{
    ConnectedParams, Message, Notification, ProductInfo, Request, VmInfo, CONNECTED_METHOD,
    HANDSHAKE_METHOD,
};
pub use transport::{Client, ClientEvent, Pending};
pub use value::ProtocolVersion;

//! Astral Client Engine
//!
//! Maintains a live mirror of a remote driver's devices, properties and
//! items, and lets the application request changes to them.
//!
//! The engine owns a single read loop per connection; that loop is the
//! only place the registry is mutated, and application callbacks receive
//! snapshots rather than live references. Outbound writes are serialized
//! behind one writer so no two messages interleave on the wire.
//!
//! Connection loss is fatal to the session: the registry is released,
//! [`ClientHandler::connection_lost`] fires once, and any reconnect
//! policy is the caller's responsibility.

pub mod client;
pub mod handler;
pub mod sync;

pub use client::Client;
pub use handler::ClientHandler;
pub use sync::{Registry, SyncEvent};

//! Astral Driver Engine
//!
//! Exposes one or more owned devices to a remote peer and reacts to its
//! change requests.
//!
//! The wire is a stream of XML elements over an abstract bidirectional
//! text channel (historically the stdin/stdout of a spawned process).
//! Inbound `getProperties` requests answer with property definitions;
//! inbound `new*Vector` requests are routed to the listener a device
//! registered for that property. The engine never applies requested
//! values itself: the listener validates, mutates the model and asks for
//! an update serialization.
//!
//! All outbound messages go through one queue drained by a single
//! writer, so definitions and updates issued from listeners and from
//! background tasks never interleave on the wire.

pub mod device;
pub mod driver;
pub mod standard;

pub use astral_protocol::{ItemUpdate, ItemUpdates};
pub use device::{DriverDevice, PropertyHandle, PropertyRef};
pub use driver::{Driver, Outbound};
pub use standard::{install_connection_property, ConnectionDelegate, CONNECTION_PROPERTY};

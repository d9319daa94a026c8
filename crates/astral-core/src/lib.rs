//! Astral Core - Property Model
//!
//! This crate provides the shared data model for Astral:
//! - Items: named leaf values of a fixed kind
//! - Properties: typed, insertion-ordered vectors of items
//! - Devices: named collections of properties
//!
//! The model is pure bookkeeping. Nothing here performs I/O; sending a
//! definition or an update to the remote peer is always a separate,
//! explicit call into a protocol engine.

pub mod device;
pub mod error;
pub mod property;

pub use device::Device;
pub use error::{Error, Result};
pub use property::{
    Item, ItemValue, Permission, Property, PropertyDetails, PropertyKind, PropertyState,
    SwitchRule, SwitchState,
};

//! Application-facing notification hooks

use astral_core::{Device, Property};
use serde_json::Value;

/// Callbacks invoked from the client read loop.
///
/// All methods default to no-ops; implementors override the ones they
/// care about. Arguments are snapshots of the mirrored model taken when
/// the triggering message was applied, so they stay valid after the
/// call returns.
#[allow(unused_variables)]
pub trait ClientHandler: Send + Sync {
    /// A property was defined or updated
    fn property_changed(&self, property: &Property) {}

    /// A property was removed. Fires once per property when a whole
    /// device is deleted.
    fn property_deleted(&self, property: &Property) {}

    /// A device-level message arrived
    fn device_message(&self, device: &Device) {}

    /// A connection-wide message arrived
    fn client_message(&self, message: Option<&str>) {}

    /// A message with an unrecognized key arrived. Forward-compatibility
    /// hook; unknown keys are never an error.
    fn unhandled(&self, key: &str, payload: &Value) {}

    /// The connection closed and the registry has been released
    fn connection_lost(&self) {}
}

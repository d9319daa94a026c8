//! Model synchronization for the client engine
//!
//! [`Registry::apply`] is the single mutation path for the mirrored
//! model: it consumes one decoded message, mutates the registry, and
//! returns the notifications to fire. Keeping it free of I/O makes the
//! whole synchronization contract testable without a connection.

use astral_core::{Device, Property};
use astral_protocol::{Deletion, Message, Notice, UpdateVector};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

/// Notification produced by applying one inbound message. Payloads are
/// snapshots taken at mutation time.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    PropertyChanged(Property),
    PropertyDeleted(Property),
    DeviceMessage(Device),
    ClientMessage { message: Option<String> },
    Unhandled { key: String, payload: Value },
}

#[derive(Debug, Default)]
struct ConnectionNote {
    message: Option<String>,
    timestamp: Option<String>,
}

/// The mirrored model: one entry per remote device, plus the
/// connection-wide message/timestamp pair.
#[derive(Default)]
pub struct Registry {
    devices: DashMap<String, Device>,
    note: RwLock<ConnectionNote>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound message and return the notifications to fire
    pub fn apply(&self, message: Message) -> Vec<SyncEvent> {
        match message {
            Message::Define(prop) => self.apply_define(prop),
            Message::Update(update) => self.apply_update(update),
            Message::Notice(notice) => self.apply_notice(notice),
            Message::Delete(deletion) => self.apply_delete(deletion),
            Message::Other { key, payload } => vec![SyncEvent::Unhandled { key, payload }],
        }
    }

    /// Defines create the device on first reference and never overwrite
    /// an existing property; duplicate or late announcements are expected
    /// from slow peers.
    fn apply_define(&self, prop: Property) -> Vec<SyncEvent> {
        let mut entry = self
            .devices
            .entry(prop.device().to_string())
            .or_insert_with(|| Device::new(prop.device()));

        if entry.property(prop.name()).is_some() {
            debug!(
                device = prop.device(),
                property = prop.name(),
                "ignoring duplicate definition"
            );
            return Vec::new();
        }

        let snapshot = prop.clone();
        if let Err(e) = entry.add_property(prop) {
            debug!(error = %e, "dropping definition");
            return Vec::new();
        }
        vec![SyncEvent::PropertyChanged(snapshot)]
    }

    /// Updates for unknown devices or properties are silently dropped;
    /// the peer is expected to define before it sets.
    fn apply_update(&self, update: UpdateVector) -> Vec<SyncEvent> {
        let Some(mut device) = self.devices.get_mut(&update.device) else {
            debug!(device = %update.device, "update for unknown device dropped");
            return Vec::new();
        };
        let Some(prop) = device.property_mut(&update.name) else {
            debug!(
                device = %update.device,
                property = %update.name,
                "update for unknown property dropped"
            );
            return Vec::new();
        };
        if prop.kind() != update.kind {
            debug!(
                device = %update.device,
                property = %update.name,
                "update kind does not match property, dropped"
            );
            return Vec::new();
        }

        update.apply(prop);
        let snapshot = prop.clone();
        vec![SyncEvent::PropertyChanged(snapshot)]
    }

    fn apply_notice(&self, notice: Notice) -> Vec<SyncEvent> {
        if let Some(name) = &notice.device {
            if let Some(mut device) = self.devices.get_mut(name) {
                device.note_message(notice.timestamp.clone(), notice.message.clone());
                let snapshot = device.clone();
                return vec![SyncEvent::DeviceMessage(snapshot)];
            }
        }

        *self.note.write() = ConnectionNote {
            message: notice.message.clone(),
            timestamp: notice.timestamp,
        };
        vec![SyncEvent::ClientMessage {
            message: notice.message,
        }]
    }

    /// With a property name, removes just that property; without one,
    /// removes every property and the device record itself.
    fn apply_delete(&self, deletion: Deletion) -> Vec<SyncEvent> {
        match deletion.name {
            Some(name) => {
                let Some(mut device) = self.devices.get_mut(&deletion.device) else {
                    debug!(device = %deletion.device, "deletion for unknown device dropped");
                    return Vec::new();
                };
                match device.remove_property(&name, deletion.timestamp, deletion.message) {
                    Some(prop) => vec![SyncEvent::PropertyDeleted(prop)],
                    None => {
                        debug!(
                            device = %deletion.device,
                            property = %name,
                            "deletion for unknown property dropped"
                        );
                        Vec::new()
                    }
                }
            }
            None => {
                let Some((_, device)) = self.devices.remove(&deletion.device) else {
                    debug!(device = %deletion.device, "deletion for unknown device dropped");
                    return Vec::new();
                };
                device
                    .properties()
                    .iter()
                    .cloned()
                    .map(SyncEvent::PropertyDeleted)
                    .collect()
            }
        }
    }

    /// Snapshot of one device
    pub fn device(&self, name: &str) -> Option<Device> {
        self.devices.get(name).map(|d| d.value().clone())
    }

    /// Snapshots of all devices
    pub fn devices(&self) -> Vec<Device> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of one property
    pub fn property(&self, device: &str, name: &str) -> Option<Property> {
        self.devices.get(device).and_then(|d| d.property(name).cloned())
    }

    /// Last connection-wide message
    pub fn last_message(&self) -> Option<String> {
        self.note.read().message.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Drop every device. Called once when the session ends.
    pub fn clear(&self) {
        self.devices.clear();
        *self.note.write() = ConnectionNote::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astral_protocol::{DecodePolicy, JsonDecoder};
    use serde_json::json;

    fn apply_json(registry: &Registry, value: Value) -> Vec<SyncEvent> {
        registry.apply(Message::decode(value).unwrap())
    }

    #[test]
    fn test_define_creates_device_implicitly() {
        let registry = Registry::new();
        let events = apply_json(
            &registry,
            json!({"defTextVector": {"device": "Cam", "name": "INFO",
                   "state": "Ok", "perm": "ro",
                   "items": [{"name": "MODEL", "value": "SimCam"}]}}),
        );

        assert!(matches!(events.as_slice(), [SyncEvent::PropertyChanged(_)]));
        assert_eq!(
            registry.property("Cam", "INFO").unwrap().item_value("MODEL"),
            Some("SimCam".into())
        );
    }

    #[test]
    fn test_define_is_idempotent() {
        let registry = Registry::new();
        let first = json!({"defTextVector": {"device": "Cam", "name": "INFO",
                           "state": "Ok", "perm": "ro",
                           "items": [{"name": "MODEL", "value": "SimCam"}]}});
        apply_json(&registry, first);

        let events = apply_json(
            &registry,
            json!({"defTextVector": {"device": "Cam", "name": "INFO",
                   "state": "Alert", "perm": "rw",
                   "items": [{"name": "MODEL", "value": "Other"}]}}),
        );

        assert!(events.is_empty());
        let prop = registry.property("Cam", "INFO").unwrap();
        assert_eq!(prop.item_value("MODEL").unwrap(), "SimCam");
        assert!(prop.is_read_only());
    }

    #[test]
    fn test_update_for_unknown_device_is_noop() {
        let registry = Registry::new();
        let events = apply_json(
            &registry,
            json!({"setTextVector": {"device": "Ghost", "name": "INFO",
                   "items": [{"name": "MODEL", "value": "X"}]}}),
        );

        assert!(events.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concatenated_define_then_set_stream() {
        let registry = Registry::new();
        let mut decoder = JsonDecoder::with_policy(DecodePolicy::Strict);
        decoder
            .feed(concat!(
                r#"{"defTextVector":{"device":"Cam","name":"INFO","state":"Ok","perm":"ro","label":"Info","group":"Main","items":[{"name":"MODEL","value":"SimCam"}]}}"#,
                r#"{"setTextVector":{"device":"Cam","name":"INFO","state":"Ok","items":[{"name":"MODEL","value":"SimCam2"}]}}"#
            ).as_bytes())
            .unwrap();

        while let Some(value) = decoder.next().unwrap() {
            apply_json(&registry, value);
        }

        let prop = registry.property("Cam", "INFO").unwrap();
        assert_eq!(prop.item_value("MODEL").unwrap(), "SimCam2");
    }

    #[test]
    fn test_delete_named_property() {
        let registry = Registry::new();
        apply_json(
            &registry,
            json!({"defTextVector": {"device": "Cam", "name": "INFO",
                   "state": "Ok", "perm": "ro", "items": []}}),
        );
        apply_json(
            &registry,
            json!({"defLightVector": {"device": "Cam", "name": "STATUS",
                   "state": "Idle", "items": []}}),
        );

        let events = apply_json(
            &registry,
            json!({"deleteProperty": {"device": "Cam", "name": "INFO"}}),
        );

        assert!(matches!(events.as_slice(), [SyncEvent::PropertyDeleted(p)] if p.name() == "INFO"));
        let device = registry.device("Cam").unwrap();
        assert!(device.property("INFO").is_none());
        assert!(device.property("STATUS").is_some());
    }

    #[test]
    fn test_delete_without_name_removes_device() {
        let registry = Registry::new();
        apply_json(
            &registry,
            json!({"defTextVector": {"device": "Cam", "name": "INFO",
                   "state": "Ok", "perm": "ro", "items": []}}),
        );
        apply_json(
            &registry,
            json!({"defLightVector": {"device": "Cam", "name": "STATUS",
                   "state": "Idle", "items": []}}),
        );

        let events = apply_json(&registry, json!({"deleteProperty": {"device": "Cam"}}));

        let deleted: Vec<_> = events
            .iter()
            .map(|e| match e {
                SyncEvent::PropertyDeleted(p) => p.name().to_string(),
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(deleted, ["INFO", "STATUS"]);
        assert!(registry.device("Cam").is_none());
    }

    #[test]
    fn test_device_message_vs_client_message() {
        let registry = Registry::new();
        apply_json(
            &registry,
            json!({"defTextVector": {"device": "Cam", "name": "INFO",
                   "state": "Ok", "perm": "ro", "items": []}}),
        );

        let events = apply_json(
            &registry,
            json!({"message": {"device": "Cam", "message": "cooling", "timestamp": "t0"}}),
        );
        assert!(matches!(events.as_slice(), [SyncEvent::DeviceMessage(d)] if d.name() == "Cam"));
        assert_eq!(registry.device("Cam").unwrap().message(), Some("cooling"));

        let events = apply_json(&registry, json!({"message": {"message": "hello"}}));
        assert!(matches!(events.as_slice(), [SyncEvent::ClientMessage { .. }]));
        assert_eq!(registry.last_message(), Some("hello".into()));
    }

    #[test]
    fn test_unknown_key_becomes_unhandled_event() {
        let registry = Registry::new();
        let events = apply_json(&registry, json!({"pingProtocol": {"seq": 1}}));

        assert!(
            matches!(events.as_slice(), [SyncEvent::Unhandled { key, .. }] if key == "pingProtocol")
        );
        assert!(registry.is_empty());
    }
}

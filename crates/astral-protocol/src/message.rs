//! Typed wire messages
//!
//! Inbound objects are decoded once, at the boundary, into the closed
//! [`Message`] union; everything downstream dispatches on the variant
//! instead of inspecting key strings.

use crate::error::{ProtocolError, ProtocolResult};
use crate::xml::XmlElement;
use astral_core::{
    Item, Permission, Property, PropertyKind, PropertyState, SwitchRule, SwitchState,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Version tag sent with the client greeting
pub const PROTOCOL_VERSION: u32 = 512;

/// One decoded client-side wire object
#[derive(Debug, Clone)]
pub enum Message {
    /// `def{Kind}Vector`: announces a property; decoded straight into a
    /// model property bound to its device name
    Define(Property),

    /// `set{Kind}Vector`: new state/values for an existing property
    Update(UpdateVector),

    /// `message`: a device-level or connection-wide notification
    Notice(Notice),

    /// `deleteProperty`: removes one property, or the whole device when
    /// no property name is given
    Delete(Deletion),

    /// Anything else; forwarded to the application for forward
    /// compatibility, never an error
    Other { key: String, payload: Value },
}

/// Payload of a `set{Kind}Vector` message
#[derive(Debug, Clone)]
pub struct UpdateVector {
    pub device: String,
    pub name: String,
    pub kind: PropertyKind,
    pub state: Option<PropertyState>,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub items: Vec<UpdateItem>,
}

/// One item entry of an update vector
#[derive(Debug, Clone)]
pub struct UpdateItem {
    pub name: String,
    pub value: Option<Value>,
    pub size: Option<usize>,
    pub format: Option<String>,
    pub url: Option<String>,
    pub target: Option<String>,
}

/// Payload of a `message` message
#[derive(Debug, Clone)]
pub struct Notice {
    pub device: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
}

/// Payload of a `deleteProperty` message
#[derive(Debug, Clone)]
pub struct Deletion {
    pub device: String,
    pub name: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
}

impl Message {
    /// Decode one wire object. Unrecognized keys become [`Message::Other`];
    /// structurally unusable payloads are errors the caller drops.
    pub fn decode(value: Value) -> ProtocolResult<Message> {
        let Value::Object(obj) = value else {
            return Err(ProtocolError::InvalidJson(
                "top-level value is not an object".into(),
            ));
        };
        let Some((key, body)) = obj.into_iter().next() else {
            return Err(ProtocolError::InvalidJson("empty message object".into()));
        };

        if let Some(kind) = vector_kind(&key, "def") {
            return Ok(Message::Define(decode_definition(kind, &body)?));
        }
        if let Some(kind) = vector_kind(&key, "set") {
            return Ok(Message::Update(decode_update(kind, &body)?));
        }

        match key.as_str() {
            "message" => Ok(Message::Notice(Notice {
                device: str_field(&body, "device"),
                message: str_field(&body, "message"),
                timestamp: str_field(&body, "timestamp"),
            })),
            "deleteProperty" => Ok(Message::Delete(Deletion {
                device: str_field(&body, "device")
                    .ok_or(ProtocolError::MissingField("device"))?,
                name: str_field(&body, "name"),
                message: str_field(&body, "message"),
                timestamp: str_field(&body, "timestamp"),
            })),
            _ => Ok(Message::Other { key, payload: body }),
        }
    }
}

impl UpdateVector {
    /// Merge this update into a property: state, timestamp, message and
    /// timeout at the vector level, then each named item's value plus the
    /// kind-conditional extras (size/format/url for BLOB, target for
    /// Number). Unknown item names are ignored.
    pub fn apply(&self, prop: &mut Property) {
        if let Some(state) = self.state {
            prop.set_state(state);
        }
        prop.set_timestamp(self.timestamp.clone());
        prop.set_message(self.message.clone());
        if let Some(timeout) = self.timeout {
            prop.set_timeout(timeout);
        }

        for update in &self.items {
            let Some(item) = prop.item_mut(&update.name) else {
                continue;
            };
            if let Some(value) = &update.value {
                if let Some(text) = scalar_text(value) {
                    if let Err(e) = item.set_value(&text) {
                        debug!(item = %update.name, error = %e, "ignoring unparsable item value");
                    }
                }
            }
            match item.kind() {
                PropertyKind::Blob => {
                    let _ = item.set_blob_meta(
                        update.size,
                        update.format.as_deref(),
                        update.url.as_deref(),
                    );
                }
                PropertyKind::Number => {
                    let _ = item.set_target(update.target.clone());
                }
                _ => {}
            }
        }
    }
}

/// `"def" | "set" | "new"` + kind + `"Vector"` key parsing
fn vector_kind(key: &str, prefix: &str) -> Option<PropertyKind> {
    key.strip_prefix(prefix)?
        .strip_suffix("Vector")?
        .parse()
        .ok()
}

/// Kind encoded in a `new{Kind}Vector` element tag
pub fn kind_of_new_tag(tag: &str) -> Option<PropertyKind> {
    vector_kind(tag, "new")
}

fn decode_definition(kind: PropertyKind, body: &Value) -> ProtocolResult<Property> {
    let device = str_field(body, "device").ok_or(ProtocolError::MissingField("device"))?;
    let name = str_field(body, "name").ok_or(ProtocolError::MissingField("name"))?;

    let state = parse_field(body, "state").unwrap_or(PropertyState::Idle);
    let perm = parse_field(body, "perm").unwrap_or(Permission::ReadWrite);
    let rule = parse_field(body, "rule").unwrap_or(SwitchRule::OneOfMany);

    let mut prop = match kind {
        PropertyKind::Text => Property::text(&name, state, perm),
        PropertyKind::Number => Property::number(&name, state, perm),
        PropertyKind::Switch => Property::switch(&name, state, perm, rule),
        PropertyKind::Light => Property::light(&name, state),
        PropertyKind::Blob => Property::blob(&name, state, perm),
    };
    prop.bind_device(device.as_str());

    if let Some(label) = str_field(body, "label") {
        prop = prop.with_label(label);
    }
    if let Some(group) = str_field(body, "group") {
        prop = prop.with_group(group);
    }
    if let Some(hints) = str_field(body, "hints") {
        prop = prop.with_hints(hints);
    }
    if let Some(timeout) = f64_field(body, "timeout") {
        prop.set_timeout(timeout);
    }
    prop.set_timestamp(str_field(body, "timestamp"));
    prop.set_message(str_field(body, "message"));

    if let Some(items) = body.get("items").and_then(Value::as_array) {
        for entry in items {
            let Some(item_name) = str_field(entry, "name") else {
                continue;
            };
            let value_text = entry.get("value").and_then(scalar_text).unwrap_or_default();

            let mut item = match kind {
                PropertyKind::Text => Item::text(&item_name, value_text),
                PropertyKind::Number => Item::number(
                    &item_name,
                    value_text,
                    str_field(entry, "format").unwrap_or_default(),
                    str_field(entry, "min").unwrap_or_default(),
                    str_field(entry, "max").unwrap_or_default(),
                    str_field(entry, "step").unwrap_or_default(),
                ),
                PropertyKind::Switch => Item::switch(
                    &item_name,
                    SwitchState::from_wire(&value_text).unwrap_or(SwitchState::Off),
                ),
                PropertyKind::Light => Item::light(
                    &item_name,
                    value_text.parse().unwrap_or(PropertyState::Idle),
                ),
                PropertyKind::Blob => {
                    let mut blob = Item::blob(
                        &item_name,
                        str_field(entry, "format").unwrap_or_default(),
                    );
                    let _ = blob.set_value(&value_text);
                    let _ = blob.set_blob_meta(
                        usize_field(entry, "size"),
                        None,
                        str_field(entry, "url").as_deref(),
                    );
                    blob
                }
            };

            if let Some(label) = str_field(entry, "label") {
                item = item.with_label(label);
            }
            if let Some(hints) = str_field(entry, "hints") {
                item = item.with_hints(hints);
            }
            if let Err(e) = prop.add_item(item) {
                debug!(item = %item_name, error = %e, "dropping bad item in definition");
            }
        }
    }

    Ok(prop)
}

fn decode_update(kind: PropertyKind, body: &Value) -> ProtocolResult<UpdateVector> {
    let device = str_field(body, "device").ok_or(ProtocolError::MissingField("device"))?;
    let name = str_field(body, "name").ok_or(ProtocolError::MissingField("name"))?;

    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let item_name = str_field(entry, "name")?;
                    Some(UpdateItem {
                        name: item_name,
                        value: entry.get("value").cloned(),
                        size: usize_field(entry, "size"),
                        format: str_field(entry, "format"),
                        url: str_field(entry, "url"),
                        target: str_field(entry, "target"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(UpdateVector {
        device,
        name,
        kind,
        state: parse_field(body, "state"),
        timeout: f64_field(body, "timeout"),
        timestamp: str_field(body, "timestamp"),
        message: str_field(body, "message"),
        items,
    })
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(scalar_text)
}

fn parse_field<T: std::str::FromStr>(body: &Value, key: &str) -> Option<T> {
    str_field(body, key).and_then(|s| s.parse().ok())
}

fn f64_field(body: &Value, key: &str) -> Option<f64> {
    let value = body.get(key)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn usize_field(body: &Value, key: &str) -> Option<usize> {
    let value = body.get(key)?;
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Wire text of a scalar JSON value. Booleans arrive from JSON peers for
/// switch items and map onto the `true`/`false` tokens the model accepts.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Greeting sent once the connection is established
pub fn get_properties_request(client: &str) -> Value {
    let mut body = Map::new();
    body.insert("version".into(), Value::from(PROTOCOL_VERSION));
    body.insert("client".into(), Value::from(client));

    let mut root = Map::new();
    root.insert("getProperties".into(), Value::Object(body));
    Value::Object(root)
}

/// Outbound `new{Kind}Vector` change request
pub fn change_request(
    kind: PropertyKind,
    device: &str,
    name: &str,
    items: &[(String, Value)],
) -> Value {
    let entries: Vec<Value> = items
        .iter()
        .map(|(item, value)| {
            let mut entry = Map::new();
            entry.insert("name".into(), Value::from(item.as_str()));
            entry.insert("value".into(), value.clone());
            Value::Object(entry)
        })
        .collect();

    let mut body = Map::new();
    body.insert("device".into(), Value::from(device));
    body.insert("name".into(), Value::from(name));
    body.insert("items".into(), Value::Array(entries));

    let mut root = Map::new();
    root.insert(format!("new{}Vector", kind), Value::Object(body));
    Value::Object(root)
}

/// A client-requested change to one item, as parsed from a `new{Kind}Vector`
/// request. Values are raw wire text; validating and applying them is the
/// listener's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub value: String,
    pub size: Option<String>,
    pub format: Option<String>,
    pub url: Option<String>,
}

/// Item-update mapping handed to driver listeners, keyed by item name
pub type ItemUpdates = HashMap<String, ItemUpdate>;

/// Collect the `one{Kind}` children of a `new{Kind}Vector` element
pub fn updates_from_element(element: &XmlElement, kind: PropertyKind) -> ItemUpdates {
    let tag = format!("one{}", kind);
    let mut updates = HashMap::new();

    for child in element.children_named(&tag) {
        let Some(name) = child.attribute("name") else {
            continue;
        };
        let blob = kind == PropertyKind::Blob;
        updates.insert(
            name.to_string(),
            ItemUpdate {
                value: child.trimmed_text().to_string(),
                size: blob
                    .then(|| child.attribute("size").map(str::to_string))
                    .flatten(),
                format: blob
                    .then(|| child.attribute("format").map(str::to_string))
                    .flatten(),
                url: blob
                    .then(|| child.attribute("url").map(str::to_string))
                    .flatten(),
            },
        );
    }

    updates
}

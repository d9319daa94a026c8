//! Property and item types shared by the client and driver engines

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Kind of a property and of every item it contains. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Text,
    Number,
    Switch,
    Light,
    #[serde(rename = "BLOB")]
    Blob,
}

impl PropertyKind {
    /// Wire token, as used in message keys (`defTextVector`) and element tags
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Text => "Text",
            PropertyKind::Number => "Number",
            PropertyKind::Switch => "Switch",
            PropertyKind::Light => "Light",
            PropertyKind::Blob => "BLOB",
        }
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PropertyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Text" => Ok(PropertyKind::Text),
            "Number" => Ok(PropertyKind::Number),
            "Switch" => Ok(PropertyKind::Switch),
            "Light" => Ok(PropertyKind::Light),
            "BLOB" => Ok(PropertyKind::Blob),
            _ => Err(Error::InvalidToken {
                field: "kind",
                token: s.to_string(),
            }),
        }
    }
}

/// Operation progress/outcome of a property (and value of a light item)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

impl PropertyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyState::Idle => "Idle",
            PropertyState::Ok => "Ok",
            PropertyState::Busy => "Busy",
            PropertyState::Alert => "Alert",
        }
    }
}

impl std::fmt::Display for PropertyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PropertyState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Idle" => Ok(PropertyState::Idle),
            "Ok" => Ok(PropertyState::Ok),
            "Busy" => Ok(PropertyState::Busy),
            "Alert" => Ok(PropertyState::Alert),
            _ => Err(Error::InvalidToken {
                field: "state",
                token: s.to_string(),
            }),
        }
    }
}

/// Whether a client may request changes to a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadWrite => "rw",
            Permission::ReadOnly => "ro",
            Permission::WriteOnly => "wo",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rw" => Ok(Permission::ReadWrite),
            "ro" => Ok(Permission::ReadOnly),
            "wo" => Ok(Permission::WriteOnly),
            _ => Err(Error::InvalidToken {
                field: "permission",
                token: s.to_string(),
            }),
        }
    }
}

/// Advisory cardinality constraint on "On" items of a switch property.
/// Not enforced by the engines; honoring it is the owning device's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchRule {
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl SwitchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchRule::OneOfMany => "OneOfMany",
            SwitchRule::AtMostOne => "AtMostOne",
            SwitchRule::AnyOfMany => "AnyOfMany",
        }
    }
}

impl std::fmt::Display for SwitchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SwitchRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OneOfMany" => Ok(SwitchRule::OneOfMany),
            "AtMostOne" => Ok(SwitchRule::AtMostOne),
            "AnyOfMany" => Ok(SwitchRule::AnyOfMany),
            _ => Err(Error::InvalidToken {
                field: "rule",
                token: s.to_string(),
            }),
        }
    }
}

/// Value of a switch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "On",
            SwitchState::Off => "Off",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }

    /// Lenient parse. The XML side carries `On`/`Off`; JSON peers send
    /// booleans, which arrive here as `true`/`false`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "On" | "true" => Some(SwitchState::On),
            "Off" | "false" => Some(SwitchState::Off),
            _ => None,
        }
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SwitchState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s).ok_or_else(|| Error::InvalidToken {
            field: "switch",
            token: s.to_string(),
        })
    }
}

/// Kind-specific payload of an item. Numeric attributes are stored as
/// the wire provided them; the model does not validate or normalize.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Text(String),
    Number {
        value: String,
        format: String,
        min: String,
        max: String,
        step: String,
        target: Option<String>,
    },
    Switch(SwitchState),
    Light(PropertyState),
    Blob {
        /// Base64 encoding of the payload
        data: String,
        /// Decoded payload size in bytes
        size: usize,
        /// Format tag of the decoded payload, e.g. a file extension
        format: String,
        url: Option<String>,
    },
}

impl ItemValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            ItemValue::Text(_) => PropertyKind::Text,
            ItemValue::Number { .. } => PropertyKind::Number,
            ItemValue::Switch(_) => PropertyKind::Switch,
            ItemValue::Light(_) => PropertyKind::Light,
            ItemValue::Blob { .. } => PropertyKind::Blob,
        }
    }
}

/// A named leaf value inside a property
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    name: String,
    label: String,
    hints: Option<String>,
    value: ItemValue,
}

impl Item {
    fn new(name: impl Into<String>, value: ItemValue) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            hints: None,
            value,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ItemValue::Text(value.into()))
    }

    pub fn number(
        name: impl Into<String>,
        value: impl Into<String>,
        format: impl Into<String>,
        min: impl Into<String>,
        max: impl Into<String>,
        step: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            ItemValue::Number {
                value: value.into(),
                format: format.into(),
                min: min.into(),
                max: max.into(),
                step: step.into(),
                target: None,
            },
        )
    }

    pub fn switch(name: impl Into<String>, state: SwitchState) -> Self {
        Self::new(name, ItemValue::Switch(state))
    }

    pub fn light(name: impl Into<String>, state: PropertyState) -> Self {
        Self::new(name, ItemValue::Light(state))
    }

    /// A BLOB item with an empty payload; fill it with [`Item::set_bytes`].
    pub fn blob(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(
            name,
            ItemValue::Blob {
                data: String::new(),
                size: 0,
                format: format.into(),
                url: None,
            },
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_hints(mut self, hints: impl Into<String>) -> Self {
        self.hints = Some(hints.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn hints(&self) -> Option<&str> {
        self.hints.as_deref()
    }

    pub fn kind(&self) -> PropertyKind {
        self.value.kind()
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    /// Display form of the value, as it appears on the wire
    pub fn value_text(&self) -> String {
        match &self.value {
            ItemValue::Text(v) => v.clone(),
            ItemValue::Number { value, .. } => value.clone(),
            ItemValue::Switch(s) => s.to_string(),
            ItemValue::Light(s) => s.to_string(),
            ItemValue::Blob { data, .. } => data.clone(),
        }
    }

    pub fn as_switch(&self) -> Option<SwitchState> {
        match &self.value {
            ItemValue::Switch(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<PropertyState> {
        match &self.value {
            ItemValue::Light(s) => Some(*s),
            _ => None,
        }
    }

    /// Decoded payload of a BLOB item
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match &self.value {
            ItemValue::Blob { data, .. } => BASE64.decode(data.as_bytes()).ok(),
            _ => None,
        }
    }

    /// Set the value from its wire text form, parsed per kind. Switch and
    /// light values must be valid tokens; text, number and BLOB values are
    /// stored as given.
    pub fn set_value(&mut self, text: &str) -> Result<()> {
        match &mut self.value {
            ItemValue::Text(v) => *v = text.to_string(),
            ItemValue::Number { value, .. } => *value = text.to_string(),
            ItemValue::Switch(s) => *s = text.parse()?,
            ItemValue::Light(s) => *s = text.parse()?,
            ItemValue::Blob { data, .. } => *data = text.to_string(),
        }
        Ok(())
    }

    /// Store a raw byte payload on a BLOB item. The size and the base64
    /// encoding are computed here; callers never encode manually.
    pub fn set_bytes(&mut self, payload: &[u8]) -> Result<()> {
        match &mut self.value {
            ItemValue::Blob { data, size, .. } => {
                *size = payload.len();
                *data = BASE64.encode(payload);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: PropertyKind::Blob.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub fn set_switch(&mut self, state: SwitchState) -> Result<()> {
        match &mut self.value {
            ItemValue::Switch(s) => {
                *s = state;
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: PropertyKind::Switch.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Update the target value of a number item
    pub fn set_target(&mut self, new_target: Option<String>) -> Result<()> {
        match &mut self.value {
            ItemValue::Number { target, .. } => {
                *target = new_target;
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: PropertyKind::Number.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Update the transfer metadata of a BLOB item. `None` fields are left
    /// untouched.
    pub fn set_blob_meta(
        &mut self,
        new_size: Option<usize>,
        new_format: Option<&str>,
        new_url: Option<&str>,
    ) -> Result<()> {
        match &mut self.value {
            ItemValue::Blob {
                size, format, url, ..
            } => {
                if let Some(s) = new_size {
                    *size = s;
                }
                if let Some(f) = new_format {
                    *format = f.to_string();
                }
                if let Some(u) = new_url {
                    *url = Some(u.to_string());
                }
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: PropertyKind::Blob.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }
}

/// Kind-conditional attributes of a property. Light properties carry no
/// permission or timeout; only switch properties carry a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDetails {
    Text { perm: Permission, timeout: f64 },
    Number { perm: Permission, timeout: f64 },
    Switch { perm: Permission, timeout: f64, rule: SwitchRule },
    Light,
    Blob { perm: Permission, timeout: f64 },
}

impl PropertyDetails {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyDetails::Text { .. } => PropertyKind::Text,
            PropertyDetails::Number { .. } => PropertyKind::Number,
            PropertyDetails::Switch { .. } => PropertyKind::Switch,
            PropertyDetails::Light => PropertyKind::Light,
            PropertyDetails::Blob { .. } => PropertyKind::Blob,
        }
    }
}

/// A named, typed vector of items representing one controllable or
/// observable aspect of a device.
///
/// The kind is fixed at creation. After creation only the state, the
/// timestamp, the last message, the timeout and the item values change;
/// label, group, permission and rule are construction-time attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    device: String,
    name: String,
    label: String,
    group: String,
    state: PropertyState,
    timestamp: Option<String>,
    message: Option<String>,
    hints: Option<String>,
    details: PropertyDetails,
    items: Vec<Item>,
}

impl Property {
    fn new(name: impl Into<String>, state: PropertyState, details: PropertyDetails) -> Self {
        Self {
            device: String::new(),
            name: name.into(),
            label: String::new(),
            group: String::new(),
            state,
            timestamp: None,
            message: None,
            hints: None,
            details,
            items: Vec::new(),
        }
    }

    pub fn text(name: impl Into<String>, state: PropertyState, perm: Permission) -> Self {
        Self::new(name, state, PropertyDetails::Text { perm, timeout: 0.0 })
    }

    pub fn number(name: impl Into<String>, state: PropertyState, perm: Permission) -> Self {
        Self::new(name, state, PropertyDetails::Number { perm, timeout: 0.0 })
    }

    pub fn switch(
        name: impl Into<String>,
        state: PropertyState,
        perm: Permission,
        rule: SwitchRule,
    ) -> Self {
        Self::new(
            name,
            state,
            PropertyDetails::Switch {
                perm,
                timeout: 0.0,
                rule,
            },
        )
    }

    pub fn light(name: impl Into<String>, state: PropertyState) -> Self {
        Self::new(name, state, PropertyDetails::Light)
    }

    pub fn blob(name: impl Into<String>, state: PropertyState, perm: Permission) -> Self {
        Self::new(name, state, PropertyDetails::Blob { perm, timeout: 0.0 })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_hints(mut self, hints: impl Into<String>) -> Self {
        self.hints = Some(hints.into());
        self
    }

    /// Initial timeout. Ignored for light properties, which carry none.
    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Record the owning device's name. Called when the property is
    /// attached to a device, either by a driver device or by the client
    /// engine while decoding a definition.
    pub fn bind_device(&mut self, device: impl Into<String>) {
        self.device = device.into();
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn hints(&self) -> Option<&str> {
        self.hints.as_deref()
    }

    pub fn kind(&self) -> PropertyKind {
        self.details.kind()
    }

    pub fn details(&self) -> &PropertyDetails {
        &self.details
    }

    /// Permission of the property. Light properties are always read-only.
    pub fn perm(&self) -> Permission {
        match &self.details {
            PropertyDetails::Text { perm, .. }
            | PropertyDetails::Number { perm, .. }
            | PropertyDetails::Switch { perm, .. }
            | PropertyDetails::Blob { perm, .. } => *perm,
            PropertyDetails::Light => Permission::ReadOnly,
        }
    }

    pub fn timeout(&self) -> f64 {
        match &self.details {
            PropertyDetails::Text { timeout, .. }
            | PropertyDetails::Number { timeout, .. }
            | PropertyDetails::Switch { timeout, .. }
            | PropertyDetails::Blob { timeout, .. } => *timeout,
            PropertyDetails::Light => 0.0,
        }
    }

    /// Update the timeout. A no-op for light properties.
    pub fn set_timeout(&mut self, new_timeout: f64) {
        match &mut self.details {
            PropertyDetails::Text { timeout, .. }
            | PropertyDetails::Number { timeout, .. }
            | PropertyDetails::Switch { timeout, .. }
            | PropertyDetails::Blob { timeout, .. } => *timeout = new_timeout,
            PropertyDetails::Light => {}
        }
    }

    pub fn rule(&self) -> Option<SwitchRule> {
        match &self.details {
            PropertyDetails::Switch { rule, .. } => Some(*rule),
            _ => None,
        }
    }

    pub fn is_read_write(&self) -> bool {
        self.perm() == Permission::ReadWrite
    }

    pub fn is_read_only(&self) -> bool {
        self.perm() == Permission::ReadOnly
    }

    pub fn is_write_only(&self) -> bool {
        self.perm() == Permission::WriteOnly
    }

    pub fn state(&self) -> PropertyState {
        self.state
    }

    pub fn set_state(&mut self, state: PropertyState) {
        self.state = state;
    }

    pub fn mark_idle(&mut self) {
        self.state = PropertyState::Idle;
    }

    pub fn mark_ok(&mut self) {
        self.state = PropertyState::Ok;
    }

    pub fn mark_busy(&mut self) {
        self.state = PropertyState::Busy;
    }

    pub fn mark_alert(&mut self) {
        self.state = PropertyState::Alert;
    }

    pub fn is_idle(&self) -> bool {
        self.state == PropertyState::Idle
    }

    pub fn is_ok(&self) -> bool {
        self.state == PropertyState::Ok
    }

    pub fn is_busy(&self) -> bool {
        self.state == PropertyState::Busy
    }

    pub fn is_alert(&self) -> bool {
        self.state == PropertyState::Alert
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn set_timestamp(&mut self, timestamp: Option<String>) {
        self.timestamp = timestamp;
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }

    /// Append an item. The item kind must match the property kind and the
    /// name must be unique within the property.
    pub fn add_item(&mut self, item: Item) -> Result<()> {
        if item.kind() != self.kind() {
            return Err(Error::KindMismatch {
                expected: self.kind().to_string(),
                got: item.kind().to_string(),
            });
        }
        if self.items.iter().any(|i| i.name() == item.name()) {
            return Err(Error::DuplicateItem(item.name().to_string()));
        }
        self.items.push(item);
        Ok(())
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name() == name)
    }

    pub fn item_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.name() == name)
    }

    /// Items in insertion order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn set_item_value(&mut self, item: &str, value: &str) -> Result<()> {
        self.item_mut(item)
            .ok_or_else(|| Error::UnknownItem(item.to_string()))?
            .set_value(value)
    }

    pub fn set_item_bytes(&mut self, item: &str, payload: &[u8]) -> Result<()> {
        self.item_mut(item)
            .ok_or_else(|| Error::UnknownItem(item.to_string()))?
            .set_bytes(payload)
    }

    /// Wire text of an item's value
    pub fn item_value(&self, item: &str) -> Option<String> {
        self.item(item).map(Item::value_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tokens() {
        assert_eq!(PropertyKind::Blob.as_str(), "BLOB");
        assert_eq!("BLOB".parse::<PropertyKind>().unwrap(), PropertyKind::Blob);
        assert!("blob".parse::<PropertyKind>().is_err());
    }

    #[test]
    fn test_permission_tokens() {
        assert_eq!(Permission::ReadWrite.to_string(), "rw");
        assert_eq!("ro".parse::<Permission>().unwrap(), Permission::ReadOnly);
        assert!("rx".parse::<Permission>().is_err());
    }

    #[test]
    fn test_switch_from_wire() {
        assert_eq!(SwitchState::from_wire("On"), Some(SwitchState::On));
        assert_eq!(SwitchState::from_wire("true"), Some(SwitchState::On));
        assert_eq!(SwitchState::from_wire("false"), Some(SwitchState::Off));
        assert_eq!(SwitchState::from_wire("Maybe"), None);
    }

    #[test]
    fn test_add_item_rejects_kind_mismatch() {
        let mut prop = Property::text("INFO", PropertyState::Ok, Permission::ReadOnly);
        prop.add_item(Item::text("MODEL", "SimCam")).unwrap();

        let err = prop
            .add_item(Item::switch("POWER", SwitchState::On))
            .unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
    }

    #[test]
    fn test_add_item_rejects_duplicate_name() {
        let mut prop = Property::text("INFO", PropertyState::Ok, Permission::ReadOnly);
        prop.add_item(Item::text("MODEL", "SimCam")).unwrap();

        let err = prop.add_item(Item::text("MODEL", "Other")).unwrap_err();
        assert!(matches!(err, Error::DuplicateItem(_)));
    }

    #[test]
    fn test_set_bytes_encodes_and_sizes() {
        let mut item = Item::blob("IMAGE", ".fits");
        item.set_bytes(b"hello").unwrap();

        match item.value() {
            ItemValue::Blob { data, size, .. } => {
                assert_eq!(*size, 5);
                assert_eq!(data, "aGVsbG8=");
            }
            _ => panic!("not a blob"),
        }
        assert_eq!(item.bytes().unwrap(), b"hello");
    }

    #[test]
    fn test_set_bytes_rejects_non_blob() {
        let mut item = Item::text("MODEL", "SimCam");
        assert!(item.set_bytes(b"data").is_err());
    }

    #[test]
    fn test_light_has_fixed_perm_and_timeout() {
        let mut prop = Property::light("STATUS", PropertyState::Idle).with_timeout(5.0);
        assert_eq!(prop.perm(), Permission::ReadOnly);
        assert_eq!(prop.timeout(), 0.0);

        prop.set_timeout(10.0);
        assert_eq!(prop.timeout(), 0.0);
    }

    #[test]
    fn test_state_marks() {
        let mut prop = Property::switch(
            "CONNECTION",
            PropertyState::Idle,
            Permission::ReadWrite,
            SwitchRule::OneOfMany,
        );
        assert!(prop.is_idle());
        prop.mark_busy();
        assert!(prop.is_busy());
        prop.mark_ok();
        assert_eq!(prop.state(), PropertyState::Ok);
        prop.mark_alert();
        assert!(prop.is_alert());
    }

    #[test]
    fn test_item_values_parse_per_kind() {
        let mut sw = Item::switch("CONNECTED", SwitchState::Off);
        sw.set_value("On").unwrap();
        assert_eq!(sw.as_switch(), Some(SwitchState::On));
        assert!(sw.set_value("Sideways").is_err());

        let mut num = Item::number("EXPOSURE", "1", "%g", "0", "3600", "1");
        num.set_value("2.5").unwrap();
        assert_eq!(num.value_text(), "2.5");
        num.set_target(Some("2.5".into())).unwrap();
    }

    #[test]
    fn test_items_keep_insertion_order() {
        let mut prop = Property::switch(
            "CONNECTION",
            PropertyState::Ok,
            Permission::ReadWrite,
            SwitchRule::OneOfMany,
        );
        prop.add_item(Item::switch("CONNECTED", SwitchState::Off))
            .unwrap();
        prop.add_item(Item::switch("DISCONNECTED", SwitchState::On))
            .unwrap();

        let names: Vec<_> = prop.items().iter().map(Item::name).collect();
        assert_eq!(names, ["CONNECTED", "DISCONNECTED"]);
    }
}

//! Device records

use crate::error::{Error, Result};
use crate::property::Property;

/// A named collection of properties, plus a message/timestamp pair for
/// device-level notifications that reference no property.
///
/// On the client side devices are created implicitly, the first time an
/// inbound message references an unknown device name. On the driver side
/// they are created explicitly by application code and live for the whole
/// driver session.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    properties: Vec<Property>,
    timestamp: Option<String>,
    message: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            timestamp: None,
            message: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a property. The property is bound to this device's name;
    /// property names are unique within a device.
    pub fn add_property(&mut self, mut property: Property) -> Result<()> {
        if self.properties.iter().any(|p| p.name() == property.name()) {
            return Err(Error::DuplicateProperty(property.name().to_string()));
        }
        property.bind_device(self.name.as_str());
        self.properties.push(property);
        Ok(())
    }

    /// Remove a property by name, recording why and when. Returns the
    /// removed property, or `None` if the name is unknown.
    pub fn remove_property(
        &mut self,
        name: &str,
        timestamp: Option<String>,
        message: Option<String>,
    ) -> Option<Property> {
        let pos = self.properties.iter().position(|p| p.name() == name)?;
        self.timestamp = timestamp;
        self.message = message;
        Some(self.properties.remove(pos))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    /// Properties in insertion order
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Record a device-level notification
    pub fn note_message(&mut self, timestamp: Option<String>, message: Option<String>) {
        self.timestamp = timestamp;
        self.message = message;
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Item, Permission, PropertyState};

    #[test]
    fn test_add_property_binds_device_name() {
        let mut dev = Device::new("Cam");
        dev.add_property(Property::text(
            "INFO",
            PropertyState::Ok,
            Permission::ReadOnly,
        ))
        .unwrap();

        assert_eq!(dev.property("INFO").unwrap().device(), "Cam");
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let mut dev = Device::new("Cam");
        dev.add_property(Property::text(
            "INFO",
            PropertyState::Ok,
            Permission::ReadOnly,
        ))
        .unwrap();

        let err = dev
            .add_property(Property::text(
                "INFO",
                PropertyState::Ok,
                Permission::ReadOnly,
            ))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty(_)));
    }

    #[test]
    fn test_remove_property_records_reason() {
        let mut dev = Device::new("Cam");
        let mut prop = Property::text("INFO", PropertyState::Ok, Permission::ReadOnly);
        prop.add_item(Item::text("MODEL", "SimCam")).unwrap();
        dev.add_property(prop).unwrap();

        let removed = dev
            .remove_property("INFO", Some("t1".into()), Some("gone".into()))
            .unwrap();
        assert_eq!(removed.name(), "INFO");
        assert_eq!(dev.message(), Some("gone"));
        assert!(dev.property("INFO").is_none());

        assert!(dev.remove_property("INFO", None, None).is_none());
    }
}

//! Driver-side devices: property storage and change listeners

use std::collections::HashMap;
use std::sync::Arc;

use astral_core::{
    Error, Permission, Property, PropertyKind, PropertyState, Result, SwitchRule,
};
use astral_protocol::ItemUpdates;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::debug;

use crate::driver::Outbound;

/// Listener for client change requests on one property. Receives the
/// resolved property, the parsed item-update mapping and the outbound
/// handle; it alone decides what to validate, what to commit and what to
/// send back.
pub type ChangeListener = dyn Fn(&mut Property, &ItemUpdates, &Outbound) + Send + Sync;

/// Mutable handle to a property owned by a driver device
pub type PropertyHandle<'a> = MappedRwLockWriteGuard<'a, Property>;

/// Shared handle to a property owned by a driver device
pub type PropertyRef<'a> = MappedRwLockReadGuard<'a, Property>;

/// A device owned by a driver. Created through [`Driver::add_device`]
/// and alive for the whole driver session.
///
/// [`Driver::add_device`]: crate::driver::Driver::add_device
pub struct DriverDevice {
    name: String,
    properties: RwLock<Vec<Property>>,
    listeners: RwLock<HashMap<String, Arc<ChangeListener>>>,
    fallback: RwLock<Option<Arc<ChangeListener>>>,
}

impl DriverDevice {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: RwLock::new(Vec::new()),
            listeners: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a fully built property and return a mutable handle to it,
    /// ready for items to be added. Property names are unique within a
    /// device.
    pub fn add_property(&self, property: Property) -> Result<PropertyHandle<'_>> {
        let mut props = self.properties.write();
        if props.iter().any(|p| p.name() == property.name()) {
            return Err(Error::DuplicateProperty(property.name().to_string()));
        }
        let mut property = property;
        property.bind_device(self.name.as_str());
        props.push(property);
        Ok(RwLockWriteGuard::map(props, |v| {
            let last = v.len() - 1;
            &mut v[last]
        }))
    }

    pub fn add_text_property(
        &self,
        name: &str,
        state: PropertyState,
        perm: Permission,
    ) -> Result<PropertyHandle<'_>> {
        self.add_property(Property::text(name, state, perm))
    }

    pub fn add_number_property(
        &self,
        name: &str,
        state: PropertyState,
        perm: Permission,
    ) -> Result<PropertyHandle<'_>> {
        self.add_property(Property::number(name, state, perm))
    }

    pub fn add_switch_property(
        &self,
        name: &str,
        state: PropertyState,
        perm: Permission,
        rule: SwitchRule,
    ) -> Result<PropertyHandle<'_>> {
        self.add_property(Property::switch(name, state, perm, rule))
    }

    pub fn add_light_property(
        &self,
        name: &str,
        state: PropertyState,
    ) -> Result<PropertyHandle<'_>> {
        self.add_property(Property::light(name, state))
    }

    pub fn add_blob_property(
        &self,
        name: &str,
        state: PropertyState,
        perm: Permission,
    ) -> Result<PropertyHandle<'_>> {
        self.add_property(Property::blob(name, state, perm))
    }

    pub fn property(&self, name: &str) -> Option<PropertyRef<'_>> {
        RwLockReadGuard::try_map(self.properties.read(), |v| {
            v.iter().find(|p| p.name() == name)
        })
        .ok()
    }

    pub fn property_mut(&self, name: &str) -> Option<PropertyHandle<'_>> {
        RwLockWriteGuard::try_map(self.properties.write(), |v| {
            v.iter_mut().find(|p| p.name() == name)
        })
        .ok()
    }

    /// Snapshots of all properties, in insertion order
    pub fn properties(&self) -> Vec<Property> {
        self.properties.read().clone()
    }

    /// Detach a property. Announcing the removal to clients is a
    /// separate, explicit [`Outbound::send_deletion`] call.
    pub fn remove_property(&self, name: &str) -> Option<Property> {
        let mut props = self.properties.write();
        let pos = props.iter().position(|p| p.name() == name)?;
        Some(props.remove(pos))
    }

    /// Set one item value. Does not notify clients; request an update
    /// serialization separately.
    pub fn set_value(&self, property: &str, item: &str, value: &str) -> Result<()> {
        self.property_mut(property)
            .ok_or_else(|| Error::UnknownProperty(property.to_string()))?
            .set_item_value(item, value)
    }

    /// Store a raw BLOB payload on an item
    pub fn set_bytes(&self, property: &str, item: &str, payload: &[u8]) -> Result<()> {
        self.property_mut(property)
            .ok_or_else(|| Error::UnknownProperty(property.to_string()))?
            .set_item_bytes(item, payload)
    }

    /// Set several item values of one property in a single lock scope
    pub fn set_values(&self, property: &str, values: &[(&str, &str)]) -> Result<()> {
        let mut prop = self
            .property_mut(property)
            .ok_or_else(|| Error::UnknownProperty(property.to_string()))?;
        for (item, value) in values {
            prop.set_item_value(item, value)?;
        }
        Ok(())
    }

    /// Wire text of one item's value
    pub fn value(&self, property: &str, item: &str) -> Option<String> {
        self.property(property).and_then(|p| p.item_value(item))
    }

    pub fn mark_idle(&self, property: &str) -> Result<()> {
        self.set_state(property, PropertyState::Idle)
    }

    pub fn mark_ok(&self, property: &str) -> Result<()> {
        self.set_state(property, PropertyState::Ok)
    }

    pub fn mark_busy(&self, property: &str) -> Result<()> {
        self.set_state(property, PropertyState::Busy)
    }

    pub fn mark_alert(&self, property: &str) -> Result<()> {
        self.set_state(property, PropertyState::Alert)
    }

    fn set_state(&self, property: &str, state: PropertyState) -> Result<()> {
        self.property_mut(property)
            .ok_or_else(|| Error::UnknownProperty(property.to_string()))?
            .set_state(state);
        Ok(())
    }

    /// Register the listener for one property name. At most one listener
    /// per name; a second registration replaces the first.
    pub fn on_change<F>(&self, property: impl Into<String>, listener: F)
    where
        F: Fn(&mut Property, &ItemUpdates, &Outbound) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .insert(property.into(), Arc::new(listener));
    }

    /// Catch-all listener, used when no per-property listener is
    /// registered for the requested name
    pub fn on_any_change<F>(&self, listener: F)
    where
        F: Fn(&mut Property, &ItemUpdates, &Outbound) + Send + Sync + 'static,
    {
        *self.fallback.write() = Some(Arc::new(listener));
    }

    pub fn remove_listener(&self, property: &str) {
        self.listeners.write().remove(property);
    }

    /// Route one parsed change request to the registered listener. The
    /// engine never applies the requested values itself.
    pub(crate) fn dispatch_change(
        &self,
        property: &str,
        kind: PropertyKind,
        updates: ItemUpdates,
        outbound: &Outbound,
    ) {
        let listener = self
            .listeners
            .read()
            .get(property)
            .cloned()
            .or_else(|| self.fallback.read().clone());
        let Some(listener) = listener else {
            debug!(device = %self.name, property, "no listener for change request");
            return;
        };

        let mut props = self.properties.write();
        let Some(prop) = props.iter_mut().find(|p| p.name() == property) else {
            debug!(device = %self.name, property, "change request for unknown property dropped");
            return;
        };
        if prop.kind() != kind {
            debug!(device = %self.name, property, "change request kind mismatch, dropped");
            return;
        }

        listener(prop, &updates, outbound);
    }
}

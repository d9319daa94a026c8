//! Standard connection property
//!
//! Nearly every device exposes the same `CONNECTION` switch. This
//! module installs it, together with a listener that routes client
//! requests to a connect/disconnect delegate.

use std::sync::Arc;

use astral_core::{Item, Permission, Property, PropertyState, Result, SwitchRule, SwitchState};

use crate::device::DriverDevice;
use crate::driver::Outbound;

/// Name of the standard connection property
pub const CONNECTION_PROPERTY: &str = "CONNECTION";

/// Connect/disconnect hooks behind the standard `CONNECTION` property.
///
/// A typical implementation marks the property busy and sends an update,
/// performs its connection logic, then flips the switch items, marks the
/// property ok (or alert) and sends another update.
#[allow(unused_variables)]
pub trait ConnectionDelegate: Send + Sync {
    fn connect(&self, property: &mut Property, outbound: &Outbound) {}

    fn disconnect(&self, property: &mut Property, outbound: &Outbound) {}
}

/// Add the standard `CONNECTION` OneOfMany switch (`CONNECTED` /
/// `DISCONNECTED`, initially disconnected) to a device and route client
/// requests for it to the delegate.
pub fn install_connection_property(
    device: &DriverDevice,
    delegate: Arc<dyn ConnectionDelegate>,
) -> Result<()> {
    {
        let mut prop = device.add_property(
            Property::switch(
                CONNECTION_PROPERTY,
                PropertyState::Ok,
                Permission::ReadWrite,
                SwitchRule::OneOfMany,
            )
            .with_label("Connection")
            .with_group("Main"),
        )?;
        prop.add_item(Item::switch("CONNECTED", SwitchState::Off).with_label("Connected"))?;
        prop.add_item(Item::switch("DISCONNECTED", SwitchState::On).with_label("Disconnected"))?;
    }

    device.on_change(CONNECTION_PROPERTY, move |prop, updates, outbound| {
        let asked_on = updates
            .get("CONNECTED")
            .and_then(|update| SwitchState::from_wire(&update.value))
            .map(|state| state.is_on())
            .unwrap_or(false);
        if asked_on {
            delegate.connect(prop, outbound);
        } else {
            delegate.disconnect(prop, outbound);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl ConnectionDelegate for Recorder {
        fn connect(&self, property: &mut Property, outbound: &Outbound) {
            property.set_item_value("CONNECTED", "On").unwrap();
            property.set_item_value("DISCONNECTED", "Off").unwrap();
            property.mark_ok();
            outbound.send_update(property);
            self.calls.lock().push("connect");
        }

        fn disconnect(&self, _property: &mut Property, _outbound: &Outbound) {
            self.calls.lock().push("disconnect");
        }
    }

    #[test]
    fn test_connection_property_shape() {
        let driver = Driver::new("test-driver");
        let device = driver.add_device("Dome").unwrap();
        install_connection_property(&device, Arc::new(Recorder::default())).unwrap();

        let prop = device.property(CONNECTION_PROPERTY).unwrap();
        assert_eq!(prop.rule(), Some(SwitchRule::OneOfMany));
        assert_eq!(prop.label(), "Connection");
        assert_eq!(prop.group(), "Main");
        assert_eq!(
            prop.item("DISCONNECTED").unwrap().as_switch(),
            Some(SwitchState::On)
        );
    }

    #[test]
    fn test_connect_request_reaches_delegate() {
        let driver = Driver::new("test-driver");
        let device = driver.add_device("Dome").unwrap();
        let recorder = Arc::new(Recorder::default());
        install_connection_property(&device, recorder.clone()).unwrap();

        driver.process_chunk(
            "<newSwitchVector device='Dome' name='CONNECTION'>\n  \
             <oneSwitch name='CONNECTED'>On</oneSwitch>\n  \
             <oneSwitch name='DISCONNECTED'>Off</oneSwitch>\n\
             </newSwitchVector>\n",
        );

        assert_eq!(recorder.calls.lock().as_slice(), ["connect"]);
        assert_eq!(device.value("CONNECTION", "CONNECTED").unwrap(), "On");

        driver.process_chunk(
            "<newSwitchVector device='Dome' name='CONNECTION'>\
             <oneSwitch name='CONNECTED'>Off</oneSwitch>\
             <oneSwitch name='DISCONNECTED'>On</oneSwitch>\
             </newSwitchVector>",
        );
        assert_eq!(
            recorder.calls.lock().as_slice(),
            ["connect", "disconnect"]
        );
    }
}

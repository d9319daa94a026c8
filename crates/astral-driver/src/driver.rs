//! Driver engine: request dispatch and the outbound queue

use std::sync::Arc;

use astral_core::{Error, Property, Result};
use astral_protocol::{
    definition_xml, deletion_xml, kind_of_new_tag, protocol_switch_ack, update_xml,
    updates_from_element, XmlElement, XmlTokenizer,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::device::DriverDevice;

/// Handle for queueing outbound messages.
///
/// Clones freely into listeners and background tasks; a single writer
/// drains the queue, so no two messages interleave on the wire no matter
/// where they originate.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Announce a property definition. Call exactly once per property, at
    /// the point the application decides it is ready to be announced;
    /// calling again redefines the property on the peer.
    pub fn send_definition(&self, property: &Property) {
        let _ = self.tx.send(definition_xml(property));
    }

    /// Push the property's current state and item values to the clients.
    /// May be called any number of times per property.
    pub fn send_update(&self, property: &Property) {
        let _ = self.tx.send(update_xml(property, None));
    }

    pub fn send_update_with_message(&self, property: &Property, message: &str) {
        let _ = self.tx.send(update_xml(property, Some(message)));
    }

    /// Announce removal of one property, or of a whole device when
    /// `property` is `None`
    pub fn send_deletion(&self, device: &str, property: Option<&str>) {
        let _ = self.tx.send(deletion_xml(device, property));
    }

    pub(crate) fn send_raw(&self, message: String) {
        let _ = self.tx.send(message);
    }
}

/// The driver engine: an owned-device registry, an incremental request
/// tokenizer and the outbound queue.
pub struct Driver {
    name: String,
    devices: DashMap<String, Arc<DriverDevice>>,
    tokenizer: Mutex<XmlTokenizer>,
    outbound: Outbound,
    queue: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Driver {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            devices: DashMap::new(),
            tokenizer: Mutex::new(XmlTokenizer::new()),
            outbound: Outbound { tx },
            queue: Mutex::new(Some(rx)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create and register a device. Device names are unique within one
    /// driver instance.
    pub fn add_device(&self, name: &str) -> Result<Arc<DriverDevice>> {
        match self.devices.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateDevice(name.to_string())),
            Entry::Vacant(slot) => {
                let device = Arc::new(DriverDevice::new(name));
                slot.insert(device.clone());
                Ok(device)
            }
        }
    }

    pub fn device(&self, name: &str) -> Option<Arc<DriverDevice>> {
        self.devices.get(name).map(|d| d.value().clone())
    }

    pub fn devices(&self) -> Vec<Arc<DriverDevice>> {
        self.devices.iter().map(|e| e.value().clone()).collect()
    }

    /// Outbound handle for definitions, updates and deletions
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Feed one inbound chunk and dispatch every element that completes
    pub fn process_chunk(&self, text: &str) {
        let mut tokenizer = self.tokenizer.lock();
        if let Err(e) = tokenizer.feed(text) {
            warn!(error = %e, "dropping oversized inbound buffer");
            tokenizer.reset();
            return;
        }
        loop {
            match tokenizer.next() {
                Ok(Some(element)) => self.handle_element(element),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "inbound parse error");
                    break;
                }
            }
        }
    }

    fn handle_element(&self, element: XmlElement) {
        match element.name.as_str() {
            "getProperties" => {
                // A requested protocol switch is acknowledged before any
                // definitions go out
                if element.attribute("switch") == Some("2.0") {
                    self.outbound.send_raw(protocol_switch_ack("2.0"));
                }
                match element.attribute("device") {
                    Some(name) => {
                        if let Some(device) = self.device(name) {
                            self.send_all_definitions(&device);
                        }
                    }
                    None => {
                        for device in self.devices() {
                            self.send_all_definitions(&device);
                        }
                    }
                }
            }
            tag if tag.starts_with("new") => {
                let Some(kind) = kind_of_new_tag(tag) else {
                    debug!(tag, "ignoring unknown request tag");
                    return;
                };
                let Some(device) = element.attribute("device").and_then(|d| self.device(d))
                else {
                    debug!("change request for unknown device dropped");
                    return;
                };
                let Some(property) = element.attribute("name") else {
                    debug!("change request without property name dropped");
                    return;
                };
                let updates = updates_from_element(&element, kind);
                device.dispatch_change(property, kind, updates, &self.outbound);
            }
            other => {
                debug!(tag = other, "ignoring unsupported element");
            }
        }
    }

    fn send_all_definitions(&self, device: &DriverDevice) {
        for property in device.properties() {
            self.outbound.send_definition(&property);
        }
    }

    /// Drive the engine over a bidirectional text channel. Returns when
    /// the inbound stream ends or either side fails; the caller owns any
    /// restart policy.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(mut queue) = self.queue.lock().take() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "driver is already running",
            ));
        };

        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            info!(driver = %self.name, "client stream closed");
                            break;
                        }
                        Ok(n) => self.process_chunk(&String::from_utf8_lossy(&buf[..n])),
                        Err(e) => {
                            error!(error = %e, "read error");
                            return Err(e);
                        }
                    }
                }
                message = queue.recv() => {
                    let Some(message) = message else { break };
                    writer.write_all(message.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astral_core::{Item, Permission, PropertyState, SwitchRule, SwitchState};
    use astral_protocol::ItemUpdates;
    use parking_lot::Mutex as PlainMutex;
    use tokio::io::duplex;

    fn drain(driver: &Driver) -> Vec<String> {
        let mut queue = driver.queue.lock();
        let rx = queue.as_mut().unwrap();
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn driver_with_connection() -> (Driver, Arc<DriverDevice>) {
        let driver = Driver::new("test-driver");
        let device = driver.add_device("Shutter").unwrap();
        {
            let mut prop = device
                .add_switch_property(
                    "CONNECTION",
                    PropertyState::Ok,
                    Permission::ReadWrite,
                    SwitchRule::OneOfMany,
                )
                .unwrap();
            prop.add_item(Item::switch("CONNECTED", SwitchState::Off))
                .unwrap();
            prop.add_item(Item::switch("DISCONNECTED", SwitchState::On))
                .unwrap();
        }
        (driver, device)
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let driver = Driver::new("test-driver");
        driver.add_device("Shutter").unwrap();
        assert!(matches!(
            driver.add_device("Shutter"),
            Err(Error::DuplicateDevice(_))
        ));
    }

    #[test]
    fn test_get_properties_sends_all_definitions() {
        let (driver, device) = driver_with_connection();
        {
            let mut prop = device
                .add_text_property("INFO", PropertyState::Ok, Permission::ReadOnly)
                .unwrap();
            prop.add_item(Item::text("MODEL", "RollOff")).unwrap();
        }

        driver.process_chunk("<getProperties version='2.0'/>\n");

        let sent = drain(&driver);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|m| m.starts_with("<defSwitchVector")));
        assert!(sent.iter().any(|m| m.starts_with("<defTextVector")));
    }

    #[test]
    fn test_get_properties_for_one_device() {
        let (driver, _device) = driver_with_connection();
        driver.add_device("Other").unwrap();

        driver.process_chunk("<getProperties device='Shutter'/>");
        let sent = drain(&driver);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("device='Shutter'"));

        driver.process_chunk("<getProperties device='Nobody'/>");
        assert!(drain(&driver).is_empty());
    }

    #[test]
    fn test_protocol_switch_is_acknowledged_first() {
        let (driver, _device) = driver_with_connection();

        driver.process_chunk("<getProperties switch='2.0'/>");

        let sent = drain(&driver);
        assert_eq!(sent[0], "<switchProtocol version='2.0'/>\n");
        assert!(sent[1].starts_with("<defSwitchVector"));
    }

    #[test]
    fn test_new_switch_vector_invokes_registered_listener() {
        let (driver, device) = driver_with_connection();

        let seen: Arc<PlainMutex<Vec<(String, ItemUpdates)>>> =
            Arc::new(PlainMutex::new(Vec::new()));
        let seen_by_listener = seen.clone();
        device.on_change("CONNECTION", move |prop, updates, _outbound| {
            seen_by_listener
                .lock()
                .push((prop.name().to_string(), updates.clone()));
        });

        let other_called = Arc::new(PlainMutex::new(false));
        let flag = other_called.clone();
        device.on_change("OTHER", move |_, _, _| {
            *flag.lock() = true;
        });

        driver.process_chunk(
            "<newSwitchVector device='Shutter' name='CONNECTION'>\n  \
             <oneSwitch name='CONNECTED'>On</oneSwitch>\n\
             </newSwitchVector>\n",
        );

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "CONNECTION");
        assert_eq!(seen[0].1.get("CONNECTED").unwrap().value, "On");
        assert!(!*other_called.lock());
    }

    #[test]
    fn test_request_split_across_chunks() {
        let (driver, device) = driver_with_connection();

        let called = Arc::new(PlainMutex::new(false));
        let flag = called.clone();
        device.on_change("CONNECTION", move |_, updates, _| {
            assert_eq!(updates.get("CONNECTED").unwrap().value, "On");
            *flag.lock() = true;
        });

        driver.process_chunk("<newSwitchVector device='Shutter' na");
        assert!(!*called.lock());
        driver.process_chunk("me='CONNECTION'><oneSwitch name='CONNECTED'>On</one");
        assert!(!*called.lock());
        driver.process_chunk("Switch></newSwitchVector>");
        assert!(*called.lock());
    }

    #[test]
    fn test_unknown_device_request_is_ignored() {
        let (driver, device) = driver_with_connection();

        let called = Arc::new(PlainMutex::new(false));
        let flag = called.clone();
        device.on_change("CONNECTION", move |_, _, _| {
            *flag.lock() = true;
        });

        driver.process_chunk(
            "<newSwitchVector device='Nobody' name='CONNECTION'>\
             <oneSwitch name='CONNECTED'>On</oneSwitch></newSwitchVector>",
        );

        assert!(!*called.lock());
        assert!(drain(&driver).is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_ignored() {
        let (driver, device) = driver_with_connection();

        let called = Arc::new(PlainMutex::new(false));
        let flag = called.clone();
        device.on_change("CONNECTION", move |_, _, _| {
            *flag.lock() = true;
        });

        driver.process_chunk(
            "<newTextVector device='Shutter' name='CONNECTION'>\
             <oneText name='CONNECTED'>On</oneText></newTextVector>",
        );

        assert!(!*called.lock());
    }

    #[test]
    fn test_fallback_listener_catches_unrouted_requests() {
        let (driver, device) = driver_with_connection();

        let called = Arc::new(PlainMutex::new(false));
        let flag = called.clone();
        device.on_any_change(move |prop, _, _| {
            assert_eq!(prop.name(), "CONNECTION");
            *flag.lock() = true;
        });

        driver.process_chunk(
            "<newSwitchVector device='Shutter' name='CONNECTION'>\
             <oneSwitch name='CONNECTED'>On</oneSwitch></newSwitchVector>",
        );

        assert!(*called.lock());
    }

    #[test]
    fn test_listener_can_commit_and_send_update() {
        let (driver, device) = driver_with_connection();

        device.on_change("CONNECTION", |prop, updates, outbound| {
            for (name, update) in updates {
                if let Err(_e) = prop.set_item_value(name, &update.value) {
                    prop.mark_alert();
                    outbound.send_update(&*prop);
                    return;
                }
            }
            prop.mark_ok();
            outbound.send_update_with_message(&*prop, "connected");
        });

        driver.process_chunk(
            "<newSwitchVector device='Shutter' name='CONNECTION'>\
             <oneSwitch name='CONNECTED'>On</oneSwitch></newSwitchVector>",
        );

        let sent = drain(&driver);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("<setSwitchVector device='Shutter' name='CONNECTION'"));
        assert!(sent[0].contains("message='connected'"));
        assert!(sent[0].contains("<oneSwitch name='CONNECTED'>On</oneSwitch>"));
        assert_eq!(device.value("CONNECTION", "CONNECTED").unwrap(), "On");
    }

    #[tokio::test]
    async fn test_run_over_stream() {
        let (driver, _device) = driver_with_connection();
        let driver = Arc::new(driver);

        let (local, mut remote) = duplex(64 * 1024);
        let engine = driver.clone();
        let session = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(local);
            engine.run(reader, writer).await
        });

        remote
            .write_all(b"<getProperties version='2.0'/>\n")
            .await
            .unwrap();

        let mut received = String::new();
        let mut buf = vec![0u8; 4096];
        while !received.contains("</defSwitchVector>") {
            let n = remote.read(&mut buf).await.unwrap();
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(received.starts_with("<defSwitchVector device='Shutter'"));

        drop(remote);
        session.await.unwrap().unwrap();
    }
}

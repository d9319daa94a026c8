//! Client connection: read loop, notifications and outbound requests

use std::sync::Arc;

use astral_core::{Device, Property};
use astral_protocol::{
    change_request, get_properties_request, DecodePolicy, JsonDecoder, Message,
};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::handler::ClientHandler;
use crate::sync::{Registry, SyncEvent};

/// Separator written after every outbound message to aid peer framing
const MESSAGE_SEPARATOR: &str = "\n\n";

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// A connected client engine.
///
/// Handles are cheap to clone into background tasks; outbound writes
/// from any of them are serialized behind one writer.
#[derive(Clone)]
pub struct Client {
    name: String,
    registry: Arc<Registry>,
    writer: SharedWriter,
}

impl Client {
    /// Connect to a remote endpoint and start mirroring its devices
    pub async fn connect(
        name: impl Into<String>,
        addr: impl ToSocketAddrs,
        handler: Arc<dyn ClientHandler>,
    ) -> std::io::Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(name, stream, handler).await
    }

    /// Run the engine over an already-established bidirectional stream.
    /// Sends the `getProperties` greeting and spawns the read loop.
    pub async fn from_stream<S>(
        name: impl Into<String>,
        stream: S,
        handler: Arc<dyn ClientHandler>,
    ) -> std::io::Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let (reader, writer) = tokio::io::split(stream);
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let registry = Arc::new(Registry::new());

        let client = Client {
            name: name.clone(),
            registry: registry.clone(),
            writer,
        };
        client.write_value(&get_properties_request(&name)).await?;

        tokio::spawn(read_loop(reader, registry, handler));

        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of one mirrored device
    pub fn device(&self, name: &str) -> Option<Device> {
        self.registry.device(name)
    }

    /// Snapshots of all mirrored devices
    pub fn devices(&self) -> Vec<Device> {
        self.registry.devices()
    }

    /// Snapshot of one mirrored property
    pub fn property(&self, device: &str, name: &str) -> Option<Property> {
        self.registry.property(device, name)
    }

    /// Last connection-wide message
    pub fn last_message(&self) -> Option<String> {
        self.registry.last_message()
    }

    /// Ask the remote driver to change items of a property.
    ///
    /// Requests against read-only properties, and requests naming an
    /// unknown device or property, are dropped without touching the
    /// wire.
    pub async fn request_change(
        &self,
        device: &str,
        property: &str,
        items: &[(String, Value)],
    ) -> std::io::Result<()> {
        let Some(prop) = self.registry.property(device, property) else {
            warn!(device, property, "change request for unknown property dropped");
            return Ok(());
        };
        if prop.is_read_only() {
            warn!(device, property, "change request refused: property is read-only");
            return Ok(());
        }

        let request = change_request(prop.kind(), device, property, items);
        self.write_value(&request).await
    }

    async fn write_value(&self, value: &Value) -> std::io::Result<()> {
        let mut payload = value.to_string();
        payload.push_str(MESSAGE_SEPARATOR);

        let mut writer = self.writer.lock().await;
        writer.write_all(payload.as_bytes()).await?;
        writer.flush().await
    }
}

async fn read_loop<R>(mut reader: R, registry: Arc<Registry>, handler: Arc<dyn ClientHandler>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = JsonDecoder::with_policy(DecodePolicy::Lenient);
    let mut buf = vec![0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("server closed the connection");
                break;
            }
            Ok(n) => {
                if let Err(e) = decoder.feed(&buf[..n]) {
                    warn!(error = %e, "dropping oversized inbound buffer");
                    decoder.reset();
                    continue;
                }
                loop {
                    match decoder.next() {
                        Ok(Some(value)) => dispatch(value, &registry, handler.as_ref()),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "inbound decode error");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "read error");
                break;
            }
        }
    }

    registry.clear();
    handler.connection_lost();
}

fn dispatch(value: Value, registry: &Registry, handler: &dyn ClientHandler) {
    let message = match Message::decode(value) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "dropping undecodable message");
            return;
        }
    };

    for event in registry.apply(message) {
        match event {
            SyncEvent::PropertyChanged(prop) => handler.property_changed(&prop),
            SyncEvent::PropertyDeleted(prop) => handler.property_deleted(&prop),
            SyncEvent::DeviceMessage(device) => handler.device_message(&device),
            SyncEvent::ClientMessage { message } => handler.client_message(message.as_deref()),
            SyncEvent::Unhandled { key, payload } => handler.unhandled(&key, &payload),
        }
    }
}

//! Astral wire protocol
//!
//! The protocol is symmetric in model but asymmetric in encoding. The
//! client role exchanges concatenated JSON objects over a byte stream:
//!
//! ```text
//! {"defTextVector": {...}}{"setTextVector": {...}}
//! ```
//!
//! The driver role exchanges streamed XML elements over a text stream,
//! with no enclosing document root:
//!
//! ```text
//! <getProperties switch='2.0'/>
//! <newSwitchVector device='Cam' name='CONNECTION'>
//!   <oneSwitch name='CONNECTED'>On</oneSwitch>
//! </newSwitchVector>
//! ```
//!
//! Both decoders are incremental: they are fed whatever bytes the
//! transport produced and emit complete units as they become available.

pub mod error;
pub mod json;
pub mod message;
pub mod xml;

pub use error::{ProtocolError, ProtocolResult};
pub use json::{DecodePolicy, JsonDecoder};
pub use message::{
    change_request, get_properties_request, kind_of_new_tag, updates_from_element, Deletion,
    ItemUpdate, ItemUpdates, Message, Notice, UpdateItem, UpdateVector, PROTOCOL_VERSION,
};
pub use xml::{
    definition_xml, deletion_xml, protocol_switch_ack, update_xml, update_xml_with_timestamp,
    wire_timestamp, XmlElement, XmlTokenizer,
};

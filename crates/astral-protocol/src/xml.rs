//! Streamed XML tokenizer and the driver-side serializers
//!
//! The driver wire is a stream of elements with no enclosing root, and
//! with no end in normal operation. The tokenizer is fed whatever text
//! the transport produced and emits each top-level element once it is
//! complete; elements split across chunk boundaries stay buffered.

use crate::error::{ProtocolError, ProtocolResult};
use crate::json::DecodePolicy;
use astral_core::{Item, ItemValue, Property, PropertyKind};
use tracing::debug;

/// Maximum buffered input (64MB; BLOB payloads travel base64-encoded)
const MAX_ELEMENT_SIZE: usize = 64 * 1024 * 1024;

/// One parsed element: tag, attributes in document order, child elements
/// and accumulated text content.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text content with surrounding whitespace removed
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Incremental element tokenizer
pub struct XmlTokenizer {
    buffer: String,
    policy: DecodePolicy,
}

enum ParseFail {
    /// More input needed; buffer is kept as-is
    Incomplete,
    Malformed(&'static str),
}

impl XmlTokenizer {
    pub fn new() -> Self {
        Self::with_policy(DecodePolicy::default())
    }

    pub fn with_policy(policy: DecodePolicy) -> Self {
        Self {
            buffer: String::with_capacity(4096),
            policy,
        }
    }

    /// Add text to the tokenizer buffer
    pub fn feed(&mut self, text: &str) -> ProtocolResult<()> {
        if self.buffer.len() + text.len() > MAX_ELEMENT_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + text.len(),
                max: MAX_ELEMENT_SIZE,
            });
        }
        self.buffer.push_str(text);
        Ok(())
    }

    /// Discard all buffered input
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Try to parse the next complete top-level element from the buffer
    pub fn next(&mut self) -> ProtocolResult<Option<XmlElement>> {
        loop {
            if !self.skip_noise() {
                return Ok(None);
            }
            if self.buffer.is_empty() {
                return Ok(None);
            }
            if !self.buffer.starts_with('<') {
                match self.policy {
                    DecodePolicy::Strict => {
                        self.buffer.clear();
                        return Err(ProtocolError::InvalidXml(
                            "text outside of any element".into(),
                        ));
                    }
                    DecodePolicy::Lenient => {
                        debug!("skipping stray text between elements");
                        self.drop_to_next_tag();
                        continue;
                    }
                }
            }

            let mut pos = 0usize;
            match parse_element_at(&self.buffer, &mut pos) {
                Ok(element) => {
                    self.buffer.drain(..pos);
                    return Ok(Some(element));
                }
                Err(ParseFail::Incomplete) => return Ok(None),
                Err(ParseFail::Malformed(why)) => match self.policy {
                    DecodePolicy::Strict => {
                        self.buffer.clear();
                        return Err(ProtocolError::InvalidXml(why.into()));
                    }
                    DecodePolicy::Lenient => {
                        debug!(error = why, "skipping malformed XML fragment");
                        self.drop_to_next_tag();
                    }
                },
            }
        }
    }

    /// Drop whitespace, declarations and comments ahead of the next
    /// element. Returns `false` when the buffer ends inside one of them.
    fn skip_noise(&mut self) -> bool {
        loop {
            let trimmed = self.buffer.trim_start().len();
            let cut = self.buffer.len() - trimmed;
            if cut > 0 {
                self.buffer.drain(..cut);
            }

            if self.buffer.starts_with("<?") {
                match self.buffer.find("?>") {
                    Some(end) => {
                        self.buffer.drain(..end + 2);
                        continue;
                    }
                    None => return false,
                }
            }
            if self.buffer.starts_with("<!--") {
                match self.buffer.find("-->") {
                    Some(end) => {
                        self.buffer.drain(..end + 3);
                        continue;
                    }
                    None => return false,
                }
            }
            if self.buffer.starts_with("<!") {
                match self.buffer.find('>') {
                    Some(end) => {
                        self.buffer.drain(..end + 1);
                        continue;
                    }
                    None => return false,
                }
            }
            return true;
        }
    }

    /// Recovery: drop the first character, then everything up to the next
    /// tag open.
    fn drop_to_next_tag(&mut self) {
        let mut chars = self.buffer.chars();
        let first = chars.next().map(char::len_utf8).unwrap_or(0);
        self.buffer.drain(..first);
        match self.buffer.find('<') {
            Some(pos) => {
                self.buffer.drain(..pos);
            }
            None => self.buffer.clear(),
        }
    }
}

impl Default for XmlTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b':' || b == b'.'
}

fn skip_ws(input: &str, pos: &mut usize) {
    let bytes = input.as_bytes();
    while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

fn expect_byte(input: &str, pos: &mut usize, expected: u8) -> Result<(), ParseFail> {
    let bytes = input.as_bytes();
    if *pos >= bytes.len() {
        return Err(ParseFail::Incomplete);
    }
    if bytes[*pos] != expected {
        return Err(ParseFail::Malformed("unexpected character"));
    }
    *pos += 1;
    Ok(())
}

fn read_name(input: &str, pos: &mut usize) -> Result<String, ParseFail> {
    let bytes = input.as_bytes();
    let start = *pos;
    while *pos < bytes.len() && is_name_char(bytes[*pos]) {
        *pos += 1;
    }
    if *pos == bytes.len() {
        // The name may continue in the next chunk
        return Err(ParseFail::Incomplete);
    }
    if *pos == start {
        return Err(ParseFail::Malformed("empty name"));
    }
    Ok(input[start..*pos].to_string())
}

/// Parse one element starting at `pos` (which must point at `<`).
/// Advances `pos` past the element on success only.
fn parse_element_at(input: &str, pos: &mut usize) -> Result<XmlElement, ParseFail> {
    let bytes = input.as_bytes();
    expect_byte(input, pos, b'<')?;
    let name = read_name(input, pos)?;
    let mut attributes = Vec::new();

    // Attribute list, until '>' or '/>'
    loop {
        skip_ws(input, pos);
        if *pos >= bytes.len() {
            return Err(ParseFail::Incomplete);
        }
        match bytes[*pos] {
            b'>' => {
                *pos += 1;
                break;
            }
            b'/' => {
                if *pos + 1 >= bytes.len() {
                    return Err(ParseFail::Incomplete);
                }
                if bytes[*pos + 1] != b'>' {
                    return Err(ParseFail::Malformed("expected '/>'"));
                }
                *pos += 2;
                return Ok(XmlElement {
                    name,
                    attributes,
                    children: Vec::new(),
                    text: String::new(),
                });
            }
            _ => {
                let attr = read_name(input, pos)?;
                skip_ws(input, pos);
                expect_byte(input, pos, b'=')?;
                skip_ws(input, pos);
                if *pos >= bytes.len() {
                    return Err(ParseFail::Incomplete);
                }
                let quote = bytes[*pos];
                if quote != b'\'' && quote != b'"' {
                    return Err(ParseFail::Malformed("attribute value must be quoted"));
                }
                *pos += 1;
                let rest = &input[*pos..];
                let Some(end) = rest.find(quote as char) else {
                    return Err(ParseFail::Incomplete);
                };
                attributes.push((attr, unescape(&rest[..end])));
                *pos += end + 1;
            }
        }
    }

    // Content: text, child elements and comments, until the closing tag
    let mut children = Vec::new();
    let mut text = String::new();
    loop {
        let rest = &input[*pos..];
        let Some(lt) = rest.find('<') else {
            return Err(ParseFail::Incomplete);
        };
        text.push_str(&unescape(&rest[..lt]));
        *pos += lt;

        if input[*pos..].starts_with("</") {
            *pos += 2;
            let closing = read_name(input, pos)?;
            skip_ws(input, pos);
            expect_byte(input, pos, b'>')?;
            if closing != name {
                return Err(ParseFail::Malformed("mismatched closing tag"));
            }
            return Ok(XmlElement {
                name,
                attributes,
                children,
                text,
            });
        }
        if input[*pos..].starts_with("<!--") {
            match input[*pos..].find("-->") {
                Some(end) => {
                    *pos += end + 3;
                    continue;
                }
                None => return Err(ParseFail::Incomplete),
            }
        }
        if *pos + 1 >= bytes.len() {
            return Err(ParseFail::Incomplete);
        }
        children.push(parse_element_at(input, pos)?);
    }
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let replacement = match &rest[1..semi] {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                _ => return None,
            };
            Some((replacement, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                // Unknown entity, keep it verbatim
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Timestamp in the format the wire expects
pub fn wire_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Serialize a property definition (`def{Kind}Vector`).
///
/// Emitting a definition announces the property; call this exactly once
/// per property, at the point the application decides it is ready to be
/// announced.
pub fn definition_xml(prop: &Property) -> String {
    let kind = prop.kind();
    let mut out = format!(
        "<def{}Vector device='{}' name='{}' group='{}' label='{}' state='{}'",
        kind,
        escape(prop.device()),
        escape(prop.name()),
        escape(prop.group()),
        escape(prop.label()),
        prop.state()
    );
    if kind != PropertyKind::Light {
        out.push_str(&format!(
            " perm='{}' timeout='{}'",
            prop.perm(),
            prop.timeout()
        ));
    }
    if let Some(rule) = prop.rule() {
        out.push_str(&format!(" rule='{}'", rule));
    }
    if let Some(hints) = prop.hints() {
        out.push_str(&format!(" hints='{}'", escape(hints)));
    }
    out.push_str(">\n");
    for item in prop.items() {
        out.push_str(&item_definition_xml(kind, item));
    }
    out.push_str(&format!("</def{}Vector>\n", kind));
    out
}

fn item_definition_xml(kind: PropertyKind, item: &Item) -> String {
    let mut out = format!(
        "  <def{} name='{}' label='{}'",
        kind,
        escape(item.name()),
        escape(item.label())
    );
    if let Some(hints) = item.hints() {
        out.push_str(&format!(" hints='{}'", escape(hints)));
    }
    if let ItemValue::Number {
        format: fmt,
        min,
        max,
        step,
        ..
    } = item.value()
    {
        out.push_str(&format!(
            " format='{}' min='{}' max='{}' step='{}'",
            escape(fmt),
            escape(min),
            escape(max),
            escape(step)
        ));
    }
    out.push_str(&format!(
        ">{}</def{}>\n",
        escape(&item.value_text()),
        kind
    ));
    out
}

/// Serialize a property update (`set{Kind}Vector`) with a freshly
/// generated timestamp. May be called any number of times per property.
pub fn update_xml(prop: &Property, message: Option<&str>) -> String {
    update_xml_with_timestamp(prop, message, &wire_timestamp())
}

/// Deterministic [`update_xml`] variant
pub fn update_xml_with_timestamp(
    prop: &Property,
    message: Option<&str>,
    timestamp: &str,
) -> String {
    let kind = prop.kind();
    let mut out = format!(
        "<set{}Vector device='{}' name='{}' state='{}' timestamp='{}'",
        kind,
        escape(prop.device()),
        escape(prop.name()),
        prop.state(),
        escape(timestamp)
    );
    if let Some(msg) = message {
        out.push_str(&format!(" message='{}'", escape(msg)));
    }
    out.push_str(">\n");
    for item in prop.items() {
        out.push_str(&item_update_xml(kind, item));
    }
    out.push_str(&format!("</set{}Vector>\n", kind));
    out
}

fn item_update_xml(kind: PropertyKind, item: &Item) -> String {
    let mut out = format!("  <one{} name='{}'", kind, escape(item.name()));
    if let ItemValue::Blob {
        size, format: fmt, ..
    } = item.value()
    {
        out.push_str(&format!(" size='{}' format='{}'", size, escape(fmt)));
    }
    out.push_str(&format!(
        ">{}</one{}>\n",
        escape(&item.value_text()),
        kind
    ));
    out
}

/// Acknowledgement for a requested protocol switch
pub fn protocol_switch_ack(version: &str) -> String {
    format!("<switchProtocol version='{}'/>\n", escape(version))
}

/// Announce removal of one property, or of the whole device when `name`
/// is `None`.
pub fn deletion_xml(device: &str, name: Option<&str>) -> String {
    match name {
        Some(n) => format!(
            "<deleteProperty device='{}' name='{}'/>\n",
            escape(device),
            escape(n)
        ),
        None => format!("<deleteProperty device='{}'/>\n", escape(device)),
    }
}

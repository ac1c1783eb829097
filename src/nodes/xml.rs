use std::io::Write;

use async_trait::async_trait;
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    name::ResolveResult,
    reader::NsReader,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    message::{Message, CONTENT_TYPE_NATIVE, CONTENT_TYPE_XML},
    node::{ExecutionResult, NodeContext, NodeError, NodeType},
    nodes::json::kind_of,
};

const ATTR_PREFIX: char = '@';
const TEXT_KEY: &str = "#text";

/// Parses an XML text payload into a nested dictionary.
///
/// Attributes become `@name` keys, character data next to child elements
/// goes under `#text`, repeated children collapse into an array and an empty
/// element maps to `null`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct XmlToNative {
    /// Expand names to `namespace-uri:local` and drop `xmlns` declarations.
    #[serde(default)]
    pub process_namespaces: bool,
}

/// Serializes a single-rooted dictionary back to XML text.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NativeToXml {
    #[serde(default)]
    pub pretty: bool,
}

struct Frame {
    name: String,
    attrs: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn into_value(self) -> Value {
        if self.attrs.is_empty() && self.children.is_empty() {
            return if self.text.is_empty() { Value::Null } else { Value::String(self.text) };
        }
        let mut out = self.attrs;
        out.extend(self.children);
        if !self.text.is_empty() {
            out.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(out)
    }
}

fn push_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

fn invalid(e: impl std::fmt::Display) -> NodeError {
    NodeError::InvalidInput(format!("malformed XML payload: {e}"))
}

fn utf8(bytes: &[u8]) -> Result<String, NodeError> {
    std::str::from_utf8(bytes).map(str::to_string).map_err(invalid)
}

fn expanded(resolved: ResolveResult, local: &[u8]) -> Result<String, NodeError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(format!("{}:{}", utf8(ns.as_ref())?, utf8(local)?)),
        ResolveResult::Unbound => utf8(local),
        ResolveResult::Unknown(prefix) => Err(invalid(format!(
            "unknown namespace prefix `{}`",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

impl XmlToNative {
    fn open(&self, reader: &NsReader<&[u8]>, name: String, start: &BytesStart) -> Result<Frame, NodeError> {
        let mut attrs = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(invalid)?;
            let key = if self.process_namespaces {
                if attr.key.as_namespace_binding().is_some() {
                    continue;
                }
                let (resolved, local) = reader.resolve_attribute(attr.key);
                expanded(resolved, local.as_ref())?
            } else {
                utf8(attr.key.as_ref())?
            };
            let value = attr.unescape_value().map_err(invalid)?;
            attrs.insert(format!("{ATTR_PREFIX}{key}"), Value::String(value.into_owned()));
        }
        Ok(Frame { name, attrs, children: Map::new(), text: String::new() })
    }

    fn element_name(&self, resolved: ResolveResult, start: &BytesStart) -> Result<String, NodeError> {
        if self.process_namespaces {
            expanded(resolved, start.local_name().as_ref())
        } else {
            utf8(start.name().as_ref())
        }
    }

    fn decode(&self, xml: &str) -> Result<Value, NodeError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<(String, Value)> = None;

        loop {
            let (resolved, event) = reader.read_resolved_event().map_err(invalid)?;
            let closed = match event {
                Event::Start(start) => {
                    let name = self.element_name(resolved, &start)?;
                    let frame = self.open(&reader, name, &start)?;
                    stack.push(frame);
                    None
                }
                Event::Empty(start) => {
                    let name = self.element_name(resolved, &start)?;
                    Some(self.open(&reader, name, &start)?)
                }
                Event::End(_) => stack.pop(),
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape().map_err(invalid)?);
                    }
                    None
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&utf8(&data)?);
                    }
                    None
                }
                Event::Eof => break,
                _ => None,
            };

            let Some(frame) = closed else { continue };
            let name = frame.name.clone();
            let value = frame.into_value();
            match stack.last_mut() {
                Some(parent) => push_child(&mut parent.children, name, value),
                None if root.is_some() => return Err(invalid("more than one root element")),
                None => root = Some((name, value)),
            }
        }

        if !stack.is_empty() {
            return Err(invalid("unexpected end of document"));
        }
        let (name, value) = root.ok_or_else(|| invalid("no root element"))?;
        let mut doc = Map::new();
        doc.insert(name, value);
        Ok(Value::Object(doc))
    }
}

#[async_trait]
#[typetag::serde(name = "xml_to_native")]
impl NodeType for XmlToNative {
    fn type_name(&self) -> String {
        "xml_to_native".to_string()
    }

    fn process(&self, mut msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        let decoded = match msg.payload() {
            Value::String(xml) => self.decode(xml),
            other => Err(NodeError::InvalidInput(format!(
                "expected an XML text payload, got {}",
                kind_of(other)
            ))),
        };
        match decoded {
            Ok(value) => {
                msg.set_payload(value);
                msg.set_content_type(CONTENT_TYPE_NATIVE);
                ExecutionResult::Continue(msg)
            }
            Err(e) => ExecutionResult::Error(e),
        }
    }
}

fn encode_failed(e: impl std::fmt::Display) -> NodeError {
    NodeError::ExecutionFailed(format!("could not encode XML: {e}"))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        _ => None,
    }
}

fn unencodable(name: &str, what: &str) -> NodeError {
    NodeError::InvalidInput(format!("cannot encode `{name}` as XML: {what}"))
}

fn write_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &Value) -> Result<(), NodeError> {
    match value {
        Value::Array(items) => {
            for item in items {
                if item.is_array() {
                    return Err(unencodable(name, "a list nested in a list"));
                }
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        Value::Null => writer.write_event(Event::Empty(BytesStart::new(name))).map_err(encode_failed),
        Value::Object(fields) => {
            let mut start = BytesStart::new(name);
            let mut text = None;
            let mut children = Vec::new();
            for (key, field) in fields {
                if let Some(attr) = key.strip_prefix(ATTR_PREFIX) {
                    let attr_value = scalar_text(field)
                        .ok_or_else(|| unencodable(key, &format!("{} attribute value", kind_of(field))))?;
                    start.push_attribute((attr, attr_value.as_str()));
                } else if key == TEXT_KEY {
                    let value = scalar_text(field)
                        .ok_or_else(|| unencodable(name, &format!("{} as text", kind_of(field))))?;
                    text = Some(value);
                } else {
                    children.push((key, field));
                }
            }
            if text.is_none() && children.is_empty() {
                return writer.write_event(Event::Empty(start)).map_err(encode_failed);
            }
            writer.write_event(Event::Start(start)).map_err(encode_failed)?;
            if let Some(text) = text {
                writer.write_event(Event::Text(BytesText::new(&text))).map_err(encode_failed)?;
            }
            for (key, field) in children {
                write_element(writer, key, field)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name))).map_err(encode_failed)
        }
        scalar => {
            let text = scalar_text(scalar).unwrap_or_default();
            writer.write_event(Event::Start(BytesStart::new(name))).map_err(encode_failed)?;
            writer.write_event(Event::Text(BytesText::new(&text))).map_err(encode_failed)?;
            writer.write_event(Event::End(BytesEnd::new(name))).map_err(encode_failed)
        }
    }
}

impl NativeToXml {
    fn encode(&self, doc: &Value) -> Result<String, NodeError> {
        let Value::Object(fields) = doc else {
            return Err(NodeError::InvalidInput(format!(
                "XML document must be an object with one root, got {}",
                kind_of(doc)
            )));
        };
        let mut roots = fields.iter();
        let (Some((name, value)), None) = (roots.next(), roots.next()) else {
            return Err(NodeError::InvalidInput(format!(
                "XML document must have exactly one root, got {}",
                fields.len()
            )));
        };
        if matches!(value, Value::Array(_)) {
            return Err(NodeError::InvalidInput("XML root cannot be a list".to_string()));
        }

        let mut writer = if self.pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(encode_failed)?;
        write_element(&mut writer, name, value)?;
        String::from_utf8(writer.into_inner()).map_err(encode_failed)
    }
}

#[async_trait]
#[typetag::serde(name = "native_to_xml")]
impl NodeType for NativeToXml {
    fn type_name(&self) -> String {
        "native_to_xml".to_string()
    }

    fn process(&self, mut msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        match self.encode(msg.payload()) {
            Ok(text) => {
                msg.set_payload(Value::String(text));
                msg.set_content_type(CONTENT_TYPE_XML);
                ExecutionResult::Continue(msg)
            }
            Err(e) => ExecutionResult::Error(e),
        }
    }
}

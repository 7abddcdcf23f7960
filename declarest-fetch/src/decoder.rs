//! Response decoders.
//!
//! Every decoder produces a list of records. Which decoder a stream uses is
//! fixed when its requester is built.

use declarest_core::{DecodeError, Decoder, HttpResponse};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

// ============================================================================
// JSON
// ============================================================================

/// Decodes a JSON body.
///
/// A top-level array yields one record per element, `null` or an empty body
/// yields nothing, and any other value is a single record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError> {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        Ok(match serde_json::from_slice(&response.body)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }
}

// ============================================================================
// JSON Lines
// ============================================================================

/// Decodes newline-delimited JSON, one record per non-blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl Decoder for JsonLinesDecoder {
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError> {
        let text = response.text()?;
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| DecodeError::JsonLine {
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }
}

// ============================================================================
// XML
// ============================================================================

/// Decodes an XML document into JSON records.
///
/// Elements become objects, attributes become `@name` keys, and repeated
/// child elements become arrays. Text-only elements become strings; text
/// next to attributes or children is kept under `#text`.
///
/// If the root element holds nothing but one kind of child element
/// (`<items><item/><item/></items>`), each child is a record, even when
/// there is only one. Otherwise the root's content is a single record.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDecoder;

/// An element whose end tag has not been read yet.
struct OpenElement {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn start(element: &BytesStart<'_>) -> Result<Self, DecodeError> {
        let mut fields = Map::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| DecodeError::Xml(e.to_string()))?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.local_name().as_ref()));
            let value = attr
                .unescape_value()
                .map_err(|e| DecodeError::Xml(e.to_string()))?;
            fields.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name: String::from_utf8_lossy(element.local_name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn finish(mut self) -> (String, Value) {
        let value = if self.fields.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            }
        } else {
            if !self.text.is_empty() {
                self.fields.insert("#text".to_string(), Value::String(self.text));
            }
            Value::Object(self.fields)
        };
        (self.name, value)
    }
}

fn insert_child(fields: &mut Map<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

fn close(stack: &mut Vec<OpenElement>, root: &mut Option<Value>, element: OpenElement) {
    let (name, value) = element.finish();
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.fields, name, value),
        None => *root = Some(value),
    }
}

fn into_records(root: Value) -> Vec<Value> {
    match root {
        Value::Null => Vec::new(),
        Value::Object(mut fields) if fields.len() == 1 => {
            let record_child = fields.iter().next().is_some_and(|(key, value)| {
                !key.starts_with(['@', '#']) && (value.is_array() || value.is_object())
            });
            if !record_child {
                return vec![Value::Object(fields)];
            }
            match fields.values_mut().next().map(Value::take) {
                Some(Value::Array(items)) => items,
                Some(record) => vec![record],
                None => Vec::new(),
            }
        }
        other => vec![other],
    }
}

impl Decoder for XmlDecoder {
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>, DecodeError> {
        let text = response.text()?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<Value> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(OpenElement::start(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = OpenElement::start(&e)?;
                    close(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    let Some(element) = stack.pop() else {
                        return Err(DecodeError::Xml("unexpected closing tag".to_string()));
                    };
                    close(&mut stack, &mut root, element);
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|e| DecodeError::Xml(e.to_string()))?;
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DecodeError::Xml(format!(
                        "{e} at byte {}",
                        reader.buffer_position()
                    )));
                }
                // Declarations, comments, processing instructions, doctype
                Ok(_) => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DecodeError::Xml(format!("unclosed element <{}>", open.name)));
        }

        Ok(root.map(into_records).unwrap_or_default())
    }
}

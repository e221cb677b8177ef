//! XML parsing and XML-to-structure conversion.
//!
//! Response bodies are parsed into an owned [`Element`] tree, which can then be
//! flattened into a [`Structure`]: attributes become `@name` fields, repeated
//! child tags become lists, and text next to children is kept under `#text`.
//! Ordering between different tag names is not preserved.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

use super::error::{ApiError, Result};

/// Prefix for fields derived from attributes.
pub const ATTRIBUTE_PREFIX: char = '@';

/// Field holding the direct text of a node that also has children or attributes.
pub const TEXT_FIELD: &str = "#text";

/// A parsed XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Direct text content, concatenated and not trimmed.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The first child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// The trimmed text, or `None` when blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ApiError::MalformedResponse(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            tag,
            attributes,
            ..Self::default()
        })
    }
}

/// Structured view of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Structure {
    /// A leaf with no text.
    Empty,
    Text(String),
    Map(BTreeMap<String, Structure>),
    /// Same-tag siblings in document order.
    List(Vec<Structure>),
}

impl Structure {
    /// Text of a `Text` node.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Structure::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Look up a field of a `Map` node.
    pub fn get(&self, key: &str) -> Option<&Structure> {
        match self {
            Structure::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Iterate a field that may hold one structure or a list of them.
    pub fn items(&self) -> impl Iterator<Item = &Structure> {
        let slice = match self {
            Structure::List(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        slice.iter()
    }
}

/// Parse an XML document into its root element.
pub fn parse(body: &str) -> Result<Element> {
    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        match event {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ApiError::MalformedResponse("unexpected end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(&mut stack, &text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ApiError::MalformedResponse(format!(
            "unclosed element <{}>",
            open.tag
        )));
    }
    root.ok_or_else(|| ApiError::MalformedResponse("document has no root element".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(ApiError::MalformedResponse(format!(
            "second root element <{}>",
            element.tag
        )));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(current) => {
            current.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ApiError::MalformedResponse(
            "text outside of the root element".into(),
        )),
    }
}

/// Convert an element into a [`Structure`].
pub fn convert(element: &Element) -> Structure {
    if element.children.is_empty() && element.attributes.is_empty() {
        return match element.trimmed_text() {
            Some(text) => Structure::Text(text.to_string()),
            None => Structure::Empty,
        };
    }

    let mut grouped: BTreeMap<String, Vec<Structure>> = BTreeMap::new();
    for child in &element.children {
        grouped
            .entry(child.tag.clone())
            .or_default()
            .push(convert(child));
    }

    let mut fields: BTreeMap<String, Structure> = grouped
        .into_iter()
        .map(|(tag, mut items)| {
            let value = if items.len() == 1 {
                items.remove(0)
            } else {
                Structure::List(items)
            };
            (tag, value)
        })
        .collect();

    for (name, value) in &element.attributes {
        fields.insert(
            format!("{ATTRIBUTE_PREFIX}{name}"),
            Structure::Text(value.clone()),
        );
    }

    if let Some(text) = element.trimmed_text() {
        fields.insert(TEXT_FIELD.to_string(), Structure::Text(text.to_string()));
    }

    Structure::Map(fields)
}

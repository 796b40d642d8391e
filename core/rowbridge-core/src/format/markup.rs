//! Nested-tag markup (XML).
//!
//! [`parse_tree`] turns a document into an owned [`Element`] tree with
//! `quick-xml`; [`write_tree`] serializes one back. The codec itself only
//! wires these to the fold engine, which does the flattening.

use crate::error::{BridgeError, BridgeResult};
use crate::fold::{CompiledFold, FoldSpec};
use crate::format::{Codec, Decoded, FormatOptions, RawInput};
use crate::table::Row;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fmt;

/// Element node of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value by position in document order.
    pub fn attribute_at(&self, occurrence: usize) -> Option<&str> {
        self.attributes.get(occurrence).map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.collect_text(out),
            }
        }
    }

    /// Visit every descendant element in document order (pre-order).
    pub fn for_each_descendant<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        for child in self.child_elements() {
            visit(child);
            child.for_each_descendant(visit);
        }
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }
}

// ════════════════════════════════════════════
// Reading
// ════════════════════════════════════════════

fn line_of(text: &str, position: usize) -> usize {
    let end = position.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count()
}

fn owned_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn open_element(start: &BytesStart<'_>, line: usize) -> BridgeResult<Element> {
    let mut element = Element::new(owned_name(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|err| BridgeError::parse(line, err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| BridgeError::parse(line, err.to_string()))?;
        element
            .attributes
            .push((owned_name(attr.key.as_ref()), value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
    line: usize,
) -> BridgeResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(element);
    } else if root.is_some() {
        return Err(BridgeError::parse(line, "document has more than one root element"));
    } else {
        *root = Some(element);
    }
    Ok(())
}

/// Parse a document into its root element.
///
/// Whitespace-only text is dropped; the reported record index of a
/// [`BridgeError::Parse`] is the 0-based line of the failure.
pub fn parse_tree(text: &str) -> BridgeResult<Element> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                let line = line_of(text, reader.buffer_position() as usize);
                return Err(BridgeError::parse(line, err.to_string()));
            }
        };
        let line = line_of(text, reader.buffer_position() as usize);
        match event {
            Event::Start(start) => stack.push(open_element(&start, line)?),
            Event::Empty(start) => {
                let element = open_element(&start, line)?;
                attach(&mut stack, &mut root, element, line)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| BridgeError::parse(line, "unexpected closing tag"))?;
                attach(&mut stack, &mut root, element, line)?;
            }
            Event::Text(content) => {
                if let Some(top) = stack.last_mut() {
                    let value = content
                        .unescape()
                        .map_err(|err| BridgeError::parse(line, err.to_string()))?;
                    if !value.is_empty() {
                        top.push_text(value.into_owned());
                    }
                }
            }
            Event::CData(content) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(String::from_utf8_lossy(&content.into_inner()).into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(BridgeError::parse(
            line_of(text, text.len()),
            format!("element <{}> is never closed", open.name),
        ));
    }
    root.ok_or_else(|| BridgeError::parse(0, "document has no root element"))
}

// ════════════════════════════════════════════
// Writing
// ════════════════════════════════════════════

fn write_failed(err: impl fmt::Display) -> BridgeError {
    BridgeError::Schema(format!("cannot serialize markup: {err}"))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> BridgeResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_failed)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(write_failed)?;
    for node in &element.children {
        match node {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_failed)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_failed)?;
    Ok(())
}

/// Serialize `root` as an indented UTF-8 document with an XML declaration.
pub fn write_tree(root: &Element) -> BridgeResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_failed)?;
    write_element(&mut writer, root)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

// ════════════════════════════════════════════
// Codec
// ════════════════════════════════════════════

pub struct MarkupCodec;

fn fold_spec(options: &FormatOptions) -> BridgeResult<&FoldSpec> {
    match options {
        FormatOptions::Markup(spec) => Ok(spec),
        other => Err(other.mismatch("markup")),
    }
}

impl Codec for MarkupCodec {
    fn validate(&self, options: &FormatOptions) -> BridgeResult<()> {
        CompiledFold::compile(fold_spec(options)?).map(|_| ())
    }

    fn decode(&self, input: RawInput, options: &FormatOptions) -> BridgeResult<Decoded> {
        let fold = CompiledFold::compile(fold_spec(options)?)?;
        let text = input.into_text()?;
        let root = parse_tree(&text)?;
        let records = fold.flatten(&root)?;
        Ok(Decoded::new(records).with_columns(fold.columns().to_vec()))
    }

    fn encode(
        &self,
        columns: &[String],
        rows: &[Row],
        options: &FormatOptions,
    ) -> BridgeResult<Vec<u8>> {
        let fold = CompiledFold::compile(fold_spec(options)?)?;
        let root = fold.encode(columns, rows)?;
        write_tree(&root)
    }

    fn known_columns(&self, options: &FormatOptions) -> Option<Vec<String>> {
        let spec = fold_spec(options).ok()?;
        CompiledFold::compile(spec).ok().map(|fold| fold.columns().to_vec())
    }
}

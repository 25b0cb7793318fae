//! Untyped XML response tree.
//!
//! Both upstream APIs answer with loosely specified XML. A response is
//! decoded once into a [`RawNode`] tree and then read through the
//! extraction helpers in [`crate::extract`]; nothing downstream touches
//! XML events directly.
//!
//! A node holds optional scalar text, attributes and named children. A
//! child name that repeats under one parent becomes an ordered sequence,
//! so `<author>A</author><author>B</author>` is one `author` entry with
//! two nodes.

use crate::error::{OptionExt, Result, ScholarError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One element of a decoded response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawNode {
    text: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<(String, Children)>,
}

/// Children stored under one element name.
#[derive(Debug, Clone, PartialEq)]
pub enum Children {
    One(RawNode),
    Many(Vec<RawNode>),
}

/// A borrowed view of whatever sits under a name: an attribute value,
/// a single child element, or a repeated child element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Scalar(&'a str),
    Node(&'a RawNode),
    Sequence(&'a [RawNode]),
}

impl Children {
    fn as_field(&self) -> Field<'_> {
        match self {
            Children::One(node) => Field::Node(node),
            Children::Many(nodes) => Field::Sequence(nodes),
        }
    }
}

impl RawNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the scalar text (stored trimmed, dropped when blank).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text.into());
        self
    }

    /// Builder: add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder: append a child element.
    pub fn with_child(mut self, name: impl Into<String>, child: RawNode) -> Self {
        self.push_child(name.into(), child);
        self
    }

    /// Append a child, turning a repeated name into a sequence.
    pub fn push_child(&mut self, name: String, child: RawNode) {
        if let Some((_, existing)) = self.children.iter_mut().find(|(n, _)| *n == name) {
            match existing {
                Children::Many(nodes) => nodes.push(child),
                Children::One(_) => {
                    if let Children::One(first) =
                        std::mem::replace(existing, Children::Many(Vec::new()))
                    {
                        *existing = Children::Many(vec![first, child]);
                    }
                }
            }
        } else {
            self.children.push((name, Children::One(child)));
        }
    }

    fn set_text(&mut self, text: String) {
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    /// Direct scalar text of this element, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Children> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Look up a name among attributes first, then child elements.
    pub fn get(&self, name: &str) -> Option<Field<'_>> {
        self.attribute(name)
            .map(Field::Scalar)
            .or_else(|| self.child(name).map(Children::as_field))
    }

    /// Number of named entries (attributes plus distinct child names).
    pub fn entry_count(&self) -> usize {
        self.attributes.len() + self.children.len()
    }

    /// The only named entry of this node, when there is exactly one.
    pub fn sole_entry(&self) -> Option<(&str, Field<'_>)> {
        if self.entry_count() != 1 {
            return None;
        }
        if let Some((name, value)) = self.attributes.first() {
            return Some((name.as_str(), Field::Scalar(value.as_str())));
        }
        self.children
            .first()
            .map(|(name, children)| (name.as_str(), children.as_field()))
    }

    /// Decode an XML document into its root element.
    ///
    /// # Errors
    ///
    /// Returns [`ScholarError::Parse`] for malformed XML, unbalanced tags
    /// or a document without a root element.
    pub fn parse_xml(xml: &str) -> Result<RawNode> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        // (element name, node under construction, collected text segments)
        let mut stack: Vec<(String, RawNode, Vec<String>)> = Vec::new();
        let mut root: Option<RawNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let (name, node) = open_element(&e)?;
                    stack.push((name, node, Vec::new()));
                }
                Event::Empty(e) => {
                    let (name, node) = open_element(&e)?;
                    attach(&mut stack, &mut root, name, node);
                }
                Event::Text(t) => {
                    if let Some((_, _, segments)) = stack.last_mut() {
                        segments.push(t.unescape()?.into_owned());
                    }
                }
                Event::CData(c) => {
                    if let Some((_, _, segments)) = stack.last_mut() {
                        segments.push(String::from_utf8_lossy(&c.into_inner()).into_owned());
                    }
                }
                Event::End(_) => {
                    let (name, mut node, segments) = stack
                        .pop()
                        .ok_or_parse("closing tag without matching opening tag")?;
                    node.set_text(segments.join(" "));
                    attach(&mut stack, &mut root, name, node);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some((name, _, _)) = stack.last() {
            return Err(ScholarError::Parse(format!("unclosed element <{}>", name)));
        }
        root.ok_or_parse("document has no root element")
    }
}

fn open_element(e: &BytesStart<'_>) -> Result<(String, RawNode)> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = RawNode::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ScholarError::Parse(format!("attribute in <{}>: {}", name, err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }
    Ok((name, node))
}

fn attach(
    stack: &mut [(String, RawNode, Vec<String>)],
    root: &mut Option<RawNode>,
    name: String,
    node: RawNode,
) {
    match stack.last_mut() {
        Some((_, parent, _)) => parent.push_child(name, node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

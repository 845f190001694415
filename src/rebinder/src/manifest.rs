//! Manifest document model
//!
//! A manifest is a small XML tree. [`Node`] keeps it as plain owned data so
//! the engine can walk it without holding a reader, and so the writer output
//! is fully determined by the tree (attribute order is insertion order).

use std::borrow::Cow;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::{Error, Result};

/// Where a field's text lives relative to its owning node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `<owner><key>text</key></owner>`
    Element,
    /// `<owner key="text"/>`
    Attribute,
    /// `<owner>text</owner>`; the key is ignored
    Text,
}

/// One element of a manifest document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Node>,
}

fn xml_error(err: impl Display) -> Error {
    Error::Xml(err.to_string())
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Append a child and return a handle to it
    pub fn push(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn push_text(&mut self, name: &str, text: impl Into<String>) {
        self.children.push(Node::with_text(name, text));
    }

    /// Raw text stored for `key` under the given placement
    pub fn value(&self, key: &str, placement: Placement) -> Option<&str> {
        match placement {
            Placement::Element => self.child(key).map(|c| c.text.as_str()),
            Placement::Attribute => self.attribute(key),
            Placement::Text => Some(self.text.as_str()),
        }
    }

    pub fn set_value(&mut self, key: &str, placement: Placement, value: String) {
        match placement {
            Placement::Element => match self.child_mut(key) {
                Some(child) => child.text = value,
                None => self.push_text(key, value),
            },
            Placement::Attribute => self.set_attribute(key, value),
            Placement::Text => self.text = value,
        }
    }

    /// Parse a document and return its root element.
    ///
    /// Text is kept verbatim, including leading and trailing whitespace,
    /// because entry names and roots may legitimately contain it.
    pub fn parse(xml: &str) -> Result<Node> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => stack.push(element(&start)?),
                Event::Empty(start) => attach(&mut stack, &mut root, element(&start)?)?,
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| Error::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| Error::Xml("document has no root element".to_string()))
    }

    /// Serialize as an indented UTF-8 document
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;
        self.write_into(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }

    fn write_into(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if self.children.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_error)?;
        } else {
            for child in &self.children {
                child.write_into(writer)?;
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }

    /// Load a manifest file; a missing file is [`Error::FileNotFound`]
    pub fn load(path: &Path) -> Result<Node> {
        let xml = match fs::read_to_string(path) {
            Ok(xml) => xml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Node::parse(xml.strip_prefix('\u{feff}').unwrap_or(&xml))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml()?)?;
        Ok(())
    }
}

fn element(start: &BytesStart) -> Result<Node> {
    let mut node = Node::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value: Cow<str> = attr.unescape_value().map_err(xml_error)?;
        node.attributes.push((key, value.into_owned()));
    }
    Ok(node)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        Ok(())
    } else if root.is_some() {
        Err(Error::Xml("document has more than one root element".to_string()))
    } else {
        *root = Some(node);
        Ok(())
    }
}

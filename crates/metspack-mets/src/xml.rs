//! A small owned XML element tree.
//!
//! Manifests and crosswalk output are held as [`XmlElement`] trees. Names are
//! kept exactly as written (prefix included) so embedded metadata survives a
//! read/write cycle; lookups compare local names so callers need not care
//! which prefix a document bound to a namespace. DTDs and external entities
//! are never resolved.

use std::io::Write;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::error::{MetsError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Part of a qualified name after the last `:`.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// True when the element's local name is `local`.
    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Adds the attribute only when `value` is present.
    pub fn with_opt_attr(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.set_attr(key, value);
        }
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Looks an attribute up by its exact name, then by local name on both
    /// sides, so `xlink:href` also finds `href` and `xl:href`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        let local = local_name(name);
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| !k.starts_with("xmlns") && local_name(k) == local)
            })
            .map(|(_, v)| v.as_str())
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| {
            match node {
                XmlNode::Element(el) => Some(el),
                XmlNode::Text(_) => None,
            }
        })
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.is(local))
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(local))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| {
                match node {
                    XmlNode::Text(text) => Some(text.as_str()),
                    XmlNode::Element(_) => None,
                }
            })
            .collect()
    }

    /// Parses a complete document and returns its root element.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        parse_nodes(bytes)?
            .into_iter()
            .find_map(|node| {
                match node {
                    XmlNode::Element(el) => Some(el),
                    XmlNode::Text(_) => None,
                }
            })
            .ok_or_else(|| MetsError::validation("document has no root element"))
    }

    /// Parses a sequence of sibling elements (e.g. the body of an `xmlData`).
    pub fn parse_fragment(bytes: &[u8]) -> Result<Vec<Self>> {
        Ok(parse_nodes(bytes)?
            .into_iter()
            .filter_map(|node| {
                match node {
                    XmlNode::Element(el) => Some(el),
                    XmlNode::Text(_) => None,
                }
            })
            .collect())
    }

    /// Serializes as an indented standalone document with an XML declaration.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_to(&mut writer)?;
        let mut out = writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }

    /// Serializes without a declaration.
    pub fn to_fragment(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_to(&mut writer)?;
        Ok(writer.into_inner())
    }

    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_to(writer)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn start_element(start: &BytesStart) -> Result<XmlElement> {
    let mut element = XmlElement::new(std::str::from_utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], roots: &mut Vec<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn parse_nodes(bytes: &[u8]) -> Result<Vec<XmlNode>> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut roots = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let element = start_element(&start)?;
                attach(&mut stack, &mut roots, XmlNode::Element(element));
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MetsError::validation("unbalanced closing tag"))?;
                attach(&mut stack, &mut roots, XmlNode::Element(element));
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if !text.is_empty() {
                    attach(&mut stack, &mut roots, XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(data) => {
                let text = std::str::from_utf8(&data)?.to_string();
                attach(&mut stack, &mut roots, XmlNode::Text(text));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(MetsError::validation(format!(
            "document ends inside <{}>",
            open.name
        )));
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<!DOCTYPE dim [ <!ENTITY ext SYSTEM "http://example.invalid/x"> ]>
<dim:dim xmlns:dim="http://www.dspace.org/xmlns/dspace/dim">
  <dim:field mdschema="dc" element="title">Rivers &amp; Lakes</dim:field>
  <dim:field mdschema="dc" element="subject" qualifier="lcsh"><![CDATA[Hydrology <raw>]]></dim:field>
  <dim:empty/>
</dim:dim>"#;

    #[test]
    fn test_parse_keeps_prefixes_and_unescapes() {
        let root = XmlElement::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(root.name, "dim:dim");
        assert!(root.is("dim"));
        assert_eq!(root.attr("xmlns:dim"), Some("http://www.dspace.org/xmlns/dspace/dim"));

        let fields: Vec<_> = root.children_named("field").collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].text(), "Rivers & Lakes");
        assert_eq!(fields[1].attr("qualifier"), Some("lcsh"));
        assert_eq!(fields[1].text(), "Hydrology <raw>");
        assert!(root.child("empty").is_some());
    }

    #[test]
    fn test_attr_falls_back_to_local_name() {
        let el = XmlElement::new("mets:FLocat")
            .with_attr("LOCTYPE", "URL")
            .with_attr("xlink:href", "bitstream_1.pdf");
        assert_eq!(el.attr("xlink:href"), Some("bitstream_1.pdf"));
        assert_eq!(el.attr("href"), Some("bitstream_1.pdf"));
        assert_eq!(el.attr("missing"), None);
    }

    #[test]
    fn test_attr_ignores_caller_prefix() {
        let bare = XmlElement::new("mptr").with_attr("href", "ITEM@123-4.zip");
        assert_eq!(bare.attr("xlink:href"), Some("ITEM@123-4.zip"));

        let rebound = XmlElement::new("mets:FLocat")
            .with_attr("xmlns:xl", "http://www.w3.org/1999/xlink")
            .with_attr("xl:href", "a.txt");
        assert_eq!(rebound.attr("xlink:href"), Some("a.txt"));
        assert_eq!(rebound.attr("xl"), None);
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let tree = XmlElement::new("premis:object")
            .with_attr("xmlns:premis", "info:lc/xmlns/premis-v2")
            .with_child(XmlElement::new("premis:originalName").with_text("a \"quoted\" <name>.pdf"))
            .with_child(XmlElement::new("premis:size").with_text("42"))
            .with_child(XmlElement::new("premis:marker"));

        let bytes = tree.to_document().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<premis:size>42</premis:size>"));
        assert!(text.contains("<premis:marker/>"));

        assert_eq!(XmlElement::parse(&bytes).unwrap(), tree);
    }

    #[test]
    fn test_parse_fragment_returns_siblings() {
        let nodes = XmlElement::parse_fragment(b"<a>1</a><b/><c><d/></c>").unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_parse_rejects_broken_documents() {
        assert!(XmlElement::parse(b"<a><b></a>").is_err());
        assert!(XmlElement::parse(b"<a><b>").is_err());
        assert!(XmlElement::parse(b"   ").is_err());
    }

    #[test]
    fn test_set_attr_replaces_existing() {
        let mut el = XmlElement::new("mets:mdRef").with_attr("xlink:href", "pending");
        el.set_attr("xlink:href", "metadata_3.txt");
        assert_eq!(el.attributes.len(), 1);
        assert_eq!(el.attr("href"), Some("metadata_3.txt"));
    }
}

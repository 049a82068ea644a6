//! # XML Element Tree and Canonical Serialization
//!
//! A small owned element tree with two serializers:
//!
//! - [`XmlElement::to_canonical`] produces the canonical bytes a digest or
//!   signature is computed over.
//! - [`XmlElement::to_xml`] produces the wire text sent to the service.
//!
//! ## Canonical Form
//!
//! The canonical form follows the XML canonicalization rules for a
//! document subset rendered on its own:
//!
//! - Namespace declarations are emitted only where a prefix is visibly
//!   used and not already in scope, default namespace first, then sorted
//!   by prefix. Declarations precede attributes.
//! - Attributes are sorted by namespace URI, then local name, so
//!   unprefixed attributes come first. The wire form keeps the order in
//!   which they were built.
//! - Empty elements are written as a start/end pair, never self-closed.
//! - No whitespace is added between elements.
//! - Text escapes `&`, `<`, `>` and carriage return; attribute values
//!   escape `&`, `<`, `"`, tab, line feed and carriage return.
//!
//! Rendering an element canonically ignores its ancestors, so
//! canonicalizing an element before or after it is attached to an envelope
//! yields identical bytes.
//!
//! ## Parsing
//!
//! [`XmlElement::parse`] reads a document with `quick-xml`, resolving
//! prefixes to namespace URIs and keeping explicit declarations. Comments,
//! processing instructions and the XML declaration are dropped.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::XmlError;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace binding: `None` prefix is the default namespace.
type Binding = (Option<String>, String);

/// One attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    /// Namespace of a prefixed attribute. Unprefixed attributes have none.
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

impl XmlAttribute {
    fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Canonical ordering: namespace URI, then local name.
    fn sort_key(&self) -> (&str, &str) {
        (self.namespace.as_deref().unwrap_or(""), self.name.as_str())
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An owned XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    prefix: Option<String>,
    name: String,
    namespace: Option<String>,
    declarations: Vec<Binding>,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Element in no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            namespace: None,
            declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Prefixed element bound to `namespace`.
    pub fn qualified(
        prefix: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            prefix: Some(prefix.into()),
            namespace: Some(namespace.into()),
            ..Self::new(name)
        }
    }

    /// Unprefixed element in the default namespace `namespace`.
    pub fn in_default_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new(name)
        }
    }

    /// Declare a namespace on this element explicitly. Explicit
    /// declarations only affect the wire form.
    pub fn with_namespace(mut self, prefix: Option<&str>, uri: impl Into<String>) -> Self {
        self.declarations.push((prefix.map(str::to_string), uri.into()));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Add a prefixed attribute, such as `u:Id`.
    pub fn with_qualified_attribute(
        mut self,
        prefix: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(XmlAttribute {
            prefix: Some(prefix.into()),
            namespace: Some(namespace.into()),
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push_child(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Set an unprefixed attribute, replacing an existing value in place
    /// so the attribute keeps its position.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.prefix.is_none() && a.name == name)
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute {
                prefix: None,
                namespace: None,
                name,
                value,
            }),
        }
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// Value of the attribute with the given local name, whatever its
    /// prefix.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == local_name)
            .map(|a| a.value.as_str())
    }

    pub fn nodes(&self) -> &[XmlNode] {
        &self.children
    }

    /// Child elements, skipping text.
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given local name.
    pub fn find_child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children().find(|c| c.name == local_name)
    }

    pub fn find_child_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) if e.name == local_name => Some(e),
            _ => None,
        })
    }

    /// First element with the given local name in document order,
    /// including `self`.
    pub fn find_descendant(&self, local_name: &str) -> Option<&XmlElement> {
        if self.name == local_name {
            return Some(self);
        }
        self.children().find_map(|c| c.find_descendant(local_name))
    }

    pub fn find_descendant_mut(&mut self, local_name: &str) -> Option<&mut XmlElement> {
        if self.name == local_name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) => e.find_descendant_mut(local_name),
            XmlNode::Text(_) => None,
        })
    }

    /// Every element with the given local name in document order,
    /// including `self`.
    pub fn descendants_named<'a>(&'a self, local_name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_named(local_name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, local_name: &str, found: &mut Vec<&'a XmlElement>) {
        if self.name == local_name {
            found.push(self);
        }
        for child in self.children() {
            child.collect_named(local_name, found);
        }
    }

    /// Remove direct children with the given local name, returning how
    /// many were removed.
    pub fn remove_children_named(&mut self, local_name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|n| !matches!(n, XmlNode::Element(e) if e.name == local_name));
        before - self.children.len()
    }

    /// Concatenated text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Elements in this subtree whose `Id` attribute (any prefix) equals
    /// `id`.
    pub fn elements_with_id<'a>(&'a self, id: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_ids(id, &mut found);
        found
    }

    fn collect_ids<'a>(&'a self, id: &str, found: &mut Vec<&'a XmlElement>) {
        if self.attribute("Id") == Some(id) {
            found.push(self);
        }
        for child in self.children() {
            child.collect_ids(id, found);
        }
    }

    pub fn elements_with_id_mut(&mut self, id: &str) -> Option<&mut XmlElement> {
        if self.attribute("Id") == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) => e.elements_with_id_mut(id),
            XmlNode::Text(_) => None,
        })
    }

    /// Canonical serialization of this element, rendered on its own.
    pub fn to_canonical(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        self.write_canonical(&mut writer, &[])?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Wire serialization: explicit declarations are kept and empty
    /// elements are self-closed.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        self.write_wire(&mut writer, &[])?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Bindings this element visibly uses, default namespace first.
    fn used_bindings(&self) -> Vec<Binding> {
        let mut used: Vec<Binding> = Vec::new();
        let own = (
            self.prefix.clone(),
            self.namespace.clone().unwrap_or_default(),
        );
        used.push(own);
        for attr in &self.attributes {
            if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
                if prefix == "xml" {
                    continue;
                }
                let binding = (Some(prefix.clone()), ns.clone());
                if !used.contains(&binding) {
                    used.push(binding);
                }
            }
        }
        used
    }

    fn write_canonical(
        &self,
        writer: &mut Writer<Vec<u8>>,
        scope: &[Binding],
    ) -> Result<(), XmlError> {
        let mut declared: Vec<Binding> = self
            .used_bindings()
            .into_iter()
            .filter(|(prefix, uri)| lookup(scope, prefix.as_deref()) != uri.as_str())
            .collect();
        declared.sort_by(|a, b| a.0.cmp(&b.0));

        let mut attributes: Vec<&XmlAttribute> = self.attributes.iter().collect();
        attributes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let name = self.qualified_name();
        let mut start = BytesStart::new(name.as_str());
        push_declarations(&mut start, &declared);
        push_attributes(&mut start, attributes);
        write(writer, Event::Start(start))?;

        let inner_scope = extend_scope(scope, &declared);
        for node in &self.children {
            match node {
                XmlNode::Element(e) => e.write_canonical(writer, &inner_scope)?,
                XmlNode::Text(t) => {
                    write(writer, Event::Text(BytesText::from_escaped(escape_text(t))))?
                }
            }
        }
        write(writer, Event::End(BytesEnd::new(name.as_str())))
    }

    fn write_wire(&self, writer: &mut Writer<Vec<u8>>, scope: &[Binding]) -> Result<(), XmlError> {
        let mut declared: Vec<Binding> = self.declarations.clone();
        let explicit_scope = extend_scope(scope, &declared);
        for (prefix, uri) in self.used_bindings() {
            if lookup(&explicit_scope, prefix.as_deref()) != uri.as_str()
                && !declared.iter().any(|(p, _)| *p == prefix)
            {
                declared.push((prefix, uri));
            }
        }

        let name = self.qualified_name();
        let mut start = BytesStart::new(name.as_str());
        push_declarations(&mut start, &declared);
        push_attributes(&mut start, &self.attributes);

        if self.children.is_empty() {
            return write(writer, Event::Empty(start));
        }
        write(writer, Event::Start(start))?;
        let inner_scope = extend_scope(scope, &declared);
        for node in &self.children {
            match node {
                XmlNode::Element(e) => e.write_wire(writer, &inner_scope)?,
                XmlNode::Text(t) => {
                    write(writer, Event::Text(BytesText::from_escaped(escape_text(t))))?
                }
            }
        }
        write(writer, Event::End(BytesEnd::new(name.as_str())))
    }

    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<(XmlElement, Vec<Binding>)> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| XmlError::Parse(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(start) => {
                    let scope = stack.last().map(|(_, s)| s.as_slice()).unwrap_or(&[]);
                    let (element, scope) = open_element(&start, scope)?;
                    stack.push((element, scope));
                }
                Event::Empty(start) => {
                    let scope = stack.last().map(|(_, s)| s.as_slice()).unwrap_or(&[]);
                    let (element, _) = open_element(&start, scope)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let (element, _) = stack
                        .pop()
                        .ok_or_else(|| XmlError::Parse("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| XmlError::Parse(e.to_string()))?;
                    if let Some((parent, _)) = stack.last_mut() {
                        parent.push_text(text.into_owned());
                    }
                }
                Event::CData(data) => {
                    let text = String::from_utf8(data.into_inner().into_owned())?;
                    if let Some((parent, _)) = stack.last_mut() {
                        parent.push_text(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Parse("unexpected end of document".into()));
        }
        root.ok_or(XmlError::NoRoot)
    }
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{name}"),
        None => name.to_string(),
    }
}

/// Namespace bound to `prefix` in `scope`; the empty string when unbound.
fn lookup<'a>(scope: &'a [Binding], prefix: Option<&str>) -> &'a str {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
        .unwrap_or("")
}

fn extend_scope(scope: &[Binding], declared: &[Binding]) -> Vec<Binding> {
    let mut out = scope.to_vec();
    out.extend_from_slice(declared);
    out
}

fn push_declarations(start: &mut BytesStart<'_>, declared: &[Binding]) {
    for (prefix, uri) in declared {
        let key = match prefix {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        push_raw_attribute(start, &key, uri);
    }
}

fn push_attributes<'a>(
    start: &mut BytesStart<'_>,
    attributes: impl IntoIterator<Item = &'a XmlAttribute>,
) {
    for attr in attributes {
        push_raw_attribute(start, &attr.qualified_name(), &attr.value);
    }
}

fn push_raw_attribute(start: &mut BytesStart<'_>, key: &str, value: &str) {
    // The value is escaped here so quick-xml writes it untouched.
    start.push_attribute(Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_attribute(value).into_bytes()),
    });
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

fn open_element(
    start: &BytesStart<'_>,
    scope: &[Binding],
) -> Result<(XmlElement, Vec<Binding>), XmlError> {
    let raw_name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Parse(e.to_string()))?
        .to_string();

    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            declarations.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((Some(prefix.to_string()), value));
        } else {
            raw_attributes.push((key, value));
        }
    }

    let scope = extend_scope(scope, &declarations);
    let resolve = |prefix: Option<&str>| -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE.to_string());
        }
        let uri = lookup(&scope, prefix);
        (!uri.is_empty()).then(|| uri.to_string())
    };

    let (prefix, local) = split_qname(&raw_name);
    let attributes = raw_attributes
        .iter()
        .map(|(key, value)| {
            let (attr_prefix, attr_local) = split_qname(key);
            XmlAttribute {
                prefix: attr_prefix.map(str::to_string),
                namespace: attr_prefix.and_then(|p| resolve(Some(p))),
                name: attr_local.to_string(),
                value: value.clone(),
            }
        })
        .collect();

    let element = XmlElement {
        prefix: prefix.map(str::to_string),
        name: local.to_string(),
        namespace: resolve(prefix),
        declarations,
        attributes,
        children: Vec::new(),
    };
    Ok((element, scope))
}

fn attach(
    stack: &mut [(XmlElement, Vec<Binding>)],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some((parent, _)) => {
            parent.push_child(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::Parse("more than one root element".into())),
    }
}

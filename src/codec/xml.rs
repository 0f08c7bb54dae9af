//! XML encoding and decoding of [`Element`] trees.
//!
//! Decoding resolves namespace prefixes: each element records its namespace
//! only where it differs from its parent. `xmlns:*` declarations stay on the
//! element as attributes so prefixed values (identities, XPath) keep their
//! meaning. An `operation` attribute in the NETCONF base namespace becomes
//! the element's edit [`crate::element::Operation`].

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;

use crate::config::NETCONF_BASE_NS;
use crate::element::{Content, Element, effective_ns};
use crate::error::NetconfError;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix bound to the NETCONF base namespace when an operation attribute
/// has to be written and no ancestor declares one.
const OPERATION_PREFIX: &str = "nc";

struct Frame {
    element: Element,
    /// Effective namespace, `None` for no namespace.
    ns: Option<String>,
    default_ns: Option<String>,
    prefixes: HashMap<String, String>,
    text: String,
}

/// Parses one XML document into an element tree.
pub fn parse(input: &[u8]) -> Result<Element, NetconfError> {
    let text = std::str::from_utf8(input)
        .map_err(|e| NetconfError::MalformedDocument(format!("invalid UTF-8: {e}")))?;
    parse_str(text)
}

pub fn parse_str(xml: &str) -> Result<Element, NetconfError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            NetconfError::MalformedDocument(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(malformed("more than one root element"));
                }
                stack.push(open(&start, stack.last())?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(malformed("more than one root element"));
                }
                let frame = open(&start, stack.last())?;
                close(frame, &mut stack, &mut root);
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| malformed("closing tag without opening tag"))?;
                close(frame, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| NetconfError::MalformedDocument(e.to_string()))?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&value),
                    None if value.trim().is_empty() => {}
                    None => return Err(malformed("text outside of the root element")),
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&value),
                    None => return Err(malformed("CDATA outside of the root element")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document"));
    }
    root.ok_or_else(|| malformed("document has no root element"))
}

fn malformed(reason: &str) -> NetconfError {
    NetconfError::MalformedDocument(reason.to_string())
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn open(start: &BytesStart<'_>, parent: Option<&Frame>) -> Result<Frame, NetconfError> {
    let qname = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| NetconfError::MalformedDocument(e.to_string()))?
        .to_string();
    let (prefix, local) = split_qname(&qname);

    let mut default_ns = parent.and_then(|p| p.default_ns.clone());
    let mut prefixes = parent.map(|p| p.prefixes.clone()).unwrap_or_default();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| NetconfError::MalformedDocument(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| NetconfError::MalformedDocument(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| NetconfError::MalformedDocument(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            default_ns = Some(value).filter(|v| !v.is_empty());
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            prefixes.insert(declared.to_string(), value.clone());
            attributes.push((key, value));
        } else {
            attributes.push((key, value));
        }
    }

    let ns = match prefix {
        Some("xml") => Some(XML_NS.to_string()),
        Some(p) => Some(
            prefixes
                .get(p)
                .cloned()
                .ok_or_else(|| NetconfError::MalformedDocument(format!("unbound prefix '{p}'")))?,
        ),
        None => default_ns.clone(),
    };

    let mut element = Element::new(local);
    let parent_ns = parent.and_then(|p| p.ns.as_deref());
    if ns.as_deref() != parent_ns {
        element.set_namespace(Some(ns.clone().unwrap_or_default()));
    }

    for (key, value) in attributes {
        if let (Some(p), "operation") = split_qname(&key)
            && prefixes.get(p).map(String::as_str) == Some(NETCONF_BASE_NS)
        {
            element.set_operation(Some(value.parse()?));
            continue;
        }
        element.set_attribute(key, value);
    }

    Ok(Frame {
        element,
        ns,
        default_ns,
        prefixes,
        text: String::new(),
    })
}

fn close(frame: Frame, stack: &mut [Frame], root: &mut Option<Element>) {
    let Frame {
        mut element, text, ..
    } = frame;
    // Text between child elements is dropped. A leaf keeps its text verbatim,
    // whitespace included.
    if element.children().is_empty() && !text.is_empty() {
        element.set_text(text);
    }
    match stack.last_mut() {
        Some(parent) => parent.element.push_child(element),
        None => *root = Some(element),
    }
}

/// Serializes a tree without XML declaration.
pub fn to_string(element: &Element) -> Result<String, NetconfError> {
    let bytes = write_document(element, false)?;
    String::from_utf8(bytes).map_err(|e| NetconfError::MalformedDocument(e.to_string()))
}

/// Serializes a tree as a complete document with XML declaration.
pub fn to_document(element: &Element) -> Result<Vec<u8>, NetconfError> {
    write_document(element, true)
}

fn write_document(element: &Element, declaration: bool) -> Result<Vec<u8>, NetconfError> {
    let mut writer = Writer::new(Vec::new());
    if declaration {
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
    }
    write_element(&mut writer, element, None, None)?;
    Ok(writer.into_inner())
}

fn write_error(e: impl std::fmt::Display) -> NetconfError {
    NetconfError::MalformedDocument(format!("cannot write XML: {e}"))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    parent_ns: Option<&str>,
    base_prefix: Option<&str>,
) -> Result<(), NetconfError> {
    let ns = effective_ns(element, parent_ns);
    let mut start = BytesStart::new(element.name());
    if ns != parent_ns {
        start.push_attribute(("xmlns", ns.unwrap_or("")));
    }
    for (key, value) in element.attributes() {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let declared = element.attributes().iter().find_map(|(k, v)| {
        k.strip_prefix("xmlns:")
            .filter(|_| v == NETCONF_BASE_NS)
    });
    let mut base_prefix = declared.or(base_prefix);
    if let Some(operation) = element.operation() {
        let prefix = match base_prefix {
            Some(prefix) => prefix,
            None => {
                start.push_attribute((
                    format!("xmlns:{OPERATION_PREFIX}").as_str(),
                    NETCONF_BASE_NS,
                ));
                base_prefix = Some(OPERATION_PREFIX);
                OPERATION_PREFIX
            }
        };
        start.push_attribute((format!("{prefix}:operation").as_str(), operation.as_str()));
    }

    match element.content() {
        content if content.is_empty() => {
            writer.write_event(Event::Empty(start)).map_err(write_error)?;
        }
        Content::Text(text) => {
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(element.name())))
                .map_err(write_error)?;
        }
        Content::Children(children) => {
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for child in children {
                write_element(writer, child, ns, base_prefix)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(element.name())))
                .map_err(write_error)?;
        }
    }
    Ok(())
}

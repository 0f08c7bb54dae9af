//! Message codec: XML documents and RFC 6242 framing.
//!
//! # Main Components
//!
//! - [`xml`] - [`Element`] to XML and back
//! - [`framing`] - End-of-message and chunked framing, [`FrameBuffer`]

use crate::element::Element;
use crate::error::NetconfError;

pub mod framing;
pub mod xml;

pub use framing::{FrameBuffer, FramingMode, frame, unframe};

/// Encodes an element as an XML document with declaration.
pub fn encode(element: &Element) -> Result<Vec<u8>, NetconfError> {
    xml::to_document(element)
}

/// Decodes the body of one unframed message.
pub fn decode(payload: &[u8]) -> Result<Element, NetconfError> {
    xml::parse(payload)
}

/// Encodes and frames an element for the wire.
pub fn encode_message(
    element: &Element,
    mode: FramingMode,
    max_chunk: usize,
) -> Result<Vec<u8>, NetconfError> {
    frame(&encode(element)?, mode, max_chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_message_decodes_after_unframing() {
        let hello = Element::new("hello")
            .with_namespace(crate::config::NETCONF_BASE_NS)
            .with_child(Element::new("capabilities"));
        for mode in [FramingMode::EndOfMessage, FramingMode::Chunked] {
            let wire = encode_message(&hello, mode, 16).expect("encode");
            let (payload, used) = unframe(&wire, mode).expect("unframe");
            assert_eq!(used, wire.len());
            assert_eq!(decode(&payload).expect("decode"), hello);
        }
    }
}

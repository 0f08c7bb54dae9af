//! RFC 6242 message framing.
//!
//! Base 1.0 sessions terminate each message with `]]>]]>`. Base 1.1
//! sessions split messages into chunks (`\n#<size>\n<data>`) closed by
//! `\n##\n`.

use bytes::{Buf, BytesMut};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{END_OF_CHUNKS, END_OF_MESSAGE, MAX_CHUNK_SIZE};
use crate::error::NetconfError;

/// Largest chunk-size field: `4294967295` has ten digits.
const MAX_CHUNK_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    EndOfMessage,
    Chunked,
}

/// Frames one message for the wire.
///
/// In chunked mode the payload is split into chunks of at most
/// `max_chunk` bytes.
pub fn frame(payload: &[u8], mode: FramingMode, max_chunk: usize) -> Result<Vec<u8>, NetconfError> {
    match mode {
        FramingMode::EndOfMessage => {
            if find(payload, END_OF_MESSAGE).is_some() {
                return Err(NetconfError::FramingViolation(
                    "payload contains the end-of-message marker".to_string(),
                ));
            }
            let mut out = Vec::with_capacity(payload.len() + END_OF_MESSAGE.len());
            out.extend_from_slice(payload);
            out.extend_from_slice(END_OF_MESSAGE);
            Ok(out)
        }
        FramingMode::Chunked => {
            if payload.is_empty() {
                return Err(NetconfError::FramingViolation(
                    "chunked message must carry at least one byte".to_string(),
                ));
            }
            let max_chunk = max_chunk.clamp(1, usize::try_from(MAX_CHUNK_SIZE).unwrap_or(usize::MAX));
            let mut out = Vec::with_capacity(payload.len() + 16 + END_OF_CHUNKS.len());
            for chunk in payload.chunks(max_chunk) {
                out.extend_from_slice(format!("\n#{}\n", chunk.len()).as_bytes());
                out.extend_from_slice(chunk);
            }
            out.extend_from_slice(END_OF_CHUNKS);
            Ok(out)
        }
    }
}

/// Extracts the first complete message from `buf`.
///
/// Returns the message body and the number of bytes consumed.
/// `TruncatedFrame` means more input is needed.
pub fn unframe(buf: &[u8], mode: FramingMode) -> Result<(Vec<u8>, usize), NetconfError> {
    match mode {
        FramingMode::EndOfMessage => {
            let pos = find(buf, END_OF_MESSAGE).ok_or(NetconfError::TruncatedFrame)?;
            Ok((buf[..pos].to_vec(), pos + END_OF_MESSAGE.len()))
        }
        FramingMode::Chunked => unframe_chunked(buf),
    }
}

fn unframe_chunked(buf: &[u8]) -> Result<(Vec<u8>, usize), NetconfError> {
    let mut pos = 0;
    // Whitespace left over from the previous end-of-message frame.
    while pos < buf.len() && buf[pos].is_ascii_whitespace() && !buf[pos..].starts_with(b"\n#") {
        pos += 1;
    }

    let mut message = Vec::new();
    let mut chunks = 0usize;
    loop {
        let header = buf.get(pos..pos + 2).ok_or(NetconfError::TruncatedFrame)?;
        if header != b"\n#" {
            return Err(violation(format!("expected chunk header at byte {pos}")));
        }
        pos += 2;

        match buf.get(pos) {
            None => return Err(NetconfError::TruncatedFrame),
            Some(b'#') => {
                match buf.get(pos + 1) {
                    None => return Err(NetconfError::TruncatedFrame),
                    Some(b'\n') => {}
                    Some(_) => return Err(violation("malformed end-of-chunks marker")),
                }
                if chunks == 0 {
                    return Err(violation("message without chunks"));
                }
                return Ok((message, pos + 2));
            }
            Some(_) => {}
        }

        let digits_start = pos;
        loop {
            match buf.get(pos) {
                None if pos - digits_start > MAX_CHUNK_DIGITS => {
                    return Err(violation("chunk size field too long"));
                }
                None => return Err(NetconfError::TruncatedFrame),
                Some(b) if b.is_ascii_digit() => pos += 1,
                Some(b'\n') => break,
                Some(b) => {
                    return Err(violation(format!(
                        "invalid byte 0x{b:02x} in chunk size"
                    )));
                }
            }
        }
        let digits = &buf[digits_start..pos];
        if digits.is_empty() {
            return Err(violation("empty chunk size"));
        }
        if digits.len() > MAX_CHUNK_DIGITS {
            return Err(violation("chunk size field too long"));
        }
        if digits[0] == b'0' {
            return Err(violation("chunk size must start with a non-zero digit"));
        }
        let size = digits
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        if size > MAX_CHUNK_SIZE {
            return Err(violation(format!("chunk size {size} exceeds maximum")));
        }
        pos += 1;

        let size = usize::try_from(size).map_err(|_| violation("chunk size does not fit in memory"))?;
        let data = buf.get(pos..pos + size).ok_or(NetconfError::TruncatedFrame)?;
        message.extend_from_slice(data);
        pos += size;
        chunks += 1;
    }
}

fn violation(reason: impl Into<String>) -> NetconfError {
    NetconfError::FramingViolation(reason.into())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Accumulates inbound bytes and yields complete messages.
///
/// Bytes following a message stay buffered, so the framing mode can switch
/// between two messages without losing data.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    mode: FramingMode,
}

impl FrameBuffer {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            mode,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FramingMode) {
        self.mode = mode;
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete message, or `None` while the current one is incomplete.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        match unframe(&self.buf, self.mode) {
            Ok((message, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(message))
            }
            Err(NetconfError::TruncatedFrame) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Checks that the stream ended on a message boundary.
    pub fn finish(&self) -> Result<(), NetconfError> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(NetconfError::TruncatedFrame)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_message_frames_and_unframes() {
        let framed = frame(b"<hello/>", FramingMode::EndOfMessage, 0).expect("frame");
        assert_eq!(framed, b"<hello/>]]>]]>");
        let (message, used) = unframe(&framed, FramingMode::EndOfMessage).expect("unframe");
        assert_eq!(message, b"<hello/>");
        assert_eq!(used, framed.len());
    }

    #[test]
    fn end_of_message_rejects_marker_in_payload() {
        let err = frame(b"<a>]]>]]></a>", FramingMode::EndOfMessage, 0).expect_err("marker");
        assert!(matches!(err, NetconfError::FramingViolation(_)));
    }

    #[test]
    fn chunked_splits_at_max_chunk_size() {
        let framed = frame(b"abcdefg", FramingMode::Chunked, 3).expect("frame");
        assert_eq!(framed, b"\n#3\nabc\n#3\ndef\n#1\ng\n##\n");
        let (message, used) = unframe(&framed, FramingMode::Chunked).expect("unframe");
        assert_eq!(message, b"abcdefg");
        assert_eq!(used, framed.len());
    }

    #[test]
    fn chunked_rejects_empty_payload() {
        assert!(matches!(
            frame(b"", FramingMode::Chunked, 1024),
            Err(NetconfError::FramingViolation(_))
        ));
    }

    #[test]
    fn chunked_reports_truncation_at_every_prefix() {
        let framed = frame(b"<rpc-reply/>", FramingMode::Chunked, 5).expect("frame");
        for end in 0..framed.len() {
            assert!(
                matches!(
                    unframe(&framed[..end], FramingMode::Chunked),
                    Err(NetconfError::TruncatedFrame)
                ),
                "prefix of {end} bytes"
            );
        }
    }

    #[test]
    fn chunked_rejects_invalid_headers() {
        for bad in [
            &b"\n#0\n\n##\n"[..],
            b"\n#01\na\n##\n",
            b"\n#x\n",
            b"\n#4294967296\n",
            b"\n#12345678901\n",
            b"\n##\n",
            b"<rpc/>",
            b"\n#1\na\n#!",
        ] {
            assert!(
                matches!(
                    unframe(bad, FramingMode::Chunked),
                    Err(NetconfError::FramingViolation(_))
                ),
                "{:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn frame_buffer_yields_messages_across_pushes() {
        let mut buffer = FrameBuffer::new(FramingMode::Chunked);
        let first = frame(b"<one/>", FramingMode::Chunked, 2).expect("frame");
        let second = frame(b"<two/>", FramingMode::Chunked, 64).expect("frame");
        let mut wire = first.clone();
        wire.extend_from_slice(&second);

        let (head, tail) = wire.split_at(first.len() + 3);
        buffer.push(head);
        assert_eq!(buffer.next_message().expect("next"), Some(b"<one/>".to_vec()));
        assert_eq!(buffer.next_message().expect("next"), None);
        buffer.push(tail);
        assert_eq!(buffer.next_message().expect("next"), Some(b"<two/>".to_vec()));
        assert!(buffer.finish().is_ok());
    }

    #[test]
    fn frame_buffer_switches_mode_between_messages() {
        let mut buffer = FrameBuffer::new(FramingMode::EndOfMessage);
        let mut wire = b"<hello/>]]>]]>\n".to_vec();
        wire.extend_from_slice(&frame(b"<rpc-reply/>", FramingMode::Chunked, 64).expect("frame"));
        buffer.push(&wire);

        assert_eq!(buffer.next_message().expect("hello"), Some(b"<hello/>".to_vec()));
        buffer.set_mode(FramingMode::Chunked);
        assert_eq!(
            buffer.next_message().expect("reply"),
            Some(b"<rpc-reply/>".to_vec())
        );
    }

    #[test]
    fn finish_detects_partial_message() {
        let mut buffer = FrameBuffer::new(FramingMode::EndOfMessage);
        buffer.push(b"<rpc-reply>");
        assert_eq!(buffer.next_message().expect("next"), None);
        assert!(matches!(buffer.finish(), Err(NetconfError::TruncatedFrame)));
    }
}

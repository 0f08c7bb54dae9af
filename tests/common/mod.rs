#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rnetconf::capabilities::{Capabilities, Hello, ProtocolVersion, negotiate};
use rnetconf::codec::{FrameBuffer, FramingMode, decode, encode_message, frame};
use rnetconf::config::{
    CAPABILITY_BASE_1_0, CAPABILITY_BASE_1_1, CAPABILITY_CANDIDATE, SessionConfig,
};
use rnetconf::element::Element;
use rnetconf::error::NetconfError;
use rnetconf::session::{Session, SessionBuilder, SessionObserver, SessionState};
use rnetconf::transport::StreamTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const SERVER_SESSION_ID: u32 = 7;

pub const BASE_CAPS: &[&str] = &[CAPABILITY_BASE_1_0, CAPABILITY_BASE_1_1];
pub const CANDIDATE_CAPS: &[&str] = &[CAPABILITY_BASE_1_0, CAPABILITY_BASE_1_1, CAPABILITY_CANDIDATE];

/// In-memory NETCONF server speaking over a duplex pipe.
pub struct FakeServer {
    stream: DuplexStream,
    frames: FrameBuffer,
    mode: FramingMode,
    pub client_hello: Option<Hello>,
}

/// An `<rpc>` read by the fake server.
#[derive(Debug, Clone)]
pub struct ReceivedRpc {
    pub message_id: u64,
    pub operation: Element,
}

impl ReceivedRpc {
    pub fn name(&self) -> &str {
        self.operation.name()
    }
}

impl FakeServer {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(FramingMode::EndOfMessage),
            mode: FramingMode::EndOfMessage,
            client_hello: None,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Sends the server hello, reads the client hello and switches framing.
    pub async fn handshake(&mut self, capabilities: &[&str]) -> ProtocolVersion {
        let caps = Capabilities::new(capabilities.iter().copied()).expect("server caps");
        let hello = Hello {
            session_id: Some(SERVER_SESSION_ID),
            capabilities: caps.clone(),
        };
        self.send_element(&hello.to_element()).await;

        let client = self.read_message().await.expect("client hello");
        let client = Hello::from_element(&client).expect("decode client hello");
        assert!(client.session_id.is_none(), "client hello must not carry a session-id");
        let version = negotiate(&caps, &client.capabilities).expect("negotiate");
        self.mode = version.framing();
        self.frames.set_mode(self.mode);
        self.client_hello = Some(client);
        version
    }

    /// Next decoded message, or `None` once the client closed.
    pub async fn read_message(&mut self) -> Option<Element> {
        let mut buf = vec![0u8; 4096];
        loop {
            if let Some(message) = self.frames.next_message().expect("client framing") {
                return Some(decode(&message).expect("client document"));
            }
            let n = self.stream.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.frames.push(&buf[..n]);
        }
    }

    pub async fn read_rpc(&mut self) -> Option<ReceivedRpc> {
        let rpc = self.read_message().await?;
        assert_eq!(rpc.name(), "rpc");
        let message_id = rpc
            .attribute("message-id")
            .expect("message-id")
            .parse()
            .expect("numeric message-id");
        let operation = rpc.children().first().cloned().expect("operation");
        Some(ReceivedRpc {
            message_id,
            operation,
        })
    }

    /// Asserts that the client writes nothing within a short window.
    pub async fn expect_silence(&mut self) {
        let read = tokio::time::timeout(Duration::from_millis(100), self.read_message()).await;
        assert!(read.is_err(), "client wrote unexpectedly: {read:?}");
    }

    pub async fn send_element(&mut self, element: &Element) {
        let bytes = encode_message(element, self.mode, 1024).expect("encode");
        self.write_raw(&bytes).await;
    }

    /// Frames and sends a raw document.
    pub async fn send_xml(&mut self, xml: &str) {
        let bytes = frame(xml.as_bytes(), self.mode, 1024).expect("frame");
        self.write_raw(&bytes).await;
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("server write");
        self.stream.flush().await.expect("server flush");
    }

    pub async fn reply(&mut self, message_id: u64, body: &str) {
        self.send_xml(&reply_xml(message_id, body)).await;
    }

    pub async fn reply_ok(&mut self, message_id: u64) {
        self.reply(message_id, "<ok/>").await;
    }

    /// Answers every rpc with `respond(rpc)` until the client closes, and
    /// returns the operation names seen.
    pub async fn serve<F>(mut self, respond: F) -> Vec<String>
    where
        F: Fn(&ReceivedRpc) -> String,
    {
        let mut seen = Vec::new();
        while let Some(rpc) = self.read_rpc().await {
            seen.push(rpc.name().to_string());
            let body = respond(&rpc);
            self.reply(rpc.message_id, &body).await;
        }
        seen
    }
}

pub fn reply_xml(message_id: u64, body: &str) -> String {
    format!(
        r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{message_id}">{body}</rpc-reply>"#
    )
}

pub fn rpc_error(tag: &str, message: &str) -> String {
    format!(
        "<rpc-error><error-type>application</error-type><error-tag>{tag}</error-tag><error-severity>error</error-severity><error-message>{message}</error-message></rpc-error>"
    )
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        hello_timeout_secs: 5,
        request_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

/// Opens a session against a fake server advertising `server_caps`.
pub async fn open_pair(server_caps: &'static [&'static str]) -> (Session, FakeServer) {
    open_pair_with(server_caps, SessionBuilder::new().config(test_config())).await
}

pub async fn open_pair_with(
    server_caps: &'static [&'static str],
    builder: SessionBuilder,
) -> (Session, FakeServer) {
    open_pair_buffered(server_caps, builder, 64 * 1024).await
}

/// Like [`open_pair_with`] over a pipe holding at most `buffer` bytes.
pub async fn open_pair_buffered(
    server_caps: &'static [&'static str],
    builder: SessionBuilder,
    buffer: usize,
) -> (Session, FakeServer) {
    let (client, server) = tokio::io::duplex(buffer);
    let server_task = tokio::spawn(async move {
        let mut fake = FakeServer::new(server);
        fake.handshake(server_caps).await;
        fake
    });
    let session = builder
        .open(StreamTransport::new(client))
        .await
        .expect("open session");
    let fake = server_task.await.expect("server task");
    (session, fake)
}

/// Observer keeping every callback for assertions.
#[derive(Default)]
pub struct RecordingObserver {
    pub unknown_ids: Mutex<Vec<Option<String>>>,
    pub malformed: Mutex<Vec<String>>,
    pub violations: Mutex<Vec<String>>,
    pub states: Mutex<Vec<(SessionState, SessionState)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown_ids.lock().expect("lock").len()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, _session_id: u32, from: SessionState, to: SessionState) {
        self.states.lock().expect("lock").push((from, to));
    }

    fn on_unknown_message_id(&self, _session_id: u32, message_id: Option<&str>) {
        self.unknown_ids
            .lock()
            .expect("lock")
            .push(message_id.map(str::to_string));
    }

    fn on_malformed_message(&self, _session_id: u32, error: &NetconfError) {
        self.malformed.lock().expect("lock").push(error.to_string());
    }

    fn on_protocol_violation(&self, _session_id: u32, reason: &str) {
        self.violations.lock().expect("lock").push(reason.to_string());
    }
}

/// Polls `condition` until it holds or one second passes.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

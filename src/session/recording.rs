use super::*;
use std::time::{SystemTime, UNIX_EPOCH};

/// Session recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionRecordLevel {
    /// Disable recording.
    Off,
    /// Record key events only.
    KeyEventsOnly,
    /// Record key events and raw frames.
    #[default]
    Full,
}

/// A single recorded session event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    pub ts_ms: u128,
    pub event: SessionEvent,
}

/// Options for normalizing JSONL recordings into stable fixtures.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Keep raw frame events.
    pub keep_raw_frames: bool,
    /// Keep state-changed events.
    pub keep_state_changed: bool,
    /// Keep protocol-violation events.
    pub keep_violations: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            keep_raw_frames: false,
            keep_state_changed: true,
            keep_violations: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FrameDirection {
    Inbound,
    Outbound,
}

/// Supported recorded event types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    HelloExchanged {
        session_id: u32,
        version: ProtocolVersion,
        #[serde(default)]
        peer_capabilities: Vec<String>,
    },
    RpcSent {
        message_id: u64,
        operation: String,
        xml: String,
    },
    ReplyReceived {
        message_id: u64,
        ok: bool,
        xml: String,
    },
    NotificationReceived {
        event_time: String,
        xml: String,
    },
    ProtocolViolation {
        reason: String,
    },
    StateChanged {
        state: SessionState,
    },
    RawFrame {
        direction: FrameDirection,
        data: String,
    },
    SessionClosed {
        reason: String,
    },
}

/// In-memory session recorder.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    entries: Arc<Mutex<Vec<SessionRecordEntry>>>,
}

impl SessionRecorder {
    /// Create a recorder with the given level.
    pub fn new(level: SessionRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current recording level.
    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    /// Record a key-level event.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), NetconfError> {
        if self.level == SessionRecordLevel::Off {
            return Ok(());
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        guard.push(SessionRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Record a raw frame when enabled.
    pub fn record_raw_frame(&self, direction: FrameDirection, data: &[u8]) -> Result<(), NetconfError> {
        if self.level != SessionRecordLevel::Full {
            return Ok(());
        }
        self.record_event(SessionEvent::RawFrame {
            direction,
            data: String::from_utf8_lossy(data).into_owned(),
        })
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, NetconfError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    /// Clears all recorded events.
    pub fn clear(&self) -> Result<(), NetconfError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, NetconfError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                NetconfError::InternalServerError(format!("record encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore recorder from JSONL lines.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, NetconfError> {
        let recorder = Self::new(SessionRecordLevel::Full);
        if jsonl.trim().is_empty() {
            return Ok(recorder);
        }

        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: SessionRecordEntry = serde_json::from_str(line).map_err(|e| {
                NetconfError::InternalServerError(format!("record decode error: {e}"))
            })?;
            parsed.push(entry);
        }

        let mut guard = recorder
            .entries
            .lock()
            .map_err(|e| NetconfError::InternalServerError(format!("record lock error: {e}")))?;
        *guard = parsed;
        drop(guard);

        Ok(recorder)
    }

    /// Normalize JSONL recording content into a stable fixture representation.
    ///
    /// Events are sorted by timestamp; raw frames and other noisy events can
    /// be filtered out.
    pub fn normalize_jsonl(jsonl: &str, options: NormalizeOptions) -> Result<String, NetconfError> {
        let recorder = Self::from_jsonl(jsonl)?;
        let mut indexed = recorder
            .entries()?
            .into_iter()
            .enumerate()
            .collect::<Vec<(usize, SessionRecordEntry)>>();

        indexed
            .sort_by(|(idx_a, a), (idx_b, b)| a.ts_ms.cmp(&b.ts_ms).then_with(|| idx_a.cmp(idx_b)));

        let filtered = indexed
            .into_iter()
            .filter_map(|(_, entry)| match &entry.event {
                SessionEvent::RawFrame { .. } if !options.keep_raw_frames => None,
                SessionEvent::StateChanged { .. } if !options.keep_state_changed => None,
                SessionEvent::ProtocolViolation { .. } if !options.keep_violations => None,
                _ => Some(entry),
            })
            .collect::<Vec<_>>();

        let normalized = SessionRecorder {
            level: SessionRecordLevel::Full,
            entries: Arc::new(Mutex::new(filtered)),
        };
        normalized.to_jsonl()
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new(SessionRecordLevel::Full)
    }
}

/// Offline replayer backed by session recording data.
#[derive(Debug, Clone)]
pub struct SessionReplayer {
    entries: Vec<SessionRecordEntry>,
    cursor: usize,
}

/// Session parameters captured when the hello exchange was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayContext {
    pub session_id: u32,
    pub version: ProtocolVersion,
    pub peer_capabilities: Vec<String>,
}

impl SessionReplayer {
    /// Build a replayer from a recorder snapshot.
    pub fn from_recorder(recorder: &SessionRecorder) -> Self {
        let entries = recorder.entries().unwrap_or_default();
        Self { entries, cursor: 0 }
    }

    /// Build a replayer from JSONL recording data.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, NetconfError> {
        let recorder = SessionRecorder::from_jsonl(jsonl)?;
        Ok(Self::from_recorder(&recorder))
    }

    /// Returns the hello exchange context if present in recording.
    pub fn initial_context(&self) -> Option<ReplayContext> {
        self.entries.iter().find_map(|entry| match &entry.event {
            SessionEvent::HelloExchanged {
                session_id,
                version,
                peer_capabilities,
            } => Some(ReplayContext {
                session_id: *session_id,
                version: *version,
                peer_capabilities: peer_capabilities.clone(),
            }),
            _ => None,
        })
    }

    /// Peer capabilities of the recorded session, for building requests
    /// offline.
    pub fn capabilities(&self) -> Result<Capabilities, NetconfError> {
        let context = self.initial_context().ok_or_else(|| {
            NetconfError::ReplayMismatchError("recording has no hello exchange".to_string())
        })?;
        Capabilities::new(&context.peer_capabilities)
    }

    /// Replay the reply to the next recorded request for `operation`.
    pub fn replay_next(&mut self, operation: &str) -> Result<RpcReply, NetconfError> {
        while self.cursor < self.entries.len() {
            let entry = &self.entries[self.cursor];
            self.cursor += 1;

            let SessionEvent::RpcSent {
                message_id,
                operation: recorded,
                ..
            } = &entry.event
            else {
                continue;
            };
            if recorded != operation {
                continue;
            }
            let message_id = *message_id;
            let xml = self.entries[self.cursor..]
                .iter()
                .find_map(|entry| match &entry.event {
                    SessionEvent::ReplyReceived {
                        message_id: id,
                        xml,
                        ..
                    } if *id == message_id => Some(xml.clone()),
                    _ => None,
                })
                .ok_or_else(|| {
                    NetconfError::ReplayMismatchError(format!(
                        "no recorded reply for '{operation}' (message-id {message_id})"
                    ))
                })?;
            return RpcReply::from_element(&decode(xml.as_bytes())?);
        }

        Err(NetconfError::ReplayMismatchError(format!(
            "no replayable request found for operation '{operation}'"
        )))
    }

    /// Builds `request` against the recorded capabilities, then replays it.
    pub fn replay_request<R: RpcRequest + ?Sized>(&mut self, request: &R) -> Result<RpcReply, NetconfError> {
        request.build(&self.capabilities()?)?;
        self.replay_next(request.name())
    }

    /// Replay a sequence of requests without a device.
    pub fn replay_script(&mut self, operations: &[&str]) -> Result<Vec<RpcReply>, NetconfError> {
        operations.iter().map(|op| self.replay_next(op)).collect()
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

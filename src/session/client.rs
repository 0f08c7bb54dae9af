use super::*;

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            observer: Arc::new(LogObserver),
            recorder: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Attaches a recorder. Without one, a recorder is created when
    /// `SessionConfig::recording` is not `Off`.
    pub fn recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Exchanges hellos over `transport` and starts the I/O task.
    ///
    /// The transport is closed when the exchange fails.
    pub async fn open<T>(self, mut transport: T) -> Result<Session, NetconfError>
    where
        T: Transport + 'static,
    {
        let SessionBuilder {
            config,
            observer,
            recorder,
        } = self;
        let recorder = recorder.or_else(|| {
            (config.recording != SessionRecordLevel::Off)
                .then(|| SessionRecorder::new(config.recording))
        });

        let local = Capabilities::new(&config.capabilities)?;
        if local.protocol_versions().is_empty() {
            return Err(NetconfError::CapabilityNegotiation(
                "local capabilities name no base protocol version".to_string(),
            ));
        }

        observer.on_state_change(0, SessionState::Disconnected, SessionState::HelloAwaited);
        let mut frames = FrameBuffer::new(FramingMode::EndOfMessage);
        let exchange = async {
            let hello = Hello {
                session_id: None,
                capabilities: local.clone(),
            };
            let bytes = encode_message(
                &hello.to_element(),
                FramingMode::EndOfMessage,
                config.max_chunk_size,
            )?;
            transport.write(&bytes).await?;
            if let Some(recorder) = recorder.as_ref() {
                let _ = recorder.record_raw_frame(FrameDirection::Outbound, &bytes);
            }
            debug!("hello sent with {} capabilities", local.len());

            loop {
                if let Some(message) = frames.next_message()? {
                    return Hello::from_element(&decode(&message)?);
                }
                match transport.read().await? {
                    Some(bytes) => {
                        if let Some(recorder) = recorder.as_ref() {
                            let _ = recorder.record_raw_frame(FrameDirection::Inbound, &bytes);
                        }
                        frames.push(&bytes);
                    }
                    None => {
                        return Err(NetconfError::Transport(
                            "peer closed the transport before its hello".to_string(),
                        ));
                    }
                }
            }
        };
        let exchanged = match tokio::time::timeout(config.hello_timeout(), exchange).await {
            Ok(result) => result,
            Err(_) => Err(NetconfError::HelloTimeout(config.hello_timeout_secs)),
        };

        let negotiated = exchanged.and_then(|hello| {
            let session_id = hello.session_id.ok_or_else(|| {
                NetconfError::CapabilityNegotiation("peer hello carries no session-id".to_string())
            })?;
            let version = negotiate(&local, &hello.capabilities)?;
            Ok((session_id, version, hello.capabilities))
        });
        let (session_id, version, peer) = match negotiated {
            Ok(negotiated) => negotiated,
            Err(err) => {
                debug!("hello exchange failed: {err}");
                let _ = transport.close().await;
                observer.on_state_change(0, SessionState::HelloAwaited, SessionState::Closed);
                return Err(err);
            }
        };

        frames.set_mode(version.framing());
        debug!("session {session_id} negotiated base {version}");
        if let Some(recorder) = recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::HelloExchanged {
                session_id,
                version,
                peer_capabilities: peer.uris(),
            });
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let inner = Arc::new(SessionInner {
            table: Mutex::new(SessionTable {
                state: SessionState::Active,
                next_message_id: 1,
                pending: HashMap::new(),
            }),
            outbound: outbound_tx,
            session_id,
            version,
            local,
            peer,
            config,
            sinks: Mutex::new(Vec::new()),
            observer,
            recorder: recorder.clone(),
            closed: closed_rx,
        });
        inner.state_changed(SessionState::HelloAwaited, SessionState::Active);

        let io = IoTask {
            transport,
            frames,
            outbound: outbound_rx,
            session: Arc::downgrade(&inner),
            closed: closed_tx,
            recorder,
            session_id,
        };
        tokio::spawn(io.run());

        Ok(Session { inner })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the transport for the lifetime of a session.
struct IoTask<T> {
    transport: T,
    frames: FrameBuffer,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    session: Weak<SessionInner>,
    closed: watch::Sender<bool>,
    recorder: Option<SessionRecorder>,
    session_id: u32,
}

/// Upper bound on flushing queued frames once the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes frames on its own task, so inbound data keeps being read while
/// the peer is slow to accept a large message.
struct DetachedWriter {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    failed: oneshot::Receiver<String>,
    task: JoinHandle<()>,
}

impl DetachedWriter {
    fn spawn(mut writer: Box<dyn TransportWriter>, session_id: u32) -> Self {
        let (frames, mut queued) = mpsc::unbounded_channel::<Vec<u8>>();
        let (failed_tx, failed) = oneshot::channel();
        let task = tokio::spawn(async move {
            while let Some(bytes) = queued.recv().await {
                if let Err(e) = writer.write(&bytes).await {
                    let _ = failed_tx.send(format!("transport write failed: {e}"));
                    return;
                }
            }
            if let Err(e) = writer.close().await {
                debug!("session {} write half close failed: {e}", session_id);
            }
        });
        Self {
            frames,
            failed,
            task,
        }
    }

    /// Stops accepting frames and waits for the queued ones to be written.
    async fn finish(mut self) {
        drop(self.frames);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
    }
}

async fn write_failure(writer: &mut Option<DetachedWriter>) -> String {
    match writer {
        Some(writer) => (&mut writer.failed)
            .await
            .unwrap_or_else(|_| "write task ended".to_string()),
        None => std::future::pending().await,
    }
}

impl<T: Transport> IoTask<T> {
    async fn run(mut self) {
        let mut writer = self
            .transport
            .split_writer()
            .map(|w| DetachedWriter::spawn(w, self.session_id));
        let reason = loop {
            if let Err(reason) = self.drain() {
                break reason;
            }
            tokio::select! {
                outgoing = self.outbound.recv() => match outgoing {
                    Some(Outbound::Message(bytes)) => {
                        trace!("session {} >> {:?}", self.session_id, String::from_utf8_lossy(&bytes));
                        if let Some(recorder) = self.recorder.as_ref() {
                            let _ = recorder.record_raw_frame(FrameDirection::Outbound, &bytes);
                        }
                        match writer.as_ref() {
                            Some(writer) => {
                                if writer.frames.send(bytes).is_err() {
                                    break "write task ended".to_string();
                                }
                            }
                            None => {
                                if let Err(e) = self.transport.write(&bytes).await {
                                    break format!("transport write failed: {e}");
                                }
                            }
                        }
                    }
                    Some(Outbound::Close) => break "closed by client".to_string(),
                    None => break "all session handles dropped".to_string(),
                },
                incoming = self.transport.read() => match incoming {
                    Ok(Some(bytes)) => {
                        trace!("session {} << {:?}", self.session_id, String::from_utf8_lossy(&bytes));
                        if let Some(recorder) = self.recorder.as_ref() {
                            let _ = recorder.record_raw_frame(FrameDirection::Inbound, &bytes);
                        }
                        self.frames.push(&bytes);
                    }
                    Ok(None) => {
                        if self.drain().is_ok() && self.frames.finish().is_err() {
                            break "transport closed inside a message".to_string();
                        }
                        break "transport closed by peer".to_string();
                    }
                    Err(e) => break format!("transport read failed: {e}"),
                },
                reason = write_failure(&mut writer) => break reason,
            }
        };

        if let Some(writer) = writer {
            writer.finish().await;
        }

        if let Err(e) = self.transport.close().await {
            debug!("session {} transport close failed: {e}", self.session_id);
        }
        if let Some(inner) = self.session.upgrade() {
            inner.shutdown(&reason);
        }
        let _ = self.closed.send(true);
        debug!("session {} I/O task ended: {reason}", self.session_id);
    }

    /// Dispatches every complete buffered message. A framing violation
    /// ends the session.
    fn drain(&mut self) -> Result<(), String> {
        loop {
            match self.frames.next_message() {
                Ok(Some(message)) => {
                    if let Some(inner) = self.session.upgrade() {
                        inner.dispatch(&message);
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    let reason = e.to_string();
                    if let Some(inner) = self.session.upgrade() {
                        inner.violation(&reason);
                    }
                    return Err(reason);
                }
            }
        }
    }
}

impl SessionInner {
    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: SessionEvent) {
        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(event);
        }
    }

    fn state_changed(&self, from: SessionState, to: SessionState) {
        self.observer.on_state_change(self.session_id, from, to);
        self.record(SessionEvent::StateChanged { state: to });
    }

    fn violation(&self, reason: &str) {
        self.observer.on_protocol_violation(self.session_id, reason);
        self.record(SessionEvent::ProtocolViolation {
            reason: reason.to_string(),
        });
    }

    fn dispatch(&self, message: &[u8]) {
        let document = match decode(message) {
            Ok(document) => document,
            Err(e) => {
                self.observer.on_malformed_message(self.session_id, &e);
                self.record(SessionEvent::ProtocolViolation {
                    reason: e.to_string(),
                });
                return;
            }
        };
        match document.name() {
            "rpc-reply" => self.resolve(&document, message),
            "notification" => self.route_notification(&document, message),
            other => self.violation(&format!("unexpected <{other}> message")),
        }
    }

    fn resolve(&self, document: &Element, message: &[u8]) {
        let raw_id = document.attribute("message-id");
        let slot = raw_id
            .and_then(|id| id.trim().parse::<u64>().ok())
            .and_then(|id| self.table().pending.remove(&id).map(|slot| (id, slot)));
        let Some((message_id, slot)) = slot else {
            self.observer.on_unknown_message_id(self.session_id, raw_id);
            return;
        };

        let reply = RpcReply::from_element(document);
        self.record(SessionEvent::ReplyReceived {
            message_id,
            ok: reply.as_ref().is_ok_and(RpcReply::is_ok),
            xml: String::from_utf8_lossy(message).into_owned(),
        });
        let _ = slot.send(reply);
    }

    fn route_notification(&self, document: &Element, message: &[u8]) {
        let notification = match Notification::from_element(document) {
            Ok(notification) => notification,
            Err(e) => {
                self.observer.on_malformed_message(self.session_id, &e);
                return;
            }
        };
        self.record(SessionEvent::NotificationReceived {
            event_time: notification.event_time.clone(),
            xml: String::from_utf8_lossy(message).into_owned(),
        });
        let mut sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.retain(|sink| sink.deliver(&notification));
        if sinks.is_empty() {
            trace!("session {} has no notification subscribers", self.session_id);
        }
    }

    /// Moves to `Closed` and fails every pending request.
    fn shutdown(&self, reason: &str) {
        let (from, pending) = {
            let mut table = self.table();
            let from = table.state;
            table.state = SessionState::Closed;
            (from, std::mem::take(&mut table.pending))
        };
        for (_, slot) in pending {
            let _ = slot.send(Err(NetconfError::SessionClosed));
        }
        if from != SessionState::Closed {
            self.state_changed(from, SessionState::Closed);
            self.record(SessionEvent::SessionClosed {
                reason: reason.to_string(),
            });
        }
    }
}

impl PendingReply {
    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    /// Waits for the reply. On timeout the slot is freed and
    /// `RequestTimeout` returned.
    pub async fn wait(mut self, timeout: Duration) -> Result<RpcReply, NetconfError> {
        self.wait_inner(timeout).await
    }

    /// Like [`PendingReply::wait`], giving up with `Cancelled` when `cancel`
    /// completes first.
    pub async fn wait_or_cancel<F>(mut self, timeout: Duration, cancel: F) -> Result<RpcReply, NetconfError>
    where
        F: Future<Output = ()>,
    {
        let message_id = self.message_id;
        tokio::select! {
            result = self.wait_inner(timeout) => result,
            _ = cancel => Err(NetconfError::Cancelled(message_id)),
        }
    }

    /// Gives up on the reply.
    pub fn cancel(self) -> NetconfError {
        NetconfError::Cancelled(self.message_id)
    }

    async fn wait_inner(&mut self, timeout: Duration) -> Result<RpcReply, NetconfError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetconfError::SessionClosed),
            Err(_) => Err(NetconfError::RequestTimeout(self.message_id)),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(inner) = self.session.upgrade() {
            inner.table().pending.remove(&self.message_id);
        }
    }
}

impl Session {
    /// Opens a session with `config` and the logging observer.
    pub async fn open<T>(transport: T, config: SessionConfig) -> Result<Session, NetconfError>
    where
        T: Transport + 'static,
    {
        SessionBuilder::new().config(config).open(transport).await
    }

    /// Connects over SSH and opens a session on the `netconf` subsystem.
    pub async fn connect(
        user: &str,
        addr: &str,
        port: u16,
        password: &str,
        security_options: &ConnectionSecurityOptions,
        config: SessionConfig,
    ) -> Result<Session, NetconfError> {
        let transport = SshTransport::connect(user, addr, port, password, security_options).await?;
        Session::open(transport, config).await
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn session_id(&self) -> u32 {
        self.inner.session_id
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// Capabilities advertised by the peer.
    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.peer
    }

    pub fn local_capabilities(&self) -> &Capabilities {
        &self.inner.local
    }

    pub fn has_capability(&self, uri: &str) -> bool {
        self.inner.peer.has(uri)
    }

    pub fn state(&self) -> SessionState {
        self.inner.table().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn recorder(&self) -> Option<&SessionRecorder> {
        self.inner.recorder.as_ref()
    }

    /// Assigns the next message-id, frames the request and queues it.
    ///
    /// Id allocation, queuing and slot registration happen under one lock,
    /// so transmission order follows call order.
    pub fn send_request(&self, operation: &Element) -> Result<PendingReply, NetconfError> {
        let mut table = self.inner.table();
        match table.state {
            SessionState::Active => {}
            SessionState::Closed => return Err(NetconfError::SessionClosed),
            other => return Err(NetconfError::SessionNotActive(format!("{other:?}"))),
        }

        let message_id = table.next_message_id;
        let rpc = wrap_rpc(operation, message_id);
        let bytes = encode_message(
            &rpc,
            self.inner.version.framing(),
            self.inner.config.max_chunk_size,
        )?;
        table.next_message_id += 1;
        if self.inner.recorder.is_some() {
            let operation = rpc
                .children()
                .first()
                .map_or("rpc", Element::name)
                .to_string();
            self.inner.record(SessionEvent::RpcSent {
                message_id,
                operation,
                xml: rpc.to_xml().unwrap_or_default(),
            });
        }
        self.inner
            .outbound
            .send(Outbound::Message(bytes))
            .map_err(|_| NetconfError::SessionClosed)?;
        let (tx, rx) = oneshot::channel();
        table.pending.insert(message_id, tx);
        drop(table);

        Ok(PendingReply {
            message_id,
            rx,
            session: Arc::downgrade(&self.inner),
        })
    }

    /// Sends `operation` and waits up to `timeout` for the reply.
    pub async fn call(&self, operation: &Element, timeout: Duration) -> Result<RpcReply, NetconfError> {
        self.send_request(operation)?.wait(timeout).await
    }

    /// Builds `request` against the peer capabilities and calls it with the
    /// default request timeout.
    pub async fn execute<R: RpcRequest + ?Sized>(&self, request: &R) -> Result<RpcReply, NetconfError> {
        let operation = request.build(&self.inner.peer)?;
        self.call(&operation, self.inner.config.request_timeout()).await
    }

    pub async fn get(&self, filter: Option<Filter>) -> Result<RpcReply, NetconfError> {
        let mut request = Get::new();
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        self.execute(&request).await
    }

    pub async fn get_config(
        &self,
        source: Datastore,
        filter: Option<Filter>,
    ) -> Result<RpcReply, NetconfError> {
        let mut request = GetConfig::new(source);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        self.execute(&request).await
    }

    pub async fn edit_config(&self, target: Datastore, config: Element) -> Result<RpcReply, NetconfError> {
        self.execute(&EditConfig::new(target, config)).await
    }

    /// Edit with an explicit `<default-operation>`.
    pub async fn edit_config_with(
        &self,
        target: Datastore,
        config: Element,
        default_operation: DefaultOperation,
    ) -> Result<RpcReply, NetconfError> {
        self.execute(&EditConfig::new(target, config).default_operation(default_operation))
            .await
    }

    pub async fn copy_config(
        &self,
        target: Datastore,
        source: impl Into<ConfigSource>,
    ) -> Result<RpcReply, NetconfError> {
        self.execute(&CopyConfig::new(target, source)).await
    }

    pub async fn delete_config(&self, target: Datastore) -> Result<RpcReply, NetconfError> {
        self.execute(&DeleteConfig::new(target)).await
    }

    pub async fn lock(&self, target: Datastore) -> Result<RpcReply, NetconfError> {
        self.execute(&Lock::new(target)).await
    }

    pub async fn unlock(&self, target: Datastore) -> Result<RpcReply, NetconfError> {
        self.execute(&Unlock::new(target)).await
    }

    pub async fn commit(&self) -> Result<RpcReply, NetconfError> {
        self.execute(&Commit::new()).await
    }

    pub async fn discard_changes(&self) -> Result<RpcReply, NetconfError> {
        self.execute(&DiscardChanges).await
    }

    pub async fn validate(&self, source: Datastore) -> Result<RpcReply, NetconfError> {
        self.execute(&Validate::datastore(source)).await
    }

    pub async fn kill_session(&self, session_id: u32) -> Result<RpcReply, NetconfError> {
        self.execute(&KillSession::new(session_id)).await
    }

    pub async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> Result<RpcReply, NetconfError> {
        self.execute(&request).await
    }

    /// Delivers every future notification to `sink`.
    pub fn subscribe(&self, sink: Arc<dyn NotificationSink>) {
        self.inner
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Subscribes a new channel and returns its receiving end.
    pub fn notifications(&self) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(tx));
        rx
    }

    /// Sends close-session, waits for the reply and closes the transport.
    ///
    /// Closing an already closed session succeeds.
    pub async fn close(&self) -> Result<(), NetconfError> {
        let pending = {
            let mut table = self.inner.table();
            match table.state {
                SessionState::Active => {}
                SessionState::Closed => return Ok(()),
                other => return Err(NetconfError::SessionNotActive(format!("{other:?}"))),
            }
            let message_id = table.next_message_id;
            let operation = CloseSession.build(&self.inner.peer)?;
            let bytes = encode_message(
                &wrap_rpc(&operation, message_id),
                self.inner.version.framing(),
                self.inner.config.max_chunk_size,
            )?;
            table.next_message_id += 1;
            self.inner
                .outbound
                .send(Outbound::Message(bytes))
                .map_err(|_| NetconfError::SessionClosed)?;
            let (tx, rx) = oneshot::channel();
            table.pending.insert(message_id, tx);
            table.state = SessionState::Closing;
            PendingReply {
                message_id,
                rx,
                session: Arc::downgrade(&self.inner),
            }
        };
        self.inner
            .state_changed(SessionState::Active, SessionState::Closing);
        debug!("session {} closing", self.inner.session_id);

        let reply = pending.wait(self.inner.config.request_timeout()).await;
        let _ = self.inner.outbound.send(Outbound::Close);
        self.wait_closed().await;
        match reply {
            Ok(reply) => reply.into_result().map(|_| ()),
            Err(NetconfError::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Resolves once the I/O task has ended.
    pub async fn wait_closed(&self) {
        let mut closed = self.inner.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

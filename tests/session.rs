mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::*;
use rnetconf::capabilities::ProtocolVersion;
use rnetconf::codec::FramingMode;
use rnetconf::config::{CAPABILITY_BASE_1_0, CAPABILITY_BASE_1_1, SessionConfig};
use rnetconf::element::Element;
use rnetconf::error::NetconfError;
use rnetconf::rpc::{Datastore, Filter, GetConfig, RpcReply};
use rnetconf::session::{
    ConfigTransaction, SessionBuilder, SessionEvent, SessionRecordLevel, SessionReplayer,
    SessionState, TxStep,
};
use rnetconf::transport::StreamTransport;

const TIMEOUT: Duration = Duration::from_secs(5);

fn get_op() -> Element {
    Element::new("get").with_namespace("urn:ietf:params:xml:ns:netconf:base:1.0")
}

fn interfaces() -> Element {
    Element::new("interfaces")
        .with_namespace("urn:example:if")
        .with_child(
            Element::new("interface")
                .with_child(Element::leaf("name", "eth0"))
                .with_child(Element::leaf("mtu", "9000")),
        )
}

#[tokio::test]
async fn hello_exchange_negotiates_base_1_1() {
    let (session, mut server) = open_pair(BASE_CAPS).await;

    assert_eq!(session.session_id(), SERVER_SESSION_ID);
    assert_eq!(session.protocol_version(), ProtocolVersion::V1_1);
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.has_capability(CAPABILITY_BASE_1_1));
    assert_eq!(server.mode(), FramingMode::Chunked);

    let client_hello = server.client_hello.clone().expect("client hello");
    assert!(client_hello.capabilities.has(CAPABILITY_BASE_1_0));
    assert!(client_hello.capabilities.has(CAPABILITY_BASE_1_1));

    // The server decodes in chunked mode, so this also checks client framing.
    let pending = session.send_request(&get_op()).expect("send");
    let rpc = server.read_rpc().await.expect("rpc");
    assert_eq!(rpc.message_id, 1);
    assert_eq!(rpc.name(), "get");
    server.reply_ok(rpc.message_id).await;
    assert_eq!(pending.wait(TIMEOUT).await.expect("reply"), RpcReply::Ok);
}

#[tokio::test]
async fn base_1_0_peer_keeps_end_of_message_framing() {
    let (session, mut server) = open_pair(&[CAPABILITY_BASE_1_0]).await;
    assert_eq!(session.protocol_version(), ProtocolVersion::V1_0);
    assert_eq!(server.mode(), FramingMode::EndOfMessage);

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.get(None).await }
    });
    let rpc = server.read_rpc().await.expect("rpc");
    server
        .reply(rpc.message_id, "<data><system xmlns=\"urn:example:sys\"/></data>")
        .await;
    let data = call
        .await
        .expect("join")
        .expect("reply")
        .into_data()
        .expect("data");
    assert!(data.child("system").is_some());
}

#[tokio::test]
async fn no_common_version_fails_negotiation() {
    let (client, server) = tokio::io::duplex(16 * 1024);
    let server_task = tokio::spawn(async move {
        let mut fake = FakeServer::new(server);
        fake.send_xml(
            r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities><session-id>3</session-id></hello>"#,
        )
        .await;
        fake.read_message().await
    });
    let config = SessionConfig {
        capabilities: vec![CAPABILITY_BASE_1_0.to_string()],
        ..test_config()
    };
    let err = SessionBuilder::new()
        .config(config)
        .open(StreamTransport::new(client))
        .await
        .err()
        .expect("no common version");
    assert!(matches!(err, NetconfError::CapabilityNegotiation(_)));
    let client_hello = server_task.await.expect("join");
    assert_eq!(client_hello.map(|h| h.name().to_string()).as_deref(), Some("hello"));
}

#[tokio::test]
async fn missing_peer_hello_times_out() {
    let (client, _server) = tokio::io::duplex(16 * 1024);
    let config = SessionConfig {
        hello_timeout_secs: 1,
        ..test_config()
    };
    let err = SessionBuilder::new()
        .config(config)
        .open(StreamTransport::new(client))
        .await
        .err()
        .expect("timeout");
    assert!(matches!(err, NetconfError::HelloTimeout(1)));
}

#[tokio::test]
async fn replies_out_of_order_resolve_their_own_requests() {
    let (session, mut server) = open_pair(BASE_CAPS).await;

    let pending = (0..3)
        .map(|_| session.send_request(&get_op()).expect("send"))
        .collect::<Vec<_>>();
    let ids = pending.iter().map(|p| p.message_id()).collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2, 3]);

    for expected in 1..=3 {
        assert_eq!(server.read_rpc().await.expect("rpc").message_id, expected);
    }
    for id in [3u64, 1, 2] {
        server
            .reply(id, &format!("<data><answer xmlns=\"urn:example:t\">{id}</answer></data>"))
            .await;
    }

    for pending in pending {
        let id = pending.message_id();
        let data = pending
            .wait(TIMEOUT)
            .await
            .expect("reply")
            .into_data()
            .expect("data");
        assert_eq!(data.child_text("answer"), Some(id.to_string().as_str()));
    }
}

#[tokio::test]
async fn concurrent_callers_get_unique_increasing_ids() {
    let (session, mut server) = open_pair(BASE_CAPS).await;

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let pending = session.send_request(&get_op()).expect("send");
            let id = pending.message_id();
            pending.wait(TIMEOUT).await.expect("reply");
            id
        }));
    }

    let mut wire_order = Vec::new();
    for _ in 0..20 {
        let rpc = server.read_rpc().await.expect("rpc");
        wire_order.push(rpc.message_id);
        server.reply_ok(rpc.message_id).await;
    }
    assert!(wire_order.windows(2).all(|w| w[0] < w[1]), "{wire_order:?}");

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.expect("join"));
    }
    assert_eq!(ids, (1..=20).collect::<HashSet<u64>>());
}

#[tokio::test]
async fn unsupported_capability_fails_before_any_bytes_are_written() {
    let (session, mut server) = open_pair(BASE_CAPS).await;

    let err = session
        .edit_config(Datastore::Candidate, interfaces())
        .await
        .expect_err("no candidate");
    assert!(matches!(err, NetconfError::UnsupportedCapability(ref c) if c == ":candidate"));
    server.expect_silence().await;

    // The failed request consumed no message-id.
    let pending = session.send_request(&get_op()).expect("send");
    assert_eq!(pending.message_id(), 1);
}

#[tokio::test]
async fn timed_out_request_frees_its_slot() {
    let observer = RecordingObserver::new();
    let (session, mut server) = open_pair_with(
        BASE_CAPS,
        SessionBuilder::new()
            .config(test_config())
            .observer(observer.clone()),
    )
    .await;

    let err = session
        .call(&get_op(), Duration::from_millis(50))
        .await
        .expect_err("timeout");
    assert!(matches!(err, NetconfError::RequestTimeout(1)));

    let rpc = server.read_rpc().await.expect("rpc");
    server.reply_ok(rpc.message_id).await;
    assert!(eventually(|| observer.unknown_count() == 1).await);
    assert_eq!(
        observer.unknown_ids.lock().expect("lock")[0].as_deref(),
        Some("1")
    );

    let pending = session.send_request(&get_op()).expect("send");
    assert_eq!(pending.message_id(), 2);
}

#[tokio::test]
async fn cancelled_request_reports_late_reply_as_unknown() {
    let observer = RecordingObserver::new();
    let (session, mut server) = open_pair_with(
        BASE_CAPS,
        SessionBuilder::new()
            .config(test_config())
            .observer(observer.clone()),
    )
    .await;

    let pending = session.send_request(&get_op()).expect("send");
    assert!(matches!(pending.cancel(), NetconfError::Cancelled(1)));

    let pending = session.send_request(&get_op()).expect("send");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let waiter = tokio::spawn(async move {
        pending
            .wait_or_cancel(TIMEOUT, async {
                let _ = rx.await;
            })
            .await
    });
    let _ = tx.send(());
    assert!(matches!(
        waiter.await.expect("join"),
        Err(NetconfError::Cancelled(2))
    ));

    for _ in 0..2 {
        let rpc = server.read_rpc().await.expect("rpc");
        server.reply_ok(rpc.message_id).await;
    }
    assert!(eventually(|| observer.unknown_count() == 2).await);
}

#[tokio::test]
async fn rpc_errors_are_values_not_session_faults() {
    let (session, mut server) = open_pair(CANDIDATE_CAPS).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.lock(Datastore::Candidate).await }
    });
    let rpc = server.read_rpc().await.expect("rpc");
    assert_eq!(rpc.name(), "lock");
    server
        .reply(rpc.message_id, &rpc_error("lock-denied", "Lock held by session 3"))
        .await;

    let reply = call.await.expect("join").expect("reply");
    assert!(!reply.is_ok());
    assert_eq!(reply.errors()[0].tag, "lock-denied");
    assert!(matches!(reply.into_result(), Err(NetconfError::Rpc(_))));
    assert!(session.is_active());
}

#[tokio::test]
async fn notifications_reach_every_subscriber() {
    let (session, mut server) = open_pair(BASE_CAPS).await;
    let mut first = session.notifications();
    let mut second = session.notifications();

    server
        .send_xml(r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2024-05-01T10:00:00Z</eventTime><link-down xmlns="urn:example:events"><if-name>eth0</if-name></link-down></notification>"#)
        .await;

    for rx in [&mut first, &mut second] {
        let notification = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("in time")
            .expect("notification");
        assert_eq!(notification.event_time, "2024-05-01T10:00:00Z");
        assert_eq!(notification.event.name(), "link-down");
        assert_eq!(notification.event.child_text("if-name"), Some("eth0"));
    }
}

#[tokio::test]
async fn large_request_and_large_notification_cross_on_a_small_pipe() {
    let builder = SessionBuilder::new().config(test_config());
    let (session, mut server) = open_pair_buffered(CANDIDATE_CAPS, builder, 1024).await;
    let mut notifications = session.notifications();

    let mut config = Element::new("interfaces").with_namespace("urn:example:if");
    for i in 0..1000 {
        config.push_child(
            Element::new("interface")
                .with_child(Element::leaf("name", format!("eth{i}")))
                .with_child(Element::leaf("description", "x".repeat(64))),
        );
    }
    let client = session.clone();
    let request =
        tokio::spawn(async move { client.edit_config(Datastore::Candidate, config).await });

    // Let the client block on the full pipe before the server starts writing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let text = "y".repeat(64 * 1024);
    let exchange = async {
        server
            .send_xml(&format!(
                r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2024-05-01T10:00:00Z</eventTime><log xmlns="urn:example:events"><text>{text}</text></log></notification>"#
            ))
            .await;
        let rpc = server.read_rpc().await.expect("edit-config");
        assert_eq!(rpc.name(), "edit-config");
        assert_eq!(
            rpc.operation
                .child("config")
                .and_then(|c| c.child("interfaces"))
                .map(|i| i.children().len()),
            Some(1000)
        );
        server.reply_ok(rpc.message_id).await;
    };
    tokio::time::timeout(TIMEOUT, exchange)
        .await
        .expect("both directions make progress");

    let reply = request.await.expect("join").expect("edit-config");
    assert_eq!(reply, RpcReply::Ok);
    let notification = tokio::time::timeout(TIMEOUT, notifications.recv())
        .await
        .expect("in time")
        .expect("notification");
    assert_eq!(notification.event.child_text("text").map(str::len), Some(64 * 1024));
}

#[tokio::test]
async fn malformed_and_unexpected_documents_are_discarded() {
    let observer = RecordingObserver::new();
    let (session, mut server) = open_pair_with(
        BASE_CAPS,
        SessionBuilder::new()
            .config(test_config())
            .observer(observer.clone()),
    )
    .await;

    server.send_xml("<rpc-reply message-id=\"1\"><data>").await;
    server.send_xml("<hello/>").await;
    server.send_xml("<rpc-reply><ok/></rpc-reply>").await;

    assert!(eventually(|| observer.malformed.lock().expect("lock").len() == 1).await);
    assert!(eventually(|| observer.violations.lock().expect("lock").len() == 1).await);
    assert!(eventually(|| observer.unknown_count() == 1).await);
    assert_eq!(observer.unknown_ids.lock().expect("lock")[0], None);

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.get(None).await }
    });
    let rpc = server.read_rpc().await.expect("rpc");
    server.reply_ok(rpc.message_id).await;
    assert_eq!(call.await.expect("join").expect("reply"), RpcReply::Ok);
}

#[tokio::test]
async fn transport_eof_fails_pending_requests() {
    let (session, mut server) = open_pair(BASE_CAPS).await;

    let pending = session.send_request(&get_op()).expect("send");
    server.read_rpc().await.expect("rpc");
    drop(server);

    assert!(matches!(
        pending.wait(TIMEOUT).await,
        Err(NetconfError::SessionClosed)
    ));
    session.wait_closed().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.send_request(&get_op()),
        Err(NetconfError::SessionClosed)
    ));
}

#[tokio::test]
async fn close_sends_close_session_and_rejects_later_requests() {
    let observer = RecordingObserver::new();
    let (session, server) = open_pair_with(
        BASE_CAPS,
        SessionBuilder::new()
            .config(test_config())
            .observer(observer.clone()),
    )
    .await;
    let served = tokio::spawn(server.serve(|_| "<ok/>".to_string()));

    session.close().await.expect("close");
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(served.await.expect("join"), vec!["close-session".to_string()]);

    let err = session.get(None).await.expect_err("closed");
    assert!(matches!(err, NetconfError::SessionClosed));
    session.close().await.expect("closing twice is fine");

    let states = observer.states.lock().expect("lock").clone();
    assert_eq!(
        states,
        vec![
            (SessionState::Disconnected, SessionState::HelloAwaited),
            (SessionState::HelloAwaited, SessionState::Active),
            (SessionState::Active, SessionState::Closing),
            (SessionState::Closing, SessionState::Closed),
        ]
    );
}

#[tokio::test]
async fn candidate_transaction_commits_and_unlocks() {
    let (session, server) = open_pair(CANDIDATE_CAPS).await;
    let served = tokio::spawn(server.serve(|_| "<ok/>".to_string()));

    let tx = ConfigTransaction::new("mtu").edit(interfaces());
    let result = session.execute_transaction(&tx).await.expect("transaction");
    assert!(result.committed);
    assert!(result.unlocked);
    assert_eq!(result.applied_edits, 1);
    assert_eq!(result.failed_step, None);

    session.close().await.expect("close");
    assert_eq!(
        served.await.expect("join"),
        vec!["lock", "edit-config", "commit", "unlock", "close-session"]
    );
}

#[tokio::test]
async fn failed_edit_discards_changes_and_unlocks() {
    let (session, server) = open_pair(CANDIDATE_CAPS).await;
    let served = tokio::spawn(server.serve(|rpc| {
        if rpc.name() == "edit-config" {
            rpc_error("invalid-value", "mtu out of range")
        } else {
            "<ok/>".to_string()
        }
    }));

    let tx = ConfigTransaction::new("mtu").edit(interfaces());
    let result = session.execute_transaction(&tx).await.expect("transaction");
    assert!(!result.committed);
    assert_eq!(result.failed_step, Some(TxStep::Edit { index: 0 }));
    assert!(
        result
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("invalid-value"))
    );
    assert!(result.discarded);
    assert!(result.unlocked);
    assert!(result.cleanup_errors.is_empty());

    session.close().await.expect("close");
    assert_eq!(
        served.await.expect("join"),
        vec!["lock", "edit-config", "discard-changes", "unlock", "close-session"]
    );
}

#[tokio::test]
async fn recorded_session_replays_offline() {
    let config = SessionConfig {
        recording: SessionRecordLevel::KeyEventsOnly,
        ..test_config()
    };
    let (session, mut server) =
        open_pair_with(CANDIDATE_CAPS, SessionBuilder::new().config(config)).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .execute(&GetConfig::new(Datastore::Running).filter(Filter::subtree(
                    Element::new("system").with_namespace("urn:example:sys"),
                )))
                .await
        }
    });
    let rpc = server.read_rpc().await.expect("rpc");
    server
        .reply(
            rpc.message_id,
            r#"<data><system xmlns="urn:example:sys"><hostname>r1</hostname></system></data>"#,
        )
        .await;
    call.await.expect("join").expect("reply");

    let recorder = session.recorder().expect("recorder");
    let entries = recorder.entries().expect("entries");
    assert!(entries.iter().all(|e| !matches!(e.event, SessionEvent::RawFrame { .. })));
    assert!(entries.iter().any(|e| matches!(e.event, SessionEvent::HelloExchanged { session_id, .. } if session_id == SERVER_SESSION_ID)));
    assert!(entries.iter().any(|e| matches!(e.event, SessionEvent::RpcSent { ref operation, .. } if operation == "get-config")));

    let mut replayer = SessionReplayer::from_jsonl(&recorder.to_jsonl().expect("jsonl")).expect("load");
    let data = replayer
        .replay_request(&GetConfig::new(Datastore::Running))
        .expect("replay")
        .into_data()
        .expect("data");
    assert_eq!(
        data.child("system").and_then(|s| s.child_text("hostname")),
        Some("r1")
    );
}

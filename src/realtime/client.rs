use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::types::ChatResponse;
use crate::config;
use crate::models::TypingEvent;

use super::frame::{Frame, DEST_CHAT_SEND, DEST_CHAT_TYPING, TOPIC_MESSAGES, TOPIC_TYPING};

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket stream error: {0}")]
    Transport(String),
    #[error("frame decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Inbound traffic and connection-state changes, delivered to whoever owns
/// the receiving end of the event channel.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Message(ChatResponse),
    Typing(TypingEvent),
    ConnectionChanged(bool),
}

/// A connected bidirectional text-frame stream.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), RealtimeError>;
    /// `None` means the peer closed the stream.
    async fn recv(&mut self) -> Option<Result<String, RealtimeError>>;
    async fn close(&mut self);
}

/// Establishes transports. Separate from [`Transport`] so the reconnect loop
/// can be driven by a scripted connector in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, RealtimeError>;
}

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, RealtimeError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connect(Box::new(e)))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), RealtimeError> {
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.to_string())),
                Ok(WsMessage::Close(_)) => return None,
                // Control frames are handled by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(RealtimeError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

enum Command {
    Chat(Value),
    Typing(Value),
}

/// Cheap clonable handle for publishing to the realtime connection.
///
/// Chat messages sent while disconnected are queued and flushed once the
/// supervisor re-establishes the connection. Typing notifications are
/// ephemeral and are dropped instead.
#[derive(Debug, Clone)]
pub struct RealtimeHandle {
    tx: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl RealtimeHandle {
    pub fn send_chat(&self, session_id: &str, message: &str, user_identifier: &str) {
        let body = json!({
            "sessionId": session_id,
            "message": message,
            "userIdentifier": user_identifier,
        });
        let _ = self.tx.send(Command::Chat(body));
    }

    pub fn send_typing(&self, session_id: &str, user_identifier: &str, is_typing: bool) {
        if !self.is_connected() {
            return;
        }
        let body = json!({
            "sessionId": session_id,
            "userIdentifier": user_identifier,
            "isTyping": is_typing,
        });
        let _ = self.tx.send(Command::Typing(body));
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stops the supervisor and closes the transport. Safe to call more than
    /// once and when already disconnected.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }
}

pub struct RealtimeClient;

impl RealtimeClient {
    /// Spawns the connection supervisor on the current tokio runtime and
    /// returns a handle to it. The supervisor keeps reconnecting with a fixed
    /// delay until [`RealtimeHandle::disconnect`] is called.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        url: String,
        events: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> RealtimeHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let handle = RealtimeHandle {
            tx,
            connected: Arc::clone(&connected),
            cancel: cancel.clone(),
        };

        tokio::spawn(supervise(connector, url, events, rx, connected, cancel));

        handle
    }
}

async fn supervise(
    connector: Arc<dyn Connector>,
    url: String,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    // Chat payloads whose transport write failed, replayed before anything
    // else after the next handshake.
    let mut pending: VecDeque<Value> = VecDeque::new();

    loop {
        let transport = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connector.connect(&url) => result,
        };

        let mut transport = match transport {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "realtime connect failed, retrying");
                if wait_for_retry(&cancel).await {
                    return;
                }
                continue;
            }
        };

        if let Err(e) = subscribe_topics(transport.as_mut()).await {
            warn!(error = %e, "realtime subscribe failed, retrying");
            if wait_for_retry(&cancel).await {
                return;
            }
            continue;
        }

        info!("realtime connected");
        connected.store(true, Ordering::SeqCst);
        let _ = events.send(RealtimeEvent::ConnectionChanged(true));

        let dropped = session_loop(
            transport.as_mut(),
            &events,
            &mut commands,
            &mut pending,
            &cancel,
        )
        .await;

        connected.store(false, Ordering::SeqCst);
        let _ = events.send(RealtimeEvent::ConnectionChanged(false));
        transport.close().await;

        if !dropped {
            // disconnect() was requested
            return;
        }

        info!("realtime disconnected, reconnecting");
        if wait_for_retry(&cancel).await {
            return;
        }
    }
}

/// Sleeps out the fixed reconnect delay. Returns true if cancelled.
async fn wait_for_retry(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(config::RECONNECT_DELAY) => false,
    }
}

async fn subscribe_topics(transport: &mut dyn Transport) -> Result<(), RealtimeError> {
    for topic in [TOPIC_MESSAGES, TOPIC_TYPING] {
        let frame = Frame::subscribe(topic).encode()?;
        transport.send(frame).await?;
    }
    Ok(())
}

/// Runs one connected session until the transport drops (returns true) or
/// teardown is requested (returns false). Failed chat writes land back in
/// `pending` so they survive the reconnect.
async fn session_loop(
    transport: &mut dyn Transport,
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<Value>,
    cancel: &CancellationToken,
) -> bool {
    while let Some(body) = pending.pop_front() {
        if let Err(e) = publish(transport, DEST_CHAT_SEND, body.clone()).await {
            warn!(error = %e, "replaying queued message failed");
            pending.push_front(body);
            return true;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,

            cmd = commands.recv() => match cmd {
                Some(Command::Chat(body)) => {
                    if let Err(e) = publish(transport, DEST_CHAT_SEND, body.clone()).await {
                        warn!(error = %e, "chat publish failed, queueing for retry");
                        pending.push_back(body);
                        return true;
                    }
                }
                Some(Command::Typing(body)) => {
                    if let Err(e) = publish(transport, DEST_CHAT_TYPING, body).await {
                        warn!(error = %e, "typing publish failed");
                        return true;
                    }
                }
                // All handles dropped; nothing left to publish but keep
                // receiving until teardown.
                None => return wait_inbound(transport, events, cancel).await,
            },

            msg = transport.recv() => match msg {
                Some(Ok(text)) => dispatch(&text, events),
                Some(Err(e)) => {
                    warn!(error = %e, "realtime stream error");
                    return true;
                }
                None => return true,
            },
        }
    }
}

async fn wait_inbound(
    transport: &mut dyn Transport,
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            msg = transport.recv() => match msg {
                Some(Ok(text)) => dispatch(&text, events),
                _ => return true,
            },
        }
    }
}

async fn publish(
    transport: &mut dyn Transport,
    destination: &str,
    body: Value,
) -> Result<(), RealtimeError> {
    let frame = Frame::send_to(destination, body).encode()?;
    transport.send(frame).await
}

fn dispatch(text: &str, events: &mpsc::UnboundedSender<RealtimeEvent>) {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "discarding undecodable realtime frame");
            return;
        }
    };

    let Frame::Message { topic, body } = frame else {
        debug!(?frame, "ignoring non-message frame from server");
        return;
    };

    match topic.as_str() {
        TOPIC_MESSAGES => match serde_json::from_value::<ChatResponse>(body) {
            Ok(response) => {
                let _ = events.send(RealtimeEvent::Message(response));
            }
            Err(e) => warn!(error = %e, "malformed chat message payload"),
        },
        TOPIC_TYPING => match serde_json::from_value::<TypingEvent>(body) {
            Ok(event) => {
                let _ = events.send(RealtimeEvent::Typing(event));
            }
            Err(e) => warn!(error = %e, "malformed typing payload"),
        },
        other => debug!(topic = other, "message for unknown topic"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Planned {
        Refuse,
        Accept(FakeTransport),
    }

    /// Connector that hands out pre-scripted transports, one per attempt.
    struct FakeConnector {
        script: Mutex<VecDeque<Planned>>,
        attempts: Arc<AtomicUsize>,
    }

    use std::sync::atomic::AtomicUsize;

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, RealtimeError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(Planned::Accept(t)) => Ok(Box::new(t)),
                Some(Planned::Refuse) => Err(RealtimeError::Transport("refused".into())),
                None => futures::future::pending().await,
            }
        }
    }

    struct FakeTransport {
        sent: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&mut self, text: String) -> Result<(), RealtimeError> {
            self.sent
                .send(text)
                .map_err(|_| RealtimeError::Transport("peer gone".into()))
        }

        async fn recv(&mut self) -> Option<Result<String, RealtimeError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) {}
    }

    struct Peer {
        sent: mpsc::UnboundedReceiver<String>,
        incoming: mpsc::UnboundedSender<String>,
    }

    fn transport_pair() -> (FakeTransport, Peer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            FakeTransport {
                sent: sent_tx,
                incoming: in_rx,
            },
            Peer {
                sent: sent_rx,
                incoming: in_tx,
            },
        )
    }

    fn connector(script: Vec<Planned>) -> (Arc<FakeConnector>, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(FakeConnector {
                script: Mutex::new(script.into_iter().collect()),
                attempts: Arc::clone(&attempts),
            }),
            attempts,
        )
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> RealtimeEvent {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_subscribes_and_reports_connected_once() {
        let (transport, mut peer) = transport_pair();
        let (conn, _) = connector(vec![Planned::Accept(transport)]);
        let (event_tx, mut events) = mpsc::unbounded_channel();

        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        let sub1 = peer.sent.recv().await.unwrap();
        let sub2 = peer.sent.recv().await.unwrap();
        assert_eq!(Frame::decode(&sub1).unwrap(), Frame::subscribe(TOPIC_MESSAGES));
        assert_eq!(Frame::decode(&sub2).unwrap(), Frame::subscribe(TOPIC_TYPING));

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("expected connected event, got {other:?}"),
        }
        assert!(handle.is_connected());

        handle.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_are_dispatched_by_topic() {
        let (transport, peer) = transport_pair();
        let (conn, _) = connector(vec![Planned::Accept(transport)]);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("unexpected {other:?}"),
        }

        peer.incoming
            .send(
                json!({
                    "type": "message",
                    "topic": TOPIC_TYPING,
                    "body": {"sessionId": "s1", "userIdentifier": "u1", "isTyping": true},
                })
                .to_string(),
            )
            .unwrap();

        match next_event(&mut events).await {
            RealtimeEvent::Typing(event) => {
                assert_eq!(event.session_id, "s1");
                assert!(event.is_typing);
            }
            other => panic!("expected typing event, got {other:?}"),
        }

        peer.incoming
            .send(
                json!({
                    "type": "message",
                    "topic": TOPIC_MESSAGES,
                    "body": {
                        "messageId": "m1",
                        "sessionId": "s1",
                        "response": "hello",
                        "intent": "greeting",
                        "confidence": 0.9,
                        "source": "nlp",
                        "timestamp": "2025-01-15T10:00:00Z",
                    },
                })
                .to_string(),
            )
            .unwrap();

        match next_event(&mut events).await {
            RealtimeEvent::Message(resp) => assert_eq!(resp.message_id, "m1"),
            other => panic!("expected chat message, got {other:?}"),
        }

        handle.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn typing_while_disconnected_is_a_silent_no_op() {
        let (conn, _) = connector(vec![Planned::Refuse]);
        let (event_tx, _events) = mpsc::unbounded_channel();
        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        assert!(!handle.is_connected());
        // Must neither panic nor error.
        handle.send_typing("s1", "u1", true);
        handle.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn chat_sent_while_disconnected_is_flushed_after_reconnect() {
        let (transport, mut peer) = transport_pair();
        let (conn, attempts) = connector(vec![Planned::Refuse, Planned::Accept(transport)]);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        handle.send_chat("s1", "hello there", "u1");

        // Connected only after the retry delay elapses.
        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        // Two subscribes, then the queued chat message.
        peer.sent.recv().await.unwrap();
        peer.sent.recv().await.unwrap();
        let frame = Frame::decode(&peer.sent.recv().await.unwrap()).unwrap();
        match frame {
            Frame::Send { destination, body } => {
                assert_eq!(destination, DEST_CHAT_SEND);
                assert_eq!(body["message"], "hello there");
            }
            other => panic!("expected send frame, got {other:?}"),
        }

        handle.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn transport_drop_triggers_automatic_reconnect() {
        let (first, peer1) = transport_pair();
        let (second, _peer2) = transport_pair();
        let (conn, attempts) = connector(vec![Planned::Accept(first), Planned::Accept(second)]);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("unexpected {other:?}"),
        }

        // Simulate the peer going away.
        drop(peer1);

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(false) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(!handle.is_connected());

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        handle.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let (transport, _peer) = transport_pair();
        let (conn, _) = connector(vec![Planned::Accept(transport)]);
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let handle = RealtimeClient::spawn(conn, "ws://test".into(), event_tx);

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(true) => {}
            other => panic!("unexpected {other:?}"),
        }

        handle.disconnect();
        handle.disconnect();

        match next_event(&mut events).await {
            RealtimeEvent::ConnectionChanged(false) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}

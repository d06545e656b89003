//! Transport session: owns one physical socket.
//!
//! Drives the connection state machine, the single receive loop, the
//! handshake sequencing (sock-open, CONNECT, CONNECTED), the outbound
//! heartbeat and the background token-refresh cycle. All socket writes
//! funnel through one channel consumed by the receive loop, so there is
//! exactly one writer per connection.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::token::{AuthToken, TokenProvider};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gatelink_wire::constants::{
    headers, ACCEPT_VERSION_VALUE, DISCONNECT_CODE, HEARTBEAT_PAYLOAD, TOKEN_REFRESH_DESTINATION,
};
use gatelink_wire::{Command, Frame, InboundKind, MessageAssembler};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Floor for the refresh timer so a nearly expired token still triggers a
/// prompt (but not busy-looped) refresh.
const REFRESH_MIN_DELAY_MS: u64 = 1_000;
/// Back-off after a failed background refresh. The old token stays in use
/// until the venue actually rejects it.
const REFRESH_RETRY_DELAY_MS: u64 = 60_000;

/// Depth of the outbound write funnel.
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    HandshakeWait,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakePhase {
    Pending,
    Established,
    Failed,
}

/// Receiver of protocol-level inbound events, registered by the layer above.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// One decoded MESSAGE frame. May suspend: pushing into a full
    /// subscription queue blocks the receive loop, which is the session's
    /// backpressure point.
    async fn on_message(&self, frame: Frame);

    /// One decoded ERROR frame from the peer.
    async fn on_error(&self, frame: Frame);

    /// The connection is gone, gracefully or not. Must force-close all
    /// subscriptions so blocked consumers observe end-of-stream.
    fn on_closed(&self);
}

/// One physical gateway connection.
pub struct TransportSession {
    config: SessionConfig,
    token_provider: Arc<dyn TokenProvider>,
    state: RwLock<SessionState>,
    token: RwLock<Option<AuthToken>>,
    outbound_tx: RwLock<Option<mpsc::Sender<Vec<u8>>>>,
    handshake: watch::Sender<HandshakePhase>,
    handler: RwLock<Option<Arc<dyn InboundHandler>>>,
    cancel: CancellationToken,
    conn_cancel: RwLock<Option<CancellationToken>>,
}

impl TransportSession {
    pub fn new(config: SessionConfig, token_provider: Arc<dyn TokenProvider>) -> Arc<Self> {
        let (handshake, _) = watch::channel(HandshakePhase::Pending);
        Arc::new(Self {
            config,
            token_provider,
            state: RwLock::new(SessionState::Idle),
            token: RwLock::new(None),
            outbound_tx: RwLock::new(None),
            handshake,
            handler: RwLock::new(None),
            cancel: CancellationToken::new(),
            conn_cancel: RwLock::new(None),
        })
    }

    /// Register the protocol layer that receives decoded inbound frames.
    pub fn set_handler(&self, handler: Arc<dyn InboundHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Connected means the socket is open AND the handshake completed.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The token currently presented to the gateway.
    pub fn current_token(&self) -> Option<AuthToken> {
        self.token.read().clone()
    }

    /// Session-level cancellation: stops the receive loop and both timers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetch a token, open the socket and block until the gateway confirms
    /// the handshake, the timeout elapses or the session is cancelled.
    pub async fn connect(self: &Arc<Self>, timeout: Duration) -> SessionResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Connected => return Ok(()),
                SessionState::Connecting | SessionState::HandshakeWait | SessionState::Closing => {
                    return Err(SessionError::ConnectInProgress);
                }
                SessionState::Idle | SessionState::Closed => *state = SessionState::Connecting,
            }
        }

        let token = match self.token_provider.fetch_token().await {
            Ok(token) => token,
            Err(e) => {
                *self.state.write() = SessionState::Closed;
                return Err(e);
            }
        };
        *self.token.write() = Some(token);

        // A close() may have landed while the token fetch was in flight.
        if self.state() != SessionState::Connecting {
            *self.state.write() = SessionState::Closed;
            return Err(SessionError::Cancelled);
        }

        let correlation_id = correlation_id();
        let session_id = Uuid::new_v4().simple().to_string();
        let url = self.config.url(&correlation_id, &session_id);
        info!(%url, "connecting to gateway");

        // TCP_NODELAY for lower latency
        let (ws_stream, _response) =
            match connect_async_tls_with_config(&url, None, true, None).await {
                Ok(pair) => pair,
                Err(e) => {
                    *self.state.write() = SessionState::Closed;
                    return Err(e.into());
                }
            };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        *self.outbound_tx.write() = Some(outbound_tx);
        self.handshake.send_replace(HandshakePhase::Pending);

        // The cancellation token must be in place before the state leaves
        // Connecting, so a concurrent close() always finds something to
        // cancel once it observes HandshakeWait.
        let conn_cancel = self.cancel.child_token();
        *self.conn_cancel.write() = Some(conn_cancel.clone());

        {
            let mut state = self.state.write();
            if *state != SessionState::Connecting {
                *state = SessionState::Closed;
                drop(state);
                *self.outbound_tx.write() = None;
                *self.conn_cancel.write() = None;
                return Err(SessionError::Cancelled);
            }
            *state = SessionState::HandshakeWait;
        }

        let (sink, source) = ws_stream.split();
        tokio::spawn(
            self.clone()
                .run_loop(sink, source, outbound_rx, conn_cancel),
        );

        let mut phase_rx = self.handshake.subscribe();
        tokio::select! {
            outcome = tokio::time::timeout(
                timeout,
                phase_rx.wait_for(|phase| *phase != HandshakePhase::Pending),
            ) => match outcome {
                Ok(Ok(phase)) if *phase == HandshakePhase::Established => Ok(()),
                Ok(_) => Err(SessionError::UnexpectedDisconnect(
                    "connection closed during handshake".to_string(),
                )),
                Err(_) => {
                    self.close();
                    Err(SessionError::ConnectTimeout)
                }
            },
            () = self.cancel.cancelled() => {
                self.close();
                Err(SessionError::Cancelled)
            }
        }
    }

    /// Transmit one pre-framed unit. A warning no-op while not connected.
    pub async fn send(&self, unit: Vec<u8>) -> SessionResult<()> {
        if !self.is_connected() {
            warn!("outbound unit ignored: session is not connected");
            return Ok(());
        }
        self.enqueue(unit).await
    }

    /// Begin the close sequence: the receive loop sends the application
    /// disconnect frame, closes the socket and runs the closed-callback.
    /// Closing a session that is still connecting aborts the connect.
    /// Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Idle | SessionState::Closing | SessionState::Closed => return,
                _ => *state = SessionState::Closing,
            }
        }
        info!("closing gateway session");
        let conn_cancel = self.conn_cancel.read().clone();
        if let Some(cancel) = conn_cancel {
            cancel.cancel();
        }
    }

    async fn enqueue(&self, unit: Vec<u8>) -> SessionResult<()> {
        let tx = self.outbound_tx.read().clone();
        match tx {
            Some(tx) => tx.send(unit).await.map_err(|_| SessionError::NotConnected),
            None => Err(SessionError::NotConnected),
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        mut sink: WsSink,
        mut source: WsSource,
        mut outbound_rx: mpsc::Receiver<Vec<u8>>,
        conn_cancel: CancellationToken,
    ) {
        let mut assembler = MessageAssembler::new();
        let mut graceful = false;

        loop {
            tokio::select! {
                () = conn_cancel.cancelled() => {
                    if let Ok(unit) = Frame::new(Command::Disconnect).encode() {
                        let _ = sink
                            .send(Message::Text(String::from_utf8_lossy(&unit).into_owned()))
                            .await;
                    }
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: DISCONNECT_CODE.into(),
                        })))
                        .await;
                    graceful = true;
                    break;
                }

                incoming = source.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(unit) = assembler.push(text.as_bytes(), true) {
                                self.dispatch(&unit).await;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if let Some(unit) = assembler.push(&bytes, true) {
                                self.dispatch(&unit).await;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if sink.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("code={}, reason={}", u16::from(f.code), f.reason))
                                .unwrap_or_else(|| "no close frame".to_string());
                            warn!(%reason, "socket closed by peer");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "socket read error");
                            break;
                        }
                        None => {
                            warn!("socket stream ended");
                            break;
                        }
                    }
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(unit) => {
                            let text = String::from_utf8_lossy(&unit).into_owned();
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                error!(error = %e, "socket write error");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.finish(graceful);
    }

    /// Per-unit dispatch. Failures here are isolated to the one unit: log
    /// and keep the loop alive. Only socket-level errors close the session.
    async fn dispatch(self: &Arc<Self>, unit: &[u8]) {
        if let Err(e) = self.dispatch_inner(unit).await {
            warn!(error = %e, "inbound dispatch failed, unit dropped");
        }
    }

    async fn dispatch_inner(self: &Arc<Self>, unit: &[u8]) -> SessionResult<()> {
        match MessageAssembler::classify(unit) {
            InboundKind::SockOpen => self.send_connect_frame().await,
            InboundKind::Heartbeat => {
                trace!("peer heartbeat");
                Ok(())
            }
            InboundKind::CloseMarker => {
                debug!("peer close marker");
                Ok(())
            }
            InboundKind::Connected => {
                self.on_connected();
                Ok(())
            }
            InboundKind::Message => {
                let frame = Frame::decode(unit)?;
                let handler = self.handler.read().clone();
                match handler {
                    Some(handler) => handler.on_message(frame).await,
                    None => warn!("MESSAGE frame dropped: no inbound handler registered"),
                }
                Ok(())
            }
            InboundKind::Error => {
                let frame = Frame::decode(unit)?;
                error!(
                    message = frame.header("message").unwrap_or(""),
                    "protocol error from gateway"
                );
                let handler = self.handler.read().clone();
                if let Some(handler) = handler {
                    handler.on_error(frame).await;
                }
                Ok(())
            }
            InboundKind::Unrecognized => {
                warn!(len = unit.len(), "unrecognized inbound unit discarded");
                Ok(())
            }
        }
    }

    async fn send_connect_frame(&self) -> SessionResult<()> {
        let token = self
            .token
            .read()
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or(SessionError::NotConnected)?;
        let hb = self.config.heartbeat_interval_ms;
        let frame = Frame::new(Command::Connect)
            .with_header(headers::ACCEPT_VERSION, ACCEPT_VERSION_VALUE)
            .with_header(headers::HEART_BEAT, format!("{hb},{hb}"))
            .with_header(headers::AUTHORIZATION, token);
        debug!("transport open, sending CONNECT");
        self.enqueue(frame.encode()?).await
    }

    fn on_connected(self: &Arc<Self>) {
        *self.state.write() = SessionState::Connected;
        self.handshake.send_replace(HandshakePhase::Established);
        info!("gateway handshake complete");

        let conn_cancel = self.conn_cancel.read().clone();
        let Some(conn_cancel) = conn_cancel else {
            return;
        };
        tokio::spawn(self.clone().run_heartbeat(conn_cancel.clone()));
        tokio::spawn(self.clone().run_token_refresh(conn_cancel));
    }

    async fn run_heartbeat(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.is_connected() {
                        break;
                    }
                    if self.enqueue(HEARTBEAT_PAYLOAD.to_vec()).await.is_err() {
                        break;
                    }
                    trace!("heartbeat sent");
                }
            }
        }
        debug!("heartbeat task stopped");
    }

    /// Recurring refresh, re-armed each cycle from the live token's expiry:
    /// sleep until `expires_at - lead` (with a floor), fetch a replacement,
    /// push the refresh frame carrying old+new values, then repeat against
    /// the new expiry.
    async fn run_token_refresh(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let Some(current) = self.token.read().clone() else {
                break;
            };
            let lead = self.config.token_refresh_lead_ms as i64;
            let delay_ms = (current.ttl_ms() - lead).max(REFRESH_MIN_DELAY_MS as i64) as u64;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
            if !self.is_connected() {
                break;
            }

            match self.token_provider.fetch_token().await {
                Ok(new_token) => {
                    if let Err(e) = self.send_token_refresh(&current, &new_token).await {
                        warn!(error = %e, "failed to send token refresh frame");
                    }
                    *self.token.write() = Some(new_token);
                    debug!("access token refreshed");
                }
                Err(e) => {
                    // Old token remains in use until the venue rejects it.
                    warn!(error = %e, "token refresh failed, keeping current token");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(Duration::from_millis(REFRESH_RETRY_DELAY_MS)) => {}
                    }
                }
            }
        }
        debug!("token refresh task stopped");
    }

    async fn send_token_refresh(
        &self,
        old_token: &AuthToken,
        new_token: &AuthToken,
    ) -> SessionResult<()> {
        let frame = Frame::new(Command::Send)
            .with_header(headers::DESTINATION, TOKEN_REFRESH_DESTINATION)
            .with_header(headers::OLD_TOKEN, old_token.value.as_str())
            .with_header(headers::NEW_TOKEN, new_token.value.as_str());
        self.enqueue(frame.encode()?).await
    }

    fn finish(&self, graceful: bool) {
        let was_closing = matches!(*self.state.read(), SessionState::Closing);
        if let Some(cancel) = self.conn_cancel.write().take() {
            cancel.cancel();
        }
        *self.state.write() = SessionState::Closed;
        *self.outbound_tx.write() = None;
        self.handshake.send_replace(HandshakePhase::Failed);

        if graceful || was_closing {
            info!("gateway session closed");
        } else {
            error!("unexpected disconnect: socket closed without application-level disconnect");
        }

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler.on_closed();
        }
    }
}

/// Random three-digit per-connection correlation id.
fn correlation_id() -> String {
    format!("{:03}", Uuid::new_v4().as_u128() % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;

    fn session() -> Arc<TransportSession> {
        let provider = Arc::new(StaticTokenProvider::new(AuthToken::expires_in("tok", 600)));
        TransportSession::new(SessionConfig::default(), provider)
    }

    #[test]
    fn test_initial_state_is_idle() {
        let session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_connected());
        assert!(session.current_token().is_none());
    }

    #[tokio::test]
    async fn test_send_is_noop_when_disconnected() {
        let session = session();
        let result = session.send(b"a[\"SEND\\n\\n\"]".to_vec()).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_close_is_idempotent_on_idle_session() {
        let session = session();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_malformed_units() {
        let session = session();
        // malformed MESSAGE-classified unit: decode fails, loop must survive
        session.dispatch(b"a[\"MESSAGE no separator\"]").await;
        // unrecognized unit: logged and discarded
        session.dispatch(b"junk").await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_message_without_handler_is_dropped() {
        let session = session();
        session
            .dispatch(b"a[\"MESSAGE\\nsubscription:s1\\n\\n{}\"]")
            .await;
    }

    #[test]
    fn test_correlation_id_is_three_digits() {
        let id = correlation_id();
        assert_eq!(id.len(), 3);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_close_during_connect_aborts_connect() {
        struct ParkedProvider;

        #[async_trait]
        impl TokenProvider for ParkedProvider {
            async fn fetch_token(&self) -> SessionResult<AuthToken> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(AuthToken::expires_in("tok", 600))
            }
        }

        let session = TransportSession::new(SessionConfig::default(), Arc::new(ParkedProvider));
        let connecting = {
            let session = session.clone();
            tokio::spawn(async move { session.connect(Duration::from_secs(5)).await })
        };

        // close while the token fetch holds connect in Connecting
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close();

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
    }
}

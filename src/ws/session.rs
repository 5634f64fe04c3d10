use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _, future};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep, timeout};
use url::Url;

use super::config::{Config, ReconnectSchedule};
use super::error::WsError;
use super::event::{CloseEvent, Direction, SessionEvent};
use super::latency::LatencySamples;
use super::protocol::{CloseCode, NO_STATUS_RECEIVED, OpCode, Packet, decode_frame};
use super::transport::{Connection, Inbound, Outbound, Transport, TungsteniteTransport};
use crate::Result;
use crate::error::Error;

/// Broadcast channel capacity for session events.
const BROADCAST_CAPACITY: usize = 1024;

/// Upper bound for handing a close frame to a peer that stopped reading.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;
type Timer = Pin<Box<Sleep>>;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionState {
    /// No transport, possibly waiting for a scheduled reconnect
    Disconnected,
    /// Opening a transport connection
    Connecting,
    /// Transport open, identify sent, handshake pending
    Connected,
    /// Handshake complete, heartbeats running
    Ready,
}

impl ConnectionState {
    /// Check if the transport is currently open.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }

    /// Check if the handshake completed and heartbeats are running.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send(Packet),
    SetEndpoint(String),
}

/// Handle to one gateway session.
///
/// The session itself runs as a background task that owns the transport connection and every
/// timer (ready, heartbeat, heartbeat acknowledgment, reconnect). It handles:
/// - The identify handshake and, for [`ProtocolRevision::V4`](super::config::ProtocolRevision::V4),
///   its ready timeout
/// - Heartbeats at the server-provided cadence, with a liveness timeout on each acknowledgment
/// - Round-trip latency sampling
/// - Automatic reconnection after any close that was not requested through
///   [`Session::disconnect`]
///
/// Handles are cheap to clone. The task stops once every handle is dropped.
///
/// # Example
///
/// ```rust, no_run
/// use listenmoe_client_sdk::ws::config::Config;
/// use listenmoe_client_sdk::ws::{Session, SessionEvent};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let session = Session::new(Config::default())?;
///     let mut events = session.subscribe();
///     session.connect()?;
///
///     while let Ok(event) = events.recv().await {
///         if let SessionEvent::Message(packet) = event {
///             println!("{:?}: {:?}", packet.event_type, packet.data);
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Session {
    /// Sender for commands handled by the session task
    command_tx: mpsc::UnboundedSender<Command>,
    /// Watch channel receiver for the current state
    state_rx: watch::Receiver<ConnectionState>,
    /// Watch channel receiver for the latest latency samples
    latency_rx: watch::Receiver<LatencySamples>,
    /// Broadcast sender for session events (kept to hand out receivers)
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a session speaking to `config.endpoint` over [`TungsteniteTransport`].
    ///
    /// Nothing is opened until [`Session::connect`] is called. Must be called from within a
    /// Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, Arc::new(TungsteniteTransport))
    }

    /// Create a session that opens its connections through `transport`.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        Url::parse(&config.endpoint)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (latency_tx, latency_rx) = watch::channel(LatencySamples::default());
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let actor = Actor {
            endpoint: config.endpoint.clone(),
            auto_reconnect: config.auto_reconnect,
            schedule: config.reconnect.schedule(),
            attempts: 0,
            config,
            transport,
            command_rx,
            state_tx,
            latency_tx,
            event_tx: event_tx.clone(),
            connecting: None,
            connection: None,
            heartbeat: None,
            pending_ack: None,
            ready_timer: None,
            reconnect_timer: None,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            command_tx,
            state_rx,
            latency_rx,
            event_tx,
        })
    }

    /// Open a new connection, replacing the current one if any.
    ///
    /// Re-enables automatic reconnection if the configuration asks for it, even after
    /// [`Session::disconnect`].
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Close the connection for good: automatic reconnection is disabled and any pending
    /// reconnect is cancelled.
    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Send a packet on the current connection.
    ///
    /// Fails with [`WsError::ConnectionClosed`] when the transport is not open.
    pub fn send(&self, packet: Packet) -> Result<()> {
        if !self.state().is_connected() {
            return Err(WsError::ConnectionClosed.into());
        }
        self.command(Command::Send(packet))
    }

    /// Use `endpoint` from the next connection attempt on.
    pub fn set_endpoint(&self, endpoint: &str) -> Result<()> {
        Url::parse(endpoint)?;
        self.command(Command::SetEndpoint(endpoint.to_owned()))
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Mean heartbeat round-trip time over the last samples.
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        self.latency_rx.borrow().ping()
    }

    /// Last heartbeat round-trip times, newest first.
    #[must_use]
    pub fn latency_data(&self) -> Vec<Duration> {
        self.latency_rx.borrow().samples()
    }

    /// Subscribe to session events.
    ///
    /// Each call returns a new independent receiver that sees events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

/// Heartbeat waiting for its acknowledgment.
struct PendingAck {
    sent_at: Instant,
    deadline: Timer,
}

/// State owned by the session task. Every timer slot holds at most one timer.
struct Actor {
    config: Config,
    endpoint: String,
    transport: Arc<dyn Transport>,
    auto_reconnect: bool,
    schedule: ReconnectSchedule,
    /// Reconnects scheduled since the last successful handshake
    attempts: u32,
    command_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    latency_tx: watch::Sender<LatencySamples>,
    event_tx: broadcast::Sender<SessionEvent>,
    connecting: Option<ConnectFuture>,
    connection: Option<Connection>,
    heartbeat: Option<Interval>,
    pending_ack: Option<PendingAck>,
    ready_timer: Option<Timer>,
    reconnect_timer: Option<Timer>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = resolve(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(connection) => self.opened(connection).await,
                        Err(e) => self.fail(e),
                    }
                }
                frame = next_frame(&mut self.connection) => self.handle_frame(frame).await,
                () = expire(self.pending_ack.as_mut().map(|pending| &mut pending.deadline)) => {
                    self.heartbeat_timed_out().await;
                }
                () = expire(self.ready_timer.as_mut()) => self.ready_timed_out().await,
                () = expire(self.reconnect_timer.as_mut()) => {
                    self.reconnect_timer = None;
                    self.begin_connect();
                }
                () = tick(&mut self.heartbeat) => self.send_heartbeat().await,
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("All session handles dropped, stopping gateway session");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.auto_reconnect = self.config.auto_reconnect;
                self.attempts = 0;
                self.schedule.reset();
                self.begin_connect();
            }
            Command::Disconnect => self.disconnect().await,
            Command::Send(packet) => {
                if self.connection.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(op = ?packet.op, "Dropping packet, gateway connection is closed");
                    return;
                }
                if let Err(e) = self.send_packet(&packet).await {
                    self.fail(e);
                }
            }
            Command::SetEndpoint(endpoint) => self.endpoint = endpoint,
        }
    }

    fn begin_connect(&mut self) {
        self.reconnect_timer = None;
        self.reset_connection();
        self.set_state(ConnectionState::Connecting);

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.endpoint, "Connecting to gateway");

        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        self.connecting = Some(Box::pin(
            async move { transport.connect(&endpoint).await },
        ));
    }

    async fn opened(&mut self, connection: Connection) {
        self.connection = Some(connection);
        self.set_state(ConnectionState::Connected);

        if self.config.protocol.has_ready_timeout() {
            self.ready_timer = Some(Box::pin(sleep(self.config.ready_timeout)));
        }

        let identify = Packet::identify(self.config.token.as_ref());
        if let Err(e) = self.send_packet(&identify).await {
            self.fail(e);
            return;
        }

        self.emit(SessionEvent::Open);
    }

    async fn handle_frame(&mut self, frame: Option<Result<Inbound>>) {
        match frame {
            Some(Ok(Inbound::Text(text))) => self.handle_text(&text).await,
            Some(Ok(Inbound::Close { code, reason })) => self.closed_by_peer(code, reason),
            Some(Err(e)) => self.fail(e),
            None => self.closed_by_peer(None, String::new()),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, error = %e, "Dropping undecodable gateway frame");
                #[cfg(not(feature = "tracing"))]
                let _: &WsError = &e;
                return;
            }
        };

        self.emit(SessionEvent::Raw {
            direction: Direction::In,
            frame: frame.clone(),
        });

        let Ok(packet) = serde_json::from_value::<Packet>(frame) else {
            return;
        };

        match packet.opcode() {
            Some(OpCode::Identify) => self.handle_identify(packet).await,
            Some(OpCode::HeartbeatAck) => self.handle_heartbeat_ack(),
            Some(OpCode::MessageIn) => self.emit(SessionEvent::Message(packet)),
            _ => {}
        }
    }

    async fn handle_identify(&mut self, packet: Packet) {
        let Some(cadence) = packet.heartbeat_interval() else {
            self.handshake_failed().await;
            return;
        };

        self.ready_timer = None;
        self.send_heartbeat().await;
        if self.connection.is_none() {
            return;
        }

        if self.heartbeat.is_none() {
            let period = cadence.max(self.config.min_heartbeat_interval);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.heartbeat = Some(ticker);
        }

        self.attempts = 0;
        self.schedule.reset();
        self.set_state(ConnectionState::Ready);
        self.emit(SessionEvent::Ready(packet));
    }

    async fn send_heartbeat(&mut self) {
        if self.connection.is_none() {
            return;
        }

        self.emit(SessionEvent::Heartbeat);

        // An unanswered heartbeat keeps its waiter: later ticks cannot push the deadline out
        if self.pending_ack.is_none() {
            self.pending_ack = Some(PendingAck {
                sent_at: Instant::now(),
                deadline: Box::pin(sleep(self.config.heartbeat_timeout)),
            });
        }

        if let Err(e) = self.send_packet(&Packet::heartbeat()).await {
            self.fail(e);
        }
    }

    fn handle_heartbeat_ack(&mut self) {
        let Some(pending) = self.pending_ack.take() else {
            #[cfg(feature = "tracing")]
            tracing::trace!("Ignoring heartbeat ack without a pending heartbeat");
            return;
        };

        let latency = pending.sent_at.elapsed();
        self.record_latency(latency);
        self.emit(SessionEvent::HeartbeatAck { latency });
    }

    async fn heartbeat_timed_out(&mut self) {
        if let Some(pending) = self.pending_ack.take() {
            self.record_latency(pending.sent_at.elapsed());
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Heartbeat timeout: no HBACK received within {:?}",
            self.config.heartbeat_timeout
        );

        self.close(
            CloseCode::Timeout,
            "Server did not acknowledge the heartbeat in time.".to_owned(),
        )
        .await;
        self.schedule_reconnect();
    }

    async fn ready_timed_out(&mut self) {
        self.ready_timer = None;

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Ready timeout: no identify acknowledgment within {:?}",
            self.config.ready_timeout
        );

        self.close(
            CloseCode::ReadyTimeout,
            "Server did not complete the handshake in time.".to_owned(),
        )
        .await;
        self.schedule_reconnect();
    }

    async fn handshake_failed(&mut self) {
        let error: Error =
            WsError::InvalidHandshake("server sent invalid HELLO packet".to_owned()).into();
        let reason = error.to_string();

        self.emit(SessionEvent::Error(Arc::new(error)));
        self.close(CloseCode::Error, reason).await;
        self.schedule_reconnect();
    }

    /// Transport failure: the connection is unusable, so no close frame is attempted.
    fn fail(&mut self, error: Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, "Gateway transport error");

        let reason = error.to_string();
        self.emit(SessionEvent::Error(Arc::new(error)));
        self.finish(CloseEvent::new(CloseCode::Error, reason));
        self.schedule_reconnect();
    }

    fn closed_by_peer(&mut self, code: Option<u16>, reason: String) {
        let code = CloseCode::from(code.unwrap_or(NO_STATUS_RECEIVED));
        let reason = if reason.is_empty() {
            "Connection was closed by peer.".to_owned()
        } else {
            reason
        };

        self.finish(CloseEvent::new(code, reason));
        self.schedule_reconnect();
    }

    async fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.reconnect_timer = None;

        if self.connection.is_none() && self.connecting.is_none() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        self.close(
            CloseCode::Disconnect,
            "Connection was manually closed.".to_owned(),
        )
        .await;
    }

    /// Close the current connection with `code`, telling the peer when it is still there.
    async fn close(&mut self, code: CloseCode, reason: String) {
        if let Some(mut connection) = self.connection.take() {
            let frame = Outbound::Close {
                code: code.into(),
                reason: reason.clone(),
            };
            let delivered = timeout(CLOSE_FRAME_TIMEOUT, connection.sink.send(frame)).await;

            #[cfg(feature = "tracing")]
            if !matches!(delivered, Ok(Ok(()))) {
                tracing::debug!(%code, "Close frame could not be delivered");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = &delivered;
        }

        self.finish(CloseEvent::new(code, reason));
    }

    fn finish(&mut self, event: CloseEvent) {
        self.reset_connection();
        self.set_state(ConnectionState::Disconnected);

        #[cfg(feature = "tracing")]
        tracing::debug!(code = %event.code, reason = %event.reason, "Gateway session closed");

        self.emit(SessionEvent::Close(event));
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect || self.reconnect_timer.is_some() {
            return;
        }

        if let Some(max) = self.config.reconnect.max_attempts
            && self.attempts >= max
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("Giving up on the gateway after {max} reconnection attempts");
            return;
        }

        let Some(delay) = self.schedule.next_delay() else {
            return;
        };
        self.attempts = self.attempts.saturating_add(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(?delay, attempt = self.attempts, "Scheduling gateway reconnect");

        self.reconnect_timer = Some(Box::pin(sleep(delay)));
    }

    /// Drop the transport and every per-connection timer. The reconnect timer is untouched.
    fn reset_connection(&mut self) {
        self.connecting = None;
        self.connection = None;
        self.heartbeat = None;
        self.pending_ack = None;
        self.ready_timer = None;
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        if self.connection.is_none() {
            return Err(WsError::ConnectionClosed.into());
        }

        let frame = serde_json::to_value(packet)?;
        let text = frame.to_string();

        #[cfg(feature = "tracing")]
        tracing::trace!(op = ?packet.op, "Sending gateway frame");

        self.emit(SessionEvent::Raw {
            direction: Direction::Out,
            frame,
        });

        match self.connection.as_mut() {
            Some(connection) => connection.sink.send(Outbound::Text(text)).await,
            None => Err(WsError::ConnectionClosed.into()),
        }
    }

    fn record_latency(&self, latency: Duration) {
        self.latency_tx.send_modify(|samples| samples.record(latency));
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(from = %current, to = %state, "Gateway session state changed");

            *current = state;
            true
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        _ = self.event_tx.send(event);
    }
}

async fn resolve(connecting: &mut Option<ConnectFuture>) -> Result<Connection> {
    match connecting {
        Some(attempt) => attempt.as_mut().await,
        None => future::pending().await,
    }
}

async fn next_frame(connection: &mut Option<Connection>) -> Option<Result<Inbound>> {
    match connection {
        Some(connection) => connection.stream.next().await,
        None => future::pending().await,
    }
}

async fn expire(timer: Option<&mut Timer>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use avatar_realtime_types::codec;
use avatar_realtime_types::{AudioFrame, ControlEvent, WireFrame};

use crate::error::Error;

pub mod config;
mod consts;
mod state;
mod stats;
mod utils;

pub use state::ConnectionState;
pub use stats::Stats;

use config::Config;
use state::StateCell;

pub type ClientTx = tokio::sync::mpsc::Sender<WireFrame>;
type ServerTx = tokio::sync::broadcast::Sender<InboundEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<InboundEvent>;
pub type StateRx = tokio::sync::watch::Receiver<ConnectionState>;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Everything fanned out to subscribers of the inbound stream, in
/// arrival order.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Control(ControlEvent),
    Audio(AudioFrame),
    Closed { reason: Option<String> },
    Fatal { attempts: u32 },
}

/// Owns the WebSocket session: dialing, the send/receive pump,
/// reconnection with backoff, and the lifecycle state machine.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    state: StateCell,
    state_rx: StateRx,
    shutdown: Option<tokio::sync::watch::Sender<bool>>,
    pump: Option<tokio::task::JoinHandle<()>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    pub fn new(capacity: usize, config: Config) -> Self {
        let (state, state_rx) = StateCell::new();
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            state,
            state_rx,
            shutdown: None,
            pump: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    /// Dial the endpoint and start the session pump.
    ///
    /// Calling `open` on an already-open session is a no-op. The secret
    /// is validated before any network activity; an initial dial failure
    /// enters the same bounded backoff path as a mid-session drop.
    pub async fn open(&mut self) -> Result<(), Error> {
        match self.state.get() {
            ConnectionState::Idle => {}
            ConnectionState::Closed | ConnectionState::Failed => {
                return Err(Error::Connection("session already ended".to_string()));
            }
            _ => {
                tracing::debug!("open called on a live session");
                return Ok(());
            }
        }

        if !self.config.secret_is_usable() {
            return Err(Error::AuthConfig);
        }

        self.state.set(ConnectionState::Connecting);
        let ws = match dial(&self.config).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!("initial dial failed: {}", e);
                match redial(&self.config, &self.state, &self.stats).await {
                    Some(ws) => ws,
                    None => {
                        return Err(Error::Fatal {
                            attempts: self.config.max_reconnects(),
                        });
                    }
                }
            }
        };
        self.state.set(ConnectionState::Open);
        tracing::info!("connected to {}", self.config.endpoint());

        let (c_tx, c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());
        self.shutdown = Some(shutdown_tx);
        self.pump = Some(tokio::spawn(pump(
            ws,
            c_rx,
            s_tx,
            shutdown_rx,
            self.state.clone(),
            self.config.clone(),
            self.stats.clone(),
        )));
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn state_changes(&self) -> StateRx {
        self.state_rx.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiver for inbound events; every subscriber observes the same
    /// arrival order.
    pub fn subscribe(&self) -> Result<ServerRx, Error> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(Error::Connection("not connected yet".to_string())),
        }
    }

    /// Outbound handle for producer tasks (the capture feed).
    pub fn sender(&self) -> Option<ClientTx> {
        self.c_tx.clone()
    }

    pub fn stats(&self) -> Result<Stats, Error> {
        match self.stats.lock() {
            Ok(guard) => Ok(guard.clone()),
            Err(_) => Err(Error::Connection("stats lock poisoned".to_string())),
        }
    }

    async fn send_frame(&self, frame: WireFrame) -> Result<(), Error> {
        match self.c_tx {
            Some(ref tx) => tx
                .send(frame)
                .await
                .map_err(|_| Error::Connection("session pump stopped".to_string())),
            None => Err(Error::Connection("not connected yet".to_string())),
        }
    }

    pub async fn send_audio(&self, frame: AudioFrame) -> Result<(), Error> {
        self.send_frame(WireFrame::Audio(frame)).await
    }

    pub async fn send_control(&self, event: ControlEvent) -> Result<(), Error> {
        self.send_frame(WireFrame::Control(event)).await
    }

    /// Shut the session down, closing the socket on the way out. Waits a
    /// bounded grace period for the pump to drain, then aborts it so no
    /// half-open socket survives.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(mut pump) = self.pump.take() {
            let grace = Duration::from_millis(consts::SHUTDOWN_GRACE_MS);
            if tokio::time::timeout(grace, &mut pump).await.is_err() {
                tracing::warn!("pump did not stop within grace period, aborting");
                pump.abort();
            }
        }
        self.c_tx = None;
        self.s_tx = None;

        let current = self.state.get();
        if current != ConnectionState::Idle && !current.is_terminal() {
            self.state.set(ConnectionState::Closing);
            self.state.set(ConnectionState::Closed);
        }
    }
}

async fn dial(config: &Config) -> Result<WsStream, Error> {
    let request = utils::build_request(config).map_err(|e| Error::Connection(e.to_string()))?;
    let timeout = Duration::from_millis(config.handshake_timeout_ms());
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(e)) => Err(Error::Connection(e.to_string())),
        Err(_) => Err(Error::Connection(format!(
            "handshake timed out after {}ms",
            config.handshake_timeout_ms()
        ))),
    }
}

/// Bounded exponential-backoff redial. Returns the fresh socket, or
/// `None` once the attempt budget is spent (state moves to `Failed`).
async fn redial(config: &Config, state: &StateCell, stats: &Arc<Mutex<Stats>>) -> Option<WsStream> {
    state.set(ConnectionState::Reconnecting);
    let mut delay = config.initial_backoff_ms();
    for attempt in 1..=config.max_reconnects() {
        tracing::warn!(
            "redialing in {}ms (attempt {}/{})",
            delay,
            attempt,
            config.max_reconnects()
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
        match dial(config).await {
            Ok(ws) => {
                if let Ok(mut stats) = stats.lock() {
                    stats.note_reconnect();
                }
                state.set(ConnectionState::Open);
                return Some(ws);
            }
            Err(e) => tracing::warn!("reconnect attempt {} failed: {}", attempt, e),
        }
        delay = (delay * 2).min(config.max_backoff_ms());
    }
    tracing::error!(
        "retry budget exhausted after {} attempts",
        config.max_reconnects()
    );
    state.set(ConnectionState::Failed);
    None
}

async fn close_socket(
    ws: &mut WsStream,
    state: &StateCell,
    s_tx: &ServerTx,
    reason: Option<String>,
) {
    state.set(ConnectionState::Closing);
    if let Err(e) = ws.close(None).await {
        tracing::debug!("error closing socket: {}", e);
    }
    state.set(ConnectionState::Closed);
    if let Err(e) = s_tx.send(InboundEvent::Closed { reason }) {
        tracing::debug!("no subscribers for close event: {}", e);
    }
}

/// Replace a dead socket or give up. `false` means the retry budget is
/// spent and the pump must stop.
async fn recover(
    ws: &mut WsStream,
    config: &Config,
    state: &StateCell,
    stats: &Arc<Mutex<Stats>>,
    s_tx: &ServerTx,
) -> bool {
    match redial(config, state, stats).await {
        Some(next) => {
            *ws = next;
            true
        }
        None => {
            let _ = s_tx.send(InboundEvent::Fatal {
                attempts: config.max_reconnects(),
            });
            false
        }
    }
}

/// Single task owning the socket: encodes outbound frames, decodes and
/// fans out inbound ones, and runs the reconnect path. Having one owner
/// keeps the arrival order of inbound events identical for every
/// subscriber.
async fn pump(
    mut ws: WsStream,
    mut c_rx: tokio::sync::mpsc::Receiver<WireFrame>,
    s_tx: ServerTx,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    state: StateCell,
    config: Config,
    stats: Arc<Mutex<Stats>>,
) {
    let mut consecutive_decode_failures: u32 = 0;

    // What woke the pump up. Computed inside select! so the socket is
    // only ever borrowed in one place when a step is handled.
    enum Step {
        Shutdown,
        Outbound(Option<WireFrame>),
        Inbound(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    }

    loop {
        let step = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_ok() && !*shutdown_rx.borrow() {
                    continue;
                }
                Step::Shutdown
            }
            outbound = c_rx.recv() => Step::Outbound(outbound),
            inbound = ws.next() => Step::Inbound(inbound),
        };

        match step {
            Step::Shutdown => {
                close_socket(&mut ws, &state, &s_tx, None).await;
                break;
            }
            Step::Outbound(None) => {
                // every sender dropped: nothing more to say
                close_socket(&mut ws, &state, &s_tx, None).await;
                break;
            }
            Step::Outbound(Some(frame)) => match codec::encode(&frame) {
                Ok(bytes) => {
                    if let WireFrame::Audio(ref audio) = frame {
                        if let Ok(mut stats) = stats.lock() {
                            stats.note_sent(audio.t_ms());
                        }
                    }
                    if let Err(e) = ws.send(Message::Binary(bytes)).await {
                        tracing::error!("failed to send message: {}", e);
                        if !recover(&mut ws, &config, &state, &stats, &s_tx).await {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("failed to serialize event: {}", e);
                }
            },
            Step::Inbound(Some(Ok(Message::Binary(bytes)))) => match codec::decode(&bytes) {
                Ok(frame) => {
                    consecutive_decode_failures = 0;
                    if let Ok(mut stats) = stats.lock() {
                        stats.note_received(&frame);
                    }
                    tracing::trace!("received frame at t={}ms", frame.t_ms());
                    let event = match frame {
                        WireFrame::Control(event) => InboundEvent::Control(event),
                        WireFrame::Audio(audio) => InboundEvent::Audio(audio),
                    };
                    if let Err(e) = s_tx.send(event) {
                        tracing::debug!("no live subscribers: {}", e);
                    }
                }
                Err(e) => {
                    consecutive_decode_failures += 1;
                    if let Ok(mut stats) = stats.lock() {
                        stats.note_decode_failure();
                    }
                    tracing::warn!("failed to decode frame: {}", e);
                    if consecutive_decode_failures >= consts::DECODE_FAILURE_LIMIT {
                        tracing::error!(
                            "{} consecutive decode failures, closing session",
                            consecutive_decode_failures
                        );
                        close_socket(
                            &mut ws,
                            &state,
                            &s_tx,
                            Some("decode failure limit exceeded".to_string()),
                        )
                        .await;
                        break;
                    }
                }
            },
            Step::Inbound(Some(Ok(Message::Text(text)))) => {
                tracing::warn!("unexpected text message: {:?}", text);
            }
            Step::Inbound(Some(Ok(Message::Close(reason)))) => {
                tracing::info!("connection closed by peer: {:?}", reason);
                state.set(ConnectionState::Closing);
                state.set(ConnectionState::Closed);
                let reason = reason.map(|r| r.reason.to_string());
                if let Err(e) = s_tx.send(InboundEvent::Closed { reason }) {
                    tracing::debug!("no subscribers for close event: {}", e);
                }
                break;
            }
            Step::Inbound(Some(Ok(_))) => {}
            Step::Inbound(Some(Err(e))) => {
                tracing::error!("transport error: {}", e);
                if !recover(&mut ws, &config, &state, &stats, &s_tx).await {
                    break;
                }
            }
            Step::Inbound(None) => {
                tracing::warn!("socket stream ended");
                if !recover(&mut ws, &config, &state, &stats, &s_tx).await {
                    break;
                }
            }
        }
    }
}

pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client, Error> {
    let mut client = Client::new(capacity, config);
    client.open().await?;
    Ok(client)
}

pub async fn connect() -> Result<Client, Error> {
    connect_with_config(1024, Config::new()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str) -> Config {
        Config::builder()
            .with_endpoint("ws://127.0.0.1:9")
            .with_secret(secret)
            .with_handshake_timeout_ms(200)
            .with_max_reconnects(0)
            .with_backoff_ms(1, 2)
            .build()
    }

    #[tokio::test]
    async fn empty_secret_fails_without_dialing() {
        let mut client = Client::new(8, test_config(""));
        match client.open().await {
            Err(Error::AuthConfig) => {}
            other => panic!("expected AuthConfig, got {:?}", other),
        }
        // never left Idle, so no dial was attempted
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn placeholder_secret_fails_without_dialing() {
        let mut client = Client::new(8, test_config(consts::PLACEHOLDER_SECRET));
        assert!(matches!(client.open().await, Err(Error::AuthConfig)));
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_is_fatal() {
        let mut client = Client::new(8, test_config("secret"));
        match client.open().await {
            Err(Error::Fatal { attempts: 0 }) => {}
            other => panic!("expected Fatal, got {:?}", other),
        }
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn close_before_open_is_a_noop() {
        let mut client = Client::new(8, test_config("secret"));
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn send_before_open_is_refused() {
        let client = Client::new(8, test_config("secret"));
        let result = client
            .send_control(ControlEvent::SessionEnd { t_ms: 0 })
            .await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}

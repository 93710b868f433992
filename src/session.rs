use avatar_realtime_types::audio::{WIRE_CHANNELS, WIRE_SAMPLE_RATE};
use avatar_realtime_types::ControlEvent;

use crate::client::config::Config;
use crate::client::{Client, ClientTx, ConnectionState, ServerRx};
use crate::error::Error;

/// Opaque proof that a user is signed in. Obtained from the identity
/// layer; the client only checks for its presence.
#[derive(Debug, Clone)]
pub struct AuthSession {
    identity: String,
}

impl AuthSession {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Turns user intent (start/stop talking, sign-out) into connection and
/// pipeline state transitions. Owns the connection and any registered
/// capture tasks; `stop_talking` releases both on every path.
pub struct SessionController {
    capacity: usize,
    config: Config,
    auth: Option<AuthSession>,
    client: Option<Client>,
    capture_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        Self {
            capacity: 1024,
            config,
            auth: None,
            client: None,
            capture_tasks: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Install the signed-in user's session capability.
    pub fn authenticate(&mut self, auth: AuthSession) {
        tracing::debug!("session authenticated for {}", auth.identity());
        self.auth = Some(auth);
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn is_talking(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|c| !c.state().is_terminal())
    }

    /// Asset filename for the renderer boundary.
    pub fn avatar_file(&self) -> &str {
        self.config.avatar_file()
    }

    /// Bone the lip-sync output targets.
    pub fn jaw_bone(&self) -> &str {
        self.config.jaw_bone()
    }

    /// Open the connection and announce the outbound audio format.
    ///
    /// Requires an authenticated session; without one this fails before
    /// any connection attempt. Calling it while already talking is a
    /// no-op.
    pub async fn start_talking(&mut self) -> Result<(), Error> {
        if self.auth.is_none() {
            return Err(Error::Unauthenticated);
        }
        if self.is_talking() {
            tracing::debug!("already talking");
            return Ok(());
        }

        let mut client = Client::new(self.capacity, self.config.clone());
        if let Err(e) = client.open().await {
            client.close().await;
            return Err(e);
        }
        let started = client
            .send_control(ControlEvent::SessionStart {
                t_ms: 0,
                sample_rate: WIRE_SAMPLE_RATE,
                channels: WIRE_CHANNELS,
            })
            .await;
        if let Err(e) = started {
            client.close().await;
            return Err(e);
        }

        self.client = Some(client);
        tracing::info!("talking session started");
        Ok(())
    }

    /// Register a capture task whose lifetime is bound to the talking
    /// session; `stop_talking` aborts it, which drops the device stream
    /// it owns.
    pub fn attach_capture(&mut self, task: tokio::task::JoinHandle<()>) {
        self.capture_tasks.push(task);
    }

    /// Outbound handle for the capture feed, while talking.
    pub fn outbound(&self) -> Option<ClientTx> {
        self.client.as_ref().and_then(|c| c.sender())
    }

    /// Inbound event stream, while talking.
    pub fn events(&self) -> Result<ServerRx, Error> {
        match self.client {
            Some(ref client) => client.subscribe(),
            None => Err(Error::Connection("not talking".to_string())),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client
            .as_ref()
            .map_or(ConnectionState::Idle, |c| c.state())
    }

    /// Release the microphone and the socket. Safe to call at any time,
    /// any number of times.
    pub async fn stop_talking(&mut self) {
        for task in self.capture_tasks.drain(..) {
            task.abort();
        }
        if let Some(mut client) = self.client.take() {
            let t_ms = client
                .stats()
                .map(|s| s.last_outbound_t_ms())
                .unwrap_or_default();
            if let Err(e) = client.send_control(ControlEvent::SessionEnd { t_ms }).await {
                tracing::debug!("session end not delivered: {}", e);
            }
            client.close().await;
            tracing::info!("talking session stopped");
        }
    }

    /// Forced teardown on sign-out; the session capability is dropped
    /// regardless of in-flight work.
    pub async fn on_sign_out(&mut self) {
        self.stop_talking().await;
        self.auth = None;
        tracing::info!("signed out, session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::builder()
            .with_endpoint("ws://127.0.0.1:9")
            .with_secret("secret")
            .with_handshake_timeout_ms(200)
            .with_max_reconnects(0)
            .with_backoff_ms(1, 2)
            .build()
    }

    #[tokio::test]
    async fn start_requires_authentication() {
        let mut controller = SessionController::new(test_config());
        assert!(matches!(
            controller.start_talking().await,
            Err(Error::Unauthenticated)
        ));
        assert!(!controller.is_talking());
    }

    #[tokio::test]
    async fn failed_start_leaves_nothing_behind() {
        let mut controller = SessionController::new(test_config());
        controller.authenticate(AuthSession::new("user@example.com"));
        assert!(controller.start_talking().await.is_err());
        assert!(!controller.is_talking());
        assert!(controller.outbound().is_none());
    }

    #[tokio::test]
    async fn stop_aborts_registered_capture() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut controller = SessionController::new(test_config());
        controller.authenticate(AuthSession::new("user@example.com"));
        controller.attach_capture(tokio::spawn(async move {
            let _keep_mic_open = tx;
            std::future::pending::<()>().await;
        }));

        controller.stop_talking().await;
        // the capture task was aborted, dropping its side of the channel
        assert!(rx.await.is_err());
        assert!(!controller.is_talking());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut controller = SessionController::new(test_config());
        controller.authenticate(AuthSession::new("user@example.com"));
        controller.stop_talking().await;
        controller.stop_talking().await;
        assert!(!controller.is_talking());
        assert!(controller.is_authenticated());
    }

    #[tokio::test]
    async fn sign_out_drops_the_capability() {
        let mut controller = SessionController::new(test_config());
        controller.authenticate(AuthSession::new("user@example.com"));
        controller.on_sign_out().await;
        assert!(!controller.is_authenticated());
        assert!(matches!(
            controller.start_talking().await,
            Err(Error::Unauthenticated)
        ));
    }
}

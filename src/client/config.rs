use secrecy::{ExposeSecret, SecretString};

use crate::client::consts::*;

/// Immutable session configuration, injected at construction. The four
/// deployment inputs (endpoint, secret, avatar asset, jaw bone) plus the
/// reconnect tuning knobs.
#[derive(Clone)]
pub struct Config {
    endpoint: String,
    secret: SecretString,
    avatar_file: String,
    jaw_bone: String,
    handshake_timeout_ms: u64,
    max_reconnects: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.config.endpoint = endpoint.to_string();
        self
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.config.secret = SecretString::from(secret.to_string());
        self
    }

    pub fn with_avatar_file(mut self, avatar_file: &str) -> Self {
        self.config.avatar_file = avatar_file.to_string();
        self
    }

    pub fn with_jaw_bone(mut self, jaw_bone: &str) -> Self {
        self.config.jaw_bone = jaw_bone.to_string();
        self
    }

    pub fn with_handshake_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.handshake_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_reconnects(mut self, attempts: u32) -> Self {
        self.config.max_reconnects = attempts;
        self
    }

    pub fn with_backoff_ms(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.config.initial_backoff_ms = initial_ms;
        self.config.max_backoff_ms = max_ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the deployment inputs read from the environment.
    pub fn new() -> Self {
        Self {
            endpoint: std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            secret: std::env::var(API_SECRET_ENV)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            avatar_file: std::env::var(AVATAR_FILE_ENV)
                .unwrap_or_else(|_| DEFAULT_AVATAR_FILE.to_string()),
            jaw_bone: std::env::var(JAW_BONE_ENV)
                .unwrap_or_else(|_| DEFAULT_JAW_BONE.to_string()),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// A secret that is empty or still the template placeholder never
    /// reaches the wire.
    pub fn secret_is_usable(&self) -> bool {
        let secret = self.secret.expose_secret();
        !secret.is_empty() && secret != PLACEHOLDER_SECRET
    }

    pub fn avatar_file(&self) -> &str {
        &self.avatar_file
    }

    pub fn jaw_bone(&self) -> &str {
        &self.jaw_bone
    }

    pub fn handshake_timeout_ms(&self) -> u64 {
        self.handshake_timeout_ms
    }

    pub fn max_reconnects(&self) -> u32 {
        self.max_reconnects
    }

    pub fn initial_backoff_ms(&self) -> u64 {
        self.initial_backoff_ms
    }

    pub fn max_backoff_ms(&self) -> u64 {
        self.max_backoff_ms
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_secret_is_unusable() {
        let config = Config::builder().with_secret(PLACEHOLDER_SECRET).build();
        assert!(!config.secret_is_usable());

        let config = Config::builder().with_secret("").build();
        assert!(!config.secret_is_usable());

        let config = Config::builder().with_secret("a-real-secret").build();
        assert!(config.secret_is_usable());
    }
}

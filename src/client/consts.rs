pub const API_URL_ENV: &str = "AVATAR_API_URL";
pub const API_SECRET_ENV: &str = "AVATAR_API_SECRET";
pub const AVATAR_FILE_ENV: &str = "AVATAR_FILE";
pub const JAW_BONE_ENV: &str = "AVATAR_JAW_BONE";

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
pub const DEFAULT_AVATAR_FILE: &str = "sophia.glb";
pub const DEFAULT_JAW_BONE: &str = "rp_sophia_animated_003_idling_jaw";

/// Secret value shipped in deployment templates before provisioning.
pub const PLACEHOLDER_SECRET: &str = "Your-own-long-secret-text-to-access-the-api";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_RECONNECTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;

/// Consecutive decode failures tolerated before the session closes.
pub const DECODE_FAILURE_LIMIT: u32 = 8;

/// How long `close` waits for the pump to drain before aborting it.
pub const SHUTDOWN_GRACE_MS: u64 = 2_000;

use avatar_realtime_types::codec::DecodeError;

/// Errors surfaced by the client. Transient transport and decode
/// failures are absorbed internally with bounded retry; everything
/// here reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The access secret is missing or still the deployment placeholder.
    #[error("access secret is missing or unconfigured")]
    AuthConfig,
    /// No authenticated session capability is present.
    #[error("no authenticated session")]
    Unauthenticated,
    /// Transport-level failure.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Malformed wire data.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The outbound queue overflowed and dropped its oldest frame.
    #[error("outbound queue overflowed, oldest frame dropped")]
    Backpressure,
    /// The reconnect budget is exhausted; the session is dead.
    #[error("retry budget exhausted after {attempts} reconnect attempts")]
    Fatal { attempts: u32 },
}

mod client;
mod error;
pub mod lipsync;
pub mod pipeline;
pub mod session;

pub use avatar_realtime_types as types;

pub use client::config::{Config, ConfigBuilder};
pub use client::{
    connect, connect_with_config, Client, ClientTx, ConnectionState, InboundEvent, ServerRx,
    StateRx, Stats,
};
pub use error::Error;
pub use session::{AuthSession, SessionController};

#[cfg(feature = "utils")]
pub use avatar_realtime_utils as utils;

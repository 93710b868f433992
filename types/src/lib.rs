pub mod audio;
pub mod codec;
pub mod events;

pub use audio::{AudioFrame, Direction};
pub use codec::{DecodeError, WireFrame};
pub use events::ControlEvent;

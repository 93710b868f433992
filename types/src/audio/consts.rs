/// Sample rate of PCM16 audio exchanged with the speech backend.
pub const WIRE_SAMPLE_RATE: u32 = 24_000;

/// Audio on the wire is mono; channel fan-out happens at playback.
pub const WIRE_CHANNELS: u16 = 1;

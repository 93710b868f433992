mod consts;

pub use consts::*;

/// Which endpoint produced a frame. Outbound frames carry microphone
/// audio towards the speech backend, inbound frames carry synthesized
/// speech back for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    #[serde(rename = "outbound")]
    Outbound,
    #[serde(rename = "inbound")]
    Inbound,
}

/// A fixed-duration slice of PCM16 audio on the session timeline.
///
/// Frames are immutable once constructed and ordered by `seq` within a
/// session. `t_ms` is the position of the first sample on the audio
/// timeline shared with [`crate::ControlEvent`] markers.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    seq: u64,
    t_ms: u64,
    sample_rate: u32,
    channels: u16,
    direction: Direction,
    pcm: Vec<i16>,
}

impl AudioFrame {
    /// Build a frame in the wire format (24kHz mono PCM16).
    pub fn new(seq: u64, t_ms: u64, direction: Direction, pcm: Vec<i16>) -> Self {
        Self {
            seq,
            t_ms,
            sample_rate: WIRE_SAMPLE_RATE,
            channels: WIRE_CHANNELS,
            direction,
            pcm,
        }
    }

    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn t_ms(&self) -> u64 {
        self.t_ms
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn pcm(&self) -> &[i16] {
        &self.pcm
    }

    /// Frame duration derived from the sample count and format.
    pub fn duration_ms(&self) -> u64 {
        let frames = self.pcm.len() as u64 / self.channels.max(1) as u64;
        frames * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Convert normalized `f32` samples to PCM16, clamping out-of-range input.
pub fn pcm16_from_f32(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Convert PCM16 samples to normalized `f32` in `[-1.0, 1.0]`.
pub fn f32_from_pcm16(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 / i16::MAX as f32).clamp(-1.0, 1.0))
        .collect()
}

mod test {

    #[test]
    fn test_duration() {
        let frame = super::AudioFrame::new(0, 0, super::Direction::Outbound, vec![0i16; 480]);
        assert_eq!(frame.duration_ms(), 20);

        let frame = super::AudioFrame::new(0, 0, super::Direction::Inbound, vec![0i16; 960])
            .with_format(48_000, 2);
        assert_eq!(frame.duration_ms(), 10);
    }

    #[test]
    fn test_pcm16_conversion() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0, 2.0];
        let pcm = super::pcm16_from_f32(&samples);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[3], i16::MAX);
        assert_eq!(pcm[5], i16::MAX);

        let back = super::f32_from_pcm16(&pcm);
        assert!((back[1] - 0.5).abs() < 1e-3);
        assert!((back[2] + 0.5).abs() < 1e-3);
    }
}

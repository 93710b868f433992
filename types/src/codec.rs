use crate::audio::{AudioFrame, Direction};
use crate::events::ControlEvent;

/// First byte of every wire message.
pub const CONTROL_DISCRIMINANT: u8 = 0x00;
pub const AUDIO_DISCRIMINANT: u8 = 0x01;

/// Discriminant, direction, seq, t_ms, sample_rate, channels.
const AUDIO_HEADER_LEN: usize = 1 + 1 + 8 + 8 + 4 + 2;

const DIRECTION_OUTBOUND: u8 = 0x00;
const DIRECTION_INBOUND: u8 = 0x01;

/// One message on the socket: either a control event (JSON body) or an
/// audio frame (fixed header plus PCM16 payload, little-endian).
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Control(ControlEvent),
    Audio(AudioFrame),
}

impl WireFrame {
    pub fn t_ms(&self) -> u64 {
        match self {
            WireFrame::Control(event) => event.t_ms(),
            WireFrame::Audio(frame) => frame.t_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty wire message")]
    Empty,
    #[error("unknown frame discriminant {0:#04x}")]
    UnknownDiscriminant(u8),
    #[error("unknown direction byte {0:#04x}")]
    UnknownDirection(u8),
    #[error("truncated audio header: {got} of {want} bytes")]
    Truncated { got: usize, want: usize },
    #[error("audio payload of {0} bytes is not whole pcm16 samples")]
    OddPayload(usize),
    #[error("malformed control event: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn encode(frame: &WireFrame) -> Result<Vec<u8>, serde_json::Error> {
    match frame {
        WireFrame::Control(event) => {
            let body = serde_json::to_vec(event)?;
            let mut bytes = Vec::with_capacity(1 + body.len());
            bytes.push(CONTROL_DISCRIMINANT);
            bytes.extend_from_slice(&body);
            Ok(bytes)
        }
        WireFrame::Audio(frame) => {
            let mut bytes = Vec::with_capacity(AUDIO_HEADER_LEN + frame.pcm().len() * 2);
            bytes.push(AUDIO_DISCRIMINANT);
            bytes.push(match frame.direction() {
                Direction::Outbound => DIRECTION_OUTBOUND,
                Direction::Inbound => DIRECTION_INBOUND,
            });
            bytes.extend_from_slice(&frame.seq().to_le_bytes());
            bytes.extend_from_slice(&frame.t_ms().to_le_bytes());
            bytes.extend_from_slice(&frame.sample_rate().to_le_bytes());
            bytes.extend_from_slice(&frame.channels().to_le_bytes());
            for sample in frame.pcm() {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            Ok(bytes)
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<WireFrame, DecodeError> {
    let (&discriminant, body) = bytes.split_first().ok_or(DecodeError::Empty)?;
    match discriminant {
        CONTROL_DISCRIMINANT => {
            let event = serde_json::from_slice::<ControlEvent>(body)?;
            Ok(WireFrame::Control(event))
        }
        AUDIO_DISCRIMINANT => decode_audio(bytes),
        other => Err(DecodeError::UnknownDiscriminant(other)),
    }
}

fn decode_audio(bytes: &[u8]) -> Result<WireFrame, DecodeError> {
    if bytes.len() < AUDIO_HEADER_LEN {
        return Err(DecodeError::Truncated {
            got: bytes.len(),
            want: AUDIO_HEADER_LEN,
        });
    }
    let direction = match bytes[1] {
        DIRECTION_OUTBOUND => Direction::Outbound,
        DIRECTION_INBOUND => Direction::Inbound,
        other => return Err(DecodeError::UnknownDirection(other)),
    };
    let mut u64_buf = [0u8; 8];
    u64_buf.copy_from_slice(&bytes[2..10]);
    let seq = u64::from_le_bytes(u64_buf);
    u64_buf.copy_from_slice(&bytes[10..18]);
    let t_ms = u64::from_le_bytes(u64_buf);
    let mut u32_buf = [0u8; 4];
    u32_buf.copy_from_slice(&bytes[18..22]);
    let sample_rate = u32::from_le_bytes(u32_buf);
    let channels = u16::from_le_bytes([bytes[22], bytes[23]]);

    let payload = &bytes[AUDIO_HEADER_LEN..];
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddPayload(payload.len()));
    }
    let pcm = payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(WireFrame::Audio(
        AudioFrame::new(seq, t_ms, direction, pcm).with_format(sample_rate, channels),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: WireFrame) {
        let bytes = encode(&frame).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn control_events_roundtrip() {
        roundtrip(WireFrame::Control(ControlEvent::SessionStart {
            t_ms: 0,
            sample_rate: 24_000,
            channels: 1,
        }));
        roundtrip(WireFrame::Control(ControlEvent::SessionEnd { t_ms: 1200 }));
        roundtrip(WireFrame::Control(ControlEvent::SpeechStarted { t_ms: 10 }));
        roundtrip(WireFrame::Control(ControlEvent::SpeechEnded { t_ms: 250 }));
        roundtrip(WireFrame::Control(ControlEvent::VisemeMarker {
            t_ms: 40,
            amplitude: 0.75,
            viseme: Some("oh".to_string()),
        }));
        roundtrip(WireFrame::Control(ControlEvent::Error {
            t_ms: 99,
            code: Some("throttled".to_string()),
            message: "slow down".to_string(),
        }));
    }

    #[test]
    fn audio_frames_roundtrip() {
        roundtrip(WireFrame::Audio(AudioFrame::new(
            7,
            140,
            Direction::Outbound,
            vec![0, 1, -1, i16::MAX, i16::MIN],
        )));
        roundtrip(WireFrame::Audio(
            AudioFrame::new(8, 160, Direction::Inbound, vec![]).with_format(48_000, 2),
        ));
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(decode(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn unknown_discriminant_fails() {
        assert!(matches!(
            decode(&[0x7f, 0, 0]),
            Err(DecodeError::UnknownDiscriminant(0x7f))
        ));
    }

    #[test]
    fn truncated_audio_header_fails() {
        let frame = WireFrame::Audio(AudioFrame::new(1, 20, Direction::Inbound, vec![42]));
        let bytes = encode(&frame).unwrap();
        assert!(matches!(
            decode(&bytes[..AUDIO_HEADER_LEN - 3]),
            Err(DecodeError::Truncated { want, .. }) if want == AUDIO_HEADER_LEN
        ));
    }

    #[test]
    fn odd_payload_fails() {
        let frame = WireFrame::Audio(AudioFrame::new(1, 20, Direction::Inbound, vec![42, 43]));
        let mut bytes = encode(&frame).unwrap();
        bytes.pop();
        assert!(matches!(decode(&bytes), Err(DecodeError::OddPayload(3))));
    }

    #[test]
    fn malformed_control_body_fails() {
        let mut bytes = vec![CONTROL_DISCRIMINANT];
        bytes.extend_from_slice(b"{\"type\":\"viseme.marker\",\"t_ms\":");
        assert!(matches!(decode(&bytes), Err(DecodeError::Malformed(_))));
    }
}

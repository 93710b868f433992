/// Control messages shared by both ends of the session.
///
/// Every variant is tagged with `t_ms`, the position on the session audio
/// timeline it refers to. Timestamps are monotonically increasing within
/// a session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    /// Client is about to stream microphone audio.
    #[serde(rename = "session.start")]
    SessionStart {
        t_ms: u64,
        sample_rate: u32,
        channels: u16,
    },
    /// Client is done; no further frames follow.
    #[serde(rename = "session.end")]
    SessionEnd { t_ms: u64 },
    /// Backend started synthesizing speech at this timeline position.
    #[serde(rename = "speech.started")]
    SpeechStarted { t_ms: u64 },
    /// Backend finished speaking; the jaw should return to rest.
    #[serde(rename = "speech.ended")]
    SpeechEnded { t_ms: u64 },
    /// Mouth-shape marker for lip-sync. `amplitude` is the jaw opening in
    /// `[0.0, 1.0]`; `viseme` optionally names the shape.
    #[serde(rename = "viseme.marker")]
    VisemeMarker {
        t_ms: u64,
        amplitude: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        viseme: Option<String>,
    },
    /// Backend-reported error, non-fatal unless the connection drops.
    #[serde(rename = "error")]
    Error {
        t_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl ControlEvent {
    /// The audio timeline position this event refers to.
    pub fn t_ms(&self) -> u64 {
        match self {
            ControlEvent::SessionStart { t_ms, .. } => *t_ms,
            ControlEvent::SessionEnd { t_ms } => *t_ms,
            ControlEvent::SpeechStarted { t_ms } => *t_ms,
            ControlEvent::SpeechEnded { t_ms } => *t_ms,
            ControlEvent::VisemeMarker { t_ms, .. } => *t_ms,
            ControlEvent::Error { t_ms, .. } => *t_ms,
        }
    }
}

mod test {

    #[test]
    fn test_serialize() {
        let event = super::ControlEvent::VisemeMarker {
            t_ms: 100,
            amplitude: 0.5,
            viseme: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        let expected = r#"{"type":"viseme.marker","t_ms":100,"amplitude":0.5}"#;
        assert_eq!(json, expected);

        let event = super::ControlEvent::SessionStart {
            t_ms: 0,
            sample_rate: 24_000,
            channels: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        let expected = r#"{"type":"session.start","t_ms":0,"sample_rate":24000,"channels":1}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_deserialize() {
        let json = r#"{"type":"speech.ended","t_ms":250}"#;
        let event: super::ControlEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, super::ControlEvent::SpeechEnded { t_ms: 250 });

        let json = r#"{"type":"viseme.marker","t_ms":40,"amplitude":0.8,"viseme":"aa"}"#;
        let event: super::ControlEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.t_ms(), 40);
        match event {
            super::ControlEvent::VisemeMarker { amplitude, viseme, .. } => {
                assert!((amplitude - 0.8).abs() < f32::EPSILON);
                assert_eq!(viseme.as_deref(), Some("aa"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

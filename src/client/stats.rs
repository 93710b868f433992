use avatar_realtime_types::{ControlEvent, WireFrame};

/// Per-session counters, readable at any time through `Client::stats`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_sent: u64,
    frames_received: u64,
    markers_received: u64,
    decode_failures: u64,
    reconnects: u32,
    last_outbound_t_ms: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn note_sent(&mut self, t_ms: u64) {
        self.frames_sent += 1;
        self.last_outbound_t_ms = self.last_outbound_t_ms.max(t_ms);
    }

    pub(crate) fn note_received(&mut self, frame: &WireFrame) {
        match frame {
            WireFrame::Audio(_) => self.frames_received += 1,
            WireFrame::Control(ControlEvent::VisemeMarker { .. }) => self.markers_received += 1,
            WireFrame::Control(_) => {}
        }
    }

    pub(crate) fn note_decode_failure(&mut self) {
        self.decode_failures += 1;
    }

    pub(crate) fn note_reconnect(&mut self) {
        self.reconnects += 1;
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn markers_received(&self) -> u64 {
        self.markers_received
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// High-water mark of the outbound audio timeline.
    pub fn last_outbound_t_ms(&self) -> u64 {
        self.last_outbound_t_ms
    }
}

use std::collections::VecDeque;

use avatar_realtime_types::ControlEvent;

/// Jaw opening in radians at amplitude 1.0.
pub const DEFAULT_MAX_OPEN_RAD: f32 = 0.5;

/// Window over which the jaw eases back to rest after the last marker.
pub const DEFAULT_DECAY_MS: u64 = 200;

/// One rotation sample for the configured jaw bone, consumed once per
/// render tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneFrame {
    t_ms: u64,
    rotation: f32,
}

impl BoneFrame {
    pub fn t_ms(&self) -> u64 {
        self.t_ms
    }

    /// Rotation in radians; 0.0 is the rest position.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    t_ms: u64,
    amplitude: f32,
}

/// Maps the inbound marker timeline to a continuous jaw rotation.
///
/// A pure function of (event history, playback time): between markers the
/// rotation is interpolated linearly; past the last marker it eases shut
/// over the decay window; output timestamps never go backwards.
pub struct LipSyncDriver {
    jaw_bone: String,
    max_open: f32,
    decay_ms: u64,
    markers: VecDeque<Marker>,
    prev: Option<Marker>,
    speech_end: Option<u64>,
    last: Option<BoneFrame>,
}

impl LipSyncDriver {
    pub fn new(jaw_bone: &str) -> Self {
        Self {
            jaw_bone: jaw_bone.to_string(),
            max_open: DEFAULT_MAX_OPEN_RAD,
            decay_ms: DEFAULT_DECAY_MS,
            markers: VecDeque::new(),
            prev: None,
            speech_end: None,
            last: None,
        }
    }

    pub fn with_max_open(mut self, radians: f32) -> Self {
        self.max_open = radians;
        self
    }

    pub fn with_decay_ms(mut self, decay_ms: u64) -> Self {
        self.decay_ms = decay_ms.max(1);
        self
    }

    /// Name of the bone this driver animates.
    pub fn jaw_bone(&self) -> &str {
        &self.jaw_bone
    }

    /// Ingest a control event. Only speech markers matter here; audio
    /// routing and errors belong to other consumers of the same stream.
    pub fn on_event(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::VisemeMarker { t_ms, amplitude, .. } => {
                if self.last.is_some_and(|last| *t_ms < last.t_ms()) {
                    tracing::debug!("dropping late marker at {}ms", t_ms);
                    return;
                }
                if self.speech_end.is_some_and(|end| *t_ms > end) {
                    tracing::debug!("dropping marker past end of speech at {}ms", t_ms);
                    return;
                }
                let marker = Marker {
                    t_ms: *t_ms,
                    amplitude: amplitude.clamp(0.0, 1.0),
                };
                let at = self
                    .markers
                    .iter()
                    .rposition(|m| m.t_ms <= marker.t_ms)
                    .map_or(0, |i| i + 1);
                self.markers.insert(at, marker);
            }
            ControlEvent::SpeechStarted { .. } => {
                self.speech_end = None;
            }
            ControlEvent::SpeechEnded { t_ms } => {
                self.speech_end = Some(*t_ms);
                self.markers.retain(|m| m.t_ms <= *t_ms);
            }
            _ => {}
        }
    }

    /// Rotation at the given playback position.
    ///
    /// Markers the playback position has passed are consumed and
    /// discarded. A tick earlier than the last emitted frame re-emits
    /// that frame, keeping output timestamps monotonic.
    pub fn tick(&mut self, playback_ms: u64) -> BoneFrame {
        if let Some(last) = self.last {
            if playback_ms < last.t_ms() {
                return last;
            }
        }

        while self
            .markers
            .front()
            .is_some_and(|m| m.t_ms <= playback_ms)
        {
            self.prev = self.markers.pop_front();
        }

        let frame = BoneFrame {
            t_ms: playback_ms,
            rotation: self.amplitude_at(playback_ms) * self.max_open,
        };
        self.last = Some(frame);
        frame
    }

    fn amplitude_at(&self, t: u64) -> f32 {
        match (self.prev, self.markers.front()) {
            (Some(prev), Some(next)) => {
                let span = next.t_ms.saturating_sub(prev.t_ms).max(1) as f32;
                let progress = t.saturating_sub(prev.t_ms) as f32 / span;
                prev.amplitude + (next.amplitude - prev.amplitude) * progress
            }
            (Some(prev), None) => {
                // past the last known marker: ease the jaw shut
                let elapsed = t.saturating_sub(prev.t_ms) as f32;
                let progress = (elapsed / self.decay_ms as f32).min(1.0);
                prev.amplitude * (1.0 - smoothstep(progress))
            }
            (None, _) => 0.0,
        }
    }
}

fn smoothstep(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(t_ms: u64, amplitude: f32) -> ControlEvent {
        ControlEvent::VisemeMarker {
            t_ms,
            amplitude,
            viseme: None,
        }
    }

    fn driver() -> LipSyncDriver {
        // unit max opening makes rotations read as amplitudes
        LipSyncDriver::new("jaw").with_max_open(1.0)
    }

    #[test]
    fn rest_before_any_marker() {
        let mut driver = driver();
        let frame = driver.tick(50);
        assert_eq!(frame.rotation(), 0.0);
        assert_eq!(frame.t_ms(), 50);
    }

    #[test]
    fn interpolates_between_markers() {
        let mut driver = driver();
        driver.on_event(&ControlEvent::SpeechStarted { t_ms: 0 });
        driver.on_event(&marker(0, 0.2));
        driver.on_event(&marker(100, 0.8));

        let frame = driver.tick(50);
        assert!((frame.rotation() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn marker_scenario_with_decay_to_rest() {
        let mut driver = driver();
        driver.on_event(&ControlEvent::SpeechStarted { t_ms: 0 });
        driver.on_event(&marker(0, 0.2));
        driver.on_event(&marker(100, 0.8));
        driver.on_event(&ControlEvent::SpeechEnded { t_ms: 250 });

        let frame = driver.tick(125);
        assert!(frame.rotation() > 0.2 && frame.rotation() < 0.8);

        let frame = driver.tick(400);
        assert!(frame.rotation() < 0.01, "rotation {}", frame.rotation());
    }

    #[test]
    fn output_timestamps_are_monotonic() {
        let mut driver = driver();
        driver.on_event(&marker(0, 0.3));
        driver.on_event(&marker(60, 0.9));

        let mut last = 0;
        for t in [0u64, 30, 20, 60, 10, 90] {
            let frame = driver.tick(t);
            assert!(frame.t_ms() >= last);
            last = frame.t_ms();
        }
    }

    #[test]
    fn rewound_tick_reemits_last_frame() {
        let mut driver = driver();
        driver.on_event(&marker(0, 0.4));
        let at_100 = driver.tick(100);
        let rewound = driver.tick(50);
        assert_eq!(rewound, at_100);
    }

    #[test]
    fn late_markers_are_dropped() {
        let mut driver = driver();
        driver.on_event(&marker(0, 0.1));
        driver.tick(100);

        // playback is already at 100ms; this marker is history
        driver.on_event(&marker(50, 1.0));
        let frame = driver.tick(101);
        assert!(frame.rotation() < 0.1);
    }

    #[test]
    fn markers_past_end_of_speech_are_ignored() {
        let mut driver = driver();
        driver.on_event(&marker(0, 0.5));
        driver.on_event(&ControlEvent::SpeechEnded { t_ms: 100 });
        driver.on_event(&marker(200, 1.0));

        let frame = driver.tick(400);
        assert!(frame.rotation() < 0.01);
    }

    #[test]
    fn out_of_order_marker_insertion_keeps_timeline_sorted() {
        let mut driver = driver();
        driver.on_event(&marker(100, 1.0));
        driver.on_event(&marker(50, 0.0));

        // halfway between 50 and 100 should climb toward 1.0
        driver.tick(50);
        let frame = driver.tick(75);
        assert!((frame.rotation() - 0.5).abs() < 1e-4);
    }
}

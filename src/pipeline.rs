use std::collections::{BTreeMap, VecDeque};

use avatar_realtime_types::audio::{
    pcm16_from_f32, WIRE_CHANNELS, WIRE_SAMPLE_RATE,
};
use avatar_realtime_types::{AudioFrame, Direction};

use crate::error::Error;

/// Duration of one outbound frame.
pub const DEFAULT_FRAME_MS: u64 = 20;

/// Frames buffered before inbound playback starts.
pub const DEFAULT_JITTER_DEPTH: usize = 3;

/// Outbound frames held while the network catches up.
pub const DEFAULT_SEND_QUEUE_BOUND: usize = 64;

/// Slices captured samples into fixed-duration outbound frames, assigning
/// sequence numbers and timeline positions in capture order.
pub struct FrameChunker {
    sample_rate: u32,
    samples_per_frame: usize,
    pending: Vec<f32>,
    seq: u64,
    samples_emitted: u64,
}

impl FrameChunker {
    /// Chunker for wire-rate mono capture.
    pub fn new(frame_ms: u64) -> Self {
        Self::with_sample_rate(WIRE_SAMPLE_RATE, frame_ms)
    }

    pub fn with_sample_rate(sample_rate: u32, frame_ms: u64) -> Self {
        let samples_per_frame = (sample_rate as u64 * frame_ms.max(1) / 1000).max(1) as usize;
        Self {
            sample_rate,
            samples_per_frame,
            pending: Vec::with_capacity(samples_per_frame * 2),
            seq: 0,
            samples_emitted: 0,
        }
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    /// Feed captured samples; returns every full frame they complete,
    /// oldest first.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.samples_per_frame {
            let chunk: Vec<f32> = self.pending.drain(..self.samples_per_frame).collect();
            frames.push(self.emit(&chunk));
        }
        frames
    }

    /// Emit the remainder as a final zero-padded frame.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let mut chunk: Vec<f32> = self.pending.drain(..).collect();
        chunk.resize(self.samples_per_frame, 0.0);
        Some(self.emit(&chunk))
    }

    fn emit(&mut self, chunk: &[f32]) -> AudioFrame {
        let t_ms = self.samples_emitted * 1000 / self.sample_rate as u64;
        let frame = AudioFrame::new(self.seq, t_ms, Direction::Outbound, pcm16_from_f32(chunk))
            .with_format(self.sample_rate, WIRE_CHANNELS);
        self.seq += 1;
        self.samples_emitted += self.samples_per_frame as u64;
        frame
    }
}

/// Bounded FIFO between the capture producer and the network consumer.
///
/// Overflow drops the oldest unsent frame instead of growing; the first
/// drop of a saturation episode surfaces [`Error::Backpressure`], and the
/// signal re-arms once the queue drains below its bound.
pub struct SendQueue {
    frames: VecDeque<AudioFrame>,
    bound: usize,
    saturated: bool,
    dropped_total: u64,
}

impl SendQueue {
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            frames: VecDeque::with_capacity(bound),
            bound,
            saturated: false,
            dropped_total: 0,
        }
    }

    pub fn push(&mut self, frame: AudioFrame) -> Result<(), Error> {
        let mut signal = false;
        if self.frames.len() == self.bound {
            self.frames.pop_front();
            self.dropped_total += 1;
            tracing::warn!(
                "send queue full, dropped oldest frame ({} dropped so far)",
                self.dropped_total
            );
            if !self.saturated {
                self.saturated = true;
                signal = true;
            }
        }
        self.frames.push_back(frame);
        if signal {
            Err(Error::Backpressure)
        } else {
            Ok(())
        }
    }

    pub fn pop(&mut self) -> Option<AudioFrame> {
        let frame = self.frames.pop_front();
        if self.frames.len() < self.bound {
            self.saturated = false;
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }
}

/// Reorders inbound frames by sequence number and absorbs network jitter.
///
/// Playback starts only once `min_depth` frames are buffered; an
/// underrun un-primes the buffer so playback pauses until it refills.
/// Frames at or before the last consumed sequence are dropped, never
/// replayed.
pub struct JitterBuffer {
    frames: BTreeMap<u64, AudioFrame>,
    min_depth: usize,
    last_popped: Option<u64>,
    primed: bool,
}

impl JitterBuffer {
    pub fn new(min_depth: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            min_depth: min_depth.max(1),
            last_popped: None,
            primed: false,
        }
    }

    /// Insert an inbound frame; returns `false` for late frames and
    /// duplicates, which are dropped.
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        if self.last_popped.is_some_and(|last| frame.seq() <= last) {
            tracing::debug!("dropping late frame seq={}", frame.seq());
            return false;
        }
        if self.frames.contains_key(&frame.seq()) {
            return false;
        }
        self.frames.insert(frame.seq(), frame);
        if !self.primed && self.frames.len() >= self.min_depth {
            self.primed = true;
        }
        true
    }

    /// Next frame in sequence order, once primed.
    pub fn pop(&mut self) -> Option<AudioFrame> {
        if !self.primed {
            return None;
        }
        match self.frames.pop_first() {
            Some((seq, frame)) => {
                self.last_popped = Some(seq);
                Some(frame)
            }
            None => {
                tracing::debug!("jitter buffer underrun, re-priming");
                self.primed = false;
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::new(seq, seq * 20, Direction::Inbound, vec![0i16; 4])
    }

    #[test]
    fn chunker_preserves_capture_order() {
        let mut chunker = FrameChunker::with_sample_rate(1_000, 20);
        assert_eq!(chunker.samples_per_frame(), 20);

        // 50 samples -> two full frames, 10 pending
        let frames = chunker.push(&vec![0.1f32; 50]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].seq(), 0);
        assert_eq!(frames[0].t_ms(), 0);
        assert_eq!(frames[1].seq(), 1);
        assert_eq!(frames[1].t_ms(), 20);

        let frames = chunker.push(&vec![0.1f32; 10]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq(), 2);
        assert_eq!(frames[0].t_ms(), 40);

        assert!(chunker.flush().is_none());
    }

    #[test]
    fn chunker_flush_pads_the_tail() {
        let mut chunker = FrameChunker::with_sample_rate(1_000, 20);
        assert!(chunker.push(&vec![0.5f32; 7]).is_empty());
        let last = chunker.flush().expect("pending samples");
        assert_eq!(last.pcm().len(), 20);
        assert_eq!(last.pcm()[6], (0.5 * i16::MAX as f32) as i16);
        assert_eq!(last.pcm()[7], 0);
    }

    #[test]
    fn capture_order_survives_to_the_codec() {
        use avatar_realtime_types::codec;
        use avatar_realtime_types::WireFrame;

        let mut chunker = FrameChunker::with_sample_rate(1_000, 10);
        let mut queue = SendQueue::new(64);
        for _ in 0..5 {
            for captured in chunker.push(&vec![0.2f32; 25]) {
                queue.push(captured).unwrap();
            }
        }

        let mut expected_seq = 0;
        while let Some(outgoing) = queue.pop() {
            let bytes = codec::encode(&WireFrame::Audio(outgoing)).unwrap();
            match codec::decode(&bytes).unwrap() {
                WireFrame::Audio(decoded) => {
                    assert_eq!(decoded.seq(), expected_seq);
                    expected_seq += 1;
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        // 125 captured samples make 12 full 10-sample frames
        assert_eq!(expected_seq, 12);
    }

    #[test]
    fn send_queue_signals_backpressure_once() {
        let mut queue = SendQueue::new(10);
        let mut signals = 0;
        for seq in 0..50 {
            if queue.push(frame(seq)).is_err() {
                signals += 1;
            }
            assert!(queue.len() <= 10);
        }
        assert_eq!(signals, 1);
        assert_eq!(queue.dropped_total(), 40);

        // survivors are the newest frames, still in order
        let mut seqs = Vec::new();
        while let Some(f) = queue.pop() {
            seqs.push(f.seq());
        }
        assert_eq!(seqs, (40..50).collect::<Vec<_>>());
    }

    #[test]
    fn send_queue_signal_rearms_after_draining() {
        let mut queue = SendQueue::new(2);
        assert!(queue.push(frame(0)).is_ok());
        assert!(queue.push(frame(1)).is_ok());
        assert!(queue.push(frame(2)).is_err());
        assert!(queue.push(frame(3)).is_ok());

        queue.pop();
        queue.pop();
        assert!(queue.push(frame(4)).is_ok());
        assert!(queue.push(frame(5)).is_ok());
        assert!(queue.push(frame(6)).is_err());
    }

    #[test]
    fn jitter_buffer_waits_for_priming_depth() {
        let mut buffer = JitterBuffer::new(3);
        assert!(buffer.push(frame(0)));
        assert!(buffer.push(frame(1)));
        assert!(buffer.pop().is_none());
        assert!(buffer.push(frame(2)));
        assert!(buffer.is_primed());
        assert_eq!(buffer.pop().map(|f| f.seq()), Some(0));
    }

    #[test]
    fn jitter_buffer_reorders_and_drops_late() {
        let mut buffer = JitterBuffer::new(2);
        assert!(buffer.push(frame(2)));
        assert!(buffer.push(frame(1)));
        assert!(buffer.push(frame(3)));

        assert_eq!(buffer.pop().map(|f| f.seq()), Some(1));
        assert_eq!(buffer.pop().map(|f| f.seq()), Some(2));

        // frame 1 arrives again after being played: dropped
        assert!(!buffer.push(frame(1)));
        // duplicate of a buffered frame: dropped
        assert!(!buffer.push(frame(3)));
        assert_eq!(buffer.pop().map(|f| f.seq()), Some(3));
    }

    #[test]
    fn jitter_buffer_reprimes_after_underrun() {
        let mut buffer = JitterBuffer::new(2);
        buffer.push(frame(0));
        buffer.push(frame(1));
        assert!(buffer.pop().is_some());
        assert!(buffer.pop().is_some());

        // drained: underrun un-primes
        assert!(buffer.pop().is_none());
        assert!(!buffer.is_primed());

        buffer.push(frame(2));
        assert!(buffer.pop().is_none());
        buffer.push(frame(3));
        assert_eq!(buffer.pop().map(|f| f.seq()), Some(2));
    }
}

//! Bounded, ordered audio frame buffer shared between the input gateway
//! (producer) and the ASR consumer task.
//!
//! Capacity defaults to 1000 frames; once full, the oldest frame is
//! dropped to make room for the newest — under load a lagging frame is
//! worth less than a fresh one for near-real-time transcription.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Vec<u8>,
    pub timestamp: f64,
    pub sample_rate: u32,
    pub is_final: bool,
}

pub struct AudioFrameBuffer {
    capacity: usize,
    frames: Mutex<VecDeque<AudioFrame>>,
}

impl AudioFrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    /// Push a frame, dropping the oldest if at capacity. Returns `true` if
    /// a frame was dropped to make room.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut frames = self.frames.lock();
        let dropped = if frames.len() >= self.capacity {
            frames.pop_front();
            true
        } else {
            false
        };
        frames.push_back(frame);
        dropped
    }

    pub fn pop(&self) -> Option<AudioFrame> {
        self.frames.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl Default for AudioFrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> AudioFrame {
        AudioFrame {
            bytes: vec![tag],
            timestamp: 0.0,
            sample_rate: 48_000,
            is_final: false,
        }
    }

    #[test]
    fn preserves_fifo_order() {
        let buf = AudioFrameBuffer::new(10);
        for i in 0..5 {
            buf.push(frame(i));
        }
        for i in 0..5 {
            assert_eq!(buf.pop().unwrap().bytes, vec![i]);
        }
        assert!(buf.pop().is_none());
    }

    #[test]
    fn drops_oldest_on_overflow() {
        let buf = AudioFrameBuffer::new(3);
        for i in 0..5 {
            buf.push(frame(i));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.pop().unwrap().bytes, vec![2]);
        assert_eq!(buf.pop().unwrap().bytes, vec![3]);
        assert_eq!(buf.pop().unwrap().bytes, vec![4]);
    }

    #[test]
    fn overflow_push_reports_drop() {
        let buf = AudioFrameBuffer::new(1);
        assert!(!buf.push(frame(0)));
        assert!(buf.push(frame(1)));
    }
}

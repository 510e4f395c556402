//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for page replacement algorithms.
///
/// The replacer only ranks victims; whether a frame may actually be evicted
/// (unpinned, resident) is decided by the caller through the `can_evict`
/// predicate.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction among those the predicate accepts.
    ///
    /// Returns None if no acceptable frame exists.
    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Removes a frame from replacement consideration (clears its state).
    fn remove(&self, frame_id: FrameId);
}

/// Clock replacement algorithm.
///
/// Reference bits are atomic so access recording is lock-free; only the
/// clock hand is behind a mutex.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Current clock hand position.
    clock_hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer for the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits: Vec<AtomicBool> =
            (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            clock_hand: Mutex::new(0),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }
}

impl Replacer for ClockReplacer {
    #[inline]
    fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
        }
    }

    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut hand = self.clock_hand.lock();

        // First rotation gives referenced frames a second chance, second
        // rotation sees all bits cleared. Anything still unaccepted after
        // two rotations is pinned or empty.
        for _ in 0..(2 * self.num_frames) {
            let idx = *hand;
            *hand = (idx + 1) % self.num_frames;

            let frame_id = FrameId(idx as u32);
            if !can_evict(frame_id) {
                continue;
            }

            if self.reference_bits[idx].load(Ordering::Relaxed) {
                self.reference_bits[idx].store(false, Ordering::Relaxed);
            } else {
                return Some(frame_id);
            }
        }

        None
    }

    fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
    }

    #[test]
    fn test_evict_none_acceptable() {
        let replacer = ClockReplacer::new(10);
        assert!(replacer.evict(&|_| false).is_none());
    }

    #[test]
    fn test_evict_single() {
        let replacer = ClockReplacer::new(10);
        let victim = replacer.evict(&|f| f == FrameId(5));
        assert_eq!(victim, Some(FrameId(5)));
    }

    #[test]
    fn test_second_chance() {
        let replacer = ClockReplacer::new(3);

        // Frames 0 and 1 recently accessed; 2 should be evicted first.
        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));

        let victim = replacer.evict(&|_| true);
        assert_eq!(victim, Some(FrameId(2)));
    }

    #[test]
    fn test_evict_all_referenced() {
        let replacer = ClockReplacer::new(3);

        replacer.record_access(FrameId(0));
        replacer.record_access(FrameId(1));
        replacer.record_access(FrameId(2));

        // Second rotation sees cleared bits.
        let victim = replacer.evict(&|_| true);
        assert!(victim.is_some());
    }

    #[test]
    fn test_evict_respects_predicate() {
        let replacer = ClockReplacer::new(4);

        for _ in 0..8 {
            let victim = replacer.evict(&|f| f.0 % 2 == 0);
            assert!(victim.is_some());
            assert_eq!(victim.unwrap().0 % 2, 0);
        }
    }

    #[test]
    fn test_remove_clears_reference() {
        let replacer = ClockReplacer::new(3);

        replacer.record_access(FrameId(1));
        replacer.remove(FrameId(1));

        // With its bit cleared, frame 1 is immediately evictable.
        let victim = replacer.evict(&|f| f == FrameId(1));
        assert_eq!(victim, Some(FrameId(1)));
    }

    #[test]
    fn test_out_of_bounds() {
        let replacer = ClockReplacer::new(5);

        // These should not panic
        replacer.record_access(FrameId(100));
        replacer.remove(FrameId(100));
    }

    #[test]
    fn test_rotation_order() {
        let replacer = ClockReplacer::new(4);

        // No reference bits set: eviction proceeds in clock order.
        let v1 = replacer.evict(&|_| true).unwrap();
        let v2 = replacer.evict(&|_| true).unwrap();
        assert_ne!(v1, v2);
    }
}

use parking_lot::Mutex;

use crate::common::config::FrameId;

struct ClockFrame {
    in_replacer: bool,
    ref_bit: bool,
}

/// ClockReplacer implements the clock (second-chance) replacement policy
/// over unpinned frames (C3, §4.3).
///
/// Each frame carries an `in_replacer` bit (tracked for eviction) and a
/// `ref` bit (recently referenced). `victim` sweeps a circular hand:
/// frames with `ref == true` get a second chance and are cleared, frames
/// with `ref == false` are evicted. At most two full sweeps locate a
/// victim — the first clears refs, the second evicts.
pub struct ClockReplacer {
    frames: Mutex<ClockState>,
}

struct ClockState {
    entries: Vec<ClockFrame>,
    hand: usize,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        let entries = (0..num_frames)
            .map(|_| ClockFrame {
                in_replacer: false,
                ref_bit: false,
            })
            .collect();
        Self {
            frames: Mutex::new(ClockState { entries, hand: 0 }),
        }
    }

    /// Marks `frame_id` evictable and recently referenced (§4.3 Unpin).
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.frames.lock();
        let f = &mut state.entries[frame_id];
        f.in_replacer = true;
        f.ref_bit = true;
    }

    /// Removes `frame_id` from eviction candidacy (§4.3 Pin).
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.frames.lock();
        state.entries[frame_id].in_replacer = false;
    }

    /// Advances the clock hand to find and evict a victim frame. Returns
    /// `None` iff no frame is currently `in_replacer`.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.frames.lock();
        let n = state.entries.len();
        if n == 0 || !state.entries.iter().any(|f| f.in_replacer) {
            return None;
        }

        loop {
            let hand = state.hand;
            state.hand = (state.hand + 1) % n;
            let f = &mut state.entries[hand];
            if !f.in_replacer {
                continue;
            }
            if f.ref_bit {
                f.ref_bit = false;
                continue;
            }
            f.in_replacer = false;
            return Some(hand);
        }
    }

    /// Removes `frame_id` from the replacer regardless of its `ref` bit
    /// (used by `DeletePage`).
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.frames.lock();
        let f = &mut state.entries[frame_id];
        f.in_replacer = false;
        f.ref_bit = false;
    }

    /// Number of frames currently tracked as evictable.
    pub fn size(&self) -> usize {
        self.frames.lock().entries.iter().filter(|f| f.in_replacer).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_replacer_has_no_victim() {
        let r = ClockReplacer::new(4);
        assert_eq!(r.victim(), None);
        assert_eq!(r.size(), 0);
    }

    #[test]
    fn single_unpinned_frame_is_victim() {
        let r = ClockReplacer::new(4);
        r.unpin(2);
        assert_eq!(r.size(), 1);
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.size(), 0);
    }

    #[test]
    fn ref_bit_gives_second_chance() {
        let r = ClockReplacer::new(2);
        r.unpin(0);
        r.unpin(1);
        // Both start with ref=true: first sweep clears refs, second evicts
        // in hand order.
        assert_eq!(r.victim(), Some(0));
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn pin_removes_from_candidacy() {
        let r = ClockReplacer::new(3);
        r.unpin(0);
        r.unpin(1);
        r.pin(0);
        assert_eq!(r.size(), 1);
        assert_eq!(r.victim(), Some(1));
    }

    #[test]
    fn remove_clears_regardless_of_ref_bit() {
        let r = ClockReplacer::new(2);
        r.unpin(0);
        r.remove(0);
        assert_eq!(r.size(), 0);
        assert_eq!(r.victim(), None);
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The loops whose progress gates deferred destruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoopKind {
    Fixed = 0,
    Vary = 1,
    Reclaim = 2,
}

pub const LOOP_COUNT: usize = 3;

pub const LOOP_KINDS: [LoopKind; LOOP_COUNT] = [LoopKind::Fixed, LoopKind::Vary, LoopKind::Reclaim];

/// Completed-tick counters, one per loop. A counter only advances after
/// the loop has fully finished an iteration, which is what makes it safe
/// to use as the destruction grace clock.
pub struct LoopTicks {
    counts: [AtomicU64; LOOP_COUNT],
}

impl LoopTicks {
    pub fn new() -> Self {
        Self {
            counts: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn completed(&self, kind: LoopKind) -> u64 {
        self.counts[kind as usize].load(Ordering::Acquire)
    }

    /// Called by the owning loop at the end of each iteration. Returns the
    /// new completed count.
    pub fn advance(&self, kind: LoopKind) -> u64 {
        self.counts[kind as usize].fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for LoopTicks {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-phase destruction state carried by every destroyable object:
/// `live -> destroy_pending -> destroyed`, with `destroyed` terminal.
///
/// Marking records every loop's completed tick; the object may only be
/// torn down once each loop has advanced far enough past that record
/// that no iteration started before the mark can still be running.
pub struct Destructible {
    destroyed: AtomicBool,
    destroy_pending: AtomicBool,
    marked: [AtomicU64; LOOP_COUNT],
}

impl Destructible {
    pub fn new() -> Self {
        Self {
            destroyed: AtomicBool::new(false),
            destroy_pending: AtomicBool::new(false),
            marked: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        self.destroy_pending.load(Ordering::Acquire)
    }

    /// Pending or destroyed; lifecycle walks skip such objects.
    pub fn is_dead(&self) -> bool {
        self.is_destroyed() || self.is_pending()
    }

    /// Records each loop's completed tick, then flags the object pending.
    /// No-op (returns false) if already pending or destroyed. Concurrent
    /// marking of the same object must be serialized by the caller; the
    /// scene lock does that for all in-crate paths.
    pub fn mark(&self, ticks: &LoopTicks) -> bool {
        if self.is_dead() {
            return false;
        }
        for kind in LOOP_KINDS {
            self.marked[kind as usize].store(ticks.completed(kind), Ordering::Relaxed);
        }
        self.destroy_pending.store(true, Ordering::Release);
        true
    }

    /// True once every loop has completed at least `grace` ticks since the
    /// mark. The default margin of 2 covers loops that consume a value one
    /// iteration behind the one that produced it.
    pub fn can_destroy(&self, ticks: &LoopTicks, grace: u64) -> bool {
        if self.is_destroyed() || !self.is_pending() {
            return false;
        }
        LOOP_KINDS.iter().all(|kind| {
            let marked = self.marked[*kind as usize].load(Ordering::Relaxed);
            ticks.completed(*kind) >= marked + grace
        })
    }

    /// Terminal transition; the object must never again be returned by any
    /// lookup. Callers run the user destruct callback first.
    pub fn set_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.destroy_pending.store(false, Ordering::Release);
    }
}

impl Default for Destructible {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent() {
        let ticks = LoopTicks::new();
        let d = Destructible::new();
        assert!(d.mark(&ticks));
        assert!(!d.mark(&ticks));
        assert!(d.is_pending());
        assert!(!d.is_destroyed());
    }

    #[test]
    fn grace_requires_every_loop_to_advance() {
        let ticks = LoopTicks::new();
        for _ in 0..5 {
            for kind in LOOP_KINDS {
                ticks.advance(kind);
            }
        }
        let d = Destructible::new();
        d.mark(&ticks);

        // at mark tick and one past it the object must stay untouchable
        assert!(!d.can_destroy(&ticks, 2));
        for kind in LOOP_KINDS {
            ticks.advance(kind);
        }
        assert!(!d.can_destroy(&ticks, 2));

        // one loop lagging behind holds the whole object back
        ticks.advance(LoopKind::Fixed);
        ticks.advance(LoopKind::Vary);
        assert!(!d.can_destroy(&ticks, 2));
        ticks.advance(LoopKind::Reclaim);
        assert!(d.can_destroy(&ticks, 2));
    }

    #[test]
    fn wider_grace_margins_are_honored() {
        let ticks = LoopTicks::new();
        let d = Destructible::new();
        d.mark(&ticks);
        for step in 1..=4 {
            for kind in LOOP_KINDS {
                ticks.advance(kind);
            }
            assert_eq!(d.can_destroy(&ticks, 4), step >= 4);
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        let ticks = LoopTicks::new();
        let d = Destructible::new();
        d.mark(&ticks);
        d.set_destroyed();
        assert!(d.is_destroyed());
        assert!(!d.is_pending());
        assert!(!d.can_destroy(&ticks, 2));
        assert!(!d.mark(&ticks));
    }
}

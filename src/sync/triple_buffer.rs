use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

const IDX_MASK: u8 = 0b011;
const PENDING: u8 = 0b100;

/// Three-slot write/stage/read rotation for handing state from one writer
/// loop to one reader loop without locking.
///
/// The producer fills its slot in place and [`publish`](Self::publish)es,
/// the consumer [`sync`](Self::sync)s and then [`read`](Self::read)s a
/// value that is always the result of a complete publish. Slots rotate by
/// index through a single atomic word, so producer and consumer never
/// touch the same slot at the same time. A reader that syncs while no
/// publish happened simply keeps its previous value.
///
/// Contract: exactly one thread acts as producer (`write_slot`/`publish`)
/// and exactly one as consumer (`sync`/`read`) at any point in time.
pub struct TripleCell<T> {
    buffers: [UnsafeCell<T>; 3],
    /// stage slot index in the low bits, pending flag above it
    state: AtomicU8,
    /// owned by the producer side
    write_index: AtomicU8,
    /// owned by the consumer side
    read_index: AtomicU8,
}

unsafe impl<T: Send> Sync for TripleCell<T> {}

impl<T: Clone> TripleCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            buffers: [
                UnsafeCell::new(value.clone()),
                UnsafeCell::new(value.clone()),
                UnsafeCell::new(value),
            ],
            state: AtomicU8::new(1),
            write_index: AtomicU8::new(0),
            read_index: AtomicU8::new(2),
        }
    }
}

impl<T> TripleCell<T> {
    /// Producer-side slot to fill in place.
    #[allow(clippy::mut_from_ref)]
    pub fn write_slot(&self) -> &mut T {
        let index = self.write_index.load(Ordering::Relaxed) as usize;
        unsafe { &mut *self.buffers[index].get() }
    }

    /// Hands the written slot to the consumer side and takes the previous
    /// stage slot as the next write target. Release-ordered: everything
    /// written into the slot is visible to a consumer that observes the
    /// pending flag.
    pub fn publish(&self) {
        let write = self.write_index.load(Ordering::Relaxed);
        let old = self.state.swap(write | PENDING, Ordering::AcqRel);
        self.write_index.store(old & IDX_MASK, Ordering::Relaxed);
    }

    /// Consumer-side test-and-clear of the pending flag. If a publish
    /// landed since the last sync, takes the staged slot as the new read
    /// slot and returns true.
    pub fn sync(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current & PENDING == 0 {
                return false;
            }
            let read = self.read_index.load(Ordering::Relaxed);
            match self.state.compare_exchange_weak(
                current,
                read,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(previous) => {
                    self.read_index
                        .store(previous & IDX_MASK, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Consumer-side stable value, untouched until the next `sync`.
    pub fn read(&self) -> &T {
        let index = self.read_index.load(Ordering::Relaxed) as usize;
        unsafe { &*self.buffers[index].get() }
    }
}

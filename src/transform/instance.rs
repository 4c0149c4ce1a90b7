use std::sync::atomic::{AtomicU32, Ordering};

use cgmath::{ElementWise, One, Quaternion, Vector3, Zero};
use parking_lot::Mutex;

use super::types::Transform;
use crate::scene::handle::EntityHandle;
use crate::sync::TripleCell;

/// Depth of the per-tick snapshot ring.
pub const SNAP_RING: usize = 4;

pub(crate) const ABS_POSITION: u32 = 1 << 0;
pub(crate) const ABS_ROTATION: u32 = 1 << 1;
pub(crate) const ABS_SCALE: u32 = 1 << 2;
pub(crate) const DELTA_POSITION: u32 = 1 << 3;
pub(crate) const DELTA_ROTATION: u32 = 1 << 4;
pub(crate) const DELTA_SCALE: u32 = 1 << 5;
pub(crate) const REPARENT: u32 = 1 << 6;
pub(crate) const WORLD_DIRTY: u32 = 1 << 7;

const LOCAL_MASK: u32 = ABS_POSITION | ABS_ROTATION | ABS_SCALE | DELTA_POSITION | DELTA_ROTATION | DELTA_SCALE;

/// Local and world transform as they stood after a given simulation tick.
#[derive(Clone, Copy, Debug)]
pub struct TransformSnap {
    pub tick: u64,
    pub local: Transform,
    pub world: Transform,
}

impl TransformSnap {
    fn initial() -> Self {
        Self {
            tick: 0,
            local: Transform::identity(),
            world: Transform::identity(),
        }
    }
}

/// Accumulated queue operations waiting for the next simulation tick.
/// Guarded by the pending mutex; the flag word records which fields hold
/// anything. Multiple operations of the same kind collapse here.
struct PendingOps {
    position_delta: Vector3<f32>,
    rotation_delta: Quaternion<f32>,
    scale_factor: Vector3<f32>,
    abs_position: Vector3<f32>,
    abs_rotation: Quaternion<f32>,
    abs_scale: Vector3<f32>,
    /// meaningful only while the reparent bit is set; `None` detaches
    new_parent: Option<EntityHandle>,
}

impl PendingOps {
    fn neutral() -> Self {
        Self {
            position_delta: Vector3::zero(),
            rotation_delta: Quaternion::one(),
            scale_factor: Vector3::new(1.0, 1.0, 1.0),
            abs_position: Vector3::zero(),
            abs_rotation: Quaternion::one(),
            abs_scale: Vector3::new(1.0, 1.0, 1.0),
            new_parent: None,
        }
    }
}

/// Presentation-side copy of the published world state. Touched only by
/// the presentation loop.
struct ViewState {
    prev_world: Transform,
    curr_world: Transform,
    interpolated: Transform,
    tick: u64,
}

/// Per-entity transform state.
///
/// The simulation loop owns `local`, `world` and the snapshot ring; any
/// thread may queue deltas or absolute overrides, which accumulate until
/// the next [`consume`](Self::consume); the presentation loop follows the
/// published state through the two triple-buffered cells.
pub struct TransformInstance {
    local: Transform,
    world: Transform,
    snaps: [TransformSnap; SNAP_RING],
    pending: Mutex<PendingOps>,
    pending_bits: AtomicU32,
    /// set by the relink pass, consumed by the same tick's recompute
    reparent_math_due: bool,
    local_cell: TripleCell<Transform>,
    world_cell: TripleCell<TransformSnap>,
    view: Mutex<ViewState>,
}

impl TransformInstance {
    pub(crate) fn new() -> Self {
        Self {
            local: Transform::identity(),
            world: Transform::identity(),
            snaps: [TransformSnap::initial(); SNAP_RING],
            pending: Mutex::new(PendingOps::neutral()),
            // force the first consume to compute and publish
            pending_bits: AtomicU32::new(WORLD_DIRTY),
            reparent_math_due: false,
            local_cell: TripleCell::new(Transform::identity()),
            world_cell: TripleCell::new(TransformSnap::initial()),
            view: Mutex::new(ViewState {
                prev_world: Transform::identity(),
                curr_world: Transform::identity(),
                interpolated: Transform::identity(),
                tick: 0,
            }),
        }
    }

    //o------------ queue side, any thread ---------------o

    pub fn queue_translate(&self, delta: Vector3<f32>) {
        let mut pending = self.pending.lock();
        pending.position_delta += delta;
        self.pending_bits.fetch_or(DELTA_POSITION, Ordering::Release);
    }

    /// Queued rotations pre-multiply, matching how they are applied.
    pub fn queue_rotate(&self, delta: Quaternion<f32>) {
        let mut pending = self.pending.lock();
        pending.rotation_delta = delta * pending.rotation_delta;
        self.pending_bits.fetch_or(DELTA_ROTATION, Ordering::Release);
    }

    pub fn queue_scale(&self, factor: Vector3<f32>) {
        let mut pending = self.pending.lock();
        pending.scale_factor = pending.scale_factor.mul_element_wise(factor);
        self.pending_bits.fetch_or(DELTA_SCALE, Ordering::Release);
    }

    pub fn queue_set_position(&self, position: Vector3<f32>) {
        let mut pending = self.pending.lock();
        pending.abs_position = position;
        self.pending_bits.fetch_or(ABS_POSITION, Ordering::Release);
    }

    pub fn queue_set_rotation(&self, rotation: Quaternion<f32>) {
        let mut pending = self.pending.lock();
        pending.abs_rotation = rotation;
        self.pending_bits.fetch_or(ABS_ROTATION, Ordering::Release);
    }

    pub fn queue_set_scale(&self, scale: Vector3<f32>) {
        let mut pending = self.pending.lock();
        pending.abs_scale = scale;
        self.pending_bits.fetch_or(ABS_SCALE, Ordering::Release);
    }

    pub(crate) fn queue_set_parent(&self, parent: Option<EntityHandle>) {
        let mut pending = self.pending.lock();
        pending.new_parent = parent;
        self.pending_bits.fetch_or(REPARENT, Ordering::Release);
    }

    //o------------ simulation side ---------------o

    pub fn local(&self) -> &Transform {
        &self.local
    }

    pub fn world(&self) -> &Transform {
        &self.world
    }

    /// Snapshot recorded for `tick`, if it is still inside the ring.
    pub fn snap_at(&self, tick: u64) -> Option<TransformSnap> {
        let snap = self.snaps[tick as usize % SNAP_RING];
        (snap.tick == tick).then_some(snap)
    }

    /// Marks the world transform stale because an ancestor moved this
    /// tick. Deltas are not re-applied, only the recompute is forced.
    pub(crate) fn mark_world_dirty(&self) {
        self.pending_bits.fetch_or(WORLD_DIRTY, Ordering::Release);
    }

    pub(crate) fn has_reparent_request(&self) -> bool {
        self.pending_bits.load(Ordering::Acquire) & REPARENT != 0
    }

    /// Claims a queued reparent request for the relink pass. The actual
    /// local-transform fixup runs at this entity's visit in the recompute
    /// walk, after [`flag_reparent_math`](Self::flag_reparent_math).
    pub(crate) fn take_reparent_request(&self) -> Option<Option<EntityHandle>> {
        let mut pending = self.pending.lock();
        if self.pending_bits.load(Ordering::Acquire) & REPARENT == 0 {
            return None;
        }
        self.pending_bits.fetch_and(!REPARENT, Ordering::AcqRel);
        Some(pending.new_parent.take())
    }

    pub(crate) fn flag_reparent_math(&mut self) {
        self.reparent_math_due = true;
    }

    /// Per-tick consume, simulation thread only. `parent_world` is the
    /// parent's world transform for this same tick, already recomputed
    /// because parents are visited first. Returns whether the world
    /// transform changed (and was published).
    pub(crate) fn consume(&mut self, tick: u64, parent_world: Option<&Transform>) -> bool {
        let (bits, ops) = {
            let mut pending = self.pending.lock();
            let bits = self.pending_bits.swap(0, Ordering::AcqRel);
            let ops = std::mem::replace(&mut *pending, PendingOps::neutral());
            (bits, ops)
        };
        // a reparent queued after the relink pass of this tick: keep it
        // whole for the next tick instead of dropping half of it
        if bits & REPARENT != 0 {
            let mut pending = self.pending.lock();
            pending.new_parent = ops.new_parent;
            self.pending_bits.fetch_or(REPARENT, Ordering::Release);
        }

        let reparented = std::mem::take(&mut self.reparent_math_due);
        if reparented {
            // keep the world placement, re-derive local under the new scope
            self.local = match parent_world {
                Some(parent) => parent.inverse().combine(&self.world),
                None => self.world,
            };
        }

        if bits & LOCAL_MASK != 0 {
            // absolute overrides land first so a same-tick set-then-nudge
            // behaves as teleport, then nudge from there
            if bits & ABS_POSITION != 0 {
                self.local.position = ops.abs_position;
            }
            if bits & ABS_ROTATION != 0 {
                self.local.rotation = ops.abs_rotation;
            }
            if bits & ABS_SCALE != 0 {
                self.local.scale = ops.abs_scale;
            }
            if bits & DELTA_POSITION != 0 {
                self.local.position += ops.position_delta;
            }
            if bits & DELTA_ROTATION != 0 {
                self.local.rotation = ops.rotation_delta * self.local.rotation;
            }
            if bits & DELTA_SCALE != 0 {
                self.local.scale = self.local.scale.mul_element_wise(ops.scale_factor);
            }
        }

        let changed = reparented || bits & (LOCAL_MASK | WORLD_DIRTY) != 0;
        if changed {
            self.world = match parent_world {
                Some(parent) => parent.combine(&self.local),
                None => self.local,
            };
        }

        self.snaps[tick as usize % SNAP_RING] = TransformSnap {
            tick,
            local: self.local,
            world: self.world,
        };

        if changed {
            *self.local_cell.write_slot() = self.local;
            self.local_cell.publish();
            *self.world_cell.write_slot() = TransformSnap {
                tick,
                local: self.local,
                world: self.world,
            };
            self.world_cell.publish();
        }
        changed
    }

    //o------------ presentation side ---------------o

    /// Pulls the latest published state and refreshes the interpolated
    /// snapshot. Presentation loop only.
    pub fn sync_view(&self, alpha: f32) {
        let mut view = self.view.lock();
        if self.world_cell.sync() {
            let snap = *self.world_cell.read();
            view.prev_world = view.curr_world;
            view.curr_world = snap.world;
            view.tick = snap.tick;
        }
        self.local_cell.sync();
        view.interpolated = Transform::interpolate(&view.prev_world, &view.curr_world, alpha);
    }

    pub fn interpolated(&self) -> Transform {
        self.view.lock().interpolated
    }

    /// Latest world state the presentation side has synced.
    pub fn viewed_world(&self) -> (u64, Transform) {
        let view = self.view.lock();
        (view.tick, view.curr_world)
    }

    pub fn published_local(&self) -> Transform {
        *self.local_cell.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_consume_publishes_initial_world() {
        let mut t = TransformInstance::new();
        assert!(t.consume(1, None));
        t.sync_view(1.0);
        let (tick, world) = t.viewed_world();
        assert_eq!(tick, 1);
        assert_eq!(world.position, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn queued_deltas_collapse_into_one_recompute() {
        let mut t = TransformInstance::new();
        t.consume(1, None);
        t.queue_translate(Vector3::new(1.0, 0.0, 0.0));
        t.queue_translate(Vector3::new(2.0, 0.0, 0.0));
        assert!(t.consume(2, None));
        assert_eq!(t.world().position.x, 3.0);
        // nothing queued: consume leaves everything alone
        assert!(!t.consume(3, None));
        assert_eq!(t.world().position.x, 3.0);
    }

    #[test]
    fn absolute_override_applies_before_deltas() {
        let mut t = TransformInstance::new();
        t.consume(1, None);
        t.queue_translate(Vector3::new(1.0, 0.0, 0.0));
        t.queue_set_position(Vector3::new(10.0, 0.0, 0.0));
        t.consume(2, None);
        // teleport to 10, then nudge from there
        assert_eq!(t.world().position.x, 11.0);
    }

    #[test]
    fn snap_ring_remembers_recent_ticks() {
        let mut t = TransformInstance::new();
        for tick in 1..=6u64 {
            t.queue_translate(Vector3::new(1.0, 0.0, 0.0));
            t.consume(tick, None);
        }
        assert!(t.snap_at(1).is_none());
        let snap = t.snap_at(5).unwrap();
        assert_eq!(snap.world.position.x, 5.0);
        assert_eq!(t.snap_at(6).unwrap().world.position.x, 6.0);
    }

    #[test]
    fn world_dirty_recomputes_against_new_parent_world() {
        let mut t = TransformInstance::new();
        t.queue_set_position(Vector3::new(1.0, 0.0, 0.0));
        t.consume(1, Some(&Transform::identity()));
        assert_eq!(t.world().position.x, 1.0);

        let parent = Transform::from_position(Vector3::new(5.0, 0.0, 0.0));
        t.mark_world_dirty();
        assert!(t.consume(2, Some(&parent)));
        // local untouched, world follows the parent
        assert_eq!(t.local().position.x, 1.0);
        assert_eq!(t.world().position.x, 6.0);
    }
}

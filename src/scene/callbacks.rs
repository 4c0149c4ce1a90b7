use std::any::Any;

use super::handle::{ComponentHandle, EntityHandle, LayerHandle, LevelHandle};

/// Opaque per-object state produced by the construct callback. The core
/// never looks inside it, it only carries it to the other callbacks and
/// hands it back on destruction.
pub type Payload = Box<dyn Any + Send + Sync>;

/// Handle of the object a callback is being invoked for.
#[derive(Clone, Copy, Debug)]
pub enum OwnerHandle {
    Level(LevelHandle),
    Layer(LayerHandle),
    Entity(EntityHandle),
    Component(ComponentHandle),
}

pub type ConstructFn = Box<dyn Fn(OwnerHandle) -> Option<Payload> + Send + Sync>;
pub type DestructFn = Box<dyn Fn(OwnerHandle, Payload) + Send + Sync>;
/// Phase hook without an external context.
pub type StepFn = Box<dyn Fn(&mut Payload) + Send + Sync>;
/// Phase hook that receives an opaque caller-supplied context.
pub type CtxFn = Box<dyn Fn(&mut Payload, &mut dyn Any) + Send + Sync>;

/// Plain table of optional behavior slots attached to an object at
/// creation. Unset slots are skipped by the dispatcher; there is no
/// inheritance and no virtual dispatch, just the table.
///
/// Objects created without a `construct` slot get a unit payload so the
/// remaining hooks still run.
#[derive(Default)]
pub struct CallbackTable {
    pub construct: Option<ConstructFn>,
    pub destruct: Option<DestructFn>,
    pub on_input: Option<CtxFn>,
    pub on_physics_start: Option<StepFn>,
    pub on_physics_update: Option<StepFn>,
    pub on_physics_end: Option<StepFn>,
    pub on_frame_start: Option<StepFn>,
    pub on_frame: Option<StepFn>,
    pub on_frame_end: Option<StepFn>,
    pub on_render: Option<CtxFn>,
    pub on_debug_draw: Option<CtxFn>,
    pub on_serialize: Option<CtxFn>,
    pub on_deserialize: Option<CtxFn>,
    pub on_inspector: Option<CtxFn>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }
}

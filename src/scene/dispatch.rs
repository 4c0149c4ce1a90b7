use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::callbacks::{CallbackTable, CtxFn, Payload, StepFn};
use super::entity::Entity;
use super::manager::Scene;
use crate::store::{SlotKey, SlotStore};

/// Lifecycle phases a walk can dispatch. The fixed loop drives the
/// physics phases and input, the vary loop the frame phases; the rest are
/// dispatched by whoever owns the matching external context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Input,
    PhysicsStart,
    PhysicsUpdate,
    PhysicsEnd,
    FrameStart,
    FrameUpdate,
    FrameEnd,
    Render,
    DebugDraw,
    Serialize,
    Deserialize,
    Inspector,
}

/// Where the walk currently stands. Passed down the traversal explicitly
/// so a fault report can name what was executing, without any
/// thread-keyed global.
#[derive(Clone, Copy, Default)]
pub struct DispatchCtx<'a> {
    pub phase: Option<Phase>,
    pub level: &'a str,
    pub layer: &'a str,
    pub entity: &'a str,
    pub component: &'a str,
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("opaque panic payload")
}

/// Runs one callback behind a panic boundary. A fault is reported and
/// swallowed; the caller's walk continues with the next object.
pub(crate) fn fault_boundary(what: &str, name: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        log::error!(
            "{} callback of \"{}\" faulted: {}",
            what,
            name,
            panic_message(panic.as_ref())
        );
    }
}

fn invoke_guarded(context: &DispatchCtx, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        log::error!(
            "{:?} callback faulted at {}/{}/{}/{}: {}",
            context.phase,
            context.level,
            context.layer,
            context.entity,
            context.component,
            panic_message(panic.as_ref())
        );
    }
}

fn invoke_table(
    table: &CallbackTable,
    phase: Phase,
    payload: &mut Payload,
    ctx: &mut dyn Any,
    context: &DispatchCtx,
) {
    let step: Option<&StepFn> = match phase {
        Phase::PhysicsStart => table.on_physics_start.as_ref(),
        Phase::PhysicsUpdate => table.on_physics_update.as_ref(),
        Phase::PhysicsEnd => table.on_physics_end.as_ref(),
        Phase::FrameStart => table.on_frame_start.as_ref(),
        Phase::FrameUpdate => table.on_frame.as_ref(),
        Phase::FrameEnd => table.on_frame_end.as_ref(),
        _ => None,
    };
    if let Some(f) = step {
        invoke_guarded(context, || f(payload));
        return;
    }
    let with_ctx: Option<&CtxFn> = match phase {
        Phase::Input => table.on_input.as_ref(),
        Phase::Render => table.on_render.as_ref(),
        Phase::DebugDraw => table.on_debug_draw.as_ref(),
        Phase::Serialize => table.on_serialize.as_ref(),
        Phase::Deserialize => table.on_deserialize.as_ref(),
        Phase::Inspector => table.on_inspector.as_ref(),
        _ => None,
    };
    if let Some(f) = with_ctx {
        invoke_guarded(context, || f(payload, ctx));
    }
}

impl Scene {
    /// Walks levels, layers, root entities, components and then children,
    /// invoking the matching callback slot on every live object. Objects
    /// flagged for destruction are skipped together with their subtree.
    /// One faulting callback never aborts the rest of the walk.
    pub fn dispatch(&mut self, phase: Phase, ctx: &mut dyn Any) {
        profiling::scope!("phase dispatch");
        for level_index in self.levels.alive_indices() {
            let Some(level) = self.levels.get_at_mut(level_index) else {
                continue;
            };
            if level.lifecycle.is_dead() {
                continue;
            }
            let level_name = level.name.as_str();
            let level_context = DispatchCtx {
                phase: Some(phase),
                level: level_name,
                ..DispatchCtx::default()
            };
            if let (Some(table), Some(payload)) = (&level.callbacks, level.payload.as_mut()) {
                invoke_table(table, phase, payload, ctx, &level_context);
            }
            for layer_index in level.layers.alive_indices() {
                let Some(layer) = level.layers.get_at_mut(layer_index) else {
                    continue;
                };
                if layer.lifecycle.is_dead() {
                    continue;
                }
                let layer_name = layer.name.as_str();
                let layer_context = DispatchCtx {
                    layer: layer_name,
                    ..level_context
                };
                if let (Some(table), Some(payload)) = (&layer.callbacks, layer.payload.as_mut()) {
                    invoke_table(table, phase, payload, ctx, &layer_context);
                }
                let mut roots = Vec::new();
                layer.entities.for_each_alive(|_, entity| {
                    if entity.is_root() && !entity.lifecycle.is_dead() {
                        roots.push(entity.handle.entity);
                    }
                });
                for root in roots {
                    dispatch_entity(&mut layer.entities, root, phase, ctx, &layer_context);
                }
            }
        }
    }
}

fn dispatch_entity(
    entities: &mut SlotStore<Entity>,
    key: SlotKey,
    phase: Phase,
    ctx: &mut dyn Any,
    scope_context: &DispatchCtx,
) {
    let children = {
        let Some(entity) = entities.get_mut(key) else {
            return;
        };
        // a flagged entity takes its whole subtree out of the walk;
        // destruction marking cascades, so nothing below it is live
        if entity.lifecycle.is_dead() {
            return;
        }
        let entity_name = entity.name.as_str();
        let entity_context = DispatchCtx {
            entity: entity_name,
            ..*scope_context
        };
        if let (Some(table), Some(payload)) = (&entity.callbacks, entity.payload.as_mut()) {
            invoke_table(table, phase, payload, ctx, &entity_context);
        }
        for component_index in entity.components.alive_indices() {
            let Some(component) = entity.components.get_at_mut(component_index) else {
                continue;
            };
            if component.lifecycle.is_dead() {
                continue;
            }
            let component_context = DispatchCtx {
                component: component.name.as_str(),
                ..entity_context
            };
            if let (Some(table), Some(payload)) = (&component.callbacks, component.payload.as_mut())
            {
                invoke_table(table, phase, payload, ctx, &component_context);
            }
        }
        entity.children.clone()
    };
    for child in children {
        dispatch_entity(entities, child.entity, phase, ctx, scope_context);
    }
}

use super::types::Transform;
use crate::scene::entity::Entity;
use crate::scene::handle::EntityHandle;
use crate::scene::level::Layer;
use crate::scene::manager::Scene;
use crate::store::{SlotKey, SlotStore};

impl Scene {
    /// Per-tick transform pass, simulation thread only. Applies queued
    /// reparents, consumes every entity's accumulated operations in
    /// parent-before-child order and publishes whatever changed.
    pub fn consume_transforms(&mut self, tick: u64) {
        profiling::scope!("consume transforms");
        for level_index in self.levels.alive_indices() {
            let Some(level) = self.levels.get_at_mut(level_index) else {
                continue;
            };
            if level.lifecycle.is_dead() {
                continue;
            }
            for layer_index in level.layers.alive_indices() {
                let Some(layer) = level.layers.get_at_mut(layer_index) else {
                    continue;
                };
                if layer.lifecycle.is_dead() {
                    continue;
                }
                relink_pass(layer);
                let mut roots = Vec::new();
                layer.entities.for_each_alive(|_, entity| {
                    if entity.is_root() {
                        roots.push(entity.handle.entity);
                    }
                });
                for root in roots {
                    update_entity_transform(&mut layer.entities, root, tick, None);
                }
            }
        }
    }

    /// Presentation-side pass: pulls every entity's freshly published
    /// state and refreshes the interpolated snapshots. `alpha` is the
    /// fraction of the current fixed tick that has elapsed.
    pub fn sync_transform_views(&self, alpha: f32) {
        profiling::scope!("sync transform views");
        self.levels.for_each_alive(|_, level| {
            level.layers.for_each_alive(|_, layer| {
                layer.entities.for_each_alive(|_, entity| {
                    entity.transform.sync_view(alpha);
                });
            });
        });
    }
}

/// Applies queued reparent requests: relinks the child lists and parent
/// handles, leaving the local-transform fixup for each entity's visit in
/// the recompute walk (where the new parent's same-tick world exists).
fn relink_pass(layer: &mut Layer) {
    let mut requests: Vec<(EntityHandle, EntityHandle, Option<EntityHandle>)> = Vec::new();
    layer.entities.for_each_alive(|_, entity| {
        if entity.lifecycle.is_dead() || !entity.transform.has_reparent_request() {
            return;
        }
        if let Some(request) = entity.transform.take_reparent_request() {
            requests.push((entity.handle, entity.parent, request));
        }
    });

    for (child, old_parent, new_parent) in requests {
        if let Some(target) = new_parent {
            let target_alive = layer
                .entities
                .get(target.entity)
                .map_or(false, |e| !e.lifecycle.is_dead());
            if !target_alive {
                log::warn!("dropping reparent request onto a dead entity");
                continue;
            }
            if target == child || is_ancestor(layer, child, target) {
                log::warn!("dropping reparent request that would form a cycle");
                continue;
            }
        }
        if old_parent.is_valid() {
            if let Some(parent) = layer.entities.get_mut(old_parent.entity) {
                parent.children.retain(|c| *c != child);
            }
        }
        if let Some(target) = new_parent {
            if let Some(parent) = layer.entities.get_mut(target.entity) {
                parent.children.push(child);
            }
        }
        if let Some(entity) = layer.entities.get_mut(child.entity) {
            entity.parent = new_parent.unwrap_or_default();
            entity.transform.flag_reparent_math();
        }
    }
}

fn is_ancestor(layer: &Layer, ancestor: EntityHandle, of: EntityHandle) -> bool {
    let mut cursor = of;
    while cursor.is_valid() {
        if cursor == ancestor {
            return true;
        }
        cursor = match layer.entities.get(cursor.entity) {
            Some(entity) => entity.parent,
            None => break,
        };
    }
    false
}

fn update_entity_transform(
    entities: &mut SlotStore<Entity>,
    key: SlotKey,
    tick: u64,
    parent_world: Option<Transform>,
) {
    let (world, children, changed) = {
        let Some(entity) = entities.get_mut(key) else {
            return;
        };
        // dying subtrees keep their last state; reclamation takes them
        if entity.lifecycle.is_dead() {
            return;
        }
        let changed = entity.transform.consume(tick, parent_world.as_ref());
        (*entity.transform.world(), entity.children.clone(), changed)
    };
    if changed {
        // children only get the world-dirty flag; their own recompute
        // runs at their turn below, against this fresh world
        for child in &children {
            if let Some(child_ref) = entities.get(child.entity) {
                child_ref.transform.mark_world_dirty();
            }
        }
    }
    for child in children {
        update_entity_transform(entities, child.entity, tick, Some(world));
    }
}

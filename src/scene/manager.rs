use std::sync::Arc;

use parking_lot::Mutex;

use super::callbacks::{CallbackTable, OwnerHandle, Payload};
use super::dispatch::fault_boundary;
use super::entity::{name_hash, Component, Entity};
use super::error::SceneError;
use super::handle::{ComponentHandle, EntityHandle, LayerHandle, LevelHandle};
use super::level::{Layer, Level};
use super::lifecycle::{Destructible, LoopTicks};
use crate::store::SlotStore;
use crate::sync::WorkerPool;

/// Entity count above which the reclamation scan fans out to the pool.
const PARALLEL_SCAN_MIN: usize = 256;

/// Root of the object graph: levels own layers, layers own entities,
/// entities own components. Everything is addressed by handles and dies
/// through the two-phase protocol; the only hard teardown is
/// [`teardown`](Self::teardown) once no loop runs anymore.
pub struct Scene {
    pub(crate) levels: SlotStore<Level>,
    ticks: Arc<LoopTicks>,
    grace: u64,
}

impl Scene {
    pub fn new(ticks: Arc<LoopTicks>, grace_ticks: u64) -> Self {
        Self {
            levels: SlotStore::new(),
            ticks,
            grace: grace_ticks,
        }
    }

    /// Scene with its own tick counters, for tools and tests that drive
    /// the loops by hand.
    pub fn standalone() -> Self {
        Self::new(Arc::new(LoopTicks::new()), 2)
    }

    pub fn ticks(&self) -> Arc<LoopTicks> {
        self.ticks.clone()
    }

    pub fn grace_ticks(&self) -> u64 {
        self.grace
    }

    //o------------ creation ---------------o

    pub fn create_level(
        &mut self,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<LevelHandle, SceneError> {
        let key = self
            .levels
            .insert_with(|key| Level::new(name, LevelHandle { level: key }, callbacks));
        let handle = LevelHandle { level: key };
        match run_construct(&self.levels.get(key).unwrap().callbacks, OwnerHandle::Level(handle)) {
            Some(payload) => {
                self.levels.get_mut(key).unwrap().payload = Some(payload);
                Ok(handle)
            }
            None => {
                self.levels.release(key.index);
                Err(SceneError::ConstructFailed {
                    kind: "level",
                    name: name.to_owned(),
                })
            }
        }
    }

    pub fn create_layer(
        &mut self,
        level: LevelHandle,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<LayerHandle, SceneError> {
        let level_ref = self
            .levels
            .get_mut(level.level)
            .filter(|l| !l.lifecycle.is_dead())
            .ok_or_else(|| SceneError::DeadOwner {
                name: name.to_owned(),
            })?;
        let key = level_ref.layers.insert_with(|key| {
            Layer::new(
                name,
                LayerHandle {
                    level: level.level,
                    layer: key,
                },
                callbacks,
            )
        });
        let handle = LayerHandle {
            level: level.level,
            layer: key,
        };
        match run_construct(
            &level_ref.layers.get(key).unwrap().callbacks,
            OwnerHandle::Layer(handle),
        ) {
            Some(payload) => {
                level_ref.layers.get_mut(key).unwrap().payload = Some(payload);
                Ok(handle)
            }
            None => {
                level_ref.layers.release(key.index);
                Err(SceneError::ConstructFailed {
                    kind: "layer",
                    name: name.to_owned(),
                })
            }
        }
    }

    /// Spawns a root entity into a layer.
    pub fn spawn_entity(
        &mut self,
        layer: LayerHandle,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<EntityHandle, SceneError> {
        self.spawn_entity_inner(layer, EntityHandle::default(), name, callbacks)
    }

    /// Spawns an entity parented under `parent`, in the parent's layer.
    pub fn spawn_child(
        &mut self,
        parent: EntityHandle,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<EntityHandle, SceneError> {
        if self.entity(parent).map_or(true, |e| e.lifecycle.is_dead()) {
            return Err(SceneError::DeadOwner {
                name: name.to_owned(),
            });
        }
        let handle = self.spawn_entity_inner(parent.layer(), parent, name, callbacks)?;
        let layer = self.layer_mut_unchecked(parent.layer()).unwrap();
        if let Some(parent_ref) = layer.entities.get_mut(parent.entity) {
            parent_ref.children.push(handle);
        }
        Ok(handle)
    }

    fn spawn_entity_inner(
        &mut self,
        layer: LayerHandle,
        parent: EntityHandle,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<EntityHandle, SceneError> {
        let layer_ref = self
            .layer_mut(layer)
            .filter(|l| !l.lifecycle.is_dead())
            .ok_or_else(|| SceneError::DeadOwner {
                name: name.to_owned(),
            })?;
        let key = layer_ref.entities.insert_with(|key| {
            let handle = EntityHandle {
                level: layer.level,
                layer: layer.layer,
                entity: key,
            };
            Entity::new(name, handle, parent, callbacks)
        });
        let handle = EntityHandle {
            level: layer.level,
            layer: layer.layer,
            entity: key,
        };
        match run_construct(
            &layer_ref.entities.get(key).unwrap().callbacks,
            OwnerHandle::Entity(handle),
        ) {
            Some(payload) => {
                layer_ref.entities.get_mut(key).unwrap().payload = Some(payload);
                Ok(handle)
            }
            None => {
                layer_ref.entities.release(key.index);
                Err(SceneError::ConstructFailed {
                    kind: "entity",
                    name: name.to_owned(),
                })
            }
        }
    }

    /// Adds a component to an entity. A second component with the same
    /// identity hash is rejected; the error carries the existing handle.
    pub fn add_component(
        &mut self,
        entity: EntityHandle,
        name: &str,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Result<ComponentHandle, SceneError> {
        let hash = name_hash(name);
        let entity_ref = self
            .entity_mut(entity)
            .filter(|e| !e.lifecycle.is_dead())
            .ok_or_else(|| SceneError::DeadOwner {
                name: name.to_owned(),
            })?;

        let mut existing = None;
        entity_ref.components.for_each_alive(|_, component| {
            if component.hash == hash && !component.lifecycle.is_dead() && existing.is_none() {
                existing = Some(component.handle);
            }
        });
        if let Some(existing) = existing {
            log::warn!(
                "component \"{}\" already exists on entity \"{}\"",
                name,
                entity_ref.name
            );
            return Err(SceneError::DuplicateComponent {
                name: name.to_owned(),
                existing,
            });
        }

        let key = entity_ref.components.insert_with(|key| Component {
            name: name.to_owned(),
            hash,
            handle: ComponentHandle {
                entity,
                component: key,
            },
            lifecycle: Destructible::new(),
            callbacks,
            payload: None,
        });
        let handle = ComponentHandle {
            entity,
            component: key,
        };
        match run_construct(
            &entity_ref.components.get(key).unwrap().callbacks,
            OwnerHandle::Component(handle),
        ) {
            Some(payload) => {
                entity_ref.components.get_mut(key).unwrap().payload = Some(payload);
                Ok(handle)
            }
            None => {
                entity_ref.components.release(key.index);
                Err(SceneError::ConstructFailed {
                    kind: "component",
                    name: name.to_owned(),
                })
            }
        }
    }

    //o------------ resolution ---------------o

    pub fn level(&self, handle: LevelHandle) -> Option<&Level> {
        self.levels
            .get(handle.level)
            .filter(|level| !level.lifecycle.is_destroyed())
    }

    pub fn level_mut(&mut self, handle: LevelHandle) -> Option<&mut Level> {
        self.levels
            .get_mut(handle.level)
            .filter(|level| !level.lifecycle.is_destroyed())
    }

    pub fn layer(&self, handle: LayerHandle) -> Option<&Layer> {
        self.level(handle.level())?
            .layers
            .get(handle.layer)
            .filter(|layer| !layer.lifecycle.is_destroyed())
    }

    pub fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut Layer> {
        self.level_mut(handle.level())?
            .layers
            .get_mut(handle.layer)
            .filter(|layer| !layer.lifecycle.is_destroyed())
    }

    fn layer_mut_unchecked(&mut self, handle: LayerHandle) -> Option<&mut Layer> {
        self.levels.get_mut(handle.level)?.layers.get_mut(handle.layer)
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.layer(handle.layer())?
            .entities
            .get(handle.entity)
            .filter(|entity| !entity.lifecycle.is_destroyed())
    }

    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.layer_mut(handle.layer())?
            .entities
            .get_mut(handle.entity)
            .filter(|entity| !entity.lifecycle.is_destroyed())
    }

    pub fn component(&self, handle: ComponentHandle) -> Option<&Component> {
        self.entity(handle.entity())?.component(handle.component)
    }

    pub fn component_mut(&mut self, handle: ComponentHandle) -> Option<&mut Component> {
        self.entity_mut(handle.entity())?.component_mut(handle.component)
    }

    //o------------ destruction ---------------o

    /// Flags a component for deferred destruction.
    pub fn destroy_component(&mut self, handle: ComponentHandle) -> bool {
        let ticks = self.ticks.clone();
        self.component_mut(handle)
            .map_or(false, |component| component.lifecycle.mark(&ticks))
    }

    /// Flags an entity, its components and its whole child subtree for
    /// deferred destruction.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> bool {
        let ticks = self.ticks.clone();
        let Some(layer) = self.layer_mut(handle.layer()) else {
            return false;
        };
        if layer.entities.get(handle.entity).is_none() {
            return false;
        }
        let mut subtree = Vec::new();
        collect_subtree(layer, handle, &mut subtree);
        let mut marked_root = false;
        for entity_handle in subtree {
            if let Some(entity) = layer.entities.get(entity_handle.entity) {
                let marked = entity.lifecycle.mark(&ticks);
                if entity_handle == handle {
                    marked_root = marked;
                }
                entity.components.for_each_alive(|_, component| {
                    component.lifecycle.mark(&ticks);
                });
            }
        }
        marked_root
    }

    /// Flags a layer and everything inside it for deferred destruction.
    pub fn destroy_layer(&mut self, handle: LayerHandle) -> bool {
        let ticks = self.ticks.clone();
        let Some(layer) = self.layer_mut(handle) else {
            return false;
        };
        if !layer.lifecycle.mark(&ticks) {
            return false;
        }
        mark_layer_contents(layer, &ticks);
        true
    }

    /// Flags a level and everything inside it for deferred destruction.
    pub fn destroy_level(&mut self, handle: LevelHandle) -> bool {
        let ticks = self.ticks.clone();
        let Some(level) = self.level_mut(handle) else {
            return false;
        };
        if !level.lifecycle.mark(&ticks) {
            return false;
        }
        level.layers.for_each_alive(|_, layer| {
            layer.lifecycle.mark(&ticks);
            mark_layer_contents(layer, &ticks);
        });
        true
    }

    /// Reparents an entity (or detaches it with `None`). The request is
    /// queued like any other transform operation and applied at the next
    /// simulation tick. Cross-layer reparenting is refused.
    pub fn queue_reparent(&self, child: EntityHandle, new_parent: Option<EntityHandle>) -> bool {
        let Some(entity) = self.entity(child) else {
            return false;
        };
        if let Some(parent) = new_parent {
            if !child.same_layer(&parent) {
                log::warn!(
                    "refusing to reparent \"{}\" across layers",
                    entity.name
                );
                return false;
            }
            if self.entity(parent).map_or(true, |p| p.lifecycle.is_dead()) {
                return false;
            }
        }
        entity.transform.queue_set_parent(new_parent);
        true
    }

    //o------------ reclamation ---------------o

    /// Reclamation pass: promotes every pending object whose grace period
    /// has elapsed, runs its destruct callback and releases its slot.
    /// Containers are only released once they are empty, so a late
    /// destruction request inside a dying scope never gets cut short.
    /// Returns the number of released slots.
    pub fn collect(&mut self, pool: Option<&WorkerPool>, chunk_size: usize) -> usize {
        profiling::scope!("scene collect");
        let ticks = self.ticks.clone();
        let grace = self.grace;
        let mut released = 0;

        for level_index in self.levels.alive_indices() {
            let Some(level) = self.levels.get_at_mut(level_index) else {
                continue;
            };
            for layer_index in level.layers.alive_indices() {
                let mut layer_ready = false;
                if let Some(layer) = level.layers.get_at_mut(layer_index) {
                    released += collect_layer(layer, &ticks, grace, pool, chunk_size);
                    layer_ready = layer.lifecycle.can_destroy(&ticks, grace)
                        && layer.entities.live_count() == 0;
                }
                if layer_ready {
                    if let Some(mut layer) = level.layers.release(layer_index) {
                        destruct_layer(&mut layer);
                        released += 1;
                    }
                }
            }
            let level_ready = level.lifecycle.can_destroy(&ticks, grace)
                && level.layers.live_count() == 0;
            if level_ready {
                if let Some(mut level) = self.levels.release(level_index) {
                    destruct_level(&mut level);
                    released += 1;
                }
            }
        }
        released
    }

    /// Immediate whole-scene destruction for shutdown: every loop must
    /// have stopped, there are no concurrent readers left. Destruct
    /// callbacks still run, innermost objects first.
    pub fn teardown(&mut self) {
        log::info!("scene teardown");
        let mut levels = std::mem::take(&mut self.levels);
        for level_index in levels.alive_indices() {
            if let Some(mut level) = levels.release(level_index) {
                for layer_index in level.layers.alive_indices() {
                    if let Some(mut layer) = level.layers.release(layer_index) {
                        for entity_index in layer.entities.alive_indices() {
                            if let Some(mut entity) = layer.entities.release(entity_index) {
                                destruct_entity_now(&mut entity);
                            }
                        }
                        destruct_layer(&mut layer);
                    }
                }
                destruct_level(&mut level);
            }
        }
    }
}

fn run_construct(table: &Option<Arc<CallbackTable>>, owner: OwnerHandle) -> Option<Payload> {
    match table.as_ref().and_then(|t| t.construct.as_ref()) {
        Some(construct) => {
            let mut produced = None;
            fault_boundary("construct", &format!("{:?}", owner), || {
                produced = construct(owner);
            });
            produced
        }
        // objects without a construct hook still carry a payload so the
        // remaining hooks can run
        None => Some(Box::new(())),
    }
}

fn collect_subtree(layer: &Layer, root: EntityHandle, out: &mut Vec<EntityHandle>) {
    out.push(root);
    if let Some(entity) = layer.entities.get(root.entity) {
        for child in &entity.children {
            collect_subtree(layer, *child, out);
        }
    }
}

fn mark_layer_contents(layer: &Layer, ticks: &LoopTicks) {
    layer.entities.for_each_alive(|_, entity| {
        entity.lifecycle.mark(ticks);
        entity.components.for_each_alive(|_, component| {
            component.lifecycle.mark(ticks);
        });
    });
}

fn collect_layer(
    layer: &mut Layer,
    ticks: &Arc<LoopTicks>,
    grace: u64,
    pool: Option<&WorkerPool>,
    chunk_size: usize,
) -> usize {
    let mut released = 0;

    // scan phase, read-only over the store
    let (dead_entities, partial_entities) = if let Some(pool) =
        pool.filter(|_| layer.entities.live_count() >= PARALLEL_SCAN_MIN)
    {
        let dead = Mutex::new(Vec::new());
        let partial = Mutex::new(Vec::new());
        layer.entities.parallel_for_each_alive(pool, chunk_size, |index, entity| {
            if entity.lifecycle.can_destroy(ticks, grace) {
                dead.lock().push(index);
            } else {
                let mut any = false;
                entity.components.for_each_alive(|_, component| {
                    any |= component.lifecycle.can_destroy(ticks, grace);
                });
                if any {
                    partial.lock().push(index);
                }
            }
        });
        (dead.into_inner(), partial.into_inner())
    } else {
        let mut dead = Vec::new();
        let mut partial = Vec::new();
        layer.entities.for_each_alive(|index, entity| {
            if entity.lifecycle.can_destroy(ticks, grace) {
                dead.push(index);
            } else {
                let mut any = false;
                entity.components.for_each_alive(|_, component| {
                    any |= component.lifecycle.can_destroy(ticks, grace);
                });
                if any {
                    partial.push(index);
                }
            }
        });
        (dead, partial)
    };

    // dying components on surviving entities
    for index in partial_entities {
        if let Some(entity) = layer.entities.get_at_mut(index) {
            released += release_ready_components(entity, ticks, grace);
        }
    }

    // dying entities; held back while any component is still in grace
    let mut unlink: Vec<(EntityHandle, EntityHandle)> = Vec::new();
    for index in dead_entities {
        let ready = match layer.entities.get_at_mut(index) {
            Some(entity) => {
                released += release_ready_components(entity, ticks, grace);
                entity.components.live_count() == 0
            }
            None => false,
        };
        if !ready {
            continue;
        }
        if let Some(mut entity) = layer.entities.release(index) {
            destruct_entity_now(&mut entity);
            if entity.parent.is_valid() {
                unlink.push((entity.parent, entity.handle));
            }
            released += 1;
        }
    }
    for (parent, child) in unlink {
        if let Some(parent_ref) = layer.entities.get_mut(parent.entity) {
            parent_ref.children.retain(|c| *c != child);
        }
    }
    released
}

fn release_ready_components(entity: &mut Entity, ticks: &LoopTicks, grace: u64) -> usize {
    let mut released = 0;
    for index in entity.components.alive_indices() {
        let ready = entity
            .components
            .get_at(index)
            .map_or(false, |component| component.lifecycle.can_destroy(ticks, grace));
        if ready {
            if let Some(mut component) = entity.components.release(index) {
                destruct_component(&mut component);
                released += 1;
            }
        }
    }
    released
}

fn destruct_component(component: &mut Component) {
    let payload = component.payload.take();
    if let Some(payload) = payload {
        if let Some(destruct) = component
            .callbacks
            .as_ref()
            .and_then(|t| t.destruct.as_ref())
        {
            fault_boundary("destruct", &component.name, || {
                destruct(OwnerHandle::Component(component.handle), payload);
            });
        }
    }
    component.lifecycle.set_destroyed();
}

fn destruct_entity_now(entity: &mut Entity) {
    // components first, innermost out
    for index in entity.components.alive_indices() {
        if let Some(mut component) = entity.components.release(index) {
            destruct_component(&mut component);
        }
    }
    let payload = entity.payload.take();
    if let Some(payload) = payload {
        if let Some(destruct) = entity.callbacks.as_ref().and_then(|t| t.destruct.as_ref()) {
            fault_boundary("destruct", &entity.name, || {
                destruct(OwnerHandle::Entity(entity.handle), payload);
            });
        }
    }
    entity.lifecycle.set_destroyed();
}

fn destruct_layer(layer: &mut Layer) {
    let payload = layer.payload.take();
    if let Some(payload) = payload {
        if let Some(destruct) = layer.callbacks.as_ref().and_then(|t| t.destruct.as_ref()) {
            fault_boundary("destruct", &layer.name, || {
                destruct(OwnerHandle::Layer(layer.handle), payload);
            });
        }
    }
    layer.lifecycle.set_destroyed();
}

fn destruct_level(level: &mut Level) {
    let payload = level.payload.take();
    if let Some(payload) = payload {
        if let Some(destruct) = level.callbacks.as_ref().and_then(|t| t.destruct.as_ref()) {
            fault_boundary("destruct", &level.name, || {
                destruct(OwnerHandle::Level(level.handle), payload);
            });
        }
    }
    level.lifecycle.set_destroyed();
}

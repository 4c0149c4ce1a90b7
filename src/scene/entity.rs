use std::sync::Arc;

use super::callbacks::{CallbackTable, Payload};
use super::handle::{ComponentHandle, EntityHandle};
use super::lifecycle::Destructible;
use crate::store::{SlotKey, SlotStore};
use crate::transform::TransformInstance;

/// Identity hash used for duplicate detection and name lookups.
pub fn name_hash(name: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

pub struct Component {
    pub(crate) name: String,
    pub(crate) hash: u64,
    pub(crate) handle: ComponentHandle,
    pub(crate) lifecycle: Destructible,
    pub(crate) callbacks: Option<Arc<CallbackTable>>,
    pub(crate) payload: Option<Payload>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    pub fn lifecycle(&self) -> &Destructible {
        &self.lifecycle
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        self.payload.as_mut()
    }
}

/// A simulated object: a transform, a component store and a place in the
/// layer's entity hierarchy. All relationships are handles, never
/// references, so related objects can die without dangling anything.
pub struct Entity {
    pub(crate) name: String,
    pub(crate) hash: u64,
    pub(crate) handle: EntityHandle,
    /// invalid handle = root entity of its layer
    pub(crate) parent: EntityHandle,
    pub(crate) children: Vec<EntityHandle>,
    pub(crate) components: SlotStore<Component>,
    pub(crate) lifecycle: Destructible,
    pub(crate) callbacks: Option<Arc<CallbackTable>>,
    pub(crate) payload: Option<Payload>,
    pub(crate) transform: TransformInstance,
}

impl Entity {
    pub(crate) fn new(
        name: &str,
        handle: EntityHandle,
        parent: EntityHandle,
        callbacks: Option<Arc<CallbackTable>>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            hash: name_hash(name),
            handle,
            parent,
            children: Vec::new(),
            components: SlotStore::new(),
            lifecycle: Destructible::new(),
            callbacks,
            payload: None,
            transform: TransformInstance::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn parent(&self) -> EntityHandle {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        !self.parent.is_valid()
    }

    pub fn children(&self) -> &[EntityHandle] {
        &self.children
    }

    pub fn lifecycle(&self) -> &Destructible {
        &self.lifecycle
    }

    pub fn transform(&self) -> &TransformInstance {
        &self.transform
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        self.payload.as_mut()
    }

    /// Resolves a component by key; destroyed components are never
    /// returned.
    pub fn component(&self, key: SlotKey) -> Option<&Component> {
        self.components
            .get(key)
            .filter(|component| !component.lifecycle.is_destroyed())
    }

    pub fn component_mut(&mut self, key: SlotKey) -> Option<&mut Component> {
        self.components
            .get_mut(key)
            .filter(|component| !component.lifecycle.is_destroyed())
    }

    /// Looks a live component up by identity hash.
    pub fn find_component(&self, name: &str) -> Option<ComponentHandle> {
        let hash = name_hash(name);
        let mut found = None;
        self.components.for_each_alive(|_, component| {
            if component.hash == hash && !component.lifecycle.is_destroyed() && found.is_none() {
                found = Some(component.handle);
            }
        });
        found
    }

    pub fn component_count(&self) -> usize {
        self.components.live_count()
    }
}

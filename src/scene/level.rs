use std::sync::Arc;

use super::callbacks::{CallbackTable, Payload};
use super::entity::{name_hash, Entity};
use super::handle::{LayerHandle, LevelHandle};
use super::lifecycle::Destructible;
use crate::store::SlotStore;

/// Grouping of entities updated together inside a level.
pub struct Layer {
    pub(crate) name: String,
    pub(crate) hash: u64,
    pub(crate) handle: LayerHandle,
    pub(crate) entities: SlotStore<Entity>,
    pub(crate) lifecycle: Destructible,
    pub(crate) callbacks: Option<Arc<CallbackTable>>,
    pub(crate) payload: Option<Payload>,
}

impl Layer {
    pub(crate) fn new(name: &str, handle: LayerHandle, callbacks: Option<Arc<CallbackTable>>) -> Self {
        Self {
            name: name.to_owned(),
            hash: name_hash(name),
            handle,
            entities: SlotStore::new(),
            lifecycle: Destructible::new(),
            callbacks,
            payload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> LayerHandle {
        self.handle
    }

    pub fn lifecycle(&self) -> &Destructible {
        &self.lifecycle
    }

    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }
}

/// Top-level scope of the object graph; owns its layers.
pub struct Level {
    pub(crate) name: String,
    pub(crate) hash: u64,
    pub(crate) handle: LevelHandle,
    pub(crate) layers: SlotStore<Layer>,
    pub(crate) lifecycle: Destructible,
    pub(crate) callbacks: Option<Arc<CallbackTable>>,
    pub(crate) payload: Option<Payload>,
}

impl Level {
    pub(crate) fn new(name: &str, handle: LevelHandle, callbacks: Option<Arc<CallbackTable>>) -> Self {
        Self {
            name: name.to_owned(),
            hash: name_hash(name),
            handle,
            layers: SlotStore::new(),
            lifecycle: Destructible::new(),
            callbacks,
            payload: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> LevelHandle {
        self.handle
    }

    pub fn lifecycle(&self) -> &Destructible {
        &self.lifecycle
    }

    pub fn layer_count(&self) -> usize {
        self.layers.live_count()
    }
}

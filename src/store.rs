pub mod slot_store;
pub mod parallel;

#[allow(unused)]
pub use slot_store::{SlotStore, SlotIndex, SlotKey, SlotVersion, INVALID_SLOT};

pub mod handle;
pub mod lifecycle;
pub mod callbacks;
pub mod error;
pub mod entity;
pub mod level;
pub mod manager;
pub mod dispatch;

#[allow(unused)]
pub use handle::{ComponentHandle, EntityHandle, LayerHandle, LevelHandle};
#[allow(unused)]
pub use lifecycle::{Destructible, LoopKind, LoopTicks, LOOP_COUNT};
#[allow(unused)]
pub use callbacks::{CallbackTable, OwnerHandle, Payload};
#[allow(unused)]
pub use error::SceneError;
#[allow(unused)]
pub use entity::{name_hash, Component, Entity};
#[allow(unused)]
pub use level::{Layer, Level};
#[allow(unused)]
pub use manager::Scene;
#[allow(unused)]
pub use dispatch::{DispatchCtx, Phase};

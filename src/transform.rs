pub mod types;
pub mod instance;
pub mod propagate;

#[allow(unused)]
pub use types::Transform;
#[allow(unused)]
pub use instance::{TransformInstance, TransformSnap, SNAP_RING};

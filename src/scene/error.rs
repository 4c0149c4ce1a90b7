use thiserror::Error;

use super::handle::ComponentHandle;

#[derive(Debug, Error)]
pub enum SceneError {
    /// The construct callback produced no payload; the object was not
    /// inserted.
    #[error("construct callback of {kind} \"{name}\" produced no payload")]
    ConstructFailed { kind: &'static str, name: String },

    /// An identity hash collision on the owning entity. The already
    /// present component rides along so callers can keep using it.
    #[error("component \"{name}\" already exists on the owning entity")]
    DuplicateComponent {
        name: String,
        existing: ComponentHandle,
    },

    /// The owner handle did not resolve to a live object.
    #[error("owner handle of \"{name}\" is stale or dead")]
    DeadOwner { name: String },
}

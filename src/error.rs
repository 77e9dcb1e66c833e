use crate::engine::ValueId;
use crate::isolate::IsolateId;

/// Errors surfaced by the engine model and the external bridge.
///
/// Engine contract violations (a weak handle left set after its first-pass
/// callback, a release scheduled mid-traversal) are not represented here:
/// they abort like an engine CHECK failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("engine heap exhausted ({live} live values, limit {limit})")]
    HeapExhausted { live: usize, limit: usize },

    /// The external was already finalized. Holding an `ExternalRef` past the
    /// collection of its value is a bug in the calling code.
    #[error("external value {0:?} has already been finalized")]
    ExternalCollected(ValueId),

    #[error("external belongs to isolate {expected}, not isolate {actual}")]
    WrongIsolate {
        expected: IsolateId,
        actual: IsolateId,
    },

    #[error("value {0:?} is not an external")]
    NotExternal(ValueId),

    #[error("value {0:?} is not an object")]
    NotAnObject(ValueId),

    #[error("value {0:?} is no longer alive")]
    StaleValue(ValueId),
}

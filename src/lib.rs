pub mod engine;
pub mod error;
pub mod external;
pub mod gc;
pub mod host;
pub mod isolate;
pub mod limits;

// Core API
pub use error::BridgeError;
pub use external::ExternalRef;
pub use host::{HostObject, WeakHostObject};
pub use isolate::{Isolate, IsolateId};
pub use limits::IsolateLimits;

pub use engine::{
    CallbackPass, GcEvent, GcObserver, GcSummary, Global, HandleId, HeapStatistics, ValueId,
    WeakCallback, WeakCallbackInfo,
};
pub use gc::{JsLock, ReleaseQueue};

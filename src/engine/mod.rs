//! Embedded engine model: heap, persistent handles and the collector's
//! weak-callback boundary.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  collect_garbage()                                       │
//! │  ├── mark from strong Globals through object properties  │
//! │  ├── first pass: condemned weak callbacks reset handles  │
//! │  ├── sweep unmarked values (slot generation bumped)      │
//! │  └── second pass: side effects (schedule releases)       │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod handles;
mod heap;
mod observer;
mod weak_callback;

pub use handles::{Global, HandleId};
pub use heap::{External, HeapKind, Object, Value, ValueId, ValueKind};
pub use observer::{GcEvent, GcObserver, GcSummary, HeapStatistics};
pub use weak_callback::{CallbackPass, WeakCallback, WeakCallbackInfo};

pub(crate) use handles::{HandleTable, PendingWeak};
pub(crate) use heap::{Heap, HeapValue};

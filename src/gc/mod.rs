//! Deferred release of host objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Second-pass weak callback                                  │
//! │  └── Isolate::schedule_release_object(host_object)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ReleaseQueue                                               │
//! │  ├── Owns host objects handed over by the collector         │
//! │  └── Lock-free pending check                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  JsLock (RAII)                                              │
//! │  └── Drains the queue on acquisition and on release         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod js_lock;
mod release_queue;

pub use js_lock::JsLock;
pub use release_queue::ReleaseQueue;

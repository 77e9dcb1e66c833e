//! Wrap a host object, let it become unreachable and watch the two passes.
//!
//! Run with `RUST_LOG=trace` to see the queue and isolate logs.

use external_bridge::engine::Object;
use external_bridge::{ExternalRef, GcEvent, Global, HostObject, Isolate, IsolateLimits, JsLock};

struct Connection {
    peer: String,
}

impl Drop for Connection {
    fn drop(&mut self) {
        println!("closing connection to {}", self.peer);
    }
}

fn main() {
    env_logger::init();

    let mut isolate = Isolate::new(IsolateLimits::default());
    isolate.set_gc_observer(|event: &GcEvent| println!("gc: {:?}", event));

    {
        let mut lock = JsLock::new(&mut isolate);

        let global_object = lock.new_object().unwrap();
        let _root = Global::<Object>::new(&lock, global_object).unwrap();

        let connection = HostObject::new(Connection {
            peer: "10.0.0.7:5432".to_string(),
        });
        let external = ExternalRef::new(&mut lock, connection).unwrap();
        lock.set_property(global_object, "db", external.handle()).unwrap();

        let value = external.value(&lock).unwrap();
        if let Some(conn) = value.downcast_ref::<Connection>() {
            println!("script sees connection to {}", conn.peer);
        }
        drop(value);

        println!("-- collecting while reachable");
        lock.collect_garbage();

        lock.delete_property(global_object, "db").unwrap();
        println!("-- collecting after the script dropped it");
        lock.collect_garbage();
        println!("pending releases: {}", lock.pending_releases());
    }

    println!("lock released, pending: {}", isolate.pending_releases());
}

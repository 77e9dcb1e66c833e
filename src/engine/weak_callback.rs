//! Two-pass weak callbacks.
//!
//! A weak handle whose target dies is reported to its callback twice:
//!
//! 1. **First pass**, while the collector is still walking the heap. The
//!    callback may only do bookkeeping: it must reset its weak handle, and it
//!    may ask for a second pass with [`WeakCallbackInfo::set_second_pass_callback`].
//! 2. **Second pass**, after the sweep, where arbitrary side effects are
//!    allowed (except re-entering the collector).

use crate::isolate::Isolate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPass {
    First,
    Second,
}

pub type WeakCallback<P> = fn(&mut WeakCallbackInfo<'_, P>);

/// Context handed to a weak callback.
pub struct WeakCallbackInfo<'a, P> {
    isolate: &'a mut Isolate,
    parameter: *mut P,
    pass: CallbackPass,
    second_pass: Option<WeakCallback<P>>,
}

impl<'a, P> WeakCallbackInfo<'a, P> {
    /// The parameter registered with `Global::set_weak`.
    pub fn parameter(&self) -> *mut P {
        self.parameter
    }

    pub fn pass(&self) -> CallbackPass {
        self.pass
    }

    pub fn is_first_pass(&self) -> bool {
        self.pass == CallbackPass::First
    }

    /// Request a second-pass invocation. Only honoured during the first pass.
    pub fn set_second_pass_callback(&mut self, callback: WeakCallback<P>) {
        if self.is_first_pass() {
            self.second_pass = Some(callback);
        } else {
            log::warn!("set_second_pass_callback called outside the first pass; ignored");
        }
    }

    pub fn isolate(&mut self) -> &mut Isolate {
        &mut *self.isolate
    }
}

/// Type-erased callback registration stored in the handle table.
pub(crate) trait PendingCallback {
    /// Invoke for `pass`. Returns `true` if the callback asked for a second pass.
    fn invoke(&mut self, isolate: &mut Isolate, pass: CallbackPass) -> bool;
}

pub(crate) struct TypedCallback<P> {
    parameter: *mut P,
    callback: WeakCallback<P>,
}

impl<P> TypedCallback<P> {
    pub fn new(parameter: *mut P, callback: WeakCallback<P>) -> Self {
        Self {
            parameter,
            callback,
        }
    }
}

impl<P> PendingCallback for TypedCallback<P> {
    fn invoke(&mut self, isolate: &mut Isolate, pass: CallbackPass) -> bool {
        let mut info = WeakCallbackInfo {
            isolate,
            parameter: self.parameter,
            pass,
            second_pass: None,
        };
        (self.callback)(&mut info);

        match info.second_pass {
            Some(next) => {
                self.callback = next;
                true
            }
            None => false,
        }
    }
}

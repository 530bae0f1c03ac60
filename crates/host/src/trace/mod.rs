//! Trace event collection.
//!
//! This module streams hardware events to application callbacks. It provides:
//! 1. **Events:** Decoded instruction-trace, network-rate, and software-trace samples.
//! 2. **Dispatch:** One callback slot per event class; the last registration wins.
//! 3. **Collector:** The background receive loop that drains the debug link while callbacks
//!    are registered on a connected session.
//!
//! Callbacks run on the collector thread and block further draining while they execute;
//! keeping them short is the caller's responsibility.
//! Events drained by a request while the collector is not running are dropped, never
//! delivered on the requesting thread.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Background receive loop.
pub mod collector;
/// Event types and payload decoding.
pub mod event;
/// Monitor configuration registers.
pub(crate) mod monitor;

pub use collector::CollectorState;
pub use event::{ItmEvent, NrmEvent, StmEvent, TraceEvent};

/// Callback receiving instruction-trace events.
pub type ItmCallback = Arc<dyn Fn(&ItmEvent) + Send + Sync>;
/// Callback receiving network-rate events.
pub type NrmCallback = Arc<dyn Fn(&NrmEvent) + Send + Sync>;
/// Callback receiving software-trace events.
pub type StmCallback = Arc<dyn Fn(&StmEvent) + Send + Sync>;

#[derive(Default)]
struct Slots {
    itm: Option<ItmCallback>,
    nrm: Option<NrmCallback>,
    stm: Option<StmCallback>,
}

/// Registered callbacks, one per event class.
#[derive(Default)]
pub(crate) struct Dispatcher {
    slots: RwLock<Slots>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots();
        f.debug_struct("Dispatcher")
            .field("itm", &slots.itm.is_some())
            .field("nrm", &slots.nrm.is_some())
            .field("stm", &slots.stm.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn set_itm(&self, callback: ItmCallback) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).itm = Some(callback);
    }

    pub(crate) fn set_nrm(&self, callback: NrmCallback) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).nrm = Some(callback);
    }

    pub(crate) fn set_stm(&self, callback: StmCallback) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).stm = Some(callback);
    }

    /// Returns `true` if any class has a callback.
    pub(crate) fn has_callbacks(&self) -> bool {
        let slots = self.slots();
        slots.itm.is_some() || slots.nrm.is_some() || slots.stm.is_some()
    }

    /// Hands `event` to its class callback; returns `false` if none is registered.
    ///
    /// The slot lock is released before the callback runs, so a callback may register
    /// callbacks itself.
    pub(crate) fn dispatch(&self, event: &TraceEvent) -> bool {
        match event {
            TraceEvent::Itm(e) => {
                let callback = self.slots().itm.clone();
                callback.map(|cb| cb(e)).is_some()
            }
            TraceEvent::Nrm(e) => {
                let callback = self.slots().nrm.clone();
                callback.map(|cb| cb(e)).is_some()
            }
            TraceEvent::Stm(e) => {
                let callback = self.slots().stm.clone();
                callback.map(|cb| cb(e)).is_some()
            }
        }
    }

    fn slots(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }
}

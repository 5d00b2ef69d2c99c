//! Port bindings owned by the engine.
//!
//! Each binding owns one or more host ports and the callbacks that forward port
//! activity to the current module:
//!
//! - [`ControlBinding`] - one parameter address, one value or trigger port
//! - [`VoiceChannel`] - the note event port, forwarding to the module's voice API
//! - [`AudioRoutingTable`] - one audio reference port per module audio input
//!
//! # Forwarding
//!
//! Callbacks hold a [`Weak`] reference to the module they were bound to. Once the
//! engine retires that module, or the binding is disposed, the callback does nothing.
//! Failures inside a callback are reported to the host's error surface and stop
//! there: one rejected write never affects another port.

mod audio;
mod control;
mod voice;

pub use audio::{AudioRoutingTable, AudioSlot, PendingSlots};
pub use control::ControlBinding;
pub use voice::{VoiceAssignment, VoiceChannel};

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::config::EngineConfig;
use crate::port::PortHost;
use crate::timer::Scheduler;

/// Everything a binding needs to create ports and forward events.
pub struct BindingContext<H: PortHost> {
    pub(crate) host: Rc<H>,
    pub(crate) scheduler: Rc<dyn Scheduler>,
    pub(crate) config: Rc<EngineConfig>,
    reported: Rc<Cell<u64>>,
}

impl<H: PortHost> Clone for BindingContext<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
            reported: self.reported.clone(),
        }
    }
}

impl<H: PortHost> BindingContext<H> {
    pub fn new(host: Rc<H>, scheduler: Rc<dyn Scheduler>, config: EngineConfig) -> Self {
        Self {
            host,
            scheduler,
            config: Rc::new(config),
            reported: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn errors(&self) -> ErrorSink<H> {
        ErrorSink {
            host: Rc::downgrade(&self.host),
            category: self.config.error_category.clone(),
            reported: self.reported.clone(),
        }
    }

    /// Number of errors reported through any sink of this context so far
    pub(crate) fn reported(&self) -> u64 {
        self.reported.get()
    }
}

/// Reports forwarding failures from inside callbacks.
///
/// Holds the host weakly: ports live inside the host, callbacks live inside ports.
pub(crate) struct ErrorSink<H> {
    host: Weak<H>,
    category: String,
    reported: Rc<Cell<u64>>,
}

impl<H> Clone for ErrorSink<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            category: self.category.clone(),
            reported: self.reported.clone(),
        }
    }
}

impl<H: PortHost> ErrorSink<H> {
    pub(crate) fn report(&self, message: &str) {
        warn!(category = %self.category, "{}", message);
        self.reported.set(self.reported.get() + 1);
        if let Some(host) = self.host.upgrade() {
            host.report_error(&self.category, Some(message));
        }
    }
}

/// Shared liveness flag between a binding and the callbacks it installed.
#[derive(Clone, Debug)]
pub(crate) struct Liveness(Rc<Cell<bool>>);

impl Liveness {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn kill(&self) {
        self.0.set(false);
    }
}

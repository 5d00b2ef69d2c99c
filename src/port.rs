//! Host port capability.
//!
//! The patching host owns the actual port objects and their UI. The engine
//! creates ports, attaches callbacks to them and removes them, nothing more.
//!
//! # Callback model
//!
//! Ports hold at most one change callback and one trigger callback. Installing a
//! new one replaces the previous, which is how bindings re-point existing ports at
//! a fresh module without recreating them (and losing the user's wiring).
//! Callbacks run on the host's event loop, never concurrently with each other.

use thiserror::Error;

use crate::module::{NoteEvent, SourceId};

/// A callback installed on a port. Invoked by the host on its event loop.
pub type Callback = Box<dyn FnMut()>;

/// Failure creating or removing a host port.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortError {
    #[error("cannot create port '{label}': {reason}")]
    Create { label: String, reason: String },

    #[error("cannot remove port '{label}': {reason}")]
    Remove { label: String, reason: String },
}

/// Current value held by a port.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum PortValue {
    /// Trigger ports carry no value
    #[default]
    Empty,
    Number(f32),
    /// Audio reference ports; `None` while nothing is linked
    Source(Option<SourceId>),
    /// Event ports; `None` until the first event arrives
    Note(Option<NoteEvent>),
}

impl PortValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            PortValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<SourceId> {
        match self {
            PortValue::Source(s) => *s,
            _ => None,
        }
    }

    pub fn as_note(&self) -> Option<NoteEvent> {
        match self {
            PortValue::Note(n) => *n,
            _ => None,
        }
    }
}

/// A single host port.
pub trait Port {
    fn label(&self) -> String;

    fn get(&self) -> PortValue;

    /// Replace the callback fired when the port's value changes
    fn on_change(&self, callback: Callback);

    /// Replace the callback fired when a trigger port fires
    fn on_triggered(&self, callback: Callback);

    /// Remove the port from the operator. The host drops its callbacks.
    fn remove(&self) -> Result<(), PortError>;
}

/// What the engine needs from the host.
pub trait PortHost: 'static {
    type Port: Port + 'static;

    /// Port for continuous values (sliders, number boxes)
    fn create_value_port(&self, label: &str) -> Result<Self::Port, PortError>;

    /// Port for discrete triggers (buttons, checkboxes)
    fn create_trigger_port(&self, label: &str) -> Result<Self::Port, PortError>;

    /// Port accepting a reference to an audio source
    fn create_audio_ref_port(&self, label: &str) -> Result<Self::Port, PortError>;

    /// Port accepting structured note events
    fn create_event_port(&self, label: &str) -> Result<Self::Port, PortError>;

    /// Set (`Some`) or clear (`None`) the error shown on the operator
    fn report_error(&self, category: &str, message: Option<&str>);
}

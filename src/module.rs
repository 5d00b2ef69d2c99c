//! The compiled-module capability.
//!
//! A [`DspModule`] is one runnable realization of the user's program, handed to us
//! by whatever compiler the host uses. We only ever talk to it through this trait.
//!
//! All methods take `&self`: a module handle is shared between the engine and the
//! forwarding callbacks of every port bound to it, and everything runs on a single
//! logical thread. Implementations use interior mutability where they need it.

use thiserror::Error;

use crate::descriptor::{ModuleOptions, ParameterDescriptor};

/// Errors reported by a module when it rejects a call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    /// Source text did not compile
    #[error("compilation failed: {0}")]
    Compile(String),

    /// No parameter exists at this address
    #[error("unknown parameter address: {0}")]
    UnknownAddress(String),

    /// The module refused a parameter write or voice event
    #[error("module rejected call: {0}")]
    Rejected(String),

    /// Audio input index out of range, or the source could not be attached
    #[error("cannot connect audio input {input}: {reason}")]
    Connect { input: usize, reason: String },

    /// Module was already torn down
    #[error("module has been disposed")]
    Disposed,
}

/// Opaque identity of an audio source owned by the host's audio graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SourceId(pub u64);

/// A note-like event delivered to the voice port.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct NoteEvent {
    pub channel: u8,
    /// Note number (MIDI note numbers, but fractional values are passed through)
    pub note: f32,
    pub velocity: Option<f32>,
}

impl NoteEvent {
    pub fn new(note: f32) -> Self {
        Self {
            channel: 0,
            note,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// The operations a compiled module offers.
pub trait DspModule: 'static {
    /// Parameter descriptors, in the order the module declares them
    fn descriptors(&self) -> Vec<ParameterDescriptor>;

    /// Number of audio inputs the module accepts
    fn num_audio_inputs(&self) -> usize;

    fn set_param_value(&self, address: &str, value: f32) -> Result<(), ModuleError>;

    fn param_value(&self, address: &str) -> Result<f32, ModuleError>;

    fn trigger_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError>;

    fn release_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError>;

    /// Attach `source` to audio input `input`. Re-connecting an already
    /// connected source must be harmless.
    fn connect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError>;

    fn disconnect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError>;

    /// Module-level options declared by the author (`[midi:on]`, `[nvoices:8]`)
    fn options(&self) -> ModuleOptions {
        ModuleOptions::default()
    }

    /// Best-effort teardown
    fn dispose(&self) -> Result<(), ModuleError>;
}

//! A module that talks to its processing side through a ring buffer.
//!
//! [`RingModule`] is the control half of a module whose DSP runs elsewhere (typically
//! the audio thread). Every write or voice event becomes a [`RingModuleMessage`] pushed
//! into a lock-free [`rtrb`] queue; the processing half drains the [`Consumer`] at the
//! start of each block. Parameter values are mirrored on the control side so reads
//! (needed by toggles and velocity lookups) never touch the audio thread.
//!
//! # Example
//!
//! ```
//! use wandel::{DspModule, ParameterDescriptor, RingModule, RingModuleMessage};
//!
//! let (module, mut rx) = RingModule::new(
//!     vec![ParameterDescriptor::new("/dsp/freq", "freq", "hslider")],
//!     0,
//!     64,
//! );
//! module.set_param_value("/dsp/freq", 220.0).unwrap();
//!
//! assert_eq!(rx.pop().ok(), Some(RingModuleMessage::SetParam { index: 0, value: 220.0 }));
//! assert_eq!(module.param_value("/dsp/freq").unwrap(), 220.0);
//! ```

use std::cell::{Cell, RefCell};

use hashbrown::HashMap;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::debug;

use crate::descriptor::{ModuleOptions, ParameterDescriptor};
use crate::module::{DspModule, ModuleError, SourceId};

/// Messages delivered to the processing half of a [`RingModule`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RingModuleMessage {
    /// Set the parameter at `index` (position in the descriptor list)
    SetParam { index: usize, value: f32 },
    NoteOn { channel: u8, note: f32, velocity: f32 },
    NoteOff { channel: u8, note: f32, velocity: f32 },
    Connect { input: usize, source: SourceId },
    Disconnect { input: usize, source: SourceId },
    /// Last message; the processing half should drop its state
    Shutdown,
}

/// Control half of a module whose processing runs on the other end of a ring buffer.
pub struct RingModule {
    descriptors: Vec<ParameterDescriptor>,
    index: HashMap<String, usize>,
    values: RefCell<Vec<f32>>,
    inputs: usize,
    options: ModuleOptions,
    sender: RefCell<Producer<RingModuleMessage>>,
    disposed: Cell<bool>,
}

impl RingModule {
    /// Create the module and the consumer its processing half should drain.
    pub fn new(
        descriptors: Vec<ParameterDescriptor>,
        inputs: usize,
        queue_size: usize,
    ) -> (Self, Consumer<RingModuleMessage>) {
        let (producer, consumer) = RingBuffer::new(queue_size.max(1));
        let index = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.address.clone(), i))
            .collect();
        let values = RefCell::new(vec![0.0; descriptors.len()]);

        let module = Self {
            descriptors,
            index,
            values,
            inputs,
            options: ModuleOptions::default(),
            sender: RefCell::new(producer),
            disposed: Cell::new(false),
        };
        (module, consumer)
    }

    /// Declare module-level options (`[midi:on][nvoices:8]`)
    pub fn with_options(mut self, options: &str) -> Self {
        self.options = ModuleOptions::parse(options);
        self
    }

    /// Seed a parameter's value without sending anything (e.g. the declared default)
    pub fn with_initial_value(self, address: &str, value: f32) -> Self {
        if let Some(&i) = self.index.get(address) {
            self.values.borrow_mut()[i] = value;
        }
        self
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn send(&self, msg: RingModuleMessage) -> Result<(), ModuleError> {
        if self.disposed.get() {
            return Err(ModuleError::Disposed);
        }
        self.sender
            .borrow_mut()
            .push(msg)
            .map_err(|rtrb::PushError::Full(msg)| ModuleError::Rejected(format!("message queue full, dropped {:?}", msg)))
    }

    fn lookup(&self, address: &str) -> Result<usize, ModuleError> {
        self.index
            .get(address)
            .copied()
            .ok_or_else(|| ModuleError::UnknownAddress(address.to_string()))
    }

    fn check_input(&self, input: usize) -> Result<(), ModuleError> {
        if input < self.inputs {
            Ok(())
        } else {
            Err(ModuleError::Connect {
                input,
                reason: format!("module has {} audio inputs", self.inputs),
            })
        }
    }
}

impl DspModule for RingModule {
    fn descriptors(&self) -> Vec<ParameterDescriptor> {
        self.descriptors.clone()
    }

    fn num_audio_inputs(&self) -> usize {
        self.inputs
    }

    fn set_param_value(&self, address: &str, value: f32) -> Result<(), ModuleError> {
        let index = self.lookup(address)?;
        self.send(RingModuleMessage::SetParam { index, value })?;
        self.values.borrow_mut()[index] = value;
        Ok(())
    }

    fn param_value(&self, address: &str) -> Result<f32, ModuleError> {
        let index = self.lookup(address)?;
        Ok(self.values.borrow()[index])
    }

    fn trigger_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError> {
        self.send(RingModuleMessage::NoteOn { channel, note, velocity })
    }

    fn release_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError> {
        self.send(RingModuleMessage::NoteOff { channel, note, velocity })
    }

    fn connect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError> {
        self.check_input(input)?;
        self.send(RingModuleMessage::Connect { input, source })
    }

    fn disconnect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError> {
        self.check_input(input)?;
        self.send(RingModuleMessage::Disconnect { input, source })
    }

    fn options(&self) -> ModuleOptions {
        self.options.clone()
    }

    fn dispose(&self) -> Result<(), ModuleError> {
        self.send(RingModuleMessage::Shutdown)?;
        self.disposed.set(true);
        debug!(params = self.descriptors.len(), "ring module disposed");
        Ok(())
    }
}

//! Note events into the module's voice API.

use std::rc::{Rc, Weak};

use tracing::debug;

use crate::bindings::{BindingContext, ErrorSink, Liveness};
use crate::descriptor::{ParameterDescriptor, VoiceRole};
use crate::module::{DspModule, NoteEvent};
use crate::port::{Port, PortError, PortHost};

/// Which addresses play which role in note dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceAssignment {
    pub frequency: Option<String>,
    pub gate: Option<String>,
    pub velocity: Option<String>,
}

impl VoiceAssignment {
    /// First descriptor per role wins
    pub fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = (&'a ParameterDescriptor, Option<VoiceRole>)>,
    ) -> Self {
        let mut assignment = Self::default();
        for (descriptor, role) in descriptors {
            let slot = match role {
                Some(VoiceRole::Frequency) => &mut assignment.frequency,
                Some(VoiceRole::Gate) => &mut assignment.gate,
                Some(VoiceRole::Velocity) => &mut assignment.velocity,
                None => continue,
            };
            if slot.is_none() {
                *slot = Some(descriptor.address.clone());
            }
        }
        assignment
    }

    /// Reserved names missing for polyphonic dispatch
    pub fn missing_for_polyphony(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.frequency.is_none() {
            missing.push("freq");
        }
        if self.gate.is_none() {
            missing.push("gate");
        }
        missing
    }
}

/// The single note event port of an operator.
///
/// Each event triggers a voice immediately and releases it one pulse width later.
pub struct VoiceChannel<H: PortHost> {
    port: Rc<H::Port>,
    assignment: VoiceAssignment,
    ctx: BindingContext<H>,
    live: Liveness,
}

impl<H: PortHost> VoiceChannel<H> {
    pub fn new(ctx: &BindingContext<H>) -> Result<Self, PortError> {
        let port = ctx.host.create_event_port(&ctx.config.voice_port_label)?;
        debug!("created voice port");

        Ok(Self {
            port: Rc::new(port),
            assignment: VoiceAssignment::default(),
            ctx: ctx.clone(),
            live: Liveness::new(),
        })
    }

    pub fn assignment(&self) -> &VoiceAssignment {
        &self.assignment
    }

    pub fn label(&self) -> String {
        self.port.label()
    }

    /// Route future events to `module`, using `assignment` to find the velocity parameter.
    pub fn rebind<M: DspModule>(&mut self, module: &Rc<M>, assignment: VoiceAssignment) {
        if !self.live.is_live() {
            return;
        }
        self.assignment = assignment;

        let dispatch = Dispatch {
            module: Rc::downgrade(module),
            velocity_address: self.assignment.velocity.clone(),
            default_velocity: self.ctx.config.default_velocity,
            errors: self.ctx.errors(),
            live: self.live.clone(),
        };
        let port = Rc::downgrade(&self.port);
        let scheduler = self.ctx.scheduler.clone();
        let width = self.ctx.config.pulse_width;

        self.port.on_change(Box::new(move || {
            let Some(event) = port.upgrade().and_then(|p| p.get().as_note()) else {
                return;
            };
            let Some(velocity) = dispatch.trigger(&event) else {
                return;
            };
            let release = dispatch.clone();
            scheduler.schedule(width, Box::new(move || release.release(&event, velocity)));
        }));
    }

    pub fn dispose(&self) -> Result<(), PortError> {
        if !self.live.is_live() {
            return Ok(());
        }
        self.live.kill();
        debug!("removing voice port");
        self.port.remove()
    }
}

struct Dispatch<M, H> {
    module: Weak<M>,
    velocity_address: Option<String>,
    default_velocity: f32,
    errors: ErrorSink<H>,
    live: Liveness,
}

impl<M, H> Clone for Dispatch<M, H> {
    fn clone(&self) -> Self {
        Self {
            module: self.module.clone(),
            velocity_address: self.velocity_address.clone(),
            default_velocity: self.default_velocity,
            errors: self.errors.clone(),
            live: self.live.clone(),
        }
    }
}

impl<M: DspModule, H: PortHost> Dispatch<M, H> {
    fn target(&self) -> Option<Rc<M>> {
        if !self.live.is_live() {
            return None;
        }
        self.module.upgrade()
    }

    /// Event velocity, then the module's velocity parameter, then the default
    fn velocity(&self, module: &M, event: &NoteEvent) -> f32 {
        if let Some(v) = event.velocity.filter(|v| *v != 0.0) {
            return v;
        }
        self.velocity_address
            .as_deref()
            .and_then(|address| module.param_value(address).ok())
            .filter(|v| *v != 0.0)
            .unwrap_or(self.default_velocity)
    }

    /// Returns the velocity used if the voice was triggered
    fn trigger(&self, event: &NoteEvent) -> Option<f32> {
        let module = self.target()?;
        let velocity = self.velocity(&module, event);
        match module.trigger_voice(event.channel, event.note, velocity) {
            Ok(()) => Some(velocity),
            Err(err) => {
                self.errors.report(&format!("cannot trigger note {}: {}", event.note, err));
                None
            }
        }
    }

    fn release(&self, event: &NoteEvent, velocity: f32) {
        // only the triggered module; once retired, its dispose already silenced the voice
        let Some(module) = self.module.upgrade() else {
            return;
        };
        if let Err(err) = module.release_voice(event.channel, event.note, velocity) {
            self.errors.report(&format!("cannot release note {}: {}", event.note, err));
        }
    }
}

//! One parameter, one port.

use std::rc::{Rc, Weak};

use delegate::delegate;
use tracing::debug;

use crate::bindings::{BindingContext, ErrorSink, Liveness};
use crate::descriptor::{ControlShape, ParameterDescriptor};
use crate::module::DspModule;
use crate::port::{Port, PortError, PortHost, PortValue};

/// Pairs a parameter address with the host port that controls it.
///
/// The port is created once and survives module swaps: [`rebind`](Self::rebind)
/// only replaces the forwarding callback, so any wiring the user made to the port
/// stays intact.
///
/// | Shape        | Port    | On activity                                          |
/// |--------------|---------|------------------------------------------------------|
/// | `Continuous` | value   | write the port value                                 |
/// | `Momentary`  | trigger | write 1, then 0 after the pulse width                |
/// | `Toggle`     | trigger | read the module's value, write its complement        |
pub struct ControlBinding<H: PortHost> {
    address: String,
    shape: ControlShape,
    port: Rc<H::Port>,
    ctx: BindingContext<H>,
    live: Liveness,
}

impl<H: PortHost> ControlBinding<H> {
    /// Create the port for `descriptor`. The port does nothing until [`rebind`](Self::rebind).
    pub fn new(descriptor: &ParameterDescriptor, ctx: &BindingContext<H>) -> Result<Self, PortError> {
        let port = if descriptor.shape.is_discrete() {
            ctx.host.create_trigger_port(&descriptor.label)?
        } else {
            ctx.host.create_value_port(&descriptor.label)?
        };
        debug!(address = %descriptor.address, shape = ?descriptor.shape, "created control port");

        Ok(Self {
            address: descriptor.address.clone(),
            shape: descriptor.shape,
            port: Rc::new(port),
            ctx: ctx.clone(),
            live: Liveness::new(),
        })
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[inline]
    pub fn shape(&self) -> ControlShape {
        self.shape
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        !self.live.is_live()
    }

    delegate! {
        to self.port {
            /// Label of the underlying port
            pub fn label(&self) -> String;
            /// Current port value
            pub fn get(&self) -> PortValue;
        }
    }

    /// `true` if this binding can be reused for `descriptor` as-is
    pub fn matches(&self, descriptor: &ParameterDescriptor) -> bool {
        self.address == descriptor.address && self.shape == descriptor.shape
    }

    /// Point future port activity at `module`.
    pub fn rebind<M: DspModule>(&self, module: &Rc<M>) {
        if self.is_disposed() {
            return;
        }

        let target = Rc::downgrade(module);
        let forward = Forward {
            address: self.address.clone(),
            module: target,
            errors: self.ctx.errors(),
            live: self.live.clone(),
        };

        match self.shape {
            ControlShape::Continuous => {
                let port = Rc::downgrade(&self.port);
                self.port.on_change(Box::new(move || {
                    let Some(value) = port.upgrade().and_then(|p| p.get().as_number()) else {
                        return;
                    };
                    forward.set(value);
                }));
            }
            ControlShape::Momentary => {
                let scheduler = self.ctx.scheduler.clone();
                let width = self.ctx.config.pulse_width;
                self.port.on_triggered(Box::new(move || {
                    if !forward.set(1.0) {
                        return;
                    }
                    let release = forward.clone();
                    scheduler.schedule(
                        width,
                        Box::new(move || {
                            release.set(0.0);
                        }),
                    );
                }));
            }
            ControlShape::Toggle => {
                self.port.on_triggered(Box::new(move || forward.toggle()));
            }
        }
    }

    /// Remove the port. Calling this more than once does nothing.
    pub fn dispose(&self) -> Result<(), PortError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.live.kill();
        debug!(address = %self.address, "removing control port");
        self.port.remove()
    }
}

/// State captured by a control callback.
struct Forward<M, H> {
    address: String,
    module: Weak<M>,
    errors: ErrorSink<H>,
    live: Liveness,
}

impl<M, H> Clone for Forward<M, H> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            module: self.module.clone(),
            errors: self.errors.clone(),
            live: self.live.clone(),
        }
    }
}

impl<M: DspModule, H: PortHost> Forward<M, H> {
    fn target(&self) -> Option<Rc<M>> {
        if !self.live.is_live() {
            return None;
        }
        self.module.upgrade()
    }

    /// Returns `true` if the write reached a module and was accepted
    fn set(&self, value: f32) -> bool {
        let Some(module) = self.target() else {
            return false;
        };
        match module.set_param_value(&self.address, value) {
            Ok(()) => true,
            Err(err) => {
                self.errors.report(&format!("cannot set '{}': {}", self.address, err));
                false
            }
        }
    }

    fn toggle(&self) {
        let Some(module) = self.target() else {
            return;
        };
        let current = match module.param_value(&self.address) {
            Ok(value) => value,
            Err(err) => {
                self.errors.report(&format!("cannot read '{}': {}", self.address, err));
                return;
            }
        };
        let next = if current != 0.0 { 0.0 } else { 1.0 };
        if let Err(err) = module.set_param_value(&self.address, next) {
            self.errors.report(&format!("cannot set '{}': {}", self.address, err));
        }
    }
}

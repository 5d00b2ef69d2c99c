//! Audio input slots.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use delegate::delegate;
use tracing::{debug, warn};

use crate::bindings::{BindingContext, ErrorSink, Liveness};
use crate::module::{DspModule, SourceId};
use crate::port::{Port, PortError, PortHost, PortValue};

/// One audio input of the module: an audio reference port plus whatever
/// source is currently attached through it.
pub struct AudioSlot<H: PortHost> {
    index: usize,
    port: Rc<H::Port>,
    connected: Rc<Cell<Option<SourceId>>>,
    live: Liveness,
}

impl<H: PortHost> AudioSlot<H> {
    fn new(index: usize, ctx: &BindingContext<H>) -> Result<Self, PortError> {
        let port = ctx.host.create_audio_ref_port(&ctx.config.audio_port_label(index))?;
        debug!(index, "created audio input port");

        Ok(Self {
            index,
            port: Rc::new(port),
            connected: Rc::new(Cell::new(None)),
            live: Liveness::new(),
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Source currently attached to the module through this slot
    #[inline]
    pub fn connected(&self) -> Option<SourceId> {
        self.connected.get()
    }

    delegate! {
        to self.port {
            pub fn label(&self) -> String;
            pub fn get(&self) -> PortValue;
        }
    }

    /// Route port changes to `module`, and re-attach the current source to it.
    fn rebind<M: DspModule>(&self, module: &Rc<M>, errors: &ErrorSink<H>) {
        let router = Router {
            index: self.index,
            module: Rc::downgrade(module),
            connected: self.connected.clone(),
            errors: errors.clone(),
            live: self.live.clone(),
        };
        let port = Rc::downgrade(&self.port);
        self.port.on_change(Box::new(move || {
            let Some(port) = port.upgrade() else {
                return;
            };
            router.route(port.get().as_source());
        }));

        if let Some(source) = self.connected.get() {
            if let Err(err) = module.connect_input(self.index, source) {
                self.connected.set(None);
                errors.report(&format!("cannot reconnect audio input {}: {}", self.index, err));
            }
        }
    }

    fn dispose(&self) -> Result<(), PortError> {
        if !self.live.is_live() {
            return Ok(());
        }
        self.live.kill();
        debug!(index = self.index, "removing audio input port");
        self.port.remove()
    }
}

struct Router<M, H> {
    index: usize,
    module: Weak<M>,
    connected: Rc<Cell<Option<SourceId>>>,
    errors: ErrorSink<H>,
    live: Liveness,
}

impl<M: DspModule, H: PortHost> Router<M, H> {
    fn route(&self, next: Option<SourceId>) {
        if !self.live.is_live() {
            return;
        }
        let Some(module) = self.module.upgrade() else {
            return;
        };

        if let Some(previous) = self.connected.get().filter(|p| Some(*p) != next) {
            if let Err(err) = module.disconnect_input(self.index, previous) {
                warn!(index = self.index, "disconnect failed: {}", err);
            }
            self.connected.set(None);
        }

        let Some(source) = next else {
            return;
        };
        match module.connect_input(self.index, source) {
            Ok(()) => self.connected.set(Some(source)),
            Err(err) => {
                self.connected.set(None);
                self.errors.report(&format!("cannot attach audio input {}: {}", self.index, err));
            }
        }
    }
}

/// Ports created ahead of a resize, not yet part of the table.
pub struct PendingSlots<H: PortHost> {
    slots: Vec<AudioSlot<H>>,
}

impl<H: PortHost> PendingSlots<H> {
    pub(crate) fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Throw the prepared ports away
    pub fn discard(self) {
        for slot in self.slots {
            if let Err(err) = slot.dispose() {
                warn!(index = slot.index, "cannot remove pending audio port: {}", err);
            }
        }
    }
}

/// The audio input slots of one operator, kept in step with the module's input count.
pub struct AudioRoutingTable<H: PortHost> {
    slots: Vec<AudioSlot<H>>,
    ctx: BindingContext<H>,
}

impl<H: PortHost> AudioRoutingTable<H> {
    pub fn new(ctx: &BindingContext<H>) -> Self {
        Self {
            slots: Vec::new(),
            ctx: ctx.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&AudioSlot<H>> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> impl Iterator<Item = &AudioSlot<H>> {
        self.slots.iter()
    }

    /// Create the ports a resize to `count` will need. Fails without side effects.
    pub fn prepare(&self, count: usize) -> Result<PendingSlots<H>, PortError> {
        let mut slots = Vec::new();
        for index in self.slots.len()..count {
            match AudioSlot::new(index, &self.ctx) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    PendingSlots { slots }.discard();
                    return Err(err);
                }
            }
        }
        Ok(PendingSlots { slots })
    }

    /// Shrink or grow to `count` slots and bind all of them to `module`.
    ///
    /// `pending` must come from [`prepare`](Self::prepare) with the same count.
    pub fn commit<M: DspModule>(&mut self, count: usize, pending: PendingSlots<H>, module: &Rc<M>) {
        let errors = self.ctx.errors();

        while self.slots.len() > count {
            if let Some(slot) = self.slots.pop() {
                if let Err(err) = slot.dispose() {
                    errors.report(&format!("cannot remove audio input {}: {}", slot.index, err));
                }
            }
        }
        self.slots.extend(pending.slots);

        for slot in &self.slots {
            slot.rebind(module, &errors);
        }
    }

    /// [`prepare`](Self::prepare) followed by [`commit`](Self::commit).
    pub fn resize<M: DspModule>(&mut self, count: usize, module: &Rc<M>) -> Result<(), PortError> {
        let pending = self.prepare(count)?;
        self.commit(count, pending, module);
        Ok(())
    }

    /// Remove every slot's port
    pub fn dispose(&mut self) {
        let errors = self.ctx.errors();
        for slot in self.slots.drain(..) {
            if let Err(err) = slot.dispose() {
                errors.report(&format!("cannot remove audio input {}: {}", slot.index, err));
            }
        }
    }
}

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wandel::{Callback, Port, PortError, PortHost, PortValue};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Slot {
    label: String,
    value: Cell<PortValue>,
    on_change: RefCell<Option<Callback>>,
    on_triggered: RefCell<Option<Callback>>,
    removed: Cell<bool>,
}

#[derive(Clone)]
pub struct PatchPort(Rc<Slot>);

impl PatchPort {
    pub fn set(&self, value: PortValue) {
        self.0.value.set(value);
        fire(&self.0.on_change);
    }

    pub fn trigger(&self) {
        fire(&self.0.on_triggered);
    }

    pub fn is_removed(&self) -> bool {
        self.0.removed.get()
    }

    pub fn same_as(&self, other: &PatchPort) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn fire(slot: &RefCell<Option<Callback>>) {
    let taken = slot.borrow_mut().take();
    if let Some(mut callback) = taken {
        callback();
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

impl Port for PatchPort {
    fn label(&self) -> String {
        self.0.label.clone()
    }

    fn get(&self) -> PortValue {
        self.0.value.get()
    }

    fn on_change(&self, callback: Callback) {
        *self.0.on_change.borrow_mut() = Some(callback);
    }

    fn on_triggered(&self, callback: Callback) {
        *self.0.on_triggered.borrow_mut() = Some(callback);
    }

    fn remove(&self) -> Result<(), PortError> {
        self.0.removed.set(true);
        *self.0.on_change.borrow_mut() = None;
        *self.0.on_triggered.borrow_mut() = None;
        Ok(())
    }
}

#[derive(Default)]
struct Patch {
    ports: Vec<PatchPort>,
    surface: Option<String>,
}

/// A patch operator as seen by the engine: a list of ports and an error badge.
#[derive(Clone, Default)]
pub struct PatchHost(Rc<RefCell<Patch>>);

impl PatchHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self, label: &str) -> PatchPort {
        self.0
            .borrow()
            .ports
            .iter()
            .rev()
            .find(|p| p.0.label == label && !p.is_removed())
            .cloned()
            .unwrap_or_else(|| panic!("no live port labelled {label}"))
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .0
            .borrow()
            .ports
            .iter()
            .filter(|p| !p.is_removed())
            .map(|p| p.label())
            .collect();
        labels.sort();
        labels
    }

    pub fn surface(&self) -> Option<String> {
        self.0.borrow().surface.clone()
    }

    fn create(&self, label: &str, value: PortValue) -> Result<PatchPort, PortError> {
        let port = PatchPort(Rc::new(Slot {
            label: label.to_string(),
            value: Cell::new(value),
            on_change: RefCell::new(None),
            on_triggered: RefCell::new(None),
            removed: Cell::new(false),
        }));
        self.0.borrow_mut().ports.push(port.clone());
        Ok(port)
    }
}

impl PortHost for PatchHost {
    type Port = PatchPort;

    fn create_value_port(&self, label: &str) -> Result<PatchPort, PortError> {
        self.create(label, PortValue::Number(0.0))
    }

    fn create_trigger_port(&self, label: &str) -> Result<PatchPort, PortError> {
        self.create(label, PortValue::Empty)
    }

    fn create_audio_ref_port(&self, label: &str) -> Result<PatchPort, PortError> {
        self.create(label, PortValue::Source(None))
    }

    fn create_event_port(&self, label: &str) -> Result<PatchPort, PortError> {
        self.create(label, PortValue::Note(None))
    }

    fn report_error(&self, _category: &str, message: Option<&str>) {
        self.0.borrow_mut().surface = message.map(str::to_string);
    }
}

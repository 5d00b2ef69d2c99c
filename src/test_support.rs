//! Recording test doubles for the host and module capabilities.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hashbrown::HashMap;

use crate::bindings::BindingContext;
use crate::config::EngineConfig;
use crate::descriptor::{ModuleOptions, ParameterDescriptor};
use crate::module::{DspModule, ModuleError, SourceId};
use crate::port::{Callback, Port, PortError, PortHost, PortValue};
use crate::timer::ManualScheduler;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub(crate) fn context(host: &MockHost, scheduler: &ManualScheduler) -> BindingContext<MockHost> {
    init_tracing();
    BindingContext::new(Rc::new(host.clone()), Rc::new(scheduler.clone()), EngineConfig::default())
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PortKind {
    Value,
    Trigger,
    AudioRef,
    Event,
}

pub(crate) struct PortState {
    id: usize,
    label: String,
    kind: PortKind,
    value: Cell<PortValue>,
    on_change: RefCell<Option<Callback>>,
    on_triggered: RefCell<Option<Callback>>,
    removed: Cell<bool>,
}

#[derive(Clone)]
pub(crate) struct MockPort(Rc<PortState>);

impl MockPort {
    pub(crate) fn id(&self) -> usize {
        self.0.id
    }

    pub(crate) fn kind(&self) -> PortKind {
        self.0.kind
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.0.removed.get()
    }

    /// Change the value and fire the change callback, like a user edit
    pub(crate) fn set(&self, value: PortValue) {
        self.0.value.set(value);
        fire(&self.0.on_change);
    }

    pub(crate) fn trigger(&self) {
        fire(&self.0.on_triggered);
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

impl Port for MockPort {
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
        // the real host keeps stale closures around; so do we
        Ok(())
    }
}

#[derive(Default)]
struct HostState {
    ports: Vec<MockPort>,
    errors: Vec<Option<String>>,
    creates_left: Option<usize>,
}

#[derive(Clone, Default)]
pub(crate) struct MockHost(Rc<RefCell<HostState>>);

impl MockHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Most recently created port with this label
    pub(crate) fn port(&self, label: &str) -> MockPort {
        self.0
            .borrow()
            .ports
            .iter()
            .rev()
            .find(|p| p.0.label == label)
            .cloned()
            .unwrap_or_else(|| panic!("no port labelled {label}"))
    }

    pub(crate) fn has_live_port(&self, label: &str) -> bool {
        self.0.borrow().ports.iter().any(|p| p.0.label == label && !p.is_removed())
    }

    /// Labels and ids of ports still attached, sorted by id
    pub(crate) fn snapshot(&self) -> Vec<(usize, String)> {
        self.0
            .borrow()
            .ports
            .iter()
            .filter(|p| !p.is_removed())
            .map(|p| (p.id(), p.label()))
            .collect()
    }

    pub(crate) fn created(&self) -> usize {
        self.0.borrow().ports.len()
    }

    pub(crate) fn removed(&self) -> usize {
        self.0.borrow().ports.iter().filter(|p| p.is_removed()).count()
    }

    pub(crate) fn live_ports(&self) -> usize {
        self.created() - self.removed()
    }

    /// Reported (non-cleared) error messages
    pub(crate) fn errors(&self) -> Vec<String> {
        self.0.borrow().errors.iter().flatten().cloned().collect()
    }

    /// Last report, `None` when the surface was cleared
    pub(crate) fn last_report(&self) -> Option<Option<String>> {
        self.0.borrow().errors.last().cloned()
    }

    /// Let `n` more ports be created, then fail
    pub(crate) fn fail_creates_after(&self, n: usize) {
        self.0.borrow_mut().creates_left = Some(n);
    }

    fn create(&self, label: &str, kind: PortKind, value: PortValue) -> Result<MockPort, PortError> {
        let mut state = self.0.borrow_mut();
        if let Some(left) = state.creates_left.as_mut() {
            if *left == 0 {
                return Err(PortError::Create {
                    label: label.to_string(),
                    reason: "host refused".to_string(),
                });
            }
            *left -= 1;
        }

        let port = MockPort(Rc::new(PortState {
            id: state.ports.len(),
            label: label.to_string(),
            kind,
            value: Cell::new(value),
            on_change: RefCell::new(None),
            on_triggered: RefCell::new(None),
            removed: Cell::new(false),
        }));
        state.ports.push(port.clone());
        Ok(port)
    }
}

impl PortHost for MockHost {
    type Port = MockPort;

    fn create_value_port(&self, label: &str) -> Result<MockPort, PortError> {
        self.create(label, PortKind::Value, PortValue::Number(0.0))
    }

    fn create_trigger_port(&self, label: &str) -> Result<MockPort, PortError> {
        self.create(label, PortKind::Trigger, PortValue::Empty)
    }

    fn create_audio_ref_port(&self, label: &str) -> Result<MockPort, PortError> {
        self.create(label, PortKind::AudioRef, PortValue::Source(None))
    }

    fn create_event_port(&self, label: &str) -> Result<MockPort, PortError> {
        self.create(label, PortKind::Event, PortValue::Note(None))
    }

    fn report_error(&self, _category: &str, message: Option<&str>) {
        self.0.borrow_mut().errors.push(message.map(str::to_string));
    }
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) enum Call {
    Set(String, f32),
    Trigger(u8, f32, f32),
    Release(u8, f32, f32),
    Connect(usize, SourceId),
    Disconnect(usize, SourceId),
    Dispose,
}

#[derive(Default)]
struct ModuleState {
    descriptors: Vec<ParameterDescriptor>,
    inputs: usize,
    options: String,
    values: HashMap<String, f32>,
    calls: Vec<Call>,
    reject_writes: bool,
    reject_connects: bool,
}

/// Clones share state, so a test can keep one and hand the other to the engine.
#[derive(Clone, Default)]
pub(crate) struct MockModule(Rc<RefCell<ModuleState>>);

impl MockModule {
    pub(crate) fn new(descriptors: Vec<ParameterDescriptor>) -> Self {
        let module = Self::default();
        module.0.borrow_mut().descriptors = descriptors;
        module
    }

    pub(crate) fn with_inputs(self, inputs: usize) -> Self {
        self.0.borrow_mut().inputs = inputs;
        self
    }

    pub(crate) fn with_options(self, options: &str) -> Self {
        self.0.borrow_mut().options = options.to_string();
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| matches!(c, Call::Set(..))).collect()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.0.borrow().calls.contains(&Call::Dispose)
    }

    /// Set a value without recording a call
    pub(crate) fn set_value(&self, address: &str, value: f32) {
        self.0.borrow_mut().values.insert(address.to_string(), value);
    }

    pub(crate) fn reject_writes(&self, reject: bool) {
        self.0.borrow_mut().reject_writes = reject;
    }

    pub(crate) fn reject_connects(&self, reject: bool) {
        self.0.borrow_mut().reject_connects = reject;
    }
}

impl DspModule for MockModule {
    fn descriptors(&self) -> Vec<ParameterDescriptor> {
        self.0.borrow().descriptors.clone()
    }

    fn num_audio_inputs(&self) -> usize {
        self.0.borrow().inputs
    }

    fn set_param_value(&self, address: &str, value: f32) -> Result<(), ModuleError> {
        let mut state = self.0.borrow_mut();
        if state.reject_writes {
            return Err(ModuleError::Rejected(address.to_string()));
        }
        state.values.insert(address.to_string(), value);
        state.calls.push(Call::Set(address.to_string(), value));
        Ok(())
    }

    fn param_value(&self, address: &str) -> Result<f32, ModuleError> {
        Ok(self.0.borrow().values.get(address).copied().unwrap_or(0.0))
    }

    fn trigger_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError> {
        self.0.borrow_mut().calls.push(Call::Trigger(channel, note, velocity));
        Ok(())
    }

    fn release_voice(&self, channel: u8, note: f32, velocity: f32) -> Result<(), ModuleError> {
        self.0.borrow_mut().calls.push(Call::Release(channel, note, velocity));
        Ok(())
    }

    fn connect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError> {
        let mut state = self.0.borrow_mut();
        if state.reject_connects {
            return Err(ModuleError::Connect {
                input,
                reason: "not an audio node".to_string(),
            });
        }
        state.calls.push(Call::Connect(input, source));
        Ok(())
    }

    fn disconnect_input(&self, input: usize, source: SourceId) -> Result<(), ModuleError> {
        self.0.borrow_mut().calls.push(Call::Disconnect(input, source));
        Ok(())
    }

    fn options(&self) -> ModuleOptions {
        ModuleOptions::parse(&self.0.borrow().options)
    }

    fn dispose(&self) -> Result<(), ModuleError> {
        self.0.borrow_mut().calls.push(Call::Dispose);
        Ok(())
    }
}

//! The reconciliation engine.
//!
//! A [`Reconciler`] owns every port of one operator: the address → [`ControlBinding`]
//! map, the optional [`VoiceChannel`] and the [`AudioRoutingTable`]. Each time a new
//! module instance is ready, [`Reconciler::update`] migrates those ports onto it.
//!
//! # Update phases
//!
//! 1. **Classify & validate** - read descriptors, partition voice-controlled from plain
//!    parameters, check polyphonic requirements. Pure; a failure here changes nothing.
//! 2. **Prepare** - create every port the new module needs that does not exist yet.
//!    If the host refuses one, the ports created so far are removed again and the
//!    previous module stays current with all of its bindings intact.
//! 3. **Commit** - rebind survivors, install new bindings, remove stale ones, resize the
//!    audio table, retire the previous module. Nothing in this phase can fail the update.

use std::rc::Rc;

use hashbrown::HashMap;
use itertools::{Either, Itertools};
use tracing::{debug, info, warn};

use crate::bindings::{
    AudioRoutingTable, BindingContext, ControlBinding, PendingSlots, VoiceAssignment, VoiceChannel,
};
use crate::config::EngineConfig;
use crate::descriptor::{classify, ModuleOptions, ParameterDescriptor, VoiceMode, VoiceRole};
use crate::error::{ReconcileError, Result};
use crate::module::DspModule;
use crate::port::{PortError, PortHost};
use crate::timer::Scheduler;

/// Voice settings a reconciliation runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoiceContext {
    pub mode: VoiceMode,
    /// Requested voice count; only meaningful when polyphonic
    pub voices: usize,
}

impl Default for VoiceContext {
    fn default() -> Self {
        Self::monophonic()
    }
}

impl VoiceContext {
    pub fn monophonic() -> Self {
        Self {
            mode: VoiceMode::Monophonic,
            voices: 1,
        }
    }

    pub fn polyphonic(voices: usize) -> Self {
        Self {
            mode: VoiceMode::Polyphonic,
            voices: voices.max(1),
        }
    }
}

/// Result of the classify & validate phase.
struct Plan {
    plain: Vec<ParameterDescriptor>,
    assignment: VoiceAssignment,
    wants_voice: bool,
    inputs: usize,
    options: ModuleOptions,
}

/// Ports created during the prepare phase.
struct Prepared<H: PortHost> {
    bindings: Vec<ControlBinding<H>>,
    voice: Option<VoiceChannel<H>>,
    audio: PendingSlots<H>,
}

impl<H: PortHost> Prepared<H> {
    fn discard(self) {
        for binding in self.bindings {
            if let Err(err) = binding.dispose() {
                warn!(address = binding.address(), "cannot remove prepared port: {}", err);
            }
        }
        if let Some(voice) = self.voice {
            if let Err(err) = voice.dispose() {
                warn!("cannot remove prepared voice port: {}", err);
            }
        }
        self.audio.discard();
    }
}

/// Keeps one operator's ports in step with its current module instance.
pub struct Reconciler<H: PortHost, M: DspModule> {
    ctx: BindingContext<H>,
    controls: HashMap<String, ControlBinding<H>>,
    voice: Option<VoiceChannel<H>>,
    audio: AudioRoutingTable<H>,
    current: Option<Rc<M>>,
    options: ModuleOptions,
}

impl<H: PortHost, M: DspModule> Reconciler<H, M> {
    pub fn new(host: Rc<H>, scheduler: Rc<dyn Scheduler>, config: EngineConfig) -> Self {
        let ctx = BindingContext::new(host, scheduler, config);
        Self {
            audio: AudioRoutingTable::new(&ctx),
            ctx,
            controls: HashMap::new(),
            voice: None,
            current: None,
            options: ModuleOptions::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    /// The module all bindings currently forward to
    pub fn current(&self) -> Option<&Rc<M>> {
        self.current.as_ref()
    }

    /// Options declared by the current module
    pub fn options(&self) -> &ModuleOptions {
        &self.options
    }

    pub fn binding(&self, address: &str) -> Option<&ControlBinding<H>> {
        self.controls.get(address)
    }

    /// Plain control bindings, in no particular order
    pub fn bindings(&self) -> impl Iterator<Item = &ControlBinding<H>> {
        self.controls.values()
    }

    pub fn voice_channel(&self) -> Option<&VoiceChannel<H>> {
        self.voice.as_ref()
    }

    pub fn voice_assignment(&self) -> Option<&VoiceAssignment> {
        self.voice.as_ref().map(|v| v.assignment())
    }

    pub fn audio(&self) -> &AudioRoutingTable<H> {
        &self.audio
    }

    /// Migrate every port onto `module`.
    ///
    /// On success `module` becomes current and the previous module is disposed.
    /// On failure nothing changes, the previous module stays current, and `module`
    /// is disposed. Either way the outcome is reported to the host's error surface;
    /// the surface is only cleared if applying the update reported nothing.
    ///
    /// Passing the instance that is already current never disposes it.
    pub fn update(&mut self, module: Rc<M>, context: &VoiceContext) -> Result<()> {
        let reported = self.ctx.reported();
        let result = self.try_update(&module, context);
        let is_current = self.current.as_ref().is_some_and(|c| Rc::ptr_eq(c, &module));

        match &result {
            Ok(()) => {
                if self.ctx.reported() == reported {
                    self.ctx.host.report_error(&self.ctx.config.error_category, None);
                }
                let previous = self.current.replace(module);
                if let Some(previous) = previous.filter(|_| !is_current) {
                    retire(&*previous);
                }
            }
            Err(err) => {
                self.report(err);
                if !is_current {
                    retire(&*module);
                }
            }
        }
        result
    }

    /// Show `err` on the host's error surface
    pub(crate) fn report(&self, err: &ReconcileError) {
        warn!("update rejected: {}", err);
        self.ctx
            .host
            .report_error(&self.ctx.config.error_category, Some(&err.to_string()));
    }

    fn try_update(&mut self, module: &Rc<M>, context: &VoiceContext) -> Result<()> {
        let plan = plan(module.as_ref(), context)?;
        let prepared = self.prepare(&plan)?;
        self.commit(plan, prepared, module);
        Ok(())
    }

    fn prepare(&self, plan: &Plan) -> std::result::Result<Prepared<H>, PortError> {
        let mut prepared = Prepared {
            bindings: Vec::new(),
            voice: None,
            audio: PendingSlots::empty(),
        };

        let result = (|| -> std::result::Result<(), PortError> {
            for descriptor in &plan.plain {
                let reusable = self
                    .controls
                    .get(&descriptor.address)
                    .map(|b| b.matches(descriptor))
                    .unwrap_or(false);
                if !reusable {
                    prepared.bindings.push(ControlBinding::new(descriptor, &self.ctx)?);
                }
            }
            if plan.wants_voice && self.voice.is_none() {
                prepared.voice = Some(VoiceChannel::new(&self.ctx)?);
            }
            prepared.audio = self.audio.prepare(plan.inputs)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(prepared),
            Err(err) => {
                prepared.discard();
                Err(err)
            }
        }
    }

    fn commit(&mut self, plan: Plan, prepared: Prepared<H>, module: &Rc<M>) {
        let errors = self.ctx.errors();

        // addresses gone from the new module, or whose shape changed
        let fresh: HashMap<&str, &ParameterDescriptor> =
            plan.plain.iter().map(|d| (d.address.as_str(), d)).collect();
        let stale = self
            .controls
            .iter()
            .filter(|(address, binding)| {
                fresh
                    .get(address.as_str())
                    .map(|d| !binding.matches(d))
                    .unwrap_or(true)
            })
            .map(|(address, _)| address.clone())
            .collect_vec();

        for address in stale {
            if let Some(binding) = self.controls.remove(&address) {
                if let Err(err) = binding.dispose() {
                    errors.report(&format!("cannot remove port for '{}': {}", address, err));
                }
            }
        }

        for binding in self.controls.values() {
            binding.rebind(module);
        }
        for binding in prepared.bindings {
            binding.rebind(module);
            self.controls.insert(binding.address().to_string(), binding);
        }

        if plan.wants_voice {
            if let Some(mut voice) = self.voice.take().or(prepared.voice) {
                voice.rebind(module, plan.assignment);
                self.voice = Some(voice);
            }
        } else if let Some(voice) = self.voice.take() {
            if let Err(err) = voice.dispose() {
                errors.report(&format!("cannot remove voice port: {}", err));
            }
        }

        self.audio.commit(plan.inputs, prepared.audio, module);
        self.options = plan.options;

        info!(
            controls = self.controls.len(),
            voice = self.voice.is_some(),
            inputs = self.audio.len(),
            "module instance applied"
        );
    }

    /// Remove every owned port and dispose the current module.
    pub fn dispose(&mut self) {
        let errors = self.ctx.errors();
        for (address, binding) in self.controls.drain() {
            if let Err(err) = binding.dispose() {
                errors.report(&format!("cannot remove port for '{}': {}", address, err));
            }
        }
        if let Some(voice) = self.voice.take() {
            if let Err(err) = voice.dispose() {
                errors.report(&format!("cannot remove voice port: {}", err));
            }
        }
        self.audio.dispose();
        if let Some(module) = self.current.take() {
            retire(&*module);
        }
        self.options = ModuleOptions::default();
    }
}

/// Classify and validate without touching any port.
fn plan<M: DspModule>(module: &M, context: &VoiceContext) -> Result<Plan> {
    let descriptors = module.descriptors();
    let inputs = module.num_audio_inputs();
    let options = module.options();

    let (voiced, plain): (Vec<(ParameterDescriptor, Option<VoiceRole>)>, Vec<ParameterDescriptor>) =
        descriptors.into_iter().partition_map(|d| match classify(&d, context.mode).voice {
            Some(role) => Either::Left((d, role)),
            None => Either::Right(d),
        });

    let assignment = VoiceAssignment::from_descriptors(voiced.iter().map(|(d, role)| (d, *role)));

    if context.mode == VoiceMode::Polyphonic {
        let missing = assignment.missing_for_polyphony();
        if !missing.is_empty() {
            return Err(ReconcileError::MissingPolyphonicParameters { missing });
        }
    }

    debug!(
        voiced = %voiced.iter().map(|(d, _)| d.address.as_str()).join(", "),
        plain = plain.len(),
        inputs,
        "classified module parameters"
    );

    Ok(Plan {
        wants_voice: !voiced.is_empty() || options.midi(),
        plain,
        assignment,
        inputs,
        options,
    })
}

/// Best-effort disposal of a module that is no longer wanted
pub(crate) fn retire<M: DspModule>(module: &M) {
    if let Err(err) = module.dispose() {
        debug!("module dispose failed: {}", err);
    }
}

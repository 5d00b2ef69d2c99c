//! # Wandel
//!
//! Port reconciliation for hot-swapped DSP modules.
//!
//! A node-based patching host embeds a DSP module that is recompiled every time its
//! source is edited or its voice mode changes. Each recompilation yields a new module
//! instance with a possibly different parameter set. Wandel keeps the operator's
//! ports - one per parameter, a note event port, one per audio input - in step with
//! whichever instance is current, reusing ports wherever it can so the user's wiring
//! survives the swap.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use wandel::{Operator, EngineConfig, TokioScheduler, VoiceContext, PortHost, RingModule, ModuleError};
//!
//! # async fn compile(_: &str) -> Result<RingModule, ModuleError> { unimplemented!() }
//! # async fn run<H: PortHost>(host: H) {
//! let operator: Operator<H, RingModule> =
//!     Operator::new(host, Rc::new(TokioScheduler), EngineConfig::default());
//!
//! // Stale compiles are discarded automatically
//! let outcome = operator.load(VoiceContext::monophonic(), compile("process = _;")).await;
//! assert!(outcome.is_applied());
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`descriptor`] - what a module says about its parameters, and how we classify them
//! - [`bindings`] - ports and the callbacks that forward to the current module
//! - [`Reconciler`] - diffs descriptor sets and migrates bindings on every swap
//! - [`Operator`] - tags each recompilation with a generation, applies only the latest
//!
//! Everything runs on one logical thread. Handles are `Rc`, not `Arc`; timers go
//! through a [`Scheduler`] so hosts can plug in their own event loop.

pub mod bindings;
pub mod descriptor;

mod config;
mod engine;
mod error;
mod module;
mod operator;
mod port;
mod ring;
mod timer;

#[cfg(test)]
mod test_support;

pub use bindings::{AudioRoutingTable, AudioSlot, ControlBinding, VoiceAssignment, VoiceChannel};
pub use config::{EngineConfig, DEFAULT_PULSE_WIDTH, DEFAULT_VELOCITY};
pub use descriptor::{
    classify, is_voice_controlled, voice_role, Classification, ControlShape, ModuleOptions,
    ParameterDescriptor, VoiceMode, VoiceRole,
};
pub use engine::{Reconciler, VoiceContext};
pub use error::{ReconcileError, Result};
pub use module::{DspModule, ModuleError, NoteEvent, SourceId};
pub use operator::{Generation, Operator, UpdateOutcome};
pub use port::{Callback, Port, PortError, PortHost, PortValue};
pub use ring::{RingModule, RingModuleMessage};
pub use timer::{ManualScheduler, Scheduler, Task, TokioScheduler};

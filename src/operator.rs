//! Generation-tagged module replacement.
//!
//! Compiling a module takes an unbounded amount of time, and the user can edit the
//! source or flip the voice mode again before the previous compile finishes. Every
//! request therefore gets a [`Generation`] when it is issued; when its module
//! instance arrives it is applied only if no newer request has been issued since.
//! Anything older is disposed without ever becoming current.
//!
//! # Example
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use wandel::{Operator, VoiceContext, EngineConfig, TokioScheduler, DspModule, ModuleError, PortHost};
//! # async fn compile<M>(_: &str) -> Result<M, ModuleError> { unimplemented!() }
//! # async fn run<H: PortHost, M: DspModule>(host: H) {
//! let operator: Operator<H, M> = Operator::new(host, Rc::new(TokioScheduler), EngineConfig::default());
//!
//! // on every edit
//! let outcome = operator.load(VoiceContext::polyphonic(8), compile("process = _;")).await;
//! # }
//! ```

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::{retire, Reconciler, VoiceContext};
use crate::error::ReconcileError;
use crate::module::{DspModule, ModuleError};
use crate::port::PortHost;
use crate::timer::Scheduler;

/// Tag of one recompilation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation {
    id: u64,
    context: VoiceContext,
}

impl Generation {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn context(&self) -> VoiceContext {
        self.context
    }
}

/// What happened to a completed request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The module is now current
    Applied { generation: u64 },
    /// Latest request, but compilation or reconciliation failed. The previous
    /// module (if any) is still current.
    Rejected(ReconcileError),
    /// A newer request was issued meanwhile; the module was disposed unused
    Discarded,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }
}

struct Shared<H: PortHost, M: DspModule> {
    engine: RefCell<Reconciler<H, M>>,
    latest: Cell<u64>,
    /// Highest generation already handed to `complete`
    completed: Cell<u64>,
    applied: Cell<Option<u64>>,
    voices: Cell<usize>,
}

/// One patch operator hosting a hot-swappable module.
///
/// Clones share the same engine; hand one to each async task that loads modules.
pub struct Operator<H: PortHost, M: DspModule> {
    shared: Rc<Shared<H, M>>,
}

impl<H: PortHost, M: DspModule> Clone for Operator<H, M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<H: PortHost, M: DspModule> Operator<H, M> {
    pub fn new(host: H, scheduler: Rc<dyn Scheduler>, config: EngineConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                engine: RefCell::new(Reconciler::new(Rc::new(host), scheduler, config)),
                latest: Cell::new(0),
                completed: Cell::new(0),
                applied: Cell::new(None),
                voices: Cell::new(1),
            }),
        }
    }

    /// Issue a new request. Every earlier request becomes stale.
    pub fn begin(&self, context: VoiceContext) -> Generation {
        let id = self.shared.latest.get() + 1;
        self.shared.latest.set(id);
        debug!(generation = id, mode = ?context.mode, "module requested");
        Generation { id, context }
    }

    /// Most recently issued generation
    pub fn latest(&self) -> u64 {
        self.shared.latest.get()
    }

    /// Generation whose module is current
    pub fn applied(&self) -> Option<u64> {
        self.shared.applied.get()
    }

    /// Voice count in effect: the module's `nvoices` option if declared,
    /// otherwise what the applied request asked for
    pub fn voices(&self) -> usize {
        self.shared.voices.get()
    }

    /// Hand over the result of a request issued with [`begin`](Self::begin).
    ///
    /// Each generation completes once; later calls with it are discarded.
    pub fn complete(&self, generation: Generation, result: Result<M, ModuleError>) -> UpdateOutcome {
        if generation.id != self.latest() || generation.id <= self.shared.completed.get() {
            debug!(generation = generation.id, latest = self.latest(), "discarding stale module");
            if let Ok(module) = result {
                retire(&module);
            }
            return UpdateOutcome::Discarded;
        }
        self.shared.completed.set(generation.id);

        let module = match result {
            Ok(module) => Rc::new(module),
            Err(err) => {
                let err = ReconcileError::Compile(err);
                let engine = self.shared.engine.borrow();
                engine.report(&err);
                return UpdateOutcome::Rejected(err);
            }
        };

        let mut engine = self.shared.engine.borrow_mut();
        match engine.update(module, &generation.context) {
            Ok(()) => {
                let voices = engine.options().nvoices().unwrap_or(generation.context.voices);
                self.shared.voices.set(voices);
                self.shared.applied.set(Some(generation.id));
                info!(generation = generation.id, voices, "generation applied");
                UpdateOutcome::Applied {
                    generation: generation.id,
                }
            }
            Err(err) => UpdateOutcome::Rejected(err),
        }
    }

    /// Issue a request, wait for `compile`, then complete it.
    ///
    /// The engine is not borrowed while `compile` is pending, so other loads and
    /// port callbacks may run in the meantime.
    pub async fn load<F>(&self, context: VoiceContext, compile: F) -> UpdateOutcome
    where
        F: Future<Output = Result<M, ModuleError>>,
    {
        let generation = self.begin(context);
        let result = compile.await;
        self.complete(generation, result)
    }

    /// Run `f` against the engine, for inspection
    pub fn with_engine<R>(&self, f: impl FnOnce(&Reconciler<H, M>) -> R) -> R {
        f(&self.shared.engine.borrow())
    }

    /// Remove every port and dispose the current module. Pending requests become stale.
    pub fn dispose(&self) {
        self.shared.latest.set(self.shared.latest.get() + 1);
        self.shared.applied.set(None);
        self.shared.engine.borrow_mut().dispose();
    }
}

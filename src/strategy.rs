//! Scheduler strategies - pluggable execution timing for per-view work.
//!
//! The engine never assumes anything about WHEN a unit of work runs. It hands
//! each unit to a [`RenderStrategy`] and gets back a one-shot
//! [`CompletionSignal`] that fires exactly once, after the work executed.
//! Strategies may run work synchronously, queue it, debounce it, or drop it
//! on teardown (in which case the signal simply never fires).
//!
//! Strategies are name-addressed through a [`StrategyRegistry`] with one
//! configured default. The registry is injected at engine construction; there
//! is no ambient global lookup.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ConfigError;

/// One unit of work bound to a view.
pub type Work = Box<dyn FnOnce()>;

/// Where a scheduled unit came from, for strategies that prioritize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleHint {
    /// A view is being created at this container position.
    Creation {
        /// Target position of the new view.
        index: usize,
    },
    /// An existing view's bindings are being patched.
    Patch {
        /// Position of the view at schedule time.
        index: usize,
    },
}

// =============================================================================
// Completion signal
// =============================================================================

struct SignalState {
    fired: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// One-shot completion signal for a scheduled unit of work.
///
/// Clones share the underlying state, so any clone observes the fire.
pub struct CompletionSignal {
    state: Rc<SignalState>,
}

impl Clone for CompletionSignal {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

/// Firing half of a [`CompletionSignal`]; consumed on notify.
pub struct CompletionNotifier {
    state: Rc<SignalState>,
}

impl CompletionSignal {
    /// Create a connected signal/notifier pair.
    pub fn channel() -> (CompletionSignal, CompletionNotifier) {
        let state = Rc::new(SignalState {
            fired: Cell::new(false),
            callbacks: RefCell::new(Vec::new()),
        });
        (
            CompletionSignal {
                state: state.clone(),
            },
            CompletionNotifier { state },
        )
    }

    /// Whether the signal already fired.
    pub fn fired(&self) -> bool {
        self.state.fired.get()
    }

    /// Run `callback` once the signal fires; immediately if it already did.
    pub fn on_fire(&self, callback: impl FnOnce() + 'static) {
        if self.state.fired.get() {
            callback();
        } else {
            self.state.callbacks.borrow_mut().push(Box::new(callback));
        }
    }
}

impl CompletionNotifier {
    /// Fire the signal. Consumes the notifier, so it fires exactly once.
    pub fn notify(self) {
        self.state.fired.set(true);
        let callbacks: Vec<Box<dyn FnOnce()>> =
            self.state.callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }
}

// =============================================================================
// Strategy trait & built-ins
// =============================================================================

/// Pluggable execution policy for one unit of work.
pub trait RenderStrategy {
    /// Registry name of this strategy.
    fn name(&self) -> &str;

    /// Execute `work` exactly once at a time of the strategy's choosing and
    /// fire the returned signal right after it ran.
    fn schedule(&self, work: Work, hint: ScheduleHint) -> CompletionSignal;
}

/// Runs work synchronously on the scheduling call. The registry default.
pub struct ImmediateStrategy;

impl RenderStrategy for ImmediateStrategy {
    fn name(&self) -> &str {
        "immediate"
    }

    fn schedule(&self, work: Work, _hint: ScheduleHint) -> CompletionSignal {
        let (signal, notifier) = CompletionSignal::channel();
        work();
        notifier.notify();
        signal
    }
}

/// Defers work until [`QueuedStrategy::flush`] is called.
///
/// Used to exercise deferred and out-of-order completion without a real
/// frame scheduler behind it.
pub struct QueuedStrategy {
    queue: RefCell<Vec<(Work, CompletionNotifier)>>,
}

impl QueuedStrategy {
    /// Create an empty queue.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            queue: RefCell::new(Vec::new()),
        })
    }

    /// Number of units waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every queued unit, including ones scheduled while flushing.
    pub fn flush(&self) {
        loop {
            let batch: Vec<(Work, CompletionNotifier)> =
                self.queue.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for (work, notifier) in batch {
                work();
                notifier.notify();
            }
        }
    }
}

impl RenderStrategy for QueuedStrategy {
    fn name(&self) -> &str {
        "queued"
    }

    fn schedule(&self, work: Work, _hint: ScheduleHint) -> CompletionSignal {
        let (signal, notifier) = CompletionSignal::channel();
        self.queue.borrow_mut().push((work, notifier));
        signal
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name-addressed strategy lookup with one configured default.
pub struct StrategyRegistry {
    strategies: HashMap<String, Rc<dyn RenderStrategy>>,
    default_name: String,
}

impl StrategyRegistry {
    /// Create a registry whose default is `strategy`.
    pub fn new(strategy: Rc<dyn RenderStrategy>) -> Self {
        let default_name = strategy.name().to_string();
        let mut strategies = HashMap::new();
        strategies.insert(default_name.clone(), strategy);
        Self {
            strategies,
            default_name,
        }
    }

    /// Registry with [`ImmediateStrategy`] as the default.
    pub fn with_defaults() -> Self {
        Self::new(Rc::new(ImmediateStrategy))
    }

    /// Register a strategy under its own name, replacing any previous entry.
    pub fn register(&mut self, strategy: Rc<dyn RenderStrategy>) {
        self.strategies
            .insert(strategy.name().to_string(), strategy);
    }

    /// Switch the default strategy.
    pub fn set_default(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.strategies.contains_key(name) {
            return Err(ConfigError::UnknownStrategy(name.to_string()));
        }
        self.default_name = name.to_string();
        Ok(())
    }

    /// Name of the current default strategy.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Look up a strategy by name.
    pub fn get(&self, name: &str) -> Option<Rc<dyn RenderStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Resolve `name`, falling back to the default when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Rc<dyn RenderStrategy>, ConfigError> {
        let name = name.unwrap_or(&self.default_name);
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

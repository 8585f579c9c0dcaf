//! Reconciliation engine - keeps a view container in sync with a collection.
//!
//! One [`Engine`] owns the full pipeline for a single container:
//!
//! ```text
//! collection source -> differ -> operations -> scheduler strategy -> container
//! ```
//!
//! Each emission triggers one *pass*: the differ classifies every item as
//! insert, remove, move or identity update, and the engine applies those
//! operations while batching per-view work through the configured
//! [`RenderStrategy`]:
//!
//! - **Remove** drops the view immediately so index bookkeeping inside the
//!   pass stays consistent.
//! - **Move** relocates the existing view synchronously, then schedules an
//!   implicit-value update.
//! - **Insert** builds a [`ViewContext`] and schedules view creation; the
//!   view is never finalized synchronously.
//! - **Update** schedules an implicit-value update.
//!
//! After the per-item operations the engine recomputes positional metadata
//! (`index`, `count`, first/last/even/odd) for every position of the final
//! container - count and parity can shift for untouched items too - and
//! schedules one patch per position. Implicit-value changes from moves and
//! updates are folded into that patch through the context's pending-mutation
//! list, so a context never receives two independently scheduled callbacks
//! in one pass.
//!
//! The returned [`CompletionHandle`] resolves once every scheduled unit of
//! the pass has executed; the optional render-callback sink fires at the same
//! point, once per pass that actually had a diff.
//!
//! # Concurrency model
//!
//! Single-threaded and cooperative. The engine serializes passes itself: an
//! emission arriving while the previous pass is still settling is stashed
//! and diffed once that pass resolved, and only the latest stashed emission
//! runs - intermediate snapshots are superseded. Work for individual
//! positions may still complete out of order within a pass, which is safe
//! because scheduled callbacks locate their view by context identity and
//! drain the live pending-mutation list at fire time.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::container::{ViewContainer, ViewTemplate};
use crate::context::{ComputedContext, ContextMutation, ViewContext};
use crate::differ::{KeyedDiffer, Operation};
use crate::error::{ConfigError, SourceTermination};
use crate::source::{CollectionSource, SourceEvent, SourceObserver, Subscription};
use crate::strategy::{CompletionSignal, RenderStrategy, ScheduleHint, StrategyRegistry, Work};

/// Shared container handle as consumed by the engine.
pub type ContainerHandle<T> = Rc<RefCell<dyn ViewContainer<T>>>;

// =============================================================================
// Completion handle
// =============================================================================

struct HandleState {
    remaining: Cell<usize>,
    resolved: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Join of all scheduled work signals for one pass.
///
/// Resolves only once every unit of the pass has executed, in whatever order
/// the strategy chose. A pass that scheduled nothing resolves immediately.
pub struct CompletionHandle {
    state: Rc<HandleState>,
}

/// Clones share the underlying state, so any clone observes resolution.
impl Clone for CompletionHandle {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl CompletionHandle {
    fn join(signals: Vec<CompletionSignal>) -> Self {
        let state = Rc::new(HandleState {
            remaining: Cell::new(signals.len()),
            resolved: Cell::new(signals.is_empty()),
            callbacks: RefCell::new(Vec::new()),
        });
        for signal in &signals {
            let state = state.clone();
            signal.on_fire(move || {
                let left = state.remaining.get().saturating_sub(1);
                state.remaining.set(left);
                if left == 0 && !state.resolved.get() {
                    state.resolved.set(true);
                    let callbacks: Vec<Box<dyn FnOnce()>> =
                        state.callbacks.borrow_mut().drain(..).collect();
                    for callback in callbacks {
                        callback();
                    }
                }
            });
        }
        Self { state }
    }

    fn settled() -> Self {
        Self::join(Vec::new())
    }

    /// A handle resolved by an explicit [`CompletionHandle::complete`] call
    /// instead of a signal join. Used for emissions stashed behind a pass
    /// that is still settling.
    fn deferred() -> Self {
        Self {
            state: Rc::new(HandleState {
                remaining: Cell::new(1),
                resolved: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    fn complete(&self) {
        if self.state.resolved.get() {
            return;
        }
        self.state.remaining.set(0);
        self.state.resolved.set(true);
        let callbacks: Vec<Box<dyn FnOnce()>> =
            self.state.callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Whether every scheduled unit of the pass has executed.
    pub fn resolved(&self) -> bool {
        self.state.resolved.get()
    }

    /// Run `callback` once the pass stabilized; immediately if it already has.
    pub fn on_resolve(&self, callback: impl FnOnce() + 'static) {
        if self.state.resolved.get() {
            callback();
        } else {
            self.state.callbacks.borrow_mut().push(Box::new(callback));
        }
    }
}

// =============================================================================
// Terminal state
// =============================================================================

/// Observable end state of the active collection source.
///
/// Surfaced instead of silently absorbing upstream termination; rendered
/// views stay intact and the caller decides what happens next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    /// The source completed normally.
    Completed,
    /// The source ended with an error.
    Failed(SourceTermination),
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and validates an [`Engine`].
///
/// Container, template and key function are required; everything else has a
/// default. Validation happens in [`EngineBuilder::build`] - configuration
/// errors fail fast and are never deferred into a pass.
pub struct EngineBuilder<T, K> {
    container: Option<ContainerHandle<T>>,
    template: Option<ViewTemplate<T>>,
    key_fn: Option<Rc<dyn Fn(&T) -> K>>,
    distinct_by: Option<Rc<dyn Fn(&T, &T) -> bool>>,
    registry: Option<StrategyRegistry>,
    strategy: Option<String>,
    render_callback: Option<Rc<dyn Fn()>>,
}

impl<T, K> EngineBuilder<T, K>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
{
    /// Start an empty configuration.
    pub fn new() -> Self {
        Self {
            container: None,
            template: None,
            key_fn: None,
            distinct_by: None,
            registry: None,
            strategy: None,
            render_callback: None,
        }
    }

    /// The container whose views the engine will own.
    pub fn container(mut self, container: ContainerHandle<T>) -> Self {
        self.container = Some(container);
        self
    }

    /// Factory building a view from a freshly created context.
    pub fn template(
        mut self,
        template: impl Fn(
                Rc<ViewContext<T>>,
            )
                -> Result<Box<dyn crate::container::View<T>>, crate::error::RenderError>
            + 'static,
    ) -> Self {
        self.template = Some(Rc::new(template));
        self
    }

    /// Key function defining cross-snapshot identity.
    pub fn key_fn(mut self, key_fn: impl Fn(&T) -> K + 'static) -> Self {
        self.key_fn = Some(Rc::new(key_fn));
        self
    }

    /// Projection used for downstream equality checks. Defaults to `==`.
    pub fn distinct_by(mut self, distinct_by: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.distinct_by = Some(Rc::new(distinct_by));
        self
    }

    /// Strategy registry to schedule work through.
    pub fn strategies(mut self, registry: StrategyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Name of the strategy to use; defaults to the registry default.
    pub fn strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = Some(name.into());
        self
    }

    /// Sink fired once per fully completed pass.
    pub fn render_callback(mut self, callback: impl Fn() + 'static) -> Self {
        self.render_callback = Some(Rc::new(callback));
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<Engine<T, K>, ConfigError> {
        let container = self.container.ok_or(ConfigError::MissingContainer)?;
        let template = self.template.ok_or(ConfigError::MissingTemplate)?;
        let key_fn = self.key_fn.ok_or(ConfigError::MissingKeyFn)?;
        let registry = self.registry.unwrap_or_default();
        let strategy = registry.resolve(self.strategy.as_deref())?;
        let distinct_by = self
            .distinct_by
            .unwrap_or_else(|| Rc::new(|a: &T, b: &T| a == b));

        Ok(Engine {
            inner: Rc::new(EngineInner {
                container,
                template,
                differ: RefCell::new(KeyedDiffer::new(key_fn)),
                distinct_by,
                registry,
                strategy: RefCell::new(strategy),
                render_callback: self.render_callback,
                source: RefCell::new(None),
                last_emission: RefCell::new(None),
                active_pass: RefCell::new(None),
                stashed_emission: RefCell::new(None),
                stashed_handle: RefCell::new(None),
                terminal: RefCell::new(None),
                terminal_callbacks: RefCell::new(Vec::new()),
                alive: Rc::new(Cell::new(true)),
                epoch: Rc::new(Cell::new(0)),
            }),
        })
    }
}

impl<T, K> Default for EngineBuilder<T, K>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner<T, K> {
    container: ContainerHandle<T>,
    template: ViewTemplate<T>,
    differ: RefCell<KeyedDiffer<T, K>>,
    distinct_by: Rc<dyn Fn(&T, &T) -> bool>,
    registry: StrategyRegistry,
    strategy: RefCell<Rc<dyn RenderStrategy>>,
    render_callback: Option<Rc<dyn Fn()>>,
    source: RefCell<Option<(Rc<dyn CollectionSource<T>>, Subscription)>>,
    last_emission: RefCell<Option<Rc<Vec<T>>>>,
    active_pass: RefCell<Option<CompletionHandle>>,
    stashed_emission: RefCell<Option<Rc<Vec<T>>>>,
    stashed_handle: RefCell<Option<CompletionHandle>>,
    terminal: RefCell<Option<TerminalState>>,
    terminal_callbacks: RefCell<Vec<Box<dyn FnOnce(&TerminalState)>>>,
    alive: Rc<Cell<bool>>,
    // bumped on source swap so in-flight work from a superseded pass is dropped
    epoch: Rc<Cell<u64>>,
}

/// Identity-based reconciliation engine for one view container.
pub struct Engine<T, K> {
    inner: Rc<EngineInner<T, K>>,
}

impl<T, K> Clone for Engine<T, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, K> Engine<T, K>
where
    T: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + Debug + 'static,
{
    /// Start configuring an engine.
    pub fn builder() -> EngineBuilder<T, K> {
        EngineBuilder::new()
    }

    /// Switch to a different registered strategy for subsequent passes.
    pub fn set_strategy(&self, name: &str) -> Result<(), ConfigError> {
        let strategy = self.inner.registry.resolve(Some(name))?;
        self.inner.strategy.replace(strategy);
        Ok(())
    }

    /// Run one pass against `items`.
    ///
    /// Emitting the identical `Rc` again, or a snapshot with unchanged keys,
    /// order and values, is a no-op that resolves immediately and schedules
    /// nothing. An emission arriving while the previous pass is still
    /// settling is stashed and diffed once that pass resolved; only the
    /// latest stashed emission runs. Normally driven by [`Engine::observe`];
    /// direct calls are the test and integration seam.
    pub fn render(&self, items: Rc<Vec<T>>) -> CompletionHandle {
        if !self.inner.alive.get() {
            return CompletionHandle::settled();
        }
        let settling = self
            .inner
            .active_pass
            .borrow()
            .as_ref()
            .map(|pass| !pass.resolved())
            .unwrap_or(false);
        if settling {
            return self.stash_emission(items);
        }
        self.render_now(items)
    }

    /// Hold `items` until the active pass resolved. A later emission arriving
    /// before then replaces the stashed one; all stashed emissions share one
    /// handle that resolves with the pass that eventually runs.
    fn stash_emission(&self, items: Rc<Vec<T>>) -> CompletionHandle {
        self.inner.stashed_emission.replace(Some(items));
        let mut slot = self.inner.stashed_handle.borrow_mut();
        match slot.as_ref() {
            Some(handle) => handle.clone(),
            None => {
                let handle = CompletionHandle::deferred();
                *slot = Some(handle.clone());
                handle
            }
        }
    }

    fn render_now(&self, items: Rc<Vec<T>>) -> CompletionHandle {
        let duplicate = self
            .inner
            .last_emission
            .borrow()
            .as_ref()
            .map(|last| Rc::ptr_eq(last, &items))
            .unwrap_or(false);
        if duplicate {
            return CompletionHandle::settled();
        }
        self.inner.last_emission.replace(Some(items.clone()));

        let operations = self.inner.differ.borrow_mut().diff(items.as_slice());
        let Some(operations) = operations else {
            return CompletionHandle::settled();
        };

        let handle = self.apply_changes(operations);
        self.inner.active_pass.replace(Some(handle.clone()));
        if let Some(callback) = self.inner.render_callback.clone() {
            handle.on_resolve(move || callback());
        }
        let weak = Rc::downgrade(&self.inner);
        handle.on_resolve(move || {
            if let Some(inner) = weak.upgrade() {
                Engine { inner }.pass_settled();
            }
        });
        handle
    }

    /// The active pass resolved: run the stashed emission, if any, and chain
    /// its handle onto the new pass.
    fn pass_settled(&self) {
        let stashed = self.inner.stashed_emission.borrow_mut().take();
        let Some(items) = stashed else {
            self.inner.active_pass.replace(None);
            return;
        };
        let deferred = self.inner.stashed_handle.borrow_mut().take();
        let handle = self.render_now(items);
        if let Some(deferred) = deferred {
            handle.on_resolve(move || deferred.complete());
        }
    }

    /// Track `source` as the single active collection source.
    ///
    /// Swapping sources unsubscribes from the previous one, tears down the
    /// rendered views and discards the diff baseline, so the next emission
    /// is an all-insert pass from empty.
    pub fn observe(&self, source: Rc<dyn CollectionSource<T>>) {
        if !self.inner.alive.get() {
            return;
        }
        let had_source = self.inner.source.replace(None).is_some();
        if had_source || self.inner.differ.borrow().baseline_len() > 0 {
            self.inner.container.borrow_mut().clear();
        }
        self.inner.differ.borrow_mut().reset();
        self.inner.last_emission.replace(None);
        self.inner.terminal.replace(None);

        // In-flight work from the previous source is obsolete: bump the epoch
        // so it no-ops, and drop any emission stashed behind it.
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        self.inner.stashed_emission.replace(None);
        if let Some(deferred) = self.inner.stashed_handle.replace(None) {
            deferred.complete();
        }

        // Store the source before subscribing: providers that replay their
        // latest snapshot synchronously already need it bound.
        self.inner
            .source
            .replace(Some((source.clone(), Subscription::empty())));

        let weak = Rc::downgrade(&self.inner);
        let observer: SourceObserver<T> = Rc::new(move |event| {
            let Some(inner) = weak.upgrade() else { return };
            let engine = Engine { inner };
            match event {
                SourceEvent::Next(items) => {
                    engine.render(items);
                }
                SourceEvent::Complete => {
                    engine.enter_terminal(TerminalState::Completed);
                }
                SourceEvent::Error(error) => {
                    tracing::error!(error = %error, "collection source terminated");
                    engine.enter_terminal(TerminalState::Failed(error));
                }
            }
        });
        let subscription = source.subscribe(observer);
        if let Some(slot) = self.inner.source.borrow_mut().as_mut() {
            slot.1 = subscription;
        }
    }

    /// End state of the active source, if it terminated.
    pub fn terminal_state(&self) -> Option<TerminalState> {
        self.inner.terminal.borrow().clone()
    }

    /// Run `callback` when the source terminates; immediately if it already did.
    pub fn on_terminal(&self, callback: impl FnOnce(&TerminalState) + 'static) {
        let current = self.inner.terminal.borrow().clone();
        match current {
            Some(state) => callback(&state),
            None => self
                .inner
                .terminal_callbacks
                .borrow_mut()
                .push(Box::new(callback)),
        }
    }

    /// Tear the engine down: unsubscribe, destroy every view, and turn any
    /// still-outstanding scheduled callbacks into no-ops.
    pub fn destroy(&self) {
        if !self.inner.alive.get() {
            return;
        }
        self.inner.alive.set(false);
        self.inner.source.replace(None);
        self.inner.container.borrow_mut().clear();
        self.inner.last_emission.replace(None);
        self.inner.active_pass.replace(None);
        self.inner.stashed_emission.replace(None);
        if let Some(deferred) = self.inner.stashed_handle.replace(None) {
            deferred.complete();
        }
    }

    fn enter_terminal(&self, state: TerminalState) {
        if self.inner.terminal.borrow().is_some() {
            return;
        }
        self.inner.terminal.replace(Some(state.clone()));
        let callbacks: Vec<Box<dyn FnOnce(&TerminalState)>> =
            self.inner.terminal_callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback(&state);
        }
    }

    fn apply_changes(&self, operations: Vec<Operation<T>>) -> CompletionHandle {
        let inner = &self.inner;
        let strategy = inner.strategy.borrow().clone();
        let pass_epoch = inner.epoch.get();
        let source_ref = inner
            .source
            .borrow()
            .as_ref()
            .map(|(source, _)| Rc::downgrade(source));

        let mut signals: Vec<CompletionSignal> = Vec::new();

        // Shadow of the final context order. Mirrors every structural
        // operation including creations that have not landed yet, so later
        // operations and the metadata phase resolve contexts by final
        // position regardless of how far the strategy deferred the work.
        let mut shadow: Vec<Rc<ViewContext<T>>> = {
            let container = inner.container.borrow();
            (0..container.len())
                .filter_map(|i| container.get(i).map(|v| v.context()))
                .collect()
        };

        // Liveness is tracked alongside the shadow instead of rescanning the
        // container per patch: contexts present at pass start, minus removals,
        // plus creations that already landed (tracked via a per-insert flag).
        let mut live: HashSet<*const ViewContext<T>> =
            shadow.iter().map(Rc::as_ptr).collect();
        let mut landed: HashMap<*const ViewContext<T>, Rc<Cell<bool>>> = HashMap::new();
        // Implicit-value changes from moves and updates fold into the single
        // per-context patch of the metadata phase.
        let mut new_values: HashMap<*const ViewContext<T>, T> = HashMap::new();

        for operation in operations {
            match operation {
                Operation::Remove { index } => {
                    inner.container.borrow_mut().remove(index);
                    if index < shadow.len() {
                        let context = shadow.remove(index);
                        live.remove(&Rc::as_ptr(&context));
                    }
                }
                Operation::Move { from, to, item } => {
                    inner.container.borrow_mut().move_view(from, to);
                    if from < shadow.len() {
                        let context = shadow.remove(from);
                        new_values.insert(Rc::as_ptr(&context), item);
                        let at = to.min(shadow.len());
                        shadow.insert(at, context);
                    }
                }
                Operation::Insert { index, item } => {
                    let context = ViewContext::new(item, inner.distinct_by.clone());
                    if let Some(weak) = &source_ref {
                        context.bind_source(weak.clone());
                    }
                    shadow.insert(index.min(shadow.len()), context.clone());
                    let flag = Rc::new(Cell::new(false));
                    landed.insert(Rc::as_ptr(&context), flag.clone());

                    let container = inner.container.clone();
                    let template = inner.template.clone();
                    let alive = inner.alive.clone();
                    let epoch = inner.epoch.clone();
                    let work: Work = Box::new(move || {
                        if !alive.get() || epoch.get() != pass_epoch {
                            return;
                        }
                        let view = match (template)(context.clone()) {
                            Ok(view) => view,
                            Err(error) => {
                                tracing::error!(index, error = %error, "view creation failed");
                                return;
                            }
                        };
                        let mut container = container.borrow_mut();
                        // An earlier failed creation leaves the container
                        // short; clamp so later views still land.
                        let at = index.min(container.len());
                        container.insert(view, at);
                        flag.set(true);
                        if let Some(view) = container.get_mut(at) {
                            if let Err(error) = view.refresh() {
                                tracing::error!(index = at, error = %error, "initial render failed");
                            }
                        }
                    });
                    signals.push(strategy.schedule(work, ScheduleHint::Creation { index }));
                }
                Operation::Update { index, item } => {
                    if let Some(context) = shadow.get(index) {
                        new_values.insert(Rc::as_ptr(context), item);
                    }
                }
            }
        }

        // One patch per final position carrying the implicit-value change (if
        // any) plus recomputed metadata - count and parity can shift for
        // untouched views too, so every position gets one. A context without
        // a live view belongs to a pending insert: its patch is applied
        // directly and the scheduled creation renders the final state.
        let count = shadow.len();
        for (position, context) in shadow.iter().enumerate() {
            let computed = ComputedContext::at(position, count);
            let weak = source_ref.clone();
            let value = new_values.remove(&Rc::as_ptr(context));
            let patch: ContextMutation<T> = Box::new(move |ctx| {
                if let Some(weak) = weak {
                    ctx.bind_source(weak);
                }
                if let Some(value) = value {
                    ctx.set_implicit(value);
                }
                ctx.set_computed(computed);
            });

            let ptr = Rc::as_ptr(context);
            let is_live = live.contains(&ptr)
                || landed.get(&ptr).map(|flag| flag.get()).unwrap_or(false);
            if !is_live {
                patch(context);
                continue;
            }

            context.queue_mutation(patch);
            let container = inner.container.clone();
            let alive = inner.alive.clone();
            let epoch = inner.epoch.clone();
            let ctx = context.clone();
            let work: Work = Box::new(move || {
                if !alive.get() || epoch.get() != pass_epoch {
                    return;
                }
                ctx.drain_mutations();
                refresh_bound_view(&container, &ctx, position);
            });
            signals.push(strategy.schedule(work, ScheduleHint::Patch { index: position }));
        }

        CompletionHandle::join(signals)
    }
}

/// Refresh the view bound to `context`.
///
/// `hint` is the context's final position for the pass; when the container
/// already matches it the lookup is O(1). Callbacks may fire before pending
/// creations at earlier positions landed, so on a mismatch the view is
/// located by context identity instead.
fn refresh_bound_view<T>(container: &ContainerHandle<T>, context: &Rc<ViewContext<T>>, hint: usize) {
    let target = Rc::as_ptr(context);
    let mut container = container.borrow_mut();
    let at_hint = container
        .get(hint)
        .map(|v| Rc::as_ptr(&v.context()) == target)
        .unwrap_or(false);
    let index = if at_hint {
        Some(hint)
    } else {
        (0..container.len()).find(|&i| {
            container
                .get(i)
                .map(|v| Rc::as_ptr(&v.context()) == target)
                .unwrap_or(false)
        })
    };
    let Some(index) = index else { return };
    if let Some(view) = container.get_mut(index) {
        if let Err(error) = view.refresh() {
            tracing::error!(index, error = %error, "view refresh failed");
        }
    }
}

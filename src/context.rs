//! ViewContext - per-view mutable binding.
//!
//! Every live view owns exactly one [`ViewContext`]. The context is an
//! update-only value holder: it is shared as `Rc<ViewContext<T>>` and mutated
//! in place through explicit update methods, never replaced. Consumers that
//! keep the `Rc` around therefore always observe the latest item value and
//! positional metadata.
//!
//! The context also carries the engine's coalescing state for one position:
//! mutations queued while a scheduled callback is outstanding pile up in a
//! pending list and are drained together when that callback fires. Draining
//! reads the live list at fire time, so mutations that arrive between
//! scheduling and execution are still applied.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::source::CollectionSource;

bitflags! {
    /// Positional flags recomputed for every view after each pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PositionFlags: u8 {
        /// View sits at index 0.
        const FIRST = 1 << 0;
        /// View sits at the last index.
        const LAST = 1 << 1;
        /// View sits at an even index.
        const EVEN = 1 << 2;
        /// View sits at an odd index.
        const ODD = 1 << 3;
    }
}

/// Computed positional metadata for one view.
///
/// Count and parity can shift at any position even for untouched items, so
/// the engine recomputes this for every position after each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputedContext {
    /// Position of the view in the container.
    pub index: usize,
    /// Total number of views in the container.
    pub count: usize,
    /// First/last/even/odd flags derived from index and count.
    pub flags: PositionFlags,
}

impl ComputedContext {
    /// Derive the metadata for `index` in a container of `count` views.
    pub fn at(index: usize, count: usize) -> Self {
        let mut flags = if index % 2 == 0 {
            PositionFlags::EVEN
        } else {
            PositionFlags::ODD
        };
        if index == 0 {
            flags |= PositionFlags::FIRST;
        }
        if count > 0 && index == count - 1 {
            flags |= PositionFlags::LAST;
        }
        Self { index, count, flags }
    }

    /// True for the view at index 0.
    pub fn first(&self) -> bool {
        self.flags.contains(PositionFlags::FIRST)
    }

    /// True for the view at the last index.
    pub fn last(&self) -> bool {
        self.flags.contains(PositionFlags::LAST)
    }

    /// True for views at even indices.
    pub fn even(&self) -> bool {
        self.flags.contains(PositionFlags::EVEN)
    }

    /// True for views at odd indices.
    pub fn odd(&self) -> bool {
        self.flags.contains(PositionFlags::ODD)
    }
}

/// One deferred mutation of a context, applied when its scheduled callback fires.
pub type ContextMutation<T> = Box<dyn FnOnce(&ViewContext<T>)>;

/// Mutable binding between one item of the collection and its view.
///
/// Holds the item value (`implicit`), the computed positional metadata, the
/// caller-supplied `distinct_by` projection used for downstream equality
/// checks, and a non-owning back-reference to the live collection source for
/// re-render access.
pub struct ViewContext<T> {
    implicit: RefCell<T>,
    computed: Cell<ComputedContext>,
    distinct_by: Rc<dyn Fn(&T, &T) -> bool>,
    source: RefCell<Option<Weak<dyn CollectionSource<T>>>>,
    pending: RefCell<Vec<ContextMutation<T>>>,
}

impl<T: Clone + 'static> ViewContext<T> {
    /// Create a context for `item`.
    ///
    /// Contexts are always shared; external code holding the `Rc` observes
    /// every later update in place.
    pub fn new(item: T, distinct_by: Rc<dyn Fn(&T, &T) -> bool>) -> Rc<Self> {
        Rc::new(Self {
            implicit: RefCell::new(item),
            computed: Cell::new(ComputedContext::default()),
            distinct_by,
            source: RefCell::new(None),
            pending: RefCell::new(Vec::new()),
        })
    }

    /// Current item value (cloned).
    pub fn implicit(&self) -> T {
        self.implicit.borrow().clone()
    }

    /// Read the item value without cloning.
    pub fn with_implicit<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.implicit.borrow())
    }

    /// Current positional metadata.
    pub fn computed(&self) -> ComputedContext {
        self.computed.get()
    }

    /// Replace the item value.
    pub fn set_implicit(&self, value: T) {
        self.implicit.replace(value);
    }

    /// Replace the positional metadata.
    pub fn set_computed(&self, computed: ComputedContext) {
        self.computed.set(computed);
    }

    /// Point the context at the collection source currently driving it.
    ///
    /// The reference is non-owning; it exists for re-render access only.
    pub fn bind_source(&self, source: Weak<dyn CollectionSource<T>>) {
        self.source.replace(Some(source));
    }

    /// The collection source driving this context, if it is still alive.
    pub fn source(&self) -> Option<Rc<dyn CollectionSource<T>>> {
        self.source.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Compare `other` against the current item using the `distinct_by` projection.
    pub fn same_identity(&self, other: &T) -> bool {
        (self.distinct_by)(&self.implicit.borrow(), other)
    }

    /// Queue a mutation to be applied when the next scheduled callback fires.
    pub(crate) fn queue_mutation(&self, mutation: ContextMutation<T>) {
        self.pending.borrow_mut().push(mutation);
    }

    /// Apply every pending mutation, including ones queued while draining.
    pub(crate) fn drain_mutations(&self) {
        loop {
            let batch: Vec<ContextMutation<T>> =
                self.pending.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for mutation in batch {
                mutation(self);
            }
        }
    }
}

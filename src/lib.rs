//! # reflow
//!
//! Keyed list reconciliation for retained view trees.
//!
//! reflow keeps an ordered container of views in sync with a stream of
//! collection snapshots. Identity is key-based: a caller-supplied key
//! function decides which items are "the same" across snapshots, so views
//! are moved and patched in place instead of being destroyed and rebuilt.
//!
//! ## Pipeline
//!
//! ```text
//! CollectionSource → KeyedDiffer → Operations → RenderStrategy → ViewContainer
//! ```
//!
//! Each emission triggers one reconciliation pass. The differ classifies
//! every item as insert, remove, move or identity update; the engine applies
//! the operations through a pluggable scheduler strategy, recomputes
//! positional metadata (`index`, `count`, first/last/even/odd) for every
//! final position, and resolves a [`CompletionHandle`] once the whole pass
//! stabilized.
//!
//! ## Modules
//!
//! - [`differ`] - key-based diff between consecutive snapshots
//! - [`engine`] - the reconciliation engine driving a container
//! - [`context`] - per-view mutable binding with positional metadata
//! - [`container`] - the view container seam and in-memory implementation
//! - [`strategy`] - pluggable scheduler strategies and completion signals
//! - [`source`] - collection sources and subscriptions
//! - [`template`] - named template slots with a single active view
//! - [`error`] - configuration, render and source-termination errors

pub mod container;
pub mod context;
pub mod differ;
pub mod engine;
pub mod error;
pub mod source;
pub mod strategy;
pub mod template;

pub use container::{VecContainer, View, ViewContainer, ViewTemplate};
pub use context::{ComputedContext, ContextMutation, PositionFlags, ViewContext};
pub use differ::{KeyedDiffer, Operation};
pub use engine::{CompletionHandle, ContainerHandle, Engine, EngineBuilder, TerminalState};
pub use error::{ConfigError, RenderError, SourceTermination};
pub use source::{CollectionSource, SharedSource, SourceEvent, SourceObserver, Subscription};
pub use strategy::{
    CompletionNotifier, CompletionSignal, ImmediateStrategy, QueuedStrategy, RenderStrategy,
    ScheduleHint, StrategyRegistry, Work,
};
pub use template::TemplateSlot;

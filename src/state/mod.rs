//! Reactive state: cells, bindings, publishers, and persistence.
//!
//! Everything in this module exists to answer one question for the rest of
//! the crate: "did anything this view depends on change?" State is held in
//! inner boxes that survive aggregate re-evaluation (see [`State`]), changes
//! travel over [`Publisher`] streams with deferred delivery, and the
//! [`UpdaterCache`] wires freshly built aggregates up to their predecessors'
//! storage without per-field boilerplate.

mod binding;
mod cell;
mod observable;
mod offset;
mod property;
mod publisher;
mod storage;
mod updater;

pub use binding::Binding;
pub use cell::{State, StateValue};
pub use observable::{ObservableObject, Observed, Published};
pub use offset::{FieldOffset, OffsetError};
pub use property::{
    collect_publishers, DynamicProperties, DynamicProperty, PropertyCollector,
};
pub use publisher::{Cancellable, Publisher};
pub use storage::{
    AppStorage, FileProvider, MemoryProvider, StorageCache, StorageError, StorageProvider,
};
pub use updater::UpdaterCache;

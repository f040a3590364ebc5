//! perch: a declarative UI core.
//!
//! Interfaces are described as values: an [`App`] declares a [`Window`], a
//! window declares a tree of [`View`]s, and none of those values are the
//! interface itself. The live side (backend windows, native widgets) is
//! owned by the framework, which diffs freshly declared values against it
//! and applies the difference.
//!
//! What makes the description re-evaluate is the state layer. Views hold
//! their mutable data in dynamic properties such as [`State`] and
//! [`AppStorage`]; when one changes, its [`Publisher`] fires (delivery is
//! deferred to the scheduler, never reentrant), the graph re-evaluates the
//! bodies that could have changed, and the window renegotiates its layout.
//! Because a view value is rebuilt on every evaluation, dynamic properties
//! adopt the storage of the instance they replace; the adoption machinery
//! ([`UpdaterCache`]) finds each property's location within its view by
//! scanning the view's bytes once per view type, falling back to structural
//! traversal when a type's layout is ambiguous.
//!
//! Backends implement the [`Backend`] trait; [`HeadlessBackend`] runs the
//! whole stack without a toolkit:
//!
//! ```
//! use perch::{
//!     dynamic_properties, App, AppHost, Environment, Flexible, HeadlessBackend, State, Window,
//! };
//!
//! #[derive(Debug)]
//! struct Demo {
//!     size: State<i32>,
//! }
//!
//! dynamic_properties!(Demo { size });
//!
//! impl App for Demo {
//!     fn body(&self) -> Window {
//!         Window::new("demo", Flexible::new().with_minimum(self.size.get(), 100))
//!     }
//! }
//!
//! let host = AppHost::new(
//!     Demo { size: State::new(200) },
//!     HeadlessBackend::new(),
//!     Environment::new(),
//! );
//! host.with_app(|app| app.size.set(300));
//! perch::scheduler::drain();
//! ```

pub mod app;
pub mod backend;
pub mod environment;
pub mod geometry;
pub mod graph;
pub mod headless;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod view;

pub use app::{App, AppHost};
pub use backend::Backend;
pub use environment::Environment;
pub use geometry::Size;
pub use graph::ViewGraph;
pub use headless::HeadlessBackend;
pub use scene::{Window, WindowNode};
pub use state::{
    collect_publishers, AppStorage, Binding, Cancellable, DynamicProperties, DynamicProperty,
    FileProvider, MemoryProvider, ObservableObject, Observed, Published, Publisher,
    PropertyCollector, State, StateValue, StorageCache, StorageError, StorageProvider,
    UpdaterCache,
};
pub use view::{Flexible, Frame, LayoutResult, Sizing, View, ViewBody};

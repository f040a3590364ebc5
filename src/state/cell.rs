//! Plain value cells.

use crate::environment::Environment;
use crate::state::binding::Binding;
use crate::state::property::DynamicProperty;
use crate::state::publisher::{Cancellable, Publisher};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A value that can live inside a [`State`] cell.
///
/// The only hook is [`embedded_publisher`](Self::embedded_publisher): values
/// that are themselves observable (an [`Observed`](crate::Observed) model
/// handle, or an `Option` of one) expose their own change stream so the
/// enclosing cell can forward it. Plain data returns `None`, which is the
/// default, so implementing the trait for a custom value type is a one-liner:
///
/// ```
/// # use perch::StateValue;
/// #[derive(Clone)]
/// struct Point { x: i32, y: i32 }
/// impl StateValue for Point {}
/// ```
pub trait StateValue: Send + 'static {
    /// The publisher of the value's own changes, if the value is observable.
    fn embedded_publisher(&self) -> Option<Publisher> {
        None
    }
}

macro_rules! plain_state_values {
    ($($ty:ty),+ $(,)?) => {
        $(impl StateValue for $ty {})+
    };
}

plain_state_values!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, String,
    &'static str, ()
);

impl<T: Send + 'static> StateValue for Vec<T> {}

/// Tuples surface the first embedded stream among their members; the cell
/// holds at most one downstream link, so one stream is all it can carry.
macro_rules! tuple_state_values {
    ($(($($name:ident),+))+) => {$(
        #[allow(non_snake_case)]
        impl<$($name: StateValue),+> StateValue for ($($name,)+) {
            fn embedded_publisher(&self) -> Option<Publisher> {
                let ($($name,)+) = self;
                None$(.or_else(|| $name.embedded_publisher()))+
            }
        }
    )+};
}

tuple_state_values!((A, B)(A, B, C)(A, B, C, D));

/// An `Option` delegates to its value when present; an absent value has no
/// stream, which is what drives the dynamic relink rule in [`State`].
impl<V: StateValue> StateValue for Option<V> {
    fn embedded_publisher(&self) -> Option<Publisher> {
        self.as_ref().and_then(|value| value.embedded_publisher())
    }
}

/// The active link from a cell's publisher to its value's embedded stream.
struct DownstreamLink {
    observation: Cancellable,
    /// Identity of the linked stream, to detect value replacement.
    stream: Publisher,
}

/// The part of a cell that stays constant between aggregate re-evaluations.
///
/// Aggregate values are recreated on every body evaluation; the freshly
/// constructed [`State`] then adopts its predecessor's box through the
/// dynamic property contract, so bindings captured earlier keep reading and
/// writing the same storage.
struct StateBox<V> {
    value: Mutex<V>,
    did_change: Publisher,
    downstream: Mutex<Option<DownstreamLink>>,
}

impl<V: StateValue> StateBox<V> {
    /// Single write-side epilogue: maintains the embedded-observable link,
    /// then publishes.
    ///
    /// The link rule is exact: if the value now carries a stream and none (or
    /// a different one) is linked, link it; if the value no longer carries a
    /// stream, tear the link down. The stream belongs to the *value*, not the
    /// cell, so replacing the value with a different observable instance
    /// re-links.
    fn post_set(&self) {
        let embedded = self.value.lock().embedded_publisher();
        {
            let mut slot = self.downstream.lock();
            match (embedded, slot.as_ref()) {
                (Some(stream), Some(link)) if link.stream.same_stream(&stream) => {}
                (Some(stream), _) => {
                    if let Some(old) = slot.take() {
                        old.observation.cancel();
                    }
                    let observation = self.did_change.link_to_upstream(&stream);
                    *slot = Some(DownstreamLink {
                        observation,
                        stream,
                    });
                }
                (None, Some(_)) => {
                    if let Some(old) = slot.take() {
                        old.observation.cancel();
                    }
                }
                (None, None) => {}
            }
        }
        self.did_change.send();
    }

    /// Establishes the initial embedded link without publishing.
    fn link_embedded(&self) {
        let embedded = self.value.lock().embedded_publisher();
        if let Some(stream) = embedded {
            let observation = self.did_change.link_to_upstream(&stream);
            *self.downstream.lock() = Some(DownstreamLink {
                observation,
                stream,
            });
        }
    }
}

/// A source of truth for view state.
///
/// Mutation always goes through one write path that stores the new value and
/// then publishes; observers are notified on the next scheduler drain. If the
/// value embeds an observable (see [`StateValue`]), its changes are forwarded
/// through the cell's publisher as well.
///
/// Cloning a `State` clones a handle to the same storage.
pub struct State<V: StateValue> {
    /// Outer handle, reassigned when adopting a predecessor; the inner box is
    /// what persists.
    storage: Arc<Mutex<Arc<StateBox<V>>>>,
}

impl<V: StateValue> State<V> {
    /// Creates a cell with an initial value.
    ///
    /// If the initial value is observable, its publisher is linked
    /// immediately.
    pub fn new(initial: V) -> State<V> {
        let bx = Arc::new(StateBox {
            value: Mutex::new(initial),
            did_change: Publisher::new(),
            downstream: Mutex::new(None),
        });
        bx.link_embedded();
        State {
            storage: Arc::new(Mutex::new(bx)),
        }
    }

    fn boxed(&self) -> Arc<StateBox<V>> {
        self.storage.lock().clone()
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> V
    where
        V: Clone,
    {
        self.boxed().value.lock().clone()
    }

    /// Reads the current value in place.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.boxed().value.lock())
    }

    /// Replaces the value and publishes the change.
    pub fn set(&self, value: V) {
        let bx = self.boxed();
        *bx.value.lock() = value;
        bx.post_set();
    }

    /// Mutates the value in place and publishes the change.
    pub fn modify(&self, f: impl FnOnce(&mut V)) {
        let bx = self.boxed();
        f(&mut bx.value.lock());
        bx.post_set();
    }

    /// The cell's change publisher.
    pub fn did_change(&self) -> Publisher {
        self.boxed().did_change.clone()
    }

    /// Returns a binding to this cell.
    ///
    /// The binding captures the inner box rather than the outer handle, so it
    /// stays valid across aggregate re-evaluations.
    pub fn binding(&self) -> Binding<V>
    where
        V: Clone,
    {
        let read = self.boxed();
        let write = Arc::clone(&read);
        Binding::new(
            move || read.value.lock().clone(),
            move |value| {
                *write.value.lock() = value;
                write.post_set();
            },
        )
    }
}

impl<V: StateValue> Clone for State<V> {
    fn clone(&self) -> Self {
        State {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<V: StateValue> DynamicProperty for State<V> {
    /// Adopts the previous instance's storage so state survives aggregate
    /// re-evaluation.
    fn update(&self, previous: Option<&Self>, _environment: &Environment) {
        if let Some(previous) = previous {
            let bx = previous.boxed();
            *self.storage.lock() = bx;
        }
    }

    fn did_change(&self) -> Option<Publisher> {
        Some(self.boxed().did_change.clone())
    }
}

impl<V: StateValue + fmt::Debug> fmt::Debug for State<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bx = self.boxed();
        let value = bx.value.lock();
        f.debug_tuple("State").field(&*value).finish()
    }
}

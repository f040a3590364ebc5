//! Observable model objects.

use crate::state::cell::StateValue;
use crate::state::publisher::Publisher;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A model object whose changes can be observed as a unit.
///
/// Implementors own a single [`Publisher`] and link the publishers of their
/// [`Published`] fields into it at construction, defusing the returned
/// cancellables because the object and its fields live and die together:
///
/// ```
/// # use perch::{ObservableObject, Published, Publisher};
/// struct Counter {
///     count: Published<i32>,
///     changed: Publisher,
/// }
///
/// impl Counter {
///     fn new() -> Counter {
///         let changed = Publisher::new();
///         let count = Published::new(0);
///         changed.link_to_upstream(count.publisher()).defuse();
///         Counter { count, changed }
///     }
/// }
///
/// impl ObservableObject for Counter {
///     fn did_change(&self) -> Publisher {
///         self.changed.clone()
///     }
/// }
/// ```
pub trait ObservableObject: Send + Sync + 'static {
    /// The publisher that fires when any part of the object changes.
    fn did_change(&self) -> Publisher;
}

/// A shared handle to an [`ObservableObject`].
///
/// The handle is what goes into state: storing an `Observed` in a
/// [`State`](crate::State) cell links the object's publisher into the cell,
/// so mutations of the object propagate as cell changes. Cloning shares the
/// object.
pub struct Observed<O: ObservableObject> {
    object: Arc<O>,
}

impl<O: ObservableObject> Observed<O> {
    pub fn new(object: O) -> Observed<O> {
        Observed {
            object: Arc::new(object),
        }
    }

    pub fn from_arc(object: Arc<O>) -> Observed<O> {
        Observed { object }
    }
}

impl<O: ObservableObject> Clone for Observed<O> {
    fn clone(&self) -> Self {
        Observed {
            object: Arc::clone(&self.object),
        }
    }
}

impl<O: ObservableObject> Deref for Observed<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.object
    }
}

impl<O: ObservableObject> StateValue for Observed<O> {
    fn embedded_publisher(&self) -> Option<Publisher> {
        Some(self.object.did_change())
    }
}

impl<O: ObservableObject + fmt::Debug> fmt::Debug for Observed<O> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Observed").field(&*self.object).finish()
    }
}

/// A single observable field of a model object.
///
/// Writes publish on the field's own stream; the enclosing object links that
/// stream into its object-level publisher (see [`ObservableObject`]).
pub struct Published<T: Send> {
    value: Mutex<T>,
    did_change: Publisher,
}

impl<T: Send> Published<T> {
    pub fn new(value: T) -> Published<T> {
        Published {
            value: Mutex::new(value),
            did_change: Publisher::new(),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.lock().clone()
    }

    /// Reads the current value in place.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.lock())
    }

    pub fn set(&self, value: T) {
        *self.value.lock() = value;
        self.did_change.send();
    }

    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.lock());
        self.did_change.send();
    }

    /// The field's own change stream.
    pub fn publisher(&self) -> &Publisher {
        &self.did_change
    }
}

impl<T: Send + fmt::Debug> fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Published").field(&*self.value.lock()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Settings {
        volume: Published<u8>,
        muted: Published<bool>,
        changed: Publisher,
    }

    impl Settings {
        fn new() -> Settings {
            let changed = Publisher::new();
            let volume = Published::new(50);
            let muted = Published::new(false);
            changed.link_to_upstream(volume.publisher()).defuse();
            changed.link_to_upstream(muted.publisher()).defuse();
            Settings {
                volume,
                muted,
                changed,
            }
        }
    }

    impl ObservableObject for Settings {
        fn did_change(&self) -> Publisher {
            self.changed.clone()
        }
    }

    #[test]
    fn field_writes_fire_the_object_publisher() {
        let settings = Observed::new(Settings::new());
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _obs = settings.did_change().observe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        settings.volume.set(30);
        settings.muted.set(true);
        scheduler::drain();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(settings.volume.get(), 30);
        assert!(settings.muted.get());
    }
}

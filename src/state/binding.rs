//! Two-way projections into state.

use std::fmt;
use std::sync::Arc;

/// A readable and writable reference to a value owned elsewhere.
///
/// A binding is a pair of closures, so it can point at a [`State`] cell
/// (see [`State::binding`]), at a component of one (see [`project`]), or at
/// anything else that can be read and written. Writes route through the
/// owner's write path, so they publish like any other mutation.
///
/// [`State`]: crate::State
/// [`State::binding`]: crate::State::binding
/// [`project`]: Binding::project
pub struct Binding<V> {
    read: Arc<dyn Fn() -> V + Send + Sync>,
    write: Arc<dyn Fn(V) + Send + Sync>,
}

impl<V: 'static> Binding<V> {
    /// Creates a binding from a getter and a setter.
    pub fn new(
        read: impl Fn() -> V + Send + Sync + 'static,
        write: impl Fn(V) + Send + Sync + 'static,
    ) -> Binding<V> {
        Binding {
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    /// Reads the current value.
    pub fn get(&self) -> V {
        (self.read)()
    }

    /// Writes a new value through the owner's write path.
    pub fn set(&self, value: V) {
        (self.write)(value)
    }

    /// Derives a binding to a component of the value.
    ///
    /// Writes read the whole parent value, apply the component write, and
    /// store the result back, so a projected write is a single parent write.
    pub fn project<U: 'static>(
        &self,
        get: impl Fn(&V) -> U + Send + Sync + 'static,
        set: impl Fn(&mut V, U) + Send + Sync + 'static,
    ) -> Binding<U> {
        let parent_read = self.clone();
        let parent_write = self.clone();
        Binding::new(
            move || get(&parent_read.get()),
            move |component| {
                let mut value = parent_write.get();
                set(&mut value, component);
                parent_write.set(value);
            },
        )
    }

    /// Wraps the binding so `action` runs after every write, with the value
    /// that was written. The write lands first, so the action may read the
    /// new value back through the binding.
    pub fn on_change(&self, action: impl Fn(&V) + Send + Sync + 'static) -> Binding<V>
    where
        V: Clone,
    {
        let read = self.clone();
        let write = self.clone();
        Binding::new(
            move || read.get(),
            move |value| {
                write.set(value.clone());
                action(&value);
            },
        )
    }
}

impl<V> Clone for Binding<V> {
    fn clone(&self) -> Self {
        Binding {
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<V> fmt::Debug for Binding<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Binding")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler;
    use crate::state::cell::State;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn projection_writes_through_the_parent() {
        let cell = State::new((1, "a".to_string()));
        let first = cell.binding().project(|pair| pair.0, |pair, n| pair.0 = n);

        assert_eq!(first.get(), 1);
        first.set(7);
        assert_eq!(cell.get(), (7, "a".to_string()));
        // Flush the delivery cycle queued by the first write.
        scheduler::drain();

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _obs = cell.did_change().observe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        first.set(8);
        scheduler::drain();
        assert_eq!(
            count.load(Ordering::SeqCst),
            1,
            "a projected write is one parent write"
        );
    }

    #[test]
    fn on_change_runs_with_the_written_value() {
        let cell = State::new(0);
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let sink = Arc::clone(&seen);
        let binding = cell
            .binding()
            .on_change(move |value: &usize| sink.store(*value, Ordering::SeqCst));

        binding.set(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn on_change_runs_after_the_write_lands() {
        let cell = State::new(0);
        let reader = cell.binding();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let sink = Arc::clone(&seen);
        let binding = cell
            .binding()
            .on_change(move |_: &usize| sink.store(reader.get(), Ordering::SeqCst));

        binding.set(5);
        assert_eq!(
            seen.load(Ordering::SeqCst),
            5,
            "reading back through the binding sees the new value"
        );
    }
}

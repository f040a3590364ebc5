//! Valueless change publishers.
//!
//! A [`Publisher`] is the primitive every state container is built on: it
//! owns a set of observer closures and a set of links to other publishers.
//! Sending never invokes observers inline; delivery is deferred to the UI
//! scheduler so that mutations made from inside an observer callback cannot
//! recurse.

use crate::scheduler;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Observation = Arc<dyn Fn() + Send + Sync>;

struct PublisherInner {
    /// The id for the next observation (ids are used to cancel observations,
    /// and their ordering is the delivery ordering).
    next_observation_id: u64,
    /// All current observations keyed by their id.
    observations: BTreeMap<u64, Observation>,
    /// Cancellables for the upstream links this publisher owns. Severed when
    /// the last observer goes away.
    links: Vec<Cancellable>,
    /// Human-readable tag for diagnostics.
    tag: Option<String>,
}

/// A type that produces valueless observations.
///
/// Cloning a `Publisher` clones a handle to the same stream; two handles
/// compare equal under [`Publisher::same_stream`]. Containers hold the owning
/// handle, links between publishers hold weak references plus explicit
/// [`Cancellable`]s, so parent/child observables cannot retain each other.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Mutex<PublisherInner>>,
}

impl Publisher {
    /// Creates a new independent publisher.
    pub fn new() -> Publisher {
        Publisher {
            inner: Arc::new(Mutex::new(PublisherInner {
                next_observation_id: 0,
                observations: BTreeMap::new(),
                links: Vec::new(),
                tag: None,
            })),
        }
    }

    /// Attaches a diagnostic tag.
    pub fn tagged(self, tag: impl Into<String>) -> Publisher {
        self.inner.lock().tag = Some(tag.into());
        self
    }

    /// Publishes a change to all observers.
    ///
    /// Enqueues exactly one notification cycle on the UI scheduler; observers
    /// are invoked when the queue is drained, never synchronously, not even
    /// when `send` is called from the UI thread itself. A cycle is scheduled
    /// even when there are currently no observers, so delivery ordering stays
    /// stable relative to other queued work.
    pub fn send(&self) {
        let weak = Arc::downgrade(&self.inner);
        scheduler::post(move || deliver(&weak));
    }

    /// Registers a handler to observe future events.
    ///
    /// Returns a handle that removes the observer when cancelled. When the
    /// last observer of a publisher is removed, the upstream links the
    /// publisher owns are severed as well. Dropping the last clone of the
    /// handle cancels it unless it has been [defused](Cancellable::defuse).
    pub fn observe(&self, closure: impl Fn() + Send + Sync + 'static) -> Cancellable {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_observation_id;
            inner.next_observation_id += 1;
            inner.observations.insert(id, Arc::new(closure));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Cancellable::new(move || {
            let Some(inner) = weak.upgrade() else { return };
            let links = {
                let mut inner = inner.lock();
                inner.observations.remove(&id);
                if inner.observations.is_empty() {
                    std::mem::take(&mut inner.links)
                } else {
                    Vec::new()
                }
            };
            // Cancelled outside the lock; link cancellation reaches into
            // other publishers.
            for link in links {
                link.cancel();
            }
        })
    }

    /// Links this publisher to an upstream: observations sent by `upstream`
    /// are forwarded to all observers of this publisher as well.
    ///
    /// Used when a container embeds another observable value and wants its
    /// own publisher to fire whenever the embedded value changes. The
    /// returned handle tears the link down; a clone of it is retained by this
    /// publisher so the link survives the caller dropping its copy.
    pub fn link_to_upstream(&self, upstream: &Publisher) -> Cancellable {
        let weak = Arc::downgrade(&self.inner);
        let cancellable = upstream.observe(move || {
            if let Some(inner) = weak.upgrade() {
                Publisher { inner }.send();
            }
        });
        self.inner.lock().links.push(cancellable.clone());
        cancellable
    }

    /// Links this publisher to a downstream: observations sent by this
    /// publisher are forwarded into `downstream`'s stream.
    ///
    /// The symmetric case of [`link_to_upstream`](Self::link_to_upstream),
    /// used when a parent object forwards its own notification into a child's
    /// stream.
    pub fn link_to_downstream(&self, downstream: &Publisher) -> Cancellable {
        downstream.link_to_upstream(self)
    }

    /// Whether two handles refer to the same underlying stream.
    pub fn same_stream(&self, other: &Publisher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observations.len()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Publisher::new()
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Publisher")
            .field("tag", &inner.tag)
            .field("observers", &inner.observations.len())
            .field("links", &inner.links.len())
            .finish()
    }
}

/// Runs one delivery cycle.
///
/// The observer list is snapshotted under the lock and invoked outside it, so
/// observers may freely register, cancel, or send.
fn deliver(weak: &Weak<Mutex<PublisherInner>>) {
    let Some(inner) = weak.upgrade() else { return };
    let observations: Vec<Observation> = inner.lock().observations.values().cloned().collect();
    drop(inner);
    for observation in observations {
        observation();
    }
}

struct CancelState {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    defused: AtomicBool,
}

impl Drop for CancelState {
    fn drop(&mut self) {
        if !self.defused.load(Ordering::Relaxed) {
            if let Some(action) = self.action.get_mut().take() {
                action();
            }
        }
    }
}

/// A handle that can cancel an observation or link.
///
/// Cancellation is synchronous and immediate: once `cancel` returns, the
/// observer will not fire for any subsequently enqueued send. Cancelling
/// twice is a no-op. Dropping the last clone cancels unless the handle was
/// [defused](Self::defuse).
#[derive(Clone)]
pub struct Cancellable {
    inner: Arc<CancelState>,
}

impl Cancellable {
    /// Wraps a cancellation action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Cancellable {
        Cancellable {
            inner: Arc::new(CancelState {
                action: Mutex::new(Some(Box::new(action))),
                defused: AtomicBool::new(false),
            }),
        }
    }

    /// A cancellable that does nothing.
    pub fn empty() -> Cancellable {
        Cancellable {
            inner: Arc::new(CancelState {
                action: Mutex::new(None),
                defused: AtomicBool::new(true),
            }),
        }
    }

    /// Runs the cancellation action if it hasn't run yet.
    pub fn cancel(&self) {
        let action = self.inner.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Disables cancel-on-drop for every clone of this handle.
    pub fn defuse(&self) {
        self.inner.defused.store(true, Ordering::Relaxed);
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pending = self.inner.action.lock().is_some();
        write!(f, "Cancellable {{ pending: {} }}", pending)
    }
}

//! The UI-thread job queue.
//!
//! All state mutation, publisher delivery, and layout negotiation happens on
//! a single cooperative UI thread driven by the host backend's native event
//! loop. Publishers never invoke observers inline; [`Publisher::send`] posts
//! a delivery job here instead, so a chain of mutations triggered from within
//! an observer callback is processed breadth-first rather than recursing.
//!
//! The queue is owned by the thread that uses it: the thread that constructs
//! views and drives the backend event loop *is* the UI thread, and its jobs
//! live in a thread-local queue that requires no locking. Code running on
//! other threads must go through [`handle`], which produces a [`RemoteHandle`]
//! whose posts are pulled into the queue at the start of the next [`drain`].
//! That hand-off is the only supported way to reach the UI thread from
//! elsewhere.
//!
//! Backends are expected to call [`drain`] from their event loop whenever
//! jobs may be pending; tests call it directly to pump deferred deliveries.
//!
//! [`Publisher::send`]: crate::state::Publisher::send

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::cell::RefCell;
use std::collections::VecDeque;

type Job = Box<dyn FnOnce()>;
type RemoteJob = Box<dyn FnOnce() + Send>;

struct Queue {
    jobs: RefCell<VecDeque<Job>>,
    inbox_send: Sender<RemoteJob>,
    inbox_recv: Receiver<RemoteJob>,
}

thread_local! {
    static QUEUE: Queue = {
        let (inbox_send, inbox_recv) = channel::unbounded();
        Queue {
            jobs: RefCell::new(VecDeque::new()),
            inbox_send,
            inbox_recv,
        }
    };
}

/// Posts a job to the current thread's queue.
///
/// The job will not run until the next [`drain`]; calling this from within a
/// draining job appends to the same cycle (FIFO).
pub fn post(job: impl FnOnce() + 'static) {
    QUEUE.with(|queue| queue.jobs.borrow_mut().push_back(Box::new(job)));
}

/// Runs queued jobs in FIFO order until the queue is empty, and returns the
/// number of jobs that ran.
///
/// Jobs posted while draining (including from other threads, via a
/// [`RemoteHandle`]) run in the same call.
pub fn drain() -> usize {
    let mut ran = 0;
    loop {
        pull_inbox();
        let job = QUEUE.with(|queue| queue.jobs.borrow_mut().pop_front());
        match job {
            Some(job) => {
                job();
                ran += 1;
            }
            None => break,
        }
    }
    ran
}

/// Moves remotely posted jobs into the local queue.
fn pull_inbox() {
    QUEUE.with(|queue| loop {
        match queue.inbox_recv.try_recv() {
            Ok(job) => queue.jobs.borrow_mut().push_back(job),
            Err(TryRecvError::Empty) => break,
            // We hold a sender for the queue's whole lifetime.
            Err(TryRecvError::Disconnected) => unreachable!("scheduler inbox disconnected"),
        }
    });
}

/// Returns a handle that posts jobs to *this* thread's queue from any thread.
///
/// Must be called on the UI thread; the handle may then be moved freely.
pub fn handle() -> RemoteHandle {
    QUEUE.with(|queue| RemoteHandle {
        sender: queue.inbox_send.clone(),
    })
}

/// A cloneable, sendable handle to a UI thread's job queue.
#[derive(Clone)]
pub struct RemoteHandle {
    sender: Sender<RemoteJob>,
}

impl RemoteHandle {
    /// Posts a job; it runs during the owning thread's next [`drain`].
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        // The receiver lives in a thread local for the life of the thread,
        // so the only way this fails is posting to a dead UI thread.
        let _ = self.sender.send(Box::new(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fifo_order_and_nested_posts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&log);
        post(move || {
            a.borrow_mut().push(1);
            let inner = Rc::clone(&a);
            post(move || inner.borrow_mut().push(3));
        });
        let b = Rc::clone(&log);
        post(move || b.borrow_mut().push(2));

        assert!(log.borrow().is_empty(), "jobs must not run before drain");
        assert_eq!(drain(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn remote_handle_reaches_owning_thread() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = handle();
        let remote_counter = Arc::clone(&counter);
        let thread = std::thread::spawn(move || {
            handle.post(move || {
                remote_counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        thread.join().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        drain();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

use crate::{panic_message, Error, Outcome};
use parking_lot::Mutex;
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

type SettledListener<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;
type CancelListener = Box<dyn FnOnce() + Send>;

/// A single-assignment channel that can have many listeners.
///
/// The first call to [`deliver_success`](Self::deliver_success) or
/// [`deliver_failure`](Self::deliver_failure) settles the broadcaster; every
/// later call is ignored. Completion listeners registered before settlement
/// run once, in registration order, on the settling thread. Listeners
/// registered afterwards run immediately on the registering thread.
///
/// Cancellation is a separate, one-shot signal. The broadcaster never fails
/// itself on cancellation; whoever listens for it decides what to do.
///
/// Cloning yields another handle to the same channel.
///
/// # Examples
///
/// ```
/// use messenger_promise::Broadcaster;
/// use std::thread;
///
/// let messenger = Broadcaster::<String>::new();
/// let producer = messenger.clone();
/// let task = thread::spawn(move || producer.deliver_success("Hi".into()));
/// task.join().expect("The producer thread has panicked.");
///
/// messenger.on_settled(|outcome| assert_eq!(outcome.as_deref().ok(), Some("Hi")));
/// assert!(!messenger.deliver_success("ignored".into()));
/// ```
pub struct Broadcaster<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    outcome: Option<Arc<Outcome<T>>>,
    settled_listeners: Vec<SettledListener<T>>,
    cancel_requested: bool,
    cancel_listeners: Vec<CancelListener>,
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                outcome: None,
                settled_listeners: Vec::new(),
                cancel_requested: false,
                cancel_listeners: Vec::new(),
            })),
        }
    }

    /// Settle with a value. Returns `false` if already settled.
    pub fn deliver_success(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn deliver_failure(&self, err: Error) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            tracing::trace!(success = outcome.is_ok(), "late settlement ignored");
            return false;
        }
        tracing::trace!(success = outcome.is_ok(), "settled");
        let outcome = Arc::new(outcome);
        inner.outcome = Some(outcome.clone());
        let listeners = std::mem::take(&mut inner.settled_listeners);
        // Cancellation can no longer change anything once settled.
        inner.cancel_listeners.clear();
        drop(inner);

        for listener in listeners {
            run_guarded("settled", || listener(&outcome));
        }
        true
    }

    /// Register a listener for the final outcome.
    pub fn on_settled<F>(&self, listener: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        match inner.outcome.clone() {
            Some(outcome) => {
                drop(inner);
                run_guarded("settled", || listener(&outcome));
            }
            None => inner.settled_listeners.push(Box::new(listener)),
        }
    }

    /// Register a listener for the cancellation signal.
    ///
    /// Runs immediately if cancellation was already requested. Dropped
    /// without running if the broadcaster settled first.
    pub fn on_cancel_requested<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.cancel_requested {
            drop(inner);
            run_guarded("cancel", listener);
        } else if inner.outcome.is_none() {
            inner.cancel_listeners.push(Box::new(listener));
        }
    }

    /// Request cancellation. Idempotent, and a no-op after settlement.
    pub fn request_cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.cancel_requested || inner.outcome.is_some() {
            return;
        }
        inner.cancel_requested = true;
        let listeners = std::mem::take(&mut inner.cancel_listeners);
        drop(inner);

        tracing::debug!(listeners = listeners.len(), "cancellation requested");
        for listener in listeners {
            run_guarded("cancel", listener);
        }
    }

    pub(crate) fn downgrade(&self) -> WeakBroadcaster<T> {
        WeakBroadcaster { inner: Arc::downgrade(&self.inner) }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.lock().cancel_requested
    }
}

/// Run one listener. A panic is logged and swallowed so the listeners
/// after it still run and the panic never reaches the settling caller.
fn run_guarded<F: FnOnce()>(kind: &'static str, listener: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(listener)) {
        let message = panic_message(payload.as_ref());
        tracing::warn!(%message, kind, "broadcaster listener panicked");
    }
}

/// Handle that does not keep a broadcaster alive. Used by cancellation
/// listeners, which would otherwise form reference cycles with the
/// listeners they fan out to.
pub(crate) struct WeakBroadcaster<T> {
    inner: Weak<Mutex<Inner<T>>>,
}

impl<T> WeakBroadcaster<T> {
    pub(crate) fn upgrade(&self) -> Option<Broadcaster<T>> {
        self.inner.upgrade().map(|inner| Broadcaster { inner })
    }
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Broadcaster")
            .field("settled", &inner.outcome.is_some())
            .field("cancel_requested", &inner.cancel_requested)
            .field("waiting", &inner.settled_listeners.len())
            .finish()
    }
}

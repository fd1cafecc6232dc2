use crate::{broadcaster::Broadcaster, Error, Outcome};
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

/// Handle to a value that settles once, in the future.
///
/// Every clone shares the same [`Broadcaster`]. Callbacks passed to
/// [`then`](Self::then), [`eventually`](Self::eventually) and
/// [`excuse`](Self::excuse) run at most once, on the thread that settles the
/// upstream promise. A callback that returns `Err` or panics fails the
/// promise it produces; nothing is thrown back at the caller.
///
/// # Examples
///
/// ```
/// use messenger_promise::{Error, Promise};
///
/// let parsed = Promise::resolved("42")
///     .then(|s| s.parse::<u32>().map_err(Error::rejected))
///     .excuse(|_| Ok(0));
/// let value = futures::executor::block_on(async { parsed.await });
/// assert_eq!(value.unwrap(), 42);
/// ```
pub struct Promise<T> {
    pub(crate) broadcaster: Broadcaster<T>,
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Create a promise settled by `operator`.
    ///
    /// The operator receives the promise's broadcaster and may settle it
    /// now, later from another thread, or never. It may also register a
    /// cancellation listener to learn when the consumer loses interest.
    pub fn new<F>(operator: F) -> Self
    where
        F: FnOnce(Broadcaster<T>),
    {
        let broadcaster = Broadcaster::new();
        let messenger = broadcaster.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || operator(messenger))) {
            broadcaster.deliver_failure(Error::from_panic(payload));
        }
        Self { broadcaster }
    }

    pub fn resolved(value: T) -> Self {
        let broadcaster = Broadcaster::new();
        broadcaster.deliver_success(value);
        Self { broadcaster }
    }

    pub fn rejected(err: Error) -> Self {
        let broadcaster = Broadcaster::new();
        broadcaster.deliver_failure(err);
        Self { broadcaster }
    }

    /// Ask whoever produces this promise to abandon it.
    ///
    /// Purely a signal: the outcome only changes if a cancellation listener
    /// settles the broadcaster. Safe to call repeatedly or after settlement.
    pub fn cancel(&self) {
        self.broadcaster.request_cancel();
    }

    /// Transform the success value. Failures pass through untouched.
    pub fn then<U, F>(&self, transform: F) -> Promise<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        Promise::new(|next: Broadcaster<U>| {
            self.broadcaster.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    let value = value.clone();
                    settle_with(&next, move || transform(value));
                }
                Err(err) => {
                    next.deliver_failure(err.clone());
                }
            });
        })
    }

    /// Like [`then`](Self::then), but the transform produces another
    /// promise whose outcome becomes this one's.
    pub fn eventually<U, F>(&self, transform: F) -> Promise<U>
    where
        T: Clone,
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        Promise::new(|next: Broadcaster<U>| {
            self.broadcaster.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    let value = value.clone();
                    match panic::catch_unwind(AssertUnwindSafe(move || transform(value))) {
                        Ok(inner) => {
                            inner.broadcaster.on_settled(move |outcome| relay(&next, outcome));
                        }
                        Err(payload) => {
                            next.deliver_failure(Error::from_panic(payload));
                        }
                    }
                }
                Err(err) => {
                    next.deliver_failure(err.clone());
                }
            });
        })
    }

    /// Recover from a failure. Success values pass through untouched.
    pub fn excuse<F>(&self, handler: F) -> Promise<T>
    where
        T: Clone,
        F: FnOnce(Error) -> Result<T, Error> + Send + 'static,
    {
        Promise::new(|next: Broadcaster<T>| {
            self.broadcaster.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    next.deliver_success(value.clone());
                }
                Err(err) => {
                    let err = err.clone();
                    settle_with(&next, move || handler(err));
                }
            });
        })
    }
}

impl Promise<()> {
    /// An already-succeeded promise with no value.
    pub fn empty() -> Self {
        Promise::resolved(())
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self { broadcaster: self.broadcaster.clone() }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Promise").field(&self.broadcaster).finish()
    }
}

fn settle_with<U, F>(next: &Broadcaster<U>, callback: F)
where
    F: FnOnce() -> Outcome<U>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(value)) => next.deliver_success(value),
        Ok(Err(err)) => next.deliver_failure(err),
        Err(payload) => next.deliver_failure(Error::from_panic(payload)),
    };
}

fn relay<U: Clone>(next: &Broadcaster<U>, outcome: &Outcome<U>) {
    match outcome {
        Ok(value) => next.deliver_success(value.clone()),
        Err(err) => next.deliver_failure(err.clone()),
    };
}

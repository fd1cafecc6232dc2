//! Aggregate-all: wait for every member promise.
//!
//! The aggregate succeeds with the member values in input order, however
//! the members happen to complete. The first member failure fails the
//! aggregate; later member outcomes change nothing. Cancelling the
//! aggregate asks every member to cancel, then fails with
//! [`Error::Cancelled`].
use crate::{broadcaster::WeakBroadcaster, Error, Promise};
use parking_lot::Mutex;
use std::sync::Arc;

struct Collected<T> {
    results: Vec<Option<T>>,
    remaining: usize,
    failure: Option<Error>,
}

impl<T> Collected<T> {
    fn new(len: usize) -> Self {
        Self {
            results: (0..len).map(|_| None).collect(),
            remaining: len,
            failure: None,
        }
    }

    /// Fill slot `index`. Returns the full result set once the last slot
    /// is filled, unless a failure got there first.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        let slot = &mut self.results[index];
        if slot.is_some() {
            return None;
        }
        *slot = Some(value);
        self.remaining -= 1;
        if self.remaining > 0 || self.failure.is_some() {
            return None;
        }
        Some(self.results.iter_mut().filter_map(Option::take).collect())
    }

    /// Latch the first failure. Returns `false` if one was already latched.
    fn fail(&mut self, err: &Error) -> bool {
        if self.failure.is_some() {
            return false;
        }
        self.failure = Some(err.clone());
        true
    }
}

/// Combine `promises` into a promise of all their values, in input order.
///
/// An empty input succeeds immediately with an empty `Vec`.
///
/// # Examples
///
/// ```
/// use messenger_promise::{when_all, Promise};
///
/// let all = when_all(vec![Promise::resolved("a"), Promise::resolved("b")]);
/// let values = futures::executor::block_on(async { all.await }).unwrap();
/// assert_eq!(values, ["a", "b"]);
/// ```
pub fn when_all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |messenger| {
        if promises.is_empty() {
            messenger.deliver_success(Vec::new());
            return;
        }

        let collected = Arc::new(Mutex::new(Collected::new(promises.len())));
        for (index, promise) in promises.iter().enumerate() {
            let collected = collected.clone();
            let messenger = messenger.clone();
            promise.broadcaster.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    let results = collected.lock().fill(index, value.clone());
                    if let Some(results) = results {
                        tracing::debug!(members = results.len(), "all members resolved");
                        messenger.deliver_success(results);
                    }
                }
                Err(err) => {
                    let first = collected.lock().fail(err);
                    if first {
                        tracing::debug!(member = index, error = %err, "member failed, aggregate rejected");
                        messenger.deliver_failure(err.clone());
                    }
                }
            });
        }

        // A failure seen while wiring already settled the aggregate.
        if collected.lock().failure.is_some() {
            return;
        }

        let members: Vec<WeakBroadcaster<T>> = promises.iter().map(|p| p.broadcaster.downgrade()).collect();
        let aggregate = messenger.downgrade();
        messenger.on_cancel_requested(move || {
            tracing::debug!(members = members.len(), "cancelling aggregate members");
            for member in members.iter().filter_map(WeakBroadcaster::upgrade) {
                member.request_cancel();
            }
            if let Some(aggregate) = aggregate.upgrade() {
                aggregate.deliver_failure(Error::Cancelled);
            }
        });
    })
}

use crate::{Outcome, Promise};
use parking_lot::Mutex;
use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

/// Future returned by awaiting a [`Promise`].
///
/// Resolves to the promise's [`Outcome`]. Dropping it leaves the promise
/// untouched; call [`Promise::cancel`] to ask the producer to stop.
///
/// # Examples
///
/// ```
/// use messenger_promise::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let promise = Promise::new(|messenger| {
///     thread::spawn(move || messenger.deliver_success(String::from("🍓")));
/// });
/// let task = thread::spawn(move || block_on(async {
///     assert_eq!(promise.await.unwrap(), "🍓");
/// }));
/// task.join().expect("The task thread has panicked");
/// ```
pub struct Settlement<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

impl<T> Future for Settlement<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock();
        match inner.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Settlement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement")
            .field("ready", &self.inner.lock().outcome.is_some())
            .finish()
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = Settlement<T>;

    fn into_future(self) -> Self::IntoFuture {
        let inner = Arc::new(Mutex::new(Inner { outcome: None, waker: None }));
        let slot = inner.clone();
        self.broadcaster.on_settled(move |outcome| {
            let mut slot = slot.lock();
            slot.outcome = Some(outcome.clone());
            if let Some(waker) = slot.waker.take() {
                drop(slot);
                waker.wake()
            }
        });
        Settlement { inner }
    }
}

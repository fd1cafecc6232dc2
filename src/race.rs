//! Aggregate-first: settle with whichever member gets there first.
use crate::{broadcaster::WeakBroadcaster, Error, Promise};
use parking_lot::RwLock;
use std::sync::Arc;

/// Race `promises` against each other.
///
/// The first member to succeed wins. A member failure fails the race,
/// unless the race was already cancelled, in which case it is dropped and
/// the race keeps its [`Error::Cancelled`] outcome. Cancelling the race asks
/// every member to cancel. With no members the race stays pending until
/// cancelled.
///
/// # Examples
///
/// ```
/// use messenger_promise::{when_any, Promise};
///
/// let never = Promise::<u32>::new(|_| {});
/// let first = when_any([never, Promise::resolved(7)]);
/// assert_eq!(futures::executor::block_on(async { first.await }).unwrap(), 7);
/// ```
pub fn when_any<T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    Promise::new(move |messenger| {
        let cancelled = Arc::new(RwLock::new(false));
        for promise in &promises {
            let messenger = messenger.clone();
            let cancelled = cancelled.clone();
            promise.broadcaster.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    messenger.deliver_success(value.clone());
                }
                Err(err) => {
                    if *cancelled.read() {
                        tracing::trace!(error = %err, "member failed after race was cancelled");
                        return;
                    }
                    messenger.deliver_failure(err.clone());
                }
            });
        }

        let members: Vec<WeakBroadcaster<T>> = promises.iter().map(|p| p.broadcaster.downgrade()).collect();
        let race = messenger.downgrade();
        messenger.on_cancel_requested(move || {
            *cancelled.write() = true;
            tracing::debug!(members = members.len(), "race cancelled");
            for member in members.iter().filter_map(WeakBroadcaster::upgrade) {
                member.request_cancel();
            }
            if let Some(race) = race.upgrade() {
                race.deliver_failure(Error::Cancelled);
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::when_any;
    use crate::{Broadcaster, Error, Promise};
    use parking_lot::Mutex;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::thread;

    fn pending<T: Send + Sync + 'static>() -> (Promise<T>, Broadcaster<T>) {
        let mut messenger = None;
        let promise = Promise::new(|m| messenger = Some(m));
        (promise, messenger.expect("operator runs synchronously"))
    }

    fn capture<T: Clone + Send + Sync + 'static>(promise: &Promise<T>) -> Arc<Mutex<Option<Result<T, Error>>>> {
        let slot = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        promise.broadcaster.on_settled(move |outcome| *sink.lock() = Some(outcome.clone()));
        slot
    }

    #[test]
    fn test_first_success_wins() {
        let (slow, slow_messenger) = pending();
        let (fast, fast_messenger) = pending();
        let race = when_any([slow, fast]);
        let out = capture(&race);

        fast_messenger.deliver_success("fast");
        slow_messenger.deliver_success("slow");
        assert_eq!(out.lock().clone().unwrap().unwrap(), "fast");
    }

    #[test]
    fn test_later_failure_is_ignored() {
        let (a, a_messenger) = pending::<i32>();
        let (b, b_messenger) = pending::<i32>();
        let race = when_any([a, b]);
        a_messenger.deliver_success(1);
        b_messenger.deliver_failure(Error::msg("late"));
        assert_eq!(capture(&race).lock().clone().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_member_failure_fails_race() {
        let (a, _a_messenger) = pending::<i32>();
        let race = when_any([a, Promise::rejected(Error::msg("broken"))]);
        assert_eq!(
            capture(&race).lock().clone().unwrap().unwrap_err().to_string(),
            "promise was rejected: broken"
        );
    }

    #[test]
    fn test_cancel_fails_race_and_reaches_every_member_once() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let members: Vec<_> = (0..4)
            .map(|_| {
                let cancels = cancels.clone();
                Promise::<i32>::new(move |messenger| {
                    let m = messenger.clone();
                    messenger.on_cancel_requested(move || {
                        cancels.fetch_add(1, Ordering::SeqCst);
                        m.deliver_failure(Error::msg("aborted"));
                    });
                })
            })
            .collect();
        let race = when_any(members.clone());
        let out = capture(&race);
        race.cancel();
        race.cancel();

        assert_eq!(cancels.load(Ordering::SeqCst), 4);
        // Member failures caused by the cancel do not replace it.
        assert!(out.lock().clone().unwrap().unwrap_err().is_cancelled());
        for member in &members {
            assert!(capture(member).lock().clone().unwrap().is_err());
        }
    }

    #[test]
    fn test_empty_race_waits_for_cancel() {
        let race = when_any(Vec::<Promise<i32>>::new());
        let out = capture(&race);
        assert!(out.lock().is_none());
        race.cancel();
        assert!(out.lock().clone().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_failure_after_cancel_keeps_cancellation() {
        let (member, messenger) = pending::<i32>();
        let race = when_any([member]);
        let out = capture(&race);

        race.cancel();
        assert!(messenger.is_cancellation_requested());
        messenger.deliver_failure(Error::msg("natural"));

        assert!(out.lock().clone().unwrap().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_concurrent_cancel_and_failure_settle_once() {
        for _ in 0..50 {
            let (member, messenger) = pending::<i32>();
            let race = when_any([member]);
            let settled = Arc::new(AtomicUsize::new(0));
            let s = settled.clone();
            race.broadcaster.on_settled(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            });
            let out = capture(&race);
            let canceller = {
                let race = race.clone();
                thread::spawn(move || race.cancel())
            };
            let failer = thread::spawn(move || {
                messenger.deliver_failure(Error::msg("natural"));
            });
            canceller.join().expect("The canceller thread has panicked");
            failer.join().expect("The failer thread has panicked");

            assert_eq!(settled.load(Ordering::SeqCst), 1);
            let err = out.lock().clone().expect("race settled").unwrap_err();
            assert!(err.is_cancelled() || err.to_string() == "promise was rejected: natural");
        }
    }
}

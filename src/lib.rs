//! Single-assignment promises.
//!
//! A [`Promise`] wraps a [`Broadcaster`]: a channel that settles exactly once,
//! with a success value or an [`Error`], and replays that outcome to every
//! listener, whether it registered before or after settlement. Promises chain
//! with [`Promise::then`], [`Promise::eventually`] and [`Promise::excuse`],
//! aggregate with [`when_all`] and [`when_any`], and carry a cooperative
//! cancellation signal.
//!
//! No thread or executor is owned here. Callbacks run on whichever thread
//! settles the upstream broadcaster.
//!
//! # Examples
//!
//! ```
//! use messenger_promise::{when_all, Promise};
//! use std::thread;
//!
//! let slow = Promise::new(|messenger| {
//!     thread::spawn(move || {
//!         messenger.deliver_success(2);
//!     });
//! });
//! let doubled = when_all([Promise::resolved(1), slow])
//!     .then(|values| Ok(values.iter().map(|v| v * 2).collect::<Vec<_>>()));
//!
//! let values = futures::executor::block_on(async { doubled.await }).unwrap();
//! assert_eq!(values, vec![2, 4]);
//! ```
use std::{any::Any, fmt, sync::Arc};

mod aggregate;
mod broadcaster;
mod promise;
mod race;
mod settlement;

pub use aggregate::when_all;
pub use broadcaster::Broadcaster;
pub use promise::Promise;
pub use race::when_any;
pub use settlement::Settlement;

/// The settled value a listener observes.
pub type Outcome<T> = Result<T, Error>;

/// Failure delivered through a [`Broadcaster`].
#[derive(Clone, thiserror::Error)]
pub enum Error {
    /// The promise was abandoned after a cancellation request.
    #[error("promise was cancelled")]
    Cancelled,
    /// A producer or a callback rejected the promise.
    #[error("promise was rejected: {0}")]
    Rejected(Arc<dyn std::error::Error + Send + Sync>),
    /// A callback panicked while producing the outcome.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl Error {
    /// Wrap an arbitrary error as a rejection.
    pub fn rejected<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Rejected(Arc::new(err))
    }

    /// Rejection carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Rejected(Arc::new(Message(message.into())))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        tracing::warn!(%message, "promise callback panicked");
        Error::Panicked(message)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Cancelled => f.write_str("Cancelled"),
            Error::Rejected(err) => f.debug_tuple("Rejected").field(&err.to_string()).finish(),
            Error::Panicked(message) => f.debug_tuple("Panicked").field(message).finish(),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Cancelled.to_string(), "promise was cancelled");
        assert_eq!(Error::msg("boom").to_string(), "promise was rejected: boom");
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::msg("boom").is_cancelled());
    }

    #[test]
    fn test_error_from_panic_payload() {
        let err = Error::from_panic(Box::new("static"));
        assert!(matches!(err, Error::Panicked(ref m) if m == "static"));
        let err = Error::from_panic(Box::new(String::from("owned")));
        assert!(matches!(err, Error::Panicked(ref m) if m == "owned"));
        let err = Error::from_panic(Box::new(7_u8));
        assert!(matches!(err, Error::Panicked(_)));
    }
}

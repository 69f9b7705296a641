//! Cancellable handles for coordinated refreshes.

use std::future::Future;

use berth_common::error::{BerthError, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a coordinated operation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The result was the most recent request of its class and was committed.
    Committed(T),
    /// The operation was cancelled or a newer request replaced it. Nothing
    /// was committed; the coordinator still holds the last good value.
    Superseded,
}

impl<T> Outcome<T> {
    /// Returns the committed value, if any.
    #[must_use]
    pub fn committed(self) -> Option<T> {
        match self {
            Self::Committed(value) => Some(value),
            Self::Superseded => None,
        }
    }

    /// Whether the result was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Maps the committed value.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Committed(value) => Outcome::Committed(f(value)),
            Self::Superseded => Outcome::Superseded,
        }
    }
}

/// Handle to a refresh running in the background.
///
/// Dropping the handle detaches the refresh; it still commits its result
/// if nothing supersedes it. Call [`RefreshHandle::cancel`] to stop it.
#[derive(Debug)]
pub struct RefreshHandle<T> {
    token: CancellationToken,
    task: JoinHandle<Result<Outcome<T>>>,
}

impl<T: Send + 'static> RefreshHandle<T> {
    pub(crate) fn spawn<F>(token: CancellationToken, future: F) -> Self
    where
        F: Future<Output = Result<Outcome<T>>> + Send + 'static,
    {
        Self {
            token,
            task: tokio::spawn(future),
        }
    }

    /// Cancels the refresh. The result, if it still arrives, is discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the refresh was cancelled, directly or by a newer request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the refresh to finish.
    ///
    /// Cancellation is reported as [`Outcome::Superseded`], never as an error.
    ///
    /// # Errors
    ///
    /// Returns the refresh error, or `BerthError::Unknown` if the refresh
    /// task panicked.
    pub async fn join(self) -> Result<Outcome<T>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(Outcome::Superseded),
            Err(e) => Err(BerthError::Unknown {
                message: format!("refresh task failed: {e}"),
            }),
        }
    }
}

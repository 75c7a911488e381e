//! Cancellation and deadline propagation.
//!
//! Every collection operation takes a [`Context`]. Backends race their
//! network futures against it with [`Context::run`] and poll
//! [`Context::check`] between streamed rows and written chunks, so a
//! cancelled caller stops consuming rows promptly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Cancellation token plus optional deadline.
///
/// Cloning is cheap; clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// A context bound to an existing cancellation token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns a copy whose deadline is at most `timeout` from now.
    #[must_use]
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Returns a copy whose deadline is at most `deadline`.
    #[must_use]
    pub fn deadline(&self, deadline: Instant) -> Self {
        let deadline = self.deadline.map_or(deadline, |d| d.min(deadline));
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns a child context cancelled together with this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once [`Context::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails if the context was cancelled or its deadline passed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`].
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the context is cancelled or the
    /// deadline elapses, whichever happens first.
    ///
    /// The future is dropped when the context wins the race.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, [`Error::Cancelled`] or
    /// [`Error::DeadlineExceeded`].
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let sleep = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled),
            () = sleep => Err(Error::DeadlineExceeded),
            out = fut => out,
        }
    }
}

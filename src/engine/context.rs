use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::EngineError;
use crate::store::StoreError;

/// Per-request cancellation and deadline, passed into every engine call.
///
/// Every store call is abandoned as soon as the request is cancelled or its
/// deadline passes. A store must keep its writes whole when the call is
/// dropped: `MemoryStore` abandons a write that is still waiting for its
/// room, and finishes one that has already reached the journal.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fails if the request has already been cancelled or is past its deadline.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::TimedOut);
        }
        Ok(())
    }

    /// Race a store call against cancellation and the deadline.
    async fn race<T, F>(&self, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.check()?;
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(EngineError::Cancelled),
            _ = expired => Err(EngineError::TimedOut),
            result = call => result.map_err(EngineError::from),
        }
    }

    /// Run a read-only store call, dropping it if the request goes away first.
    pub(crate) async fn read<T, F>(&self, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.race(call).await
    }

    /// Run a mutating store call, dropping it if the request goes away first.
    ///
    /// A write that had already reached the journal when the request went
    /// away still lands, even though the caller sees `Cancelled`/`TimedOut`.
    pub(crate) async fn write<T, F>(&self, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.race(call).await
    }
}

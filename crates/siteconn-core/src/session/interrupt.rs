use std::future::{pending, Future};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};

/// Caller-supplied cancellation signal and deadline for blocking session
/// operations (connect, init and its retry delay, id resolution).
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// Never interrupts.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self::none().token(token)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::none().deadline(deadline)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Drive `fut` unless cancellation or the deadline comes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(SessionError::Cancelled),
            _ = expired => Err(SessionError::DeadlineExceeded),
            result = fut => result,
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

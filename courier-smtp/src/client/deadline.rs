//! A single wall-clock limit shared by every step of an SMTP session.

use std::time::Duration;

use tokio::time::Instant;

use super::error::{ClientError, Result};

/// Far enough in the future to never fire, used when `Instant` arithmetic
/// would overflow.
const FOREVER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The point in time at which a session is abandoned.
///
/// The deadline is fixed when the session starts and is consulted before
/// every suspension point (dial, TLS handshake, each read and write). It is
/// never extended, so a peer that answers every prompt just in time still
/// fails once the total budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    total: Duration,
}

impl Deadline {
    /// Starts a deadline `total` from now.
    #[must_use]
    pub fn after(total: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(total)
            .unwrap_or_else(|| now + FOREVER.min(total));

        Self { at, total }
    }

    /// Time left before the deadline fires, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The budget this deadline was created with.
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Runs `future` until it completes or the deadline fires.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Timeout` if the deadline fires first, otherwise
    /// whatever `future` returns.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout_at(self.at, future)
            .await
            .map_err(|_| ClientError::Timeout(self.total))?
    }
}

//! Cancellation and deadlines for a single build.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a build stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
  Cancelled,
  DeadlineExceeded,
}

impl fmt::Display for Interrupt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Interrupt::Cancelled => write!(f, "cancelled"),
      Interrupt::DeadlineExceeded => write!(f, "deadline exceeded"),
    }
  }
}

/// Cancellation token plus optional deadline, threaded through every step.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
  token: CancellationToken,
  deadline: Option<Instant>,
}

impl BuildContext {
  pub fn new(token: CancellationToken) -> Self {
    Self { token, deadline: None }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.deadline = Some(Instant::now() + timeout);
    self
  }

  /// Returns the interrupt that already happened, if any.
  pub fn check(&self) -> Result<(), Interrupt> {
    if self.token.is_cancelled() {
      return Err(Interrupt::Cancelled);
    }
    if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      return Err(Interrupt::DeadlineExceeded);
    }
    Ok(())
  }

  /// Completes when the build is cancelled or its deadline passes.
  pub async fn interrupted(&self) -> Interrupt {
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          _ = self.token.cancelled() => Interrupt::Cancelled,
          _ = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
        }
      }
      None => {
        self.token.cancelled().await;
        Interrupt::Cancelled
      }
    }
  }
}

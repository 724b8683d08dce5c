//! Admission control and graceful shutdown.
//!
//! [`Lifecycle`] counts in-flight calls and owns the server-wide
//! [`CancellationToken`] that every call token derives from. Shutdown runs in
//! three phases:
//!
//! 1. refuse new calls (`Unavailable`);
//! 2. wait up to the configured timeout for in-flight calls to drain;
//! 3. cancel the token, which unblocks whatever is still running with
//!    `Cancelled`.

use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use quadrant_core::Fault;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Lifecycle {
    in_flight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl Lifecycle {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Admits one call.
    ///
    /// # Errors
    ///
    /// `Unavailable` once shutdown has started.
    pub fn enter(&self) -> Result<(), Fault> {
        if self.is_shutting_down() {
            return Err(shutting_down());
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        // Shutdown may have started between the check and the increment; the
        // drain loop must never miss a call it admitted.
        if self.is_shutting_down() {
            self.leave();
            return Err(shutting_down());
        }
        Ok(())
    }

    /// Releases a call admitted by [`enter`](Self::enter).
    pub fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Parent of every call token.
    pub const fn token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Drains and then cancels in-flight calls. Returns how many calls were
    /// still running when the drain window closed.
    pub async fn shutdown(&self) -> usize {
        // === Phase 0: Stop accepting new calls ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new calls");
        self.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.in_flight());
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.in_flight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        let abandoned = match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained");
                0
            }
            Err(_) => {
                let remaining = self.in_flight();
                #[cfg(feature = "tracing")]
                tracing::warn!("Graceful drain timed out ({} calls still active)", remaining);
                remaining
            }
        };

        // === Phase 2: Cancel whatever is left ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.shutdown_token.cancel();

        abandoned
    }
}

fn shutting_down() -> Fault {
    Fault::Unavailable {
        reason: "Service is shutting down".to_string(),
    }
}

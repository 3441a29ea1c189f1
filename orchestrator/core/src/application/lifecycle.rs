// Copyright (c) 2026 homelab-paas contributors
// SPDX-License-Identifier: AGPL-3.0
//! Process lifecycle signal shared by every background loop.
//!
//! Open until [`Lifecycle::close`] is called (normally from the shutdown
//! signal handler). Loops check [`Lifecycle::is_open`] between iterations and
//! use [`Lifecycle::sleep`] so a pending wait ends as soon as the process
//! begins shutting down.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Resolves once the lifecycle is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration` or until close, whichever comes first.
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.token.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_observed_by_clones() {
        let lifecycle = Lifecycle::new();
        let observer = lifecycle.clone();
        assert!(observer.is_open());

        lifecycle.close();
        lifecycle.close();

        assert!(!observer.is_open());
        observer.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_while_open() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.sleep(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cut_short_by_close() {
        let lifecycle = Lifecycle::new();
        let closer = lifecycle.clone();
        let handle = tokio::spawn(async move { lifecycle.sleep(Duration::from_secs(3600)).await });

        tokio::task::yield_now().await;
        closer.close();

        assert!(!handle.await.unwrap());
    }
}

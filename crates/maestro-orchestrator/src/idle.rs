//! Session idle detection
//!
//! Tracks activity through [`IdleMonitor::touch`] and fires a session-idle
//! event once the countdown elapses without any activity. Each touch
//! restarts the countdown. One event per idle period: after firing, the
//! monitor re-arms only when activity resumes.

use crate::events::EventContext;
use crate::hooks::{DispatchOutcome, HookRegistry};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

pub struct IdleMonitor {
    countdown: Duration,
    activity: Notify,
}

impl IdleMonitor {
    pub fn new(countdown: Duration) -> Self {
        Self {
            countdown,
            activity: Notify::new(),
        }
    }

    pub fn from_secs(countdown_secs: u64) -> Self {
        Self::new(Duration::from_secs(countdown_secs))
    }

    /// Record activity, restarting the countdown
    pub fn touch(&self) {
        self.activity.notify_waiters();
    }

    /// Resolve once the countdown elapses with no intervening activity
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.activity.notified();
            tokio::pin!(notified);
            tokio::select! {
                _ = tokio::time::sleep(self.countdown) => return,
                _ = &mut notified => {
                    // Activity: restart the countdown
                }
            }
        }
    }

    /// Wait for one idle period and dispatch the session-idle event
    pub async fn watch_once(&self, hooks: &HookRegistry) -> DispatchOutcome {
        self.wait_for_idle().await;
        info!("Session idle for {:?}", self.countdown);
        hooks
            .dispatch(&EventContext::SessionIdle {
                idle_secs: self.countdown.as_secs(),
            })
            .await
    }

    /// Watch forever, firing once per idle period
    pub async fn watch(&self, hooks: &HookRegistry) {
        loop {
            self.watch_once(hooks).await;
            // Re-arm only when activity resumes
            self.activity.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::hooks::{Hook, HookDecision};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct IdleCounter {
        fired: AtomicUsize,
    }

    #[async_trait]
    impl Hook for IdleCounter {
        fn id(&self) -> &str {
            "idle-counter"
        }

        fn event_type(&self) -> EventType {
            EventType::SessionIdle
        }

        async fn handle(
            &self,
            _context: &EventContext,
            _payload: &Value,
        ) -> maestro_core::Result<HookDecision> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(HookDecision::proceed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_fires_after_countdown() {
        let monitor = IdleMonitor::from_secs(5);
        // Paused clock auto-advances; no activity means the countdown runs out
        monitor.wait_for_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_restarts_countdown() {
        let monitor = Arc::new(IdleMonitor::from_secs(5));
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                monitor.wait_for_idle().await;
                tokio::time::Instant::now()
            })
        };

        let start = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_secs(3)).await;
        monitor.touch();

        let idle_at = waiter.await.unwrap();
        // Idle fires 5s after the touch, not 5s after the start
        assert_eq!(idle_at - start, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_once_dispatches_session_idle() {
        let counter = Arc::new(IdleCounter {
            fired: AtomicUsize::new(0),
        });
        let mut hooks = HookRegistry::new();
        hooks.register(counter.clone());

        let monitor = IdleMonitor::from_secs(2);
        let outcome = monitor.watch_once(&hooks).await;

        assert!(!outcome.is_blocked());
        assert_eq!(outcome.payload["idle_secs"], 2);
        assert_eq!(counter.fired.load(Ordering::SeqCst), 1);
    }
}

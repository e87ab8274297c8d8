use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use store::UserId;
use thiserror::Error;
use tokio::sync::Mutex;

use super::OrderSummary;

/// Errors raised while handing off or delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The transport refused or failed to deliver the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The background worker is no longer running.
    #[error("Notification queue is closed")]
    QueueClosed,
}

/// Outbound channel for order confirmations (mail, push, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        recipient: UserId,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError>;
}

/// Notifier that writes confirmations to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        recipient: UserId,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            %recipient,
            order_id = %summary.order_id,
            items = summary.item_count(),
            total = %summary.total,
            "order confirmation sent"
        );
        Ok(())
    }
}

/// A delivered confirmation, as seen by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: UserId,
    pub summary: OrderSummary,
}

#[derive(Default)]
struct RecordingState {
    sent: Mutex<Vec<Delivery>>,
    attempts: AtomicU32,
    failures_remaining: AtomicU32,
}

/// Notifier that keeps deliveries in memory, for tests.
///
/// Can be told to fail a number of attempts before succeeding.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RecordingState>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier whose first `failures` attempts fail.
    pub fn failing(failures: u32) -> Self {
        let notifier = Self::default();
        notifier
            .state
            .failures_remaining
            .store(failures, Ordering::SeqCst);
        notifier
    }

    /// Returns every successful delivery so far.
    pub async fn sent(&self) -> Vec<Delivery> {
        self.state.sent.lock().await.clone()
    }

    /// Returns the number of delivery attempts, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` deliveries succeeded or `timeout` elapses.
    ///
    /// Returns true if the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state.sent.lock().await.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        recipient: UserId,
        summary: &OrderSummary,
    ) -> Result<(), NotificationError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .state
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(NotificationError::Delivery("simulated outage".to_string()));
        }

        self.state.sent.lock().await.push(Delivery {
            recipient,
            summary: summary.clone(),
        });
        Ok(())
    }
}

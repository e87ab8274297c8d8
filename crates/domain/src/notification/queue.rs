use std::sync::Arc;
use std::time::Duration;

use store::UserId;
use tokio::sync::mpsc;

use super::{NotificationError, Notifier, OrderSummary};

/// Retry policy with exponential backoff for notification delivery.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Factor applied to the delay after every retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.mul_f64(factor.min(1e6));
        delay.min(self.max_delay)
    }
}

/// Delivers one confirmation, retrying failed attempts per `policy`.
///
/// Returns the number of attempts used, or the last error once attempts run out.
pub async fn deliver_with_retry(
    notifier: &dyn Notifier,
    recipient: UserId,
    summary: &OrderSummary,
    policy: &RetryPolicy,
) -> Result<u32, NotificationError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match notifier.send_order_confirmation(recipient, summary).await {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_for_retry(attempt - 1);
                tracing::warn!(
                    order_id = %summary.order_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "order confirmation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

struct Job {
    recipient: UserId,
    summary: OrderSummary,
}

/// Hand-off point between order placement and notification delivery.
///
/// Enqueueing never waits on delivery. Each job is delivered on its own task
/// so one slow recipient does not hold up the rest.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl NotificationQueue {
    /// Starts the background worker. Must be called inside a Tokio runtime.
    ///
    /// The worker stops once every clone of the queue is dropped.
    pub fn spawn(notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let notifier = Arc::clone(&notifier);
                let policy = policy.clone();
                tokio::spawn(async move {
                    match deliver_with_retry(notifier.as_ref(), job.recipient, &job.summary, &policy)
                        .await
                    {
                        Ok(attempts) => {
                            metrics::counter!("notifications_sent_total").increment(1);
                            tracing::debug!(order_id = %job.summary.order_id, attempts, "confirmation delivered");
                        }
                        Err(e) => {
                            metrics::counter!("notifications_failed_total").increment(1);
                            tracing::warn!(
                                order_id = %job.summary.order_id,
                                recipient = %job.recipient,
                                error = %e,
                                "order confirmation dropped after retries"
                            );
                        }
                    }
                });
            }
            tracing::debug!("notification worker stopped");
        });

        Self { sender }
    }

    /// Queues a confirmation for background delivery.
    pub fn enqueue(
        &self,
        recipient: UserId,
        summary: OrderSummary,
    ) -> Result<(), NotificationError> {
        self.sender
            .send(Job { recipient, summary })
            .map_err(|_| NotificationError::QueueClosed)
    }
}

//! Order confirmation notifications.
//!
//! Placement commits first and then hands the confirmation to a
//! [`NotificationQueue`]. Delivery runs in the background with retry and
//! never affects the outcome of the placement.

mod notifier;
mod queue;
mod summary;

pub use notifier::{Delivery, LogNotifier, NotificationError, Notifier, RecordingNotifier};
pub use queue::{NotificationQueue, RetryPolicy, deliver_with_retry};
pub use summary::{OrderSummary, SummaryLine};

//! Derived order status.

use serde::{Deserialize, Serialize};
use store::{LineItem, LineStatus};

/// Order status as derived from its line statuses.
///
/// An order carries no status column of its own. It is open while any line
/// is still in flight, completed when every remaining line is completed, and
/// fully cancelled only when every line is cancelled. A completed line keeps
/// the order alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// At least one line is Active, Processing or Shipped.
    #[default]
    Open,

    /// Every line is Completed or Cancelled, and at least one is Completed.
    Completed,

    /// Every line is Cancelled.
    FullyCancelled,
}

impl OrderStatus {
    /// Derives the status from line statuses. No lines means Open.
    pub fn from_statuses(statuses: impl IntoIterator<Item = LineStatus>) -> Self {
        let mut any = false;
        let mut all_cancelled = true;
        let mut all_resolved = true;
        for status in statuses {
            any = true;
            all_cancelled &= status == LineStatus::Cancelled;
            all_resolved &= status.is_terminal();
        }

        match (any, all_cancelled, all_resolved) {
            (false, _, _) => OrderStatus::Open,
            (true, true, _) => OrderStatus::FullyCancelled,
            (true, false, true) => OrderStatus::Completed,
            _ => OrderStatus::Open,
        }
    }

    pub fn from_lines(lines: &[LineItem]) -> Self {
        Self::from_statuses(lines.iter().map(|l| l.status))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "Open",
            OrderStatus::Completed => "Completed",
            OrderStatus::FullyCancelled => "FullyCancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

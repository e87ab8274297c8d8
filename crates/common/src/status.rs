//! Line item status state machine.

use serde::{Deserialize, Serialize};

/// The status of one line item.
///
/// Allowed transitions:
/// ```text
/// Active     ──► Processing | Shipped | Completed | Cancelled
/// Processing ──► Shipped | Completed | Cancelled
/// Shipped    ──► Completed
/// ```
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LineStatus {
    /// Ordered and not yet fulfilled.
    #[default]
    Active,

    /// Being prepared for shipment.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Delivered (terminal).
    Completed,

    /// Cancelled and credited back to inventory (terminal).
    Cancelled,
}

impl LineStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [LineStatus; 5] = [
        LineStatus::Active,
        LineStatus::Processing,
        LineStatus::Shipped,
        LineStatus::Completed,
        LineStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [LineStatus] {
        match self {
            LineStatus::Active => &[
                LineStatus::Processing,
                LineStatus::Shipped,
                LineStatus::Completed,
                LineStatus::Cancelled,
            ],
            LineStatus::Processing => &[
                LineStatus::Shipped,
                LineStatus::Completed,
                LineStatus::Cancelled,
            ],
            LineStatus::Shipped => &[LineStatus::Completed],
            LineStatus::Completed | LineStatus::Cancelled => &[],
        }
    }

    /// Returns true if `next` is reachable from this status in one step.
    pub fn can_transition_to(&self, next: LineStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if the line can still be cancelled (and credited back).
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(LineStatus::Cancelled)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LineStatus::Completed | LineStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Active => "Active",
            LineStatus::Processing => "Processing",
            LineStatus::Shipped => "Shipped",
            LineStatus::Completed => "Completed",
            LineStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl std::fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown line status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl std::str::FromStr for LineStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        LineStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseStatusError(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_active() {
        assert_eq!(LineStatus::default(), LineStatus::Active);
    }

    #[test]
    fn cancellable_statuses() {
        assert!(LineStatus::Active.can_cancel());
        assert!(LineStatus::Processing.can_cancel());
        assert!(!LineStatus::Shipped.can_cancel());
        assert!(!LineStatus::Completed.can_cancel());
        assert!(!LineStatus::Cancelled.can_cancel());
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for status in LineStatus::ALL {
            assert_eq!(status.is_terminal(), status.allowed_transitions().is_empty());
        }
    }

    #[test]
    fn no_status_transitions_to_itself() {
        for status in LineStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn cancelled_cannot_be_restored() {
        assert!(!LineStatus::Cancelled.can_transition_to(LineStatus::Active));
    }

    #[test]
    fn parse_round_trips_display() {
        for status in LineStatus::ALL {
            assert_eq!(status.to_string().parse::<LineStatus>().unwrap(), status);
        }
        assert_eq!("cancelled".parse::<LineStatus>().unwrap(), LineStatus::Cancelled);
        assert!("Refunded".parse::<LineStatus>().is_err());
    }
}

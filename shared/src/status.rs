use std::fmt;

use serde::{Deserialize, Serialize};

/// Booking lifecycle. Pending is the only non-terminal state; the three
/// terminal states admit no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Declined,
    Cancelled,
}

impl BookingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Declined => "declined",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(BookingStatus::Pending),
            "approved" => Some(BookingStatus::Approved),
            "declined" => Some(BookingStatus::Declined),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                BookingStatus::Pending,
                BookingStatus::Approved | BookingStatus::Declined | BookingStatus::Cancelled,
            )
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loading sub-state, monotonic: pending < partial < completed. Independent
/// of the approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStatus {
    Pending,
    Partial,
    Completed,
}

impl LoadingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            LoadingStatus::Pending => "pending",
            LoadingStatus::Partial => "partial",
            LoadingStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(LoadingStatus::Pending),
            "partial" => Some(LoadingStatus::Partial),
            "completed" => Some(LoadingStatus::Completed),
            _ => None,
        }
    }

    pub const fn is_complete(self) -> bool {
        matches!(self, LoadingStatus::Completed)
    }
}

impl fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruckStatus {
    Pending,
    Loaded,
}

impl TruckStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            TruckStatus::Pending => "pending",
            TruckStatus::Loaded => "loaded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TruckStatus::Pending),
            "loaded" => Some(TruckStatus::Loaded),
            _ => None,
        }
    }
}

impl fmt::Display for TruckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions_to_every_terminal_state() {
        for next in [
            BookingStatus::Approved,
            BookingStatus::Declined,
            BookingStatus::Cancelled,
        ] {
            assert!(BookingStatus::Pending.can_transition_to(next));
        }
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        let all = [
            BookingStatus::Pending,
            BookingStatus::Approved,
            BookingStatus::Declined,
            BookingStatus::Cancelled,
        ];
        for from in [
            BookingStatus::Approved,
            BookingStatus::Declined,
            BookingStatus::Cancelled,
        ] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to));
            }
        }
        assert!(!BookingStatus::Pending.is_terminal());
    }

    #[test]
    fn status_text_round_trips() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Approved,
            BookingStatus::Declined,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("shipped"), None);

        for status in [
            LoadingStatus::Pending,
            LoadingStatus::Partial,
            LoadingStatus::Completed,
        ] {
            assert_eq!(LoadingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LoadingStatus::parse("done"), None);

        for status in [TruckStatus::Pending, TruckStatus::Loaded] {
            assert_eq!(TruckStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TruckStatus::parse(""), None);
    }

    #[test]
    fn loading_progression_is_ordered() {
        assert!(LoadingStatus::Pending < LoadingStatus::Partial);
        assert!(LoadingStatus::Partial < LoadingStatus::Completed);
        assert!(LoadingStatus::Completed.is_complete());
        assert!(!LoadingStatus::Partial.is_complete());
    }
}

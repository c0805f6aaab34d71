//! Order identifiers: `S<n>` with a strictly increasing numeric suffix.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Suffixes start above this base; the first identifier ever assigned is
/// `S10001`.
pub const ORDER_ID_BASE: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn from_suffix(suffix: i64) -> Self {
        OrderId(format!("S{suffix}"))
    }

    /// Numeric suffix of a stored identifier, or None if it does not match
    /// the `S<digits>` pattern.
    pub fn parse_suffix(raw: &str) -> Option<i64> {
        let digits = raw.strip_prefix('S')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn suffix(&self) -> Option<i64> {
        Self::parse_suffix(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Wraps a stored identifier verbatim, parseable or not.
impl From<String> for OrderId {
    fn from(raw: String) -> Self {
        OrderId(raw)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocates the next identifier from the set of already-assigned ones:
/// max numeric suffix + 1, or base + 1 when none exist. Malformed stored
/// identifiers are skipped with a warning instead of failing the
/// allocation; if nothing parses the base applies.
///
/// Callers must hold whatever serializes booking creation while invoking
/// this, or two allocations may mint the same identifier.
pub fn next_order_id<'a, I>(existing: I) -> OrderId
where
    I: IntoIterator<Item = &'a str>,
{
    let mut max_suffix = ORDER_ID_BASE;
    let mut malformed = 0usize;
    for raw in existing {
        match OrderId::parse_suffix(raw) {
            Some(suffix) => max_suffix = max_suffix.max(suffix),
            None => malformed += 1,
        }
    }
    if malformed > 0 {
        warn!(
            malformed,
            "skipped malformed order identifiers while allocating the next one"
        );
    }
    OrderId::from_suffix(max_suffix + 1)
}

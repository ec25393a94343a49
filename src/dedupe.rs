use super::Keyed;
use itertools::Itertools as _;

/// Removes entries sharing a `(PK, SK)` pair with an earlier entry, preserving input order.
/// Pairs are compared on their raw attributes, so numerically equal sort keys match whatever
/// their spelling, while entries with distinct keys are never merged.
///
/// The store rejects batch requests that address the same key twice, so every chunk passes
/// through here before submission.
pub fn dedupe<T: Keyed>(entries: Vec<T>) -> Vec<T> {
    entries.into_iter().unique_by(|e| e.identity()).collect()
}

//! Scope normalization.
//!
//! Scopes are opaque, case-sensitive permission strings. Normalization
//! trims whitespace, drops empty entries, and collapses duplicates into
//! set semantics. A `BTreeSet` keeps the stored order stable.

use std::collections::BTreeSet;

/// Normalize a list of requested scopes into a deduplicated set of
/// trimmed, non-empty strings.
///
/// Idempotent: normalizing an already-normalized set is a no-op. An
/// empty or all-blank input yields an empty set, which issuance rejects.
pub fn normalize_scopes<S: AsRef<str>>(requested: &[S]) -> BTreeSet<String> {
    requested
        .iter()
        .map(|scope| scope.as_ref().trim())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

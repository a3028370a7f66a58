//! Handle normalization.
//!
//! The normalized handle is the canonical identity for every lookup and
//! insert: `"@Foo"`, `"foo"`, and `"FOO"` all resolve to the same rep.

/// Normalize a raw handle: trim whitespace, strip one leading `@`, lowercase.
///
/// Idempotent: normalizing an already-normalized handle is a no-op.
pub fn normalize_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed);
    stripped.to_lowercase()
}

//! Consecutive-duplicate filter.
//!
//! The feed occasionally re-broadcasts an unchanged notification. Without
//! filtering, each re-broadcast would append a spurious revision entry.
//!
//! # Guarantee
//!
//! This filter only catches an exact repeat of the immediately preceding
//! message. A duplicate separated by an intervening distinct message, or a
//! semantically identical payload with incidental formatting differences,
//! passes through undetected. It is a weak dedup guarantee, not at-most-once.

/// Single-slot filter over raw frame text.
///
/// Owned exclusively by the processing loop; holds the previous
/// non-duplicate message and nothing else.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    last_message: Option<String>,
}

impl DuplicateFilter {
    /// Create a filter with an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `raw` should be processed, `false` when it is a
    /// byte-for-byte repeat of the previous accepted frame.
    ///
    /// An accepted frame becomes the new comparison baseline.
    pub fn accept(&mut self, raw: &str) -> bool {
        if self.last_message.as_deref() == Some(raw) {
            return false;
        }
        self.last_message = Some(raw.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_accepted() {
        let mut filter = DuplicateFilter::new();
        assert!(filter.accept("a"));
    }

    #[test]
    fn consecutive_duplicate_rejected() {
        let mut filter = DuplicateFilter::new();
        assert!(filter.accept("a"));
        assert!(!filter.accept("a"));
        assert!(!filter.accept("a"));
    }

    #[test]
    fn interleaved_duplicate_passes() {
        // Known weak guarantee: only the immediately preceding message is
        // compared, so A B A is three accepted frames.
        let mut filter = DuplicateFilter::new();
        assert!(filter.accept("a"));
        assert!(filter.accept("b"));
        assert!(filter.accept("a"));
    }

    #[test]
    fn distinct_messages_accepted() {
        let mut filter = DuplicateFilter::new();
        assert!(filter.accept("a"));
        assert!(filter.accept("b"));
        assert!(!filter.accept("b"));
        assert!(filter.accept("c"));
    }
}

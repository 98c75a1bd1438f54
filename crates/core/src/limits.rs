//! Numbering limits
//!
//! The featured range is fixed: numbers `1..=RESERVED_MAX` are bound to
//! static editorial content that never lives in the store.

/// Highest number in the reserved featured range
pub const RESERVED_MAX: u64 = 5;

/// First number the allocator may hand out
pub const FIRST_ALLOCATABLE: u64 = RESERVED_MAX + 1;

/// Record-level fields a payload patch may not name
pub const RECORD_FIELDS: &[&str] = &["recipeNumber", "id", "authorId", "createdAt"];

/// Upper bound on a single `list_page` request
pub const MAX_PAGE_SIZE: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_allocatable_follows_reserved() {
        assert_eq!(FIRST_ALLOCATABLE, 6);
    }
}

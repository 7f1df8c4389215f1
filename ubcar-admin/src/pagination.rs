//! Listing offsets
//!
//! The admin page pages through media ten at a time. Its `offset` counter is
//! the number of the page *after* the one on screen, so "back" steps two
//! pages from the counter.

/// Media per page
pub const PAGE_SIZE: i64 = 10;

/// Row offset of the page the forward button asks for
///
/// # Examples
/// ```
/// use ubcar_admin::pagination::forward_offset;
///
/// assert_eq!(forward_offset(1), 10);
/// assert_eq!(forward_offset(3), 30);
/// ```
pub fn forward_offset(page_counter: i64) -> i64 {
    page_counter.max(0) * PAGE_SIZE
}

/// Row offset of the page the backward button asks for, never negative
///
/// # Examples
/// ```
/// use ubcar_admin::pagination::backward_offset;
///
/// assert_eq!(backward_offset(3), 10);
/// assert_eq!(backward_offset(1), 0);
/// ```
pub fn backward_offset(page_counter: i64) -> i64 {
    ((page_counter - 2) * PAGE_SIZE).max(0)
}

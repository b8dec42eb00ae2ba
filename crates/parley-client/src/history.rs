//! Pagination cursor for backward history loading.
//!
//! Page 1 is the most recent window; each completed fetch advances the
//! cursor one page further into the past. At most one fetch is in
//! flight per conversation; duplicate triggers from rapid scroll events
//! are dropped, not queued.

/// A single page request handed to the fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

/// Cursor state for one conversation's history. Discarded together
/// with the conversation it belongs to.
#[derive(Debug, Clone)]
pub struct HistoryPager {
    next_page: u32,
    limit: u32,
    has_more: bool,
    in_flight: bool,
}

impl HistoryPager {
    pub fn new(limit: u32) -> Self {
        Self {
            next_page: 1,
            limit,
            has_more: true,
            in_flight: false,
        }
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Begin a fetch. Returns `None` while a fetch is already in flight
    /// or no older pages remain.
    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.in_flight || !self.has_more {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            page: self.next_page,
            limit: self.limit,
        })
    }

    /// Record a successful fetch and advance the cursor.
    pub fn complete(&mut self, has_more: bool) {
        self.in_flight = false;
        self.has_more = has_more;
        self.next_page += 1;
    }

    /// Record a failed fetch. The cursor is untouched, so retrying with
    /// the same parameters is safe.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }
}

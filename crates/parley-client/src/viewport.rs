//! Scroll planning for the embedding view.
//!
//! The view owns real layout; this module only decides what to do with
//! the scroll position after each list change, so the decisions stay
//! unit-testable against a mock height function.

use crate::history::HistoryPager;

/// How the open conversation's list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    /// Page 1 replaced the list (initial or fresh load).
    Reloaded,
    /// An older page of `count` messages went in at the front.
    Prepended { count: usize },
    /// One message was appended at the end (live push or local echo).
    Appended,
}

/// What the view should do with its scroll position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    /// Jump to the newest message.
    StickToNewest,
    /// Shift the offset by exactly the prepended height so the focused
    /// message does not jump.
    OffsetBy(f64),
    /// Leave the viewport alone.
    None,
}

/// Map a list change to a scroll action. `height_of` reports the
/// rendered height of the i-th prepended message.
pub fn plan(change: ListChange, height_of: impl Fn(usize) -> f64) -> ScrollAction {
    match change {
        ListChange::Reloaded | ListChange::Appended => ScrollAction::StickToNewest,
        ListChange::Prepended { count } => {
            if count == 0 {
                return ScrollAction::None;
            }
            let added: f64 = (0..count).map(height_of).sum();
            ScrollAction::OffsetBy(added)
        }
    }
}

/// Whether reaching the top edge should trigger a backward fetch.
pub fn should_fetch_older(at_top: bool, pager: &HistoryPager) -> bool {
    at_top && pager.has_more() && !pager.is_loading()
}

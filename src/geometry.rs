//! Scroll geometry for the feed.
//!
//! Every card is exactly one viewport tall and stacked top to bottom, so the
//! whole layout is described by the viewport height and the item count.

use crate::feed::ItemId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemOffset {
    pub id: ItemId,
    /// Top edge in feed coordinates; `None` when the item is not laid out.
    pub top: Option<f64>,
}

/// Returns the first item, in list order, whose span `[top, top + viewport_height)`
/// contains the viewport midpoint. Items without a known offset are skipped.
pub fn centered_item(
    scroll_offset: f64,
    viewport_height: f64,
    offsets: &[ItemOffset],
) -> Option<ItemId> {
    let midpoint = scroll_offset + viewport_height / 2.0;
    offsets.iter().find_map(|offset| {
        let top = offset.top?;
        (midpoint >= top && midpoint < top + viewport_height).then_some(offset.id)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLayout {
    pub viewport_height: usize,
    pub count: usize,
}

impl FeedLayout {
    pub fn new(viewport_height: usize, count: usize) -> Self {
        Self {
            viewport_height,
            count,
        }
    }

    pub fn item_top(&self, index: usize) -> usize {
        index.saturating_mul(self.viewport_height)
    }

    pub fn max_scroll(&self) -> usize {
        self.item_top(self.count.saturating_sub(1))
    }

    pub fn clamp(&self, scroll: usize) -> usize {
        scroll.min(self.max_scroll())
    }

    pub fn offsets(&self, ids: impl IntoIterator<Item = ItemId>) -> Vec<ItemOffset> {
        ids.into_iter()
            .enumerate()
            .map(|(index, id)| ItemOffset {
                id,
                top: Some(self.item_top(index) as f64),
            })
            .collect()
    }

    /// Nearest card top to `scroll`; a tie goes to the earlier card.
    pub fn snap_offset(&self, scroll: usize) -> usize {
        if self.viewport_height == 0 {
            return 0;
        }
        let scroll = self.clamp(scroll);
        let index = scroll / self.viewport_height;
        let remainder = scroll % self.viewport_height;
        let index = if remainder * 2 > self.viewport_height {
            index + 1
        } else {
            index
        };
        self.clamp(self.item_top(index))
    }

    /// Index of the card whose top is at or above `scroll`.
    pub fn index_at(&self, scroll: usize) -> usize {
        if self.viewport_height == 0 {
            return 0;
        }
        (scroll / self.viewport_height).min(self.count.saturating_sub(1))
    }
}

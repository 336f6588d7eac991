//! Paged presentation of the transaction-type checklist inside a row editor.
//! Only the checkbox list is windowed; the selected set always renders in
//! full and is independent of whatever page is showing.

/// Checkboxes shown per page.
pub const TAG_PAGE_SIZE: usize = 4;

/// Window and highlight over the full transaction-type list. Pages are
/// 1-based and clamped to `[1, page_count]`; the pager belongs to one editor
/// and is not persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPager {
    page: usize,
    slot: usize,
}

impl Default for TagPager {
    fn default() -> Self {
        Self::new()
    }
}

impl TagPager {
    pub fn new() -> Self {
        Self { page: 1, slot: 0 }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Highlighted position within the visible page.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// An empty list still has one (empty) page.
    pub fn page_count(total: usize) -> usize {
        if total == 0 {
            1
        } else {
            (total + TAG_PAGE_SIZE - 1) / TAG_PAGE_SIZE
        }
    }

    pub fn next_page(&mut self, total: usize) {
        self.page = (self.page + 1).min(Self::page_count(total));
        self.slot = 0;
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1).max(1);
        self.slot = 0;
    }

    /// Re-clamp after the taxonomy list changes size underneath the pager.
    pub fn clamp(&mut self, total: usize) {
        self.page = self.page.min(Self::page_count(total)).max(1);
        let len = self.visible_len(total);
        self.slot = if len == 0 { 0 } else { self.slot.min(len - 1) };
    }

    fn start(&self) -> usize {
        (self.page - 1) * TAG_PAGE_SIZE
    }

    pub fn visible_len(&self, total: usize) -> usize {
        total.saturating_sub(self.start()).min(TAG_PAGE_SIZE)
    }

    /// The slice of labels on the current page.
    pub fn visible<'a>(&self, all: &'a [String]) -> &'a [String] {
        let start = self.start().min(all.len());
        let end = (start + TAG_PAGE_SIZE).min(all.len());
        &all[start..end]
    }

    pub fn next_slot(&mut self, total: usize) {
        let len = self.visible_len(total);
        if len > 0 {
            self.slot = (self.slot + 1).min(len - 1);
        }
    }

    pub fn prev_slot(&mut self) {
        self.slot = self.slot.saturating_sub(1);
    }

    pub fn highlighted<'a>(&self, all: &'a [String]) -> Option<&'a str> {
        self.visible(all).get(self.slot).map(String::as_str)
    }
}

/// Toggle `label` in a selection: absent labels append (order of selection is
/// kept), present ones are removed.
pub fn toggle(selection: &mut Vec<String>, label: &str) {
    if let Some(pos) = selection.iter().position(|s| s == label) {
        selection.remove(pos);
    } else {
        selection.push(label.to_string());
    }
}

/// The whole selected set on one line, regardless of pagination.
pub fn summary(selection: &[String]) -> String {
    if selection.is_empty() {
        "(none)".to_string()
    } else {
        selection.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("type {i}")).collect()
    }

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(TagPager::page_count(0), 1);
        assert_eq!(TagPager::page_count(4), 1);
        assert_eq!(TagPager::page_count(5), 2);
        assert_eq!(TagPager::page_count(9), 3);
    }

    #[test]
    fn test_paging_clamps_at_both_ends() {
        let all = labels(9);
        let mut pager = TagPager::new();

        pager.prev_page();
        assert_eq!(pager.page(), 1);

        pager.next_page(all.len());
        pager.next_page(all.len());
        assert_eq!(pager.page(), 3);
        pager.next_page(all.len());
        assert_eq!(pager.page(), 3);
    }

    #[test]
    fn test_visible_window_per_page() {
        let all = labels(9);
        let mut pager = TagPager::new();

        assert_eq!(pager.visible(&all), &all[0..4]);
        pager.next_page(all.len());
        assert_eq!(pager.visible(&all), &all[4..8]);
        pager.next_page(all.len());
        assert_eq!(pager.visible(&all), &all[8..9]);
    }

    #[test]
    fn test_empty_list_shows_nothing_on_page_one() {
        let pager = TagPager::new();
        assert_eq!(pager.page(), 1);
        assert!(pager.visible(&[]).is_empty());
        assert_eq!(pager.highlighted(&[]), None);
    }

    #[test]
    fn test_slot_moves_within_the_page_only() {
        let all = labels(6);
        let mut pager = TagPager::new();

        pager.next_slot(all.len());
        pager.next_slot(all.len());
        assert_eq!(pager.highlighted(&all), Some("type 3"));
        pager.next_slot(all.len());
        pager.next_slot(all.len());
        assert_eq!(pager.slot(), 3);

        pager.next_page(all.len());
        assert_eq!(pager.slot(), 0);
        pager.next_slot(all.len());
        assert_eq!(pager.slot(), 1, "last page has two entries");
        pager.next_slot(all.len());
        assert_eq!(pager.slot(), 1);
    }

    #[test]
    fn test_clamp_after_list_shrinks() {
        let mut pager = TagPager::new();
        pager.next_page(9);
        pager.next_page(9);
        assert_eq!(pager.page(), 3);

        pager.clamp(4);
        assert_eq!(pager.page(), 1);
        assert_eq!(pager.slot(), 0);
    }

    #[test]
    fn test_toggle_appends_then_removes() {
        let mut selection = vec!["Essential".to_string()];

        toggle(&mut selection, "Subscription");
        assert_eq!(selection, vec!["Essential", "Subscription"]);

        toggle(&mut selection, "Essential");
        assert_eq!(selection, vec!["Subscription"]);
    }

    #[test]
    fn test_summary_ignores_pagination() {
        let selection: Vec<String> =
            ["One-off", "Refund", "Essential"].iter().map(|s| s.to_string()).collect();
        assert_eq!(summary(&selection), "One-off, Refund, Essential");
        assert_eq!(summary(&[]), "(none)");
    }
}

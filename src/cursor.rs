/// Anything that can be located inside a [`PageCursor`] by identity.
pub trait Keyed {
    type Key: PartialEq + Copy;

    fn key(&self) -> Self::Key;
}

/// Pagination bookkeeping for one ordered, lazily loaded collection.
///
/// `items` is always a prefix of the remote ordering plus any locally
/// prepended entries, and never grows past `total`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor<T> {
    items: Vec<T>,
    total: usize,
    page: u32,
    page_size: u32,
}

impl<T> PageCursor<T> {
    pub fn new(page_size: u32) -> Self {
        Self::with_total(page_size, 0)
    }

    /// A cursor with nothing loaded yet but a known remote total, e.g. the
    /// reply count a server reported on the parent comment.
    pub fn with_total(page_size: u32, total: usize) -> Self {
        Self {
            items: Vec::new(),
            total,
            page: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Mutable access to loaded items. The slice cannot change length, so the
    /// cursor's counters stay consistent.
    pub fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Index of the last page applied, `0` when none has loaded.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }

    pub fn has_more(&self) -> bool {
        self.items.len() < self.total
    }

    /// Puts a freshly created entry at the front so it shows without a refetch.
    pub fn prepend(&mut self, item: T) {
        self.items.insert(0, item);
        self.total += 1;
    }
}

impl<T: Keyed> PageCursor<T> {
    /// Applies a fetched page. Returns `false` without touching anything when
    /// `page` was already applied; overlapping requests may complete twice.
    ///
    /// Items already present are skipped. Local prepends shift the remote
    /// ordering, so a later page can repeat them.
    pub fn append_page(&mut self, items: Vec<T>, total: usize, page: u32) -> bool {
        if page <= self.page {
            return false;
        }
        for item in items {
            if !self.contains(item.key()) {
                self.items.push(item);
            }
        }
        self.total = total.max(self.items.len());
        self.page = page;
        true
    }

    pub fn position(&self, key: T::Key) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    pub fn get(&self, key: T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.position(key).is_some()
    }

    /// Removes the first item with `key`. Absent keys are a no-op.
    pub fn remove(&mut self, key: T::Key) -> Option<T> {
        let index = self.position(key)?;
        self.total = self.total.saturating_sub(1);
        Some(self.items.remove(index))
    }
}

impl<'a, T> IntoIterator for &'a PageCursor<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(u32);

    impl Keyed for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.0
        }
    }

    fn rows(ids: &[u32]) -> Vec<Row> {
        ids.iter().copied().map(Row).collect()
    }

    #[test]
    fn pages_concatenate_in_call_order() {
        let mut cursor = PageCursor::new(2);
        assert!(cursor.append_page(rows(&[1, 2]), 5, 1));
        assert!(cursor.append_page(rows(&[3, 4]), 5, 2));
        assert!(cursor.append_page(rows(&[5]), 5, 3));
        assert_eq!(cursor.items(), rows(&[1, 2, 3, 4, 5]).as_slice());
        assert_eq!(cursor.page(), 3);
        assert!(!cursor.has_more());
    }

    #[test]
    fn reapplying_a_page_is_a_no_op() {
        let mut cursor = PageCursor::new(2);
        cursor.append_page(rows(&[1, 2]), 3, 1);
        assert!(!cursor.append_page(rows(&[1, 2]), 3, 1));
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.total(), 3);
        assert!(cursor.has_more());
    }

    #[test]
    fn page_index_never_moves_backwards() {
        let mut cursor = PageCursor::new(2);
        cursor.append_page(rows(&[1, 2]), 6, 1);
        cursor.append_page(rows(&[3, 4]), 6, 2);
        assert!(!cursor.append_page(rows(&[1, 2]), 6, 1));
        assert_eq!(cursor.page(), 2);
        assert_eq!(cursor.next_page(), 3);
        assert_eq!(cursor.len(), 4);
    }

    #[test]
    fn stale_total_never_undercounts_loaded_items() {
        let mut cursor = PageCursor::new(3);
        cursor.append_page(rows(&[1, 2, 3]), 2, 1);
        assert_eq!(cursor.total(), 3);
        assert!(!cursor.has_more());
    }

    #[test]
    fn prepend_and_remove_track_total() {
        let mut cursor = PageCursor::with_total(2, 4);
        assert!(cursor.has_more());
        cursor.append_page(rows(&[1, 2]), 4, 1);
        cursor.prepend(Row(9));
        assert_eq!(cursor.items()[0], Row(9));
        assert_eq!(cursor.total(), 5);

        assert_eq!(cursor.remove(2), Some(Row(2)));
        assert_eq!(cursor.total(), 4);
        assert_eq!(cursor.remove(42), None);
        assert_eq!(cursor.total(), 4);
        assert_eq!(cursor.items(), rows(&[9, 1]).as_slice());
    }

    #[test]
    fn later_page_skips_locally_prepended_items() {
        let mut cursor = PageCursor::new(2);
        cursor.append_page(rows(&[1, 2]), 3, 1);
        cursor.prepend(Row(9));
        assert_eq!(cursor.total(), 4);

        // the server now orders 9, 1, 2, 3, so page 2 repeats 2
        assert!(cursor.append_page(rows(&[2, 3]), 4, 2));
        assert_eq!(cursor.items(), rows(&[9, 1, 2, 3]).as_slice());
        assert!(!cursor.has_more());
    }

    #[test]
    fn first_page_after_prepend_keeps_more_to_load() {
        let mut cursor = PageCursor::with_total(5, 5);
        cursor.prepend(Row(1000));
        assert!(cursor.append_page(rows(&[1000, 2, 3, 4, 5]), 6, 1));
        assert_eq!(cursor.items(), rows(&[1000, 2, 3, 4, 5]).as_slice());
        assert_eq!(cursor.total(), 6);
        assert!(cursor.has_more());
        assert_eq!(cursor.next_page(), 2);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let cursor: PageCursor<Row> = PageCursor::new(0);
        assert_eq!(cursor.page_size(), 1);
        assert_eq!(cursor.next_page(), 1);
    }
}

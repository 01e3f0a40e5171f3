//! Filterable list with a selection cursor and a scroll window, shared by
//! the stations popover and the search results.

use std::cmp::Ordering;

pub struct ScrollableList<T> {
    pub items: Vec<T>,
    /// Indices into `items` that pass the filter, in display order.
    shown: Vec<usize>,
    selected: usize,
    offset: usize,
    query: String,
    matches: Box<dyn Fn(&T, &str) -> bool + Send + Sync>,
}

impl<T> ScrollableList<T> {
    pub fn new(matches: impl Fn(&T, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            shown: Vec::new(),
            selected: 0,
            offset: 0,
            query: String::new(),
            matches: Box::new(matches),
        }
    }

    fn selected_index(&self) -> Option<usize> {
        self.shown.get(self.selected).copied()
    }

    /// Put the cursor back on item `index` if it is still shown.
    fn reselect(&mut self, index: Option<usize>) -> bool {
        match index.and_then(|old| self.shown.iter().position(|&i| i == old)) {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }

    pub fn set_items(&mut self, items: Vec<T>) {
        let old = self.selected_index();
        self.items = items;
        self.refilter();
        self.reselect(old);
    }

    pub fn set_filter(&mut self, query: &str) {
        let old = self.selected_index();
        self.query = query.to_string();
        self.refilter();
        if !self.reselect(old) {
            self.selected = 0;
        }
        self.offset = 0;
    }

    /// Recompute the shown rows in insertion order, keeping the cursor on
    /// the same item when it survives.
    pub fn refilter(&mut self) {
        let old = self.selected_index();
        self.shown = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.query.is_empty() || (self.matches)(item, &self.query))
            .map(|(i, _)| i)
            .collect();
        if !self.reselect(old) {
            self.selected = self.selected.min(self.shown.len().saturating_sub(1));
        }
    }

    /// Reorder the shown rows; `items` stays in insertion order.
    pub fn sort_by(&mut self, mut cmp: impl FnMut(&T, &T) -> Ordering) {
        let old = self.selected_index();
        let items = &self.items;
        self.shown.sort_by(|&a, &b| cmp(&items[a], &items[b]));
        self.reselect(old);
    }

    /// Move the cursor to the first shown item matching `pred`.
    pub fn select_where(&mut self, pred: impl Fn(&T) -> bool) -> bool {
        match self.shown.iter().position(|&i| pred(&self.items[i])) {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }

    pub fn select_up(&mut self, n: usize) {
        self.selected = self.selected.saturating_sub(n);
    }

    pub fn select_down(&mut self, n: usize) {
        self.selected = (self.selected + n).min(self.shown.len().saturating_sub(1));
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
        self.offset = 0;
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.items.get(self.selected_index()?)
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    /// Shown items in display order.
    pub fn shown(&self) -> impl Iterator<Item = &T> {
        self.shown.iter().map(|&i| &self.items[i])
    }

    /// Scroll so the cursor fits in `height` rows.
    pub fn ensure_visible(&mut self, height: usize) {
        if height == 0 {
            return;
        }
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + height {
            self.offset = self.selected + 1 - height;
        }
    }

    /// The `height` rows in the scroll window.  Call `ensure_visible` first.
    pub fn visible_items(&self, height: usize) -> impl Iterator<Item = &T> {
        self.shown().skip(self.offset).take(height)
    }

    /// Cursor row within the scroll window.
    pub fn selected_in_view(&self, height: usize) -> usize {
        self.selected
            .saturating_sub(self.offset)
            .min(height.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> ScrollableList<&'static str> {
        let mut list = ScrollableList::new(|s: &&str, q: &str| s.contains(q));
        list.set_items(vec!["beta", "alpha", "gamma", "alphabet"]);
        list
    }

    #[test]
    fn filter_keeps_selection_when_possible() {
        let mut l = list();
        l.select_down(3);
        assert_eq!(l.selected_item(), Some(&"alphabet"));
        l.set_filter("alpha");
        assert_eq!(l.shown().count(), 2);
        assert_eq!(l.selected_item(), Some(&"alphabet"));
        l.set_filter("gam");
        assert_eq!(l.selected_item(), Some(&"gamma"));
        l.set_filter("zzz");
        assert!(l.is_empty());
        assert_eq!(l.selected_item(), None);
    }

    #[test]
    fn sort_reorders_view_only_and_refilter_undoes_it() {
        let mut l = list();
        assert!(l.select_where(|s| *s == "gamma"));
        l.sort_by(|a, b| a.cmp(b));
        let view: Vec<&str> = l.shown().copied().collect();
        assert_eq!(view, vec!["alpha", "alphabet", "beta", "gamma"]);
        assert_eq!(l.items[0], "beta");
        assert_eq!(l.selected_item(), Some(&"gamma"));

        l.refilter();
        assert_eq!(l.shown().next(), Some(&"beta"));
        assert_eq!(l.selected_item(), Some(&"gamma"));
        assert!(!l.select_where(|s| s.is_empty()));
    }

    #[test]
    fn scrolling_follows_selection() {
        let mut l = list();
        l.select_down(3);
        l.ensure_visible(2);
        assert_eq!(l.selected_in_view(2), 1);
        assert_eq!(l.visible_items(2).copied().collect::<Vec<_>>(), vec!["gamma", "alphabet"]);
        l.select_first();
        l.ensure_visible(2);
        assert_eq!(l.visible_items(2).next(), Some(&"beta"));
    }
}

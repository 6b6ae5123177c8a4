//! Single-active-item view state: the reviews slider and the FAQ and
//! documentation accordions.

/// Reviews slider showing `visible` consecutive items starting at `index`.
///
/// `index` always stays in `0..=last_index()`; `next` and `prev` wrap
/// around. Autoplay advances on `tick` until the first manual move, after
/// which it stays off for the lifetime of the carousel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carousel {
    len: usize,
    visible: usize,
    index: usize,
    autoplay: bool,
}

impl Carousel {
    pub fn new(len: usize, visible: usize) -> Self {
        Self {
            len,
            visible: visible.max(1),
            index: 0,
            autoplay: true,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Highest start index; 0 when everything fits at once.
    pub fn last_index(&self) -> usize {
        self.len.saturating_sub(self.visible)
    }

    /// Item indices currently on screen.
    pub fn visible_range(&self) -> std::ops::Range<usize> {
        self.index..(self.index + self.visible).min(self.len)
    }

    fn advance(&mut self) {
        self.index = if self.index >= self.last_index() {
            0
        } else {
            self.index + 1
        };
    }

    fn retreat(&mut self) {
        self.index = if self.index == 0 {
            self.last_index()
        } else {
            self.index - 1
        };
    }

    pub fn next(&mut self) {
        self.autoplay = false;
        self.advance();
    }

    pub fn prev(&mut self) {
        self.autoplay = false;
        self.retreat();
    }

    /// Jump to a dot indicator. Out-of-range targets clamp to the last slot.
    pub fn go_to(&mut self, index: usize) {
        self.autoplay = false;
        self.index = index.min(self.last_index());
    }

    /// Autoplay timer fired. Returns whether the carousel moved.
    pub fn tick(&mut self) -> bool {
        if !self.autoplay || self.last_index() == 0 {
            return false;
        }
        self.advance();
        true
    }
}

/// Accordion with at most one open entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accordion<K> {
    ids: Vec<K>,
    active: Option<K>,
}

impl<K: Clone + PartialEq> Accordion<K> {
    pub fn new(ids: Vec<K>) -> Self {
        Self { ids, active: None }
    }

    /// Start with `id` open, if it is one of the entries.
    pub fn with_active(ids: Vec<K>, id: K) -> Self {
        let active = ids.contains(&id).then_some(id);
        Self { ids, active }
    }

    pub fn active(&self) -> Option<&K> {
        self.active.as_ref()
    }

    pub fn is_open(&self, id: &K) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// Open `id`, or close it if it is already open. Unknown ids are ignored.
    pub fn toggle(&mut self, id: &K) {
        if !self.ids.contains(id) {
            return;
        }
        self.active = if self.is_open(id) {
            None
        } else {
            Some(id.clone())
        };
    }

    fn position(&self) -> Option<usize> {
        let active = self.active.as_ref()?;
        self.ids.iter().position(|id| id == active)
    }

    /// Open the entry after the active one, wrapping to the first.
    pub fn next(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let index = self.position().map_or(0, |i| (i + 1) % self.ids.len());
        self.active = Some(self.ids[index].clone());
    }

    /// Open the entry before the active one, wrapping to the last.
    pub fn prev(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        let len = self.ids.len();
        let index = self.position().map_or(len - 1, |i| (i + len - 1) % len);
        self.active = Some(self.ids[index].clone());
    }
}

//! Headless list virtualization
//!
//! Keeps render cost constant for tall fixed-row-height lists by
//! materializing only the rows intersecting the viewport, plus a buffer on
//! each edge to avoid flicker on fast scroll. Two zero-content spacers
//! preserve scrollbar geometry and absolute scroll position.
//!
//! The engine is UI-agnostic: the embedding layer feeds it scroll and
//! resize notifications and pulls one `Frame` per frame tick. Multiple
//! notifications between ticks coalesce into a single render.

/// Contiguous index range of the backing list currently materialized.
/// Derived on every render, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderWindow {
    pub start: usize,
    pub end: usize,
}

impl RenderWindow {
    /// Number of rows materialized for this window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One rendered frame handed to the UI layer.
#[derive(Debug, PartialEq)]
pub enum Frame<R> {
    /// Backing list is empty: present a single "no data" placeholder row.
    /// No spacers, no windowing.
    Empty,
    /// Rows in `range`, preceded and followed by zero-content spacers
    /// sized so total scroll height matches the full list.
    Window {
        top_spacer: f64,
        rows: Vec<R>,
        bottom_spacer: f64,
        range: RenderWindow,
    },
}

/// Virtual-scrolling engine over a memory-resident item list.
///
/// Windowing is index-based: `set_items` replaces the whole list and the
/// engine does not diff or key by item identity, so identity and order must
/// be kept stable by the caller across updates.
pub struct VirtualList<T, R> {
    items: Vec<T>,
    row_height: f64,
    viewport_height: f64,
    buffer: usize,
    render_row: Box<dyn Fn(&T, usize) -> R>,
    scroll_top: f64,
    dirty: bool,
}

impl<T, R> VirtualList<T, R> {
    /// Create an engine over `items` with a fixed `row_height`, the current
    /// `viewport_height`, and `buffer` extra rows rendered past each edge.
    pub fn new(
        items: Vec<T>,
        row_height: f64,
        viewport_height: f64,
        buffer: usize,
        render_row: impl Fn(&T, usize) -> R + 'static,
    ) -> Self {
        Self {
            items,
            row_height: row_height.max(1.0),
            viewport_height: viewport_height.max(0.0),
            buffer,
            render_row: Box::new(render_row),
            scroll_top: 0.0,
            dirty: true,
        }
    }

    /// Replace the backing list and force a re-render from scratch.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.dirty = true;
    }

    /// Record a new scroll offset (pixels from the top of the full list).
    pub fn on_scroll(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top.max(0.0);
        self.dirty = true;
    }

    /// Record a new viewport height.
    pub fn on_resize(&mut self, viewport_height: f64) {
        self.viewport_height = viewport_height.max(0.0);
        self.dirty = true;
    }

    /// Per-frame-tick entry point: render if anything changed since the
    /// last tick, else `None`. However many scroll or resize events arrived
    /// in between, this computes at most one frame.
    pub fn frame(&mut self) -> Option<Frame<R>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.render())
    }

    /// Compute the current frame unconditionally.
    pub fn render(&self) -> Frame<R> {
        if self.items.is_empty() {
            return Frame::Empty;
        }

        let range = self.window();
        let rows = self.items[range.start..range.end]
            .iter()
            .enumerate()
            .map(|(offset, item)| (self.render_row)(item, range.start + offset))
            .collect();

        Frame::Window {
            top_spacer: range.start as f64 * self.row_height,
            rows,
            bottom_spacer: (self.items.len() - range.end) as f64 * self.row_height,
            range,
        }
    }

    /// The index window `[start, end)` for the current geometry, clamped to
    /// the list bounds.
    pub fn window(&self) -> RenderWindow {
        if self.items.is_empty() {
            return RenderWindow { start: 0, end: 0 };
        }

        let first = (self.scroll_top / self.row_height).floor() as usize;
        let last = ((self.scroll_top + self.viewport_height) / self.row_height).ceil() as usize;

        let end = (last + self.buffer).min(self.items.len());
        let start = first.saturating_sub(self.buffer).min(end);

        RenderWindow { start, end }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }
}

use super::pagination::DotWindow;

/// UI-facing viewer state. The engine never touches widgets directly: every
/// state transition mutates this struct and the UI layer renders from it,
/// which also makes the side effects of zero-duration transitions
/// observable in tests.
#[derive(Clone, Debug)]
pub struct ChromeState {
    pub overlay_visible: bool,
    /// 0..1, tracks open/close progress; the backdrop dim fades with it.
    pub backdrop_alpha: f32,
    pub caption: String,
    /// "3 / 12" style counter.
    pub counter: String,
    /// False while an animation or decode is in flight; prev/next/close
    /// buttons render disabled.
    pub controls_enabled: bool,
    /// Set when the overlay closes: the grid returns keyboard focus to this
    /// item's tile. Consumed with `take_focus_return`.
    pub focus_return: Option<usize>,
    pub dots: DotWindow,
    /// Last surfaced failure, consumed by the UI as a toast.
    pub last_error: Option<String>,
}

impl ChromeState {
    pub fn new(max_visible_dots: usize) -> Self {
        Self {
            overlay_visible: false,
            backdrop_alpha: 0.0,
            caption: String::new(),
            counter: String::new(),
            controls_enabled: false,
            focus_return: None,
            dots: DotWindow::new(max_visible_dots),
            last_error: None,
        }
    }

    /// Caption, counter and dot window for the item at `index`.
    pub fn show_item(&mut self, index: usize, len: usize, title: &str) {
        self.caption = title.to_string();
        self.counter = format!("{} / {}", index + 1, len);
        self.dots.slide_to(index, len);
    }

    pub fn close_complete(&mut self, index: usize) {
        self.overlay_visible = false;
        self.backdrop_alpha = 0.0;
        self.controls_enabled = false;
        self.focus_return = Some(index);
    }

    pub fn reset(&mut self) {
        self.overlay_visible = false;
        self.backdrop_alpha = 0.0;
        self.caption.clear();
        self.counter.clear();
        self.controls_enabled = false;
        self.focus_return = None;
        self.dots.reset();
        self.last_error = None;
    }

    pub fn take_focus_return(&mut self) -> Option<usize> {
        self.focus_return.take()
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_item_formats_the_counter() {
        let mut c = ChromeState::new(5);
        c.show_item(2, 12, "Dunes");
        assert_eq!(c.counter, "3 / 12");
        assert_eq!(c.caption, "Dunes");
    }

    #[test]
    fn close_complete_hides_and_returns_focus() {
        let mut c = ChromeState::new(5);
        c.overlay_visible = true;
        c.backdrop_alpha = 1.0;
        c.close_complete(4);
        assert!(!c.overlay_visible);
        assert_eq!(c.backdrop_alpha, 0.0);
        assert_eq!(c.take_focus_return(), Some(4));
        assert_eq!(c.take_focus_return(), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut c = ChromeState::new(5);
        c.overlay_visible = true;
        c.caption = "x".into();
        c.last_error = Some("boom".into());
        c.reset();
        assert!(!c.overlay_visible);
        assert!(c.caption.is_empty());
        assert!(c.last_error.is_none());
        assert_eq!(c.dots.start(), 0);
    }
}

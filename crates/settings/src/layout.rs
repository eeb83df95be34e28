//! Responsive layout state of the chat view.

/// Widths below this are treated as mobile.
pub const MOBILE_BREAKPOINT: u32 = 768;
/// The message input never grows past this height.
pub const MAX_INPUT_HEIGHT: u32 = 120;
/// Resting height of the message input.
pub const MIN_INPUT_HEIGHT: u32 = 44;
/// Heights above this switch the input to multi-line styling.
pub const MULTILINE_THRESHOLD: u32 = 50;

/// Content of the right-hand panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanelView {
    #[default]
    Users,
    Settings,
    QrCode,
}

/// How the input container is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStyle {
    Normal,
    /// Files are being dragged over the window.
    DropTarget,
}

/// Layout state of the chat view.
#[derive(Debug, Clone)]
pub struct LayoutState {
    pub window_width: u32,
    pub dragging: bool,
    pub multi_line: bool,
    pub input_height: u32,
    pub panel: PanelView,
    pub show_mobile_users: bool,
    /// Text currently in the message input.
    pub input: String,
}

impl LayoutState {
    pub fn new(window_width: u32) -> Self {
        Self {
            window_width,
            dragging: false,
            multi_line: false,
            input_height: MIN_INPUT_HEIGHT,
            panel: PanelView::default(),
            show_mobile_users: false,
            input: String::new(),
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.window_width < MOBILE_BREAKPOINT
    }

    pub fn resize_window(&mut self, width: u32) {
        self.window_width = width;
    }

    pub fn placeholder(&self) -> &'static str {
        if self.dragging {
            "Release to send files..."
        } else if self.is_mobile() {
            "Send a message..."
        } else {
            "Send a message, or paste or drop files and folders here"
        }
    }

    pub fn input_style(&self) -> InputStyle {
        if self.dragging {
            InputStyle::DropTarget
        } else {
            InputStyle::Normal
        }
    }

    /// Sizes the input to its content, capped at [`MAX_INPUT_HEIGHT`].
    /// Returns the applied height.
    pub fn auto_resize(&mut self, scroll_height: u32) -> u32 {
        let height = scroll_height.min(MAX_INPUT_HEIGHT);
        self.input_height = height;
        self.multi_line = height > MULTILINE_THRESHOLD;
        height
    }

    /// Clears the input after a send.
    pub fn reset_input(&mut self) {
        self.input.clear();
        self.input_height = MIN_INPUT_HEIGHT;
        self.multi_line = false;
    }

    pub fn show_panel(&mut self, view: PanelView) {
        self.panel = view;
    }

    pub fn toggle_mobile_users(&mut self) {
        self.show_mobile_users = !self.show_mobile_users;
    }
}

impl Default for LayoutState {
    fn default() -> Self {
        Self::new(1024)
    }
}

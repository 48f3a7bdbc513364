use std::time::Duration;

pub mod grid;

pub use grid::ButtonGrid;

/// How long a success/failure tint stays visible after a push response.
pub const FEEDBACK_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelKind {
    #[default]
    Text,
    Icon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feedback {
    #[default]
    None,
    Success,
    Failure,
}

/// Presentation-facing state of one button. The default is what `get`
/// returns for coordinates the server has not spoken about yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ButtonState {
    pub label: String,
    pub label_kind: LabelKind,
    pub feedback: Feedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridTopology {
    pub rows: u16,
    pub cols: u16,
}

impl GridTopology {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x < self.cols && y < self.rows
    }
}

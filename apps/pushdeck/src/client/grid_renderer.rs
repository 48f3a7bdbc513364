use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::cache::{ButtonState, Feedback, GridTopology, LabelKind};
use crate::session::ConnectionState;

/// Everything the renderer needs for one frame, assembled by the client
/// loop from store snapshots. Cells are indexed [y][x].
pub struct GridView {
    pub state: ConnectionState,
    pub topology: Option<GridTopology>,
    pub cells: Vec<Vec<ButtonState>>,
    pub cursor: (u16, u16),
    pub note: Option<String>,
}

/// Draws the status banner and the button grid, and keeps a hit map of the
/// last laid-out cell rectangles for mouse lookup.
#[derive(Default)]
pub struct GridRenderer {
    hit_map: Vec<(Rect, (u16, u16))>,
}

impl GridRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The grid coordinate under a terminal position, if any.
    pub fn cell_at(&self, column: u16, row: u16) -> Option<(u16, u16)> {
        let position = Position::new(column, row);
        self.hit_map
            .iter()
            .find(|(rect, _)| rect.contains(position))
            .map(|(_, coord)| *coord)
    }

    pub fn render_frame(&mut self, frame: &mut Frame<'_>, view: &GridView) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(frame.area());

        self.render_status(frame, chunks[0], view);
        self.render_grid(frame, chunks[1], view);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect, view: &GridView) {
        let (marker, style) = match view.state {
            ConnectionState::Connecting => (
                "● connecting…",
                Style::default().fg(Color::Yellow),
            ),
            ConnectionState::Open => ("● online", Style::default().fg(Color::Green)),
            ConnectionState::Closing | ConnectionState::Closed => (
                "● offline, retrying",
                Style::default().fg(Color::Red),
            ),
        };
        let mut spans = vec![Span::styled(marker, style)];
        if let Some(note) = &view.note {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                note.clone(),
                Style::default().fg(Color::Magenta),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_grid(&mut self, frame: &mut Frame<'_>, area: Rect, view: &GridView) {
        self.hit_map.clear();

        let Some(topology) = view.topology else {
            let placeholder = Paragraph::new("waiting for grid size…")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(placeholder, area);
            return;
        };
        if topology.rows == 0 || topology.cols == 0 {
            return;
        }

        let row_constraints =
            vec![Constraint::Ratio(1, u32::from(topology.rows)); topology.rows as usize];
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(row_constraints)
            .split(area);

        for (y, row_area) in rows.iter().enumerate() {
            let col_constraints =
                vec![Constraint::Ratio(1, u32::from(topology.cols)); topology.cols as usize];
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints(col_constraints)
                .split(*row_area);

            for (x, cell_area) in cols.iter().enumerate() {
                let coord = (x as u16, y as u16);
                self.hit_map.push((*cell_area, coord));
                let state = view
                    .cells
                    .get(y)
                    .and_then(|row| row.get(x))
                    .cloned()
                    .unwrap_or_default();
                self.render_cell(frame, *cell_area, coord, &state, view.cursor);
            }
        }
    }

    fn render_cell(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        coord: (u16, u16),
        state: &ButtonState,
        cursor: (u16, u16),
    ) {
        let border_style = if coord == cursor {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let cell_style = match state.feedback {
            Feedback::Success => Style::default().bg(Color::Green).fg(Color::Black),
            Feedback::Failure => Style::default().bg(Color::Red).fg(Color::Black),
            Feedback::None => Style::default(),
        };

        // Icon assets are not resolved locally; show the identifier marked
        // so it is distinguishable from literal text.
        let label = match state.label_kind {
            LabelKind::Icon => format!("[{}]", state.label),
            LabelKind::Text => state.label.clone(),
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style);
        let paragraph = Paragraph::new(label)
            .alignment(Alignment::Center)
            .style(cell_style)
            .block(block);
        frame.render_widget(paragraph, area);
    }
}

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{ButtonState, FEEDBACK_WINDOW, Feedback, GridTopology, LabelKind};
use crate::protocol::ServerEvent;

#[derive(Debug, Default, Clone)]
struct Cell {
    label: String,
    label_kind: LabelKind,
    feedback: Option<(Feedback, Instant)>,
}

#[derive(Debug, Default)]
struct GridInner {
    topology: Option<GridTopology>,
    cells: HashMap<(u16, u16), Cell>,
}

/// Server-authoritative button state, keyed by grid coordinate.
///
/// Written by exactly one path (the connection manager's dispatch) and read
/// concurrently by rendering. Feedback expiry is evaluated lazily on read,
/// so there is no per-cell timer.
#[derive(Debug, Default)]
pub struct ButtonGrid {
    inner: RwLock<GridInner>,
}

impl ButtonGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with a fixed, configuration-supplied topology.
    pub fn with_topology(rows: u16, cols: u16) -> Self {
        Self {
            inner: RwLock::new(GridInner {
                topology: Some(GridTopology { rows, cols }),
                cells: HashMap::new(),
            }),
        }
    }

    pub fn topology(&self) -> Option<GridTopology> {
        self.inner.read().topology
    }

    pub fn apply(&self, event: &ServerEvent) {
        self.apply_at(event, Instant::now());
    }

    pub fn apply_at(&self, event: &ServerEvent, now: Instant) {
        let mut inner = self.inner.write();
        match event {
            ServerEvent::SetText {
                x,
                y,
                text,
                is_icon,
            } => {
                if out_of_bounds(&inner, *x, *y) {
                    trace!(target = "cache::grid", x, y, "set_text outside topology, ignoring");
                    return;
                }
                let cell = inner.cells.entry((*x, *y)).or_default();
                cell.label = text.clone();
                cell.label_kind = if *is_icon {
                    LabelKind::Icon
                } else {
                    LabelKind::Text
                };
                // A fresh label supersedes any stale push feedback.
                cell.feedback = None;
            }
            ServerEvent::PushOk { x, y } => {
                self.set_feedback(&mut inner, *x, *y, Feedback::Success, now);
            }
            ServerEvent::PushError { x, y } => {
                self.set_feedback(&mut inner, *x, *y, Feedback::Failure, now);
            }
            ServerEvent::Size { rows, cols } => {
                let topology = GridTopology {
                    rows: *rows,
                    cols: *cols,
                };
                inner.topology = Some(topology);
                inner.cells.retain(|&(x, y), _| topology.contains(x, y));
                debug!(target = "cache::grid", rows, cols, "topology replaced");
            }
        }
    }

    fn set_feedback(&self, inner: &mut GridInner, x: u16, y: u16, feedback: Feedback, now: Instant) {
        if out_of_bounds(inner, x, y) {
            trace!(target = "cache::grid", x, y, "feedback outside topology, ignoring");
            return;
        }
        let cell = inner.cells.entry((x, y)).or_default();
        cell.feedback = Some((feedback, now + FEEDBACK_WINDOW));
    }

    pub fn get(&self, x: u16, y: u16) -> ButtonState {
        self.get_at(x, y, Instant::now())
    }

    pub fn get_at(&self, x: u16, y: u16, now: Instant) -> ButtonState {
        let inner = self.inner.read();
        let Some(cell) = inner.cells.get(&(x, y)) else {
            return ButtonState::default();
        };
        let feedback = match cell.feedback {
            Some((feedback, expires_at)) if now < expires_at => feedback,
            _ => Feedback::None,
        };
        ButtonState {
            label: cell.label.clone(),
            label_kind: cell.label_kind,
            feedback,
        }
    }
}

/// Bounds are only enforced once a topology is known; before that the server
/// may legitimately be ahead of us.
fn out_of_bounds(inner: &GridInner, x: u16, y: u16) -> bool {
    matches!(inner.topology, Some(topology) if !topology.contains(x, y))
}

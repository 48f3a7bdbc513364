use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::debug;

use crate::app::GridApp;
use crate::session::SendError;

pub mod grid_renderer;

use grid_renderer::{GridRenderer, GridView};

const TICK: Duration = Duration::from_millis(25);
const NOTE_TTL: Duration = Duration::from_secs(2);

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// Interactive TUI around a [`GridApp`]: renders the button grid from store
/// snapshots and turns key/mouse activations into push commands. Contains
/// no protocol logic.
pub struct GridClient {
    app: Arc<GridApp>,
    renderer: GridRenderer,
    tui: Option<Terminal<CrosstermBackend<io::Stdout>>>,
    cursor: (u16, u16),
    note: Option<(String, Instant)>,
}

impl GridClient {
    pub fn new(app: Arc<GridApp>) -> Self {
        Self {
            app,
            renderer: GridRenderer::new(),
            tui: None,
            cursor: (0, 0),
            note: None,
        }
    }

    pub async fn run(mut self) -> Result<(), ClientError> {
        self.setup_tui()?;
        debug!(target = "client::loop", "client loop started");
        let result = self.run_loop().await;
        self.teardown_tui()?;
        debug!(target = "client::loop", "client loop stopped");
        result
    }

    async fn run_loop(&mut self) -> Result<(), ClientError> {
        loop {
            if self.pump_input()? {
                return Ok(());
            }
            self.render()?;
            tokio::time::sleep(TICK).await;
        }
    }

    /// Drain pending terminal events; returns true on quit.
    fn pump_input(&mut self) -> Result<bool, ClientError> {
        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) => {
                    if self.handle_key(&key) {
                        return Ok(true);
                    }
                }
                Event::Mouse(mouse) => self.handle_mouse(&mouse),
                Event::Resize(_, _) => {} // next render picks up the new area
                _ => {}
            }
        }
        Ok(false)
    }

    fn handle_key(&mut self, key: &KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Left => self.move_cursor(-1, 0),
            KeyCode::Right => self.move_cursor(1, 0),
            KeyCode::Up => self.move_cursor(0, -1),
            KeyCode::Down => self.move_cursor(0, 1),
            KeyCode::Enter | KeyCode::Char(' ') => {
                let (x, y) = self.cursor;
                self.push(x, y);
            }
            _ => {}
        }
        false
    }

    fn handle_mouse(&mut self, mouse: &MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        if let Some((x, y)) = self.renderer.cell_at(mouse.column, mouse.row) {
            self.cursor = (x, y);
            self.push(x, y);
        }
    }

    fn move_cursor(&mut self, dx: i32, dy: i32) {
        let Some(topology) = self.app.topology() else {
            return;
        };
        if topology.rows == 0 || topology.cols == 0 {
            return;
        }
        let max_x = i32::from(topology.cols) - 1;
        let max_y = i32::from(topology.rows) - 1;
        let x = (i32::from(self.cursor.0) + dx).clamp(0, max_x);
        let y = (i32::from(self.cursor.1) + dy).clamp(0, max_y);
        self.cursor = (x as u16, y as u16);
    }

    fn push(&mut self, x: u16, y: u16) {
        match self.app.push(x, y) {
            Ok(()) => {}
            Err(SendError::NotConnected) => {
                // Pushes are not queued; tell the user so they can retry.
                self.note = Some(("not connected; push dropped".into(), Instant::now()));
            }
            Err(err) => {
                debug!(target = "client::push", %err, "push failed");
            }
        }
    }

    fn render(&mut self) -> Result<(), ClientError> {
        let view = self.build_view();
        if let Some(tui) = &mut self.tui {
            let renderer = &mut self.renderer;
            tui.draw(|frame| renderer.render_frame(frame, &view))?;
        }
        Ok(())
    }

    fn build_view(&mut self) -> GridView {
        let topology = self.app.topology();
        let cells = match topology {
            Some(topology) => (0..topology.rows)
                .map(|y| {
                    (0..topology.cols)
                        .map(|x| self.app.get(x, y))
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };
        let note = self
            .note
            .as_ref()
            .and_then(|(text, at)| (at.elapsed() < NOTE_TTL).then(|| text.clone()));
        if note.is_none() {
            self.note = None;
        }
        GridView {
            state: self.app.state(),
            topology,
            cells,
            cursor: self.cursor,
            note,
        }
    }

    fn setup_tui(&mut self) -> Result<(), ClientError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor().ok();
        self.tui = Some(terminal);
        Ok(())
    }

    fn teardown_tui(&mut self) -> Result<(), ClientError> {
        if let Some(mut terminal) = self.tui.take() {
            terminal.show_cursor().ok();
        }
        disable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, LeaveAlternateScreen, DisableMouseCapture)?;
        stdout.flush()?;
        Ok(())
    }
}

//! Dwell whack-a-mole game.
//!
//! The `Game` owns the grid of dwell cells, the mole and the score. It
//! is driven from outside: `tick()` at the cell interval, `mole_tick()`
//! at the mole interval, and `focus`/`shoot` from the controllers. Every
//! visible change goes to the `Renderer`; changes other components react
//! to are queued as `GameEvent`s and drained by the session.

pub mod cell;
pub mod corrector;
pub mod filter;
pub mod gaze_controller;
pub mod mole;
pub mod mouse_controller;
pub mod renderer;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{ControllerType, OptionsHandle};
use cell::{Activation, Cell, DwellTiming};
use mole::{Mole, MoleKind};
use renderer::{RenderTarget, Renderer};

// ── Events ──────────────────────────────────────────────────

/// State changes of interest outside the game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Focus moved to a cell; `(-1, -1)` when cleared.
    FocusChanged { x: i32, y: i32 },
    ShotOn { x: i32, y: i32 },
    ShotOff { x: i32, y: i32 },
    MoleVisibilityChanged(Mole),
    ScoreChanged(i32),
}

// ── Game ────────────────────────────────────────────────────

pub struct Game {
    options: OptionsHandle,
    renderer: Box<dyn Renderer>,
    rng: StdRng,
    cols: i32,
    rows: i32,
    cells: Vec<Cell>,
    mole: Mole,
    score: i32,
    focused: Option<(i32, i32)>,
    shot: Option<(i32, i32)>,
    running: bool,
    events: Vec<GameEvent>,
}

impl Game {
    pub fn new(options: OptionsHandle, renderer: Box<dyn Renderer>, rng: StdRng) -> Self {
        let mut game = Self {
            options,
            renderer,
            rng,
            cols: 0,
            rows: 0,
            cells: Vec::new(),
            mole: Mole::default(),
            score: 0,
            focused: None,
            shot: None,
            running: false,
            events: Vec::new(),
        };
        game.build_grid();
        game
    }

    fn build_grid(&mut self) {
        let (cols, rows) = {
            let o = self.options.get();
            (o.cell_x.max(1), o.cell_y.max(1))
        };
        self.cols = cols;
        self.rows = rows;
        self.cells = (0..rows)
            .flat_map(|y| (0..cols).map(move |x| Cell::new(x, y)))
            .collect();
        debug!("grid {}x{}", cols, rows);
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Start the tickers. The grid is rebuilt if its size changed.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        let size_changed = {
            let o = self.options.get();
            o.cell_x.max(1) != self.cols || o.cell_y.max(1) != self.rows
        };
        if size_changed {
            self.build_grid();
        }
        self.running = true;
        info!("game started ({}x{})", self.cols, self.rows);
    }

    /// Stop the game and return every piece of state to its initial value.
    pub fn stop(&mut self) {
        self.running = false;

        for cell in self.cells.iter_mut() {
            cell.reset();
            cell.can_be_activated = false;
        }

        self.renderer.hide(RenderTarget::Mole);
        self.renderer.hide(RenderTarget::Focus);
        self.renderer.hide(RenderTarget::Shot);

        if self.mole.is_visible {
            self.mole.reset();
            self.events.push(GameEvent::MoleVisibilityChanged(self.mole));
        }

        self.score = 0;
        self.renderer.set_score(0);
        self.events.push(GameEvent::ScoreChanged(0));

        self.focused = None;
        self.shot = None;
        info!("game stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn mole(&self) -> &Mole {
        &self.mole
    }

    pub fn focused_cell(&self) -> Option<(i32, i32)> {
        self.focused
    }

    pub fn shot_cell(&self) -> Option<(i32, i32)> {
        self.shot
    }

    pub fn cell(&self, x: i32, y: i32) -> Option<&Cell> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    pub fn grid_size(&self) -> (i32, i32) {
        (self.cols, self.rows)
    }

    /// Take the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if (0..self.cols).contains(&x) && (0..self.rows).contains(&y) {
            Some((y * self.cols + x) as usize)
        } else {
            None
        }
    }

    fn timing(&self) -> DwellTiming {
        let o = self.options.get();
        DwellTiming {
            dwell_time_ms: o.dwell_time_ms,
            shot_duration_ms: o.shot_duration_ms,
        }
    }

    // ── Input ───────────────────────────────────────────────

    /// Move focus to a cell. Coordinates outside the grid clear it;
    /// focusing the already focused cell does nothing.
    pub fn focus(&mut self, x: i32, y: i32) {
        let target = self.index(x, y).map(|_| (x, y));
        if target == self.focused {
            return;
        }

        if let Some((ox, oy)) = self.focused.take() {
            let change = self
                .index(ox, oy)
                .and_then(|i| self.cells[i].remove_focus());
            if let Some(activation) = change {
                self.on_activation(ox, oy, activation);
            }
        }

        match target {
            Some((nx, ny)) => {
                if let Some(i) = self.index(nx, ny) {
                    self.cells[i].set_focus();
                }
                self.focused = Some((nx, ny));
                self.renderer.show(RenderTarget::Focus, nx, ny);
                self.events.push(GameEvent::FocusChanged { x: nx, y: ny });
                debug!("focus {},{}", nx, ny);
            }
            None => {
                self.renderer.hide(RenderTarget::Focus);
                self.events.push(GameEvent::FocusChanged { x: -1, y: -1 });
                debug!("focus cleared");
            }
        }
    }

    /// Remove focus and hide any shot marker.
    pub fn clear_focus(&mut self) {
        self.focus(-1, -1);
        if self.shot.take().is_some() {
            self.renderer.hide(RenderTarget::Shot);
        }
    }

    /// Activate a cell at once, skipping the dwell.
    pub fn shoot(&mut self, x: i32, y: i32) {
        let Some(i) = self.index(x, y) else {
            warn!("shoot outside the grid: {},{}", x, y);
            return;
        };
        let timing = self.timing();
        let activation = self.cells[i].shoot(&timing);
        self.on_activation(x, y, activation);
    }

    /// Forward the current gaze position (screen pixels) to the renderer.
    pub fn set_gaze(&mut self, x: f64, y: f64) {
        if self.options.get().show_gaze_cursor {
            self.renderer.set_gaze_cursor(x, y);
        }
    }

    // ── Tickers ─────────────────────────────────────────────

    /// Advance every cell by one cell interval.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let (interval, gaze_mode) = {
            let o = self.options.get();
            (o.cell_tick_interval_ms, o.controller == ControllerType::Gaze)
        };
        let timing = self.timing();

        for i in 0..self.cells.len() {
            if let Some(activation) = self.cells[i].tick(interval, &timing, gaze_mode) {
                let (x, y) = (self.cells[i].x(), self.cells[i].y());
                self.on_activation(x, y, activation);
            }
        }
    }

    /// One mole timer period: toggle the mole with `mole_event_rate`.
    pub fn mole_tick(&mut self) {
        if !self.running {
            return;
        }
        let rate = self.options.get().mole_event_rate;
        if self.rng.gen::<f64>() < rate {
            self.toggle_mole();
        }
    }

    // ── Internals ───────────────────────────────────────────

    fn toggle_mole(&mut self) {
        if self.mole.is_visible {
            if let Some(i) = self.index(self.mole.x, self.mole.y) {
                self.cells[i].can_be_activated = false;
            }
        }

        let no_go = {
            let o = self.options.get();
            o.go_no_go_enabled.then_some(o.no_go_probability)
        };
        self.mole
            .reverse_visibility(&mut self.rng, self.cols, self.rows, no_go);

        if self.mole.is_visible {
            if let Some(i) = self.index(self.mole.x, self.mole.y) {
                self.cells[i].can_be_activated = true;
            }
            self.renderer.set_mole_kind(self.mole.kind);
            self.renderer
                .show(RenderTarget::Mole, self.mole.x, self.mole.y);
            debug!(
                "mole ({}) at {},{}",
                self.mole.kind.as_str(),
                self.mole.x,
                self.mole.y
            );
        } else {
            self.renderer.hide(RenderTarget::Mole);
            debug!("mole hidden");
        }
        self.events.push(GameEvent::MoleVisibilityChanged(self.mole));
    }

    fn on_activation(&mut self, x: i32, y: i32, activation: Activation) {
        match activation {
            Activation::Active => {
                self.shot = Some((x, y));
                self.renderer.show(RenderTarget::Shot, x, y);
                self.events.push(GameEvent::ShotOn { x, y });

                if self.mole.is_in_cell(x, y) {
                    let kind = self.mole.kind;
                    self.toggle_mole();
                    self.award(kind);
                }
            }
            Activation::Inactive => {
                if self.shot == Some((x, y)) {
                    self.shot = None;
                    self.renderer.hide(RenderTarget::Shot);
                }
                self.events.push(GameEvent::ShotOff { x, y });
            }
        }
    }

    fn award(&mut self, kind: MoleKind) {
        let points = self.options.get().points_per_hit;
        self.score = match kind {
            MoleKind::Go => self.score + points,
            MoleKind::NoGo => (self.score - points).max(0),
        };
        self.renderer.set_score(self.score);
        self.events.push(GameEvent::ScoreChanged(self.score));
        info!("{} hit, score {}", kind.as_str(), self.score);
    }
}

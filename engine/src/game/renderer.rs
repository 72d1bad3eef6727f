//! Renderer sink — the game's only output surface.
//!
//! The game never draws; it tells a `Renderer` which marker to show in
//! which cell. `LogRenderer` traces the commands (headless runs),
//! `RecordingRenderer` keeps them for inspection in tests.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use super::mole::MoleKind;

/// Visual markers placed on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Mole,
    Shot,
    Focus,
}

impl RenderTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mole => "mole",
            Self::Shot => "shot",
            Self::Focus => "focus",
        }
    }
}

/// Consumer of the game's visual changes.
pub trait Renderer {
    /// Show a marker at a grid cell.
    fn show(&mut self, target: RenderTarget, x: i32, y: i32);
    /// Hide a marker.
    fn hide(&mut self, target: RenderTarget);
    fn set_score(&mut self, score: i32);
    /// Move the gaze cursor, in screen pixels.
    fn set_gaze_cursor(&mut self, x: f64, y: f64);
    /// Choose the mole picture; called before the mole is shown.
    fn set_mole_kind(&mut self, _kind: MoleKind) {}
}

/// One renderer call, as recorded by `RecordingRenderer`.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Show { target: RenderTarget, x: i32, y: i32 },
    Hide { target: RenderTarget },
    SetScore(i32),
    SetGazeCursor { x: f64, y: f64 },
    SetMoleKind(MoleKind),
}

/// Renderer that stores every command. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    commands: Rc<RefCell<Vec<RenderCommand>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the commands so far.
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.borrow().clone()
    }

    /// Commands other than gaze cursor moves.
    pub fn markers(&self) -> Vec<RenderCommand> {
        self.commands
            .borrow()
            .iter()
            .filter(|c| !matches!(c, RenderCommand::SetGazeCursor { .. }))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.commands.borrow_mut().clear();
    }

    fn push(&self, command: RenderCommand) {
        self.commands.borrow_mut().push(command);
    }
}

impl Renderer for RecordingRenderer {
    fn show(&mut self, target: RenderTarget, x: i32, y: i32) {
        self.push(RenderCommand::Show { target, x, y });
    }

    fn hide(&mut self, target: RenderTarget) {
        self.push(RenderCommand::Hide { target });
    }

    fn set_score(&mut self, score: i32) {
        self.push(RenderCommand::SetScore(score));
    }

    fn set_gaze_cursor(&mut self, x: f64, y: f64) {
        self.push(RenderCommand::SetGazeCursor { x, y });
    }

    fn set_mole_kind(&mut self, kind: MoleKind) {
        self.push(RenderCommand::SetMoleKind(kind));
    }
}

/// Renderer for headless runs: every command becomes a trace event.
#[derive(Debug, Default)]
pub struct LogRenderer {
    /// Trace gaze cursor moves as well (very chatty).
    pub trace_gaze: bool,
}

impl Renderer for LogRenderer {
    fn show(&mut self, target: RenderTarget, x: i32, y: i32) {
        info!("show {} at ({}, {})", target.as_str(), x, y);
    }

    fn hide(&mut self, target: RenderTarget) {
        info!("hide {}", target.as_str());
    }

    fn set_score(&mut self, score: i32) {
        info!("score {}", score);
    }

    fn set_gaze_cursor(&mut self, x: f64, y: f64) {
        if self.trace_gaze {
            debug!("gaze cursor {:.0} {:.0}", x, y);
        }
    }

    fn set_mole_kind(&mut self, kind: MoleKind) {
        debug!("mole kind {}", kind.as_str());
    }
}

//! The mole: the transient target cell of the game.

use rand::Rng;

/// Whether hitting the mole earns or costs points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoleKind {
    Go,
    NoGo,
}

impl MoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::NoGo => "nogo",
        }
    }
}

/// Mole position and kind. Position is (-1, -1) while hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mole {
    pub is_visible: bool,
    pub x: i32,
    pub y: i32,
    pub kind: MoleKind,
}

impl Default for Mole {
    fn default() -> Self {
        Self {
            is_visible: false,
            x: -1,
            y: -1,
            kind: MoleKind::Go,
        }
    }
}

impl Mole {
    pub fn is_in_cell(&self, x: i32, y: i32) -> bool {
        self.is_visible && self.x == x && self.y == y
    }

    /// Hide the mole. The kind of the last mole is kept.
    pub fn reset(&mut self) {
        self.is_visible = false;
        self.x = -1;
        self.y = -1;
    }

    /// Flip visibility. A newly shown mole lands in a uniformly random
    /// cell and, with go/no-go enabled, is `NoGo` with `no_go_probability`.
    pub fn reverse_visibility<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        cell_x: i32,
        cell_y: i32,
        no_go_probability: Option<f64>,
    ) {
        if self.is_visible {
            self.reset();
            return;
        }
        self.is_visible = true;
        self.x = rng.gen_range(0..cell_x.max(1));
        self.y = rng.gen_range(0..cell_y.max(1));
        self.kind = match no_go_probability {
            Some(p) if rng.gen::<f64>() < p => MoleKind::NoGo,
            _ => MoleKind::Go,
        };
    }
}

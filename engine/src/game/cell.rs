//! Dwell cell — per-grid-cell focus and activation state machine.
//!
//! States (`Idle`, focused-and-accumulating, `Active`/shot) are encoded
//! by two flags and an attention counter in `[0, dwell + shot]`. The
//! game ticks every cell at a fixed interval whether or not it is
//! focused; activation changes are returned to the caller instead of
//! being broadcast.

use tracing::debug;

/// Activation change reported by a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Active,
    Inactive,
}

/// Dwell parameters, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellTiming {
    pub dwell_time_ms: i32,
    pub shot_duration_ms: i32,
}

impl DwellTiming {
    fn shot_counter(&self) -> i32 {
        self.dwell_time_ms + self.shot_duration_ms
    }
}

#[derive(Debug, Clone)]
pub struct Cell {
    x: i32,
    y: i32,
    /// Set only while this cell holds the visible mole.
    pub can_be_activated: bool,
    attention_counter: i32,
    is_focused: bool,
    is_activated: bool,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            can_be_activated: false,
            attention_counter: 0,
            is_focused: false,
            is_activated: false,
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn is_at(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }

    pub fn is_focused(&self) -> bool {
        self.is_focused
    }

    pub fn is_activated(&self) -> bool {
        self.is_activated
    }

    pub fn attention_counter(&self) -> i32 {
        self.attention_counter
    }

    pub fn set_focus(&mut self) {
        self.is_focused = true;
    }

    /// Drop focus; an active cell is switched off at once.
    pub fn remove_focus(&mut self) -> Option<Activation> {
        self.is_focused = false;
        if self.is_activated {
            self.is_activated = false;
            self.attention_counter = 0;
            debug!("cell {},{} off", self.x, self.y);
            return Some(Activation::Inactive);
        }
        None
    }

    /// Activate immediately, skipping the dwell accumulation.
    pub fn shoot(&mut self, timing: &DwellTiming) -> Activation {
        self.attention_counter = timing.shot_counter();
        self.is_activated = true;
        debug!("cell {},{} shot", self.x, self.y);
        Activation::Active
    }

    /// Clear all state without reporting anything.
    pub fn reset(&mut self) {
        self.is_focused = false;
        self.is_activated = false;
        self.attention_counter = 0;
    }

    /// Advance the cell by `interval` ms. `gaze_mode` is true when the
    /// gaze controller (not the mouse) drives the game.
    pub fn tick(&mut self, interval: i32, timing: &DwellTiming, gaze_mode: bool) -> Option<Activation> {
        if self.is_activated {
            return self.decrease_attention(interval, timing);
        }

        if self.is_focused
            && self.attention_counter < timing.dwell_time_ms
            && gaze_mode
            && self.can_be_activated
        {
            return self.increase_attention(interval, timing);
        }

        // Unfocused or not eligible: decay toward zero.
        self.attention_counter = (self.attention_counter - interval).max(0);
        None
    }

    fn decrease_attention(&mut self, interval: i32, timing: &DwellTiming) -> Option<Activation> {
        self.attention_counter -= interval;
        if self.attention_counter < timing.dwell_time_ms {
            self.attention_counter = 0;
            self.is_activated = false;
            debug!("cell {},{} shot off", self.x, self.y);
            return Some(Activation::Inactive);
        }
        None
    }

    fn increase_attention(&mut self, interval: i32, timing: &DwellTiming) -> Option<Activation> {
        self.attention_counter += interval;
        if self.attention_counter >= timing.dwell_time_ms {
            return Some(self.shoot(timing));
        }
        None
    }
}

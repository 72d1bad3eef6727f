//! Mouse controller: pointer on the game panel drives focus and shots.
//!
//! Pointer positions are in panel pixels; the panel size is passed with
//! every call since the host may resize it. Dwell does not accumulate in
//! mouse mode, so a click is the only way to shoot.

use crate::comm::Point2D;
use crate::config::{ControllerType, OptionsHandle};
use crate::plane::PlaneContext;

pub struct MouseController {
    options: OptionsHandle,
}

impl MouseController {
    pub fn new(options: OptionsHandle) -> Self {
        Self { options }
    }

    pub fn is_enabled(&self) -> bool {
        self.options.get().controller == ControllerType::Mouse
    }

    /// Cell under a panel position, `None` outside the panel.
    pub fn cell_at(&self, point: Point2D, width: f64, height: f64) -> Option<(i32, i32)> {
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        if !(0.0..width).contains(&point.x) || !(0.0..height).contains(&point.y) {
            return None;
        }
        let o = self.options.get();
        let x = (point.x / width * f64::from(o.cell_x)).floor() as i32;
        let y = (point.y / height * f64::from(o.cell_y)).floor() as i32;
        Some((x, y))
    }

    /// The pointer moved. The corrected position only moves the gaze
    /// cursor, so a mouse session can exercise calibration; focus follows
    /// the cell under the pointer itself.
    pub fn pointer_moved(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        ctx: &mut PlaneContext<'_>,
    ) {
        if !self.is_enabled() {
            return;
        }
        let pointer = Point2D::new(x, y);
        let corrected = ctx.corrector.feed(pointer, width, height, ctx.now_ms);
        ctx.game.set_gaze(corrected.x, corrected.y);

        match self.cell_at(pointer, width, height) {
            Some((cx, cy)) => ctx.game.focus(cx, cy),
            None => ctx.game.clear_focus(),
        }
    }

    /// Shoot the cell under the pointer.
    pub fn clicked(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        ctx: &mut PlaneContext<'_>,
    ) {
        if !self.is_enabled() {
            return;
        }
        if let Some((cx, cy)) = self.cell_at(Point2D::new(x, y), width, height) {
            ctx.game.shoot(cx, cy);
        }
    }
}

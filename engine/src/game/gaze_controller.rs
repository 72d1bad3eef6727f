//! Gaze controller: the game screen as a tracker plane.
//!
//! Every intersection with the screen goes through the low-pass filter
//! and the corrector, moves the gaze cursor and focuses the grid cell
//! under the point. Leaving the screen clears focus after a latency, so
//! a blink or a short glance away does not drop the dwell.

use tracing::debug;

use super::filter::LowPassFilter;
use crate::comm::{Intersection, Point2D};
use crate::config::{ControllerType, OptionsHandle};
use crate::plane::{Plane, PlaneContext, PlaneEvent};

// ── Deferred action ─────────────────────────────────────────

/// Single pending delayed action. Arming replaces whatever was pending.
#[derive(Debug, Clone, Default)]
pub struct DeferredAction {
    due_ms: Option<i64>,
    generation: u64,
}

impl DeferredAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the action at `due_ms`, dropping any pending one.
    pub fn arm(&mut self, due_ms: i64) -> u64 {
        self.generation += 1;
        self.due_ms = Some(due_ms);
        self.generation
    }

    /// Drop the pending action. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.due_ms.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.due_ms.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True exactly once when the pending action has become due.
    pub fn take_due(&mut self, now_ms: i64) -> bool {
        match self.due_ms {
            Some(due) if now_ms >= due => {
                self.due_ms = None;
                true
            }
            _ => false,
        }
    }
}

// ── GazeController ──────────────────────────────────────────

pub struct GazeController {
    options: OptionsHandle,
    name: String,
    filter: LowPassFilter,
    last_cell: (i32, i32),
    pending_clear: DeferredAction,
}

impl GazeController {
    /// Controller for the plane named by `screen_name`.
    pub fn new(options: OptionsHandle) -> Self {
        let (name, threshold) = {
            let o = options.get();
            (o.screen_name.clone(), o.low_pass_threshold())
        };
        Self {
            filter: LowPassFilter::new(threshold, options.clone()),
            options,
            name,
            last_cell: (-1, -1),
            pending_clear: DeferredAction::new(),
        }
    }

    pub fn filter(&self) -> &LowPassFilter {
        &self.filter
    }

    pub fn last_cell(&self) -> (i32, i32) {
        self.last_cell
    }

    pub fn has_pending_clear(&self) -> bool {
        self.pending_clear.is_pending()
    }

    /// Grid cell under `point`. Stays on the last cell while the point is
    /// within its bounds grown by `focused_cell_expansion`.
    fn map_to_cell(&mut self, point: Point2D) -> (i32, i32) {
        let (w, h, cols, rows, expansion) = {
            let o = self.options.get();
            (
                o.screen_width,
                o.screen_height,
                f64::from(o.cell_x),
                f64::from(o.cell_y),
                o.focused_cell_expansion,
            )
        };
        if w <= 0.0 || h <= 0.0 {
            return (-1, -1);
        }

        let gx = point.x / w * cols;
        let gy = point.y / h * rows;
        let reach = expansion + 0.5;
        let (lx, ly) = self.last_cell;

        let stays = (gx - (f64::from(lx) + 0.5)).abs() < reach
            && (gy - (f64::from(ly) + 0.5)).abs() < reach;
        if !stays {
            // floor, not truncation: points just left of or above the
            // screen map to -1 and clear focus instead of landing in cell 0.
            self.last_cell = (gx.floor() as i32, gy.floor() as i32);
        }
        self.last_cell
    }
}

impl Plane for GazeController {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.options.get().controller == ControllerType::Gaze
    }

    fn handle_intersection(&mut self, intersection: &Intersection, ctx: &mut PlaneContext<'_>) {
        let (w, h) = {
            let o = self.options.get();
            (o.screen_width, o.screen_height)
        };

        let filtered = self.filter.feed(intersection.point);
        let corrected = ctx.corrector.feed(filtered, w, h, ctx.now_ms);
        ctx.game.set_gaze(corrected.x, corrected.y);

        let (x, y) = self.map_to_cell(corrected);
        ctx.game.focus(x, y);
    }

    fn handle_event(&mut self, event: PlaneEvent, ctx: &mut PlaneContext<'_>) {
        self.pending_clear.cancel();
        if event == PlaneEvent::Exit {
            let latency = self.options.get().focus_latency_ms;
            let generation = self.pending_clear.arm(ctx.now_ms + latency);
            debug!("focus clear #{} armed for +{}ms", generation, latency);
        }
        self.filter.inform(event, ctx.now_ms);
    }

    fn poll(&mut self, ctx: &mut PlaneContext<'_>) {
        if self.pending_clear.take_due(ctx.now_ms) {
            debug!("focus clear #{} fired", self.pending_clear.generation());
            ctx.game.clear_focus();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;
    use crate::game::corrector::GazeCorrector;
    use crate::game::renderer::RecordingRenderer;
    use crate::game::Game;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Rig {
        controller: GazeController,
        game: Game,
        corrector: GazeCorrector,
    }

    impl Rig {
        fn new() -> Self {
            let options = OptionsHandle::new(GridOptions {
                low_pass_enabled: false,
                ..GridOptions::default()
            });
            let mut game = Game::new(
                options.clone(),
                Box::new(RecordingRenderer::new()),
                StdRng::seed_from_u64(3),
            );
            game.start();
            Self {
                controller: GazeController::new(options.clone()),
                game,
                corrector: GazeCorrector::new(options),
            }
        }

        fn ctx(&mut self, now_ms: i64) -> (&mut GazeController, PlaneContext<'_>) {
            (
                &mut self.controller,
                PlaneContext {
                    game: &mut self.game,
                    corrector: &mut self.corrector,
                    now_ms,
                },
            )
        }

        fn look(&mut self, x: f64, y: f64, now_ms: i64) {
            let hit = Intersection {
                plane_name: "CentralConsole".into(),
                point: Point2D::new(x, y),
                ..Intersection::default()
            };
            let (controller, mut ctx) = self.ctx(now_ms);
            controller.handle_intersection(&hit, &mut ctx);
        }

        fn event(&mut self, event: PlaneEvent, now_ms: i64) {
            let (controller, mut ctx) = self.ctx(now_ms);
            controller.handle_event(event, &mut ctx);
        }

        fn poll(&mut self, now_ms: i64) {
            let (controller, mut ctx) = self.ctx(now_ms);
            controller.poll(&mut ctx);
        }
    }

    #[test]
    fn test_maps_point_to_cell() {
        let mut rig = Rig::new();
        assert_eq!(rig.controller.name(), "CentralConsole");
        // Cells are 640 px wide.
        rig.look(1000.0, 500.0, 0);
        assert_eq!(rig.game.focused_cell(), Some((1, 0)));
        rig.look(1800.0, 500.0, 10);
        assert_eq!(rig.game.focused_cell(), Some((2, 0)));
    }

    #[test]
    fn test_hysteresis_keeps_last_cell() {
        let mut rig = Rig::new();
        rig.look(1000.0, 500.0, 0);
        // 0.1 of a cell (64 px) past the left edge of cell 1.
        rig.look(600.0, 500.0, 10);
        assert_eq!(rig.game.focused_cell(), Some((1, 0)));
        rig.look(570.0, 500.0, 20);
        assert_eq!(rig.game.focused_cell(), Some((0, 0)));
    }

    #[test]
    fn test_offscreen_point_clears_focus() {
        let mut rig = Rig::new();
        rig.look(1000.0, 500.0, 0);
        rig.look(-500.0, 500.0, 10);
        assert_eq!(rig.game.focused_cell(), None);
        assert_eq!(rig.controller.last_cell(), (-1, 0));
    }

    #[test]
    fn test_exit_clears_focus_after_latency() {
        let mut rig = Rig::new();
        rig.look(1000.0, 500.0, 0);
        rig.event(PlaneEvent::Exit, 100);
        assert!(rig.controller.has_pending_clear());

        rig.poll(599);
        assert_eq!(rig.game.focused_cell(), Some((1, 0)));
        rig.poll(600);
        assert_eq!(rig.game.focused_cell(), None);
        assert!(!rig.controller.has_pending_clear());
    }

    #[test]
    fn test_reenter_cancels_clear() {
        let mut rig = Rig::new();
        rig.look(1000.0, 500.0, 0);
        rig.event(PlaneEvent::Exit, 100);
        rig.event(PlaneEvent::Enter, 300);
        rig.poll(2000);
        assert_eq!(rig.game.focused_cell(), Some((1, 0)));
    }

    #[test]
    fn test_second_exit_rearms() {
        let mut rig = Rig::new();
        rig.look(1000.0, 500.0, 0);
        rig.event(PlaneEvent::Exit, 100);
        rig.event(PlaneEvent::Exit, 400);
        rig.poll(700);
        assert_eq!(rig.game.focused_cell(), Some((1, 0)));
        rig.poll(900);
        assert_eq!(rig.game.focused_cell(), None);
    }

    #[test]
    fn test_disabled_in_mouse_mode() {
        let rig = Rig::new();
        assert!(rig.controller.is_enabled());
        rig.controller
            .options
            .update(|o| o.controller = ControllerType::Mouse);
        assert!(!rig.controller.is_enabled());
    }

    #[test]
    fn test_deferred_action_single_slot() {
        let mut action = DeferredAction::new();
        assert_eq!(action.arm(100), 1);
        assert_eq!(action.arm(50), 2);
        assert!(!action.take_due(49));
        assert!(action.take_due(50));
        assert!(!action.take_due(1000));
        assert!(!action.cancel());
    }
}

//! Session: the wired-up pipeline.
//!
//! Owns the parser, the tracker planes (game screen and mirrors), the
//! game, the corrector, the mouse controller and the experiment logs,
//! and routes every input through them in order:
//!
//! ```text
//! line ─► Parser ─► PlaneEnter/Exit ─► planes (+ statistics, flow log)
//!                 └► Sample ─► intersections ─► planes ─► Game
//! Game events ─► corrector (mole visibility), flow log
//! ```
//!
//! All methods run on one thread; the binary serializes them through
//! its event loop and tests call them directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::comm::{ParseError, Parser, ParserEvent, Sample};
use crate::config::OptionsHandle;
use crate::game::corrector::GazeCorrector;
use crate::game::gaze_controller::GazeController;
use crate::game::mouse_controller::MouseController;
use crate::game::renderer::Renderer;
use crate::game::{Game, GameEvent};
use crate::input_source::InputEvent;
use crate::logging::{FlowLog, FlowSource, Statistics};
use crate::plane::{Mirror, MirrorSide, PlaneCollection, PlaneContext, PlaneEvent};

pub struct Session {
    options: OptionsHandle,
    clock: Arc<dyn Clock>,
    parser: Parser,
    planes: PlaneCollection,
    game: Game,
    corrector: GazeCorrector,
    mouse: MouseController,
    flow: FlowLog,
    statistics: Statistics,
    samples: u64,
}

impl Session {
    pub fn new(
        options: OptionsHandle,
        clock: Arc<dyn Clock>,
        renderer: Box<dyn Renderer>,
        rng: StdRng,
    ) -> Self {
        let mut planes = PlaneCollection::new();
        planes.add(Box::new(GazeController::new(options.clone())));
        planes.add(Box::new(Mirror::new(MirrorSide::Left)));
        planes.add(Box::new(Mirror::new(MirrorSide::Right)));

        Self {
            parser: Parser::new(options.clone()),
            planes,
            game: Game::new(options.clone(), renderer, rng),
            corrector: GazeCorrector::new(options.clone()),
            mouse: MouseController::new(options.clone()),
            flow: FlowLog::new(true),
            statistics: Statistics::new(),
            samples: 0,
            options,
            clock,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Start the game. Calibration references follow the grid, so they
    /// are rebuilt when the game rebuilds its cells.
    pub fn start(&mut self) {
        self.flow.start(self.clock.unix_millis());
        let grid = self.game.grid_size();
        self.game.start();
        if self.game.grid_size() != grid {
            debug!("grid resized, calibration references rebuilt");
            self.corrector = GazeCorrector::new(self.options.clone());
        }
        let o = self.options.get();
        info!(
            "session started: {}x{} grid, {} controller, listening to {}",
            o.cell_x,
            o.cell_y,
            o.controller.as_str(),
            o.intersection_header()
        );
    }

    pub fn stop(&mut self) {
        self.game.stop();
        self.process_game_events();
        self.statistics.finish(self.clock.now_ms());
        info!(
            "session stopped after {} samples, {} flow records",
            self.samples,
            self.flow.len()
        );
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn options(&self) -> &OptionsHandle {
        &self.options
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn corrector(&self) -> &GazeCorrector {
        &self.corrector
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn planes(&self) -> &PlaneCollection {
        &self.planes
    }

    pub fn flow(&self) -> &FlowLog {
        &self.flow
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Samples routed to the planes so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn save_flow_log(&self, path: &Path) -> std::io::Result<()> {
        self.flow.save(path)
    }

    pub fn export_statistics(&self, path: &Path) -> std::io::Result<()> {
        self.statistics.export(path)
    }

    // ── Input ───────────────────────────────────────────────

    /// Feed one protocol line.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        let events = self.parser.feed(line)?;
        self.route(events);
        Ok(())
    }

    /// The line stream ended.
    pub fn finish_stream(&mut self) {
        let events = self.parser.finish();
        self.route(events);
    }

    /// Feed a frame that was parsed by the producer.
    pub fn feed_sample(&mut self, sample: Sample) {
        let events = self.parser.accept_sample(sample);
        self.route(events);
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let mut ctx = PlaneContext {
            game: &mut self.game,
            corrector: &mut self.corrector,
            now_ms: self.clock.now_ms(),
        };
        self.mouse.pointer_moved(x, y, width, height, &mut ctx);
        self.process_game_events();
    }

    pub fn pointer_clicked(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let mut ctx = PlaneContext {
            game: &mut self.game,
            corrector: &mut self.corrector,
            now_ms: self.clock.now_ms(),
        };
        self.mouse.clicked(x, y, width, height, &mut ctx);
        self.process_game_events();
    }

    /// Apply one input event. `Wait` is not handled here: its duration is
    /// returned so the driver can let that much time pass.
    pub fn apply(&mut self, event: InputEvent) -> Result<Option<Duration>, ParseError> {
        match event {
            InputEvent::Line(line) => self.feed_line(&line)?,
            InputEvent::EndOfStream => self.finish_stream(),
            InputEvent::Sample(sample) => self.feed_sample(sample),
            InputEvent::PointerMove { x, y, width, height } => {
                self.pointer_moved(x, y, width, height)
            }
            InputEvent::PointerClick { x, y, width, height } => {
                self.pointer_clicked(x, y, width, height)
            }
            InputEvent::Wait { duration } => return Ok(Some(duration)),
        }
        Ok(None)
    }

    // ── Tickers ─────────────────────────────────────────────

    /// Cell ticker: fire due deferred actions, then advance the cells.
    pub fn tick(&mut self) {
        let mut ctx = PlaneContext {
            game: &mut self.game,
            corrector: &mut self.corrector,
            now_ms: self.clock.now_ms(),
        };
        self.planes.poll(&mut ctx);
        self.game.tick();
        self.process_game_events();
    }

    /// Mole ticker.
    pub fn mole_tick(&mut self) {
        self.game.mole_tick();
        self.process_game_events();
    }

    // ── Routing ─────────────────────────────────────────────

    fn route(&mut self, events: Vec<ParserEvent>) {
        let now_ms = self.clock.now_ms();
        for event in events {
            match event {
                ParserEvent::PlaneEnter(intersection) => {
                    self.plane_event(&intersection.plane_name, PlaneEvent::Enter, now_ms)
                }
                ParserEvent::PlaneExit(name) => self.plane_event(&name, PlaneEvent::Exit, now_ms),
                ParserEvent::Sample(sample) => self.route_sample(&sample, now_ms),
            }
        }
    }

    fn plane_event(&mut self, name: &str, event: PlaneEvent, now_ms: i64) {
        self.statistics.on_event(name, event, now_ms);
        self.flow.record(
            self.clock.unix_millis(),
            FlowSource::Tracker,
            event.as_str(),
            &[name],
        );

        let mut ctx = PlaneContext {
            game: &mut self.game,
            corrector: &mut self.corrector,
            now_ms,
        };
        self.planes.dispatch_event(name, event, &mut ctx);
        self.process_game_events();
    }

    fn route_sample(&mut self, sample: &Sample, now_ms: i64) {
        self.samples += 1;
        let mut ctx = PlaneContext {
            game: &mut self.game,
            corrector: &mut self.corrector,
            now_ms,
        };
        for intersection in &sample.intersections {
            if !self.planes.dispatch_intersection(intersection, &mut ctx) {
                debug!("frame {}: no plane for {}", sample.id, intersection.plane_name);
            }
        }
        self.process_game_events();
    }

    fn process_game_events(&mut self) {
        let now_ms = self.clock.now_ms();
        let ts = self.clock.unix_millis();

        for event in self.game.drain_events() {
            match event {
                GameEvent::MoleVisibilityChanged(mole) => {
                    self.corrector.on_mole_visibility_changed(&mole, now_ms);
                    if mole.is_visible {
                        self.flow.record(
                            ts,
                            FlowSource::Game,
                            "mole",
                            &[
                                "show".to_string(),
                                mole.x.to_string(),
                                mole.y.to_string(),
                                mole.kind.as_str().to_string(),
                            ],
                        );
                    } else {
                        self.flow.record(ts, FlowSource::Game, "mole", &["hide"]);
                    }
                }
                GameEvent::FocusChanged { x, y } => {
                    self.flow.record(ts, FlowSource::Game, "focus", &[x, y]);
                }
                GameEvent::ShotOn { x, y } => {
                    self.flow.record(ts, FlowSource::Game, "shot-on", &[x, y]);
                }
                GameEvent::ShotOff { x, y } => {
                    self.flow.record(ts, FlowSource::Game, "shot-off", &[x, y]);
                }
                GameEvent::ScoreChanged(score) => {
                    self.flow.record(ts, FlowSource::Game, "score", &[score]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::config::GridOptions;
    use crate::game::renderer::RecordingRenderer;
    use rand::SeedableRng;

    fn session(options: GridOptions) -> (Session, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let mut session = Session::new(
            OptionsHandle::new(options),
            clock.clone(),
            Box::new(RecordingRenderer::new()),
            StdRng::seed_from_u64(5),
        );
        session.start();
        (session, clock)
    }

    fn screen_frame(id: i32, x: f64, y: f64) -> Vec<String> {
        vec![
            format!("FrameNumber {}", id),
            format!("TimeStamp {}", id * 16),
            "ClosestWorldIntersection".to_string(),
            "Intersection 0".to_string(),
            "\t0 0 1".to_string(),
            format!("\t{} {}", x, y),
            "\tCentralConsole".to_string(),
            String::new(),
        ]
    }

    #[test]
    fn test_line_stream_focuses_cell() {
        let (mut s, _) = session(GridOptions::default());
        for line in screen_frame(1, 1000.0, 500.0) {
            s.feed_line(&line).unwrap();
        }
        assert_eq!(s.game().focused_cell(), Some((1, 0)));
        assert_eq!(s.samples(), 1);
        assert_eq!(s.flow().of_kind("enter").count(), 1);
        assert_eq!(s.flow().of_kind("focus").count(), 1);
    }

    #[test]
    fn test_parse_error_propagates() {
        let (mut s, _) = session(GridOptions::default());
        assert!(matches!(
            s.feed_line("FrameNumber x"),
            Err(ParseError::MalformedField { .. })
        ));
    }

    #[test]
    fn test_apply_returns_wait() {
        let (mut s, _) = session(GridOptions::default());
        assert_eq!(
            s.apply(InputEvent::wait_ms(250)).unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(s.apply(InputEvent::line("TimeStamp 1")).unwrap(), None);
    }

    #[test]
    fn test_mirror_glance_counts_in_statistics() {
        let (mut s, clock) = session(GridOptions::default());
        let hit = |name: &str| crate::comm::Intersection {
            plane_name: name.to_string(),
            ..Default::default()
        };
        s.feed_sample(Sample {
            id: 1,
            intersections: vec![hit("LeftMirror")],
            ..Sample::default()
        });
        clock.advance_ms(400);
        s.feed_sample(Sample {
            id: 2,
            intersections: vec![],
            ..Sample::default()
        });
        assert_eq!(s.statistics().total_ms("LeftMirror"), 400);
        assert_eq!(s.flow().of_kind("exit").count(), 1);
    }

    #[test]
    fn test_restart_with_new_grid_rebuilds_references() {
        let (mut s, _) = session(GridOptions::default());
        assert!(s.corrector().reference(2, 0).is_some());
        s.stop();

        s.options().update(|o| {
            o.cell_x = 4;
            o.cell_y = 2;
        });
        s.start();
        assert_eq!(s.game().grid_size(), (4, 2));
        assert!(s.corrector().reference(3, 1).is_some());
        assert_eq!(s.planes().len(), 3);
        assert!(!s.planes().is_empty());
    }

    #[test]
    fn test_stop_deactivates_corrector() {
        let (mut s, _) = session(GridOptions {
            mole_event_rate: 1.0,
            use_smart_gaze_correction: true,
            ..GridOptions::default()
        });
        s.mole_tick();
        assert!(s.corrector().active_reference().is_some());
        s.stop();
        assert!(s.corrector().active_reference().is_none());
        assert_eq!(s.game().score(), 0);
    }
}

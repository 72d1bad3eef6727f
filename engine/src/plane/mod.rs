//! Named tracker planes and the router that feeds them.
//!
//! The tracker reports gaze intersections against named planes (the game
//! screen, the side mirrors, ...). Each plane the session cares about is
//! a `Plane` implementation registered in a `PlaneCollection`; the
//! collection hands every intersection and every enter/exit event to the
//! plane with the matching name.

use tracing::{debug, warn};

use crate::comm::Intersection;
use crate::game::corrector::GazeCorrector;
use crate::game::Game;

// ── Events ──────────────────────────────────────────────────

/// Gaze entering or leaving a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneEvent {
    Enter,
    Exit,
}

impl PlaneEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

/// Mutable collaborators a plane may act on while handling input.
pub struct PlaneContext<'a> {
    pub game: &'a mut Game,
    pub corrector: &'a mut GazeCorrector,
    /// Monotonic time of the input being handled, ms.
    pub now_ms: i64,
}

// ── Plane trait ─────────────────────────────────────────────

pub trait Plane {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Gaze hit this plane during the current frame.
    fn handle_intersection(&mut self, intersection: &Intersection, ctx: &mut PlaneContext<'_>);

    fn handle_event(&mut self, event: PlaneEvent, ctx: &mut PlaneContext<'_>);

    /// Periodic callback for time-based work (deferred actions).
    fn poll(&mut self, _ctx: &mut PlaneContext<'_>) {}
}

// ── Mirror ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorSide {
    Left,
    Right,
}

impl MirrorSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// A side mirror. It only keeps track of glances at it.
#[derive(Debug, Clone)]
pub struct Mirror {
    name: String,
    is_gazed: bool,
    glance_count: u32,
}

impl Mirror {
    pub fn new(side: MirrorSide) -> Self {
        Self {
            name: format!("{}Mirror", side.as_str()),
            is_gazed: false,
            glance_count: 0,
        }
    }

    pub fn is_gazed(&self) -> bool {
        self.is_gazed
    }

    /// Number of Enter events seen so far.
    pub fn glance_count(&self) -> u32 {
        self.glance_count
    }
}

impl Plane for Mirror {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_intersection(&mut self, _intersection: &Intersection, _ctx: &mut PlaneContext<'_>) {}

    fn handle_event(&mut self, event: PlaneEvent, _ctx: &mut PlaneContext<'_>) {
        match event {
            PlaneEvent::Enter => {
                self.is_gazed = true;
                self.glance_count += 1;
            }
            PlaneEvent::Exit => self.is_gazed = false,
        }
        debug!("{} {}", self.name, event.as_str());
    }
}

// ── PlaneCollection ─────────────────────────────────────────

/// Name-based router over the registered planes.
#[derive(Default)]
pub struct PlaneCollection {
    planes: Vec<Box<dyn Plane>>,
}

impl PlaneCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plane: Box<dyn Plane>) {
        debug!("plane {} registered", plane.name());
        self.planes.push(plane);
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn Plane>> {
        self.planes.iter_mut().find(|p| p.name() == name)
    }

    /// Route an intersection to its plane. Returns false when no enabled
    /// plane took it.
    pub fn dispatch_intersection(
        &mut self,
        intersection: &Intersection,
        ctx: &mut PlaneContext<'_>,
    ) -> bool {
        match self.get_mut(&intersection.plane_name) {
            Some(plane) if plane.is_enabled() => {
                plane.handle_intersection(intersection, ctx);
                true
            }
            _ => false,
        }
    }

    /// Route an enter/exit event to the named plane.
    pub fn dispatch_event(
        &mut self,
        name: &str,
        event: PlaneEvent,
        ctx: &mut PlaneContext<'_>,
    ) -> bool {
        match self.get_mut(name) {
            Some(plane) if plane.is_enabled() => {
                plane.handle_event(event, ctx);
                true
            }
            Some(_) => false,
            None => {
                warn!("{} for unknown plane {}", event.as_str(), name);
                false
            }
        }
    }

    pub fn poll(&mut self, ctx: &mut PlaneContext<'_>) {
        for plane in self.planes.iter_mut() {
            plane.poll(ctx);
        }
    }
}

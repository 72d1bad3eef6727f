//! One tracker frame and its per-plane intersections.

use super::point::{Point2D, Point3D};

/// Gaze hit on one named plane within a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersection {
    pub id: i32,
    pub plane_name: String,
    /// Gaze direction vector reported with the hit.
    pub gaze: Point3D,
    /// Hit location on the plane.
    pub point: Point2D,
}

/// One tracker frame. An `id` of 0 means "no frame yet".
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: i32,
    /// Tracker timestamp, milliseconds.
    pub timestamp: i64,
    /// Gaze quality in 0..1.
    pub gaze_quality: f64,
    /// Intersections in the order they were reported.
    pub intersections: Vec<Intersection>,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            id: 0,
            timestamp: 0,
            gaze_quality: 1.0,
            intersections: Vec::new(),
        }
    }
}

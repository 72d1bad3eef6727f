//! Adaptive low-pass filter for the raw gaze point.
//!
//! Two sigmoid weights decide how far the filtered point follows a new
//! raw point:
//!
//! - `w1` grows with the distance between the filtered point and the new
//!   point (willingness to jump);
//! - `w2` grows as the new point gets closer to the previous raw point
//!   (two consecutive samples agree on the new location).
//!
//! Their product, damped by `low_pass_weight_damping`, is the blend
//! weight. A lone outlier barely moves the filtered point, while a
//! deliberate saccade is followed within two samples.

use tracing::debug;

use crate::comm::Point2D;
use crate::config::OptionsHandle;
use crate::plane::PlaneEvent;

pub struct LowPassFilter {
    options: OptionsHandle,
    /// Distance at which each sigmoid equals 0.5, pixels.
    threshold: f64,
    filtered: Point2D,
    previous_raw: Point2D,
    has_point: bool,
    exit_timestamp_ms: i64,
    last_weight: Option<f64>,
}

impl LowPassFilter {
    pub fn new(threshold: f64, options: OptionsHandle) -> Self {
        Self {
            options,
            threshold,
            filtered: Point2D::default(),
            previous_raw: Point2D::default(),
            has_point: false,
            exit_timestamp_ms: 0,
            last_weight: None,
        }
    }

    /// Blend weight used by the last `feed`; `None` when it snapped.
    pub fn last_weight(&self) -> Option<f64> {
        self.last_weight
    }

    /// Filter the next raw point.
    pub fn feed(&mut self, raw: Point2D) -> Point2D {
        let (enabled, gain, damping) = {
            let o = self.options.get();
            (o.low_pass_enabled, o.low_pass_gain, o.low_pass_weight_damping)
        };

        if !self.has_point || !enabled {
            self.has_point = true;
            self.filtered = raw;
            self.last_weight = None;
        } else {
            let dist = self.filtered.distance(&raw);
            let w1 = logistic(gain * (self.threshold - dist));

            let raw_dist = self.previous_raw.distance(&raw);
            let w2 = 1.0 - logistic(gain * (self.threshold - raw_dist));

            let next_weight = w1 * w2 * damping;
            let prev_weight = 1.0 - next_weight;

            self.filtered = Point2D::new(
                self.filtered.x * prev_weight + raw.x * next_weight,
                self.filtered.y * prev_weight + raw.y * next_weight,
            );
            self.last_weight = Some(next_weight);
        }

        self.previous_raw = raw;
        self.filtered
    }

    /// React to the gaze leaving or re-entering the interaction plane.
    /// Re-entering after more than the reset delay makes the next point
    /// snap.
    pub fn inform(&mut self, event: PlaneEvent, now_ms: i64) {
        match event {
            PlaneEvent::Exit => self.exit_timestamp_ms = now_ms,
            PlaneEvent::Enter => {
                let reset_delay = self.options.get().low_pass_reset_delay_ms;
                if now_ms - self.exit_timestamp_ms > reset_delay {
                    self.has_point = false;
                    debug!("low-pass filter reset");
                }
            }
        }
    }
}

/// `1 / (1 + e^v)`: 0.5 at the threshold, steepness set by the gain.
fn logistic(v: f64) -> f64 {
    1.0 / (1.0 + v.exp())
}

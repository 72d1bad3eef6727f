//! Per-cell gaze bias correction.
//!
//! Each grid cell has a `CalibrationReference` bound to the nominal spot
//! where a player looks when aiming at that cell. While the mole sits in
//! a cell, the raw gaze points collected after a settling delay estimate
//! the tracker's bias there (median minus nominal). The correction that
//! is applied is the mean of the last few such estimates.

use std::collections::VecDeque;

use tracing::{debug, info};

use super::mole::Mole;
use crate::comm::Point2D;
use crate::config::OptionsHandle;

/// Nominal aim point inside a cell, as a share of the cell size.
/// Players aim slightly above and left of the geometric centre.
const AIM_OFFSET: f64 = 0.45;

/// Buffer sizes and timing of the calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectorConfig {
    /// Raw points needed for one bias estimate.
    pub glance_capacity: usize,
    /// Bias estimates averaged into the applied correction.
    pub correction_capacity: usize,
    /// Delay after the mole appears before points are collected, ms.
    pub settling_delay_ms: i64,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            glance_capacity: 12,
            correction_capacity: 5,
            settling_delay_ms: 800,
        }
    }
}

// ── CalibrationReference ────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CalibrationReference {
    cell: (i32, i32),
    /// Normalized nominal target position.
    nominal: Point2D,
    glance: VecDeque<Point2D>,
    corrections: VecDeque<Point2D>,
    collect_from_ms: i64,
}

impl CalibrationReference {
    pub fn new(cell: (i32, i32), nominal: Point2D, config: &CorrectorConfig) -> Self {
        Self {
            cell,
            nominal,
            glance: VecDeque::with_capacity(config.glance_capacity),
            corrections: VecDeque::with_capacity(config.correction_capacity),
            collect_from_ms: 0,
        }
    }

    pub fn cell(&self) -> (i32, i32) {
        self.cell
    }

    pub fn nominal(&self) -> Point2D {
        self.nominal
    }

    pub fn is_at(&self, mole: &Mole) -> bool {
        self.cell == (mole.x, mole.y)
    }

    pub fn buffered_points(&self) -> usize {
        self.glance.len()
    }

    pub fn corrections(&self) -> impl Iterator<Item = &Point2D> {
        self.corrections.iter()
    }

    /// Mean of the stored bias estimates; zero when there are none.
    pub fn applied_correction(&self) -> Point2D {
        if self.corrections.is_empty() {
            return Point2D::default();
        }
        let n = self.corrections.len() as f64;
        let (sx, sy) = self
            .corrections
            .iter()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
        Point2D::new(sx / n, sy / n)
    }

    fn start_gazing(&mut self, now_ms: i64, config: &CorrectorConfig) {
        self.collect_from_ms = now_ms + config.settling_delay_ms;
    }

    /// Buffer a normalized point (after settling) and return it corrected.
    fn feed(&mut self, point: Point2D, now_ms: i64, config: &CorrectorConfig) -> Point2D {
        if now_ms > self.collect_from_ms {
            if self.glance.len() == config.glance_capacity {
                self.glance.pop_front();
            }
            self.glance.push_back(point);
        }

        let correction = self.applied_correction();
        Point2D::new(point.x - correction.x, point.y - correction.y)
    }

    /// Turn a full glance buffer into a new bias estimate. The buffer is
    /// emptied either way.
    fn conclude(&mut self, config: &CorrectorConfig) -> Option<Point2D> {
        let estimate = if config.glance_capacity > 0 && self.glance.len() == config.glance_capacity {
            let median_x = median(self.glance.iter().map(|p| p.x).collect());
            let median_y = median(self.glance.iter().map(|p| p.y).collect());
            let correction = Point2D::new(median_x - self.nominal.x, median_y - self.nominal.y);

            if self.corrections.len() == config.correction_capacity {
                self.corrections.pop_front();
            }
            self.corrections.push_back(correction);
            Some(correction)
        } else {
            None
        };

        self.glance.clear();
        estimate
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// ── GazeCorrector ───────────────────────────────────────────

pub struct GazeCorrector {
    options: OptionsHandle,
    config: CorrectorConfig,
    references: Vec<CalibrationReference>,
    active: Option<usize>,
}

impl GazeCorrector {
    pub fn new(options: OptionsHandle) -> Self {
        Self::with_config(options, CorrectorConfig::default())
    }

    pub fn with_config(options: OptionsHandle, config: CorrectorConfig) -> Self {
        let (cell_x, cell_y) = {
            let o = options.get();
            (o.cell_x.max(1), o.cell_y.max(1))
        };

        let mut references = Vec::with_capacity((cell_x * cell_y) as usize);
        for j in 0..cell_y {
            for i in 0..cell_x {
                let nominal = Point2D::new(
                    (AIM_OFFSET + f64::from(i)) / f64::from(cell_x),
                    (AIM_OFFSET + f64::from(j)) / f64::from(cell_y),
                );
                references.push(CalibrationReference::new((i, j), nominal, &config));
            }
        }

        Self {
            options,
            config,
            references,
            active: None,
        }
    }

    pub fn reference(&self, x: i32, y: i32) -> Option<&CalibrationReference> {
        self.references.iter().find(|r| r.cell == (x, y))
    }

    pub fn active_reference(&self) -> Option<&CalibrationReference> {
        self.active.map(|i| &self.references[i])
    }

    /// Correct a point given in pixels of a `width × height` surface.
    pub fn feed(&mut self, point: Point2D, width: f64, height: f64, now_ms: i64) -> Point2D {
        if !self.options.get().use_smart_gaze_correction {
            return point;
        }
        let Some(index) = self.active else {
            return point;
        };
        if width <= 0.0 || height <= 0.0 {
            return point;
        }

        let normalized = Point2D::new(point.x / width, point.y / height);
        let corrected = self.references[index].feed(normalized, now_ms, &self.config);
        Point2D::new(corrected.x * width, corrected.y * height)
    }

    /// Follow the mole: its cell's reference becomes active while it is
    /// visible and concludes its calibration when it disappears.
    pub fn on_mole_visibility_changed(&mut self, mole: &Mole, now_ms: i64) {
        if mole.is_visible {
            self.active = self.references.iter().position(|r| r.is_at(mole));
            if let Some(index) = self.active {
                self.references[index].start_gazing(now_ms, &self.config);
            }
        } else if let Some(index) = self.active.take() {
            let reference = &mut self.references[index];
            match reference.conclude(&self.config) {
                Some(c) => info!(
                    "reference {},{} correction {:.3} {:.3}",
                    reference.cell.0, reference.cell.1, c.x, c.y
                ),
                None => debug!(
                    "reference {},{} concluded without enough points",
                    reference.cell.0, reference.cell.1
                ),
            }
        }
    }
}

//! Grid, filter, controller and parser options.
//!
//! One `GridOptions` value is created at startup (defaults or a JSON
//! file) and shared through an `OptionsHandle`. Components keep a clone
//! of the handle and read through it on every use, so a change made by
//! the host is seen by all of them on their next call.

use std::cell::{Cell, Ref, RefCell};
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::comm::parser::ParseError;

// ── Errors ──────────────────────────────────────────────────

/// Errors raised while loading or persisting options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("options file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("options file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("options do not exist yet")]
    NotInitialized,
}

// ── Enumerations ────────────────────────────────────────────

/// Which input device drives the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    Gaze,
    Mouse,
}

impl ControllerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gaze => "gaze",
            Self::Mouse => "mouse",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gaze" => Some(Self::Gaze),
            "mouse" => Some(Self::Mouse),
            _ => None,
        }
    }
}

/// Which tracker-computed intersection block the parser listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntersectionSource {
    /// Intersections computed from the calibrated gaze vector.
    Calibrated,
    /// Intersections computed from the tracker's estimated gaze.
    Predicted,
}

impl IntersectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrated => "calibrated",
            Self::Predicted => "predicted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "calibrated" => Ok(Self::Calibrated),
            "predicted" => Ok(Self::Predicted),
            other => Err(ParseError::UnknownIntersectionSource(other.to_string())),
        }
    }

    /// Protocol header announcing the intersection block of this source.
    pub fn header(&self, filtered: bool) -> &'static str {
        match (self, filtered) {
            (Self::Calibrated, false) => "ClosestWorldIntersection",
            (Self::Calibrated, true) => "FilteredClosestWorldIntersection",
            (Self::Predicted, false) => "EstimatedClosestWorldIntersection",
            (Self::Predicted, true) => "FilteredEstimatedClosestWorldIntersection",
        }
    }
}

// ── GridOptions ─────────────────────────────────────────────

/// Every tunable of the pipeline. Time values are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    // Layout
    pub cell_x: i32,
    pub cell_y: i32,
    pub screen_name: String,
    pub screen_width: f64,
    pub screen_height: f64,

    // Game
    pub dwell_time_ms: i32,
    pub shot_duration_ms: i32,
    pub cell_tick_interval_ms: i32,
    pub mole_timer_interval_ms: u64,
    pub mole_event_rate: f64,
    pub points_per_hit: i32,
    pub go_no_go_enabled: bool,
    pub no_go_probability: f64,
    pub show_gaze_cursor: bool,

    // Low-pass filter
    pub low_pass_enabled: bool,
    pub low_pass_gain: f64,
    pub low_pass_reset_delay_ms: i64,
    /// Unconditional damping of the next-point weight.
    pub low_pass_weight_damping: f64,

    // Controller
    pub controller: ControllerType,
    /// Share of the cell size added around the focused cell.
    pub focused_cell_expansion: f64,
    pub focus_latency_ms: i64,
    pub use_smart_gaze_correction: bool,

    // Parser
    pub intersection_source: IntersectionSource,
    pub intersection_source_filtered: bool,
    pub use_gaze_quality_measurement: bool,
    pub gaze_quality_threshold: f64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            cell_x: 3,
            cell_y: 1,
            screen_name: "CentralConsole".to_string(),
            screen_width: 1920.0,
            screen_height: 1080.0,

            dwell_time_ms: 500,
            shot_duration_ms: 200,
            cell_tick_interval_ms: 30,
            mole_timer_interval_ms: 1000,
            mole_event_rate: 0.5,
            points_per_hit: 5,
            go_no_go_enabled: false,
            no_go_probability: 0.3,
            show_gaze_cursor: false,

            low_pass_enabled: true,
            low_pass_gain: 0.01,
            low_pass_reset_delay_ms: 500,
            low_pass_weight_damping: 0.8,

            controller: ControllerType::Gaze,
            focused_cell_expansion: 0.1,
            focus_latency_ms: 500,
            use_smart_gaze_correction: false,

            intersection_source: IntersectionSource::Calibrated,
            intersection_source_filtered: false,
            use_gaze_quality_measurement: false,
            gaze_quality_threshold: 0.5,
        }
    }
}

impl GridOptions {
    /// Load options from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("options file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&json)?;
        info!("options loaded from {}", path.display());
        Ok(options)
    }

    /// Save options as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("options saved to {}", path.display());
        Ok(())
    }

    /// Total number of grid cells.
    pub fn cell_count(&self) -> usize {
        (self.cell_x.max(0) * self.cell_y.max(0)) as usize
    }

    /// Header line that opens the configured intersection block.
    pub fn intersection_header(&self) -> &'static str {
        self.intersection_source
            .header(self.intersection_source_filtered)
    }

    /// Smoother distance scale: 0.7 of one cell width in pixels.
    pub fn low_pass_threshold(&self) -> f64 {
        self.screen_width / f64::from(self.cell_x.max(1)) * 0.7
    }
}

// ── Shared handle ───────────────────────────────────────────

/// Shared, thread-confined access to the run's options.
#[derive(Debug, Clone)]
pub struct OptionsHandle {
    inner: Rc<RefCell<GridOptions>>,
    initialized: Rc<Cell<bool>>,
}

impl OptionsHandle {
    pub fn new(options: GridOptions) -> Self {
        Self {
            inner: Rc::new(RefCell::new(options)),
            initialized: Rc::new(Cell::new(true)),
        }
    }

    /// A handle whose options have not been created yet. It reads as
    /// defaults but refuses to be saved until `init` is called.
    pub fn uninit() -> Self {
        Self {
            inner: Rc::new(RefCell::new(GridOptions::default())),
            initialized: Rc::new(Cell::new(false)),
        }
    }

    /// Install options into a handle (and every clone of it).
    pub fn init(&self, options: GridOptions) {
        *self.inner.borrow_mut() = options;
        self.initialized.set(true);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn get(&self) -> Ref<'_, GridOptions> {
        self.inner.borrow()
    }

    /// Mutate the options in place.
    pub fn update<F: FnOnce(&mut GridOptions)>(&self, f: F) {
        f(&mut self.inner.borrow_mut());
    }

    /// Persist the current options.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if !self.is_initialized() {
            return Err(ConfigError::NotInitialized);
        }
        self.inner.borrow().save(path)
    }
}

impl Default for OptionsHandle {
    fn default() -> Self {
        Self::new(GridOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let o = GridOptions::default();
        assert_eq!((o.cell_x, o.cell_y), (3, 1));
        assert_eq!(o.dwell_time_ms, 500);
        assert_eq!(o.shot_duration_ms, 200);
        assert_eq!(o.mole_timer_interval_ms, 1000);
        assert_eq!(o.points_per_hit, 5);
        assert!(o.low_pass_enabled);
        assert!(!o.use_gaze_quality_measurement);
        assert_eq!(o.cell_count(), 3);
    }

    #[test]
    fn test_intersection_headers() {
        let mut o = GridOptions::default();
        assert_eq!(o.intersection_header(), "ClosestWorldIntersection");
        o.intersection_source_filtered = true;
        assert_eq!(o.intersection_header(), "FilteredClosestWorldIntersection");
        o.intersection_source = IntersectionSource::Predicted;
        assert_eq!(
            o.intersection_header(),
            "FilteredEstimatedClosestWorldIntersection"
        );
        o.intersection_source_filtered = false;
        assert_eq!(o.intersection_header(), "EstimatedClosestWorldIntersection");
    }

    #[test]
    fn test_unknown_intersection_source() {
        assert_eq!(
            IntersectionSource::parse("predicted").ok(),
            Some(IntersectionSource::Predicted)
        );
        assert!(matches!(
            IntersectionSource::parse("ai"),
            Err(ParseError::UnknownIntersectionSource(_))
        ));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let o = GridOptions::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(o, GridOptions::default());
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "cell_x": 4, "controller": "mouse" }"#).unwrap();

        let o = GridOptions::load(&path).unwrap();
        assert_eq!(o.cell_x, 4);
        assert_eq!(o.controller, ControllerType::Mouse);
        assert_eq!(o.dwell_time_ms, 500);

        o.save(&path).unwrap();
        assert_eq!(GridOptions::load(&path).unwrap(), o);
    }

    #[test]
    fn test_handle_shares_updates() {
        let a = OptionsHandle::default();
        let b = a.clone();
        a.update(|o| o.dwell_time_ms = 800);
        assert_eq!(b.get().dwell_time_ms, 800);
    }

    #[test]
    fn test_save_uninitialized_handle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let handle = OptionsHandle::uninit();
        let result = handle.save(&dir.path().join("o.json"));
        assert!(matches!(result, Err(ConfigError::NotInitialized)));

        handle.init(GridOptions::default());
        assert!(handle.save(&dir.path().join("o.json")).is_ok());
    }
}

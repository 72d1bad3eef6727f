//! Cumulative gaze time per plane.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::plane::PlaneEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneTime {
    pub total_ms: i64,
    pub glances: u32,
    started_at: Option<i64>,
}

/// Sums the time between each Enter and the following Exit, per plane.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    planes: HashMap<String, PlaneTime>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(&mut self, plane: &str, event: PlaneEvent, now_ms: i64) {
        let entry = self.planes.entry(plane.to_string()).or_default();
        match event {
            PlaneEvent::Enter => {
                if entry.started_at.is_none() {
                    entry.started_at = Some(now_ms);
                    entry.glances += 1;
                }
            }
            PlaneEvent::Exit => {
                if let Some(start) = entry.started_at.take() {
                    entry.total_ms += (now_ms - start).max(0);
                }
            }
        }
    }

    /// Close every open interval at `now_ms`.
    pub fn finish(&mut self, now_ms: i64) {
        for entry in self.planes.values_mut() {
            if let Some(start) = entry.started_at.take() {
                entry.total_ms += (now_ms - start).max(0);
            }
        }
    }

    pub fn get(&self, plane: &str) -> Option<&PlaneTime> {
        self.planes.get(plane)
    }

    /// Closed gaze time on a plane, 0 for unknown planes.
    pub fn total_ms(&self, plane: &str) -> i64 {
        self.planes.get(plane).map_or(0, |p| p.total_ms)
    }

    /// `name\ttotal_ms\tglances` lines sorted by plane name.
    pub fn to_lines(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.planes.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let p = &self.planes[name];
                format!("{}\t{}\t{}", name, p.total_ms, p.glances)
            })
            .collect()
    }

    pub fn export(&self, path: &Path) -> std::io::Result<()> {
        let mut text = self.to_lines().join("\n");
        text.push('\n');
        std::fs::write(path, text)?;
        info!("statistics for {} planes written to {}", self.planes.len(), path.display());
        Ok(())
    }
}

//! Flow log: ordered, timestamped record of what happened in a session.
//!
//! Tracker records (plane enter/exit) and game records (focus, shots,
//! mole, score) are interleaved in arrival order and exported as
//! tab-separated text for offline analysis.

use std::io::Write;
use std::path::Path;

use tracing::info;

pub const TSV_HEADER: &str = "ts\tsource\ttype\tdata";

/// Origin of a flow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSource {
    Tracker,
    Game,
}

impl FlowSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracker => "tracker",
            Self::Game => "game",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tracker" => Some(Self::Tracker),
            "game" => Some(Self::Game),
            _ => None,
        }
    }
}

/// A single flow record.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    /// Wall-clock time in milliseconds since UNIX epoch.
    pub timestamp_ms: i64,
    pub source: FlowSource,
    /// Record type, e.g. `enter`, `focus`, `mole`.
    pub kind: String,
    pub data: Vec<String>,
}

impl FlowRecord {
    /// One TSV line; data fields follow the type, tab-separated.
    pub fn to_tsv(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}",
            self.timestamp_ms,
            self.source.as_str(),
            sanitize(&self.kind)
        );
        for field in &self.data {
            line.push('\t');
            line.push_str(&sanitize(field));
        }
        line
    }

    /// Parse a line written by `to_tsv`.
    pub fn from_tsv(line: &str) -> Option<Self> {
        let mut parts = line.split('\t');
        let timestamp_ms = parts.next()?.parse().ok()?;
        let source = FlowSource::from_str(parts.next()?)?;
        let kind = parts.next()?.to_string();
        let data = parts.map(str::to_string).collect();
        Some(Self {
            timestamp_ms,
            source,
            kind,
            data,
        })
    }
}

/// Tabs and line breaks would split a field.
fn sanitize(field: &str) -> String {
    field.replace(&['\t', '\n', '\r'][..], " ")
}

/// Session flow log.
#[derive(Debug, Clone, Default)]
pub struct FlowLog {
    /// Whether records are being kept.
    pub enabled: bool,
    /// Records in arrival order.
    pub records: Vec<FlowRecord>,
    /// Wall-clock start of the current log.
    pub started_at: Option<i64>,
}

impl FlowLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Begin a fresh log.
    pub fn start(&mut self, unix_ms: i64) {
        self.records.clear();
        self.started_at = Some(unix_ms);
    }

    /// Append a record if the log is enabled.
    pub fn record<S: ToString>(
        &mut self,
        timestamp_ms: i64,
        source: FlowSource,
        kind: &str,
        data: &[S],
    ) {
        if !self.enabled {
            return;
        }
        self.records.push(FlowRecord {
            timestamp_ms,
            source,
            kind: kind.to_string(),
            data: data.iter().map(ToString::to_string).collect(),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one type, in order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a FlowRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Whole log as TSV, header first.
    pub fn to_tsv(&self) -> String {
        let mut out = String::from(TSV_HEADER);
        out.push('\n');
        for record in &self.records {
            out.push_str(&record.to_tsv());
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.to_tsv().as_bytes())?;
        info!("flow log: {} records written to {}", self.records.len(), path.display());
        Ok(())
    }
}

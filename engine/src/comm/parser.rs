//! Line protocol parser.
//!
//! State machine: `Initial → Intersections → Intersection → Intersections
//! (loop) → Initial`. A blank line finalizes the frame: planes that lost
//! their intersection get `PlaneExit`, then the frame's `Sample` is
//! emitted. `PlaneEnter` is emitted eagerly, when the intersection block
//! of a plane that is not currently active is completed.
//!
//! Every emitted value is an owned copy; the parser keeps reusing its
//! frame buffer for the next frame.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use super::point::{Point2D, Point3D};
use super::sample::{Intersection, Sample};
use crate::config::OptionsHandle;

const FRAME_NUMBER: &str = "FrameNumber";
const TIME_STAMP: &str = "TimeStamp";
const GAZE_QUALITY: &str = "GazeDirectionQ";
const INTERSECTION: &str = "Intersection";
const PAD: char = '\t';

// ── Errors ──────────────────────────────────────────────────

/// Protocol violations. The stream cannot be resynchronised mid-block,
/// so callers should stop consuming it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("malformed {field} field: '{value}'")]
    MalformedField { field: &'static str, value: String },

    #[error("unexpected data in the definition of intersection: '{0}'")]
    UnexpectedIntersectionData(String),

    #[error("intersection source '{0}' is not implemented")]
    UnknownIntersectionSource(String),
}

// ── Events ──────────────────────────────────────────────────

/// Output of the parser, in firing order.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// Gaze started hitting a plane.
    PlaneEnter(Intersection),
    /// Gaze no longer hits the named plane.
    PlaneExit(String),
    /// A complete frame.
    Sample(Sample),
}

// ── Parser ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Intersections,
    Intersection,
}

pub struct Parser {
    options: OptionsHandle,
    state: State,
    /// Header of the configured intersection source, fixed at `reset`.
    intersection_header: &'static str,
    /// Next expected data line of the open intersection block.
    data_index: usize,
    intersection: Intersection,
    frame: Sample,
    /// Planes that had an intersection in the last emitted frame.
    active_planes: HashSet<String>,
    /// Planes with an intersection in the frame being assembled.
    found_planes: HashSet<String>,
}

impl Parser {
    pub fn new(options: OptionsHandle) -> Self {
        let intersection_header = options.get().intersection_header();
        Self {
            options,
            state: State::Initial,
            intersection_header,
            data_index: 0,
            intersection: Intersection::default(),
            frame: Sample::default(),
            active_planes: HashSet::new(),
            found_planes: HashSet::new(),
        }
    }

    /// Forget all state, including plane membership, and re-read the
    /// configured intersection source.
    pub fn reset(&mut self) {
        self.state = State::Initial;
        self.data_index = 0;
        self.intersection = Intersection::default();
        self.frame = Sample::default();
        self.active_planes.clear();
        self.found_planes.clear();
        self.intersection_header = self.options.get().intersection_header();
        debug!("parser reset, listening to {}", self.intersection_header);
    }

    /// Planes hit in the last emitted frame.
    pub fn active_planes(&self) -> impl Iterator<Item = &str> {
        self.active_planes.iter().map(String::as_str)
    }

    /// Consume one protocol line.
    pub fn feed(&mut self, line: &str) -> Result<Vec<ParserEvent>, ParseError> {
        let mut events = Vec::new();
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.is_empty() {
            self.finalize_frame(&mut events);
        } else {
            self.dispatch(line, &mut events)?;
        }
        Ok(events)
    }

    /// End of stream: finalize whatever frame is pending.
    pub fn finish(&mut self) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        self.finalize_frame(&mut events);
        events
    }

    /// Take a frame that arrived already parsed through the same quality
    /// gate and enter/exit bookkeeping as a text frame. A pending text
    /// frame is dropped.
    pub fn accept_sample(&mut self, sample: Sample) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        self.found_planes.clear();
        self.frame = Sample {
            intersections: Vec::with_capacity(sample.intersections.len()),
            ..sample
        };
        for intersection in sample.intersections {
            self.intersection = intersection;
            self.create_intersection(&mut events);
        }
        self.finalize_frame(&mut events);
        events
    }

    fn dispatch(&mut self, line: &str, events: &mut Vec<ParserEvent>) -> Result<(), ParseError> {
        match self.state {
            State::Initial => self.parse_field(line),
            State::Intersections => {
                if let Some(rest) = line.strip_prefix(INTERSECTION) {
                    self.intersection = Intersection {
                        id: parse_int(rest, "intersection id")?,
                        ..Intersection::default()
                    };
                    self.data_index = 0;
                    self.state = State::Intersection;
                    Ok(())
                } else if let Some(data) = line.strip_prefix(PAD) {
                    Err(ParseError::UnexpectedIntersectionData(data.to_string()))
                } else {
                    self.state = State::Initial;
                    self.dispatch(line, events)
                }
            }
            State::Intersection => match line.strip_prefix(PAD) {
                Some(data) => self.parse_intersection_data(data, events),
                None => {
                    // Incomplete block: drop it and read the line as a field.
                    self.state = State::Initial;
                    self.dispatch(line, events)
                }
            },
        }
    }

    fn parse_field(&mut self, line: &str) -> Result<(), ParseError> {
        if let Some(rest) = line.strip_prefix(FRAME_NUMBER) {
            self.frame.id = parse_int(rest, "frame number")?;
        } else if let Some(rest) = line.strip_prefix(TIME_STAMP) {
            self.frame.timestamp = payload(rest)
                .parse::<i64>()
                .map_err(|_| malformed("timestamp", rest))?;
        } else if let Some(rest) = line.strip_prefix(GAZE_QUALITY) {
            self.frame.gaze_quality = payload(rest)
                .parse::<f64>()
                .map_err(|_| malformed("gaze quality", rest))?;
        } else if line.starts_with(self.intersection_header) {
            self.state = State::Intersections;
        }
        Ok(())
    }

    fn parse_intersection_data(
        &mut self,
        data: &str,
        events: &mut Vec<ParserEvent>,
    ) -> Result<(), ParseError> {
        match self.data_index {
            0 => self.intersection.gaze = Point3D::parse(data)?,
            1 => self.intersection.point = Point2D::parse(data)?,
            2 => self.intersection.plane_name = data.to_string(),
            _ => return Err(ParseError::UnexpectedIntersectionData(data.to_string())),
        }
        self.data_index += 1;

        if self.data_index == 3 {
            self.create_intersection(events);
            self.state = State::Intersections;
        }
        Ok(())
    }

    fn create_intersection(&mut self, events: &mut Vec<ParserEvent>) {
        let intersection = std::mem::take(&mut self.intersection);
        self.found_planes.insert(intersection.plane_name.clone());

        // Enter fires before the frame is complete. A frame whose quality
        // line already failed the gate stays silent.
        if !self.active_planes.contains(&intersection.plane_name) && !self.is_frame_gated() {
            debug!("entered {}", intersection.plane_name);
            events.push(ParserEvent::PlaneEnter(intersection.clone()));
        }
        self.frame.intersections.push(intersection);
    }

    fn is_frame_gated(&self) -> bool {
        let options = self.options.get();
        options.use_gaze_quality_measurement
            && self.frame.gaze_quality < options.gaze_quality_threshold
    }

    fn finalize_frame(&mut self, events: &mut Vec<ParserEvent>) {
        if self.is_frame_gated() {
            debug!(
                "frame {} discarded, gaze quality {:.2}",
                self.frame.id, self.frame.gaze_quality
            );
        } else if self.frame.id != 0 {
            for name in self.active_planes.difference(&self.found_planes) {
                debug!("exited {}", name);
                events.push(ParserEvent::PlaneExit(name.clone()));
            }
            std::mem::swap(&mut self.active_planes, &mut self.found_planes);

            let frame = Sample {
                id: self.frame.id,
                timestamp: self.frame.timestamp,
                gaze_quality: self.frame.gaze_quality,
                intersections: self.frame.intersections.clone(),
            };
            events.push(ParserEvent::Sample(frame));
        }

        self.found_planes.clear();
        self.frame.id = 0;
        self.frame.timestamp = 0;
        self.frame.gaze_quality = 1.0;
        self.frame.intersections.clear();
        self.state = State::Initial;
        self.data_index = 0;
    }
}

fn payload(rest: &str) -> &str {
    rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim_end()
}

fn parse_int(rest: &str, field: &'static str) -> Result<i32, ParseError> {
    payload(rest).parse::<i32>().map_err(|_| malformed(field, rest))
}

fn malformed(field: &'static str, value: &str) -> ParseError {
    ParseError::MalformedField {
        field,
        value: value.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;

    fn frame(id: i32, planes: &[&str]) -> Vec<String> {
        let mut lines = vec![
            format!("FrameNumber {}", id),
            format!("TimeStamp {}", 1000 + id * 16),
            "ClosestWorldIntersection".to_string(),
        ];
        for (n, plane) in planes.iter().enumerate() {
            lines.push(format!("Intersection {}", n));
            lines.push("\t0.1 0.2 -0.9".to_string());
            lines.push(format!("\t{} {}", 100 + n, 200 + n));
            lines.push(format!("\t{}", plane));
        }
        lines.push(String::new());
        lines
    }

    fn feed_all(parser: &mut Parser, lines: &[String]) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        for line in lines {
            events.extend(parser.feed(line).unwrap());
        }
        events
    }

    fn samples(events: &[ParserEvent]) -> Vec<&Sample> {
        events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Sample(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let mut parser = Parser::new(OptionsHandle::default());
        let events = feed_all(&mut parser, &frame(7, &["Screen", "LeftMirror"]));

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ParserEvent::PlaneEnter(i) if i.plane_name == "Screen"));
        assert!(matches!(&events[1], ParserEvent::PlaneEnter(i) if i.plane_name == "LeftMirror"));

        let s = samples(&events);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].id, 7);
        assert_eq!(s[0].timestamp, 1112);
        assert_eq!(s[0].intersections.len(), 2);
        assert_eq!(s[0].intersections[0].point, Point2D::new(100.0, 200.0));
        assert_eq!(s[0].intersections[1].plane_name, "LeftMirror");
        assert_eq!(s[0].intersections[0].gaze, Point3D::new(0.1, 0.2, -0.9));
    }

    #[test]
    fn test_enter_exit_set_difference() {
        let mut parser = Parser::new(OptionsHandle::default());
        feed_all(&mut parser, &frame(1, &["A", "B"]));
        let events = feed_all(&mut parser, &frame(2, &["B", "C"]));

        let enters: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::PlaneEnter(i) => Some(i.plane_name.as_str()),
                _ => None,
            })
            .collect();
        let exits: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::PlaneExit(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(enters, vec!["C"]);
        assert_eq!(exits, vec!["A"]);
        assert!(matches!(events.last(), Some(ParserEvent::Sample(_))));

        let mut active: Vec<_> = parser.active_planes().collect();
        active.sort();
        assert_eq!(active, vec!["B", "C"]);
    }

    #[test]
    fn test_frame_without_intersections_exits_all() {
        let mut parser = Parser::new(OptionsHandle::default());
        feed_all(&mut parser, &frame(1, &["Screen"]));
        let events = feed_all(&mut parser, &frame(2, &[]));
        assert_eq!(events[0], ParserEvent::PlaneExit("Screen".to_string()));
        assert_eq!(samples(&events)[0].intersections.len(), 0);
    }

    #[test]
    fn test_quality_gate_discards_frame() {
        let options = OptionsHandle::new(GridOptions {
            use_gaze_quality_measurement: true,
            gaze_quality_threshold: 0.5,
            ..GridOptions::default()
        });
        let mut parser = Parser::new(options);
        let mut lines = frame(3, &["Screen"]);
        lines.insert(2, "GazeDirectionQ 0.2".to_string());

        let events = feed_all(&mut parser, &lines);
        assert!(events.is_empty());
        assert_eq!(parser.active_planes().count(), 0);

        // Quality resets per frame; the next good frame enters normally.
        let events = feed_all(&mut parser, &frame(4, &["Screen"]));
        assert!(matches!(&events[0], ParserEvent::PlaneEnter(_)));
        assert_eq!(samples(&events)[0].gaze_quality, 1.0);
    }

    #[test]
    fn test_late_quality_line_still_enters() {
        let options = OptionsHandle::new(GridOptions {
            use_gaze_quality_measurement: true,
            gaze_quality_threshold: 0.5,
            ..GridOptions::default()
        });
        let mut parser = Parser::new(options);
        let mut lines = frame(3, &["Screen"]);
        let blank = lines.len() - 1;
        lines.insert(blank, "GazeDirectionQ 0.2".to_string());

        // Enter fires while the block is read; the gate only drops the
        // frame at its end.
        let events = feed_all(&mut parser, &lines);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParserEvent::PlaneEnter(i) if i.plane_name == "Screen"));
        assert_eq!(parser.active_planes().count(), 0);

        let events = feed_all(&mut parser, &frame(4, &["Screen"]));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParserEvent::PlaneEnter(i) if i.plane_name == "Screen"));
        assert!(!events.iter().any(|e| matches!(e, ParserEvent::PlaneExit(_))));
        assert_eq!(samples(&events).len(), 1);
        assert_eq!(parser.active_planes().collect::<Vec<_>>(), vec!["Screen"]);
    }

    #[test]
    fn test_whitespace_line_is_not_a_terminator() {
        let mut parser = Parser::new(OptionsHandle::default());
        let lines: Vec<String> = [
            "FrameNumber 9",
            "ClosestWorldIntersection",
            "Intersection 0",
            "\t0.1 0.2 -0.9",
            "\t10 20",
            "\t",
            "",
        ]
        .iter()
        .map(|l| l.to_string())
        .collect();

        let events = feed_all(&mut parser, &lines);
        let frames = samples(&events);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].intersections.len(), 1);
        assert_eq!(frames[0].intersections[0].plane_name, "");

        // Outside a block a whitespace line is just an unknown field.
        assert!(parser.feed("FrameNumber 10").unwrap().is_empty());
        assert!(parser.feed("  ").unwrap().is_empty());
        assert_eq!(samples(&parser.feed("").unwrap()).len(), 1);
    }

    #[test]
    fn test_blank_line_without_frame_emits_nothing() {
        let mut parser = Parser::new(OptionsHandle::default());
        assert!(parser.feed("").unwrap().is_empty());
        assert!(parser.feed("SomeOtherField 12").unwrap().is_empty());
        assert!(parser.feed("").unwrap().is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn test_repeated_blank_line_fires_once() {
        let mut parser = Parser::new(OptionsHandle::default());
        let mut lines = frame(5, &["Screen"]);
        lines.push(String::new());
        let events = feed_all(&mut parser, &lines);
        assert_eq!(samples(&events).len(), 1);
    }

    #[test]
    fn test_ignores_other_sources() {
        let mut parser = Parser::new(OptionsHandle::default());
        let lines: Vec<String> = [
            "FrameNumber 9",
            "EstimatedClosestWorldIntersection",
            "Intersection 0",
            "\t0 0 1",
            "\t10 10",
            "\tScreen",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let events = feed_all(&mut parser, &lines);
        assert_eq!(events.len(), 1);
        assert!(samples(&events)[0].intersections.is_empty());
    }

    #[test]
    fn test_predicted_filtered_source() {
        let options = OptionsHandle::default();
        let mut parser = Parser::new(options.clone());
        options.update(|o| {
            o.intersection_source = crate::config::IntersectionSource::Predicted;
            o.intersection_source_filtered = true;
        });
        parser.reset();

        let mut lines = frame(2, &["Screen"]);
        lines[2] = "FilteredEstimatedClosestWorldIntersection".to_string();
        let events = feed_all(&mut parser, &lines);
        assert_eq!(samples(&events)[0].intersections.len(), 1);
    }

    #[test]
    fn test_fourth_data_line_is_error() {
        let mut parser = Parser::new(OptionsHandle::default());
        let mut lines = frame(1, &["Screen"]);
        lines.pop();
        for line in &lines {
            parser.feed(line).unwrap();
        }
        let err = parser.feed("\textra").unwrap_err();
        assert_eq!(err, ParseError::UnexpectedIntersectionData("extra".to_string()));
    }

    #[test]
    fn test_malformed_numbers() {
        let mut parser = Parser::new(OptionsHandle::default());
        assert!(matches!(
            parser.feed("FrameNumber abc"),
            Err(ParseError::MalformedField { field: "frame number", .. })
        ));
        assert!(parser.feed("TimeStamp 1.5.2").is_err());

        parser.feed("ClosestWorldIntersection").unwrap();
        assert!(parser.feed("Intersection x").is_err());
    }

    #[test]
    fn test_fields_after_intersections_start_next_frame_data() {
        let mut parser = Parser::new(OptionsHandle::default());
        let lines: Vec<String> = [
            "FrameNumber 1",
            "ClosestWorldIntersection",
            "Intersection 0",
            "\t0 0 1",
            "\t10 10",
            "\tScreen",
            "TimeStamp 5000",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let events = feed_all(&mut parser, &lines);
        let s = samples(&events);
        assert_eq!(s[0].timestamp, 5000);
        assert_eq!(s[0].intersections.len(), 1);
    }

    #[test]
    fn test_incomplete_block_is_dropped() {
        let mut parser = Parser::new(OptionsHandle::default());
        let lines: Vec<String> = [
            "FrameNumber 1",
            "ClosestWorldIntersection",
            "Intersection 0",
            "\t0 0 1",
            "TimeStamp 10",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let events = feed_all(&mut parser, &lines);
        assert_eq!(events.len(), 1);
        assert!(samples(&events)[0].intersections.is_empty());
    }

    #[test]
    fn test_finish_flushes_pending_frame() {
        let mut parser = Parser::new(OptionsHandle::default());
        let mut lines = frame(11, &["Screen"]);
        lines.pop();
        feed_all(&mut parser, &lines);
        let events = parser.finish();
        assert_eq!(samples(&events)[0].id, 11);
    }

    #[test]
    fn test_accept_sample_tracks_planes() {
        let mut parser = Parser::new(OptionsHandle::default());
        let hit = |name: &str| Intersection {
            plane_name: name.to_string(),
            ..Intersection::default()
        };
        let first = Sample {
            id: 1,
            intersections: vec![hit("Screen")],
            ..Sample::default()
        };
        let events = parser.accept_sample(first.clone());
        assert!(matches!(&events[0], ParserEvent::PlaneEnter(i) if i.plane_name == "Screen"));
        assert_eq!(events[1], ParserEvent::Sample(first));

        let events = parser.accept_sample(Sample {
            id: 2,
            intersections: vec![hit("LeftMirror")],
            ..Sample::default()
        });
        assert_eq!(events.len(), 3);
        assert!(events.contains(&ParserEvent::PlaneExit("Screen".to_string())));
        assert_eq!(parser.active_planes().collect::<Vec<_>>(), vec!["LeftMirror"]);
    }

    #[test]
    fn test_accept_sample_applies_quality_gate() {
        let options = OptionsHandle::new(GridOptions {
            use_gaze_quality_measurement: true,
            ..GridOptions::default()
        });
        let mut parser = Parser::new(options);
        let events = parser.accept_sample(Sample {
            id: 9,
            gaze_quality: 0.1,
            intersections: vec![Intersection {
                plane_name: "Screen".to_string(),
                ..Intersection::default()
            }],
            ..Sample::default()
        });
        assert!(events.is_empty());
        assert_eq!(parser.active_planes().count(), 0);
    }
}

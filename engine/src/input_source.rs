//! Input sources feeding a session.
//!
//! `InputEvent` covers everything a session consumes: raw protocol lines,
//! pre-parsed samples, pointer input for the mouse controller, and
//! scripted waits. `LineProvider` reads the tracker protocol from any
//! `BufRead`; `ScriptedInputProvider` replays a fixed sequence so tests
//! can drive the whole pipeline deterministically together with a
//! `TestClock`.

use std::collections::VecDeque;
use std::io::BufRead;
use std::time::Duration;

use tracing::warn;

use crate::comm::Sample;

/// One unit of input for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Raw tracker protocol line, without the line terminator.
    Line(String),
    /// The line stream ended; flushes a pending frame.
    EndOfStream,
    /// Frame already parsed by the producer.
    Sample(Sample),
    /// Pointer position on the game panel.
    PointerMove { x: f64, y: f64, width: f64, height: f64 },
    /// Pointer click on the game panel.
    PointerClick { x: f64, y: f64, width: f64, height: f64 },
    /// Let time pass (used in scripted sequences).
    Wait { duration: Duration },
}

impl InputEvent {
    pub fn line(text: &str) -> Self {
        Self::Line(text.to_string())
    }

    pub fn wait_ms(ms: u64) -> Self {
        Self::Wait {
            duration: Duration::from_millis(ms),
        }
    }
}

/// Source of input events.
pub trait InputProvider: Send {
    /// Get the next input event, if any.
    fn next_event(&mut self) -> Option<InputEvent>;
    /// Whether there are more events to deliver.
    fn has_events(&self) -> bool;
}

// ── Scripted ────────────────────────────────────────────────

/// Delivers events from a pre-defined queue.
pub struct ScriptedInputProvider {
    events: VecDeque<InputEvent>,
}

impl ScriptedInputProvider {
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
        }
    }

    /// Script from protocol text: one `Line` per line, then `EndOfStream`.
    pub fn from_protocol(text: &str) -> Self {
        let mut events: Vec<InputEvent> = text.lines().map(InputEvent::line).collect();
        events.push(InputEvent::EndOfStream);
        Self::new(events)
    }

    /// Number of remaining events.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl InputProvider for ScriptedInputProvider {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

// ── Recording ───────────────────────────────────────────────

/// A recording wrapper that keeps every event taken from an inner provider.
pub struct RecordingProvider<P: InputProvider> {
    inner: P,
    recorded: Vec<InputEvent>,
}

impl<P: InputProvider> RecordingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[InputEvent] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<InputEvent> {
        self.recorded
    }
}

impl<P: InputProvider> InputProvider for RecordingProvider<P> {
    fn next_event(&mut self) -> Option<InputEvent> {
        let event = self.inner.next_event()?;
        self.recorded.push(event.clone());
        Some(event)
    }

    fn has_events(&self) -> bool {
        self.inner.has_events()
    }
}

// ── Lines ───────────────────────────────────────────────────

/// Reads protocol lines from a buffered reader. A read error ends the
/// stream like EOF does.
pub struct LineProvider<R: BufRead + Send> {
    reader: R,
    buf: String,
    done: bool,
    lines_read: u64,
}

impl<R: BufRead + Send> LineProvider<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            done: false,
            lines_read: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<R: BufRead + Send> InputProvider for LineProvider<R> {
    fn next_event(&mut self) -> Option<InputEvent> {
        if self.done {
            return None;
        }
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => {
                self.done = true;
                Some(InputEvent::EndOfStream)
            }
            Ok(_) => {
                self.lines_read += 1;
                let line = self.buf.trim_end_matches(&['\r', '\n'][..]);
                Some(InputEvent::Line(line.to_string()))
            }
            Err(e) => {
                warn!("input read failed after {} lines: {}", self.lines_read, e);
                self.done = true;
                Some(InputEvent::EndOfStream)
            }
        }
    }

    fn has_events(&self) -> bool {
        !self.done
    }
}

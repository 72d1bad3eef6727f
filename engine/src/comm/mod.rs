//! Tracker communication — value types and the line protocol parser.
//!
//! The tracker's socket client prints one field per line; a blank line
//! terminates a frame. `Parser` turns that feed into owned `Sample`
//! values plus plane enter/exit notifications.

pub mod parser;
pub mod point;
pub mod sample;

pub use parser::{ParseError, Parser, ParserEvent};
pub use point::{Point2D, Point3D};
pub use sample::{Intersection, Sample};

//! 2D/3D measurement points as printed by the tracker.

use super::parser::ParseError;

/// A point on a plane, in pixels or normalized units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Parse "x y" (space separated).
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut parts = text.split_whitespace();
        let x = parse_component(parts.next(), text)?;
        let y = parse_component(parts.next(), text)?;
        Ok(Self { x, y })
    }
}

/// A 3D gaze vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Parse "x y z" (space separated).
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut parts = text.split_whitespace();
        let x = parse_component(parts.next(), text)?;
        let y = parse_component(parts.next(), text)?;
        let z = parse_component(parts.next(), text)?;
        Ok(Self { x, y, z })
    }
}

fn parse_component(part: Option<&str>, line: &str) -> Result<f64, ParseError> {
    part.and_then(|p| p.parse::<f64>().ok())
        .ok_or_else(|| ParseError::MalformedField {
            field: "coordinate",
            value: line.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(b.distance(&b), 0.0);
    }

    #[test]
    fn test_parse_points() {
        assert_eq!(Point2D::parse("812.5 -3").unwrap(), Point2D::new(812.5, -3.0));
        assert_eq!(
            Point3D::parse("0.1 0.2 -0.97").unwrap(),
            Point3D::new(0.1, 0.2, -0.97)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Point2D::parse("12 abc"),
            Err(ParseError::MalformedField { .. })
        ));
        assert!(Point3D::parse("1 2").is_err());
    }
}

//! Page geometry: character quads and their stable textual keys
//!
//! All coordinates are PDF user-space points. A [`Quad`] is serialized as a
//! plain `[x0, y0, x1, y1]` array; a [`CoordKey`] is the same rectangle
//! quantized to [`COORD_DECIMALS`] decimals and rendered as
//! `"(x0,y0,x1,y1)"`, which is what `coords2offsetMap` uses as its keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::position::AddressParseError;

/// Number of decimals kept in coordinate keys (and in quantized quads)
pub const COORD_DECIMALS: usize = 3;

const COORD_SCALE: f64 = 1000.0;

/// Axis-aligned rectangle `[x0, y0, x1, y1]` in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quad {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl From<[f64; 4]> for Quad {
    fn from([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl From<Quad> for [f64; 4] {
    fn from(q: Quad) -> Self {
        [q.x0, q.y0, q.x1, q.y1]
    }
}

impl Quad {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Zero-area quads are produced for inferred line breaks
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Smallest rectangle covering both quads
    pub fn union(&self, other: &Quad) -> Quad {
        Quad {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of every quad in the iterator, `None` when it is empty
    pub fn union_all<'a, I>(quads: I) -> Option<Quad>
    where
        I: IntoIterator<Item = &'a Quad>,
    {
        quads
            .into_iter()
            .fold(None, |acc: Option<Quad>, q| match acc {
                Some(u) => Some(u.union(q)),
                None => Some(*q),
            })
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Euclidean distance from a point to the rectangle (0 when inside)
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        let dx = (self.x0 - x).max(0.0).max(x - self.x1);
        let dy = (self.y0 - y).max(0.0).max(y - self.y1);
        (dx * dx + dy * dy).sqrt()
    }

    /// True when the two rectangles share interior area
    pub fn intersects(&self, other: &Quad) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// Round every coordinate to [`COORD_DECIMALS`] decimals
    pub fn quantized(&self) -> Quad {
        CoordKey::from(*self).to_quad()
    }

    pub fn key(&self) -> CoordKey {
        CoordKey::from(*self)
    }
}

/// Quantized quad used as the reverse-map key
///
/// Stored as integer thousandths so that encode and decode are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey([i64; 4]);

impl From<Quad> for CoordKey {
    fn from(q: Quad) -> Self {
        let scale = |v: f64| (v * COORD_SCALE).round() as i64;
        CoordKey([scale(q.x0), scale(q.y0), scale(q.x1), scale(q.y1)])
    }
}

impl CoordKey {
    pub fn to_quad(&self) -> Quad {
        let [x0, y0, x1, y1] = self.0.map(|v| v as f64 / COORD_SCALE);
        Quad { x0, y0, x1, y1 }
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.to_quad();
        write!(
            f,
            "({:.prec$},{:.prec$},{:.prec$},{:.prec$})",
            q.x0,
            q.y0,
            q.x1,
            q.y1,
            prec = COORD_DECIMALS
        )
    }
}

impl FromStr for CoordKey {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| AddressParseError::new(s, "expected \"(x0,y0,x1,y1)\""))?;

        let parts: Vec<&str> = inner.split(',').collect();
        if parts.len() != 4 {
            return Err(AddressParseError::new(s, "expected four coordinates"));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || part.contains(char::is_whitespace) {
                return Err(AddressParseError::new(s, "coordinates must not contain spaces"));
            }
            *slot = part
                .parse::<f64>()
                .map_err(|_| AddressParseError::new(s, "coordinate is not a number"))?;
            if !slot.is_finite() {
                return Err(AddressParseError::new(s, "coordinate is not finite"));
            }
        }

        Ok(CoordKey::from(Quad::from(values)))
    }
}

impl Serialize for CoordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CoordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_covers_both() {
        let a = Quad::new(10.0, 10.0, 20.0, 22.0);
        let b = Quad::new(18.0, 8.0, 30.0, 20.0);
        assert_eq!(a.union(&b), Quad::new(10.0, 8.0, 30.0, 22.0));
    }

    #[test]
    fn test_union_all_empty_is_none() {
        let empty: Vec<Quad> = Vec::new();
        assert!(Quad::union_all(&empty).is_none());
    }

    #[test]
    fn test_key_format_fixed_precision() {
        let key = Quad::new(72.0, 700.5, 78.12345, 712.0).key();
        assert_eq!(key.to_string(), "(72.000,700.500,78.123,712.000)");
    }

    #[test]
    fn test_key_parse_rejects_spaces() {
        assert!("(1.0, 2.0,3.0,4.0)".parse::<CoordKey>().is_err());
        assert!("(1.0,2.0,3.0)".parse::<CoordKey>().is_err());
        assert!("1.0,2.0,3.0,4.0".parse::<CoordKey>().is_err());
    }

    #[test]
    fn test_negative_coordinates_keep_sign() {
        let key = Quad::new(-12.25, -0.0004, 3.0, 4.0).key();
        assert_eq!(key.to_string(), "(-12.250,0.000,3.000,4.000)");
    }

    #[test]
    fn test_degenerate_quad() {
        assert!(Quad::new(5.0, 0.0, 5.0, 10.0).is_degenerate());
        assert!(!Quad::new(5.0, 0.0, 6.0, 10.0).is_degenerate());
    }

    #[test]
    fn test_distance_to_point() {
        let q = Quad::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(q.distance_to_point(5.0, 5.0), 0.0);
        assert_eq!(q.distance_to_point(13.0, 14.0), 5.0);
    }

    #[test]
    fn test_quad_serializes_as_array() {
        let json = serde_json::to_string(&Quad::new(1.0, 2.5, 3.0, 4.0)).unwrap();
        assert_eq!(json, "[1.0,2.5,3.0,4.0]");
    }
}

//! SVG path and transform geometry.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

static TRANSLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"translate\(\s*(-?[\d.]+(?:e-?\d+)?)\s*(?:[,\s]\s*(-?[\d.]+(?:e-?\d+)?))?\s*\)")
        .expect("translate regex is valid")
});

/// Parse the first `translate(x[,y])` in a transform attribute.
pub fn parse_translate(transform: &str) -> Option<(f64, f64)> {
    let caps = TRANSLATE_RE.captures(transform)?;
    let x = caps.get(1)?.as_str().parse().ok()?;
    let y = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);
    Some((x, y))
}

pub fn translate(x: f64, y: f64) -> String {
    format!("translate({},{})", x, y)
}

/// One command of a path, with its numeric arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub command: char,
    pub args: Vec<f64>,
}

/// Split path data into commands. Returns `None` on malformed numbers.
pub fn parse_path(d: &str) -> Option<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut number = String::new();

    let flush = |number: &mut String, segments: &mut Vec<Segment>| -> Option<()> {
        if number.is_empty() {
            return Some(());
        }
        let value: f64 = number.parse().ok()?;
        segments.last_mut()?.args.push(value);
        number.clear();
        Some(())
    };

    for ch in d.chars() {
        match ch {
            'M' | 'm' | 'L' | 'l' | 'H' | 'h' | 'V' | 'v' | 'Z' | 'z' | 'C' | 'c' | 'S' | 's'
            | 'Q' | 'q' | 'T' | 't' | 'A' | 'a' => {
                flush(&mut number, &mut segments)?;
                segments.push(Segment {
                    command: ch,
                    args: Vec::new(),
                });
            }
            ',' | ' ' | '\t' | '\n' | '\r' => flush(&mut number, &mut segments)?,
            '-' if !number.is_empty() && !number.ends_with(['e', 'E']) => {
                flush(&mut number, &mut segments)?;
                number.push(ch);
            }
            _ => number.push(ch),
        }
    }
    flush(&mut number, &mut segments)?;
    Some(segments)
}

/// A horizontal band drawn as `M x1,y1 H x2 V y2 H x3 Z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Band {
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    /// Vertical centre of the band.
    pub fn mid_y(&self) -> f64 {
        self.y2 + (self.y1 - self.y2) / 2.0
    }
}

/// Read a rectangle-like band path.
pub fn parse_band(d: &str) -> Option<Band> {
    let segments = parse_path(d)?;
    let mut iter = segments.iter();
    let m = iter.next().filter(|s| s.command == 'M' && s.args.len() >= 2)?;
    let h = iter.next().filter(|s| s.command == 'H' && !s.args.is_empty())?;
    let v = iter.next().filter(|s| s.command == 'V' && !s.args.is_empty())?;
    Some(Band {
        x1: m.args[0],
        y1: m.args[1],
        x2: h.args[0],
        y2: v.args[0],
    })
}

/// Horizontal midpoint of a path starting `M x1,y H x2`.
pub fn horizontal_mid(d: &str) -> Option<f64> {
    let segments = parse_path(d)?;
    let x1 = segments.first().filter(|s| s.command == 'M')?.args.first()?;
    let x2 = segments
        .iter()
        .find(|s| s.command == 'H')
        .and_then(|s| s.args.first())?;
    Some(x1 + (x2 - x1) / 2.0)
}

/// X coordinate of the initial move.
pub fn start_x(d: &str) -> Option<f64> {
    parse_path(d)?
        .first()
        .filter(|s| s.command == 'M')
        .and_then(|s| s.args.first().copied())
}

/// Leading number of the text after the last comma, which is the y of the
/// last `x,y` pair: `50` for `M100,50H300`.
pub fn last_pair_y(d: &str) -> Option<f64> {
    let tail = d.rsplit(',').next()?.trim_start();
    let end = tail
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    tail[..end].parse().ok()
}

/// Bounding box `(min_x, min_y, max_x, max_y)` of an absolute `M/L/H/V/Z` path.
pub fn bounds(d: &str) -> Option<(f64, f64, f64, f64)> {
    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut cursor = (0.0, 0.0);
    for segment in parse_path(d)? {
        match segment.command {
            'M' | 'L' => {
                for pair in segment.args.chunks_exact(2) {
                    cursor = (pair[0], pair[1]);
                    points.push(cursor);
                }
            }
            'H' => {
                for x in &segment.args {
                    cursor.0 = *x;
                    points.push(cursor);
                }
            }
            'V' => {
                for y in &segment.args {
                    cursor.1 = *y;
                    points.push(cursor);
                }
            }
            _ => {}
        }
    }
    let first = points.first()?;
    Some(points.iter().fold(
        (first.0, first.1, first.0, first.1),
        |(min_x, min_y, max_x, max_y), (x, y)| {
            (min_x.min(*x), min_y.min(*y), max_x.max(*x), max_y.max(*y))
        },
    ))
}

/// Builder for path data strings.
#[derive(Debug, Default, Clone)]
pub struct PathBuilder {
    d: String,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        let _ = write!(self.d, "M{},{}", x, y);
        self
    }

    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        let _ = write!(self.d, "L{},{}", x, y);
        self
    }

    pub fn horizontal(mut self, x: f64) -> Self {
        let _ = write!(self.d, "H{}", x);
        self
    }

    pub fn vertical(mut self, y: f64) -> Self {
        let _ = write!(self.d, "V{}", y);
        self
    }

    pub fn close(mut self) -> Self {
        self.d.push('Z');
        self
    }

    pub fn build(self) -> String {
        self.d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translate() {
        assert_eq!(parse_translate("translate(10,20)"), Some((10.0, 20.0)));
        assert_eq!(parse_translate("translate(10.5 -3)"), Some((10.5, -3.0)));
        assert_eq!(parse_translate("translate(7)"), Some((7.0, 0.0)));
        assert_eq!(parse_translate("rotate(3)"), None);
    }

    #[test]
    fn test_parse_path_compact_negatives() {
        let segments = parse_path("M10-5L3,4Z").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].args, vec![10.0, -5.0]);
        assert_eq!(segments[2].command, 'Z');
    }

    #[test]
    fn test_parse_band() {
        let band = parse_band("M100,40H140V20H100Z").unwrap();
        assert_eq!(band.width(), 40.0);
        assert_eq!(band.mid_y(), 30.0);
        assert_eq!(parse_band("M1,2L3,4"), None);
    }

    #[test]
    fn test_horizontal_mid() {
        assert_eq!(horizontal_mid("M10,100H30V50H10Z"), Some(20.0));
        assert_eq!(horizontal_mid("M10,100L30,50"), None);
    }

    #[test]
    fn test_axis_line_helpers() {
        assert_eq!(start_x("M350.5,0V420.25"), Some(350.5));
        assert_eq!(last_pair_y("M100,50.5H300"), Some(50.5));
        assert_eq!(last_pair_y("M350.5,0V420.25"), Some(0.0));
        assert_eq!(last_pair_y("M1 2"), None);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds("M10,100V50H30V100Z"), Some((10.0, 50.0, 30.0, 100.0)));
        assert_eq!(bounds(""), None);
    }

    #[test]
    fn test_builder() {
        let d = PathBuilder::new()
            .move_to(0.0, 10.0)
            .horizontal(50.5)
            .vertical(20.0)
            .horizontal(0.0)
            .close()
            .build();
        assert_eq!(d, "M0,10H50.5V20H0Z");
    }
}

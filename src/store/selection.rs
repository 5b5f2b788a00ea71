//! Choosing one document when several match.

use super::Document;
use serde_json::Value;

/// A coordinate in the flat 2-D space used for distribution keys.
pub type Point = [f64; 2];

/// Rule for picking among matching documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The first match in `_id` order.
    First,
    /// The match whose `field` point is closest to `probe`. Documents without
    /// a valid point in `field` are not eligible. Requires a 2d index.
    Nearest { field: String, probe: Point },
}

impl Selection {
    pub fn nearest(field: &str, probe: Point) -> Self {
        Selection::Nearest {
            field: field.to_string(),
            probe,
        }
    }

    /// The field that must carry a 2d index for this selection.
    pub fn index_field(&self) -> Option<&str> {
        match self {
            Selection::First => None,
            Selection::Nearest { field, .. } => Some(field),
        }
    }

    /// Position of the chosen document within `candidates`.
    ///
    /// Ties keep the earlier candidate.
    pub fn choose<'a>(&self, candidates: impl IntoIterator<Item = &'a Document>) -> Option<usize> {
        match self {
            Selection::First => candidates.into_iter().next().map(|_| 0),
            Selection::Nearest { field, probe } => {
                let mut best: Option<(usize, f64)> = None;
                for (i, doc) in candidates.into_iter().enumerate() {
                    let Some(point) = doc.get(field).and_then(read_point) else {
                        continue;
                    };
                    let d = distance_sq(&point, probe);
                    if best.is_none_or(|(_, bd)| d < bd) {
                        best = Some((i, d));
                    }
                }
                best.map(|(i, _)| i)
            }
        }
    }
}

fn read_point(value: &Value) -> Option<Point> {
    match value.as_array()?.as_slice() {
        [x, y] => Some([x.as_f64()?, y.as_f64()?]),
        _ => None,
    }
}

fn distance_sq(a: &Point, b: &Point) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

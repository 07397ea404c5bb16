//! Collected data: two parallel sequences plus which sweep leg each sample came from.

use serde::{Deserialize, Serialize};

use crate::sweep::{self, Segment};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub x_label: String,
    pub y_label: String,
    x: Vec<f64>,
    y: Vec<f64>,
    segments: Vec<Segment>,
}

impl Trace {

    pub fn new(x_label:&str, y_label:&str) -> Self {
        Self{ x_label: x_label.to_owned(), y_label: y_label.to_owned(), ..Default::default() }
    }

    pub fn push(&mut self, x:f64, y:f64, segment:Segment) {
        self.x.push(x);
        self.y.push(y);
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize { self.x.len() }

    pub fn is_empty(&self) -> bool { self.x.is_empty() }

    pub fn x(&self) -> &[f64] { &self.x }

    pub fn y(&self) -> &[f64] { &self.y }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    /// Samples from one leg, in acquisition order.
    pub fn points(&self, segment:Segment) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.rows().zip(self.segments.iter()).filter(move |(_, s)| **s == segment).map(|(p, _)| p)
    }

    pub fn rows(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    pub fn has_segment(&self, segment:Segment) -> bool { self.segments.contains(&segment) }

    pub fn x_bounds(&self) -> Option<(f64, f64)> { sweep::bounds(self.x.iter().copied()) }

    pub fn y_bounds(&self) -> Option<(f64, f64)> { sweep::bounds(self.y.iter().copied()) }

    pub fn last(&self) -> Option<(f64, f64)> { self.rows().last() }

    // Average spacing between successive x values; the sample period for a time trace
    pub fn mean_interval(&self) -> Option<f64> {
        if self.len() < 2 {
            return None;
        }
        let first = self.x[0];
        let last = self.x[self.len() - 1];
        Some((last - first) / ((self.len() - 1) as f64))
    }

    pub fn nearest(&self, x:f64) -> Option<(f64, f64)> {
        self.rows().fold(None, |best:Option<(f64, f64)>, p| match best {
            Some(b) if (b.0 - x).abs() <= (p.0 - x).abs() => Some(b),
            _ => Some(p),
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trace {
        let mut trace = Trace::new("Voltage (V)", "Current (A)");
        trace.push(0.0, 0.0, Segment::Backward);
        trace.push(-1.0, -1e-6, Segment::Backward);
        trace.push(-1.0, -1e-6, Segment::Forward);
        trace.push(1.0, 1e-6, Segment::Forward);
        trace.push(1.0, 1e-6, Segment::Backward);
        trace.push(0.0, 1e-9, Segment::Backward);
        trace
    }

    #[test]
    fn segments_are_split() {
        let trace = sample();
        assert_eq!(trace.len(), 6);
        assert_eq!(trace.points(Segment::Forward).collect::<Vec<_>>(), vec![(-1.0, -1e-6), (1.0, 1e-6)]);
        assert_eq!(trace.points(Segment::Backward).count(), 4);
        assert_eq!(trace.x_bounds(), Some((-1.0, 1.0)));
        assert_eq!(trace.y_bounds(), Some((-1e-6, 1e-6)));
        assert_eq!(trace.last(), Some((0.0, 1e-9)));
    }

    #[test]
    fn mean_interval_needs_two_samples() {
        let mut trace = Trace::new("Time (s)", "Current (A)");
        assert_eq!(trace.mean_interval(), None);
        trace.push(0.0, 1.0, Segment::Forward);
        assert_eq!(trace.mean_interval(), None);
        trace.push(0.5, 1.0, Segment::Forward);
        trace.push(1.5, 1.0, Segment::Forward);
        assert_eq!(trace.mean_interval(), Some(0.75));
    }

    #[test]
    fn nearest_sample() {
        let trace = sample();
        assert_eq!(trace.nearest(0.8), Some((1.0, 1e-6)));
        assert_eq!(trace.nearest(-0.4), Some((0.0, 0.0)));
        assert_eq!(Trace::new("a", "b").nearest(0.0), None);
    }
}

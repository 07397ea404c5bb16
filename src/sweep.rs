//! Source lists for the sweeps and ramps.
//!
//! Every point is computed from its index (`start + k*step`) rather than by accumulating steps, so the
//! bounds come out exactly and no point ever lands beyond them.

use std::io::{self, Error, ErrorKind};

use serde::{Deserialize, Serialize};

/// Which leg of a triangular sweep a point belongs to.  Legs heading away from zero toward the lower bound,
/// and back to zero from the upper bound, are `Backward`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Forward,
    Backward,
}

impl Segment {
    pub fn label(&self) -> &'static str {
        match self {
            Segment::Forward => "Forward",
            Segment::Backward => "Backward",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub level: f64,
    pub segment: Segment,
}

// Division like 2.5e-9 / 1e-10 lands a hair under 25
const STEP_TOLERANCE:f64 = 1e-9;

// Upper bound on points in one leg or ramp
pub const MAX_POINTS:usize = 1_000_000;

fn invalid(msg:String) -> io::Error { Error::new(ErrorKind::InvalidInput, msg) }

fn check_step(step:f64) -> io::Result<()> {
    if step.is_finite() && step > 0.0 { Ok(()) } else { Err(invalid(format!("Step must be positive and finite, got {}", step))) }
}

fn check_finite(name:&str, x:f64) -> io::Result<()> {
    if x.is_finite() { Ok(()) } else { Err(invalid(format!("{} must be finite, got {}", name, x))) }
}

pub fn round_to(x:f64, decimals:u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let rounded = (x * scale).round() / scale;
    // Keep -0.0 out of the output file
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn check_count(n:f64, distance:f64, step:f64) -> io::Result<usize> {
    if n > MAX_POINTS as f64 {
        return Err(invalid(format!("Step {} over {} needs more than {} points", step, distance, MAX_POINTS)));
    }
    Ok(n as usize)
}

// Whole steps that fit in `distance`
fn step_count(distance:f64, step:f64) -> io::Result<usize> {
    check_count((distance / step * (1.0 + STEP_TOLERANCE)).floor(), distance, step)
}

// Both endpoints included; `to` is appended when the step doesn't divide the distance
fn leg(from:f64, to:f64, step:f64, decimals:Option<u32>, segment:Segment, out:&mut Vec<SweepPoint>) -> io::Result<()> {
    let (lo, hi) = if from < to { (from, to) } else { (to, from) };
    let dir = if to < from { -1.0 } else { 1.0 };
    let n = step_count(hi - lo, step)?;
    let snap = step * 1e-6;
    let round = |x:f64| match decimals { Some(d) => round_to(x, d), None => x };

    for k in 0..=n {
        let mut level = (from + dir * (k as f64) * step).max(lo).min(hi);
        if (level - to).abs() <= snap {
            level = to;
        }
        out.push(SweepPoint{ level: round(level), segment });
    }

    let reached = out.last().map_or(false, |p| (p.level - round(to)).abs() <= snap);
    if !reached {
        out.push(SweepPoint{ level: round(to), segment });
    }
    Ok(())
}

/// 0 to `lower`, `lower` to `upper`, then `upper` back to 0.  Each leg repeats the point it starts on, so the
/// turning points are measured once per leg.
pub fn triangular(lower:f64, upper:f64, step:f64, decimals:Option<u32>) -> io::Result<Vec<SweepPoint>> {
    check_step(step)?;
    check_finite("Lower bound", lower)?;
    check_finite("Upper bound", upper)?;
    if lower > 0.0 || upper < 0.0 {
        return Err(invalid(format!("Sweep must span zero, got {} to {}", lower, upper)));
    }

    let mut points:Vec<SweepPoint> = vec![];
    leg(0.0, lower, step, decimals, Segment::Backward, &mut points)?;
    leg(lower, upper, step, decimals, Segment::Forward, &mut points)?;
    leg(upper, 0.0, step, decimals, Segment::Backward, &mut points)?;
    Ok(points)
}

/// Evenly spaced levels from `from` (excluded) to `to` (included) with no increment larger than `step`.
/// Always at least one point, so the source finishes exactly on `to`.
pub fn ramp(from:f64, to:f64, step:f64) -> io::Result<Vec<f64>> {
    check_step(step)?;
    check_finite("Ramp start", from)?;
    check_finite("Ramp target", to)?;

    let distance = (to - from).abs();
    let n = check_count(((distance / step) * (1.0 - STEP_TOLERANCE)).ceil().max(1.0), distance, step)?;
    Ok((1..=n).map(|k| if k == n { to } else { from + (to - from) * (k as f64) / (n as f64) }).collect())
}

/// Smallest and largest level, or `None` for an empty list.
pub fn bounds<I: IntoIterator<Item = f64>>(levels:I) -> Option<(f64, f64)> {
    levels.into_iter().fold(None, |acc, x| match acc {
        None => Some((x, x)),
        Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
    })
}

/// Plot range with 5% of the larger bound added on each side.
pub fn padded_range(min:f64, max:f64) -> (f64, f64) {
    let pad = 0.05 * min.abs().max(max.abs());
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(points:&[SweepPoint]) -> Vec<f64> { points.iter().map(|p| p.level).collect() }

    #[test]
    fn voltage_sweep_goes_down_up_and_back() {
        let points = triangular(-5.0, 5.0, 0.25, Some(2)).unwrap();
        assert_eq!(points.len(), 21 + 41 + 21);

        assert_eq!(points[0].level, 0.0);
        assert_eq!(points[20], SweepPoint{ level: -5.0, segment: Segment::Backward });
        assert_eq!(points[21], SweepPoint{ level: -5.0, segment: Segment::Forward });
        assert_eq!(points[61], SweepPoint{ level: 5.0, segment: Segment::Forward });
        assert_eq!(points[62], SweepPoint{ level: 5.0, segment: Segment::Backward });
        assert_eq!(points[82].level, 0.0);
        assert_eq!(points[1].level, -0.25);
        assert_eq!(points[41].level, 0.0);

        assert!(points.windows(2).all(|w| (w[1].level - w[0].level).abs() <= 0.25 + 1e-12));
        assert_eq!(bounds(levels(&points)), Some((-5.0, 5.0)));
    }

    #[test]
    fn nanoamp_sweep_hits_its_bounds() {
        let points = triangular(-2.5e-9, 2.5e-9, 1e-10, None).unwrap();
        assert_eq!(points.len(), 26 + 51 + 26);
        assert_eq!(points[25].level, -2.5e-9);
        assert_eq!(points[76].level, 2.5e-9);
        assert_eq!(points.last().unwrap().level, 0.0);
        let (lo, hi) = bounds(levels(&points)).unwrap();
        assert!(lo >= -2.5e-9 && hi <= 2.5e-9);
    }

    #[test]
    fn uneven_step_stops_at_the_bound() {
        let points = triangular(-1.0, 0.5, 0.3, Some(2)).unwrap();
        assert_eq!(levels(&points[..5]), vec![0.0, -0.3, -0.6, -0.9, -1.0]);
        assert!(levels(&points).iter().all(|l| *l >= -1.0 && *l <= 0.5));
        assert_eq!(points.last().unwrap().level, 0.0);
    }

    #[test]
    fn asymmetric_and_one_sided_sweeps() {
        let points = triangular(0.0, 1.0, 0.5, None).unwrap();
        assert_eq!(levels(&points), vec![0.0, 0.0, 0.5, 1.0, 1.0, 0.5, 0.0]);
        assert_eq!(points[0].segment, Segment::Backward);
        assert_eq!(points[1].segment, Segment::Forward);
    }

    #[test]
    fn bad_sweeps_are_rejected() {
        assert!(triangular(-1.0, 1.0, 0.0, None).is_err());
        assert!(triangular(-1.0, 1.0, -0.1, None).is_err());
        assert!(triangular(0.5, 1.0, 0.1, None).is_err());
        assert!(triangular(-1.0, f64::NAN, 0.1, None).is_err());
    }

    #[test]
    fn tiny_steps_are_refused_before_allocating() {
        assert_eq!(triangular(-5.0, 5.0, 1e-15, Some(2)).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(ramp(-10.0, 0.0, 1e-15).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(ramp(0.0, 1.0, 1.0 / MAX_POINTS as f64).unwrap().len(), MAX_POINTS);
    }

    #[test]
    fn ramp_excludes_start_and_ends_on_target() {
        let r = ramp(-10.0, 0.0, 0.1).unwrap();
        assert_eq!(r.len(), 100);
        assert_eq!(*r.last().unwrap(), 0.0);
        assert!((r[0] + 9.9).abs() < 1e-12);

        let r = ramp(0.3, 0.0, 0.25).unwrap();
        assert_eq!(r, vec![0.15, 0.0]);

        assert_eq!(ramp(0.0, 0.0, 0.1).unwrap(), vec![0.0]);
        assert_eq!(ramp(2.4e-9, 0.0, 1e-10).unwrap().len(), 24);
    }

    #[test]
    fn padding_is_symmetric() {
        assert_eq!(padded_range(-5.0, 5.0), (-5.25, 5.25));
        let (lo, hi) = padded_range(0.0, 2.0);
        assert_eq!((lo, hi), (-0.1, 2.1));
        assert_eq!(round_to(-0.004, 2), 0.0);
        assert!(round_to(-0.004, 2).is_sign_positive());
    }
}

//! PNG rendering of a trace with plotters.

use std::error::Error as StdError;
use std::io::{self, Error, ErrorKind};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use plotters::prelude::*;

use crate::sweep::{self, Segment};
use crate::trace::Trace;

pub const IMAGE_SIZE:(u32, u32) = (1200, 800);

const MARKER_SIZE:i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XRange {
    Fixed(f64, f64),
    // Scrolling time axis: [0, width] until the data runs past it, then the most recent `width`
    Window(f64),
}

impl XRange {

    pub fn resolve(&self, trace:&Trace) -> (f64, f64) {
        match *self {
            XRange::Fixed(lo, hi) => widen(lo, hi),
            XRange::Window(width) => {
                let latest = trace.last().map_or(0.0, |(x, _)| x);
                if latest <= width { (0.0, width) } else { (latest - width, latest) }
            },
        }
    }

}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotStyle {
    pub title: String,
    pub x_range: XRange,
    pub forward_label: String,
    pub backward_label: String,
    // Symbols for a "x=.., y=.." read-out of the sample nearest the right edge
    pub readout: Option<(String, String)>,
}

impl PlotStyle {

    /// Sweep plot with the x-axis fixed to the padded source range.
    pub fn sweep(title:&str, lower:f64, upper:f64) -> Self {
        let (lo, hi) = sweep::padded_range(lower, upper);
        Self{
            title: title.to_owned(),
            x_range: XRange::Fixed(lo, hi),
            forward_label: Segment::Forward.label().to_owned(),
            backward_label: Segment::Backward.label().to_owned(),
            readout: None,
        }
    }

    /// Time trace with one series.
    pub fn window(title:&str, width_s:f64, label:&str) -> Self {
        Self{
            title: title.to_owned(),
            x_range: XRange::Window(width_s),
            forward_label: label.to_owned(),
            backward_label: Segment::Backward.label().to_owned(),
            readout: None,
        }
    }

    pub fn with_readout(mut self, x_symbol:&str, y_symbol:&str) -> Self {
        self.readout = Some((x_symbol.to_owned(), y_symbol.to_owned()));
        self
    }

}

// plotters refuses a zero-width range
fn widen(lo:f64, hi:f64) -> (f64, f64) {
    if hi > lo {
        return (lo, hi);
    }
    let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.05 };
    (lo - pad, hi + pad)
}

fn y_range<I: IntoIterator<Item = f64>>(values:I) -> (f64, f64) {
    match sweep::bounds(values) {
        Some((lo, hi)) if hi > lo => {
            let pad = 0.05 * (hi - lo);
            (lo - pad, hi + pad)
        },
        Some((lo, hi)) => widen(lo, hi),
        None => (-1.0, 1.0),
    }
}

// With `text` off only the axes and markers are drawn, which needs no fonts
fn draw(path:&Path, trace:&Trace, style:&PlotStyle, text:bool) -> Result<(), Box<dyn StdError>> {
    let (x_lo, x_hi) = style.x_range.resolve(trace);
    let visible = |x:f64| x >= x_lo && x <= x_hi;
    let (y_lo, y_hi) = y_range(trace.rows().filter(|(x, _)| visible(*x)).map(|(_, y)| y));

    let y_format = |y:&f64| format!("{:.2e}", y);
    let root = BitMapBackend::new(path, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15).x_label_area_size(50).y_label_area_size(90);
    if text {
        builder.caption(&style.title, ("sans-serif", 28));
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    let mut mesh = chart.configure_mesh();
    mesh.axis_style(&BLACK);
    if text {
        mesh.x_desc(trace.x_label.as_str())
            .y_desc(trace.y_label.as_str())
            .y_label_formatter(&y_format);
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let series = [
        (Segment::Forward, &style.forward_label, RED),
        (Segment::Backward, &style.backward_label, BLUE),
    ];

    for (segment, label, color) in series.iter() {
        if !trace.has_segment(*segment) {
            continue;
        }
        let color = *color;
        let points:Vec<(f64, f64)> = trace.points(*segment).filter(|(x, _)| visible(*x)).collect();
        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, MARKER_SIZE, color.filled())))?
            .label(label.as_str())
            .legend(move |(x, y)| Circle::new((x + 10, y), MARKER_SIZE, color.filled()));
    }

    if !text {
        root.present()?;
        return Ok(());
    }

    let nearest = trace.nearest(x_hi).filter(|(x, _)| visible(*x));
    if let (Some((x_sym, y_sym)), Some((x, y))) = (style.readout.as_ref(), nearest) {
        let text = format!("{}={:.2}, {}={:.2e}", x_sym, x, y_sym, y);
        chart.draw_series(std::iter::once(Text::new(text, (x, y), ("sans-serif", 18).into_font())))?;
    }

    if !trace.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

pub fn render<P: AsRef<Path>>(path:P, trace:&Trace, style:&PlotStyle) -> io::Result<()> {
    let path = path.as_ref();
    if let Err(e) = draw(path, trace, style, true) {
        warn!("Plot text unavailable ({}), drawing {} without labels", e, path.display());
        draw(path, trace, style, false)
            .map_err(|e| Error::new(ErrorKind::Other, format!("Unable to render {}: {}", path.display(), e)))?;
    }
    debug!("Rendered {} points to {}", trace.len(), path.display());
    Ok(())
}

/// Preview image re-rendered every `every` samples, standing in for an interactive window.  Point an image
/// viewer that reloads on change at `path()`.
pub struct LivePlot {
    path: PathBuf,
    style: PlotStyle,
    every: usize,
    pending: usize,
    failed: bool,
}

impl LivePlot {

    // `every` of zero turns the preview off
    pub fn new<P: AsRef<Path>>(path:P, style:PlotStyle, every:usize) -> Self {
        Self{ path: path.as_ref().to_path_buf(), style, every, pending: 0, failed: false }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn style(&self) -> &PlotStyle { &self.style }

    pub fn enabled(&self) -> bool { self.every > 0 && !self.failed }

    /// Call once per new sample.  Returns whether the preview was re-rendered.  A rendering failure is
    /// logged once and disables the preview for the rest of the run.
    pub fn update(&mut self, trace:&Trace) -> bool {
        if !self.enabled() {
            return false;
        }

        self.pending += 1;
        if self.pending < self.every {
            return false;
        }
        self.pending = 0;

        match render(&self.path, trace, &self.style) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; live preview disabled", e);
                self.failed = true;
                false
            },
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_trace(until:f64) -> Trace {
        let mut trace = Trace::new("Time (s)", "Current (A)");
        let mut t = 0.0;
        while t <= until {
            trace.push(t, 1e-9 * t, Segment::Forward);
            t += 1.0;
        }
        trace
    }

    #[test]
    fn window_scrolls_once_full() {
        let range = XRange::Window(30.0);
        assert_eq!(range.resolve(&Trace::new("t", "i")), (0.0, 30.0));
        assert_eq!(range.resolve(&time_trace(20.0)), (0.0, 30.0));
        assert_eq!(range.resolve(&time_trace(45.0)), (15.0, 45.0));
    }

    #[test]
    fn sweep_style_pads_the_source_range() {
        let style = PlotStyle::sweep("I-V Measurement", -5.0, 5.0);
        assert_eq!(style.x_range, XRange::Fixed(-5.25, 5.25));
        assert_eq!(style.forward_label, "Forward");
        assert_eq!(style.readout, None);
        let style = style.with_readout("V", "I");
        assert_eq!(style.readout, Some(("V".to_owned(), "I".to_owned())));
    }

    #[test]
    fn degenerate_ranges_are_widened() {
        assert_eq!(widen(0.0, 0.0), (-1.0, 1.0));
        assert_eq!(widen(2.0, 2.0), (1.9, 2.1));
        assert_eq!(y_range(vec![]), (-1.0, 1.0));
        assert_eq!(y_range(vec![0.0, 10.0]), (-0.5, 10.5));
    }

    #[test]
    fn live_plot_renders_every_nth_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = LivePlot::new(dir.path().join("live.png"), PlotStyle::window("I-t Measurement", 30.0, "Current"), 3);
        assert!(!live.update(&time_trace(0.0)));
        assert!(!live.update(&time_trace(1.0)));
        assert!(!live.path().exists());
        assert!(live.update(&time_trace(2.0)));
        assert!(live.path().exists());
        assert!(!live.update(&time_trace(3.0)));
    }

    #[test]
    fn render_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.png");
        let mut trace = Trace::new("Voltage (V)", "Current (A)");
        trace.push(-1.0, -1e-6, Segment::Forward);
        trace.push(1.0, 1e-6, Segment::Backward);
        render(&path, &trace, &PlotStyle::sweep("I-V Measurement", -1.0, 1.0)).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn live_plot_disabled_by_zero_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut live = LivePlot::new(dir.path().join("live.png"), PlotStyle::window("I-t Measurement", 30.0, "Current"), 0);
        assert!(!live.enabled());
        assert!(!live.update(&time_trace(3.0)));
        assert!(!live.path().exists());
    }
}

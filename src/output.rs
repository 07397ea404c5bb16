//! Data files.  Text output is the layout numpy's `savetxt` produces with a two-line header, so existing
//! analysis notebooks keep loading it.

use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Error, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;

use crate::sweep::Segment;
use crate::trace::Trace;
use crate::utils::format_sci;

pub const TIMESTAMP_FORMAT:&str = "%Y%m%d-%H%M%S";

pub fn base_name(prefix:&str, timestamp:&DateTime<Local>, suffix:Option<&str>) -> String {
    let ts = timestamp.format(TIMESTAMP_FORMAT);
    match suffix.map(str::trim).filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{}_{}_{}", prefix, ts, suffix),
        None => format!("{}_{}", prefix, ts),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub txt: PathBuf,
    pub png: PathBuf,
    pub preview: PathBuf,
}

impl OutputPaths {

    // Creates `dir` if it doesn't exist yet
    pub fn new<P: AsRef<Path>>(dir:P, base:&str) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self{
            txt: dir.join(format!("{}.txt", base)),
            png: dir.join(format!("{}.png", base)),
            preview: dir.join(format!("{}_live.png", base)),
        })
    }

}

pub fn write_tsv<P: AsRef<Path>>(path:P, trace:&Trace, comment:&str) -> io::Result<()> {
    let path = path.as_ref();
    let mut out = BufWriter::new(fs::File::create(path)?);

    // A newline inside the comment would start an unmarked line
    writeln!(out, "# {}", comment.replace(|c| c == '\r' || c == '\n', " "))?;
    writeln!(out, "# {}\t{}", trace.x_label, trace.y_label)?;
    for (x, y) in trace.rows() {
        writeln!(out, "{}\t{}", format_sci(x, 18, 'e'), format_sci(y, 18, 'e'))?;
    }
    out.flush()?;

    info!("Saved {} points to {}", trace.len(), path.display());
    Ok(())
}

/// Reads a file written by [`write_tsv`].  The column labels come from the second header line when there is
/// one.  Segments aren't stored in the file, so every sample comes back as `Forward`.
pub fn read_tsv<P: AsRef<Path>>(path:P) -> io::Result<Trace> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut headers:Vec<String> = vec![];
    let mut rows:Vec<(f64, f64)> = vec![];

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            headers.push(header.trim_start().to_owned());
            continue;
        }

        let mut fields = line.split_whitespace().map(|f| f.parse::<f64>());
        match (fields.next(), fields.next()) {
            (Some(Ok(x)), Some(Ok(y))) => rows.push((x, y)),
            _ => return Err(Error::new(ErrorKind::InvalidData, format!("Line {}: expected two numeric columns, got {:?}", idx+1, line))),
        }
    }

    let mut trace = match headers.get(1).and_then(|h| h.split_once('\t')) {
        Some((x_label, y_label)) => Trace::new(x_label, y_label),
        None => Trace::new("x", "y"),
    };
    for (x, y) in rows {
        trace.push(x, y, Segment::Forward);
    }
    Ok(trace)
}

//! State tables and run summaries.

use std::fmt::Write as _;
use std::io::{self, Write};

use parking_lot::Mutex;
use tracing::warn;

use bankers_core::Snapshot;
use bankers_simulator::{RunReport, StateObserver};

const HEADINGS: [&str; 4] = ["alloc", "max", "need", "avail"];

/// Renders `alloc | max | need | avail` with one `P<i>` row per consumer.
/// Available is shown on the first row only.
pub fn render_state(snapshot: &Snapshot) -> String {
    let cols = snapshot.resources();
    let rows = snapshot.consumers();

    let widest_value = [&snapshot.allocation, &snapshot.maximum, &snapshot.need]
        .into_iter()
        .flat_map(|m| m.iter_rows().flatten())
        .chain(&snapshot.available)
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(1);
    let cell = widest_value.max(format!("R{}", cols.saturating_sub(1)).len());
    let block = cols * cell + cols.saturating_sub(1);
    let label = format!("P{}", rows.saturating_sub(1)).len().max(2) + 2;

    let mut out = String::new();
    let _ = write!(out, "{:label$}", "");
    for heading in HEADINGS {
        let _ = write!(out, "{heading:<block$}  ");
    }
    push_line(&mut out);

    let _ = write!(out, "{:label$}", "");
    for _ in HEADINGS {
        let _ = write!(out, "{}  ", "-".repeat(block));
    }
    push_line(&mut out);

    let _ = write!(out, "{:label$}", "");
    let header: Vec<String> = (0..cols).map(|j| format!("{:<cell$}", format!("R{j}"))).collect();
    for _ in HEADINGS {
        let _ = write!(out, "{}  ", header.join(" "));
    }
    push_line(&mut out);

    for i in 0..rows {
        let _ = write!(out, "{:<label$}", format!("P{i}"));
        for matrix in [&snapshot.allocation, &snapshot.maximum, &snapshot.need] {
            let _ = write!(out, "{}  ", cells(matrix.row(i), cell));
        }
        if i == 0 {
            out.push_str(&cells(&snapshot.available, cell));
        }
        push_line(&mut out);
    }
    out
}

/// Per-consumer counters, totals and, for lockstep runs, the transcript.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10}{:>8}{:>14}{:>10}{:>10}",
        "consumer", "grants", "unavailable", "unsafe", "releases"
    );
    for c in &report.consumers {
        let _ = writeln!(
            out,
            "{:<10}{:>8}{:>14}{:>10}{:>10}",
            format!("P{}", c.consumer),
            c.grants,
            c.denied_unavailable,
            c.denied_unsafe,
            c.releases
        );
    }
    let (unavailable, unsafe_) = report
        .consumers
        .iter()
        .fold((0, 0), |(u, s), c| (u + c.denied_unavailable, s + c.denied_unsafe));
    let _ = writeln!(
        out,
        "{:<10}{:>8}{:>14}{:>10}{:>10}",
        "total",
        report.grants(),
        unavailable,
        unsafe_,
        report.releases()
    );

    let _ = writeln!(out, "seed: {}", report.seed);
    if let Some(steps) = report.steps {
        let _ = writeln!(out, "steps: {steps}");
    }
    if let Some(transcript) = &report.transcript {
        let _ = writeln!(out, "transcript: {transcript}");
    }
    out
}

fn cells(values: &[u32], width: usize) -> String {
    values
        .iter()
        .map(|v| format!("{v:<width$}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_line(out: &mut String) {
    let trimmed = out.trim_end_matches(' ').len();
    out.truncate(trimmed);
    out.push('\n');
}

/// Serialises everything the CLI prints, so tables written from consumer
/// threads never interleave.
pub struct TablePrinter<W> {
    out: Mutex<W>,
    trace_state: bool,
}

impl<W: Write> TablePrinter<W> {
    /// With `trace_state`, a table is printed after every release.
    pub fn new(out: W, trace_state: bool) -> Self {
        Self {
            out: Mutex::new(out),
            trace_state,
        }
    }

    pub fn emit(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> StateObserver for TablePrinter<W> {
    fn on_release(&self, consumer: usize, released: &[u32], snapshot: &Snapshot) {
        if !self.trace_state {
            return;
        }
        let released: Vec<String> = released.iter().map(u32::to_string).collect();
        let text = format!(
            "\n[P{consumer}] release completed: {}\n{}",
            released.join(" "),
            render_state(snapshot)
        );
        if let Err(e) = self.emit(&text) {
            warn!("Failed to print state: {e}");
        }
    }
}

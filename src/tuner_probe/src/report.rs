use std::io::Write;
use std::path::Path;

use comfy_table::{Cell, Table};

use crate::binding::TunerBinding;
use crate::config::ErrorPolicy;
use crate::error::{Error, Result};
use crate::plugin::TunerPlugin;
use crate::search::find_breakpoints;
use crate::{ClusterShape, CollectiveFunction, Decision};

const HEADER: [&str; 6] = [
    "collective",
    "message_size",
    "decision",
    "channels",
    "ranks",
    "nodes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRow {
    pub collective: CollectiveFunction,
    pub message_size: usize,
    pub decision: Decision,
    pub channels: i32,
    pub ranks: usize,
    pub nodes: usize,
}

impl ReportRow {
    fn fields(&self) -> [String; 6] {
        [
            self.collective.to_string(),
            self.message_size.to_string(),
            self.decision.to_string(),
            self.channels.to_string(),
            self.ranks.to_string(),
            self.nodes.to_string(),
        ]
    }
}

/// Parameters of one shape's analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub collectives: Vec<CollectiveFunction>,
    pub min_size: usize,
    pub max_size: usize,
    pub num_pipe_ops: i32,
    pub on_error: ErrorPolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            collectives: CollectiveFunction::ALL.to_vec(),
            min_size: 32,
            max_size: 32 * 1024 * 1024 * 1024,
            num_pipe_ops: 1,
            on_error: ErrorPolicy::Abort,
        }
    }
}

/// Decision boundaries of one cluster shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    shape: ClusterShape,
    rows: Vec<ReportRow>,
    skipped: Vec<CollectiveFunction>,
}

impl Report {
    pub fn new(shape: ClusterShape) -> Self {
        Report {
            shape,
            rows: Vec::new(),
            skipped: Vec::new(),
        }
    }

    #[inline]
    pub fn shape(&self) -> ClusterShape {
        self.shape
    }

    #[inline]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Collectives whose search failed under [`ErrorPolicy::Skip`].
    #[inline]
    pub fn skipped(&self) -> &[CollectiveFunction] {
        &self.skipped
    }

    pub fn rows_for(&self, collective: CollectiveFunction) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(move |r| r.collective == collective)
    }

    /// Adjacent rows of `collective` whose decisions differ.
    pub fn transitions(&self, collective: CollectiveFunction) -> Vec<(ReportRow, ReportRow)> {
        let rows: Vec<_> = self.rows_for(collective).copied().collect();
        rows.windows(2)
            .filter(|w| w[0].decision != w[1].decision)
            .map(|w| (w[0], w[1]))
            .collect()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(HEADER.to_vec());
        for row in &self.rows {
            table.add_row(row.fields().iter().map(Cell::new).collect::<Vec<_>>());
        }
        table
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.shape)?;
        write!(f, "{}", self.to_table())?;
        if !self.skipped.is_empty() {
            write!(f, "\nskipped: {:?}", self.skipped)?;
        }
        Ok(())
    }
}

/// Runs the boundary search for one collective and turns the breakpoints
/// into report rows.
pub fn analyze_message_range<P: TunerPlugin>(
    binding: &mut TunerBinding<P>,
    collective: CollectiveFunction,
    min_size: usize,
    max_size: usize,
    num_pipe_ops: i32,
) -> Result<Vec<ReportRow>> {
    let shape = binding.shape();
    let breakpoints = find_breakpoints(min_size, max_size, |size| {
        binding.query_decision_with(collective, size, num_pipe_ops)
    })?;
    log::debug!(
        "{} on {}: {} breakpoints, {} queries cached",
        collective,
        shape,
        breakpoints.len(),
        binding.cached_queries()
    );

    Ok(breakpoints
        .into_iter()
        .map(|b| ReportRow {
            collective,
            message_size: b.message_size,
            decision: b.result.decision,
            channels: b.result.channels,
            ranks: shape.total_ranks(),
            nodes: shape.node_count(),
        })
        .collect())
}

/// Analyzes every configured collective on one binding.
pub fn analyze_shape<P: TunerPlugin>(
    binding: &mut TunerBinding<P>,
    options: &AnalysisOptions,
) -> Result<Report> {
    let mut report = Report::new(binding.shape());
    for &collective in &options.collectives {
        match analyze_message_range(
            binding,
            collective,
            options.min_size,
            options.max_size,
            options.num_pipe_ops,
        ) {
            Ok(rows) => report.rows.extend(rows),
            Err(e @ Error::PluginQuery { .. }) if options.on_error == ErrorPolicy::Skip => {
                log::warn!("skipping {} on {}: {}", collective, report.shape, e);
                report.skipped.push(collective);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

/// Appends report rows to a CSV file, writing the header once.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<std::fs::File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("writing report rows to {:?}", path.as_ref());
        Self::from_writer(std::fs::File::create(path)?)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(&HEADER)?;
        Ok(CsvSink { writer })
    }

    pub fn write_report(&mut self, report: &Report) -> Result<()> {
        for row in report.rows() {
            self.writer.write_record(&row.fields())?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

//! Plain-text sink: aligned columns, one block per table.

use std::io::Write;

use experiment_core::{Error, Result};

use crate::sink::{Cell, Figure, ReportSink, Table};

/// Formats a cell for display.
pub fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => s.clone(),
        Cell::Integer(i) => i.to_string(),
        Cell::Float(f) if *f != 0.0 && f.abs() < 1e-4 => format!("{:.3e}", f),
        Cell::Float(f) => format!("{:.4}", f),
        Cell::Bool(b) => b.to_string(),
        Cell::Null => "null".to_string(),
    }
}

/// Writes the report as aligned plain text.
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_table(&mut self, table: &Table) -> std::io::Result<()> {
        let rendered: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(format_cell).collect())
            .collect();

        let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
        for row in &rendered {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        writeln!(self.out, "{}", table.title)?;
        let header: Vec<String> = table
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect();
        writeln!(self.out, "  {}", header.join("  ").trim_end())?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(self.out, "  {}", rule.join("  "))?;

        for (row, cells) in table.rows.iter().zip(&rendered) {
            let line: Vec<String> = row
                .iter()
                .zip(cells)
                .zip(&widths)
                .map(|((cell, text), w)| match cell {
                    Cell::Integer(_) | Cell::Float(_) => format!("{:>w$}", text, w = *w),
                    _ => format!("{:<w$}", text, w = *w),
                })
                .collect();
            writeln!(self.out, "  {}", line.join("  ").trim_end())?;
        }
        if table.rows.is_empty() {
            writeln!(self.out, "  (no rows)")?;
        }
        writeln!(self.out)
    }
}

fn write_error(e: std::io::Error) -> Error {
    Error::output(format!("writing text report: {}", e))
}

impl<W: Write> ReportSink for TextSink<W> {
    fn begin_section(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "== {} ==\n", title).map_err(write_error)
    }

    fn table(&mut self, table: &Table) -> Result<()> {
        self.write_table(table).map_err(write_error)
    }

    fn figure(&mut self, figure: &Figure) -> Result<()> {
        let group = figure
            .group
            .as_deref()
            .map(|g| format!(", by {}", g))
            .unwrap_or_default();
        writeln!(
            self.out,
            "[{} figure] {} ({} vs {}{}, {} points)\n",
            figure.kind.as_str(),
            figure.title,
            figure.y,
            figure.x,
            group,
            figure.data.rows.len()
        )
        .map_err(write_error)
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(write_error)
    }
}

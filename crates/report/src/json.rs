//! JSON sink: accumulates the report and writes one document on finish.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use experiment_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sink::{Figure, ReportSink, Table};

/// One report section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub tables: Vec<Table>,
    pub figures: Vec<Figure>,
}

/// The whole report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub sections: Vec<Section>,
}

/// Collects the report as a [`ReportDocument`] and writes it to `path`.
pub struct JsonSink {
    path: PathBuf,
    document: ReportDocument,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: ReportDocument::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &ReportDocument {
        &self.document
    }

    fn current(&mut self) -> Result<&mut Section> {
        self.document
            .sections
            .last_mut()
            .ok_or_else(|| Error::internal("report content before the first section"))
    }
}

impl ReportSink for JsonSink {
    fn begin_section(&mut self, title: &str) -> Result<()> {
        self.document.sections.push(Section {
            title: title.to_string(),
            ..Section::default()
        });
        Ok(())
    }

    fn table(&mut self, table: &Table) -> Result<()> {
        self.current()?.tables.push(table.clone());
        Ok(())
    }

    fn figure(&mut self, figure: &Figure) -> Result<()> {
        self.current()?.figures.push(figure.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::output(format!("{}: {}", parent.display(), e)))?;
        }
        let file = File::create(&self.path)
            .map_err(|e| Error::output(format!("{}: {}", self.path.display(), e)))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.document)
            .map_err(|e| Error::output(format!("{}: {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), sections = self.document.sections.len(), "Wrote JSON report");
        Ok(())
    }
}

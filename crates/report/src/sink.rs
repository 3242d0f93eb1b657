//! Report sink abstraction: sections of tables and figure descriptions.

use experiment_core::Result;
use serde::{Deserialize, Serialize};

/// One table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::Float(value as f64), Self::Integer)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Null
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A titled table with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; it must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width in table {}", self.title);
        self.rows.push(row);
    }

    pub fn with_row(mut self, row: Vec<Cell>) -> Self {
        self.push_row(row);
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Chart type a figure describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureKind {
    Bar,
    GroupedBar,
    Histogram,
    Pie,
}

impl FigureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::GroupedBar => "grouped bar",
            Self::Histogram => "histogram",
            Self::Pie => "pie",
        }
    }
}

/// Description of a chart: which columns of `data` go where. Nothing is
/// drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub kind: FigureKind,
    /// Column for categories or bin starts
    pub x: String,
    /// Column for values
    pub y: String,
    /// Column splitting series, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub data: Table,
}

impl Figure {
    pub fn new(kind: FigureKind, x: impl Into<String>, y: impl Into<String>, data: Table) -> Self {
        Self {
            title: data.title.clone(),
            kind,
            x: x.into(),
            y: y.into(),
            group: None,
            data,
        }
    }

    pub fn grouped_by(mut self, column: impl Into<String>) -> Self {
        self.group = Some(column.into());
        self
    }
}

/// Consumer of a rendered report.
pub trait ReportSink {
    fn begin_section(&mut self, title: &str) -> Result<()>;

    fn table(&mut self, table: &Table) -> Result<()>;

    fn figure(&mut self, figure: &Figure) -> Result<()>;

    /// Called once after the last section.
    fn finish(&mut self) -> Result<()>;
}

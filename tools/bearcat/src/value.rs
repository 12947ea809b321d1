//! Canonical value model.
//!
//! Every recorded value is normalized into one of these containers before it
//! reaches the log, whichever engine produced it. The reference engine uses
//! them directly as its public types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Int64,
    Float64,
    /// Strings and mixed values.
    Object,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Object => "object",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Bool | Self::Int64 | Self::Float64)
    }

    /// Result dtype when values of both dtypes share one container.
    pub fn common(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Object, _) | (_, Self::Object) => Self::Object,
            (Self::Float64, _) | (_, Self::Float64) => Self::Float64,
            _ => Self::Int64,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null | Self::Utf8(_) => DType::Object,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Equality with NaN equal to NaN. Variants never compare equal across
    /// types, so `1` and `1.0` differ.
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self == other,
        }
    }

    /// Total order used for sorting group keys: nulls, bools, numbers, strings.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn rank(value: &Scalar) -> u8 {
            match value {
                Scalar::Null => 0,
                Scalar::Bool(_) => 1,
                Scalar::Int64(_) | Scalar::Float64(_) => 2,
                Scalar::Utf8(_) => 3,
            }
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Int64(a), Self::Float64(b)) => (*a as f64).total_cmp(b),
            (Self::Float64(a), Self::Int64(b)) => a.total_cmp(&(*b as f64)),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            Self::Null | Self::Utf8(_) => None,
        }
    }

    /// Cast into `target`, used when a container widens to a common dtype.
    pub fn widen(self, target: DType) -> Self {
        match (target, self) {
            (DType::Float64, value @ (Self::Int64(_) | Self::Bool(_))) => {
                Self::Float64(value.as_f64().unwrap_or(f64::NAN))
            }
            (DType::Int64, Self::Bool(v)) => Self::Int64(i64::from(v)),
            (_, value) => value,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(v) => f.write_str(if *v { "True" } else { "False" }),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) if v.is_nan() => f.write_str("NaN"),
            Self::Float64(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

/// Ordered labels, used for row indexes and column axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: Option<String>,
    pub labels: Vec<Scalar>,
}

impl Index {
    pub fn range(len: usize) -> Self {
        Self {
            name: None,
            labels: (0..len as i64).map(Scalar::Int64).collect(),
        }
    }

    pub fn from_labels(name: Option<String>, labels: Vec<Scalar>) -> Self {
        Self { name, labels }
    }

    pub fn from_strings<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            name: None,
            labels: labels
                .into_iter()
                .map(|label| Scalar::Utf8(label.to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Empty indexes and indexes of strings or mixed labels are `object`.
    pub fn inferred_dtype(&self) -> DType {
        let mut labels = self.labels.iter();
        let Some(first) = labels.next() else {
            return DType::Object;
        };
        labels.fold(first.dtype(), |acc, label| acc.common(label.dtype()))
    }

    pub fn take(&self, positions: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            labels: positions
                .iter()
                .filter_map(|p| self.labels.get(*p).cloned())
                .collect(),
        }
    }
}

/// One labelled column of a [`DataFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub label: String,
    pub dtype: DType,
    pub values: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: Option<String>,
    pub index: Index,
    pub dtype: DType,
    pub values: Vec<Scalar>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub index: Index,
    pub columns: Vec<Column>,
}

impl DataFrame {
    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_labels(&self) -> Index {
        Index::from_strings(self.columns.iter().map(|c| c.label.as_str()))
    }

    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.label == label)
    }
}

/// Dense n-dimensional array, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub values: Vec<Scalar>,
}

impl Array {
    pub fn from_values(values: Vec<Scalar>) -> Self {
        let dtype = common_dtype(&values);
        let values = values.into_iter().map(|v| v.widen(dtype)).collect::<Vec<_>>();
        Self {
            dtype,
            shape: vec![values.len()],
            values,
        }
    }
}

/// Common dtype of a run of values; empty runs are `object`.
pub fn common_dtype(values: &[Scalar]) -> DType {
    let mut iter = values.iter().filter(|v| !matches!(v, Scalar::Null));
    let Some(first) = iter.next() else {
        return DType::Object;
    };
    iter.fold(first.dtype(), |acc, v| acc.common(v.dtype()))
}

/// Closed set of value categories a recording can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordedValue {
    Frame(DataFrame),
    Series(Series),
    Index(Index),
    Array(Array),
    Scalar(Scalar),
    Sequence(Vec<RecordedValue>),
    /// Returned by calls that produce no value, including failed calls.
    Null,
}

impl RecordedValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "DataFrame",
            Self::Series(_) => "Series",
            Self::Index(_) => "Index",
            Self::Array(_) => "Array",
            Self::Scalar(_) => "Scalar",
            Self::Sequence(_) => "Sequence",
            Self::Null => "None",
        }
    }
}

// ── rendering ─────────────────────────────────────────────────────────────────

fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let columns = header.len();
    let mut widths = header.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == 0 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut lines = vec![format_row(header)];
    lines.extend(rows.iter().map(|row| format_row(row)));
    lines.join("\n")
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "Empty DataFrame ({} rows)", self.nrows());
        }
        let mut header = vec![self.index.name.clone().unwrap_or_default()];
        header.extend(self.columns.iter().map(|c| c.label.clone()));
        let rows = self
            .index
            .labels
            .iter()
            .enumerate()
            .map(|(row, label)| {
                let mut cells = vec![label.to_string()];
                cells.extend(self.columns.iter().map(|c| {
                    c.values
                        .get(row)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                }));
                cells
            })
            .collect::<Vec<_>>();
        f.write_str(&render_table(&header, &rows))
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self
            .index
            .labels
            .iter()
            .zip(&self.values)
            .map(|(label, value)| vec![label.to_string(), value.to_string()])
            .collect::<Vec<_>>();
        let header = vec![self.index.name.clone().unwrap_or_default(), String::new()];
        let table = render_table(&header, &rows);
        let body = table.lines().skip(1).collect::<Vec<_>>().join("\n");
        if !body.is_empty() {
            writeln!(f, "{body}")?;
        }
        match &self.name {
            Some(name) => write!(f, "Name: {name}, dtype: {}", self.dtype),
            None => write!(f, "dtype: {}", self.dtype),
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self
            .labels
            .iter()
            .map(|l| match l {
                Scalar::Utf8(s) => format!("'{s}'"),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Index([{labels}], dtype='{}'", self.inferred_dtype())?;
        if let Some(name) = &self.name {
            write!(f, ", name='{name}'")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &[Scalar]| {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self.shape.as_slice() {
            [_, cols] if *cols > 0 => {
                let rows = self
                    .values
                    .chunks(*cols)
                    .map(|row| format!("[{}]", join(row)))
                    .collect::<Vec<_>>()
                    .join("\n ");
                write!(f, "[{rows}]")
            }
            _ => write!(f, "[{}]", join(&self.values)),
        }
    }
}

impl fmt::Display for RecordedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(v) => v.fmt(f),
            Self::Series(v) => v.fmt(f),
            Self::Index(v) => v.fmt(f),
            Self::Array(v) => v.fmt(f),
            Self::Scalar(v) => v.fmt(f),
            Self::Sequence(items) => {
                let inner = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({inner})")
            }
            Self::Null => f.write_str("None"),
        }
    }
}

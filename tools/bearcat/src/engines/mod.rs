//! Dataframe engines that can be wrapped by the recorder.
//!
//! Both engines expose the same operations through [`FrameEngine`],
//! [`FrameOps`] and [`SeriesOps`]; every public operation is an instrumented
//! entry point, so a recorder sees each call made from user code.

pub mod shard;
pub mod tabula;

use crate::capture::Capture;
use crate::errors::BearcatError;
use crate::types::EngineKind;
use crate::value::{Array, DType, Scalar};
use std::fmt;
use std::path::{Path, PathBuf};

/// Column data handed to [`FrameEngine::from_columns`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnInput {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
}

impl ColumnInput {
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Bool(_) => DType::Bool,
            Self::Text(_) => DType::Object,
        }
    }

    pub fn into_scalars(self) -> Vec<Scalar> {
        match self {
            Self::Int64(v) => v.into_iter().map(Scalar::Int64).collect(),
            Self::Float64(v) => v.into_iter().map(Scalar::Float64).collect(),
            Self::Bool(v) => v.into_iter().map(Scalar::Bool).collect(),
            Self::Text(v) => v.into_iter().map(Scalar::Utf8).collect(),
        }
    }
}

pub trait FrameEngine {
    type Frame: FrameOps<Series = Self::Series>;
    type Series: SeriesOps;

    fn kind(&self) -> EngineKind;

    /// Build a frame with a default range index. Columns must share a length
    /// and have distinct labels.
    fn from_columns(&self, columns: Vec<(String, ColumnInput)>)
        -> Result<Self::Frame, BearcatError>;
}

pub trait FrameOps: Capture + fmt::Display + Sized {
    type Series: SeriesOps;

    /// Column-wise sum over every column. Strings concatenate, booleans count.
    fn sum(&self) -> Result<Self::Series, BearcatError>;

    /// Column-wise sum over the numeric columns only.
    fn sum_numeric(&self) -> Result<Self::Series, BearcatError>;

    /// Non-missing counts per group of `by`, keyed by the sorted distinct
    /// values of `by`. Rows whose key is missing are dropped.
    fn groupby_count(&self, by: &str) -> Result<Self, BearcatError>;

    fn select(&self, labels: &[&str]) -> Result<Self, BearcatError>;

    fn head(&self, n: usize) -> Result<Self, BearcatError>;

    fn column(&self, label: &str) -> Result<Self::Series, BearcatError>;

    /// Attribute-style column lookup (`frame.b`).
    fn getattr(&self, name: &str) -> Result<Self::Series, BearcatError>;

    /// `(rows, columns)`, computed by the engine's native kernel.
    fn shape(&self) -> Result<(usize, usize), BearcatError>;

    fn to_array(&self) -> Result<Array, BearcatError>;
}

pub trait SeriesOps: Capture + fmt::Display + Sized {
    fn sum(&self) -> Result<Scalar, BearcatError>;

    fn to_array(&self) -> Result<Array, BearcatError>;
}

/// A resolved engine package and the directory its sources live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub kind: EngineKind,
    pub install_dir: PathBuf,
}

impl Package {
    pub fn name(&self) -> &'static str {
        self.kind.package_name()
    }
}

pub fn resolve_package(name: &str) -> Result<Package, BearcatError> {
    let kind = EngineKind::parse_package(name).ok_or_else(|| {
        BearcatError::InvalidConfig(format!(
            "unknown package {name:?}; expected one of {}",
            EngineKind::known_packages().join(", ")
        ))
    })?;
    package_for(kind)
}

pub fn package_for(kind: EngineKind) -> Result<Package, BearcatError> {
    let anchor = match kind {
        EngineKind::Tabula => tabula::SOURCE_ANCHOR,
        EngineKind::Shard => shard::SOURCE_ANCHOR,
    };
    let install_dir = Path::new(anchor)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| {
            BearcatError::Init(format!(
                "package {} has no source location",
                kind.package_name()
            ))
        })?;
    Ok(Package {
        kind,
        install_dir: install_dir.to_path_buf(),
    })
}

pub(crate) fn check_columns(columns: &[(String, ColumnInput)]) -> Result<usize, BearcatError> {
    let nrows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
    for (position, (label, column)) in columns.iter().enumerate() {
        if column.len() != nrows {
            return Err(BearcatError::Engine(format!(
                "column {label:?} has {} values, expected {nrows}",
                column.len()
            )));
        }
        if columns[..position].iter().any(|(other, _)| other == label) {
            return Err(BearcatError::Engine(format!("duplicate column label {label:?}")));
        }
    }
    Ok(nrows)
}

use super::{check_columns, ColumnInput, FrameEngine, FrameOps, SeriesOps};
use crate::call_frame;
use crate::capture::{Capture, Captured};
use crate::errors::BearcatError;
use crate::trace::{traced, traced_native};
use crate::types::EngineKind;
use crate::value::{common_dtype, Array, Column, DType, DataFrame, Index, RecordedValue, Scalar, Series};
use std::cmp::Ordering;
use std::fmt;

/// Any file under this module's directory belongs to the package.
pub const SOURCE_ANCHOR: &str = file!();

#[derive(Debug, Clone, PartialEq)]
pub enum ShardColumn {
    Int64(Vec<i64>),
    /// NaN marks a missing value.
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
    /// Anything that does not fit a typed vector.
    Mixed(Vec<Scalar>),
}

impl ShardColumn {
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Mixed(v) => v.len(),
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
            Self::Text(_) | Self::Mixed(_) => DType::Object,
        }
    }

    pub fn get(&self, row: usize) -> Option<Scalar> {
        match self {
            Self::Int64(v) => v.get(row).copied().map(Scalar::Int64),
            Self::Float64(v) => v.get(row).copied().map(Scalar::Float64),
            Self::Bool(v) => v.get(row).copied().map(Scalar::Bool),
            Self::Text(v) => v.get(row).cloned().map(Scalar::Utf8),
            Self::Mixed(v) => v.get(row).cloned(),
        }
    }

    pub fn is_missing_at(&self, row: usize) -> bool {
        match self {
            Self::Float64(v) => v.get(row).is_some_and(|x| x.is_nan()),
            Self::Mixed(v) => v.get(row).is_some_and(Scalar::is_missing),
            _ => false,
        }
    }

    pub fn to_scalars(&self) -> Vec<Scalar> {
        (0..self.len()).filter_map(|row| self.get(row)).collect()
    }

    pub fn take(&self, rows: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().filter_map(|row| values.get(*row).cloned()).collect()
        }
        match self {
            Self::Int64(v) => Self::Int64(pick(v, rows)),
            Self::Float64(v) => Self::Float64(pick(v, rows)),
            Self::Bool(v) => Self::Bool(pick(v, rows)),
            Self::Text(v) => Self::Text(pick(v, rows)),
            Self::Mixed(v) => Self::Mixed(pick(v, rows)),
        }
    }

    /// Pack scalars into the narrowest typed vector that holds them.
    pub fn from_scalars(values: Vec<Scalar>) -> Self {
        let dtype = common_dtype(&values);
        let has_null = values.iter().any(|v| matches!(v, Scalar::Null));
        match dtype {
            DType::Int64 if !has_null => Self::Int64(
                values
                    .iter()
                    .filter_map(|v| match v {
                        Scalar::Int64(x) => Some(*x),
                        Scalar::Bool(b) => Some(i64::from(*b)),
                        _ => None,
                    })
                    .collect(),
            ),
            DType::Float64 => Self::Float64(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(f64::NAN))
                    .collect(),
            ),
            DType::Bool if !has_null => Self::Bool(
                values
                    .iter()
                    .map(|v| matches!(v, Scalar::Bool(true)))
                    .collect(),
            ),
            _ if !values.is_empty() && values.iter().all(|v| matches!(v, Scalar::Utf8(_))) => {
                Self::Text(
                    values
                        .into_iter()
                        .filter_map(|v| match v {
                            Scalar::Utf8(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                )
            }
            _ if values.is_empty() => Self::Text(Vec::new()),
            _ => Self::Mixed(values),
        }
    }
}

impl From<ColumnInput> for ShardColumn {
    fn from(input: ColumnInput) -> Self {
        match input {
            ColumnInput::Int64(v) => Self::Int64(v),
            ColumnInput::Float64(v) => Self::Float64(v),
            ColumnInput::Bool(v) => Self::Bool(v),
            ColumnInput::Text(v) => Self::Text(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShardLabelKind {
    /// `0..n`, never materialized.
    Range(usize),
    Values(ShardColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardLabels {
    pub name: Option<String>,
    pub kind: ShardLabelKind,
}

impl ShardLabels {
    pub fn range(len: usize) -> Self {
        Self {
            name: None,
            kind: ShardLabelKind::Range(len),
        }
    }

    pub fn names(names: &[String]) -> Self {
        Self {
            name: None,
            kind: ShardLabelKind::Values(ShardColumn::Text(names.to_vec())),
        }
    }

    pub fn len(&self) -> usize {
        match &self.kind {
            ShardLabelKind::Range(len) => *len,
            ShardLabelKind::Values(column) => column.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self, rows: &[usize]) -> Self {
        let kind = match &self.kind {
            ShardLabelKind::Range(len) if rows.iter().enumerate().all(|(i, r)| i == *r && *r < *len) => {
                ShardLabelKind::Range(rows.len())
            }
            ShardLabelKind::Range(len) => ShardLabelKind::Values(ShardColumn::Int64(
                rows.iter()
                    .filter(|r| **r < *len)
                    .map(|r| *r as i64)
                    .collect(),
            )),
            ShardLabelKind::Values(column) => ShardLabelKind::Values(column.take(rows)),
        };
        Self {
            name: self.name.clone(),
            kind,
        }
    }

    pub fn to_index(&self) -> Index {
        match &self.kind {
            ShardLabelKind::Range(len) => Index {
                name: self.name.clone(),
                labels: Index::range(*len).labels,
            },
            ShardLabelKind::Values(column) => Index::from_labels(self.name.clone(), column.to_scalars()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardFrame {
    pub names: Vec<String>,
    pub columns: Vec<ShardColumn>,
    pub labels: ShardLabels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardSeries {
    pub name: Option<String>,
    pub labels: ShardLabels,
    pub data: ShardColumn,
}

/// Containers the shard engine hands back to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardValue {
    Frame(ShardFrame),
    Series(ShardSeries),
}

impl ShardValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "ShardFrame",
            Self::Series(_) => "ShardSeries",
        }
    }

    pub fn to_tabula(&self) -> RecordedValue {
        match self {
            Self::Frame(frame) => RecordedValue::Frame(frame.to_tabula()),
            Self::Series(series) => RecordedValue::Series(series.to_tabula()),
        }
    }
}

impl ShardFrame {
    pub fn nrows(&self) -> usize {
        self.labels.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn to_tabula(&self) -> DataFrame {
        DataFrame {
            index: self.labels.to_index(),
            columns: self
                .names
                .iter()
                .zip(&self.columns)
                .map(|(label, column)| Column {
                    label: label.clone(),
                    dtype: column.dtype(),
                    values: column.to_scalars(),
                })
                .collect(),
        }
    }
}

impl ShardSeries {
    pub fn to_tabula(&self) -> Series {
        Series {
            name: self.name.clone(),
            index: self.labels.to_index(),
            dtype: self.data.dtype(),
            values: self.data.to_scalars(),
        }
    }
}

impl Capture for ShardFrame {
    fn capture(&self) -> Captured {
        Captured::Shard(ShardValue::Frame(self.clone()))
    }
}

impl Capture for ShardSeries {
    fn capture(&self) -> Captured {
        Captured::Shard(ShardValue::Series(self.clone()))
    }
}

impl fmt::Display for ShardFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_tabula().fmt(f)
    }
}

impl fmt::Display for ShardSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_tabula().fmt(f)
    }
}

/// Columnar engine exposing the `tabula` API. Results come back as shard
/// containers and are converted to the canonical model when recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShardEngine;

impl FrameEngine for ShardEngine {
    type Frame = ShardFrame;
    type Series = ShardSeries;

    fn kind(&self) -> EngineKind {
        EngineKind::Shard
    }

    fn from_columns(
        &self,
        columns: Vec<(String, ColumnInput)>,
    ) -> Result<ShardFrame, BearcatError> {
        traced(call_frame!("DataFrame"), || {
            let nrows = check_columns(&columns)?;
            let (names, columns) = columns
                .into_iter()
                .map(|(name, input)| (name, ShardColumn::from(input)))
                .unzip();
            Ok(ShardFrame {
                names,
                columns,
                labels: ShardLabels::range(nrows),
            })
        })
    }
}

// ── kernels ───────────────────────────────────────────────────────────────────

fn unsupported(left: DType, right: DType) -> BearcatError {
    BearcatError::Engine(format!(
        "unsupported operand types for +: '{left}' and '{right}'"
    ))
}

fn sum_kernel(column: &ShardColumn) -> Result<Scalar, BearcatError> {
    match column {
        ShardColumn::Int64(v) => Ok(Scalar::Int64(v.iter().fold(0i64, |a, b| a.wrapping_add(*b)))),
        ShardColumn::Float64(v) => Ok(Scalar::Float64(
            v.iter().filter(|x| !x.is_nan()).fold(0.0, |a, b| a + b),
        )),
        ShardColumn::Bool(v) => Ok(Scalar::Int64(v.iter().filter(|b| **b).count() as i64)),
        ShardColumn::Text(v) if v.is_empty() => Ok(Scalar::Int64(0)),
        ShardColumn::Text(v) => Ok(Scalar::Utf8(v.concat())),
        ShardColumn::Mixed(v) => sum_mixed(v),
    }
}

fn sum_mixed(values: &[Scalar]) -> Result<Scalar, BearcatError> {
    let present = values.iter().filter(|v| !v.is_missing()).collect::<Vec<_>>();
    if present.is_empty() {
        return Ok(Scalar::Int64(0));
    }
    if present.iter().all(|v| matches!(v, Scalar::Utf8(_))) {
        let mut out = String::new();
        for value in &present {
            if let Scalar::Utf8(s) = value {
                out.push_str(s);
            }
        }
        return Ok(Scalar::Utf8(out));
    }
    if let Some(text) = present.iter().find(|v| matches!(v, Scalar::Utf8(_))) {
        let other = present
            .iter()
            .find(|v| !matches!(v, Scalar::Utf8(_)))
            .map(|v| v.dtype())
            .unwrap_or(DType::Object);
        return Err(if matches!(present[0], Scalar::Utf8(_)) {
            unsupported(text.dtype(), other)
        } else {
            unsupported(other, text.dtype())
        });
    }
    if present.iter().all(|v| matches!(v, Scalar::Int64(_))) {
        let total = present.iter().fold(0i64, |acc, v| match v {
            Scalar::Int64(x) => acc.wrapping_add(*x),
            _ => acc,
        });
        return Ok(Scalar::Int64(total));
    }
    Ok(Scalar::Float64(
        present
            .iter()
            .filter_map(|v| v.as_f64())
            .fold(0.0, |a, b| a + b),
    ))
}

/// Row positions per distinct non-missing key, in key order.
fn group_rows(keys: &ShardColumn) -> Vec<(Scalar, Vec<usize>)> {
    let mut keyed = (0..keys.len())
        .filter(|row| !keys.is_missing_at(*row))
        .filter_map(|row| keys.get(row).map(|key| (key, row)))
        .collect::<Vec<_>>();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut groups: Vec<(Scalar, Vec<usize>)> = Vec::new();
    for (key, row) in keyed {
        if let Some((last, rows)) = groups.last_mut() {
            if last.total_cmp(&key) == Ordering::Equal {
                rows.push(row);
                continue;
            }
        }
        groups.push((key, vec![row]));
    }
    groups
}

fn key_error(label: &str) -> BearcatError {
    BearcatError::Engine(format!("KeyError: {label:?}"))
}

fn reduction(names: Vec<String>, values: Vec<Scalar>) -> ShardSeries {
    ShardSeries {
        name: None,
        labels: ShardLabels::names(&names),
        data: ShardColumn::from_scalars(values),
    }
}

impl ShardFrame {
    fn series_at(&self, position: usize) -> Result<ShardSeries, BearcatError> {
        traced(call_frame!("series_at"), || {
            let data = self.columns.get(position).ok_or_else(|| {
                BearcatError::Engine(format!(
                    "column position {position} out of bounds for {} columns",
                    self.ncols()
                ))
            })?;
            Ok(ShardSeries {
                name: self.names.get(position).cloned(),
                labels: self.labels.clone(),
                data: data.clone(),
            })
        })
    }
}

impl FrameOps for ShardFrame {
    type Series = ShardSeries;

    fn sum(&self) -> Result<ShardSeries, BearcatError> {
        traced(call_frame!("sum"), || {
            let values = self
                .columns
                .iter()
                .map(sum_kernel)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(reduction(self.names.clone(), values))
        })
    }

    fn sum_numeric(&self) -> Result<ShardSeries, BearcatError> {
        traced(call_frame!("sum_numeric"), || {
            let mut names = Vec::new();
            let mut values = Vec::new();
            for (name, column) in self.names.iter().zip(&self.columns) {
                if column.dtype().is_numeric() {
                    names.push(name.clone());
                    values.push(sum_kernel(column)?);
                }
            }
            Ok(reduction(names, values))
        })
    }

    fn groupby_count(&self, by: &str) -> Result<ShardFrame, BearcatError> {
        traced(call_frame!("groupby_count"), || {
            let key_position = self.position_of(by).ok_or_else(|| key_error(by))?;
            let groups = group_rows(&self.series_at(key_position)?.data);

            let mut names = Vec::with_capacity(self.ncols().saturating_sub(1));
            let mut columns = Vec::with_capacity(self.ncols().saturating_sub(1));
            for (position, (name, column)) in self.names.iter().zip(&self.columns).enumerate() {
                if position == key_position {
                    continue;
                }
                names.push(name.clone());
                columns.push(ShardColumn::Int64(
                    groups
                        .iter()
                        .map(|(_, rows)| rows.iter().filter(|r| !column.is_missing_at(**r)).count() as i64)
                        .collect(),
                ));
            }
            let keys = groups.into_iter().map(|(key, _)| key).collect();
            Ok(ShardFrame {
                names,
                columns,
                labels: ShardLabels {
                    name: Some(by.to_string()),
                    kind: ShardLabelKind::Values(ShardColumn::from_scalars(keys)),
                },
            })
        })
    }

    fn select(&self, labels: &[&str]) -> Result<ShardFrame, BearcatError> {
        traced(call_frame!("select"), || {
            let mut names = Vec::with_capacity(labels.len());
            let mut columns = Vec::with_capacity(labels.len());
            for label in labels {
                let position = self.position_of(label).ok_or_else(|| key_error(label))?;
                names.push(self.names[position].clone());
                columns.push(self.columns[position].clone());
            }
            Ok(ShardFrame {
                names,
                columns,
                labels: self.labels.clone(),
            })
        })
    }

    fn head(&self, n: usize) -> Result<ShardFrame, BearcatError> {
        traced(call_frame!("head"), || {
            let rows = (0..n.min(self.nrows())).collect::<Vec<_>>();
            Ok(ShardFrame {
                names: self.names.clone(),
                columns: self.columns.iter().map(|c| c.take(&rows)).collect(),
                labels: self.labels.take(&rows),
            })
        })
    }

    fn column(&self, label: &str) -> Result<ShardSeries, BearcatError> {
        traced(call_frame!("column"), || {
            let position = self.position_of(label).ok_or_else(|| key_error(label))?;
            self.series_at(position)
        })
    }

    fn getattr(&self, name: &str) -> Result<ShardSeries, BearcatError> {
        traced(call_frame!("getattr"), || {
            if self.position_of(name).is_none() {
                return Err(BearcatError::Engine(format!(
                    "'DataFrame' object has no attribute '{name}'"
                )));
            }
            self.column(name)
        })
    }

    fn shape(&self) -> Result<(usize, usize), BearcatError> {
        traced_native(call_frame!("shape"), || Ok((self.nrows(), self.ncols())))
    }

    fn to_array(&self) -> Result<Array, BearcatError> {
        traced(call_frame!("to_array"), || {
            let dtype = self
                .columns
                .iter()
                .map(ShardColumn::dtype)
                .reduce(DType::common)
                .unwrap_or(DType::Object);
            let mut values = Vec::with_capacity(self.nrows() * self.ncols());
            for row in 0..self.nrows() {
                for column in &self.columns {
                    values.push(column.get(row).unwrap_or(Scalar::Null).widen(dtype));
                }
            }
            Ok(Array {
                dtype,
                shape: vec![self.nrows(), self.ncols()],
                values,
            })
        })
    }
}

impl SeriesOps for ShardSeries {
    fn sum(&self) -> Result<Scalar, BearcatError> {
        traced(call_frame!("sum"), || sum_kernel(&self.data))
    }

    fn to_array(&self) -> Result<Array, BearcatError> {
        traced(call_frame!("to_array"), || {
            Ok(Array {
                dtype: self.data.dtype(),
                shape: vec![self.data.len()],
                values: self.data.to_scalars(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::tabula::TabulaEngine;

    fn columns() -> Vec<(String, ColumnInput)> {
        vec![
            ("a".to_string(), ColumnInput::Int64(vec![1, 2, 3, 1])),
            ("b".to_string(), ColumnInput::Int64(vec![4, 5, 6, 7])),
            (
                "s".to_string(),
                ColumnInput::Text(
                    ["hello", "world", "Bar", "foo"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
            ),
        ]
    }

    #[test]
    fn sum_agrees_with_reference_engine() {
        let shard = ShardEngine.from_columns(columns()).expect("shard frame");
        let tabula = TabulaEngine.from_columns(columns()).expect("tabula frame");
        let ours = FrameOps::sum(&shard).expect("sum").to_tabula();
        let reference = FrameOps::sum(&tabula).expect("sum");
        assert_eq!(ours, reference);
        assert_eq!(ours.dtype, DType::Object);
    }

    #[test]
    fn groupby_count_agrees_with_reference_engine() {
        let shard = ShardEngine.from_columns(columns()).expect("shard frame");
        let tabula = TabulaEngine.from_columns(columns()).expect("tabula frame");
        assert_eq!(
            shard.groupby_count("a").expect("groupby").to_tabula(),
            tabula.groupby_count("a").expect("groupby")
        );
    }

    #[test]
    fn head_keeps_range_labels_and_select_reorders() {
        let frame = ShardEngine.from_columns(columns()).expect("frame");
        let top = frame.head(2).expect("head");
        assert_eq!(top.labels, ShardLabels::range(2));
        assert_eq!(top.to_tabula().index, Index::range(2));
        let picked = frame.select(&["s", "a"]).expect("select");
        assert_eq!(picked.names, vec!["s".to_string(), "a".to_string()]);
        assert_eq!(picked.shape().expect("shape"), (4, 2));
    }

    #[test]
    fn from_scalars_picks_narrowest_column() {
        assert_eq!(
            ShardColumn::from_scalars(vec![Scalar::Int64(1), Scalar::Float64(0.5)]),
            ShardColumn::Float64(vec![1.0, 0.5])
        );
        assert_eq!(
            ShardColumn::from_scalars(vec![Scalar::Utf8("x".into())]),
            ShardColumn::Text(vec!["x".to_string()])
        );
        assert!(matches!(
            ShardColumn::from_scalars(vec![Scalar::Int64(7), Scalar::Utf8("x".into())]),
            ShardColumn::Mixed(_)
        ));
    }

    #[test]
    fn mixed_sums_reject_string_and_number_operands() {
        let err = sum_mixed(&[Scalar::Utf8("x".into()), Scalar::Int64(1)]).expect_err("mixed");
        assert!(err.to_string().contains("'object' and 'int64'"));
        assert_eq!(
            sum_mixed(&[Scalar::Int64(1), Scalar::Null, Scalar::Int64(2)]).expect("sum"),
            Scalar::Int64(3)
        );
    }
}

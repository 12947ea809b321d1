use super::{check_columns, ColumnInput, FrameEngine, FrameOps, SeriesOps};
use crate::call_frame;
use crate::errors::BearcatError;
use crate::trace::{traced, traced_native};
use crate::types::EngineKind;
use crate::value::{common_dtype, Array, Column, DType, DataFrame, Index, Scalar, Series};

/// Any file under this module's directory belongs to the package.
pub const SOURCE_ANCHOR: &str = file!();

#[derive(Debug, Clone, Copy, Default)]
pub struct TabulaEngine;

impl FrameEngine for TabulaEngine {
    type Frame = DataFrame;
    type Series = Series;

    fn kind(&self) -> EngineKind {
        EngineKind::Tabula
    }

    fn from_columns(
        &self,
        columns: Vec<(String, ColumnInput)>,
    ) -> Result<DataFrame, BearcatError> {
        traced(call_frame!("DataFrame"), || {
            let nrows = check_columns(&columns)?;
            let columns = columns
                .into_iter()
                .map(|(label, input)| Column {
                    label,
                    dtype: input.dtype(),
                    values: input.into_scalars(),
                })
                .collect();
            Ok(DataFrame {
                index: Index::range(nrows),
                columns,
            })
        })
    }
}

fn key_error(label: &str) -> BearcatError {
    BearcatError::Engine(format!("KeyError: {label:?}"))
}

fn column_at(frame: &DataFrame, position: usize) -> Result<Series, BearcatError> {
    traced(call_frame!("column_at"), || {
        let column = frame.columns.get(position).ok_or_else(|| {
            BearcatError::Engine(format!(
                "column position {position} out of bounds for {} columns",
                frame.ncols()
            ))
        })?;
        Ok(Series {
            name: Some(column.label.clone()),
            index: frame.index.clone(),
            dtype: column.dtype,
            values: column.values.clone(),
        })
    })
}

fn reduction_series(index: Index, values: Vec<Scalar>) -> Series {
    let dtype = common_dtype(&values);
    Series {
        name: None,
        index,
        dtype,
        values: values.into_iter().map(|v| v.widen(dtype)).collect(),
    }
}

fn reduce_sum(dtype: DType, values: &[Scalar]) -> Result<Scalar, BearcatError> {
    let present = values.iter().filter(|v| !v.is_missing());
    match dtype {
        DType::Bool => Ok(Scalar::Int64(
            present.filter(|v| matches!(v, Scalar::Bool(true))).count() as i64,
        )),
        DType::Int64 => present
            .map(|v| match v {
                Scalar::Int64(x) => Ok(*x),
                Scalar::Bool(b) => Ok(i64::from(*b)),
                other => Err(unsupported_operand(&Scalar::Int64(0), other)),
            })
            .try_fold(0i64, |acc, v| v.map(|v| acc.wrapping_add(v)))
            .map(Scalar::Int64),
        DType::Float64 => Ok(Scalar::Float64(
            present.filter_map(Scalar::as_f64).fold(0.0, |acc, v| acc + v),
        )),
        DType::Object => sum_objects(present),
    }
}

fn unsupported_operand(left: &Scalar, right: &Scalar) -> BearcatError {
    BearcatError::Engine(format!(
        "unsupported operand types for +: '{}' and '{}'",
        left.dtype(),
        right.dtype()
    ))
}

/// Object columns add left to right: strings concatenate, numbers add, and
/// mixing the two is an error.
fn sum_objects<'a>(mut values: impl Iterator<Item = &'a Scalar>) -> Result<Scalar, BearcatError> {
    let Some(first) = values.next() else {
        return Ok(Scalar::Int64(0));
    };
    values.try_fold(first.clone(), |acc, value| match (&acc, value) {
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Ok(Scalar::Utf8(format!("{a}{b}"))),
        (Scalar::Int64(a), Scalar::Int64(b)) => Ok(Scalar::Int64(a.wrapping_add(*b))),
        (Scalar::Utf8(_), _) | (_, Scalar::Utf8(_)) => Err(unsupported_operand(&acc, value)),
        _ => match (acc.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) => Ok(Scalar::Float64(a + b)),
            _ => Err(unsupported_operand(&acc, value)),
        },
    })
}

impl FrameOps for DataFrame {
    type Series = Series;

    fn sum(&self) -> Result<Series, BearcatError> {
        traced(call_frame!("sum"), || {
            let mut values = Vec::with_capacity(self.ncols());
            for position in 0..self.ncols() {
                values.push(SeriesOps::sum(&column_at(self, position)?)?);
            }
            Ok(reduction_series(self.column_labels(), values))
        })
    }

    fn sum_numeric(&self) -> Result<Series, BearcatError> {
        traced(call_frame!("sum_numeric"), || {
            let mut labels = Vec::new();
            let mut values = Vec::new();
            for (position, column) in self.columns.iter().enumerate() {
                if !column.dtype.is_numeric() {
                    continue;
                }
                labels.push(column.label.as_str());
                values.push(SeriesOps::sum(&column_at(self, position)?)?);
            }
            Ok(reduction_series(Index::from_strings(labels), values))
        })
    }

    fn groupby_count(&self, by: &str) -> Result<DataFrame, BearcatError> {
        traced(call_frame!("groupby_count"), || {
            let key_position = self.position_of(by).ok_or_else(|| key_error(by))?;
            let keys = column_at(self, key_position)?;

            let mut groups: Vec<(Scalar, Vec<usize>)> = Vec::new();
            for (row, key) in keys.values.iter().enumerate() {
                if key.is_missing() {
                    continue;
                }
                match groups.iter_mut().find(|(k, _)| k.total_cmp(key).is_eq()) {
                    Some((_, rows)) => rows.push(row),
                    None => groups.push((key.clone(), vec![row])),
                }
            }
            groups.sort_by(|a, b| a.0.total_cmp(&b.0));

            let columns = self
                .columns
                .iter()
                .enumerate()
                .filter(|(position, _)| *position != key_position)
                .map(|(_, column)| Column {
                    label: column.label.clone(),
                    dtype: DType::Int64,
                    values: groups
                        .iter()
                        .map(|(_, rows)| {
                            let present = rows
                                .iter()
                                .filter(|row| column.values.get(**row).is_some_and(|v| !v.is_missing()))
                                .count();
                            Scalar::Int64(present as i64)
                        })
                        .collect(),
                })
                .collect();
            let labels = groups.into_iter().map(|(key, _)| key).collect();
            Ok(DataFrame {
                index: Index::from_labels(Some(by.to_string()), labels),
                columns,
            })
        })
    }

    fn select(&self, labels: &[&str]) -> Result<DataFrame, BearcatError> {
        traced(call_frame!("select"), || {
            let columns = labels
                .iter()
                .map(|label| {
                    self.position_of(label)
                        .map(|p| self.columns[p].clone())
                        .ok_or_else(|| key_error(label))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DataFrame {
                index: self.index.clone(),
                columns,
            })
        })
    }

    fn head(&self, n: usize) -> Result<DataFrame, BearcatError> {
        traced(call_frame!("head"), || {
            let keep = n.min(self.nrows());
            let rows = (0..keep).collect::<Vec<_>>();
            Ok(DataFrame {
                index: self.index.take(&rows),
                columns: self
                    .columns
                    .iter()
                    .map(|c| Column {
                        label: c.label.clone(),
                        dtype: c.dtype,
                        values: c.values.iter().take(keep).cloned().collect(),
                    })
                    .collect(),
            })
        })
    }

    fn column(&self, label: &str) -> Result<Series, BearcatError> {
        traced(call_frame!("column"), || {
            let position = self.position_of(label).ok_or_else(|| key_error(label))?;
            column_at(self, position)
        })
    }

    fn getattr(&self, name: &str) -> Result<Series, BearcatError> {
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
                .map(|c| c.dtype)
                .reduce(DType::common)
                .unwrap_or(DType::Object);
            let mut values = Vec::with_capacity(self.nrows() * self.ncols());
            for row in 0..self.nrows() {
                for column in &self.columns {
                    let cell = column.values.get(row).cloned().unwrap_or(Scalar::Null);
                    values.push(cell.widen(dtype));
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

impl SeriesOps for Series {
    fn sum(&self) -> Result<Scalar, BearcatError> {
        traced(call_frame!("sum"), || reduce_sum(self.dtype, &self.values))
    }

    fn to_array(&self) -> Result<Array, BearcatError> {
        traced(call_frame!("to_array"), || {
            Ok(Array {
                dtype: self.dtype,
                shape: vec![self.len()],
                values: self.values.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        TabulaEngine
            .from_columns(vec![
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
            ])
            .expect("frame")
    }

    #[test]
    fn sum_mixes_numbers_and_concatenated_strings() {
        let sum = FrameOps::sum(&frame()).expect("sum");
        assert_eq!(sum.index, Index::from_strings(["a", "b", "s"]));
        assert_eq!(sum.dtype, DType::Object);
        assert_eq!(
            sum.values,
            vec![
                Scalar::Int64(7),
                Scalar::Int64(22),
                Scalar::Utf8("helloworldBarfoo".to_string()),
            ]
        );
    }

    #[test]
    fn sum_numeric_keeps_integer_dtype() {
        let sum = frame().sum_numeric().expect("sum");
        assert_eq!(sum.index, Index::from_strings(["a", "b"]));
        assert_eq!(sum.dtype, DType::Int64);
        assert_eq!(sum.to_string(), "a   7\nb  22\ndtype: int64");
    }

    #[test]
    fn groupby_count_sorts_keys_and_counts_present_values() {
        let counts = frame().groupby_count("a").expect("groupby");
        assert_eq!(counts.index.name.as_deref(), Some("a"));
        assert_eq!(
            counts.index.labels,
            vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)]
        );
        assert_eq!(counts.column_labels(), Index::from_strings(["b", "s"]));
        for column in &counts.columns {
            assert_eq!(column.dtype, DType::Int64);
            assert_eq!(
                column.values,
                vec![Scalar::Int64(2), Scalar::Int64(1), Scalar::Int64(1)]
            );
        }
    }

    #[test]
    fn groupby_drops_missing_keys_and_counts_skip_nan() {
        let frame = TabulaEngine
            .from_columns(vec![
                ("k".to_string(), ColumnInput::Float64(vec![2.0, f64::NAN, 1.0, 2.0])),
                ("v".to_string(), ColumnInput::Float64(vec![f64::NAN, 1.0, 1.0, 1.0])),
            ])
            .expect("frame");
        let counts = frame.groupby_count("k").expect("groupby");
        assert_eq!(
            counts.index.labels,
            vec![Scalar::Float64(1.0), Scalar::Float64(2.0)]
        );
        assert_eq!(counts.columns[0].values, vec![Scalar::Int64(1), Scalar::Int64(1)]);
    }

    #[test]
    fn select_head_and_shape() {
        let picked = frame().select(&["s", "b"]).expect("select");
        assert_eq!(picked.column_labels(), Index::from_strings(["s", "b"]));
        let top = picked.head(2).expect("head");
        assert_eq!(top.shape().expect("shape"), (2, 2));
        assert_eq!(top.index, Index::range(2));
        assert!(matches!(frame().select(&["zz"]), Err(BearcatError::Engine(_))));
    }

    #[test]
    fn getattr_resolves_columns_and_rejects_unknown_names() {
        let b = frame().getattr("b").expect("attribute");
        assert_eq!(b.name.as_deref(), Some("b"));
        assert_eq!(SeriesOps::sum(&b).expect("sum"), Scalar::Int64(22));
        assert!(frame().getattr("nope").is_err());
    }

    #[test]
    fn float_sums_skip_nan_and_object_sums_reject_mixed_operands() {
        let floats = Series {
            name: None,
            index: Index::range(3),
            dtype: DType::Float64,
            values: vec![Scalar::Float64(1.5), Scalar::Float64(f64::NAN), Scalar::Float64(2.0)],
        };
        assert_eq!(SeriesOps::sum(&floats).expect("sum"), Scalar::Float64(3.5));

        let mixed = Series {
            name: None,
            index: Index::range(2),
            dtype: DType::Object,
            values: vec![Scalar::Utf8("x".to_string()), Scalar::Int64(1)],
        };
        assert!(SeriesOps::sum(&mixed).is_err());
    }

    #[test]
    fn to_array_is_row_major_with_common_dtype() {
        let frame = TabulaEngine
            .from_columns(vec![
                ("i".to_string(), ColumnInput::Int64(vec![1, 2])),
                ("f".to_string(), ColumnInput::Float64(vec![0.5, 1.5])),
            ])
            .expect("frame");
        let array = frame.to_array().expect("array");
        assert_eq!(array.dtype, DType::Float64);
        assert_eq!(array.shape, vec![2, 2]);
        assert_eq!(array.to_string(), "[[1.0 0.5]\n [2.0 1.5]]");
    }
}

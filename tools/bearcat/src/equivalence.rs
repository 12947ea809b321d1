use crate::value::{Array, DataFrame, Index, RecordedValue, Scalar, Series};

/// `Ok(())` when equivalent, otherwise a description of the first difference.
pub fn compare_values(left: &RecordedValue, right: &RecordedValue) -> Result<(), String> {
    match (left, right) {
        (RecordedValue::Frame(l), RecordedValue::Frame(r)) => compare_frames(l, r),
        (RecordedValue::Series(l), RecordedValue::Series(r)) => compare_series(l, r),
        (RecordedValue::Index(l), RecordedValue::Index(r)) => compare_index(l, r, "Index"),
        (RecordedValue::Array(l), RecordedValue::Array(r)) => compare_arrays(l, r),
        (RecordedValue::Sequence(l), RecordedValue::Sequence(r)) => compare_sequences(l, r),
        (RecordedValue::Scalar(l), RecordedValue::Scalar(r)) if numeric_eq(l, r) => Ok(()),
        (RecordedValue::Null, RecordedValue::Null) => Ok(()),
        (
            RecordedValue::Frame(_) | RecordedValue::Series(_) | RecordedValue::Index(_),
            other,
        ) => Err(format!(
            "{} expected, found {} instead",
            left.type_name(),
            other.type_name()
        )),
        (l, r) => Err(format!("{l} != {r}")),
    }
}

/// First row where the two runs differ.
fn first_difference(left: &[Scalar], right: &[Scalar]) -> Option<usize> {
    if left.len() != right.len() {
        return Some(left.len().min(right.len()));
    }
    left.iter()
        .zip(right)
        .position(|(l, r)| !l.semantic_eq(r))
}

fn cell(values: &[Scalar], row: usize) -> String {
    values
        .get(row)
        .map_or_else(|| "<missing>".to_string(), ToString::to_string)
}

pub fn compare_index(left: &Index, right: &Index, obj: &str) -> Result<(), String> {
    if left.len() != right.len() {
        return Err(format!(
            "{obj} length are different: left {}, right {}",
            left.len(),
            right.len()
        ));
    }
    if left.inferred_dtype() != right.inferred_dtype() {
        return Err(format!(
            "{obj} dtype are different: left {}, right {}",
            left.inferred_dtype(),
            right.inferred_dtype()
        ));
    }
    if let Some(row) = first_difference(&left.labels, &right.labels) {
        return Err(format!(
            "{obj} values are different at position {row}: {} != {}",
            cell(&left.labels, row),
            cell(&right.labels, row)
        ));
    }
    if left.name != right.name {
        return Err(format!(
            "{obj} names are different: left {:?}, right {:?}",
            left.name, right.name
        ));
    }
    Ok(())
}

pub fn compare_frames(left: &DataFrame, right: &DataFrame) -> Result<(), String> {
    let left_shape = (left.nrows(), left.ncols());
    let right_shape = (right.nrows(), right.ncols());
    if left_shape != right_shape {
        return Err(format!(
            "DataFrame shape mismatch: left {left_shape:?}, right {right_shape:?}"
        ));
    }
    compare_index(&left.column_labels(), &right.column_labels(), "DataFrame.columns")?;
    compare_index(&left.index, &right.index, "DataFrame.index")?;

    for (position, (l, r)) in left.columns.iter().zip(&right.columns).enumerate() {
        let obj = format!("DataFrame.iloc[:, {position}] (column name=\"{}\")", l.label);
        if l.dtype != r.dtype {
            return Err(format!(
                "Attributes of {obj} are different: dtype {} != {}",
                l.dtype, r.dtype
            ));
        }
        if let Some(row) = first_difference(&l.values, &r.values) {
            return Err(format!(
                "{obj} values are different at row {row}: {} != {}",
                cell(&l.values, row),
                cell(&r.values, row)
            ));
        }
    }
    Ok(())
}

pub fn compare_series(left: &Series, right: &Series) -> Result<(), String> {
    if left.len() != right.len() {
        return Err(format!(
            "Series length are different: left {}, right {}",
            left.len(),
            right.len()
        ));
    }
    compare_index(&left.index, &right.index, "Series.index")?;
    if left.dtype != right.dtype {
        return Err(format!(
            "Attributes of Series are different: dtype {} != {}",
            left.dtype, right.dtype
        ));
    }
    if let Some(row) = first_difference(&left.values, &right.values) {
        return Err(format!(
            "Series values are different at position {row}: {} != {}",
            cell(&left.values, row),
            cell(&right.values, row)
        ));
    }
    if left.name != right.name {
        return Err(format!(
            "Attribute \"name\" are different: left {:?}, right {:?}",
            left.name, right.name
        ));
    }
    Ok(())
}

/// Loose equality for bare scalars and array cells: numbers compare by
/// value across bool, int and float, so `1`, `1.0` and `True` are equal.
fn numeric_eq(left: &Scalar, right: &Scalar) -> bool {
    left.semantic_eq(right)
        || match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => false,
        }
}

/// Arrays compare by shape and numeric value, so `1` equals `1.0`.
pub fn compare_arrays(left: &Array, right: &Array) -> Result<(), String> {
    let same = left.shape == right.shape
        && left.values.len() == right.values.len()
        && left
            .values
            .iter()
            .zip(&right.values)
            .all(|(l, r)| numeric_eq(l, r));
    if same {
        Ok(())
    } else {
        Err(format!("{left} != {right}"))
    }
}

fn compare_sequences(left: &[RecordedValue], right: &[RecordedValue]) -> Result<(), String> {
    if left.len() != right.len() {
        return Err(format!(
            "sequence lengths differ: left {}, right {}",
            left.len(),
            right.len()
        ));
    }
    for (position, (l, r)) in left.iter().zip(right).enumerate() {
        compare_values(l, r).map_err(|reason| format!("item {position}: {reason}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Column, DType};

    fn frame(b: Vec<Scalar>, dtype: DType) -> DataFrame {
        DataFrame {
            index: Index::range(2),
            columns: vec![
                Column {
                    label: "a".to_string(),
                    dtype: DType::Int64,
                    values: vec![Scalar::Int64(1), Scalar::Int64(2)],
                },
                Column {
                    label: "b".to_string(),
                    dtype,
                    values: b,
                },
            ],
        }
    }

    fn floats(values: &[f64]) -> Vec<Scalar> {
        values.iter().copied().map(Scalar::Float64).collect()
    }

    #[test]
    fn frames_with_nan_in_the_same_cells_are_equal() {
        let left = frame(floats(&[f64::NAN, 1.0]), DType::Float64);
        let right = frame(floats(&[f64::NAN, 1.0]), DType::Float64);
        assert_eq!(compare_frames(&left, &right), Ok(()));
    }

    #[test]
    fn frame_checks_dtype_before_values() {
        let left = frame(floats(&[1.0, 2.0]), DType::Float64);
        let right = frame(vec![Scalar::Int64(1), Scalar::Int64(2)], DType::Int64);
        let reason = compare_frames(&left, &right).expect_err("dtype differs");
        assert_eq!(
            reason,
            "Attributes of DataFrame.iloc[:, 1] (column name=\"b\") are different: dtype float64 != int64"
        );
    }

    #[test]
    fn frame_reports_first_differing_cell() {
        let left = frame(floats(&[1.0, 2.0]), DType::Float64);
        let right = frame(floats(&[1.0, 2.5]), DType::Float64);
        let reason = compare_frames(&left, &right).expect_err("cell differs");
        assert!(reason.ends_with("values are different at row 1: 2.0 != 2.5"));
    }

    #[test]
    fn frame_column_order_matters() {
        let left = frame(floats(&[1.0, 2.0]), DType::Float64);
        let mut right = left.clone();
        right.columns.reverse();
        let reason = compare_frames(&left, &right).expect_err("columns reordered");
        assert!(reason.starts_with("DataFrame.columns values are different"));
    }

    #[test]
    fn series_names_and_index_names_are_compared() {
        let series = Series {
            name: Some("b".to_string()),
            index: Index::range(1),
            dtype: DType::Int64,
            values: vec![Scalar::Int64(3)],
        };
        let mut renamed = series.clone();
        renamed.name = None;
        assert!(compare_series(&series, &renamed)
            .expect_err("names differ")
            .starts_with("Attribute \"name\""));

        let mut reindexed = series.clone();
        reindexed.index.name = Some("a".to_string());
        assert!(compare_series(&series, &reindexed)
            .expect_err("index names differ")
            .starts_with("Series.index names"));
    }

    #[test]
    fn arrays_compare_numerically_across_int_and_float() {
        let ints = Array::from_values(vec![Scalar::Int64(1), Scalar::Int64(2)]);
        let floats = Array::from_values(floats(&[1.0, 2.0]));
        assert_eq!(compare_arrays(&ints, &floats), Ok(()));
        let reshaped = Array {
            shape: vec![2, 1],
            ..ints.clone()
        };
        assert_eq!(
            compare_arrays(&ints, &reshaped).expect_err("shape differs"),
            "[1 2] != [[1]\n [2]]"
        );
    }

    #[test]
    fn category_mismatch_and_scalars() {
        let series = RecordedValue::Series(Series {
            name: None,
            index: Index::range(0),
            dtype: DType::Object,
            values: Vec::new(),
        });
        assert_eq!(
            compare_values(&RecordedValue::Frame(frame(floats(&[1.0, 2.0]), DType::Float64)), &series),
            Err("DataFrame expected, found Series instead".to_string())
        );
        assert_eq!(compare_values(&RecordedValue::Null, &RecordedValue::Null), Ok(()));
    }

    #[test]
    fn bare_scalars_compare_numerically_like_array_cells() {
        let scalar = RecordedValue::Scalar;
        assert_eq!(
            compare_values(&scalar(Scalar::Int64(7)), &scalar(Scalar::Float64(7.0))),
            Ok(())
        );
        assert_eq!(
            compare_values(&scalar(Scalar::Bool(true)), &scalar(Scalar::Int64(1))),
            Ok(())
        );
        assert_eq!(
            compare_values(&scalar(Scalar::Int64(7)), &scalar(Scalar::Float64(7.5))),
            Err("7 != 7.5".to_string())
        );
        assert_eq!(
            compare_values(&scalar(Scalar::Utf8("1".into())), &scalar(Scalar::Int64(1))),
            Err("1 != 1".to_string())
        );
        assert_eq!(
            compare_values(&scalar(Scalar::Null), &scalar(Scalar::Float64(f64::NAN))),
            Err("None != NaN".to_string())
        );
    }

    #[test]
    fn sequences_compare_elementwise() {
        let pair = |a, b| {
            RecordedValue::Sequence(vec![
                RecordedValue::Scalar(Scalar::Int64(a)),
                RecordedValue::Scalar(Scalar::Int64(b)),
            ])
        };
        assert_eq!(compare_values(&pair(4, 3), &pair(4, 3)), Ok(()));
        assert_eq!(
            compare_values(&pair(4, 3), &pair(4, 2)),
            Err("item 1: 3 != 2".to_string())
        );
    }
}

//! Conversion from polars frames to the row-major `f64` matrices the models train on.

use crate::models::error::ModelError;
use polars::prelude::*;

/// Reads one column as `f64`, failing on nulls.
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, ModelError> {
    let column = df
        .column(name)
        .map_err(|_| ModelError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    column
        .f64()?
        .into_iter()
        .map(|v| v.ok_or_else(|| ModelError::UnexpectedNull(name.to_string())))
        .collect()
}

/// Builds a row-major design matrix with one row per frame row, columns in `features` order.
pub fn design_matrix(df: &DataFrame, features: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
    let columns = features
        .iter()
        .map(|f| column_f64(df, f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..df.height())
        .map(|row| columns.iter().map(|c| c[row]).collect())
        .collect())
}

/// Keeps only rows where every listed column is non-null.
pub fn drop_incomplete(df: &DataFrame, columns: &[String]) -> PolarsResult<DataFrame> {
    let complete = columns
        .iter()
        .map(|c| col(c.as_str()).is_not_null())
        .reduce(|a, b| a.and(b))
        .unwrap_or(lit(true));
    df.clone().lazy().filter(complete).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("a".into(), [Some(1i64), Some(2), None]),
            Column::new("b".into(), [0.5f64, 1.5, 2.5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_design_matrix_is_row_major() -> Result<(), Box<dyn std::error::Error>> {
        let df = drop_incomplete(&frame(), &["a".to_string()])?;
        let x = design_matrix(&df, &["b".to_string(), "a".to_string()])?;
        assert_eq!(x, vec![vec![0.5, 1.0], vec![1.5, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_nulls_and_missing_columns_are_errors() {
        assert!(matches!(
            column_f64(&frame(), "a"),
            Err(ModelError::UnexpectedNull(_))
        ));
        assert!(matches!(
            column_f64(&frame(), "zzz"),
            Err(ModelError::MissingColumn(_))
        ));
    }
}

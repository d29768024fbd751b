//! Column access helpers over polars frames
//!
//! Every calculator reads its inputs through these functions so that dtype
//! handling (numeric casting, label normalization, timestamp parsing) is the
//! same everywhere.

use crate::error::{DriftGuardError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use polars::prelude::*;

/// Fail with the full list of columns missing from `df`
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<()> {
    let present = df.get_column_names();
    let missing: Vec<String> = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| !present.iter().any(|p| p.as_str() == *n))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DriftGuardError::MissingColumns { columns: missing })
    }
}

/// Fail when `df` has no rows
pub fn require_rows(df: &DataFrame, what: &str) -> Result<()> {
    if df.height() == 0 {
        return Err(DriftGuardError::invalid(format!("{} data contains no rows", what)));
    }
    Ok(())
}

/// Whether `df` has a column called `name`
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Whether a dtype is an integer or float type
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    require_columns(df, &[name])?;
    Ok(df.column(name)?.as_materialized_series())
}

/// Read a numeric or boolean column as floats, with nulls and NaN as `None`
pub fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let s = series(df, name)?;
    if !is_numeric_dtype(s.dtype()) && !matches!(s.dtype(), DataType::Boolean) {
        return Err(DriftGuardError::invalid(format!(
            "column '{}' has dtype {} but a numeric column is required",
            name,
            s.dtype()
        )));
    }

    let casted = s.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Read a column as string labels
///
/// Integral floats are rendered without a fractional part so that a label
/// column stored as `1.0` matches a class key `"1"`.
pub fn label_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = series(df, name)?;
    let labels = match s.dtype() {
        DataType::String => s.str()?.into_iter().map(|v| v.map(str::to_string)).collect(),
        DataType::Boolean => s
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| b.to_string()))
            .collect(),
        DataType::Float32 | DataType::Float64 => {
            let casted = s.cast(&DataType::Float64)?;
            casted
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()).map(format_float_label))
                .collect()
        }
        dt if is_numeric_dtype(dt) => {
            let casted = s.cast(&DataType::Int64)?;
            casted
                .i64()?
                .into_iter()
                .map(|v| v.map(|i| i.to_string()))
                .collect()
        }
        _ => {
            let casted = s.cast(&DataType::String)?;
            casted
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect()
        }
    };
    Ok(labels)
}

fn format_float_label(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Per-row missing flags: null, or NaN for float columns
pub fn missing_mask(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    let s = series(df, name)?;
    let mask = match s.dtype() {
        DataType::Float32 | DataType::Float64 => {
            let casted = s.cast(&DataType::Float64)?;
            casted
                .f64()?
                .into_iter()
                .map(|v| v.map_or(true, f64::is_nan))
                .collect()
        }
        _ => s.is_null().into_iter().map(|v| v.unwrap_or(true)).collect(),
    };
    Ok(mask)
}

/// Read a timestamp column as naive UTC datetimes
///
/// Accepts `Datetime` (any unit), `Date` and `String` columns.
pub fn timestamp_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let s = series(df, name)?;
    match s.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let ints = s.cast(&DataType::Int64)?;
            Ok(ints
                .i64()?
                .into_iter()
                .map(|v| v.and_then(|v| from_epoch(v, unit)))
                .collect())
        }
        DataType::Date => {
            let days = s.cast(&DataType::Int32)?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| DriftGuardError::Data("invalid epoch".to_string()))?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|v| v.and_then(|d| epoch.checked_add_signed(TimeDelta::days(d as i64))))
                .collect())
        }
        DataType::String => s
            .str()?
            .into_iter()
            .map(|v| match v {
                Some(text) => parse_timestamp(text).map(Some).ok_or_else(|| {
                    DriftGuardError::invalid(format!(
                        "could not parse '{}' in timestamp column '{}'",
                        text, name
                    ))
                }),
                None => Ok(None),
            })
            .collect(),
        other => Err(DriftGuardError::invalid(format!(
            "timestamp column '{}' has unsupported dtype {}",
            name, other
        ))),
    }
}

fn from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    };
    dt.map(|d| d.naive_utc())
}

/// Parse the timestamp string formats accepted in string columns
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

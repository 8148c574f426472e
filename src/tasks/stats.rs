//! Small numeric and line-splitting helpers shared by the task parsers

use crate::error::{ExtractError, Result};
use crate::types::MetricValue;
use std::str::FromStr;

/// Mean of a partition; an empty partition yields `Missing` instead of failing
pub(crate) fn mean_or_missing(values: &[f64]) -> MetricValue {
    if values.is_empty() {
        return MetricValue::Missing;
    }
    MetricValue::Number(values.iter().sum::<f64>() / values.len() as f64)
}

/// Accuracy-style ratio; an empty denominator is fatal
pub(crate) fn ratio(count: usize, total: usize, task: &str, metric: &str) -> Result<f64> {
    if total == 0 {
        return Err(ExtractError::EmptyPartition {
            task: task.to_string(),
            metric: metric.to_string(),
        });
    }
    Ok(count as f64 / total as f64)
}

/// Non-blank lines of a raw file, trimmed, with 1-based line numbers
pub(crate) fn data_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Split a space-separated row and check its column count
pub(crate) fn columns(line: &str, line_no: usize, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != expected {
        return Err(ExtractError::ParseError(format!(
            "line {}: expected {} columns, found {}",
            line_no,
            expected,
            fields.len()
        )));
    }
    Ok(fields)
}

pub(crate) fn parse_field<T: FromStr>(token: &str, line_no: usize, column: &str) -> Result<T> {
    token.parse::<T>().map_err(|_| {
        ExtractError::ParseError(format!(
            "line {}: invalid {} value <{}>",
            line_no, column, token
        ))
    })
}

/// Parse an integer code column that only admits the values in `allowed`
pub(crate) fn parse_code(
    token: &str,
    line_no: usize,
    column: &str,
    allowed: &[i64],
) -> Result<i64> {
    let code: i64 = parse_field(token, line_no, column)?;
    if !allowed.contains(&code) {
        return Err(ExtractError::ParseError(format!(
            "line {}: {} must be one of {:?}, found {}",
            line_no, column, allowed, code
        )));
    }
    Ok(code)
}

//! Digit-span task parser
//!
//! Unlike the other tasks, each digit-span trial spans three lines:
//!
//! ```text
//! <block> clickedStim <clicked stimuli...>
//! rts <reaction time per click...>
//! <block> <best so far> <sequence length> <error status> // <correct digits> // <chosen digits>
//! ```
//!
//! An error status of 0 means the sequence was reproduced correctly.
//!
//! Reference: <https://www.psytoolkit.org/experiment-library/digitspan.html>

use crate::error::{ExtractError, Result};
use crate::types::{MetricRecord, MetricValue};

use super::stats::{data_lines, parse_field};
use super::TaskParser;

const LINES_PER_TRIAL: usize = 3;
const CLICKED_STIM_TOKEN: &str = "clickedStim";
const RTS_TOKEN: &str = "rts";
const SEGMENT_DELIMITER: &str = "//";

/// Metric schema, in output column order
pub const DIGITSPAN_METRICS: &[&str] = &[
    "longest_seq_len",
    "n_trials_before_failure",
    "overall_mean_rt",
];

/// Digit-span raw-output parser
pub struct DigitSpanParser;

impl TaskParser for DigitSpanParser {
    fn metric_names(&self) -> &[&'static str] {
        DIGITSPAN_METRICS
    }

    fn parse(&self, raw: &str) -> Result<MetricRecord> {
        let trials = parse_trials(raw)?;

        let n_correct = trials.iter().filter(|t| t.error_status == 0).count();
        // Mean of per-trial means, not a mean over every click
        let trial_means: Vec<f64> = trials
            .iter()
            .map(|t| t.reaction_times.iter().sum::<f64>() / t.reaction_times.len() as f64)
            .collect();
        let overall_mean_rt = trial_means.iter().sum::<f64>() / trial_means.len() as f64;

        let mut record = MetricRecord::new();
        record.insert("longest_seq_len", longest_sequence_length(raw)?);
        record.insert("n_trials_before_failure", n_correct);
        record.insert("overall_mean_rt", MetricValue::Number(overall_mean_rt));
        Ok(record)
    }
}

/// Ultimate digit span: the second number on the last non-blank line.
///
/// This is all older exports of this tool reported for digit span and is
/// kept for callers that only need that figure.
pub fn longest_sequence_length(raw: &str) -> Result<i64> {
    let (line_no, last) = data_lines(raw)
        .last()
        .ok_or_else(|| ExtractError::ParseError("digit span file has no trials".to_string()))?;
    let token = last.split_whitespace().nth(1).ok_or_else(|| {
        ExtractError::ParseError(format!("line {}: missing longest sequence length", line_no))
    })?;
    parse_field(token, line_no, "longest sequence length")
}

#[derive(Debug)]
struct DigitSpanTrial {
    reaction_times: Vec<f64>,
    error_status: i64,
}

fn parse_trials(raw: &str) -> Result<Vec<DigitSpanTrial>> {
    let lines: Vec<(usize, &str)> = data_lines(raw).collect();
    if lines.is_empty() {
        return Err(ExtractError::ParseError(
            "digit span file has no trials".to_string(),
        ));
    }
    if lines.len() % LINES_PER_TRIAL != 0 {
        return Err(ExtractError::ParseError(format!(
            "digit span file has {} non-blank lines, expected a multiple of {}",
            lines.len(),
            LINES_PER_TRIAL
        )));
    }

    lines
        .chunks(LINES_PER_TRIAL)
        .map(|chunk| parse_trial(chunk[0], chunk[1], chunk[2]))
        .collect()
}

fn parse_trial(
    (stim_no, stim_line): (usize, &str),
    (rts_no, rts_line): (usize, &str),
    (summary_no, summary_line): (usize, &str),
) -> Result<DigitSpanTrial> {
    if !stim_line.split_whitespace().any(|t| t == CLICKED_STIM_TOKEN) {
        return Err(ExtractError::ParseError(format!(
            "line {}: expected a {} line",
            stim_no, CLICKED_STIM_TOKEN
        )));
    }

    let reaction_times = rts_line
        .split_whitespace()
        .skip_while(|t| *t != RTS_TOKEN)
        .skip(1)
        .map(|t| parse_field::<f64>(t, rts_no, "reaction time"))
        .collect::<Result<Vec<f64>>>()?;
    if reaction_times.is_empty() {
        return Err(ExtractError::ParseError(format!(
            "line {}: expected an {} line with at least one reaction time",
            rts_no, RTS_TOKEN
        )));
    }

    // Trailing `// correct // chosen` segments are informational only
    let head = summary_line
        .split(SEGMENT_DELIMITER)
        .next()
        .unwrap_or_default();
    let fields: Vec<&str> = head.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(ExtractError::ParseError(format!(
            "line {}: summary line needs block, best, length and error status",
            summary_no
        )));
    }
    // Validate the numeric fields even though only the error status is kept
    parse_field::<i64>(fields[1], summary_no, "longest sequence length")?;
    parse_field::<i64>(fields[2], summary_no, "sequence length")?;
    let error_status = parse_field(fields[3], summary_no, "error status")?;

    Ok(DigitSpanTrial {
        reaction_times,
        error_status,
    })
}

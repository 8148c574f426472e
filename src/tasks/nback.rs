//! N-back task parser
//!
//! Raw output has twelve space-separated columns per trial: block, trial,
//! trial type (1 matching, 0 non-matching), score (1 correct, 0 incorrect),
//! match, miss, false alarm, reaction time, memory, current letter and the two
//! lookback letters. Only trial type, score and reaction time are used.
//!
//! Reference: <https://www.psytoolkit.org/experiment-library/nback2.html>

use crate::error::{ExtractError, Result};
use crate::types::MetricRecord;

use super::stats::{columns, data_lines, mean_or_missing, parse_code, parse_field, ratio};
use super::TaskParser;

const N_COLUMNS: usize = 12;
const COL_TRIAL_TYPE: usize = 2;
const COL_SCORE: usize = 3;
const COL_REACTION_TIME: usize = 7;

const MATCHING: i64 = 1;
const NON_MATCHING: i64 = 0;

const TASK_LABEL: &str = "nback";

/// Metric schema, in output column order
pub const NBACK_METRICS: &[&str] = &[
    "overall_accuracy",
    "accuracy_matching",
    "accuracy_nonmatching",
    "n_correct_matching",
    "n_incorrect_matching",
    "n_correct_nonmatching",
    "n_incorrect_nonmatching",
    "rt_matching_overall",
    "rt_nonmatching_overall",
    "rt_matching_correct",
    "rt_matching_incorrect",
    "rt_nonmatching_correct",
    "rt_nonmatching_incorrect",
];

/// N-back raw-output parser
pub struct NBackParser;

impl TaskParser for NBackParser {
    fn metric_names(&self) -> &[&'static str] {
        NBACK_METRICS
    }

    fn parse(&self, raw: &str) -> Result<MetricRecord> {
        let trials = parse_trials(raw)?;
        summarize(&trials)
    }
}

#[derive(Debug, Clone, Copy)]
struct NBackTrial {
    trial_type: i64,
    correct: bool,
    reaction_time: f64,
}

fn parse_trials(raw: &str) -> Result<Vec<NBackTrial>> {
    let mut trials = Vec::new();
    for (line_no, line) in data_lines(raw) {
        let fields = columns(line, line_no, N_COLUMNS)?;
        let correct = parse_code(fields[COL_SCORE], line_no, "score", &[0, 1])? == 1;
        trials.push(NBackTrial {
            trial_type: parse_code(
                fields[COL_TRIAL_TYPE],
                line_no,
                "trial type",
                &[MATCHING, NON_MATCHING],
            )?,
            correct,
            reaction_time: parse_field(fields[COL_REACTION_TIME], line_no, "reaction time")?,
        });
    }
    Ok(trials)
}

fn summarize(trials: &[NBackTrial]) -> Result<MetricRecord> {
    let n_correct_all = trials.iter().filter(|t| t.correct).count();
    let overall_accuracy = ratio(n_correct_all, trials.len(), TASK_LABEL, "overall_accuracy")?;

    let matching = TypeSummary::collect(trials, MATCHING);
    let nonmatching = TypeSummary::collect(trials, NON_MATCHING);

    let mut record = MetricRecord::new();
    record.insert("overall_accuracy", overall_accuracy);
    record.insert("accuracy_matching", matching.accuracy("accuracy_matching")?);
    record.insert(
        "accuracy_nonmatching",
        nonmatching.accuracy("accuracy_nonmatching")?,
    );
    record.insert("n_correct_matching", matching.correct_rts.len());
    record.insert("n_incorrect_matching", matching.incorrect_rts.len());
    record.insert("n_correct_nonmatching", nonmatching.correct_rts.len());
    record.insert("n_incorrect_nonmatching", nonmatching.incorrect_rts.len());
    record.insert("rt_matching_overall", mean_or_missing(&matching.all_rts()));
    record.insert(
        "rt_nonmatching_overall",
        mean_or_missing(&nonmatching.all_rts()),
    );
    record.insert("rt_matching_correct", mean_or_missing(&matching.correct_rts));
    record.insert(
        "rt_matching_incorrect",
        mean_or_missing(&matching.incorrect_rts),
    );
    record.insert(
        "rt_nonmatching_correct",
        mean_or_missing(&nonmatching.correct_rts),
    );
    record.insert(
        "rt_nonmatching_incorrect",
        mean_or_missing(&nonmatching.incorrect_rts),
    );
    Ok(record)
}

/// Reaction times of one trial type, split by correctness
struct TypeSummary {
    correct_rts: Vec<f64>,
    incorrect_rts: Vec<f64>,
}

impl TypeSummary {
    fn collect(trials: &[NBackTrial], trial_type: i64) -> Self {
        let (correct, incorrect): (Vec<&NBackTrial>, Vec<&NBackTrial>) = trials
            .iter()
            .filter(|t| t.trial_type == trial_type)
            .partition(|t| t.correct);
        Self {
            correct_rts: correct.iter().map(|t| t.reaction_time).collect(),
            incorrect_rts: incorrect.iter().map(|t| t.reaction_time).collect(),
        }
    }

    fn total(&self) -> usize {
        self.correct_rts.len() + self.incorrect_rts.len()
    }

    fn accuracy(&self, metric: &str) -> Result<f64> {
        ratio(self.correct_rts.len(), self.total(), TASK_LABEL, metric)
    }

    fn all_rts(&self) -> Vec<f64> {
        self.correct_rts
            .iter()
            .chain(self.incorrect_rts.iter())
            .copied()
            .collect()
    }
}

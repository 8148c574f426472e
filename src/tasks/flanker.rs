//! Flanker (arrows) task parser
//!
//! Raw output is one trial per line with four space-separated columns:
//! stimulus, condition (1 congruent, 0 incongruent), status (1 correct,
//! 2 incorrect, 3 too slow) and reaction time in milliseconds.
//!
//! Reference: <https://www.psytoolkit.org/experiment-library/flanker_arrows.html>

use crate::error::Result;
use crate::types::MetricRecord;

use super::stats::{columns, data_lines, mean_or_missing, parse_code, parse_field, ratio};
use super::TaskParser;

const CONGRUENT: i64 = 1;
const INCONGRUENT: i64 = 0;

const STATUS_CORRECT: i64 = 1;
const STATUS_INCORRECT: i64 = 2;
const STATUS_TOO_SLOW: i64 = 3;

const TASK_LABEL: &str = "flanker";

/// Metric schema, in output column order
pub const FLANKER_METRICS: &[&str] = &[
    "n_congruent_trials",
    "n_incongruent_trials",
    "n_correct_trials",
    "n_incorrect_trials",
    "n_too_slow_trials",
    "accuracy_overall",
    "accuracy_congruent",
    "accuracy_incongruent",
    "rt_congruent_correct",
    "rt_congruent_incorrect",
    "rt_incongruent_correct",
    "rt_incongruent_incorrect",
    "rt_too_slow",
    "rt_overall",
];

/// Flanker raw-output parser
pub struct FlankerParser;

impl TaskParser for FlankerParser {
    fn metric_names(&self) -> &[&'static str] {
        FLANKER_METRICS
    }

    fn parse(&self, raw: &str) -> Result<MetricRecord> {
        FlankerTrials::parse(raw)?.summarize()
    }
}

#[derive(Debug, Clone, Copy)]
struct FlankerTrial {
    condition: i64,
    status: i64,
    reaction_time: f64,
}

/// All trials of one flanker run
struct FlankerTrials {
    trials: Vec<FlankerTrial>,
}

impl FlankerTrials {
    fn parse(raw: &str) -> Result<Self> {
        let mut trials = Vec::new();
        for (line_no, line) in data_lines(raw) {
            let fields = columns(line, line_no, 4)?;
            // fields[0] is the stimulus name, not used by any metric
            trials.push(FlankerTrial {
                condition: parse_code(fields[1], line_no, "condition", &[CONGRUENT, INCONGRUENT])?,
                status: parse_code(
                    fields[2],
                    line_no,
                    "status",
                    &[STATUS_CORRECT, STATUS_INCORRECT, STATUS_TOO_SLOW],
                )?,
                reaction_time: parse_field(fields[3], line_no, "reaction time")?,
            });
        }
        Ok(Self { trials })
    }

    fn count(&self, condition: Option<i64>, status: Option<i64>) -> usize {
        self.select(condition, status).count()
    }

    fn reaction_times(&self, condition: Option<i64>, status: Option<i64>) -> Vec<f64> {
        self.select(condition, status)
            .map(|t| t.reaction_time)
            .collect()
    }

    fn select(
        &self,
        condition: Option<i64>,
        status: Option<i64>,
    ) -> impl Iterator<Item = &FlankerTrial> {
        self.trials.iter().filter(move |t| {
            condition.map_or(true, |c| t.condition == c) && status.map_or(true, |s| t.status == s)
        })
    }

    /// Share of correct trials within a condition (`None` = all trials)
    fn accuracy(&self, condition: Option<i64>, metric: &str) -> Result<f64> {
        ratio(
            self.count(condition, Some(STATUS_CORRECT)),
            self.count(condition, None),
            TASK_LABEL,
            metric,
        )
    }

    fn summarize(&self) -> Result<MetricRecord> {
        let mut record = MetricRecord::new();

        record.insert("n_congruent_trials", self.count(Some(CONGRUENT), None));
        record.insert("n_incongruent_trials", self.count(Some(INCONGRUENT), None));
        record.insert("n_correct_trials", self.count(None, Some(STATUS_CORRECT)));
        record.insert("n_incorrect_trials", self.count(None, Some(STATUS_INCORRECT)));
        record.insert("n_too_slow_trials", self.count(None, Some(STATUS_TOO_SLOW)));

        record.insert("accuracy_overall", self.accuracy(None, "accuracy_overall")?);
        record.insert(
            "accuracy_congruent",
            self.accuracy(Some(CONGRUENT), "accuracy_congruent")?,
        );
        record.insert(
            "accuracy_incongruent",
            self.accuracy(Some(INCONGRUENT), "accuracy_incongruent")?,
        );

        let rt = |condition, status| mean_or_missing(&self.reaction_times(condition, status));
        record.insert(
            "rt_congruent_correct",
            rt(Some(CONGRUENT), Some(STATUS_CORRECT)),
        );
        record.insert(
            "rt_congruent_incorrect",
            rt(Some(CONGRUENT), Some(STATUS_INCORRECT)),
        );
        record.insert(
            "rt_incongruent_correct",
            rt(Some(INCONGRUENT), Some(STATUS_CORRECT)),
        );
        record.insert(
            "rt_incongruent_incorrect",
            rt(Some(INCONGRUENT), Some(STATUS_INCORRECT)),
        );
        record.insert("rt_too_slow", rt(None, Some(STATUS_TOO_SLOW)));
        record.insert("rt_overall", rt(None, None));

        Ok(record)
    }
}

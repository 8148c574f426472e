//! Pipeline orchestration
//!
//! This module provides the public API for psytk-extract. It runs the full
//! pipeline from a results bundle to one aggregated table per task:
//! input preparation → participant resolution → per-task parsing → pivot →
//! table output.

use crate::archive::prepare_input;
use crate::config::{ExtractConfig, FailurePolicy};
use crate::error::Result;
use crate::resolver::{resolve_participant_files, ParticipantFileIndex, SummaryStats};
use crate::table::{pivot, AggregatedTable, ParticipantResults, TaskSchemas};
use crate::tasks::TaskRegistry;
use crate::types::{MetricRecord, ParticipantId, TaskName};
use crate::{EXTRACT_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extract a results bundle with the default configuration (stateless, one-shot).
///
/// # Arguments
/// * `input` - Zip archive or extracted results directory
/// * `output_dir` - Directory receiving one table per task
///
/// # Example
/// ```ignore
/// let report = extract_results(Path::new("results.zip"), Path::new("out"))?;
/// ```
pub fn extract_results(input: &Path, output_dir: &Path) -> Result<RunReport> {
    Extractor::default().run(input, output_dir, None)
}

/// A raw file that failed to parse under [`FailurePolicy::Skip`]
#[derive(Debug, Clone, Serialize)]
pub struct SkippedTask {
    pub participant: ParticipantId,
    pub task: TaskName,
    pub error: String,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub producer: String,
    pub version: String,
    pub computed_at_utc: String,
    pub input_dir: PathBuf,
    pub summary: SummaryStats,
    pub participants: usize,
    pub tasks: Vec<TaskName>,
    pub outputs: Vec<PathBuf>,
    pub skipped: Vec<SkippedTask>,
}

impl RunReport {
    /// Pretty-printed JSON form of the report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Extraction pipeline with a configurable parser registry
pub struct Extractor {
    config: ExtractConfig,
    registry: TaskRegistry,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

impl Extractor {
    /// Create an extractor with the built-in task parsers
    pub fn new(config: ExtractConfig) -> Self {
        Self::with_registry(config, TaskRegistry::default())
    }

    /// Create an extractor with a caller-supplied registry
    pub fn with_registry(config: ExtractConfig, registry: TaskRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run the pipeline on a zip archive or an extracted directory
    pub fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        extract_to: Option<&Path>,
    ) -> Result<RunReport> {
        let root = prepare_input(input, extract_to)?;
        self.extract_dir(&root, output_dir)
    }

    /// Run the pipeline on an extracted results directory
    pub fn extract_dir(&self, root: &Path, output_dir: &Path) -> Result<RunReport> {
        let index = resolve_participant_files(root, &self.config.participant_id_prefix)?;
        info!(
            participants = index.len(),
            tasks = index.tasks().len(),
            "Resolved participant files"
        );

        let schemas = self.schemas_for(&index)?;
        let (results, skipped) = self.process_index(&index)?;
        let tables = pivot(&results, &schemas);
        let outputs = self.write_tables(&tables, output_dir)?;

        Ok(RunReport {
            run_id: Uuid::new_v4().to_string(),
            producer: PRODUCER_NAME.to_string(),
            version: EXTRACT_VERSION.to_string(),
            computed_at_utc: Utc::now().to_rfc3339(),
            input_dir: root.to_path_buf(),
            summary: index.stats().clone(),
            participants: index.len(),
            tasks: index.tasks().iter().cloned().collect(),
            outputs,
            skipped,
        })
    }

    /// Registered metric columns of every task in the index
    pub fn schemas_for(&self, index: &ParticipantFileIndex) -> Result<TaskSchemas> {
        index
            .tasks()
            .iter()
            .map(|task| -> Result<(TaskName, Vec<String>)> {
                let parser = self.registry.resolve(task)?;
                let columns = parser.metric_names().iter().map(|m| m.to_string()).collect();
                Ok((task.clone(), columns))
            })
            .collect()
    }

    /// Parse every participant's raw files.
    ///
    /// All task names are resolved against the registry before any file is
    /// read, so an unknown task aborts the run regardless of the failure
    /// policy.
    pub fn process_index(
        &self,
        index: &ParticipantFileIndex,
    ) -> Result<(ParticipantResults, Vec<SkippedTask>)> {
        for task in index.tasks() {
            self.registry.resolve(task)?;
        }

        let mut results = Vec::with_capacity(index.len());
        let mut skipped = Vec::new();
        for (participant, files) in index.participants() {
            let records = self.process_participant(participant, files, &mut skipped)?;
            results.push((participant.to_string(), records));
        }
        Ok((results, skipped))
    }

    /// Parse one participant's raw file for every task
    pub fn process_participant(
        &self,
        participant: &str,
        files: &BTreeMap<TaskName, PathBuf>,
        skipped: &mut Vec<SkippedTask>,
    ) -> Result<BTreeMap<TaskName, MetricRecord>> {
        let mut records = BTreeMap::new();
        for (task, path) in files {
            let parser = self.registry.resolve(task)?;
            debug!(participant, task = %task, path = %path.display(), "Parsing raw result");

            match parser.parse_file(path) {
                Ok(record) => {
                    records.insert(task.clone(), record);
                }
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(err.for_participant(participant)),
                    FailurePolicy::Skip => {
                        warn!(participant, task = %task, error = %err, "Skipping unparseable result");
                        skipped.push(SkippedTask {
                            participant: participant.to_string(),
                            task: task.clone(),
                            error: err.to_string(),
                        });
                    }
                },
            }
        }
        Ok(records)
    }

    /// Write every table into `output_dir`, creating it if needed
    pub fn write_tables(
        &self,
        tables: &BTreeMap<TaskName, AggregatedTable>,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        let mut outputs = Vec::with_capacity(tables.len());
        for table in tables.values() {
            let path = table.write_to_dir(output_dir, &self.config.output_extension)?;
            info!(
                task = table.task(),
                rows = table.participants().len(),
                path = %path.display(),
                "Wrote task table"
            );
            outputs.push(path);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    const FLANKER_P1: &str = "left 1 1 300\nright 1 1 400\nleft 0 1 450\n";
    const FLANKER_P2: &str = "left 1 1 500\nright 0 2 700\n";
    const NBACK_P1: &str = "1 1 1 1 1 0 0 520 x a b a\n1 2 0 1 0 0 0 0 x c a c\n";
    const NBACK_P2: &str = "1 1 1 0 0 1 0 2000 x a b a\n1 2 0 1 0 0 0 0 x c a c\n";

    /// Lay out an extracted results directory
    fn results_dir(summary: &str, raw_files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.csv"), summary).unwrap();
        let raw_dir = dir.path().join("experiment_data");
        fs::create_dir(&raw_dir).unwrap();
        for (name, contents) in raw_files {
            fs::write(raw_dir.join(name), contents).unwrap();
        }
        dir
    }

    fn two_participant_flanker() -> TempDir {
        results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n\
             p2,flanker_arrows.b.txt\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("flanker_arrows.b.txt", FLANKER_P2),
            ],
        )
    }

    /// Read an output table into participant → column → cell
    fn read_table(path: &Path) -> HashMap<String, HashMap<String, String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                let row: HashMap<String, String> = headers
                    .iter()
                    .cloned()
                    .zip(r.iter().map(String::from))
                    .collect();
                (row["participant_id"].clone(), row)
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_flanker() {
        let input = two_participant_flanker();
        let out = tempfile::tempdir().unwrap();

        let report = extract_results(input.path(), out.path()).unwrap();

        assert_eq!(report.participants, 2);
        assert_eq!(report.tasks, vec!["flanker_arrows".to_string()]);
        assert_eq!(report.outputs, vec![out.path().join("flanker_arrows.csv")]);

        let table = read_table(&report.outputs[0]);
        assert_eq!(table["p1"]["rt_congruent_correct"], "350.0");
        assert_eq!(table["p1"]["accuracy_congruent"], "1.0");
        assert_eq!(table["p2"]["rt_congruent_correct"], "500.0");
        assert_eq!(table["p2"]["rt_too_slow"], "");
    }

    #[test]
    fn test_end_to_end_from_zip_with_two_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("export.zip");
        let file = fs::File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let files = [
            (
                "data.csv",
                "versuchspersonenkennung_1,flanker_arrows_1,nback2_1\n\
                 p1,flanker_arrows.a.txt,nback2.a.txt\n\
                 p2,flanker_arrows.b.txt,nback2.b.txt\n",
            ),
            ("experiment_data/flanker_arrows.a.txt", FLANKER_P1),
            ("experiment_data/flanker_arrows.b.txt", FLANKER_P2),
            ("experiment_data/nback2.a.txt", NBACK_P1),
            ("experiment_data/nback2.b.txt", NBACK_P2),
        ];
        for (name, contents) in files {
            writer.start_file(name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        let out = dir.path().join("out");

        let report = Extractor::default().run(&archive, &out, None).unwrap();

        assert_eq!(report.input_dir, dir.path().join("export"));
        assert_eq!(report.outputs.len(), 2);
        let nback = read_table(&out.join("nback2.csv"));
        assert_eq!(nback["p1"]["accuracy_matching"], "1.0");
        assert_eq!(nback["p2"]["rt_matching_incorrect"], "2000.0");
        assert_eq!(nback["p2"]["rt_matching_correct"], "");
    }

    #[test]
    fn test_unrecognized_task_aborts_before_output() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1,unknown_task_1_1\n\
             p1,flanker_arrows.a.txt,unknown_task_1.a.txt\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("unknown_task_1.a.txt", "whatever\n"),
            ],
        );
        let out = tempfile::tempdir().unwrap();
        let out_dir = out.path().join("tables");

        let err = extract_results(input.path(), &out_dir).unwrap_err();

        assert!(matches!(err, ExtractError::UnrecognizedTask(ref name) if name == "unknown_task_1"));
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_parse_failure_aborts_by_default() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n\
             p2,flanker_arrows.b.txt\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("flanker_arrows.b.txt", "garbage line\n"),
            ],
        );
        let out = tempfile::tempdir().unwrap();

        let err = extract_results(input.path(), out.path()).unwrap_err();
        assert!(matches!(err.innermost(), ExtractError::FileParseError { .. }));
        assert!(err.to_string().contains("p2"));
        assert!(!out.path().join("flanker_arrows.csv").exists());
    }

    #[test]
    fn test_missing_raw_file_names_participant_and_file() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n\
             p2,flanker_arrows.MISSING.txt\n",
            &[("flanker_arrows.a.txt", FLANKER_P1)],
        );
        let out = tempfile::tempdir().unwrap();

        let err = extract_results(input.path(), out.path()).unwrap_err();

        assert!(matches!(err.innermost(), ExtractError::RawFileRead { .. }));
        let message = err.to_string();
        assert!(message.contains("p2"), "{}", message);
        assert!(message.contains("flanker_arrows.MISSING.txt"), "{}", message);
    }

    #[test]
    fn test_empty_partition_names_participant_and_file() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n\
             p2,flanker_arrows.b.txt\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("flanker_arrows.b.txt", "left 1 1 500\nright 1 2 700\n"),
            ],
        );
        let out = tempfile::tempdir().unwrap();

        let err = extract_results(input.path(), out.path()).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("p2"), "{}", message);
        assert!(message.contains("flanker_arrows.b.txt"), "{}", message);
        assert!(message.contains("accuracy_incongruent"), "{}", message);
    }

    #[test]
    fn test_skip_policy_isolates_failures() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n\
             p2,flanker_arrows.b.txt\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("flanker_arrows.b.txt", "garbage line\n"),
            ],
        );
        let out = tempfile::tempdir().unwrap();
        let extractor =
            Extractor::new(ExtractConfig::default().with_failure_policy(FailurePolicy::Skip));

        let report = extractor.extract_dir(input.path(), out.path()).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].participant, "p2");
        let table = read_table(&report.outputs[0]);
        assert_eq!(table["p1"]["rt_congruent_correct"], "350.0");
        assert_eq!(table["p2"]["rt_congruent_correct"], "");
    }

    #[test]
    fn test_skipped_task_keeps_full_header() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             p1,flanker_arrows.a.txt\n",
            &[("flanker_arrows.a.txt", "garbage line\n")],
        );
        let out = tempfile::tempdir().unwrap();
        let extractor =
            Extractor::new(ExtractConfig::default().with_failure_policy(FailurePolicy::Skip));

        let report = extractor.extract_dir(input.path(), out.path()).unwrap();

        let mut reader = csv::Reader::from_path(&report.outputs[0]).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let mut expected = vec!["participant_id".to_string()];
        expected.extend(crate::tasks::FLANKER_METRICS.iter().map(|m| m.to_string()));
        assert_eq!(headers, expected);
        let table = read_table(&report.outputs[0]);
        assert_eq!(table["p1"]["accuracy_overall"], "");
    }

    #[test]
    fn test_duplicate_ids_and_dropped_rows_reported() {
        let input = results_dir(
            "versuchspersonenkennung_1,flanker_arrows_1\n\
             42,flanker_arrows.a.txt\n\
             42,flanker_arrows.b.txt\n\
             43,\n",
            &[
                ("flanker_arrows.a.txt", FLANKER_P1),
                ("flanker_arrows.b.txt", FLANKER_P2),
            ],
        );
        let out = tempfile::tempdir().unwrap();

        let report = extract_results(input.path(), out.path()).unwrap();

        assert_eq!(report.summary.dropped_rows, 1);
        assert_eq!(report.summary.renamed_ids.len(), 2);
        let table = read_table(&report.outputs[0]);
        assert_eq!(table["42_1"]["rt_congruent_correct"], "350.0");
        assert_eq!(table["42_2"]["rt_congruent_correct"], "500.0");
    }

    #[test]
    fn test_custom_participant_label_and_extension() {
        let input = results_dir(
            "vp_1,flanker_arrows_1\np1,flanker_arrows.a.txt\n",
            &[("flanker_arrows.a.txt", FLANKER_P1)],
        );
        let out = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(
            ExtractConfig::default()
                .with_participant_id_prefix("vp")
                .with_output_extension("txt"),
        );

        let report = extractor.extract_dir(input.path(), out.path()).unwrap();
        assert_eq!(report.outputs, vec![out.path().join("flanker_arrows.txt")]);
    }

    #[test]
    fn test_report_serializes() {
        let input = two_participant_flanker();
        let out = tempfile::tempdir().unwrap();
        let report = extract_results(input.path(), out.path()).unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["producer"], "psytk-extract");
        assert_eq!(json["summary"]["valid_rows"], 2);
        assert!(json["computed_at_utc"].as_str().is_some());
    }
}

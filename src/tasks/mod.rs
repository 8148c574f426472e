//! Task parsers and the task registry
//!
//! Each PsyToolkit experiment writes its own raw text layout. The parsers in
//! this module turn one participant's raw file into a flat [`MetricRecord`],
//! and the registry maps experiment names onto the right parser.

mod digitspan;
mod flanker;
mod nback;
mod stats;

pub use digitspan::{longest_sequence_length, DigitSpanParser, DIGITSPAN_METRICS};
pub use flanker::{FlankerParser, FLANKER_METRICS};
pub use nback::{NBackParser, NBACK_METRICS};

use crate::error::{ExtractError, Result};
use crate::types::MetricRecord;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Trait for raw-result parsers
pub trait TaskParser: Send + Sync {
    /// Fixed set of metric names this parser produces, in column order
    fn metric_names(&self) -> &[&'static str];

    /// Parse the contents of one raw result file
    fn parse(&self, raw: &str) -> Result<MetricRecord>;

    /// Read and parse a raw result file
    fn parse_file(&self, path: &Path) -> Result<MetricRecord> {
        fs::read_to_string(path)
            .map_err(ExtractError::from)
            .and_then(|raw| self.parse(&raw))
            .map_err(|e| e.with_path(path))
    }
}

/// Built-in experiment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Flanker,
    DigitSpan,
    NBack,
}

impl TaskKind {
    /// Built-in kinds in resolution order
    pub const ALL: [TaskKind; 3] = [TaskKind::Flanker, TaskKind::DigitSpan, TaskKind::NBack];

    /// Experiment-name prefix that selects this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            TaskKind::Flanker => "flanker_arrows",
            TaskKind::DigitSpan => "digitspan",
            TaskKind::NBack => "nback",
        }
    }

    /// Classify an experiment name; the first kind whose prefix matches wins
    pub fn classify(task_name: &str) -> Result<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| task_name.starts_with(kind.prefix()))
            .ok_or_else(|| ExtractError::UnrecognizedTask(task_name.to_string()))
    }

    fn parser(&self) -> &'static dyn TaskParser {
        match self {
            TaskKind::Flanker => &FlankerParser,
            TaskKind::DigitSpan => &DigitSpanParser,
            TaskKind::NBack => &NBackParser,
        }
    }
}

impl TaskParser for TaskKind {
    fn metric_names(&self) -> &[&'static str] {
        self.parser().metric_names()
    }

    fn parse(&self, raw: &str) -> Result<MetricRecord> {
        self.parser().parse(raw)
    }
}

struct RegistryEntry {
    prefix: String,
    parser: Box<dyn TaskParser>,
}

/// Ordered prefix → parser table.
///
/// The default registry holds the three built-in kinds. Callers can append
/// their own parsers; lookups take the first registered prefix that matches,
/// so prefixes should not overlap.
pub struct TaskRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in TaskKind::ALL {
            registry.register(kind.prefix(), kind);
        }
        registry
    }
}

impl TaskRegistry {
    /// Registry with no parsers
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a parser for experiment names starting with `prefix`
    pub fn register(
        &mut self,
        prefix: impl Into<String>,
        parser: impl TaskParser + 'static,
    ) -> &mut Self {
        self.entries.push(RegistryEntry {
            prefix: prefix.into(),
            parser: Box::new(parser),
        });
        self
    }

    /// Find the parser for an experiment name
    pub fn resolve(&self, task_name: &str) -> Result<&dyn TaskParser> {
        self.entries
            .iter()
            .find(|entry| task_name.starts_with(&entry.prefix))
            .map(|entry| entry.parser.as_ref())
            .ok_or_else(|| ExtractError::UnrecognizedTask(task_name.to_string()))
    }

    /// Registered prefixes with their metric schemas, in resolution order
    pub fn schemas(&self) -> impl Iterator<Item = (&str, &[&'static str])> {
        self.entries
            .iter()
            .map(|entry| (entry.prefix.as_str(), entry.parser.metric_names()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricValue;

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(TaskKind::classify("flanker_arrows_1").unwrap(), TaskKind::Flanker);
        assert_eq!(TaskKind::classify("digitspan").unwrap(), TaskKind::DigitSpan);
        assert_eq!(TaskKind::classify("nback2").unwrap(), TaskKind::NBack);
    }

    #[test]
    fn test_classify_unknown_task() {
        let err = TaskKind::classify("unknown_task_1").unwrap_err();
        assert!(matches!(err, ExtractError::UnrecognizedTask(ref name) if name == "unknown_task_1"));
        // prefix must match at the start
        assert!(TaskKind::classify("my_nback").is_err());
    }

    #[test]
    fn test_default_registry_resolves_builtins() {
        let registry = TaskRegistry::default();
        let parser = registry.resolve("nback2").unwrap();
        assert_eq!(parser.metric_names(), NBACK_METRICS);

        let prefixes: Vec<&str> = registry.schemas().map(|(p, _)| p).collect();
        assert_eq!(prefixes, vec!["flanker_arrows", "digitspan", "nback"]);
    }

    #[test]
    fn test_registry_unknown_task() {
        let registry = TaskRegistry::default();
        assert!(matches!(
            registry.resolve("stroop_1"),
            Err(ExtractError::UnrecognizedTask(_))
        ));
    }

    struct LineCounter;

    impl TaskParser for LineCounter {
        fn metric_names(&self) -> &[&'static str] {
            &["n_lines"]
        }

        fn parse(&self, raw: &str) -> Result<MetricRecord> {
            let mut record = MetricRecord::new();
            record.insert("n_lines", raw.lines().count());
            Ok(record)
        }
    }

    #[test]
    fn test_custom_parser_registration() {
        let mut registry = TaskRegistry::default();
        registry.register("stroop", LineCounter);

        let record = registry.resolve("stroop_1").unwrap().parse("a\nb\n").unwrap();
        assert_eq!(record.get("n_lines"), Some(&MetricValue::Integer(2)));
    }

    #[test]
    fn test_first_registered_prefix_wins() {
        let mut registry = TaskRegistry::empty();
        registry.register("nback", LineCounter);
        registry.register("nback2", TaskKind::NBack);

        let parser = registry.resolve("nback2_1").unwrap();
        assert_eq!(parser.metric_names(), &["n_lines"]);
    }

    #[test]
    fn test_parse_file_attaches_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        fs::write(&path, "s 1 1\n").unwrap();

        let err = TaskKind::Flanker.parse_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::FileParseError { ref path, .. } if path.ends_with("broken.txt")));
    }

    #[test]
    fn test_parse_file_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flanker_arrows.MISSING.txt");

        let err = TaskKind::Flanker.parse_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::RawFileRead { .. }));
        assert!(err.to_string().contains("flanker_arrows.MISSING.txt"));
    }

    #[test]
    fn test_parse_file_empty_partition_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flanker_arrows.b.txt");
        fs::write(&path, "left 1 1 500
").unwrap();

        let err = TaskKind::Flanker.parse_file(&path).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("flanker_arrows.b.txt"));
        assert!(message.contains("accuracy_incongruent"));
    }
}

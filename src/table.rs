//! Per-task aggregated tables
//!
//! Parsing yields participant → task → metric. Output is organised the other
//! way round: one table per task, one column per metric, one row per
//! participant. [`pivot`] performs that inversion and [`unpivot`] undoes it.

use crate::error::Result;
use crate::types::{MetricRecord, MetricValue, ParticipantId, TaskName};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the identifier column in every output table
pub const PARTICIPANT_ID_COLUMN: &str = "participant_id";

/// Parsed results per participant, in participant order
pub type ParticipantResults = Vec<(ParticipantId, BTreeMap<TaskName, MetricRecord>)>;

/// One metric's values, aligned with the table's participant rows
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    pub name: String,
    pub values: Vec<MetricValue>,
}

/// Aggregated results of one task
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    task: TaskName,
    participants: Vec<ParticipantId>,
    columns: Vec<MetricColumn>,
}

impl AggregatedTable {
    /// Empty table: every cell starts out missing
    fn with_shape(task: TaskName, participants: Vec<ParticipantId>, metrics: Vec<String>) -> Self {
        let columns = metrics
            .into_iter()
            .map(|name| MetricColumn {
                name,
                values: vec![MetricValue::Missing; participants.len()],
            })
            .collect();
        Self {
            task,
            participants,
            columns,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Value of one cell
    pub fn value(&self, participant: &str, metric: &str) -> Option<&MetricValue> {
        let row = self.participants.iter().position(|p| p == participant)?;
        self.columns
            .iter()
            .find(|c| c.name == metric)
            .map(|c| &c.values[row])
    }

    /// Row `idx` as a metric record
    pub(crate) fn row(&self, idx: usize) -> MetricRecord {
        let mut record = MetricRecord::new();
        for column in &self.columns {
            record.insert(column.name.clone(), column.values[idx]);
        }
        record
    }

    /// Write the table as comma-separated values with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header = vec![PARTICIPANT_ID_COLUMN.to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        csv_writer.write_record(&header)?;

        for (idx, participant) in self.participants.iter().enumerate() {
            let mut row = Vec::with_capacity(self.columns.len() + 1);
            row.push(participant.clone());
            row.extend(self.columns.iter().map(|c| c.values[idx].to_string()));
            csv_writer.write_record(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the table to `<dir>/<task>.<extension>`
    pub fn write_to_dir(&self, dir: &Path, extension: &str) -> Result<PathBuf> {
        let path = dir.join(format!("{}.{}", self.task, extension));
        let file = fs::File::create(&path)?;
        self.write_csv(file)?;
        Ok(path)
    }
}

/// Metric columns per task, in column order
pub type TaskSchemas = BTreeMap<TaskName, Vec<String>>;

/// Invert participant → task → metric into one table per task.
///
/// Every task in `schemas` gets a table and every participant a row in it.
/// Columns follow the task's schema, so a task without any parsed record
/// still carries its full header. Metrics missing from the schema are
/// appended in the order they are first seen.
pub fn pivot(
    results: &ParticipantResults,
    schemas: &TaskSchemas,
) -> BTreeMap<TaskName, AggregatedTable> {
    let participants: Vec<ParticipantId> = results.iter().map(|(id, _)| id.clone()).collect();

    schemas
        .iter()
        .map(|(task, schema)| {
            let mut metrics = schema.clone();
            for (_, records) in results {
                if let Some(record) = records.get(task) {
                    for name in record.names() {
                        if !metrics.iter().any(|m| m == name) {
                            metrics.push(name.to_string());
                        }
                    }
                }
            }
            let column_of: HashMap<String, usize> = metrics
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.clone(), idx))
                .collect();

            let mut table = AggregatedTable::with_shape(task.clone(), participants.clone(), metrics);
            for (row, (_, records)) in results.iter().enumerate() {
                let Some(record) = records.get(task) else {
                    continue;
                };
                for (name, value) in record.iter() {
                    let col = column_of[name];
                    table.columns[col].values[row] = *value;
                }
            }
            (task.clone(), table)
        })
        .collect()
}

/// Rebuild participant → task → metric from per-task tables.
///
/// Rows whose cells are all missing are treated as absent.
pub fn unpivot(tables: &BTreeMap<TaskName, AggregatedTable>) -> ParticipantResults {
    let mut results: ParticipantResults = Vec::new();
    for (task, table) in tables {
        for (idx, participant) in table.participants.iter().enumerate() {
            let record = table.row(idx);
            if record.iter().all(|(_, v)| v.is_missing()) {
                continue;
            }
            let slot = match results.iter().position(|(id, _)| id == participant) {
                Some(pos) => pos,
                None => {
                    results.push((participant.clone(), BTreeMap::new()));
                    results.len() - 1
                }
            };
            results[slot].1.insert(task.clone(), record);
        }
    }
    results
}

//! Participant file resolution
//!
//! Reads the `data.csv` summary table of an extracted results bundle and maps
//! every participant onto the raw result file of each experiment found in
//! `experiment_data/`.

use crate::error::{ExtractError, Result};
use crate::types::{ParticipantId, TaskName};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary table file name inside the results directory
pub const SUMMARY_FILE: &str = "data.csv";

/// Subdirectory holding one raw file per participant per experiment
pub const RAW_DATA_DIR: &str = "experiment_data";

/// Default label of the participant-identifier survey question
pub const DEFAULT_PARTICIPANT_ID_PREFIX: &str = "versuchspersonenkennung";

/// Summary columns are named `<label>_1`
const COLUMN_SUFFIX: &str = "_1";

/// Upper bound on duplicate-renaming passes
const MAX_RENAME_PASSES: usize = 32;

/// Cell contents treated as missing, matching common CSV exporters
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Summary column name for a survey label or experiment name
pub fn summary_column(label: &str) -> String {
    format!("{}{}", label, COLUMN_SUFFIX)
}

/// Distinct experiment names in the raw data directory (file name up to the first dot)
pub fn list_task_names(raw_dir: &Path) -> Result<BTreeSet<TaskName>> {
    if !raw_dir.is_dir() {
        return Err(ExtractError::MalformedInput(format!(
            "raw data directory not found: {}",
            raw_dir.display()
        )));
    }

    let mut names = BTreeSet::new();
    for entry in fs::read_dir(raw_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(stem) = file_name.split('.').next().filter(|s| !s.is_empty()) {
            names.insert(stem.to_string());
        }
    }
    debug!(count = names.len(), "Discovered experiment names");
    Ok(names)
}

/// The summary table with missing cells already recognised
#[derive(Debug, Clone)]
pub struct SummaryTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl SummaryTable {
    /// Load a comma-delimited summary table with a header row
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ExtractError::MalformedInput(format!(
                "summary table not found: {}",
                path.display()
            )));
        }
        Self::from_reader(fs::File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            // Short rows are padded with missing cells
            let row = (0..headers.len())
                .map(|idx| record.get(idx).and_then(parse_cell))
                .collect();
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ExtractError::MissingColumn(name.to_string()))
    }
}

fn parse_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NA_VALUES.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A participant id that was renamed to resolve a collision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedId {
    pub original: ParticipantId,
    pub renamed: ParticipantId,
}

/// Data-quality figures gathered while resolving
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub dropped_rows: usize,
    pub renamed_ids: Vec<RenamedId>,
}

/// Participant → experiment → raw result file, in summary-table row order
#[derive(Debug, Clone)]
pub struct ParticipantFileIndex {
    entries: Vec<(ParticipantId, BTreeMap<TaskName, PathBuf>)>,
    positions: HashMap<ParticipantId, usize>,
    tasks: BTreeSet<TaskName>,
    stats: SummaryStats,
}

impl ParticipantFileIndex {
    /// Participants with their raw files, in row order
    pub fn participants(&self) -> impl Iterator<Item = (&str, &BTreeMap<TaskName, PathBuf>)> {
        self.entries.iter().map(|(id, files)| (id.as_str(), files))
    }

    pub fn get(&self, participant: &str) -> Option<&BTreeMap<TaskName, PathBuf>> {
        self.positions
            .get(participant)
            .map(|&idx| &self.entries[idx].1)
    }

    pub fn tasks(&self) -> &BTreeSet<TaskName> {
        &self.tasks
    }

    pub fn stats(&self) -> &SummaryStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve an extracted results directory into a participant file index
pub fn resolve_participant_files(
    root: &Path,
    participant_id_prefix: &str,
) -> Result<ParticipantFileIndex> {
    let raw_dir = root.join(RAW_DATA_DIR);
    let tasks = list_task_names(&raw_dir)?;
    info!(tasks = ?tasks, "Found experiments");

    let table = SummaryTable::from_path(&root.join(SUMMARY_FILE))?;
    build_index(&table, tasks, &raw_dir, participant_id_prefix)
}

/// Build the index from an already loaded summary table
pub fn build_index(
    table: &SummaryTable,
    tasks: BTreeSet<TaskName>,
    raw_dir: &Path,
    participant_id_prefix: &str,
) -> Result<ParticipantFileIndex> {
    let id_column = table.column_index(&summary_column(participant_id_prefix))?;
    let task_columns: Vec<(&TaskName, usize)> = tasks
        .iter()
        .map(|task| -> Result<(&TaskName, usize)> {
            Ok((task, table.column_index(&summary_column(task))?))
        })
        .collect::<Result<_>>()?;

    let complete_rows: Vec<&Vec<Option<String>>> = table
        .rows
        .iter()
        .filter(|row| row.iter().all(Option::is_some))
        .collect();
    let total_rows = table.row_count();
    let dropped_rows = total_rows - complete_rows.len();
    if dropped_rows > 0 {
        warn!(
            dropped = dropped_rows,
            total = total_rows,
            "Dropped {} of {} summary rows with missing values",
            dropped_rows,
            total_rows
        );
    }

    let raw_ids: Vec<ParticipantId> = complete_rows
        .iter()
        .map(|row| row[id_column].clone().unwrap_or_default())
        .collect();
    let (ids, renamed_ids) = deduplicate_ids(raw_ids)?;

    let mut entries = Vec::with_capacity(complete_rows.len());
    for (id, row) in ids.into_iter().zip(complete_rows) {
        let files = task_columns
            .iter()
            .map(|(task, idx)| {
                let file_name = row[*idx].as_deref().unwrap_or_default();
                ((*task).clone(), raw_dir.join(file_name))
            })
            .collect();
        entries.push((id, files));
    }

    let stats = SummaryStats {
        total_rows,
        valid_rows: entries.len(),
        dropped_rows,
        renamed_ids,
    };
    let positions = entries
        .iter()
        .enumerate()
        .map(|(idx, (id, _))| (id.clone(), idx))
        .collect();
    Ok(ParticipantFileIndex {
        entries,
        positions,
        tasks,
        stats,
    })
}

/// Make participant ids unique.
///
/// Every id occurring k ≥ 2 times gets `_1` … `_k` appended in row order. A
/// renamed id can collide with an existing one, so passes repeat until the
/// ids are distinct.
pub fn deduplicate_ids(
    ids: Vec<ParticipantId>,
) -> Result<(Vec<ParticipantId>, Vec<RenamedId>)> {
    let originals = ids.clone();
    let mut ids = ids;

    for _ in 0..MAX_RENAME_PASSES {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in &ids {
            *counts.entry(id.as_str()).or_default() += 1;
        }
        let duplicated: HashSet<String> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id.to_string())
            .collect();

        if duplicated.is_empty() {
            let renamed = originals
                .into_iter()
                .zip(ids.iter())
                .filter(|(original, current)| original != *current)
                .map(|(original, current)| RenamedId {
                    original,
                    renamed: current.clone(),
                })
                .collect();
            return Ok((ids, renamed));
        }

        warn!(
            duplicated = ?duplicated,
            "Found duplicate participant ids, appending occurrence suffixes"
        );
        let mut seen: HashMap<String, usize> = HashMap::new();
        for id in ids.iter_mut() {
            if duplicated.contains(id.as_str()) {
                let occurrence = seen.entry(id.clone()).or_default();
                *occurrence += 1;
                *id = format!("{}_{}", id, occurrence);
            }
        }
    }

    Err(ExtractError::DuplicateResolution(format!(
        "ids still collide after {} renaming passes",
        MAX_RENAME_PASSES
    )))
}

//! Run configuration

use crate::resolver::DEFAULT_PARTICIPANT_ID_PREFIX;
use serde::{Deserialize, Serialize};

/// Default extension of the per-task output tables
pub const DEFAULT_OUTPUT_EXTENSION: &str = "csv";

/// What to do when one participant's raw file fails to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure
    #[default]
    Abort,
    /// Log the failure, leave that participant's cells empty and continue
    Skip,
}

/// Configuration for an extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Label of the participant-id question; the summary column is `<label>_1`
    pub participant_id_prefix: String,
    pub failure_policy: FailurePolicy,
    /// File extension of the written tables, without the dot
    pub output_extension: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            participant_id_prefix: DEFAULT_PARTICIPANT_ID_PREFIX.to_string(),
            failure_policy: FailurePolicy::Abort,
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
        }
    }
}

impl ExtractConfig {
    pub fn with_participant_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.participant_id_prefix = prefix.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_output_extension(mut self, extension: impl Into<String>) -> Self {
        self.output_extension = extension.into().trim_start_matches('.').to_string();
        self
    }
}

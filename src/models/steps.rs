use serde::{Deserialize, Serialize};

use super::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Images,
    Product,
    Variations,
    Prices,
    Stock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Active,
    Completed,
    Error,
}

/// One entry in the ordered progress record of a sync run. The sequence is
/// built incrementally and returned to the trigger caller even when the run
/// fails partway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStep {
    pub name: StepName,
    pub status: StepStatus,
    pub message: String,
}

impl SyncStep {
    pub fn active(name: StepName, message: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Active,
            message: message.into(),
        }
    }

    pub fn completed(name: StepName, message: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Completed,
            message: message.into(),
        }
    }

    pub fn error(name: StepName, message: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
    StockUpdated,
}

/// Successful outcome of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub action: SyncAction,
    pub steps: Vec<SyncStep>,
}

/// Failed outcome: a short message plus whatever steps completed before the
/// failure. Partial progress is always visible to the caller.
#[derive(Debug)]
pub struct SyncFailure {
    pub error: SyncError,
    pub steps: Vec<SyncStep>,
}

impl SyncFailure {
    pub fn new(error: SyncError, steps: Vec<SyncStep>) -> Self {
        Self { error, steps }
    }

    pub fn message(&self) -> String {
        self.error.user_message()
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

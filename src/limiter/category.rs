//! Operation categories used by the admission controller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rate-limit class of an upstream operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    Read,
    Create,
    Update,
    Delete,
    Batch,
    Admin,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 6] = [
        OperationCategory::Read,
        OperationCategory::Create,
        OperationCategory::Update,
        OperationCategory::Delete,
        OperationCategory::Batch,
        OperationCategory::Admin,
    ];

    /// Classify an operation by substring of its name, first match wins.
    ///
    /// Unrecognised names are treated as `Create`, the most restrictive of the
    /// single-record write categories.
    pub fn classify(operation: &str) -> Self {
        let name = operation.to_ascii_lowercase();
        let has = |patterns: &[&str]| patterns.iter().any(|p| name.contains(p));

        if has(&["batch", "csv"]) {
            OperationCategory::Batch
        } else if has(&["delete"]) {
            OperationCategory::Delete
        } else if has(&["create"]) {
            OperationCategory::Create
        } else if has(&["update"]) {
            OperationCategory::Update
        } else if has(&["get", "list", "search"]) {
            OperationCategory::Read
        } else if has(&["health", "cache", "metrics"]) {
            OperationCategory::Admin
        } else {
            OperationCategory::Create
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCategory::Read => "read",
            OperationCategory::Create => "create",
            OperationCategory::Update => "update",
            OperationCategory::Delete => "delete",
            OperationCategory::Batch => "batch",
            OperationCategory::Admin => "admin",
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Build lifecycle events as published by Cloud Build.
//!
//! The notifier only reads these values; it never constructs or mutates them
//! outside of tests and smoke runs. Field names follow the Cloud Build JSON
//! representation (camelCase). Every field is optional on the wire: protobuf
//! JSON omits zero values, so a `STATUS_UNKNOWN` build arrives without a
//! `status` at all.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Substitution key carrying the deployed service name.
pub const SERVICE_NAME_KEY: &str = "_SERVICE_NAME";
/// Substitution key carrying the source repository name.
pub const REPO_NAME_KEY: &str = "REPO_NAME";
/// Substitution key carrying the trigger name.
pub const TRIGGER_NAME_KEY: &str = "TRIGGER_NAME";
/// Substitution key carrying the project id.
pub const PROJECT_ID_KEY: &str = "PROJECT_ID";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a build.
///
/// Values the notifier does not know are preserved in [`BuildStatus::Other`]
/// so they can be logged and matched by filter expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    #[default]
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    Other(String),
}

impl BuildStatus {
    /// Returns the wire name of the status (e.g. `"INTERNAL_ERROR"`).
    pub fn as_str(&self) -> &str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for the statuses reported as build errors.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure | Self::InternalError | Self::Timeout)
    }
}

impl From<&str> for BuildStatus {
    fn from(name: &str) -> Self {
        match name {
            "STATUS_UNKNOWN" => Self::StatusUnknown,
            "PENDING" => Self::Pending,
            "QUEUED" => Self::Queued,
            "WORKING" => Self::Working,
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "INTERNAL_ERROR" => Self::InternalError,
            "TIMEOUT" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            "EXPIRED" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BuildStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BuildStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Source reference
// ---------------------------------------------------------------------------

/// Where the build's sources came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_source: Option<RepoSource>,
}

/// A Cloud Source Repositories (or mirrored) repository reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSource {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single build lifecycle notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub status: BuildStatus,

    #[serde(default)]
    pub log_url: String,

    /// User-defined and built-in substitutions (`_SERVICE_NAME`, `REPO_NAME`, ...).
    #[serde(default)]
    pub substitutions: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_trigger_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BuildSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
}

impl BuildEvent {
    /// Returns the substitution value for `key`, or `""` when absent.
    pub fn substitution(&self, key: &str) -> &str {
        self.substitutions.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Returns the `_SERVICE_NAME` substitution, or `""` when absent.
    pub fn service_name(&self) -> &str {
        self.substitution(SERVICE_NAME_KEY)
    }

    /// Returns the source repository name.
    ///
    /// Prefers the `REPO_NAME` substitution and falls back to the structured
    /// `source.repoSource.repoName` reference.
    pub fn repo_name(&self) -> &str {
        let name = self.substitution(REPO_NAME_KEY);
        if !name.is_empty() {
            return name;
        }
        self.source
            .as_ref()
            .and_then(|s| s.repo_source.as_ref())
            .map(|r| r.repo_name.as_str())
            .unwrap_or_default()
    }

    /// Returns the `TRIGGER_NAME` substitution, or `""` when absent.
    pub fn trigger_name(&self) -> &str {
        self.substitution(TRIGGER_NAME_KEY)
    }

    /// Returns the `PROJECT_ID` substitution, falling back to the event's
    /// own project id.
    pub fn project(&self) -> &str {
        let project = self.substitution(PROJECT_ID_KEY);
        if project.is_empty() {
            &self.project_id
        } else {
            project
        }
    }
}

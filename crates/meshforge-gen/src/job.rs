//! Canonical job and balance entities
//!
//! These types are backend-agnostic: every provider normalizes its own task
//! representation into a [`Job`] so callers never see wire formats.

use meshforge_core::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of job kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    #[serde(rename = "text-to-3d")]
    TextTo3d,
    #[serde(rename = "image-to-3d")]
    ImageTo3d,
    #[serde(rename = "multi-image-to-3d")]
    MultiImageTo3d,
    Remesh,
    Retexture,
    Rig,
    Animate,
}

impl JobKind {
    /// Every kind, in tool-listing order
    pub const ALL: [JobKind; 7] = [
        JobKind::TextTo3d,
        JobKind::ImageTo3d,
        JobKind::MultiImageTo3d,
        JobKind::Remesh,
        JobKind::Retexture,
        JobKind::Rig,
        JobKind::Animate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::TextTo3d => "text-to-3d",
            JobKind::ImageTo3d => "image-to-3d",
            JobKind::MultiImageTo3d => "multi-image-to-3d",
            JobKind::Remesh => "remesh",
            JobKind::Retexture => "retexture",
            JobKind::Rig => "rig",
            JobKind::Animate => "animate",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ForgeError::UnknownTaskType(s.to_string()))
    }
}

/// Backend-agnostic status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Balance observations around a job submission.
///
/// Only `before` is populated today; `after` and `delta` are reserved until a
/// second observation point exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCredits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

/// Artifacts produced by a job, independent of its kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutputs {
    /// Model URLs keyed by format (glb, fbx, obj, ...)
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    /// Texture URLs keyed by channel (base_color, normal, ...)
    #[serde(default)]
    pub textures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    /// Rigged character URLs keyed by format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rigging: Option<BTreeMap<String, String>>,
    /// Stock clips delivered with a rig, keyed by clip and format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_animations: Option<BTreeMap<String, String>>,
    /// Animation URLs keyed by format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<BTreeMap<String, String>>,
}

/// A canonical asynchronous generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Backend-assigned task ID
    pub id: String,
    /// Backend that produced this job
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    /// Progress percentage (0-100), a hint only
    pub progress: u8,
    /// Epoch milliseconds
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub credits: JobCredits,
    /// Submitted parameters; backends do not echo them, so this stays empty
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: JobOutputs,
    /// Backend message, present only when `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A point-in-time credit balance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub balance: f64,
    /// Epoch milliseconds when the balance was read
    pub timestamp: i64,
}

impl CreditBalance {
    /// Snapshot a balance at the current time
    pub fn now(balance: f64) -> Self {
        Self {
            balance,
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

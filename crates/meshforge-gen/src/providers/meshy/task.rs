//! Meshy task wire format and its normalization into [`Job`]
//!
//! Normalization is a pure function of the raw task, the kind it was looked
//! up under, and the optional balance read before submission.

use crate::job::{Job, JobCredits, JobKind, JobOutputs, JobStatus};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

pub const PROVIDER_NAME: &str = "meshy";

/// A task exactly as the Meshy API returns it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTask {
    pub id: String,
    /// Backend task type, e.g. `text-to-3d-preview`
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    /// `PENDING`, `IN_PROGRESS`, `SUCCEEDED`, `FAILED`, `CANCELED`, or
    /// anything the backend adds later
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub task_error: Option<RawTaskError>,
    #[serde(default)]
    pub model_urls: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub texture_urls: Option<Vec<BTreeMap<String, Option<String>>>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// Rigging and animation results
    #[serde(default)]
    pub result: Option<RawTaskResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTaskError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTaskResult {
    #[serde(default)]
    pub rigged_character_fbx_url: Option<String>,
    #[serde(default)]
    pub rigged_character_glb_url: Option<String>,
    #[serde(default)]
    pub basic_animations: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub animation_glb_url: Option<String>,
    #[serde(default)]
    pub animation_fbx_url: Option<String>,
    #[serde(default)]
    pub processed_usdz_url: Option<String>,
    #[serde(default)]
    pub processed_armature_fbx_url: Option<String>,
    #[serde(default)]
    pub processed_animation_fps_fbx_url: Option<String>,
}

impl RawTask {
    pub fn status(&self) -> JobStatus {
        map_status(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Read an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Map a Meshy status string. Unknown values read as `Pending`, since a false
/// "still working" is recoverable and a false "done" is not.
pub fn map_status(raw: &str) -> JobStatus {
    match raw {
        "PENDING" => JobStatus::Pending,
        "IN_PROGRESS" => JobStatus::InProgress,
        "SUCCEEDED" => JobStatus::Succeeded,
        "FAILED" => JobStatus::Failed,
        "CANCELED" => JobStatus::Canceled,
        _ => JobStatus::Pending,
    }
}

/// Build the canonical job for a raw task
pub fn normalize_task(task: &RawTask, kind: JobKind, balance_before: Option<f64>) -> Job {
    let status = task.status();

    let error = (status == JobStatus::Failed).then(|| {
        task.task_error
            .as_ref()
            .map(|e| e.message.trim())
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    });

    Job {
        id: task.id.clone(),
        provider: PROVIDER_NAME.to_string(),
        kind,
        status,
        progress: task.progress.clamp(0, 100) as u8,
        created_at: task.created_at,
        started_at: reached(task.started_at),
        finished_at: reached(task.finished_at),
        expires_at: reached(task.expires_at),
        credits: JobCredits {
            before: balance_before,
            ..Default::default()
        },
        inputs: Default::default(),
        outputs: collect_outputs(task),
        error,
    }
}

fn collect_outputs(task: &RawTask) -> JobOutputs {
    let mut outputs = JobOutputs {
        thumbnail: task.thumbnail_url.clone(),
        video: task.video_url.clone(),
        ..Default::default()
    };

    if let Some(models) = &task.model_urls {
        outputs.models = present(models);
    }

    // One texture set per task revision; later entries are dropped
    if let Some(first) = task.texture_urls.as_ref().and_then(|t| t.first()) {
        outputs.textures = present(first);
    }

    if let Some(result) = &task.result {
        outputs.rigging = by_format(&[
            ("fbx", &result.rigged_character_fbx_url),
            ("glb", &result.rigged_character_glb_url),
        ]);

        if outputs.rigging.is_some() {
            outputs.basic_animations = result
                .basic_animations
                .as_ref()
                .map(|clips| {
                    present(clips)
                        .into_iter()
                        .map(|(name, url)| {
                            let name = name.strip_suffix("_url").unwrap_or(&name).to_string();
                            (name, url)
                        })
                        .collect::<BTreeMap<_, _>>()
                })
                .filter(|clips| !clips.is_empty());
        }

        if result.animation_fbx_url.is_some() || result.animation_glb_url.is_some() {
            outputs.animation = by_format(&[
                ("fbx", &result.animation_fbx_url),
                ("glb", &result.animation_glb_url),
                ("usdz", &result.processed_usdz_url),
                ("armature_fbx", &result.processed_armature_fbx_url),
                ("animation_fps_fbx", &result.processed_animation_fps_fbx_url),
            ]);
        }
    }

    outputs
}

fn present(urls: &BTreeMap<String, Option<String>>) -> BTreeMap<String, String> {
    urls.iter()
        .filter_map(|(key, url)| url.as_ref().map(|u| (key.clone(), u.clone())))
        .collect()
}

fn by_format(entries: &[(&str, &Option<String>)]) -> Option<BTreeMap<String, String>> {
    let map: BTreeMap<String, String> = entries
        .iter()
        .filter_map(|(format, url)| url.as_ref().map(|u| (format.to_string(), u.clone())))
        .collect();
    (!map.is_empty()).then_some(map)
}

/// Meshy reports unreached timestamps as 0
fn reached(timestamp: Option<i64>) -> Option<i64> {
    timestamp.filter(|t| *t > 0)
}

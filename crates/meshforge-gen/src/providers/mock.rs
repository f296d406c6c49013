//! Mock provider for testing
//!
//! Completes every job instantly with placeholder `mock://` URLs, without any
//! network calls. Like the real backends it keeps no job registry: lookups
//! rebuild the job from its ID and kind.

use crate::job::{now_millis, CreditBalance, Job, JobCredits, JobKind, JobOutputs, JobStatus};
use crate::params::JobParams;
use crate::provider::{AssetProvider, ErrorFn, Subscription, UpdateFn};
use meshforge_core::{ForgeError, Result};
use std::collections::BTreeMap;

const MOCK_BALANCE: f64 = 1000.0;

/// A provider that answers every call locally
#[derive(Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AssetProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn get_balance(&self) -> Result<CreditBalance> {
        Ok(CreditBalance::now(MOCK_BALANCE))
    }

    fn create_job(&self, params: JobParams) -> Result<Job> {
        params.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut job = mock_job(&id, params.kind());
        job.credits.before = Some(MOCK_BALANCE);
        Ok(job)
    }

    fn get_job(&self, job_id: &str, kind: Option<JobKind>) -> Result<Job> {
        let kind = kind.ok_or(ForgeError::MissingKind)?;
        Ok(mock_job(job_id, kind))
    }

    fn stream_job(
        &self,
        job_id: &str,
        kind: Option<JobKind>,
        mut on_update: UpdateFn,
        mut on_error: ErrorFn,
    ) -> Subscription {
        let Some(kind) = kind else {
            on_error(ForgeError::MissingKind);
            return Subscription::inactive();
        };

        let job = mock_job(job_id, kind);
        Subscription::spawn(format!("mock-stream-{}", job_id), move |control| {
            control.deliver(|| on_update(job));
        })
    }
}

/// A finished job carrying the outputs its kind would produce
fn mock_job(id: &str, kind: JobKind) -> Job {
    let now = now_millis();
    let url = |file: &str| format!("mock://{}/{}", id, file);
    let single = |format: &str, file: &str| BTreeMap::from([(format.to_string(), url(file))]);

    let mut outputs = JobOutputs {
        thumbnail: Some(url("preview.png")),
        ..Default::default()
    };
    match kind {
        JobKind::Rig => {
            outputs.rigging = Some(single("glb", "rigged.glb"));
        }
        JobKind::Animate => {
            outputs.animation = Some(single("glb", "animation.glb"));
        }
        JobKind::Retexture => {
            outputs.models = single("glb", "model.glb");
            outputs.textures = single("base_color", "base_color.png");
        }
        JobKind::TextTo3d | JobKind::ImageTo3d | JobKind::MultiImageTo3d | JobKind::Remesh => {
            outputs.models = single("glb", "model.glb");
        }
    }

    Job {
        id: id.to_string(),
        provider: "mock".to_string(),
        kind,
        status: JobStatus::Succeeded,
        progress: 100,
        created_at: now,
        started_at: Some(now),
        finished_at: Some(now),
        expires_at: None,
        credits: JobCredits::default(),
        inputs: Default::default(),
        outputs,
        error: None,
    }
}

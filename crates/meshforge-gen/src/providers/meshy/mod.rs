//! Meshy 3D generation provider
//!
//! Covers every Meshy job kind: text-to-3d (v2, preview and refine),
//! image-to-3d, multi-image-to-3d, remesh, retexture, rigging and animation
//! (v1). Jobs are long-running (~1-5 min); callers either poll `get_job` or
//! subscribe with `stream_job`.

pub mod client;
pub mod task;

pub use client::{endpoint, MeshyClient, TaskTransport};
pub use task::{map_status, normalize_task, RawTask};

use crate::config::ForgeConfig;
use crate::job::{CreditBalance, Job, JobKind};
use crate::params::JobParams;
use crate::provider::{AssetProvider, ErrorFn, StreamControl, Subscription, UpdateFn};
use crate::stream::EventReader;
use meshforge_core::{ForgeError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Meshy provider composing a transport with the task normalizer
pub struct MeshyProvider<T: TaskTransport = MeshyClient> {
    transport: Arc<T>,
}

impl MeshyProvider<MeshyClient> {
    /// Create a new MeshyProvider from config
    pub fn from_config(config: &ForgeConfig) -> Result<Self> {
        let api_key = config.api_key("meshy").ok_or_else(|| {
            ForgeError::Config(
                "Meshy API key not configured. Set MESHY_API_KEY or add to .meshforge/config.toml"
                    .to_string(),
            )
        })?;

        let api_url = config
            .api_url("meshy")
            .unwrap_or(client::DEFAULT_MESHY_URL);

        let timeout = Duration::from_secs(config.defaults.request_timeout_secs);
        Ok(Self::with_transport(MeshyClient::new(api_key, api_url, timeout)))
    }
}

impl<T: TaskTransport> MeshyProvider<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }
}

impl<T: TaskTransport> AssetProvider for MeshyProvider<T> {
    fn name(&self) -> &str {
        task::PROVIDER_NAME
    }

    fn get_balance(&self) -> Result<CreditBalance> {
        let balance = self.transport.balance()?;
        Ok(CreditBalance::now(balance))
    }

    fn create_job(&self, params: JobParams) -> Result<Job> {
        let kind = params.kind();
        let balance_before = self.transport.balance()?;
        let task_id = self.transport.create_task(&params)?;
        tracing::info!(%kind, task_id = %task_id, balance_before, "Submitted Meshy task");

        let task = self.transport.fetch_task(kind, &task_id)?;
        Ok(normalize_task(&task, kind, Some(balance_before)))
    }

    fn get_job(&self, job_id: &str, kind: Option<JobKind>) -> Result<Job> {
        let kind = kind.ok_or(ForgeError::MissingKind)?;
        let task = self.transport.fetch_task(kind, job_id)?;
        Ok(normalize_task(&task, kind, None))
    }

    fn stream_job(
        &self,
        job_id: &str,
        kind: Option<JobKind>,
        on_update: UpdateFn,
        mut on_error: ErrorFn,
    ) -> Subscription {
        let Some(kind) = kind else {
            on_error(ForgeError::MissingKind);
            return Subscription::inactive();
        };

        let transport = Arc::clone(&self.transport);
        let job_id = job_id.to_string();
        let name = format!("meshy-stream-{}", job_id);

        Subscription::spawn(name, move |control| {
            run_stream(&*transport, kind, &job_id, &control, on_update, on_error);
        })
    }
}

/// Forward pushed tasks until a terminal status, an error, cancellation, or
/// the end of the stream. Every callback goes through `control`, so nothing is
/// delivered once the subscription is cancelled.
fn run_stream<T: TaskTransport + ?Sized>(
    transport: &T,
    kind: JobKind,
    job_id: &str,
    control: &StreamControl,
    mut on_update: UpdateFn,
    mut on_error: ErrorFn,
) {
    let body = match transport.open_stream(kind, job_id, control.token()) {
        Ok(body) => body,
        Err(e) => {
            control.deliver(|| on_error(e));
            return;
        }
    };

    for event in EventReader::new(body) {
        if control.is_cancelled() {
            tracing::debug!(job_id, "Stream unsubscribed");
            return;
        }

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Stream connection failed");
                let err = ForgeError::Transport(format!("Stream for {} failed: {}", job_id, e));
                control.deliver(|| on_error(err));
                return;
            }
        };

        if event.is_error() {
            tracing::warn!(job_id, data = %event.data, "Backend reported a stream error");
            control.deliver(|| on_error(ForgeError::StreamPayload(event.data)));
            return;
        }

        let task: RawTask = match serde_json::from_str(&event.data) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Malformed stream payload");
                let err = ForgeError::StreamPayload(format!(
                    "Malformed task payload for {}: {}",
                    job_id, e
                ));
                control.deliver(|| on_error(err));
                return;
            }
        };

        let job = normalize_task(&task, kind, None);
        if !control.deliver(|| on_update(job)) {
            return;
        }
        if task.is_terminal() {
            tracing::debug!(job_id, status = %task.status, "Stream reached terminal status");
            return;
        }
    }

    if control.is_cancelled() {
        tracing::debug!(job_id, "Stream unsubscribed");
        return;
    }
    tracing::warn!(job_id, "Stream closed before a terminal status");
    let err = ForgeError::Transport(format!(
        "Stream for {} closed before a terminal status",
        job_id
    ));
    control.deliver(|| on_error(err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{TextTo3dMode, TextTo3dParams};
    use crate::job::JobStatus;
    use std::collections::VecDeque;
    use std::io::{BufRead, BufReader, Cursor, Read};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// In-memory transport recording every call
    #[derive(Default)]
    struct ScriptedTransport {
        balance: f64,
        calls: Mutex<Vec<String>>,
        submitted: Mutex<Vec<JobParams>>,
        tasks: Mutex<VecDeque<String>>,
        stream_body: String,
        /// When set, the stream stays open after `stream_body` until
        /// cancelled, and the flag records that the body was dropped
        held_open: Option<Arc<AtomicBool>>,
    }

    /// A connection that sends its scripted frames, then waits for more until
    /// cancelled
    struct HeldOpenBody {
        frames: Cursor<Vec<u8>>,
        cancel: CancellationToken,
        released: Arc<AtomicBool>,
    }

    impl Read for HeldOpenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.frames.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            while !self.cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(0)
        }
    }

    impl Drop for HeldOpenBody {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl ScriptedTransport {
        fn with_tasks(tasks: &[&str]) -> Self {
            Self {
                balance: 1000.0,
                tasks: Mutex::new(tasks.iter().map(|t| t.to_string()).collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TaskTransport for ScriptedTransport {
        fn balance(&self) -> Result<f64> {
            self.calls.lock().unwrap().push("balance".to_string());
            Ok(self.balance)
        }

        fn create_task(&self, params: &JobParams) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", endpoint(params.kind())));
            self.submitted.lock().unwrap().push(params.clone());
            Ok("task-new".to_string())
        }

        fn fetch_task(&self, kind: JobKind, task_id: &str) -> Result<RawTask> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fetch {}/{}", endpoint(kind), task_id));
            let json = self
                .tasks
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ForgeError::Transport("no scripted task".to_string()))?;
            Ok(serde_json::from_str(&json)?)
        }

        fn open_stream(
            &self,
            kind: JobKind,
            task_id: &str,
            cancel: CancellationToken,
        ) -> Result<Box<dyn BufRead + Send>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("stream {}/{}/stream", endpoint(kind), task_id));
            let frames = Cursor::new(self.stream_body.clone().into_bytes());
            match &self.held_open {
                Some(released) => Ok(Box::new(BufReader::new(HeldOpenBody {
                    frames,
                    cancel,
                    released: Arc::clone(released),
                }))),
                None => Ok(Box::new(frames)),
            }
        }
    }

    fn collect_stream(
        provider: &MeshyProvider<ScriptedTransport>,
        kind: Option<JobKind>,
    ) -> (Vec<Job>, Vec<ForgeError>) {
        let (job_tx, job_rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();
        let sub = provider.stream_job(
            "task-1",
            kind,
            Box::new(move |job: Job| job_tx.send(job).unwrap()),
            Box::new(move |err: ForgeError| err_tx.send(err).unwrap()),
        );
        sub.wait();
        (job_rx.try_iter().collect(), err_rx.try_iter().collect())
    }

    #[test]
    fn test_rig_end_to_end() {
        let transport = ScriptedTransport::with_tasks(&[
            r#"{"id": "task-new", "type": "rig", "status": "PENDING", "progress": 0, "created_at": 1700000000000}"#,
        ]);
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            balance: 742.0,
            ..transport
        });

        let job = provider
            .create_job_named("rig", serde_json::json!({"input_task_id": "abc", "height_meters": 1.7}))
            .unwrap();

        assert_eq!(job.id, "task-new");
        assert_eq!(job.kind, JobKind::Rig);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.credits.before, Some(742.0));
        assert_eq!(
            provider.transport.calls(),
            vec![
                "balance".to_string(),
                "create /openapi/v1/rigging".to_string(),
                "fetch /openapi/v1/rigging/task-new".to_string(),
            ]
        );
    }

    #[test]
    fn test_refine_and_preview_routing() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::with_tasks(&[
            r#"{"id": "task-new", "status": "PENDING"}"#,
            r#"{"id": "task-new", "status": "PENDING"}"#,
        ]));

        provider
            .create_job_named(
                "text-to-3d",
                serde_json::json!({"mode": "refine", "preview_task_id": "X", "enable_pbr": true}),
            )
            .unwrap();
        provider
            .create_job(JobParams::TextTo3d(TextTo3dParams::preview("a crate")))
            .unwrap();

        let submitted = provider.transport.submitted.lock().unwrap().clone();
        let modes: Vec<_> = submitted
            .iter()
            .map(|p| match p {
                JobParams::TextTo3d(t) => t.mode,
                other => panic!("unexpected params {:?}", other),
            })
            .collect();
        assert_eq!(modes, vec![TextTo3dMode::Refine, TextTo3dMode::Preview]);

        let body = submitted[0].to_body().unwrap();
        assert_eq!(body["mode"], "refine");
        assert_eq!(body["preview_task_id"], "X");
        assert!(provider
            .transport
            .calls()
            .iter()
            .filter(|c| c.starts_with("create"))
            .all(|c| c == "create /openapi/v2/text-to-3d"));
    }

    #[test]
    fn test_get_job_without_kind_makes_no_call() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::default());
        let err = provider.get_job("task-1", None).unwrap_err();
        assert!(matches!(err, ForgeError::MissingKind));
        assert!(provider.transport.calls().is_empty());
    }

    #[test]
    fn test_unsupported_kind_makes_no_call() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::default());
        let err = provider
            .create_job_named("bogus-kind", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedKind(_)));
        assert!(provider.transport.calls().is_empty());
    }

    #[test]
    fn test_get_job_routes_by_kind() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::with_tasks(&[
            r#"{"id": "task-1", "status": "SUCCEEDED", "progress": 100,
                "model_urls": {"glb": "https://assets.example/m.glb"}}"#,
        ]));
        let job = provider.get_job("task-1", Some(JobKind::Animate)).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.credits.before.is_none());
        assert_eq!(
            provider.transport.calls(),
            vec!["fetch /openapi/v1/animations/task-1".to_string()]
        );
    }

    #[test]
    fn test_stream_stops_after_terminal_update() {
        let body = concat!(
            "data: {\"id\":\"task-1\",\"status\":\"PENDING\",\"progress\":0}\n\n",
            "data: {\"id\":\"task-1\",\"status\":\"IN_PROGRESS\",\"progress\":45}\n\n",
            "data: {\"id\":\"task-1\",\"status\":\"SUCCEEDED\",\"progress\":100}\n\n",
            "data: {\"id\":\"task-1\",\"status\":\"SUCCEEDED\",\"progress\":100}\n\n",
            "data: {\"id\":\"task-1\",\"status\":\"IN_PROGRESS\",\"progress\":1}\n\n",
        );
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            stream_body: body.to_string(),
            ..Default::default()
        });

        let (jobs, errors) = collect_stream(&provider, Some(JobKind::TextTo3d));
        assert!(errors.is_empty());
        let statuses: Vec<_> = jobs.iter().map(|j| j.status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Pending, JobStatus::InProgress, JobStatus::Succeeded]
        );
        assert_eq!(
            provider.transport.calls(),
            vec!["stream /openapi/v2/text-to-3d/task-1/stream".to_string()]
        );
    }

    #[test]
    fn test_stream_without_kind_reports_error() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::default());
        let (jobs, errors) = collect_stream(&provider, None);
        assert!(jobs.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ForgeError::MissingKind));
        assert!(provider.transport.calls().is_empty());
    }

    #[test]
    fn test_stream_malformed_payload() {
        let body = concat!(
            "data: {\"id\":\"task-1\",\"status\":\"IN_PROGRESS\",\"progress\":10}\n\n",
            "data: {not json\n\n",
            "data: {\"id\":\"task-1\",\"status\":\"SUCCEEDED\",\"progress\":100}\n\n",
        );
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            stream_body: body.to_string(),
            ..Default::default()
        });

        let (jobs, errors) = collect_stream(&provider, Some(JobKind::Remesh));
        assert_eq!(jobs.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ForgeError::StreamPayload(_)));
    }

    #[test]
    fn test_stream_backend_error_event() {
        let body = "event: error\ndata: {\"status_code\":404,\"message\":\"Task not found\"}\n\n";
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            stream_body: body.to_string(),
            ..Default::default()
        });

        let (jobs, errors) = collect_stream(&provider, Some(JobKind::Rig));
        assert!(jobs.is_empty());
        assert!(matches!(&errors[0], ForgeError::StreamPayload(msg) if msg.contains("Task not found")));
    }

    #[test]
    fn test_stream_closed_early_reports_transport_error() {
        let body = "data: {\"id\":\"task-1\",\"status\":\"IN_PROGRESS\",\"progress\":30}\n\n";
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            stream_body: body.to_string(),
            ..Default::default()
        });

        let (jobs, errors) = collect_stream(&provider, Some(JobKind::ImageTo3d));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::InProgress);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ForgeError::Transport(msg) if msg.contains("before a terminal status")));
    }

    #[test]
    fn test_unsubscribe_releases_open_stream() {
        let released = Arc::new(AtomicBool::new(false));
        let provider = MeshyProvider::with_transport(ScriptedTransport {
            stream_body: "data: {\"id\":\"task-1\",\"status\":\"PENDING\"}\n\n".to_string(),
            held_open: Some(Arc::clone(&released)),
            ..Default::default()
        });

        let (job_tx, job_rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();
        let sub = provider.stream_job(
            "task-1",
            Some(JobKind::Retexture),
            Box::new(move |job: Job| job_tx.send(job).unwrap()),
            Box::new(move |err: ForgeError| err_tx.send(err).unwrap()),
        );

        let first = job_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.status, JobStatus::Pending);
        assert!(sub.is_active());

        sub.unsubscribe();
        assert!(!sub.is_active());
        sub.wait();

        assert!(released.load(Ordering::SeqCst));
        assert!(job_rx.try_recv().is_err());
        assert!(err_rx.try_recv().is_err());
    }

    #[test]
    fn test_wait_for_job_polls_until_terminal() {
        let provider = MeshyProvider::with_transport(ScriptedTransport::with_tasks(&[
            r#"{"id": "task-1", "status": "PENDING", "progress": 0}"#,
            r#"{"id": "task-1", "status": "IN_PROGRESS", "progress": 60}"#,
            r#"{"id": "task-1", "status": "FAILED", "progress": 60, "task_error": {"message": "out of credits"}}"#,
        ]));

        let mut seen = Vec::new();
        let job = crate::provider::wait_for_job(
            &provider,
            "task-1",
            JobKind::ImageTo3d,
            Duration::from_millis(1),
            |job| seen.push(job.progress),
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("out of credits"));
        assert_eq!(seen, vec![0, 60, 60]);
    }
}

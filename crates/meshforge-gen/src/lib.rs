//! MeshForge Gen - job abstraction over generative 3D asset APIs
//!
//! Exposes a uniform [`AssetProvider`] contract (balance, create, get, stream)
//! and normalizes each backend's task records into a single [`Job`] shape.
//! Meshy is the production backend; a mock provider answers locally.

pub mod config;
pub mod job;
pub mod params;
pub mod provider;
pub mod providers;
pub mod stream;

pub use config::ForgeConfig;
pub use job::{CreditBalance, Job, JobCredits, JobKind, JobOutputs, JobStatus};
pub use params::JobParams;
pub use provider::{wait_for_job, AssetProvider, Subscription};
pub use providers::{available_providers, create_provider};

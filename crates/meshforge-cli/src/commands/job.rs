//! Operator commands: balance, create, job lookup and watch

use anyhow::{Context, Result};
use meshforge_core::ForgeError;
use meshforge_gen::{wait_for_job, AssetProvider, Job, JobKind};
use std::sync::mpsc;
use std::time::Duration;

pub fn run_balance(provider: &dyn AssetProvider) -> Result<()> {
    let balance = provider.get_balance()?;
    println!("Balance: {} credits", balance.balance);
    println!("  Provider: {}", provider.name());
    Ok(())
}

pub fn run_create(provider: &dyn AssetProvider, kind: &str, args: Option<&str>) -> Result<()> {
    let args: serde_json::Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
        None => serde_json::json!({}),
    };

    println!("Submitting {} job via {}...", kind, provider.name());
    let job = provider.create_job_named(kind, args)?;
    print_job(&job);
    Ok(())
}

pub fn run_job(
    provider: &dyn AssetProvider,
    id: &str,
    kind: JobKind,
    wait: bool,
    poll_interval: Duration,
) -> Result<()> {
    let job = if wait {
        wait_for_job(provider, id, kind, poll_interval, |job| {
            println!("  {} {}%", job.status, job.progress);
        })?
    } else {
        provider.get_job(id, Some(kind))?
    };
    print_job(&job);
    Ok(())
}

enum StreamEvent {
    Update(Job),
    Failed(ForgeError),
}

pub fn run_watch(provider: &dyn AssetProvider, id: &str, kind: JobKind) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();

    let subscription = provider.stream_job(
        id,
        Some(kind),
        Box::new(move |job: Job| {
            tx.send(StreamEvent::Update(job)).ok();
        }),
        Box::new(move |err: ForgeError| {
            err_tx.send(StreamEvent::Failed(err)).ok();
        }),
    );

    // The channel closes once the worker exits and drops both senders
    let mut last = None;
    for event in rx {
        match event {
            StreamEvent::Update(job) => {
                println!("  {} {}%", job.status, job.progress);
                if job.is_terminal() {
                    last = Some(job);
                    break;
                }
                last = Some(job);
            }
            StreamEvent::Failed(err) => {
                subscription.unsubscribe();
                return Err(err.into());
            }
        }
    }
    subscription.wait();

    match last {
        Some(job) => {
            print_job(&job);
            Ok(())
        }
        None => anyhow::bail!("Stream for job {} closed without any update", id),
    }
}

pub fn run_tools() -> Result<()> {
    let tools = super::tools::list_tools();
    println!("{} tool(s):\n", tools.len());
    for tool in &tools {
        println!("  {:<32} {}", tool.name, tool.description);
    }
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job: {}", job.id);
    println!("  Provider: {}", job.provider);
    println!("  Type: {}", job.kind);
    println!("  Status: {}", job.status);
    println!("  Progress: {}%", job.progress);
    if let Some(before) = job.credits.before {
        println!("  Credits before: {}", before);
    }
    if let Some(ref err) = job.error {
        println!("  Error: {}", err);
    }
    for (format, url) in &job.outputs.models {
        println!("  Model ({}): {}", format, url);
    }
    for (slot, url) in &job.outputs.textures {
        println!("  Texture ({}): {}", slot, url);
    }
    if let Some(ref thumbnail) = job.outputs.thumbnail {
        println!("  Thumbnail: {}", thumbnail);
    }
    if let Some(ref video) = job.outputs.video {
        println!("  Video: {}", video);
    }
    for (label, outputs) in [
        ("Rigging", &job.outputs.rigging),
        ("Basic animations", &job.outputs.basic_animations),
        ("Animation", &job.outputs.animation),
    ] {
        if let Some(map) = outputs {
            for (name, url) in map {
                println!("  {} ({}): {}", label, name, url);
            }
        }
    }
}

//! Job watcher example
//!
//! Lists the current jobs once, then follows the job update stream and prints
//! each batch until Ctrl-C.
//!
//! Run with: API_BASE_URL=http://localhost:8000/api API_TOKEN=... cargo run --example job_watch

use anyhow::Context;
use resilient_client::{AppContext, Session, StaticSession};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Job Watch Example");
    println!("=================\n");

    let token = std::env::var("API_TOKEN").context("API_TOKEN must be set")?;
    let mut session = Session::new(token);
    if let Ok(tenant) = std::env::var("API_TENANT") {
        session = session.with_tenant(tenant);
    }

    let context = AppContext::from_env(Arc::new(StaticSession::new(session)))?;
    println!("Watching {}", context.config().api_base);

    let response = context.client().get("jobs").await?;
    println!("GET jobs -> {}", response.status);

    let mut batches = context.updates().subscribe();
    if !context.start_session().await {
        anyhow::bail!("update stream did not start");
    }

    loop {
        tokio::select! {
            batch = batches.next_batch() => {
                let Some(batch) = batch else { break };
                for job in &batch {
                    println!("{:<12} {:<10} {}", job.id, job.status, job.job_type);
                }
                println!(
                    "-- {} jobs known, {} active, stream {:?}",
                    context.jobs().len(),
                    context.jobs().active_count(),
                    context.updates().state()
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    context.teardown();
    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

use simgrid_core::{Bundle, SimgridConfig};
use simgrid_engine::MpsControl;
use simgrid_scheduler::{JobStatus, JobTracker, RunOutcome, RunSummary, SimulationManager};

pub async fn run(
    config: &SimgridConfig,
    bundles: &[PathBuf],
    continue_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mps = config.mps_settings();
    if mps.enabled {
        MpsControl::from_settings(&mps)
            .start()
            .await
            .context("starting mps daemon")?;
    }

    let manager = SimulationManager::from_config(config)?;

    for dir in bundles {
        if continue_run {
            Bundle::open(dir)?
                .continue_from_last_conf()
                .with_context(|| format!("continuing {}", dir.display()))?;
        }
        manager
            .submit_bundle(dir)
            .with_context(|| format!("loading bundle {}", dir.display()))?;
    }

    let handle = match manager.run(false).await? {
        RunOutcome::Started(handle) => handle,
        RunOutcome::Finished(summary) => return report(manager.tracker(), &summary, json),
    };

    let wait = handle.wait();
    tokio::pin!(wait);
    let summary = tokio::select! {
        result = &mut wait => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, terminating all jobs");
            manager.terminate_all();
            wait.await?
        }
    };

    report(manager.tracker(), &summary, json)
}

fn report(tracker: &JobTracker, summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        let body = serde_json::json!({
            "summary": summary,
            "jobs": tracker.records(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{:<24} {:<10} {:>6} {:>12}", "JOB", "STATUS", "DEVICE", "MEMORY (MiB)");
        for record in tracker.records() {
            println!(
                "{:<24} {:<10} {:>6} {:>12}",
                record.name,
                status_label(&record.status),
                record.device.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                record
                    .measured_memory_mib
                    .map(|m| format!("{m:.1}"))
                    .unwrap_or_else(|| "-".into()),
            );
        }
        for (id, reason) in &summary.failed {
            println!("  {id}: {reason}");
        }
        println!(
            "\n{} completed, {} failed, {} cancelled in {:.1}s",
            summary.completed,
            summary.failed.len(),
            summary.cancelled,
            summary.elapsed.as_secs_f64()
        );
    }

    if !summary.is_success() {
        anyhow::bail!(
            "{} job(s) did not complete",
            summary.failed.len() + summary.cancelled
        );
    }
    Ok(())
}

fn status_label(status: &JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Admitted => "admitted",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed(_) => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

use std::future::Future;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use whsweep_core::{sweep, BatchId};

use super::runner_builder;
use crate::cli::args::RunArgs;
use crate::exit_codes;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let file = args.sweep.load()?;
    let configs = sweep::generate(&file.sweep_spec())?;
    let client = runner_builder::workspace_client()?;
    let orchestrator = runner_builder::build_orchestrator(&file, client)
        .context("failed to set up sweep")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel_tx).await {
            error!("second interrupt: exiting without waiting for cleanup, warehouses may still be live");
            std::process::exit(exit_codes::CANCELLED);
        }
    });

    let batch_id = args
        .batch_id
        .as_deref()
        .map(BatchId::from)
        .unwrap_or_else(BatchId::generate);
    info!(batch_id = %batch_id, experiments = configs.len(), "sweep planned");

    let report = orchestrator
        .with_cancellation(cancel_rx)
        .run_sweep(&batch_id, configs)
        .await;

    print!("{}", report.render());
    if let Some(path) = &args.report {
        if let Err(e) = report.write_json(path) {
            error!(path = %path.display(), error = %e, "failed to write sweep report");
        }
    }
    Ok(exit_codes::for_report(&report))
}

/// The first interrupt raises the cancellation flag. Returns `true` on a
/// second interrupt, `false` if interrupts cannot be observed.
async fn watch_interrupts<F, Fut>(mut next: F, cancel: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next().await.is_err() {
        return false;
    }
    warn!("interrupt received: no new experiments start, in-flight ones are cleaned up; interrupt again to exit now");
    let _ = cancel.send(true);
    next().await.is_ok()
}

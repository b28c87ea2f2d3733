use anyhow::Result;
use log::*;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;

pub fn init_log() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log_panics::init();
}

/// Shutdown flag shared by every long running task. `true` means stop.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once the flag is raised or its sender is gone.
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Raises the shutdown flag on SIGINT or SIGTERM.
pub async fn run_termination_watch(
    shutdown_tx: watch::Sender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => warn!("interrupted, aborting"),
        _ = terminate.recv() => warn!("terminated, aborting"),
        _ = shutdown_requested(&mut shutdown_rx) => return Ok(()),
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}

pub async fn wait_tasks(mut tasks: JoinSet<Result<()>>) {
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => debug!("task exited"),
            Ok(Err(e)) => error!("task failed: {e:#}"),
            Err(e) => error!("task panicked: {e}"),
        }
    }
}

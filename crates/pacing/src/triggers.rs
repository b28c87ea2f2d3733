use anyhow::Result;
use log::*;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use common::shutdown_requested;

/// Forwards console lines to the keypress policy. Dropping `key_tx` at end of
/// input ends the capture loop.
pub async fn run_console<R>(input: R, key_tx: mpsc::Sender<String>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if key_tx.send(line).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Owns SIGUSR1 for the whole run so it never falls back to its default
/// terminating disposition. Deliveries are forwarded only when a signal paced
/// session is listening; at most one stays pending while a capture runs.
pub async fn run_signal_trigger(
    trigger_tx: Option<mpsc::Sender<()>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut usr1 = signal(SignalKind::user_defined1())?;
    loop {
        let delivered = tokio::select! {
            s = usr1.recv() => s,
            _ = shutdown_requested(&mut shutdown_rx) => return Ok(()),
        };
        if delivered.is_none() {
            return Ok(());
        }
        match &trigger_tx {
            Some(tx) => match tx.try_send(()) {
                Ok(()) => {}
                Err(TrySendError::Full(())) => debug!("SIGUSR1 already pending"),
                Err(TrySendError::Closed(())) => return Ok(()),
            },
            None => debug!("ignoring SIGUSR1"),
        }
    }
}

use anyhow::Result;
use log::*;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use common::shutdown_requested;
use proto::NavigationFix;

pub mod lines;
pub mod nmea;

use lines::LineBuffer;

pub const DEFAULT_PORT: &str = "/dev/ttyAMA0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
    let mut port = tokio_serial::new(path, baud_rate).open_native_async()?;
    port.set_exclusive(true)?;
    info!("reading gps from {path} at {baud_rate} baud");
    Ok(port)
}

/// Reads NMEA sentences from `port` and publishes every decoded fix into
/// `fix_tx`. Read errors and bad sentences never end the loop; it stops when
/// shutdown is requested or nobody is left reading fixes.
pub async fn run_gps<R>(
    mut port: R,
    fix_tx: watch::Sender<Option<NavigationFix>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();

    loop {
        if fix_tx.is_closed() {
            debug!("no fix readers left, stopping gps");
            return Ok(());
        }

        let read = tokio::select! {
            res = port.read(buffer.unfilled()) => Some(res),
            _ = shutdown_requested(&mut shutdown_rx) => None,
        };
        match read {
            None => return Ok(()),
            Some(Ok(n)) => buffer.advance(n),
            Some(Err(e)) => warn!("gps read failed: {e}"),
        }

        let overflowed = buffer.drain_lines(|line| match nmea::parse(line) {
            Some(sentence) => {
                fix_tx.send_modify(|fix| *fix = Some(sentence.apply_to(*fix)));
                trace!("gps: {sentence:?}");
            }
            None => trace!("gps: dropped {:?}", String::from_utf8_lossy(line)),
        });
        if overflowed {
            debug!("gps buffer overflowed without a line break, discarded");
        }

        tokio::select! {
            _ = sleep(POLL_INTERVAL) => {}
            _ = shutdown_requested(&mut shutdown_rx) => return Ok(()),
        }
    }
}

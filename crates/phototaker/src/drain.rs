use crossbeam::channel::{Receiver, Sender};
use log::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::slot::{Slot, SlotPool};
use crate::CycleError;

pub type Sink = Box<dyn Write + Send>;

/// Consumer side of one cycle: runs for every filled slot the encoder
/// returns, possibly while the capture is still being triggered.
pub(crate) struct FillHandler {
    pub sink: Sink,
    pub pool: SlotPool,
    pub submit_tx: Sender<Slot>,
    /// Cleared by the coordinator at teardown; stops resubmission.
    pub accepting: Arc<AtomicBool>,
    pub done_tx: Option<oneshot::Sender<Result<(), CycleError>>>,
}

pub(crate) struct Drained {
    pub sink: Sink,
    pub bytes_written: u64,
    pub slots_filled: usize,
    pub slots_resubmitted: usize,
}

impl FillHandler {
    /// Handles filled slots until the encoder drops its end of the link.
    pub fn run(mut self, filled_rx: Receiver<Slot>) -> Drained {
        let mut stats = Stats::default();
        for slot in filled_rx.iter() {
            self.on_filled(slot, &mut stats);
        }
        Drained {
            sink: self.sink,
            bytes_written: stats.bytes_written,
            slots_filled: stats.slots_filled,
            slots_resubmitted: stats.slots_resubmitted,
        }
    }

    fn on_filled(&mut self, slot: Slot, stats: &mut Stats) {
        stats.slots_filled += 1;
        let mut complete = None;

        if !slot.is_empty() && stats.writable {
            match write_fully(&mut self.sink, slot.bytes()) {
                Ok(written) => {
                    stats.bytes_written += written as u64;
                    if written != slot.len() {
                        error!("Unable to write buffer to file - aborting");
                        stats.writable = false;
                        complete = Some(Err(CycleError::ShortWrite {
                            written,
                            expected: slot.len(),
                        }));
                    }
                }
                Err(e) => {
                    error!("Unable to write buffer to file - aborting: {e}");
                    stats.writable = false;
                    complete = Some(Err(CycleError::Write(e)));
                }
            }
        }

        if complete.is_none() {
            if slot.is_transmission_failed() {
                complete = Some(Err(CycleError::TransmissionFailed));
            } else if slot.is_end_of_frame() {
                complete = Some(Ok(()));
            }
        }

        self.pool.release(slot);

        if stats.writable && self.accepting.load(Ordering::Acquire) {
            match self.pool.take() {
                Some(next) => match self.submit_tx.send(next) {
                    Ok(()) => stats.slots_resubmitted += 1,
                    Err(e) => {
                        error!("Unable to return a buffer to the encoder port");
                        self.pool.release(e.into_inner());
                    }
                },
                None => error!("Unable to return a buffer to the encoder port"),
            }
        }

        if let Some(result) = complete {
            if let Some(done_tx) = self.done_tx.take() {
                let _ = done_tx.send(result);
            }
        }
    }
}

struct Stats {
    writable: bool,
    bytes_written: u64,
    slots_filled: usize,
    slots_resubmitted: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            writable: true,
            bytes_written: 0,
            slots_filled: 0,
            slots_resubmitted: 0,
        }
    }
}

/// Writes until done or the sink stops taking bytes; returns how many went in.
fn write_fully(sink: &mut Sink, bytes: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < bytes.len() {
        match sink.write(&bytes[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

use anyhow::{Context, Result};
use crossbeam::channel::unbounded;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::spawn_blocking;

use common::shutdown_requested;

mod drain;
pub mod emit;
pub mod encoder;
pub mod slot;

pub use drain::Sink;
pub use emit::{emit_failure, emit_frame, Emitted};
pub use encoder::{Metadata, OutputLink, StillEncoder};
pub use slot::{Slot, SlotPool};

use drain::FillHandler;

/// Why a single capture cycle ended early. The session carries on with the
/// next frame after any of these.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("encoder reported a transmission failure")]
    TransmissionFailed,
    #[error("encoder released its output before the frame ended")]
    ProducerGone,
    #[error("capture cancelled")]
    Cancelled,
}

/// Per cycle encoder settings.
#[derive(Clone, Debug)]
pub struct CycleSetup {
    pub metadata: Metadata,
    pub raw: bool,
    pub shutter_speed: u32,
}

pub struct CycleReport {
    /// The sink handed in, for the caller to flush, close or rename.
    pub sink: Sink,
    pub bytes_written: u64,
    pub slots_submitted: usize,
    pub outcome: Result<(), CycleError>,
}

/// Runs one capture at a time through a fixed pool of output slots.
pub struct Coordinator<E> {
    encoder: E,
    pool: SlotPool,
}

impl<E: StillEncoder> Coordinator<E> {
    pub fn new(encoder: E, pool: SlotPool) -> Self {
        Self { encoder, pool }
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Captures one still into `sink`. Errors are session fatal; anything
    /// that only spoils this frame is reported in `CycleReport::outcome`.
    pub async fn run_cycle(
        &mut self,
        sink: Sink,
        setup: CycleSetup,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<CycleReport> {
        // must happen before output is enabled, which locks the metadata
        if let Err(e) = self.encoder.set_metadata(setup.metadata) {
            error!("unable to set metadata: {e:#}");
        }
        if setup.raw {
            if let Err(e) = self.encoder.set_raw_capture(true) {
                error!("RAW was requested, but failed to enable: {e:#}");
            }
        }
        if let Err(e) = self.encoder.set_shutter_speed(setup.shutter_speed) {
            error!("unable to set shutter speed: {e:#}");
        }

        let (submit_tx, submit_rx) = unbounded();
        let (filled_tx, filled_rx) = unbounded();
        self.encoder
            .enable_output(OutputLink {
                submitted: submit_rx.clone(),
                filled: filled_tx,
            })
            .context("failed to enable encoder output")?;

        let mut armed = 0;
        while let Some(slot) = self.pool.take() {
            match submit_tx.send(slot) {
                Ok(()) => armed += 1,
                Err(e) => self.pool.release(e.into_inner()),
            }
        }
        debug!("armed {armed} output slots");

        let accepting = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = oneshot::channel();
        let handler = FillHandler {
            sink,
            pool: self.pool.clone(),
            submit_tx: submit_tx.clone(),
            accepting: accepting.clone(),
            done_tx: Some(done_tx),
        };
        let drain_task = spawn_blocking(move || handler.run(filled_rx));

        let outcome = match self.encoder.capture() {
            Err(e) => Err(e),
            Ok(()) => Ok(tokio::select! {
                done = done_rx => done.unwrap_or(Err(CycleError::ProducerGone)),
                _ = shutdown_requested(shutdown_rx) => Err(CycleError::Cancelled),
            }),
        };

        accepting.store(false, Ordering::Release);
        if let Err(e) = self.encoder.disable_output() {
            error!("failed to disable encoder output: {e:#}");
        }
        drop(submit_tx);
        let drained = drain_task.await?;
        debug!(
            "drained {} slots, {} bytes",
            drained.slots_filled, drained.bytes_written
        );
        while let Ok(slot) = submit_rx.try_recv() {
            self.pool.release(slot);
        }
        if self.pool.free() != self.pool.size() {
            warn!(
                "{} of {} output slots not returned after teardown",
                self.pool.size() - self.pool.free(),
                self.pool.size()
            );
        }

        let outcome = outcome.context("failed to start capture")?;
        Ok(CycleReport {
            sink: drained.sink,
            bytes_written: drained.bytes_written,
            slots_submitted: armed + drained.slots_resubmitted,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use crossbeam::channel::{bounded, select, Sender};
    use std::io::{self, Write};
    use std::sync::Mutex;
    use std::thread::JoinHandle;
    use tokio::time::{sleep, timeout, Duration};

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Emit,
        Fail,
        Hang,
        RefuseTrigger,
    }

    struct Worker {
        trigger_tx: Sender<()>,
        stop_tx: Sender<()>,
        handle: JoinHandle<()>,
    }

    struct Scripted {
        payload: Vec<u8>,
        behaviour: Behaviour,
        metadata: Option<Metadata>,
        worker: Option<Worker>,
    }

    impl Scripted {
        fn new(payload: &[u8], behaviour: Behaviour) -> Self {
            Self {
                payload: payload.to_vec(),
                behaviour,
                metadata: None,
                worker: None,
            }
        }
    }

    impl StillEncoder for Scripted {
        fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
            if self.worker.is_some() {
                bail!("output already enabled");
            }
            self.metadata = Some(metadata);
            Ok(())
        }

        fn set_raw_capture(&mut self, _enabled: bool) -> Result<()> {
            bail!("no raw")
        }

        fn set_shutter_speed(&mut self, _micros: u32) -> Result<()> {
            Ok(())
        }

        fn enable_output(&mut self, link: OutputLink) -> Result<()> {
            let (trigger_tx, trigger_rx) = bounded::<()>(1);
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let payload = self.payload.clone();
            let behaviour = self.behaviour;
            let handle = std::thread::spawn(move || loop {
                select! {
                    recv(trigger_rx) -> t => {
                        if t.is_err() {
                            return;
                        }
                        let emitted = match behaviour {
                            Behaviour::Emit => emit_frame(&payload, &link, &stop_rx),
                            Behaviour::Fail => emit_failure(&link, &stop_rx),
                            _ => {
                                let _ = stop_rx.recv();
                                Emitted::Stopped
                            }
                        };
                        if emitted != Emitted::Complete {
                            return;
                        }
                    },
                    recv(stop_rx) -> _ => return,
                }
            });
            self.worker = Some(Worker {
                trigger_tx,
                stop_tx,
                handle,
            });
            Ok(())
        }

        fn capture(&mut self) -> Result<()> {
            if self.behaviour == Behaviour::RefuseTrigger {
                bail!("trigger refused");
            }
            match &self.worker {
                Some(w) => Ok(w.trigger_tx.send(())?),
                None => bail!("output not enabled"),
            }
        }

        fn disable_output(&mut self) -> Result<()> {
            if let Some(w) = self.worker.take() {
                let _ = w.stop_tx.send(());
                drop(w.trigger_tx);
                let _ = w.handle.join();
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts `limit` bytes in total, then reports a full device.
    struct ShortWriter {
        inner: SharedBuf,
        limit: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let used = self.inner.0.lock().unwrap().len();
            let n = buf.len().min(self.limit - used);
            self.inner.write(&buf[..n])
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn setup() -> CycleSetup {
        CycleSetup {
            metadata: Metadata::Tags(vec!["GPS.GPSLatitudeRef=N".into()]),
            raw: false,
            shutter_speed: 0,
        }
    }

    async fn cycle(
        coordinator: &mut Coordinator<Scripted>,
        sink: Sink,
    ) -> Result<CycleReport> {
        let (_shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        timeout(
            Duration::from_secs(5),
            coordinator.run_cycle(sink, setup(), &mut shutdown_rx),
        )
        .await?
    }

    #[tokio::test]
    async fn writes_whole_frame_and_returns_every_slot() {
        let payload: Vec<u8> = (0..30).collect();
        let pool = SlotPool::new(3, 4).unwrap();
        let mut coordinator = Coordinator::new(Scripted::new(&payload, Behaviour::Emit), pool);
        let out = SharedBuf::default();

        let report = cycle(&mut coordinator, Box::new(out.clone())).await.unwrap();
        assert!(report.outcome.is_ok());
        assert_eq!(report.bytes_written, 30);
        assert_eq!(*out.0.lock().unwrap(), payload);
        assert_eq!(coordinator.pool().free(), 3);
        assert_eq!(
            coordinator.encoder().metadata,
            Some(Metadata::Tags(vec!["GPS.GPSLatitudeRef=N".into()]))
        );
    }

    #[tokio::test]
    async fn slots_are_conserved_over_many_cycles() {
        let pool = SlotPool::new(4, 16).unwrap();
        let mut coordinator = Coordinator::new(Scripted::new(&[], Behaviour::Emit), pool);
        for len in [0usize, 1, 15, 16, 17, 64, 65, 1000] {
            coordinator.encoder.payload = vec![7u8; len];
            let out = SharedBuf::default();
            let report = cycle(&mut coordinator, Box::new(out.clone())).await.unwrap();
            assert!(report.outcome.is_ok(), "len {len}");
            assert_eq!(out.0.lock().unwrap().len(), len);
            assert_eq!(coordinator.pool().free(), coordinator.pool().size());
        }
    }

    #[tokio::test]
    async fn short_write_ends_cycle_without_further_submissions() {
        let payload = vec![1u8; 40];
        let pool = SlotPool::new(3, 4).unwrap();
        let mut coordinator = Coordinator::new(Scripted::new(&payload, Behaviour::Emit), pool);
        let out = SharedBuf::default();
        let sink = ShortWriter {
            inner: out.clone(),
            limit: 6,
        };

        let report = cycle(&mut coordinator, Box::new(sink)).await.unwrap();
        match report.outcome {
            Err(CycleError::ShortWrite { written, expected }) => {
                assert_eq!((written, expected), (2, 4));
            }
            other => panic!("unexpected {other:?}"),
        }
        // three armed up front, one more after the only complete write
        assert_eq!(report.slots_submitted, 4);
        assert_eq!(report.bytes_written, 6);
        assert_eq!(out.0.lock().unwrap().len(), 6);
        assert_eq!(coordinator.pool().free(), 3);
    }

    #[tokio::test]
    async fn transmission_failure_is_cycle_fatal_only() {
        let pool = SlotPool::new(2, 8).unwrap();
        let mut coordinator = Coordinator::new(Scripted::new(b"abc", Behaviour::Fail), pool);
        let report = cycle(&mut coordinator, Box::new(SharedBuf::default()))
            .await
            .unwrap();
        assert!(matches!(report.outcome, Err(CycleError::TransmissionFailed)));
        assert_eq!(coordinator.pool().free(), 2);

        coordinator.encoder.behaviour = Behaviour::Emit;
        let report = cycle(&mut coordinator, Box::new(SharedBuf::default()))
            .await
            .unwrap();
        assert!(report.outcome.is_ok());
        assert_eq!(report.bytes_written, 3);
    }

    #[tokio::test]
    async fn refused_trigger_is_session_fatal_after_teardown() {
        let pool = SlotPool::new(3, 8).unwrap();
        let mut coordinator =
            Coordinator::new(Scripted::new(b"abc", Behaviour::RefuseTrigger), pool);
        assert!(cycle(&mut coordinator, Box::new(SharedBuf::default()))
            .await
            .is_err());
        assert_eq!(coordinator.pool().free(), 3);
    }

    #[tokio::test]
    async fn shutdown_cancels_hung_capture_and_recovers_slots() {
        let pool = SlotPool::new(3, 8).unwrap();
        let mut coordinator = Coordinator::new(Scripted::new(b"abc", Behaviour::Hang), pool);
        let (shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let _ = shutdown_tx.send(true);
        });

        let report = timeout(
            Duration::from_secs(5),
            coordinator.run_cycle(Box::new(SharedBuf::default()), setup(), &mut shutdown_rx),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(report.outcome, Err(CycleError::Cancelled)));
        assert_eq!(coordinator.pool().free(), 3);
    }
}

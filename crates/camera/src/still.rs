use anyhow::{anyhow, bail, Result};
use crossbeam::channel::{bounded, select, Receiver, Sender};
use image::RgbImage;
use log::*;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use phototaker::{emit_failure, emit_frame, Emitted, Metadata, OutputLink, StillEncoder};

use crate::jpeg;

/// Something that can hand over one uncompressed frame on demand.
pub trait FrameSource: Send + 'static {
    fn grab(&mut self) -> Result<RgbImage>;

    /// Zero selects automatic exposure.
    fn set_exposure(&mut self, micros: u32) -> Result<()>;
}

struct Job {
    quality: u8,
    metadata: Metadata,
}

struct Worker {
    job_tx: Sender<Job>,
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// JPEG still encoder on top of a frame source. Each enabled output gets its
/// own worker thread that grabs, encodes and streams frames into slots.
pub struct Still<S> {
    source: Arc<Mutex<S>>,
    quality: u8,
    metadata: Metadata,
    worker: Option<Worker>,
}

impl<S: FrameSource> Still<S> {
    pub fn new(source: S, quality: u8) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            quality: quality.clamp(1, 100),
            metadata: Metadata::Disabled,
            worker: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.worker.is_some()
    }
}

impl<S: FrameSource> StillEncoder for Still<S> {
    fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
        if self.is_enabled() {
            bail!("metadata is locked while the output is enabled");
        }
        self.metadata = metadata;
        Ok(())
    }

    fn set_raw_capture(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            bail!("raw capture is not supported by this source");
        }
        Ok(())
    }

    fn set_shutter_speed(&mut self, micros: u32) -> Result<()> {
        self.source
            .lock()
            .map_err(|_| anyhow!("frame source poisoned"))?
            .set_exposure(micros)
    }

    fn enable_output(&mut self, link: OutputLink) -> Result<()> {
        if self.is_enabled() {
            bail!("output already enabled");
        }
        let (job_tx, job_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let source = self.source.clone();
        let handle = std::thread::Builder::new()
            .name("still-output".into())
            .spawn(move || run_output(source, link, job_rx, stop_rx))?;
        self.worker = Some(Worker {
            job_tx,
            stop_tx,
            handle,
        });
        Ok(())
    }

    fn capture(&mut self) -> Result<()> {
        let Some(worker) = &self.worker else {
            bail!("output not enabled");
        };
        worker
            .job_tx
            .try_send(Job {
                quality: self.quality,
                metadata: self.metadata.clone(),
            })
            .map_err(|_| anyhow!("a capture is already in progress"))
    }

    fn disable_output(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = worker.stop_tx.try_send(());
        drop(worker.job_tx);
        worker
            .handle
            .join()
            .map_err(|_| anyhow!("still output worker panicked"))
    }
}

fn run_output<S: FrameSource>(
    source: Arc<Mutex<S>>,
    link: OutputLink,
    job_rx: Receiver<Job>,
    stop_rx: Receiver<()>,
) {
    loop {
        let job = select! {
            recv(job_rx) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(stop_rx) -> _ => return,
        };

        let emitted = match render(&source, &job) {
            Ok(bytes) => {
                debug!("encoded still of {} bytes", bytes.len());
                emit_frame(&bytes, &link, &stop_rx)
            }
            Err(e) => {
                error!("still capture failed: {e:#}");
                emit_failure(&link, &stop_rx)
            }
        };
        if emitted != Emitted::Complete {
            return;
        }
    }
}

fn render<S: FrameSource>(source: &Mutex<S>, job: &Job) -> Result<Vec<u8>> {
    let frame = source
        .lock()
        .map_err(|_| anyhow!("frame source poisoned"))?
        .grab()?;
    let encoded = jpeg::encode(&frame, job.quality)?;
    match &job.metadata {
        Metadata::Tags(tags) => jpeg::embed_tags(&encoded, tags),
        Metadata::Disabled => Ok(encoded),
    }
}

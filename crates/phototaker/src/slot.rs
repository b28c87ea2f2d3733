use anyhow::{bail, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::*;

/// One reusable output buffer. Whoever holds the value owns the slot: the
/// pool while it is free, the encoder once submitted, the fill handler once
/// filled.
#[derive(Debug)]
pub struct Slot {
    id: usize,
    data: Box<[u8]>,
    len: usize,
    end_of_frame: bool,
    transmission_failed: bool,
}

impl Slot {
    fn new(id: usize, size: usize) -> Self {
        Self {
            id,
            data: vec![0u8; size].into_boxed_slice(),
            len: 0,
            end_of_frame: false,
            transmission_failed: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Replaces the contents with as much of `bytes` as fits.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.capacity());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.len = n;
        n
    }

    pub fn mark_end_of_frame(&mut self) {
        self.end_of_frame = true;
    }

    pub fn mark_transmission_failed(&mut self) {
        self.transmission_failed = true;
    }

    pub fn is_end_of_frame(&self) -> bool {
        self.end_of_frame
    }

    pub fn is_transmission_failed(&self) -> bool {
        self.transmission_failed
    }

    fn clear(&mut self) {
        self.len = 0;
        self.end_of_frame = false;
        self.transmission_failed = false;
    }
}

/// Fixed set of slots. Cloning shares the same pool.
#[derive(Clone)]
pub struct SlotPool {
    free_tx: Sender<Slot>,
    free_rx: Receiver<Slot>,
    size: usize,
}

impl SlotPool {
    pub fn new(count: usize, slot_size: usize) -> Result<Self> {
        if count == 0 || slot_size == 0 {
            bail!("cannot create a pool of {count} slots of {slot_size} bytes");
        }
        let (free_tx, free_rx) = bounded(count);
        for id in 0..count {
            free_tx.send(Slot::new(id, slot_size))?;
        }
        Ok(Self {
            free_tx,
            free_rx,
            size: count,
        })
    }

    pub fn take(&self) -> Option<Slot> {
        self.free_rx.try_recv().ok()
    }

    pub fn release(&self, mut slot: Slot) {
        slot.clear();
        if let Err(e) = self.free_tx.try_send(slot) {
            error!("slot {} released into a full pool", e.into_inner().id);
        }
    }

    pub fn free(&self) -> usize {
        self.free_rx.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

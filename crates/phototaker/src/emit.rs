use crossbeam::channel::{select, Receiver};

use crate::encoder::OutputLink;
use crate::slot::Slot;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Emitted {
    Complete,
    /// `stop` fired while waiting for a free slot.
    Stopped,
    /// The coordinator side of the link is gone.
    Disconnected,
}

/// Producer side of a capture: streams `frame` through submitted slots and
/// flags the last one as end of frame. Never keeps a slot across a wait, so
/// stopping leaves nothing behind.
pub fn emit_frame(frame: &[u8], link: &OutputLink, stop: &Receiver<()>) -> Emitted {
    let mut offset = 0;
    loop {
        let mut slot = match next_slot(link, stop) {
            Ok(slot) => slot,
            Err(e) => return e,
        };
        offset += slot.fill(&frame[offset..]);
        let last = offset >= frame.len();
        if last {
            slot.mark_end_of_frame();
        }
        if link.filled.send(slot).is_err() {
            return Emitted::Disconnected;
        }
        if last {
            return Emitted::Complete;
        }
    }
}

/// Reports a capture that produced no usable data.
pub fn emit_failure(link: &OutputLink, stop: &Receiver<()>) -> Emitted {
    let mut slot = match next_slot(link, stop) {
        Ok(slot) => slot,
        Err(e) => return e,
    };
    slot.mark_transmission_failed();
    match link.filled.send(slot) {
        Ok(()) => Emitted::Complete,
        Err(_) => Emitted::Disconnected,
    }
}

fn next_slot(link: &OutputLink, stop: &Receiver<()>) -> Result<Slot, Emitted> {
    select! {
        recv(link.submitted) -> slot => slot.map_err(|_| Emitted::Disconnected),
        recv(stop) -> _ => Err(Emitted::Stopped),
    }
}

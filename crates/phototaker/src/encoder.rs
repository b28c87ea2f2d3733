use anyhow::Result;
use crossbeam::channel::{Receiver, Sender};

use crate::slot::Slot;

/// Metadata handed to the encoder before its output is enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Metadata {
    /// `KEY=VALUE` tags, e.g. `GPS.GPSLatitudeRef=N`.
    Tags(Vec<String>),
    Disabled,
}

/// Queues between the coordinator and an enabled encoder output.
pub struct OutputLink {
    /// Empty slots handed out for filling.
    pub submitted: Receiver<Slot>,
    /// Every slot taken from `submitted` must come back here exactly once.
    pub filled: Sender<Slot>,
}

/// A still image producer: camera plus encoder, configured elsewhere.
pub trait StillEncoder: Send {
    /// Only accepted while the output is disabled.
    fn set_metadata(&mut self, metadata: Metadata) -> Result<()>;

    fn set_raw_capture(&mut self, enabled: bool) -> Result<()>;

    /// Zero selects automatic exposure.
    fn set_shutter_speed(&mut self, micros: u32) -> Result<()>;

    fn enable_output(&mut self, link: OutputLink) -> Result<()>;

    /// Starts one still capture; its bytes arrive through the enabled link.
    fn capture(&mut self) -> Result<()>;

    /// Stops filling, hands back every slot it still holds, and drops the
    /// link so the `filled` side disconnects.
    fn disable_output(&mut self) -> Result<()>;
}

use anyhow::Result;
use image::{Rgb, RgbImage};
use log::*;

use crate::still::FrameSource;

/// Synthetic source for running without a sensor: a colour gradient whose
/// blue channel steps with every grab.
pub struct PatternSource {
    width: u32,
    height: u32,
    grabs: u32,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            grabs: 0,
        }
    }
}

impl FrameSource for PatternSource {
    fn grab(&mut self) -> Result<RgbImage> {
        self.grabs = self.grabs.wrapping_add(1);
        let (w, h) = (self.width, self.height);
        let blue = (self.grabs.wrapping_mul(16) % 256) as u8;
        Ok(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, blue])
        }))
    }

    fn set_exposure(&mut self, micros: u32) -> Result<()> {
        debug!("test pattern ignores exposure of {micros} us");
        Ok(())
    }
}

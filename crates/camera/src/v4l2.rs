use anyhow::Result;
use image::io::Reader as ImageReader;
use image::RgbImage;
use log::*;
use std::io::Cursor;

use crate::still::FrameSource;

const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_EXPOSURE_MANUAL: i32 = 1;
const V4L2_EXPOSURE_APERTURE_PRIORITY: i32 = 3;
/// Frames already queued by the driver when a still is requested.
const STALE_FRAMES: usize = 2;

pub struct V4l2Source {
    camera: rscam::Camera,
}

impl V4l2Source {
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        let mut camera = rscam::new(device)?;
        camera.start(&rscam::Config {
            interval: (1, 30),
            resolution: (width, height),
            format: b"MJPG",
            ..Default::default()
        })?;
        info!("streaming {width}x{height} MJPG from {device}");
        Ok(Self { camera })
    }
}

impl FrameSource for V4l2Source {
    fn grab(&mut self) -> Result<RgbImage> {
        for _ in 0..STALE_FRAMES {
            self.camera.capture()?;
        }
        let frame = self.camera.capture()?;
        let decoded = ImageReader::new(Cursor::new(&frame[..]))
            .with_guessed_format()?
            .decode()?
            .into_rgb8();
        Ok(decoded)
    }

    fn set_exposure(&mut self, micros: u32) -> Result<()> {
        if micros == 0 {
            self.camera
                .set_control(V4L2_CID_EXPOSURE_AUTO, &V4L2_EXPOSURE_APERTURE_PRIORITY)?;
            return Ok(());
        }
        // V4L2 absolute exposure is in 100 us units
        let units = (micros / 100).max(1) as i32;
        self.camera
            .set_control(V4L2_CID_EXPOSURE_AUTO, &V4L2_EXPOSURE_MANUAL)?;
        self.camera
            .set_control(V4L2_CID_EXPOSURE_ABSOLUTE, &units)?;
        Ok(())
    }
}

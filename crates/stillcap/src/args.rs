use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use pacing::{PacingConfig, Policy};
use photosaver::FrameNaming;
use session::tags::MAX_USER_TAGS;

/// Captures JPEG stills on a schedule and tags them with the current GPS fix.
#[derive(Parser, Debug)]
#[command(name = "stillcap", version)]
pub struct Args {
    /// Output file pattern, e.g. img%04d.jpg; `-` writes to stdout
    #[arg(short, long)]
    pub output: String,

    /// Keep this name linked to the newest frame
    #[arg(short, long)]
    pub latest: Option<PathBuf>,

    /// Total run time in ms; 0 runs until interrupted
    #[arg(short, long, default_value_t = 5000)]
    pub timeout: u64,

    /// Capture every N ms; 0 captures back to back
    #[arg(long, value_name = "MS")]
    pub timelapse: Option<u64>,

    /// Capture on Enter, exit on X
    #[arg(short, long)]
    pub keypress: bool,

    /// Capture on SIGUSR1
    #[arg(short, long)]
    pub signal: bool,

    /// Name frames by local MMDDhhmmss instead of the counter
    #[arg(long, conflicts_with = "timestamp")]
    pub datetime: bool,

    /// Name frames by unix time instead of the counter
    #[arg(long)]
    pub timestamp: bool,

    /// JPEG quality
    #[arg(short, long, default_value_t = 85, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Ask for raw sensor data along with the JPEG
    #[arg(short, long)]
    pub raw: bool,

    /// Exposure time in µs; 0 for automatic
    #[arg(long, default_value_t = 0)]
    pub shutter: u32,

    #[arg(long, default_value_t = 1920)]
    pub width: u32,

    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// V4L2 capture device
    #[arg(long, default_value = "/dev/video0")]
    pub device: String,

    /// Use a generated image instead of a camera
    #[arg(long, conflicts_with = "device")]
    pub test_pattern: bool,

    /// Serial port of the GPS receiver
    #[arg(long, default_value = gps::DEFAULT_PORT)]
    pub gps_port: String,

    #[arg(long, default_value_t = gps::DEFAULT_BAUD_RATE)]
    pub gps_baud: u32,

    /// Extra KEY=VALUE tag, may be repeated
    #[arg(short = 'x', long = "exif", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub tags: Vec<String>,

    /// Do not write any tags
    #[arg(long, conflicts_with = "tags")]
    pub no_exif: bool,

    /// Number of output slots
    #[arg(long, default_value_t = 3)]
    pub slots: usize,

    /// Size of one output slot in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    pub slot_size: usize,
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tags.len() > MAX_USER_TAGS {
            anyhow::bail!("at most {MAX_USER_TAGS} tags may be given");
        }
        Ok(())
    }

    /// Keypress wins over signal, signal over timelapse.
    pub fn pacing(&self) -> PacingConfig {
        let policy = if self.keypress {
            Policy::Keypress
        } else if self.signal {
            Policy::Signal
        } else if self.timelapse.is_some() {
            Policy::Timelapse
        } else {
            Policy::Single
        };
        PacingConfig::new(
            policy,
            Duration::from_millis(self.timeout),
            Duration::from_millis(self.timelapse.unwrap_or(0)),
        )
    }

    pub fn naming(&self) -> FrameNaming {
        if self.datetime {
            FrameNaming::DateTime
        } else if self.timestamp {
            FrameNaming::Timestamp
        } else {
            FrameNaming::Counter
        }
    }
}

fn parse_tag(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.is_empty() => Ok(s.to_string()),
        _ => Err(format!("`{s}` is not KEY=VALUE")),
    }
}

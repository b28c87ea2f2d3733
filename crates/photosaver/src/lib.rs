use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use log::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

mod pattern;

pub use pattern::format_pattern;

/// Output name that streams to stdout instead of a file.
pub const STDOUT_NAME: &str = "-";

/// What replaces the integer in the output pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FrameNaming {
    #[default]
    Counter,
    /// `MMDDhhmmss` of local time read as a number.
    DateTime,
    /// Unix seconds.
    Timestamp,
}

impl FrameNaming {
    pub fn number<Tz: TimeZone>(self, frame: u32, now: &DateTime<Tz>) -> i64 {
        match self {
            FrameNaming::Counter => i64::from(frame),
            FrameNaming::DateTime => {
                i64::from(now.month()) * 100_000_000
                    + i64::from(now.day()) * 1_000_000
                    + i64::from(now.hour()) * 10_000
                    + i64::from(now.minute()) * 100
                    + i64::from(now.second())
            }
            FrameNaming::Timestamp => now.timestamp(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputConfig {
    pub pattern: String,
    pub latest: Option<PathBuf>,
    pub naming: FrameNaming,
}

impl OutputConfig {
    pub fn target(&self, frame: u32) -> Target {
        self.target_at(frame, &Local::now())
    }

    pub fn target_at<Tz: TimeZone>(&self, frame: u32, now: &DateTime<Tz>) -> Target {
        if self.pattern == STDOUT_NAME {
            return Target::Stdout;
        }
        let name = format_pattern(&self.pattern, self.naming.number(frame, now));
        let final_path = PathBuf::from(name);
        Target::File {
            temp: temp_path(&final_path),
            final_path,
        }
    }
}

/// Where one frame goes. Files are written under a temporary name and only
/// get their final name once the frame is complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Stdout,
    File { temp: PathBuf, final_path: PathBuf },
}

impl Target {
    pub fn open(&self) -> Result<Box<dyn Write + Send>> {
        match self {
            Target::Stdout => Ok(Box::new(std::io::stdout())),
            Target::File { temp, .. } => {
                let file = File::create(temp)
                    .with_context(|| format!("failed to open {}", temp.display()))?;
                debug!("opened {}", temp.display());
                Ok(Box::new(file))
            }
        }
    }

    /// Gives a complete frame its final name and points `latest` at it.
    /// A failed link is logged and does not fail the frame.
    pub fn commit(&self, latest: Option<&Path>) -> Result<()> {
        let Target::File { temp, final_path } = self else {
            return Ok(());
        };
        fs::rename(temp, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp.display(),
                final_path.display()
            )
        })?;
        info!("saved {}", final_path.display());

        if let Some(link) = latest {
            if let Err(e) = update_link(final_path, link) {
                error!("failed to update {}: {e:#}", link.display());
            }
        }
        Ok(())
    }

    /// Drops the partial file of a failed frame.
    pub fn discard(&self) {
        if let Target::File { temp, .. } = self {
            match fs::remove_file(temp) {
                Ok(()) => debug!("removed {}", temp.display()),
                Err(e) => warn!("failed to remove {}: {e}", temp.display()),
            }
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("~");
    PathBuf::from(name)
}

/// Builds the link next to its final name first so readers of `link` never
/// see it missing.
fn update_link(target: &Path, link: &Path) -> Result<()> {
    let staging = temp_path(link);
    let _ = fs::remove_file(&staging);
    if let Err(e) = fs::hard_link(target, &staging) {
        debug!("hard link failed ({e}), trying a symlink");
        std::os::unix::fs::symlink(target, &staging)
            .with_context(|| format!("failed to link {}", staging.display()))?;
    }
    fs::rename(&staging, link)
        .with_context(|| format!("failed to rename {}", staging.display()))?;
    Ok(())
}

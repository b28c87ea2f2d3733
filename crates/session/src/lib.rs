use anyhow::Result;
use chrono::Local;
use log::*;
use std::io::Write;
use tokio::sync::watch;

use pacing::{Next, Pacer};
use photosaver::OutputConfig;
use phototaker::{Coordinator, CycleError, CycleSetup, StillEncoder};
use proto::NavigationFix;

pub mod tags;

pub use tags::TagConfig;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub output: OutputConfig,
    pub tags: TagConfig,
    pub raw: bool,
    /// Microseconds, zero for automatic exposure.
    pub shutter_speed: u32,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub saved: u32,
    pub failed: u32,
    /// Ended by the shutdown flag rather than by the pacing policy.
    pub interrupted: bool,
}

/// Captures frames until the pacer says stop. Frame level failures are
/// logged and counted; only errors that make further captures pointless
/// are returned.
pub async fn run_session<E: StillEncoder>(
    coordinator: &mut Coordinator<E>,
    pacer: &mut Pacer,
    config: &SessionConfig,
    fix_rx: &watch::Receiver<Option<NavigationFix>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<SessionSummary> {
    let mut summary = SessionSummary::default();
    let mut frame = 0;

    loop {
        let last = match pacer.next_frame(frame).await {
            Next::Capture(n) => {
                frame = n;
                false
            }
            Next::Last(n) => {
                frame = n;
                true
            }
            Next::Stop => break,
        };
        if *shutdown_rx.borrow() {
            summary.interrupted = true;
            break;
        }

        let target = config.output.target(frame);
        let sink = match target.open() {
            Ok(sink) => sink,
            Err(e) => {
                error!("frame {frame}: {e:#}");
                summary.failed += 1;
                if last {
                    break;
                }
                continue;
            }
        };

        let fix = *fix_rx.borrow();
        if fix.is_none() {
            debug!("frame {frame}: no GPS fix yet");
        }
        let setup = CycleSetup {
            metadata: config.tags.metadata(fix.as_ref(), &Local::now()),
            raw: config.raw,
            shutter_speed: config.shutter_speed,
        };

        let report = match coordinator.run_cycle(sink, setup, shutdown_rx).await {
            Ok(report) => report,
            Err(e) => {
                target.discard();
                return Err(e);
            }
        };
        let mut sink = report.sink;
        let outcome = report
            .outcome
            .and_then(|()| sink.flush().map_err(CycleError::from));
        drop(sink);

        match outcome {
            Ok(()) => match target.commit(config.output.latest.as_deref()) {
                Ok(()) => {
                    debug!("frame {frame}: {} bytes", report.bytes_written);
                    summary.saved += 1;
                }
                Err(e) => {
                    error!("frame {frame}: {e:#}");
                    summary.failed += 1;
                }
            },
            Err(CycleError::Cancelled) => {
                warn!("frame {frame}: capture cancelled");
                target.discard();
                summary.interrupted = true;
                break;
            }
            Err(e) => {
                error!("frame {frame}: {e}");
                target.discard();
                summary.failed += 1;
            }
        }

        if last {
            break;
        }
    }

    if *shutdown_rx.borrow() {
        summary.interrupted = true;
    }
    info!(
        "session finished: {} saved, {} failed",
        summary.saved, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera::{PatternSource, Still};
    use pacing::{PacingConfig, Policy};
    use photosaver::FrameNaming;
    use phototaker::{Metadata, OutputLink, SlotPool};
    use proto::{Axis, Coordinate, Rational};
    use std::fs;
    use std::path::Path;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    fn session_config(dir: &Path, pattern: &str) -> SessionConfig {
        SessionConfig {
            output: OutputConfig {
                pattern: dir.join(pattern).to_string_lossy().into_owned(),
                latest: Some(dir.join("latest.jpg")),
                naming: FrameNaming::Counter,
            },
            tags: TagConfig {
                enabled: true,
                make: "Pattern".into(),
                model: "test".into(),
                user: vec![],
            },
            raw: false,
            shutter_speed: 0,
        }
    }

    fn coordinator() -> Coordinator<Still<PatternSource>> {
        Coordinator::new(
            Still::new(PatternSource::new(32, 24), 75),
            SlotPool::new(3, 512).unwrap(),
        )
    }

    /// Keypress pacer fed with `keys`; the console closes afterwards.
    async fn keypress_pacer(keys: &[&str], shutdown_rx: watch::Receiver<bool>) -> Pacer {
        let (key_tx, key_rx) = mpsc::channel(keys.len().max(1));
        for key in keys {
            key_tx.send(key.to_string()).await.unwrap();
        }
        let config = PacingConfig::new(Policy::Keypress, Duration::ZERO, Duration::ZERO);
        Pacer::new(config, shutdown_rx).with_keys(key_rx)
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[tokio::test]
    async fn frames_are_saved_and_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let config = session_config(dir.path(), "img%02d.jpg");
        let (_shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        let mut pacer = keypress_pacer(&["", "", "x"], shutdown_rx.clone()).await;
        let fix = NavigationFix::at(
            Coordinate::from_raw(Axis::Latitude, Rational::new(-123456, 100).unwrap()),
            Coordinate::from_raw(Axis::Longitude, Rational::new(1131000, 1000).unwrap()),
        );
        let (_fix_tx, fix_rx) = watch::channel(Some(fix));
        let mut coordinator = coordinator();

        let summary = timeout(
            Duration::from_secs(20),
            run_session(&mut coordinator, &mut pacer, &config, &fix_rx, &mut shutdown_rx),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(
            summary,
            SessionSummary {
                saved: 2,
                failed: 0,
                interrupted: false
            }
        );
        let first = fs::read(dir.path().join("img01.jpg")).unwrap();
        let second = fs::read(dir.path().join("img02.jpg")).unwrap();
        assert!(!dir.path().join("img02.jpg~").exists());
        assert_eq!(fs::read(dir.path().join("latest.jpg")).unwrap(), second);
        assert!(contains(&first, "GPS.GPSLatitudeRef=S"));
        assert!(contains(&first, "IFD0.Make=Pattern"));
        assert_eq!(coordinator.pool().free(), 3);
    }

    #[tokio::test]
    async fn unopenable_target_only_fails_that_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = session_config(dir.path(), "missing/img%d.jpg");
        let (_shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        let mut pacer = keypress_pacer(&["", ""], shutdown_rx.clone()).await;
        let (_fix_tx, fix_rx) = watch::channel(None);

        let summary = run_session(
            &mut coordinator(),
            &mut pacer,
            &config,
            &fix_rx,
            &mut shutdown_rx,
        )
        .await
        .unwrap();
        assert_eq!(summary.saved, 0);
        assert_eq!(summary.failed, 2);
    }

    /// Accepts every setting but never starts a capture.
    struct DeadTrigger {
        link: Option<OutputLink>,
    }

    impl StillEncoder for DeadTrigger {
        fn set_metadata(&mut self, _metadata: Metadata) -> Result<()> {
            Ok(())
        }
        fn set_raw_capture(&mut self, _enabled: bool) -> Result<()> {
            Ok(())
        }
        fn set_shutter_speed(&mut self, _micros: u32) -> Result<()> {
            Ok(())
        }
        fn enable_output(&mut self, link: OutputLink) -> Result<()> {
            self.link = Some(link);
            Ok(())
        }
        fn capture(&mut self) -> Result<()> {
            anyhow::bail!("capture trigger not armed")
        }
        fn disable_output(&mut self) -> Result<()> {
            self.link = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn fatal_cycle_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = session_config(dir.path(), "img%d.jpg");
        let (_shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        let mut pacer = keypress_pacer(&[""], shutdown_rx.clone()).await;
        let (_fix_tx, fix_rx) = watch::channel(None);
        let mut coordinator =
            Coordinator::new(DeadTrigger { link: None }, SlotPool::new(2, 64).unwrap());

        let res = run_session(
            &mut coordinator,
            &mut pacer,
            &config,
            &fix_rx,
            &mut shutdown_rx,
        )
        .await;
        assert!(res.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(coordinator.pool().free(), 2);
    }

    #[tokio::test]
    async fn shutdown_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = session_config(dir.path(), "img%d.jpg");
        let (shutdown_tx, mut shutdown_rx) = common::shutdown_channel();
        let (_key_tx, key_rx) = mpsc::channel(1);
        let pacing = PacingConfig::new(Policy::Keypress, Duration::ZERO, Duration::ZERO);
        let mut pacer = Pacer::new(pacing, shutdown_rx.clone()).with_keys(key_rx);
        let (_fix_tx, fix_rx) = watch::channel(None);
        shutdown_tx.send(true).unwrap();

        let summary = run_session(
            &mut coordinator(),
            &mut pacer,
            &config,
            &fix_rx,
            &mut shutdown_rx,
        )
        .await
        .unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.saved, 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

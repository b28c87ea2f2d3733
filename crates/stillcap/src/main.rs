use anyhow::{Context, Result};
use clap::Parser;
use log::*;
use std::path::Path;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use camera::{FrameSource, PatternSource, Still, V4l2Source};
use common::{init_log, run_termination_watch, shutdown_channel, wait_tasks};
use gps::run_gps;
use pacing::triggers::{run_console, run_signal_trigger};
use pacing::{Pacer, Policy};
use photosaver::OutputConfig;
use phototaker::{Coordinator, SlotPool};
use proto::NavigationFix;
use session::{run_session, SessionConfig, SessionSummary, TagConfig};

mod args;

use args::Args;

/// Exit status after SIGINT or SIGTERM.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    init_log();
    let args = Args::parse();

    let code = match run(args).await {
        Ok(summary) if summary.interrupted => EXIT_INTERRUPTED,
        Ok(_) => 0,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };
    // a console reader may still be parked on stdin
    std::process::exit(code);
}

async fn run(args: Args) -> Result<SessionSummary> {
    args.validate()?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let (fix_tx, fix_rx) = watch::channel::<Option<NavigationFix>>(None);

    let mut tasks = JoinSet::<Result<()>>::new();
    tasks.spawn(run_termination_watch(shutdown_tx.clone(), shutdown_rx.clone()));

    match gps::open_port(&args.gps_port, args.gps_baud) {
        Ok(port) => {
            tasks.spawn(run_gps(port, fix_tx, shutdown_rx.clone()));
        }
        Err(e) => warn!("capturing without GPS: {e:#}"),
    }

    let pacing = args.pacing();
    info!("pacing {:?}", pacing);
    let mut pacer = Pacer::new(pacing, shutdown_rx.clone());

    let trigger_tx = if pacing.policy == Policy::Signal {
        let (tx, rx) = mpsc::channel(1);
        pacer = pacer.with_signals(rx);
        Some(tx)
    } else {
        None
    };
    tasks.spawn(run_signal_trigger(trigger_tx, shutdown_rx.clone()));

    // kept out of the join set, stdin reads cannot be interrupted
    let console = if pacing.policy == Policy::Keypress {
        let (key_tx, key_rx) = mpsc::channel(1);
        pacer = pacer.with_keys(key_rx);
        Some(tokio::spawn(run_console(tokio::io::stdin(), key_tx)))
    } else {
        None
    };

    let res = if args.test_pattern {
        let source = PatternSource::new(args.width, args.height);
        capture(source, "test-pattern", &args, &mut pacer, &fix_rx, shutdown_rx.clone()).await
    } else {
        match V4l2Source::open(&args.device, args.width, args.height)
            .with_context(|| format!("failed to open camera {}", args.device))
        {
            Ok(source) => {
                let model = Path::new(&args.device)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| args.device.clone());
                capture(source, &model, &args, &mut pacer, &fix_rx, shutdown_rx.clone()).await
            }
            Err(e) => Err(e),
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(console) = console {
        console.abort();
    }
    wait_tasks(tasks).await;
    res
}

async fn capture<S: FrameSource>(
    source: S,
    model: &str,
    args: &Args,
    pacer: &mut Pacer,
    fix_rx: &watch::Receiver<Option<NavigationFix>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<SessionSummary> {
    let pool = SlotPool::new(args.slots, args.slot_size).context("failed to create output pool")?;
    let mut coordinator = Coordinator::new(Still::new(source, args.quality), pool);

    let config = SessionConfig {
        output: OutputConfig {
            pattern: args.output.clone(),
            latest: args.latest.clone(),
            naming: args.naming(),
        },
        tags: TagConfig {
            enabled: !args.no_exif,
            make: "stillcap".to_string(),
            model: model.to_string(),
            user: args.tags.clone(),
        },
        raw: args.raw,
        shutter_speed: args.shutter,
    };

    run_session(&mut coordinator, pacer, &config, fix_rx, &mut shutdown_rx).await
}

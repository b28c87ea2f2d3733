use log::*;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration, Instant};

use common::shutdown_requested;

pub mod timelapse;
pub mod triggers;

use timelapse::TimelapseStep;

/// Pause between frames when running forever.
const FOREVER_PAUSE: Duration = Duration::from_secs(10);
/// Lets exposure and gain settle before the first immediate frame.
const IMMEDIATE_SETTLE: Duration = Duration::from_millis(1000);
const IMMEDIATE_PAUSE: Duration = Duration::from_millis(30);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Policy {
    Single,
    Forever,
    Timelapse,
    Keypress,
    Signal,
    Immediately,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PacingConfig {
    pub policy: Policy,
    /// Total run time; zero means unlimited.
    pub timeout: Duration,
    pub interval: Duration,
}

impl PacingConfig {
    /// Single with no timeout becomes Forever and a zero interval timelapse
    /// becomes Immediately.
    pub fn new(policy: Policy, timeout: Duration, interval: Duration) -> Self {
        let policy = match policy {
            Policy::Single if timeout.is_zero() => Policy::Forever,
            Policy::Timelapse if interval.is_zero() => Policy::Immediately,
            policy => policy,
        };
        Self {
            policy,
            timeout,
            interval,
        }
    }
}

/// Everything that has to survive between two decisions.
#[derive(Clone, Copy, Default, Debug)]
pub struct PacingState {
    pub deadline: Option<Instant>,
    pub next_frame_at: Option<Instant>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Next {
    /// Capture with this frame number and ask again afterwards.
    Capture(u32),
    /// Capture with this frame number, then end the session.
    Last(u32),
    Stop,
}

pub struct Pacer {
    config: PacingConfig,
    state: PacingState,
    keys: Option<mpsc::Receiver<String>>,
    signals: Option<mpsc::Receiver<()>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Pacer {
    pub fn new(config: PacingConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            state: PacingState::default(),
            keys: None,
            signals: None,
            shutdown_rx,
        }
    }

    pub fn with_keys(mut self, keys: mpsc::Receiver<String>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_signals(mut self, signals: mpsc::Receiver<()>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    /// Waits until the next capture may start. `frame` is the last frame
    /// number used.
    pub async fn next_frame(&mut self, frame: u32) -> Next {
        let now = Instant::now();
        let deadline = *self
            .state
            .deadline
            .get_or_insert(now + self.config.timeout);
        let expired = !self.config.timeout.is_zero() && now >= deadline;

        match self.config.policy {
            Policy::Single => {
                if self.pause(self.config.timeout).await {
                    Next::Last(frame)
                } else {
                    Next::Stop
                }
            }
            Policy::Forever => {
                if self.pause(FOREVER_PAUSE).await {
                    Next::Capture(frame + 1)
                } else {
                    Next::Stop
                }
            }
            _ if expired => {
                info!("run time of {:?} reached", self.config.timeout);
                Next::Stop
            }
            Policy::Timelapse => self.next_timelapse(frame).await,
            Policy::Keypress => self.next_keypress(frame).await,
            Policy::Signal => self.next_signal(frame).await,
            Policy::Immediately => {
                let pause = if frame == 0 {
                    IMMEDIATE_SETTLE
                } else {
                    IMMEDIATE_PAUSE
                };
                if self.pause(pause).await {
                    Next::Capture(frame + 1)
                } else {
                    Next::Stop
                }
            }
        }
    }

    async fn next_timelapse(&mut self, frame: u32) -> Next {
        let interval = self.config.interval;
        let mut frame = frame + 1;

        let Some(next_at) = self.state.next_frame_at else {
            if !self.pause(interval).await {
                return Next::Stop;
            }
            self.state.next_frame_at = Some(Instant::now() + interval);
            return Next::Capture(frame);
        };

        let (step, following) = timelapse::plan(next_at, Instant::now(), interval);
        self.state.next_frame_at = Some(following);
        let wait = match step {
            TimelapseStep::Wait(wait) => wait,
            TimelapseStep::Late(late) => {
                warn!("frame {frame} is {} ms late", late.as_millis());
                Duration::ZERO
            }
            TimelapseStep::Skip { frames, wait } => {
                warn!("skipping frame {frame} to restart at frame {}", frame + frames);
                frame += frames;
                wait
            }
        };

        if wait.is_zero() || self.pause(wait).await {
            Next::Capture(frame)
        } else {
            Next::Stop
        }
    }

    async fn next_keypress(&mut self, frame: u32) -> Next {
        let Some(keys) = self.keys.as_mut() else {
            error!("keypress pacing without console input");
            return Next::Stop;
        };
        info!("Press Enter to capture, X then Enter to exit");

        let line = tokio::select! {
            line = keys.recv() => line,
            _ = shutdown_requested(&mut self.shutdown_rx) => return Next::Stop,
        };
        match line {
            None => {
                info!("console closed");
                Next::Stop
            }
            Some(line) if line.starts_with(|c: char| c.eq_ignore_ascii_case(&'x')) => Next::Stop,
            Some(_) => Next::Capture(frame + 1),
        }
    }

    async fn next_signal(&mut self, frame: u32) -> Next {
        let Some(signals) = self.signals.as_mut() else {
            error!("signal pacing without a signal source");
            return Next::Stop;
        };
        info!("Waiting for SIGUSR1 to initiate capture");

        let received = tokio::select! {
            s = signals.recv() => s,
            _ = shutdown_requested(&mut self.shutdown_rx) => return Next::Stop,
        };
        match received {
            Some(()) => {
                debug!("received SIGUSR1");
                Next::Capture(frame + 1)
            }
            None => Next::Stop,
        }
    }

    /// Sleeps unless shutdown comes first; false means shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = shutdown_requested(&mut self.shutdown_rx) => false,
        }
    }
}

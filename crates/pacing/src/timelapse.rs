use tokio::time::{Duration, Instant};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimelapseStep {
    /// On schedule: wait this long before capturing.
    Wait(Duration),
    /// Behind by less than half an interval: capture right away.
    Late(Duration),
    /// Too far behind: drop `frames` frame numbers, then wait to realign.
    Skip { frames: u32, wait: Duration },
}

/// Decides how to reach the capture scheduled at `next_at` given the current
/// time. Returns the step and the instant of the capture after this one.
pub fn plan(next_at: Instant, now: Instant, interval: Duration) -> (TimelapseStep, Instant) {
    if next_at >= now {
        return (TimelapseStep::Wait(next_at - now), next_at + interval);
    }

    let late = now - next_at;
    if late < interval / 2 {
        return (TimelapseStep::Late(late), next_at + interval);
    }

    let frames = 1 + (late.as_nanos() / interval.as_nanos().max(1)) as u32;
    let wait = interval * frames - late;
    (
        TimelapseStep::Skip { frames, wait },
        next_at + interval * (frames + 1),
    )
}

use futures::Stream;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

/// Highest percentage shown before the job is known to be complete.
pub const PROGRESS_CAP: u8 = 95;

pub const COMPLETE_LABEL: &str = "Analysis Complete!";

/// Time-driven progress shown while a job is in flight.
///
/// Purely cosmetic: it never reflects the job's actual status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub label: &'static str,
}

impl Progress {
    pub fn at(percent: u8) -> Self {
        let percent = percent.min(PROGRESS_CAP);
        Self {
            percent,
            label: label_for(percent),
        }
    }

    pub fn completed() -> Self {
        Self {
            percent: 100,
            label: COMPLETE_LABEL,
        }
    }
}

pub fn label_for(percent: u8) -> &'static str {
    match percent {
        0 => "Initializing AI...",
        p if p < 25 => "Initializing Neural Network...",
        p if p < 50 => "Identifying Body Keypoints...",
        p if p < 75 => "Calculating Biometric Data...",
        _ => "Finalizing Technique Report...",
    }
}

/// One point per elapsed `tick`, capped at [`PROGRESS_CAP`].
pub fn progress_at(elapsed: Duration, tick: Duration) -> Progress {
    if tick.is_zero() {
        return Progress::at(PROGRESS_CAP);
    }
    let ticks = elapsed.as_nanos() / tick.as_nanos();
    Progress::at(u8::try_from(ticks).unwrap_or(u8::MAX))
}

/// Yields the current [`Progress`] every `tick`, starting at 0%.
///
/// Never ends on its own; drop it once the watch finishes.
pub fn ticker(tick: Duration) -> impl Stream<Item = Progress> + Send + 'static {
    let started = Instant::now();
    let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    IntervalStream::new(interval).map(move |at| progress_at(at.duration_since(started), tick))
}

pub mod progress;
pub mod status_watcher;

pub use progress::{Progress, progress_at, ticker};
pub use status_watcher::{JobStatusWatcher, Subscription, WatchEvent, WatchOutcome};

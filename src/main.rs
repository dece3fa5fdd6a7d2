use coachcam::error::{AppError, PipelineError};
use coachcam::intake::VideoUpload;
use coachcam::pipeline::{PoseDetector, RecordedPoseDetector};
use coachcam::store::{SessionMetadata, VideoReference};
use coachcam::watcher::progress::{self, Progress};
use coachcam::{Coordinator, Settings, WatchEvent, WatchOutcome};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, info};

const USAGE: &str = "usage: coachcam <video-file | frames-dir> <pose-track.json> [user-id]";

fn init_logging(level: Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::load()?;
    init_logging(settings.log_level()?);

    let mut args = std::env::args().skip(1);
    let (Some(video_path), Some(track_path)) = (args.next(), args.next()) else {
        eprintln!("{}", USAGE);
        return Err(AppError::Coordinator(USAGE.to_string()));
    };
    let user_id = args.next().unwrap_or_else(|| "local".to_string());

    let detector = RecordedPoseDetector::from_file(&track_path)
        .await
        .map_err(PipelineError::Detection)?;
    info!("Loaded {} recorded poses from {}", detector.len(), track_path);
    let detectors = move || -> Box<dyn PoseDetector> { Box::new(detector.clone()) };

    let tick = settings.watcher.progress_tick();
    let coordinator = Coordinator::builder(settings)
        .detectors(Arc::new(detectors))
        .build()?;

    let path = Path::new(&video_path);
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| video_path.clone());
    let job = if path.is_dir() {
        let video = VideoReference {
            url: format!("file://{}", video_path),
            public_id: name.clone(),
            file_name: name,
        };
        coordinator
            .submit_stored(user_id, video, SessionMetadata::default())
            .await?
    } else {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Coordinator(format!("Failed to read {}: {}", video_path, e)))?;
        coordinator
            .submit(VideoUpload {
                user_id,
                file_name: name,
                bytes,
                metadata: SessionMetadata::default(),
            })
            .await?
    };

    let subscription = coordinator
        .watcher()
        .subscribe(job.id, |event| {
            if let WatchEvent::Status(status) = event {
                info!("Job status: {}", status);
            }
        })
        .await?;

    let outcome = subscription.outcome();
    tokio::pin!(outcome);
    let mut ticks = Box::pin(progress::ticker(tick));
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut outcome => break outcome,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                coordinator.shutdown().await;
            }
            Some(progress) = ticks.next() => {
                println!("{:>3}% {}", progress.percent, progress.label);
            }
        }
    };

    match outcome {
        WatchOutcome::Completed(report) => {
            let done = Progress::completed();
            println!("{:>3}% {}", done.percent, done.label);
            println!(
                "Score: {} ({} of {} sampled frames scored)",
                report.result.score, report.coverage.scored, report.coverage.sampled
            );
            for line in &report.result.feedback {
                println!("- {}", line);
            }
        }
        WatchOutcome::Failed(cause) => println!("Analysis failed: {}", cause),
        WatchOutcome::StillProcessing => {
            println!("Analysis is still processing. Check back later.")
        }
        WatchOutcome::Lost(reason) => println!("Lost track of the analysis: {}", reason),
        WatchOutcome::Cancelled => println!("Stopped watching."),
    }

    coordinator.shutdown().await;
    Ok(())
}

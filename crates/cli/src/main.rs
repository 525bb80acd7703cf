mod config;
mod report;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;

use examguard_core::camera::domain::camera_source::CameraSource;
use examguard_core::camera::infrastructure::ffmpeg_camera::{CaptureDevice, FfmpegCamera};
use examguard_core::detection::infrastructure::onnx_inference_provider::OnnxInferenceProvider;
use examguard_core::evidence::infrastructure::jpeg_snapshot_encoder::JpegSnapshotEncoder;
use examguard_core::monitoring::domain::violation::{Violation, ViolationType};
use examguard_core::monitoring::face_monitor::{FaceMonitor, ReferenceCapture};
use examguard_core::monitoring::monitor_event::MonitorEvent;

/// Pause between failed reference capture attempts.
const ENROLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Webcam face-presence monitoring for proctored exams.
#[derive(Parser)]
#[command(name = "examguard", version)]
struct Cli {
    /// JSON config file (default: <config dir>/ExamGuard/config.json if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing the face models.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Base URL models are downloaded from when missing locally.
    #[arg(long, global = true)]
    model_url: Option<String>,

    /// Capture device (e.g. /dev/video1 on Linux, 1 on macOS).
    #[arg(long, global = true)]
    device: Option<String>,

    /// Read frames from a video file instead of a camera.
    #[arg(long, global = true, conflicts_with = "device")]
    video: Option<PathBuf>,

    /// Milliseconds between sampled frames.
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Maximum embedding distance accepted as the enrolled candidate.
    #[arg(long, global = true)]
    match_threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the live face count without enrolling anyone.
    Preview {
        /// Seconds to run.
        #[arg(long, default_value = "15")]
        duration: u64,
    },
    /// Enroll the candidate, monitor the session and write a violation report.
    Monitor {
        /// Directory for report.json and evidence images.
        #[arg(long)]
        output: PathBuf,

        /// Seconds to monitor after enrolment.
        #[arg(long, default_value = "60")]
        duration: u64,

        /// Seconds to wait before capturing the reference face.
        #[arg(long, default_value = "3")]
        enroll_delay: u64,

        /// Reference capture attempts before giving up.
        #[arg(long, default_value = "5")]
        enroll_attempts: u32,
    },
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            models_dir: self.models_dir.clone(),
            model_url: self.model_url.clone(),
            interval_ms: self.interval_ms,
            match_threshold: self.match_threshold,
        }
    }

    fn camera(&self) -> FfmpegCamera {
        match (&self.video, &self.device) {
            (Some(path), _) => FfmpegCamera::new(CaptureDevice::file(path)),
            (None, Some(name)) => FfmpegCamera::new(CaptureDevice::platform_named(name)),
            (None, None) => FfmpegCamera::default(),
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    config::apply_overrides(&mut config, &cli.overrides());
    config.validate()?;

    let camera: Box<dyn CameraSource> = Box::new(cli.camera());
    let provider = OnnxInferenceProvider::new().with_download_progress(Arc::new(download_progress));
    let encoder = JpegSnapshotEncoder::new(config.evidence_quality);
    let monitor = FaceMonitor::new(config, Box::new(provider), camera, Box::new(encoder))?;

    match cli.command {
        Command::Preview { duration } => run_preview(&monitor, Duration::from_secs(duration)),
        Command::Monitor {
            output,
            duration,
            enroll_delay,
            enroll_attempts,
        } => run_monitor(
            &monitor,
            &output,
            Duration::from_secs(duration),
            Duration::from_secs(enroll_delay),
            enroll_attempts,
        ),
    }
}

fn run_preview(monitor: &FaceMonitor, duration: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let ready = monitor.initialize();
    eprintln!();
    if !ready {
        log::warn!("Face models unavailable; only the camera feed is checked");
    }

    let events = monitor.subscribe();
    monitor.start_camera()?;
    wait_for_events(&events, duration, |event| {
        if let MonitorEvent::StateChanged(snapshot) = event {
            if snapshot.models_ready {
                eprint!("\r{:<40}", face_status(snapshot.current_face_count));
            }
        }
    });
    eprintln!();
    monitor.stop_camera();
    Ok(())
}

fn run_monitor(
    monitor: &FaceMonitor,
    output: &Path,
    duration: Duration,
    enroll_delay: Duration,
    enroll_attempts: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    monitor.initialize();
    eprintln!();
    monitor.start_camera()?;
    if !monitor.models_ready() {
        let reason = monitor.snapshot().model_error.unwrap_or_default();
        monitor.stop_camera();
        return Err(format!("face models are required for monitoring ({reason})").into());
    }

    eprintln!(
        "Look straight at the camera. Capturing your reference face in {}s...",
        enroll_delay.as_secs()
    );
    thread::sleep(enroll_delay);
    enroll(monitor, enroll_attempts)?;

    let events = monitor.subscribe();
    monitor.start_monitoring()?;
    eprintln!("Monitoring for {}s. Stay in view.", duration.as_secs());
    wait_for_events(&events, duration, |event| {
        if let MonitorEvent::ViolationRecorded(violation) = event {
            eprintln!("{}", describe_violation(&violation));
        }
    });

    let violations = monitor.violations();
    let summary = monitor.violation_summary();
    let threshold = monitor.config().match_threshold;
    monitor.stop_camera();

    let path = report::write_report(output, &violations, &summary, threshold, Utc::now())?;
    eprintln!(
        "{} violation(s) ({} no face, {} multiple faces, {} mismatch). Report: {}",
        summary.total,
        summary.no_face,
        summary.multiple_faces,
        summary.face_mismatch,
        path.display()
    );
    Ok(())
}

fn enroll(monitor: &FaceMonitor, attempts: u32) -> Result<(), Box<dyn std::error::Error>> {
    for attempt in 1..=attempts {
        match monitor.capture_reference_face()? {
            ReferenceCapture::Captured => {
                eprintln!("Reference face captured.");
                return Ok(());
            }
            outcome => {
                eprintln!("Attempt {attempt}/{attempts}: {}", capture_guidance(outcome));
                if attempt < attempts {
                    thread::sleep(ENROLL_RETRY_DELAY);
                }
            }
        }
    }
    Err(format!("could not capture a reference face after {attempts} attempt(s)").into())
}

/// Forwards events to `handle` until `duration` has passed.
fn wait_for_events(
    events: &crossbeam_channel::Receiver<MonitorEvent>,
    duration: Duration,
    mut handle: impl FnMut(MonitorEvent),
) {
    let deadline = Instant::now() + duration;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(event) => handle(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn face_status(count: usize) -> String {
    match count {
        0 => "No face detected".to_string(),
        1 => "Face detected".to_string(),
        n => format!("{n} faces detected"),
    }
}

fn capture_guidance(outcome: ReferenceCapture) -> String {
    match outcome {
        ReferenceCapture::Captured => "Reference face captured.".to_string(),
        ReferenceCapture::NoFace => {
            "No face detected. Make sure your face is visible and well lit.".to_string()
        }
        ReferenceCapture::MultipleFaces { count } => {
            format!("{count} faces detected. Only the candidate may be in view.")
        }
        ReferenceCapture::MissingEmbedding => {
            "Face found but could not be analysed. Face the camera directly.".to_string()
        }
        ReferenceCapture::FrameNotReady => "Camera is still starting, retrying.".to_string(),
    }
}

fn describe_violation(violation: &Violation) -> String {
    let what = match violation.kind {
        ViolationType::NoFace => "no face in view".to_string(),
        ViolationType::MultipleFaces => format!("{} faces in view", violation.face_count),
        ViolationType::FaceMismatch => match violation.match_distance {
            Some(d) => format!("face does not match the reference (distance {d:.2})"),
            None => "face does not match the reference".to_string(),
        },
        ViolationType::None => "no violation".to_string(),
    };
    format!("[{}] Violation: {what}", violation.timestamp.format("%H:%M:%S"))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face models... {pct}%");
    } else {
        eprint!("\rDownloading face models... {downloaded} bytes");
    }
}

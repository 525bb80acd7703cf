use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};

use crate::camera::domain::camera_source::{
    CameraError, CameraSource, FacingMode, ReadyState, SinkState, StreamConstraints, VideoStream,
};
use crate::shared::frame::Frame;

// errno values shared by Linux, macOS and the Windows CRT.
const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const ENXIO: i32 = 6;
const EACCES: i32 = 13;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;

/// Capture requests a frame rate most webcams support at VGA.
const CAPTURE_FRAME_RATE: &str = "30";

/// Longest a paced file stream sleeps before re-checking for `stop`.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What ffmpeg should open: a capture device through a named input device
/// format, or a media file read as if it were a camera. Files play back at
/// their recorded speed and end the stream when exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureDevice {
    Device { format: String, name: String },
    File(PathBuf),
}

impl CaptureDevice {
    /// The first camera of the platform's native capture API.
    pub fn platform_default() -> Self {
        let (format, name) = if cfg!(target_os = "macos") {
            ("avfoundation", "0")
        } else if cfg!(target_os = "windows") {
            ("dshow", "video=Integrated Camera")
        } else {
            ("v4l2", "/dev/video0")
        };
        Self::Device {
            format: format.to_string(),
            name: name.to_string(),
        }
    }

    /// Same capture API as [`CaptureDevice::platform_default`], different
    /// device name.
    pub fn platform_named(name: &str) -> Self {
        match Self::platform_default() {
            Self::Device { format, .. } => Self::Device {
                format,
                name: name.to_string(),
            },
            file => file,
        }
    }

    pub fn file(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }

    fn describe(&self) -> String {
        match self {
            Self::Device { format, name } => format!("{format}:{name}"),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Camera source backed by ffmpeg's capture devices (libavdevice).
///
/// Each stream owns a capture thread that decodes frames to RGB24 and keeps
/// only the most recent one.
pub struct FfmpegCamera {
    device: CaptureDevice,
}

impl FfmpegCamera {
    pub fn new(device: CaptureDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new(CaptureDevice::platform_default())
    }
}

impl CameraSource for FfmpegCamera {
    fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn VideoStream>, CameraError> {
        if constraints.facing_mode == FacingMode::Environment {
            log::debug!(
                "Facing mode is not selectable on capture devices; using {}",
                self.device.describe()
            );
        }

        let capture = Arc::new(CaptureState::new());
        let (ready_tx, ready_rx) = bounded(1);
        let device = self.device.clone();
        let constraints = *constraints;
        let thread_capture = Arc::clone(&capture);

        let handle = std::thread::Builder::new()
            .name("examguard-capture".into())
            .spawn(move || capture_loop(&device, &constraints, &thread_capture, ready_tx))
            .map_err(|e| CameraError::Other(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok((width, height))) => {
                log::info!(
                    "Camera {} streaming at {width}x{height}",
                    self.device.describe()
                );
                Ok(Arc::new(FfmpegStream {
                    capture,
                    worker: Mutex::new(Some(handle)),
                }))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CameraError::Other("capture thread exited before opening the device".into()))
            }
        }
    }
}

/// State written by the capture thread and read by the stream handle.
struct CaptureState {
    latest: Mutex<Option<Frame>>,
    sink: Mutex<SinkState>,
    stop: AtomicBool,
}

impl CaptureState {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            sink: Mutex::new(SinkState::NOT_READY),
            stop: AtomicBool::new(false),
        }
    }

    fn update_sink(&self, f: impl FnOnce(&mut SinkState)) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sink);
    }
}

pub struct FfmpegStream {
    capture: Arc<CaptureState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VideoStream for FfmpegStream {
    fn sink(&self) -> SinkState {
        *self.capture.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_frame(&self) -> Option<Frame> {
        self.capture
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&self) {
        self.capture.stop.store(true, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("Capture thread panicked");
            }
            self.capture.update_sink(|sink| {
                sink.ready_state = ReadyState::HaveNothing;
                sink.ended = true;
            });
            *self.capture.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
            log::info!("Camera stream stopped");
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

type OpenResult = Result<(u32, u32), CameraError>;

fn capture_loop(
    device: &CaptureDevice,
    constraints: &StreamConstraints,
    capture: &CaptureState,
    ready_tx: Sender<OpenResult>,
) {
    let opened = open_input(device, constraints).and_then(|ictx| {
        let decoder = open_decoder(&ictx).map_err(|e| CameraError::Other(e.to_string()))?;
        Ok((ictx, decoder))
    });
    let (mut ictx, mut decoder, stream_index) = match opened {
        Ok((ictx, (decoder, index))) => (ictx, decoder, index),
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let (width, height) = (decoder.width(), decoder.height());
    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    );
    let mut scaler = match scaler {
        Ok(scaler) => scaler,
        Err(e) => {
            let _ = ready_tx.send(Err(CameraError::Other(format!("unsupported pixel format: {e}"))));
            return;
        }
    };

    capture.update_sink(|sink| {
        sink.width = width;
        sink.height = height;
        sink.ready_state = ReadyState::HaveMetadata;
    });
    let time_base = ictx.stream(stream_index).map(|stream| stream.time_base());
    let _ = ready_tx.send(Ok((width, height)));

    // Devices deliver frames in real time on their own; files must be paced.
    let mut clock = match (device, time_base) {
        (CaptureDevice::File(_), Some(time_base)) => Some(PlaybackClock::new(time_base)),
        _ => None,
    };

    let mut sequence = 0u64;
    // Returns false once `stop` was raised while waiting for a frame's time.
    let mut publish = |decoder: &mut ffmpeg_next::decoder::Video| -> bool {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = scaler.run(&decoded, &mut rgb) {
                log::debug!("Dropping camera frame: {e}");
                continue;
            }
            let pts = decoded.timestamp().or_else(|| decoded.pts());
            if let (Some(clock), Some(pts)) = (clock.as_mut(), pts) {
                if !wait_until_due(clock.due(pts), &capture.stop) {
                    return false;
                }
            }
            let frame = Frame::new(extract_rgb_pixels(&rgb, width, height), width, height, 3, sequence);
            sequence += 1;
            *capture.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            capture.update_sink(|sink| sink.ready_state = ReadyState::HaveEnoughData);
        }
        true
    };

    for (stream, packet) in ictx.packets() {
        if capture.stop.load(Ordering::SeqCst) {
            return;
        }
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_ok() && !publish(&mut decoder) {
            return;
        }
    }

    if decoder.send_eof().is_ok() && !publish(&mut decoder) {
        return;
    }
    capture.update_sink(|sink| sink.ended = true);
    log::info!("Camera {} reached end of stream", device.describe());
}

/// Maps presentation timestamps of a file onto wall-clock deadlines, with
/// the first decoded frame due at the moment playback started.
struct PlaybackClock {
    started: Instant,
    seconds_per_tick: f64,
    origin: Option<i64>,
}

impl PlaybackClock {
    fn new(time_base: ffmpeg_next::Rational) -> Self {
        let seconds_per_tick = if time_base.denominator() == 0 {
            0.0
        } else {
            f64::from(time_base.numerator()) / f64::from(time_base.denominator())
        };
        Self {
            started: Instant::now(),
            seconds_per_tick,
            origin: None,
        }
    }

    /// When the frame stamped `pts` should become the latest frame. Frames
    /// stamped before the first one are due immediately.
    fn due(&mut self, pts: i64) -> Instant {
        let origin = *self.origin.get_or_insert(pts);
        let offset = pts.saturating_sub(origin).max(0) as f64 * self.seconds_per_tick;
        self.started + Duration::try_from_secs_f64(offset).unwrap_or(Duration::ZERO)
    }
}

/// Sleeps until `due`, waking regularly to honour `stop`. Returns false when
/// stopped first.
fn wait_until_due(due: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= due {
            return true;
        }
        std::thread::sleep((due - now).min(STOP_POLL_INTERVAL));
    }
}

fn open_input(
    device: &CaptureDevice,
    constraints: &StreamConstraints,
) -> Result<ffmpeg_next::format::context::Input, CameraError> {
    ffmpeg_next::init().map_err(|e| CameraError::Other(e.to_string()))?;

    match device {
        CaptureDevice::File(path) => ffmpeg_next::format::input(path)
            .map_err(|e| classify_open_error(&path.display().to_string(), e)),
        CaptureDevice::Device { format, name } => {
            ffmpeg_next::device::register_all();
            let input_format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == format.as_str())
                .ok_or_else(|| {
                    CameraError::Other(format!("ffmpeg was built without the {format} input device"))
                })?;

            let mut options = ffmpeg_next::Dictionary::new();
            options.set("video_size", &format!("{}x{}", constraints.width, constraints.height));
            options.set("framerate", CAPTURE_FRAME_RATE);

            match ffmpeg_next::format::open_with(name, &input_format, options) {
                Ok(ffmpeg_next::format::context::Context::Input(ictx)) => Ok(ictx),
                Ok(_) => Err(CameraError::Other(format!("{format} did not open an input"))),
                Err(e) => Err(classify_open_error(name, e)),
            }
        }
    }
}

fn open_decoder(
    ictx: &ffmpeg_next::format::context::Input,
) -> Result<(ffmpeg_next::decoder::Video, usize), Box<dyn std::error::Error>> {
    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("device has no video stream")?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;
    Ok((decoder, stream.index()))
}

/// Maps an ffmpeg open failure onto the camera error the user can act on.
fn classify_open_error(device: &str, err: ffmpeg_next::Error) -> CameraError {
    let detail = format!("{device}: {err}");
    match err {
        ffmpeg_next::Error::Other { errno } => match errno {
            EPERM | EACCES => CameraError::PermissionDenied(detail),
            ENOENT | ENXIO | ENODEV => CameraError::NotFound(detail),
            EBUSY => CameraError::Other(format!("{detail} (in use by another application)")),
            _ => CameraError::Other(detail),
        },
        _ => CameraError::Other(detail),
    }
}

/// Copies pixel data into a tightly packed RGB buffer, dropping the row
/// padding ffmpeg may add.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

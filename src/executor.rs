//! Segment-by-segment processing of a live stream.
//!
//! Frames are grouped into fixed-size segments. Each segment is handed to the
//! detection component, the resulting tracks are repaired, and the executor
//! publishes an activity alert (when anything was found) and a segment
//! summary (always). Shutdown requests are only honored between segments.

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::backoff::{Clock, SystemClock};
use crate::capture::{FfmpegSource, Frame, StreamCapture, VideoSource};
use crate::clienv;
use crate::codec::WireCodec;
use crate::component::{ComponentHandle, MediaKind, VideoJob};
use crate::error::{ExecutorError, ExitCode, Result};
use crate::job_config::JobConfig;
use crate::model::{ActivityAlert, JobIdentity, JobStatus, SegmentSummary, Track};
use crate::transport::Publisher;
use crate::watcher::{ControlWatcher, QuitPoll, QuitStatus};

pub const IN_PROGRESS: &str = "IN_PROGRESS";
pub const STALLED: &str = "STALLED";
pub const STOPPED: &str = "STOPPED";

/// Load the job's component and get it ready for video.
pub fn prepare_component(config: &JobConfig) -> Result<ComponentHandle> {
    config.export_environment();

    let run_dir = config.run_directory();
    fs::create_dir_all(&run_dir)?;

    let mut component = ComponentHandle::load(&config.component.library_path)?;
    start_component(&mut component, &run_dir)?;
    info!(
        component = %config.component.name,
        detection_type = %component.detection_type(),
        "Detection component ready"
    );
    Ok(component)
}

pub fn start_component(component: &mut ComponentHandle, run_dir: &std::path::Path) -> Result<()> {
    component.set_run_directory(run_dir);
    if !component.init() {
        return Err(ExecutorError::fatal(
            ExitCode::ComponentInitError,
            format!("Detection component {} failed to initialize", component.name()),
        ));
    }
    if !component.supports(MediaKind::Video) {
        return Err(ExecutorError::fatal(
            ExitCode::ComponentUnsupported,
            format!("Detection component {} does not support video", component.name()),
        ));
    }
    Ok(())
}

/// Run a job end to end: component, control channel, stream, loop.
pub fn launch(config: &JobConfig, publisher: Box<dyn Publisher>) -> Result<()> {
    let component = prepare_component(config)?;

    // Started after the component environment has been exported.
    let watcher = ControlWatcher::stdin()?;

    let source = FfmpegSource::new(clienv::ffmpeg_binary(), config.frame_width, config.frame_height)
        .with_read_timeout(config.stall_alert_threshold());
    let capture = StreamCapture::connect(source, config.stream_uri.clone())?;

    let result = Executor::new(config.clone(), capture, component, publisher).run(&watcher);
    watcher.shutdown();
    result
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub struct Executor<S: VideoSource, P: Publisher, C: Clock = SystemClock> {
    config: JobConfig,
    job: JobIdentity,
    capture: StreamCapture<S, C>,
    component: ComponentHandle,
    publisher: P,
    segment_number: i32,
    next_frame: i32,
    now_millis: fn() -> i64,
}

impl<S: VideoSource, P: Publisher, C: Clock> Executor<S, P, C> {
    pub fn new(config: JobConfig, capture: StreamCapture<S, C>, component: ComponentHandle, publisher: P) -> Self {
        Self {
            job: config.job(),
            config,
            capture,
            component,
            publisher,
            segment_number: 0,
            next_frame: 0,
            now_millis: epoch_millis,
        }
    }

    pub fn with_time_source(mut self, now_millis: fn() -> i64) -> Self {
        self.now_millis = now_millis;
        self
    }

    pub fn segment_number(&self) -> i32 {
        self.segment_number
    }

    /// Process segments until `quit` asks to stop.
    pub fn run(&mut self, quit: &impl QuitPoll) -> Result<()> {
        info!(job = %self.job.job_name, uri = %self.capture.uri(), "Starting streaming job");
        self.publish_status(IN_PROGRESS)?;

        loop {
            self.process_segment()?;
            match quit.poll() {
                QuitStatus::Continue => {}
                QuitStatus::Quit => break,
                QuitStatus::Fatal(message) => {
                    return Err(ExecutorError::fatal(ExitCode::UnableToReadFromStandardIn, message));
                }
            }
        }

        info!(job = %self.job.job_name, segments = self.segment_number, "Stopping streaming job");
        self.publish_status(STOPPED)?;
        if !self.component.close() {
            warn!("Detection component reported an error while closing");
        }
        Ok(())
    }

    fn process_segment(&mut self) -> Result<()> {
        let size = self.config.segment_size;
        let start_frame = self.next_frame;
        let Some(stop_frame) = start_frame.checked_add(size - 1).filter(|stop| *stop < i32::MAX) else {
            return Err(ExecutorError::fatal(
                ExitCode::UnexpectedError,
                format!("Frame index overflow after segment {}", self.segment_number),
            ));
        };

        let mut frames = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let mut frame = Frame::default();
            self.read_frame(&mut frame)?;
            frames.push(frame);
        }
        self.next_frame = stop_frame + 1;

        let job = VideoJob {
            job_name: self.job.job_name.clone(),
            start_frame,
            stop_frame,
            job_properties: self.config.job_properties.clone(),
            media_properties: self.config.media_properties.clone(),
            frames,
        };

        let segment = self.segment_number;
        debug!(segment, start_frame, stop_frame, "Running detection on segment");
        let tracks = match self.component.get_video_detections(&job) {
            Ok(tracks) => tracks,
            Err(e) => {
                error!(segment, "Detection failed for segment: {}", e);
                Vec::new()
            }
        };
        let tracks = fix_tracks(tracks, start_frame, stop_frame);

        if let Some(frame_index) = tracks.iter().map(|t| t.start_frame).min() {
            let alert = ActivityAlert {
                job: self.job.clone(),
                segment_number: segment,
                frame_index,
                activity_detect_time: (self.now_millis)(),
            };
            info!(segment, frame_index, tracks = tracks.len(), "Activity detected");
            let queue = self.config.transport.activity_alert_queue.clone();
            self.send(&queue, &alert)?;
        }

        let summary = SegmentSummary {
            job: self.job.clone(),
            segment_number: segment,
            tracks,
        };
        let queue = self.config.transport.summary_report_queue.clone();
        self.send(&queue, &summary)?;

        self.segment_number += 1;
        Ok(())
    }

    /// Read one frame, escalating through reconnect, `STALLED` and finally
    /// the stall timeout.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<()> {
        if self.capture.read(frame) {
            return Ok(());
        }

        let threshold = self.config.stall_alert_threshold();
        warn!("Failed to read frame. Attempting to re-connect to video stream.");
        if self.capture.reconnect_within(frame, threshold) {
            return Ok(());
        }

        warn!(threshold_ms = threshold.as_millis() as u64, "Video stream stalled");
        self.publish_status(STALLED)?;

        match self.config.stall_timeout() {
            Some(timeout) => {
                let remaining = timeout.saturating_sub(threshold);
                if !self.capture.reconnect_within(frame, remaining) {
                    return Err(ExecutorError::fatal(
                        ExitCode::StreamStalled,
                        format!(
                            "Stream {} stalled for longer than the stall timeout of {} ms",
                            self.capture.uri(),
                            timeout.as_millis()
                        ),
                    ));
                }
            }
            None => self.capture.reconnect_forever(frame),
        }

        info!("Video stream recovered");
        self.publish_status(IN_PROGRESS)
    }

    fn publish_status(&mut self, status: &str) -> Result<()> {
        let message = JobStatus {
            job: self.job.clone(),
            status_message: status.to_string(),
        };
        let queue = self.config.transport.job_status_queue.clone();
        self.send(&queue, &message)
    }

    fn send<M: WireCodec>(&mut self, queue: &str, message: &M) -> Result<()> {
        let failed = |e: String| {
            ExecutorError::fatal(
                ExitCode::MessageTransportError,
                format!("Failed to publish to {}: {}", queue, e),
            )
        };
        let wire = message.to_wire().map_err(|e| failed(e.to_string()))?;
        self.publisher
            .publish(queue, &wire)
            .map_err(|e| failed(e.to_string()))
    }
}

/// Bring component output back inside the segment `[start_frame, stop_frame]`.
///
/// Locations outside the segment or with a negative size are dropped. A track
/// that keeps locations spans exactly its first to last location; one without
/// locations is clamped to the segment and dropped when nothing is left.
pub fn fix_tracks(tracks: Vec<Track>, start_frame: i32, stop_frame: i32) -> Vec<Track> {
    tracks
        .into_iter()
        .enumerate()
        .filter_map(|(index, track)| fix_track(index, track, start_frame, stop_frame))
        .collect()
}

fn fix_track(index: usize, mut track: Track, start_frame: i32, stop_frame: i32) -> Option<Track> {
    let before = track.frame_locations.len();
    track
        .frame_locations
        .retain(|frame, _| (start_frame..=stop_frame).contains(frame));
    if track.frame_locations.len() != before {
        warn!(
            track = index,
            dropped = before - track.frame_locations.len(),
            "Dropped frame locations outside of segment [{}, {}]",
            start_frame,
            stop_frame
        );
    }

    let before = track.frame_locations.len();
    track.frame_locations.retain(|_, location| location.has_valid_size());
    if track.frame_locations.len() != before {
        warn!(
            track = index,
            dropped = before - track.frame_locations.len(),
            "Dropped frame locations with negative width or height"
        );
    }

    let range = match (
        track.frame_locations.keys().next(),
        track.frame_locations.keys().next_back(),
    ) {
        (Some(first), Some(last)) => (*first, *last),
        _ => (track.start_frame.max(start_frame), track.stop_frame.min(stop_frame)),
    };

    if range.0 > range.1 {
        warn!(
            track = index,
            start = track.start_frame,
            stop = track.stop_frame,
            "Dropped track with no frames inside segment"
        );
        return None;
    }
    if range != (track.start_frame, track.stop_frame) {
        warn!(
            track = index,
            "Adjusted track range from [{}, {}] to [{}, {}]",
            track.start_frame,
            track.stop_frame,
            range.0,
            range.1
        );
        track.start_frame = range.0;
        track.stop_frame = range.1;
    }
    Some(track)
}

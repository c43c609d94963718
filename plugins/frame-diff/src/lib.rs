//! Motion detection by frame differencing.
//!
//! A frame counts as "changed" when the mean absolute difference of its bytes
//! against the previous frame exceeds `THRESHOLD` (job property, default 12).
//! Every run of consecutive changed frames becomes one track with a
//! full-frame location per frame.

use std::path::{Path, PathBuf};

use stream_executor::capture::Frame;
use stream_executor::component::{DetectionComponent, MediaKind, VideoJob};
use stream_executor::model::{ImageLocation, Track};
use stream_executor::DetectionError;

pub const THRESHOLD_PROPERTY: &str = "THRESHOLD";
pub const DEFAULT_THRESHOLD: f32 = 12.0;

#[derive(Default)]
pub struct FrameDiff {
    run_dir: Option<PathBuf>,
    /// Last frame of the previous segment.
    previous: Option<Frame>,
}

fn mean_abs_diff(a: &Frame, b: &Frame) -> Option<f32> {
    if a.data.len() != b.data.len() || a.data.is_empty() {
        return None;
    }
    let total: u64 = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    Some(total as f32 / a.data.len() as f32)
}

fn threshold(job: &VideoJob) -> Result<f32, DetectionError> {
    match job.property(THRESHOLD_PROPERTY) {
        None => Ok(DEFAULT_THRESHOLD),
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .ok_or_else(|| DetectionError::InvalidProperty(format!("{}={}", THRESHOLD_PROPERTY, raw))),
    }
}

impl DetectionComponent for FrameDiff {
    fn set_run_directory(&mut self, run_dir: &Path) {
        self.run_dir = Some(run_dir.to_path_buf());
    }

    fn init(&mut self) -> bool {
        tracing::debug!(run_dir = ?self.run_dir, "Frame difference detector initialized");
        true
    }

    fn close(&mut self) -> bool {
        self.previous = None;
        true
    }

    fn detection_type(&self) -> String {
        "MOTION".to_string()
    }

    fn supports(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Video
    }

    fn get_video_detections(&mut self, job: &VideoJob) -> Result<Vec<Track>, DetectionError> {
        let threshold = threshold(job)?;
        let mut tracks = Vec::new();
        let mut current: Option<Track> = None;

        // Each frame paired with the one before it, starting from the last frame seen.
        let predecessors = std::iter::once(self.previous.as_ref()).chain(job.frames.iter().map(Some));
        for ((offset, frame), previous) in job.frames.iter().enumerate().zip(predecessors) {
            let index = job.start_frame + offset as i32;
            let diff = previous
                .and_then(|previous| mean_abs_diff(previous, frame))
                .filter(|diff| *diff > threshold);

            let Some(diff) = diff else {
                tracks.extend(current.take());
                continue;
            };

            let confidence = (diff / 255.0).min(1.0);
            let location = ImageLocation::new(0, 0, frame.width, frame.height, confidence)
                .with_property("MEAN_DIFF", format!("{:.2}", diff));
            let track = current.get_or_insert_with(|| Track::new(index, index, 0.0));
            track.stop_frame = index;
            track.confidence = track.confidence.max(confidence);
            track.frame_locations.insert(index, location);
        }
        tracks.extend(current);
        if let Some(last) = job.frames.last() {
            self.previous = Some(last.clone());
        }

        tracing::debug!(
            start = job.start_frame,
            stop = job.stop_frame,
            tracks = tracks.len(),
            "Frame difference detection finished"
        );
        Ok(tracks)
    }
}

stream_executor::declare_component!(FrameDiff);

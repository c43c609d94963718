//! Detection results and outbound messages shared by the executor, the codec
//! and detection components.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentity {
    pub job_name: String,
    pub job_number: i32,
}

impl JobIdentity {
    pub fn new(job_name: impl Into<String>, job_number: i32) -> Self {
        Self {
            job_name: job_name.into(),
            job_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageLocation {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
    pub detection_properties: Properties,
}

impl ImageLocation {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            detection_properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detection_properties.insert(key.into(), value.into());
        self
    }

    pub fn has_valid_size(&self) -> bool {
        self.width >= 0 && self.height >= 0
    }
}

/// A detection across a contiguous range of frames.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    pub start_frame: i32,
    pub stop_frame: i32,
    pub confidence: f32,
    pub frame_locations: BTreeMap<i32, ImageLocation>,
    pub detection_properties: Properties,
}

impl Track {
    pub fn new(start_frame: i32, stop_frame: i32, confidence: f32) -> Self {
        Self {
            start_frame,
            stop_frame,
            confidence,
            ..Default::default()
        }
    }

    pub fn with_location(mut self, frame: i32, location: ImageLocation) -> Self {
        self.frame_locations.insert(frame, location);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detection_properties.insert(key.into(), value.into());
        self
    }

    /// `start_frame <= stop_frame` and every location lies inside that range.
    pub fn is_consistent(&self) -> bool {
        self.start_frame <= self.stop_frame
            && self
                .frame_locations
                .keys()
                .all(|frame| (self.start_frame..=self.stop_frame).contains(frame))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Milliseconds from the start of the media.
    pub start_time: i32,
    pub stop_time: i32,
    pub confidence: f32,
    pub detection_properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenericTrack {
    pub confidence: f32,
    pub detection_properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job: JobIdentity,
    pub status_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAlert {
    pub job: JobIdentity,
    pub segment_number: i32,
    pub frame_index: i32,
    /// Epoch milliseconds.
    pub activity_detect_time: i64,
}

/// Tracks produced for one segment of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub job: JobIdentity,
    pub segment_number: i32,
    pub tracks: Vec<Track>,
}

impl SegmentSummary {
    /// Segment number used when a summary payload could not be read.
    pub const MISSING_SEGMENT: i32 = -1;
}

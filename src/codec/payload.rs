//! Binary body of segment summary messages.
//!
//! All types use `#[derive(Archive, Serialize, Deserialize)]`; decoding
//! validates the archive before touching it, so arbitrary bytes from the
//! transport are rejected instead of trusted.

use rkyv::{Archive, Deserialize, Serialize};

use crate::model::{ImageLocation, Properties, Track};

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct StreamingResponse {
    pub segment_number: i32,
    pub video_responses: Vec<VideoResponse>,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[rkyv(derive(Debug))]
pub struct VideoResponse {
    pub video_tracks: Vec<VideoTrackRecord>,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct VideoTrackRecord {
    pub start_frame: i32,
    pub stop_frame: i32,
    pub confidence: f32,
    pub frame_locations: Vec<FrameLocationEntry>,
    pub detection_properties: Vec<PropertyEntry>,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct FrameLocationEntry {
    pub frame: i32,
    pub image_location: ImageLocationRecord,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct ImageLocationRecord {
    pub x_left_upper: i32,
    pub y_left_upper: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
    pub detection_properties: Vec<PropertyEntry>,
}

#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct PropertyEntry {
    pub key: String,
    pub value: String,
}

fn to_entries(properties: &Properties) -> Vec<PropertyEntry> {
    properties
        .iter()
        .map(|(key, value)| PropertyEntry {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

fn from_entries(entries: Vec<PropertyEntry>) -> Properties {
    entries.into_iter().map(|e| (e.key, e.value)).collect()
}

impl From<&ImageLocation> for ImageLocationRecord {
    fn from(location: &ImageLocation) -> Self {
        Self {
            x_left_upper: location.x,
            y_left_upper: location.y,
            width: location.width,
            height: location.height,
            confidence: location.confidence,
            detection_properties: to_entries(&location.detection_properties),
        }
    }
}

impl From<ImageLocationRecord> for ImageLocation {
    fn from(record: ImageLocationRecord) -> Self {
        Self {
            x: record.x_left_upper,
            y: record.y_left_upper,
            width: record.width,
            height: record.height,
            confidence: record.confidence,
            detection_properties: from_entries(record.detection_properties),
        }
    }
}

impl From<&Track> for VideoTrackRecord {
    fn from(track: &Track) -> Self {
        Self {
            start_frame: track.start_frame,
            stop_frame: track.stop_frame,
            confidence: track.confidence,
            frame_locations: track
                .frame_locations
                .iter()
                .map(|(frame, location)| FrameLocationEntry {
                    frame: *frame,
                    image_location: location.into(),
                })
                .collect(),
            detection_properties: to_entries(&track.detection_properties),
        }
    }
}

impl From<VideoTrackRecord> for Track {
    fn from(record: VideoTrackRecord) -> Self {
        Self {
            start_frame: record.start_frame,
            stop_frame: record.stop_frame,
            confidence: record.confidence,
            frame_locations: record
                .frame_locations
                .into_iter()
                .map(|entry| (entry.frame, entry.image_location.into()))
                .collect(),
            detection_properties: from_entries(record.detection_properties),
        }
    }
}

impl StreamingResponse {
    /// Every track goes into a single video response.
    pub fn from_tracks(segment_number: i32, tracks: &[Track]) -> Self {
        Self {
            segment_number,
            video_responses: vec![VideoResponse {
                video_tracks: tracks.iter().map(VideoTrackRecord::from).collect(),
            }],
        }
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.video_responses
            .into_iter()
            .flat_map(|response| response.video_tracks)
            .map(Track::from)
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, rkyv::rancor::Error> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)?;
        Ok(bytes.to_vec())
    }

    /// Validate and deserialize a payload. Bytes handed over by a transport
    /// carry no alignment guarantee, so they are copied into an aligned
    /// buffer first.
    pub fn decode(bytes: &[u8]) -> Result<Self, rkyv::rancor::Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
    }
}

//! Wire format of the three outbound message kinds.
//!
//! A [`WireMessage`] is a set of named header properties plus an optional
//! binary body. Job status and activity alert messages are header-only;
//! segment summaries carry their tracks as an rkyv [`payload`].
//!
//! | Kind | Header properties | Body |
//! |---|---|---|
//! | job status | `JOB_NAME`, `JOB_NUMBER`, `JOB_STATUS` | none |
//! | activity alert | `JOB_NAME`, `JOB_NUMBER`, `SEGMENT_NUMBER`, `FRAME_INDEX`, `ACTIVITY_DETECT_TIME` | none |
//! | segment summary | `JOB_NAME`, `JOB_NUMBER` | [`payload::StreamingResponse`] |

pub mod payload;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{ActivityAlert, JobIdentity, JobStatus, SegmentSummary};
use payload::StreamingResponse;

pub const JOB_NAME: &str = "JOB_NAME";
pub const JOB_NUMBER: &str = "JOB_NUMBER";
pub const JOB_STATUS: &str = "JOB_STATUS";
pub const SEGMENT_NUMBER: &str = "SEGMENT_NUMBER";
pub const FRAME_INDEX: &str = "FRAME_INDEX";
pub const ACTIVITY_DETECT_TIME: &str = "ACTIVITY_DETECT_TIME";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("message is missing the {0} property")]
    MissingProperty(String),

    #[error("message property {name} is not a {expected}")]
    WrongPropertyType { name: String, expected: &'static str },

    #[error("failed to encode message body: {0}")]
    Encode(String),
}

#[derive(
    Archive, Deserialize, Serialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq,
)]
#[rkyv(derive(Debug))]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Int(i32),
    Long(i64),
}

#[derive(
    Archive, Deserialize, Serialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq,
)]
#[rkyv(derive(Debug))]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

/// A transport-agnostic message: header properties plus an optional body.
#[derive(
    Archive, Deserialize, Serialize, serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq, Eq, Default,
)]
#[rkyv(derive(Debug))]
pub struct WireMessage {
    pub properties: Vec<Property>,
    pub body: Option<Vec<u8>>,
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, name: &str, value: PropertyValue) {
        if let Some(existing) = self.properties.iter_mut().find(|p| p.name == name) {
            existing.value = value;
        } else {
            self.properties.push(Property {
                name: name.to_string(),
                value,
            });
        }
    }

    pub fn set_string_property(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, PropertyValue::String(value.into()));
    }

    pub fn set_int_property(&mut self, name: &str, value: i32) {
        self.set(name, PropertyValue::Int(value));
    }

    pub fn set_long_property(&mut self, name: &str, value: i64) {
        self.set(name, PropertyValue::Long(value));
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    fn require(&self, name: &str) -> Result<&PropertyValue, CodecError> {
        self.property(name)
            .ok_or_else(|| CodecError::MissingProperty(name.to_string()))
    }

    pub fn string_property(&self, name: &str) -> Result<&str, CodecError> {
        match self.require(name)? {
            PropertyValue::String(value) => Ok(value),
            _ => Err(CodecError::WrongPropertyType {
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    pub fn int_property(&self, name: &str) -> Result<i32, CodecError> {
        match self.require(name)? {
            PropertyValue::Int(value) => Ok(*value),
            _ => Err(CodecError::WrongPropertyType {
                name: name.to_string(),
                expected: "int",
            }),
        }
    }

    /// Ints widen to longs, matching how message brokers read numeric properties.
    pub fn long_property(&self, name: &str) -> Result<i64, CodecError> {
        match self.require(name)? {
            PropertyValue::Long(value) => Ok(*value),
            PropertyValue::Int(value) => Ok(i64::from(*value)),
            PropertyValue::String(_) => Err(CodecError::WrongPropertyType {
                name: name.to_string(),
                expected: "long",
            }),
        }
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    fn set_job(&mut self, job: &JobIdentity) {
        self.set_string_property(JOB_NAME, job.job_name.clone());
        self.set_int_property(JOB_NUMBER, job.job_number);
    }

    fn job(&self) -> Result<JobIdentity, CodecError> {
        Ok(JobIdentity {
            job_name: self.string_property(JOB_NAME)?.to_string(),
            job_number: self.int_property(JOB_NUMBER)?,
        })
    }
}

/// Conversion between an outbound message and its wire representation.
pub trait WireCodec: Sized {
    fn to_wire(&self) -> Result<WireMessage, CodecError>;
    fn from_wire(message: &WireMessage) -> Result<Self, CodecError>;
}

impl WireCodec for JobStatus {
    fn to_wire(&self) -> Result<WireMessage, CodecError> {
        let mut message = WireMessage::new();
        message.set_job(&self.job);
        message.set_string_property(JOB_STATUS, self.status_message.clone());
        Ok(message)
    }

    fn from_wire(message: &WireMessage) -> Result<Self, CodecError> {
        Ok(Self {
            job: message.job()?,
            status_message: message.string_property(JOB_STATUS)?.to_string(),
        })
    }
}

impl WireCodec for ActivityAlert {
    fn to_wire(&self) -> Result<WireMessage, CodecError> {
        let mut message = WireMessage::new();
        message.set_job(&self.job);
        message.set_int_property(SEGMENT_NUMBER, self.segment_number);
        message.set_int_property(FRAME_INDEX, self.frame_index);
        message.set_long_property(ACTIVITY_DETECT_TIME, self.activity_detect_time);
        Ok(message)
    }

    fn from_wire(message: &WireMessage) -> Result<Self, CodecError> {
        Ok(Self {
            job: message.job()?,
            segment_number: message.int_property(SEGMENT_NUMBER)?,
            frame_index: message.int_property(FRAME_INDEX)?,
            activity_detect_time: message.long_property(ACTIVITY_DETECT_TIME)?,
        })
    }
}

impl WireCodec for SegmentSummary {
    fn to_wire(&self) -> Result<WireMessage, CodecError> {
        let mut message = WireMessage::new();
        message.set_job(&self.job);
        let body = StreamingResponse::from_tracks(self.segment_number, &self.tracks)
            .encode()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        message.set_body(body);
        Ok(message)
    }

    /// A missing or unreadable body is not an error: the summary comes back
    /// with [`SegmentSummary::MISSING_SEGMENT`] and no tracks.
    fn from_wire(message: &WireMessage) -> Result<Self, CodecError> {
        let job = message.job()?;

        let decoded = match message.body() {
            Some(body) if !body.is_empty() => match StreamingResponse::decode(body) {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(job = %job.job_name, "Discarding unreadable segment summary body: {}", e);
                    None
                }
            },
            _ => None,
        };

        let (segment_number, tracks) = match decoded {
            Some(response) => (response.segment_number, response.into_tracks()),
            None => (SegmentSummary::MISSING_SEGMENT, Vec::new()),
        };

        Ok(Self {
            job,
            segment_number,
            tracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageLocation, Track};

    fn job() -> JobIdentity {
        JobIdentity::new("lobby-camera", 42)
    }

    #[test]
    fn job_status_roundtrip() {
        let status = JobStatus {
            job: job(),
            status_message: "IN_PROGRESS".to_string(),
        };

        let wire = status.to_wire().unwrap();
        assert_eq!(wire.string_property(JOB_NAME).unwrap(), "lobby-camera");
        assert_eq!(wire.int_property(JOB_NUMBER).unwrap(), 42);
        assert_eq!(wire.string_property(JOB_STATUS).unwrap(), "IN_PROGRESS");
        assert!(wire.body().is_none());

        assert_eq!(JobStatus::from_wire(&wire).unwrap(), status);
    }

    #[test]
    fn activity_alert_roundtrip() {
        let alert = ActivityAlert {
            job: job(),
            segment_number: 12,
            frame_index: 1207,
            activity_detect_time: 1_700_000_000_123,
        };

        let wire = alert.to_wire().unwrap();
        assert_eq!(wire.property(ACTIVITY_DETECT_TIME), Some(&PropertyValue::Long(1_700_000_000_123)));
        assert_eq!(wire.property(FRAME_INDEX), Some(&PropertyValue::Int(1207)));

        assert_eq!(ActivityAlert::from_wire(&wire).unwrap(), alert);
    }

    #[test]
    fn segment_summary_roundtrip() {
        let tracks = vec![
            Track::new(100, 104, 0.75)
                .with_property("CLASSIFICATION", "person")
                .with_property("ANGLE", "12.5")
                .with_location(100, ImageLocation::new(10, 20, 30, 40, 0.7).with_property("COLOR", "red"))
                .with_location(104, ImageLocation::new(11, 21, 31, 41, f32::MIN_POSITIVE))
                .with_location(102, ImageLocation::new(12, 22, 32, 42, 0.1 + 0.2)),
            Track::new(105, 105, 1.0),
        ];
        let summary = SegmentSummary {
            job: job(),
            segment_number: 1,
            tracks,
        };

        let wire = summary.to_wire().unwrap();
        assert_eq!(wire.properties.len(), 2);
        assert!(!wire.body().unwrap().is_empty());

        let decoded = SegmentSummary::from_wire(&wire).unwrap();
        assert_eq!(decoded, summary);
        let first = &decoded.tracks[0];
        assert_eq!(first.frame_locations.keys().copied().collect::<Vec<_>>(), vec![100, 102, 104]);
        assert_eq!(
            first.frame_locations[&102].confidence.to_bits(),
            (0.1f32 + 0.2f32).to_bits()
        );
    }

    #[test]
    fn empty_segment_still_writes_headers() {
        let summary = SegmentSummary {
            job: job(),
            segment_number: 3,
            tracks: Vec::new(),
        };

        let wire = summary.to_wire().unwrap();
        assert_eq!(wire.string_property(JOB_NAME).unwrap(), "lobby-camera");
        assert_eq!(wire.int_property(JOB_NUMBER).unwrap(), 42);

        let decoded = SegmentSummary::from_wire(&wire).unwrap();
        assert_eq!(decoded.segment_number, 3);
        assert!(decoded.tracks.is_empty());
    }

    #[test]
    fn unreadable_summary_body_degrades_to_missing_segment() {
        let mut wire = WireMessage::new();
        wire.set_string_property(JOB_NAME, "lobby-camera");
        wire.set_int_property(JOB_NUMBER, 42);

        for body in [None, Some(Vec::new()), Some(vec![0xFF; 64]), Some(b"garbage".to_vec())] {
            wire.body = body;
            let decoded = SegmentSummary::from_wire(&wire).unwrap();
            assert_eq!(decoded.segment_number, SegmentSummary::MISSING_SEGMENT);
            assert!(decoded.tracks.is_empty());
            assert_eq!(decoded.job, job());
        }
    }

    #[test]
    fn missing_or_mistyped_headers_are_rejected() {
        let mut wire = WireMessage::new();
        wire.set_string_property(JOB_NAME, "lobby-camera");
        assert_eq!(
            JobStatus::from_wire(&wire),
            Err(CodecError::MissingProperty(JOB_NUMBER.to_string()))
        );

        wire.set_string_property(JOB_NUMBER, "42");
        assert!(matches!(
            JobStatus::from_wire(&wire),
            Err(CodecError::WrongPropertyType { expected: "int", .. })
        ));
    }

    #[test]
    fn setting_a_property_twice_replaces_it() {
        let mut wire = WireMessage::new();
        wire.set_int_property(SEGMENT_NUMBER, 1);
        wire.set_int_property(SEGMENT_NUMBER, 2);
        assert_eq!(wire.properties.len(), 1);
        assert_eq!(wire.int_property(SEGMENT_NUMBER).unwrap(), 2);
        assert_eq!(wire.long_property(SEGMENT_NUMBER).unwrap(), 2);
    }
}

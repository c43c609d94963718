//! Detection component interface.
//!
//! Components are built as `cdylib` crates that implement
//! [`DetectionComponent`] and export the `component_creator` /
//! `component_deleter` entry points with [`declare_component!`]. The executor
//! only ever talks to them through a [`ComponentHandle`].
//!
//! Trait objects cross the library boundary as Rust values, so a component
//! must be built with the same toolchain and the same version of this crate
//! as the executor that loads it.

mod handle;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::error::DetectionError;
use crate::model::{AudioTrack, GenericTrack, ImageLocation, Properties, Track};

pub use handle::ComponentHandle;

pub const CREATOR_SYMBOL: &[u8] = b"component_creator\0";
pub const DELETER_SYMBOL: &[u8] = b"component_deleter\0";

/// Returns a `Box<Box<dyn DetectionComponent>>` as an opaque pointer.
pub type CreatorFn = unsafe extern "C" fn() -> *mut std::ffi::c_void;
/// Destroys an instance returned by the matching [`CreatorFn`].
pub type DeleterFn = unsafe extern "C" fn(*mut std::ffi::c_void);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Video,
    Image,
    Audio,
    Generic,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "VIDEO",
            Self::Image => "IMAGE",
            Self::Audio => "AUDIO",
            Self::Generic => "GENERIC",
        };
        f.write_str(name)
    }
}

/// One segment of a live stream, frames included.
#[derive(Debug, Clone, Default)]
pub struct VideoJob {
    pub job_name: String,
    pub start_frame: i32,
    pub stop_frame: i32,
    pub job_properties: Properties,
    pub media_properties: Properties,
    pub frames: Vec<Frame>,
}

impl VideoJob {
    /// Frame at absolute index `frame`, if it belongs to this segment.
    pub fn frame(&self, frame: i32) -> Option<&Frame> {
        let offset = usize::try_from(frame.checked_sub(self.start_frame)?).ok()?;
        self.frames.get(offset)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.job_properties.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageJob {
    pub job_name: String,
    pub data_uri: String,
    pub job_properties: Properties,
    pub media_properties: Properties,
}

#[derive(Debug, Clone, Default)]
pub struct AudioJob {
    pub job_name: String,
    pub data_uri: String,
    /// Milliseconds.
    pub start_time: i32,
    pub stop_time: i32,
    pub job_properties: Properties,
    pub media_properties: Properties,
}

#[derive(Debug, Clone, Default)]
pub struct GenericJob {
    pub job_name: String,
    pub data_uri: String,
    pub job_properties: Properties,
    pub media_properties: Properties,
}

/// Implemented by detection plugins.
///
/// Only `get_video_detections` is exercised by the streaming executor. The
/// other media kinds default to [`DetectionError::UnsupportedDataType`].
pub trait DetectionComponent {
    fn set_run_directory(&mut self, run_dir: &Path);

    fn init(&mut self) -> bool;

    fn close(&mut self) -> bool;

    fn detection_type(&self) -> String;

    fn supports(&self, kind: MediaKind) -> bool;

    fn get_video_detections(&mut self, job: &VideoJob) -> Result<Vec<Track>, DetectionError> {
        let _ = job;
        Err(DetectionError::UnsupportedDataType)
    }

    fn get_image_detections(&mut self, job: &ImageJob) -> Result<Vec<ImageLocation>, DetectionError> {
        let _ = job;
        Err(DetectionError::UnsupportedDataType)
    }

    fn get_audio_detections(&mut self, job: &AudioJob) -> Result<Vec<AudioTrack>, DetectionError> {
        let _ = job;
        Err(DetectionError::UnsupportedDataType)
    }

    fn get_generic_detections(&mut self, job: &GenericJob) -> Result<Vec<GenericTrack>, DetectionError> {
        let _ = job;
        Err(DetectionError::UnsupportedDataType)
    }
}

/// Export `component_creator` and `component_deleter` for a component type.
///
/// ```ignore
/// stream_executor::declare_component!(MyDetector);                  // uses Default
/// stream_executor::declare_component!(MyDetector, MyDetector::new());
/// ```
#[macro_export]
macro_rules! declare_component {
    ($ty:ty) => {
        $crate::declare_component!($ty, <$ty as ::std::default::Default>::default());
    };
    ($ty:ty, $ctor:expr) => {
        #[no_mangle]
        pub extern "C" fn component_creator() -> *mut ::std::ffi::c_void {
            let component: ::std::boxed::Box<dyn $crate::component::DetectionComponent> =
                ::std::boxed::Box::<$ty>::new($ctor);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(component)) as *mut ::std::ffi::c_void
        }

        /// # Safety
        /// `instance` must come from `component_creator` and not be freed twice.
        #[no_mangle]
        pub unsafe extern "C" fn component_deleter(instance: *mut ::std::ffi::c_void) {
            if instance.is_null() {
                return;
            }
            drop(::std::boxed::Box::from_raw(
                instance as *mut ::std::boxed::Box<dyn $crate::component::DetectionComponent>,
            ));
        }
    };
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// What the executor did to a [`FakeComponent`], shared with the test.
    #[derive(Debug, Default)]
    pub struct FakeLog {
        pub run_dir: Option<PathBuf>,
        pub init_calls: usize,
        pub close_calls: usize,
        pub jobs: Vec<(i32, i32, usize)>,
    }

    /// In-process component that replays scripted detection results per
    /// segment. Segments past the script produce no tracks.
    pub struct FakeComponent {
        pub init_ok: bool,
        pub video_supported: bool,
        pub results: Vec<Result<Vec<Track>, DetectionError>>,
        pub log: Arc<Mutex<FakeLog>>,
    }

    impl FakeComponent {
        pub fn new(results: Vec<Result<Vec<Track>, DetectionError>>) -> Self {
            Self {
                init_ok: true,
                video_supported: true,
                results,
                log: Arc::default(),
            }
        }
    }

    impl DetectionComponent for FakeComponent {
        fn set_run_directory(&mut self, run_dir: &Path) {
            self.log.lock().unwrap().run_dir = Some(run_dir.to_path_buf());
        }

        fn init(&mut self) -> bool {
            self.log.lock().unwrap().init_calls += 1;
            self.init_ok
        }

        fn close(&mut self) -> bool {
            self.log.lock().unwrap().close_calls += 1;
            true
        }

        fn detection_type(&self) -> String {
            "FAKE".to_string()
        }

        fn supports(&self, kind: MediaKind) -> bool {
            kind == MediaKind::Video && self.video_supported
        }

        fn get_video_detections(&mut self, job: &VideoJob) -> Result<Vec<Track>, DetectionError> {
            let mut log = self.log.lock().unwrap();
            log.jobs.push((job.start_frame, job.stop_frame, job.frames.len()));
            let index = log.jobs.len() - 1;
            self.results.get(index).cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ImageOnly;

    impl DetectionComponent for ImageOnly {
        fn set_run_directory(&mut self, _run_dir: &Path) {}

        fn init(&mut self) -> bool {
            true
        }

        fn close(&mut self) -> bool {
            true
        }

        fn detection_type(&self) -> String {
            "IMAGE_ONLY".to_string()
        }

        fn supports(&self, kind: MediaKind) -> bool {
            kind == MediaKind::Image
        }

        fn get_image_detections(&mut self, _job: &ImageJob) -> Result<Vec<ImageLocation>, DetectionError> {
            Ok(vec![ImageLocation::new(0, 0, 1, 1, 1.0)])
        }
    }

    #[test]
    fn unimplemented_media_kinds_are_unsupported() {
        let mut component = ImageOnly;
        assert_eq!(
            component.get_video_detections(&VideoJob::default()),
            Err(DetectionError::UnsupportedDataType)
        );
        assert_eq!(
            component.get_audio_detections(&AudioJob::default()),
            Err(DetectionError::UnsupportedDataType)
        );
        assert_eq!(component.get_image_detections(&ImageJob::default()).unwrap().len(), 1);
    }

    #[test]
    fn video_job_indexes_frames_by_absolute_number() {
        let job = VideoJob {
            start_frame: 100,
            stop_frame: 101,
            frames: vec![
                Frame { data: vec![1], width: 1, height: 1 },
                Frame { data: vec![2], width: 1, height: 1 },
            ],
            ..Default::default()
        };
        assert_eq!(job.frame(101).map(|f| f.data[0]), Some(2));
        assert!(job.frame(99).is_none());
        assert!(job.frame(102).is_none());
    }

    #[test]
    fn media_kind_display() {
        assert_eq!(MediaKind::Video.to_string(), "VIDEO");
        assert_eq!(MediaKind::Generic.to_string(), "GENERIC");
    }
}

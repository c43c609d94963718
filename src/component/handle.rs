use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, info};

use super::{
    AudioJob, CreatorFn, DeleterFn, DetectionComponent, GenericJob, ImageJob, MediaKind, VideoJob,
    CREATOR_SYMBOL, DELETER_SYMBOL,
};
use crate::error::{DetectionError, ExecutorError, Result};
use crate::model::{AudioTrack, GenericTrack, ImageLocation, Track};

type Instance = Box<dyn DetectionComponent>;

enum Backing {
    Library {
        instance: NonNull<Instance>,
        deleter: DeleterFn,
        // Dropped after the instance has been handed back to the deleter.
        _library: Library,
    },
    InProcess(Instance),
}

/// Owns one component instance and the library it came from.
pub struct ComponentHandle {
    backing: Backing,
    name: String,
}

impl ComponentHandle {
    /// Load `library_path` and create the component through `component_creator`.
    pub fn load(library_path: &Path) -> Result<Self> {
        let name = library_path.display().to_string();
        debug!(library = %name, "Loading detection component");

        // SAFETY: loading a component runs its initializers; the library is
        // trusted configuration supplied by the job.
        let library = unsafe { Library::new(library_path) }
            .map_err(|e| ExecutorError::ComponentLoad(format!("{}: {}", name, e)))?;

        let (creator, deleter) = unsafe {
            let creator = library
                .get::<CreatorFn>(CREATOR_SYMBOL)
                .map_err(|e| ExecutorError::ComponentLoad(format!("{}: {}", name, e)))?;
            let deleter = library
                .get::<DeleterFn>(DELETER_SYMBOL)
                .map_err(|e| ExecutorError::ComponentLoad(format!("{}: {}", name, e)))?;
            (*creator, *deleter)
        };

        let raw = unsafe { creator() };
        let instance = NonNull::new(raw.cast::<Instance>()).ok_or_else(|| {
            ExecutorError::ComponentLoad(format!("{}: component_creator returned null", name))
        })?;

        info!(library = %name, "Detection component loaded");
        Ok(Self {
            backing: Backing::Library {
                instance,
                deleter,
                _library: library,
            },
            name,
        })
    }

    /// Wrap a component that lives in this process.
    pub fn from_component(name: impl Into<String>, component: Instance) -> Self {
        Self {
            backing: Backing::InProcess(component),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn component(&self) -> &dyn DetectionComponent {
        match &self.backing {
            // SAFETY: the instance stays valid until `drop` hands it to the deleter.
            Backing::Library { instance, .. } => unsafe { &**instance.as_ref() },
            Backing::InProcess(component) => component.as_ref(),
        }
    }

    fn component_mut(&mut self) -> &mut dyn DetectionComponent {
        match &mut self.backing {
            Backing::Library { instance, .. } => unsafe { &mut **instance.as_mut() },
            Backing::InProcess(component) => component.as_mut(),
        }
    }

    pub fn set_run_directory(&mut self, run_dir: &Path) {
        self.component_mut().set_run_directory(run_dir);
    }

    pub fn init(&mut self) -> bool {
        self.component_mut().init()
    }

    pub fn close(&mut self) -> bool {
        self.component_mut().close()
    }

    pub fn detection_type(&self) -> String {
        self.component().detection_type()
    }

    pub fn supports(&self, kind: MediaKind) -> bool {
        self.component().supports(kind)
    }

    pub fn get_video_detections(&mut self, job: &VideoJob) -> std::result::Result<Vec<Track>, DetectionError> {
        self.component_mut().get_video_detections(job)
    }

    pub fn get_image_detections(
        &mut self,
        job: &ImageJob,
    ) -> std::result::Result<Vec<ImageLocation>, DetectionError> {
        self.component_mut().get_image_detections(job)
    }

    pub fn get_audio_detections(&mut self, job: &AudioJob) -> std::result::Result<Vec<AudioTrack>, DetectionError> {
        self.component_mut().get_audio_detections(job)
    }

    pub fn get_generic_detections(
        &mut self,
        job: &GenericJob,
    ) -> std::result::Result<Vec<GenericTrack>, DetectionError> {
        self.component_mut().get_generic_detections(job)
    }
}

impl Drop for ComponentHandle {
    fn drop(&mut self) {
        if let Backing::Library { instance, deleter, .. } = &self.backing {
            debug!(library = %self.name, "Destroying detection component");
            // SAFETY: the pointer came from this library's creator and is
            // released exactly once, before the library unloads.
            unsafe { deleter(instance.as_ptr().cast::<c_void>()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::testing::FakeComponent;

    #[test]
    fn missing_library_is_a_load_error() {
        let path = std::env::temp_dir().join("stream-executor-no-such-component.so");
        match ComponentHandle::load(&path) {
            Err(ExecutorError::ComponentLoad(message)) => {
                assert!(message.contains("stream-executor-no-such-component.so"));
            }
            Err(other) => panic!("expected component load error, got {:?}", other),
            Ok(_) => panic!("expected component load error"),
        }
    }

    #[test]
    fn load_error_maps_to_its_exit_code() {
        let path = std::env::temp_dir().join("stream-executor-no-such-component.so");
        let err = ComponentHandle::load(&path).err().unwrap();
        assert_eq!(err.exit_code(), crate::error::ExitCode::ComponentLoadError);
    }

    // Any shared library without the component entry points will do.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn library_without_entry_points_is_a_load_error() {
        match ComponentHandle::load(Path::new("libc.so.6")) {
            Err(ExecutorError::ComponentLoad(message)) => {
                assert!(message.starts_with("libc.so.6: "));
                assert!(message.contains("component_creator"));
            }
            Err(other) => panic!("expected component load error, got {:?}", other),
            Ok(_) => panic!("expected component load error"),
        }
    }

    #[test]
    fn in_process_component_forwards_calls() {
        let fake = FakeComponent::new(vec![Err(DetectionError::DetectionFailed("model missing".into()))]);
        let log = fake.log.clone();
        let mut handle = ComponentHandle::from_component("fake", Box::new(fake));

        handle.set_run_directory(Path::new("/tmp/run"));
        assert!(handle.init());
        assert_eq!(handle.detection_type(), "FAKE");
        assert!(handle.supports(MediaKind::Video));
        assert!(!handle.supports(MediaKind::Audio));

        let result = handle.get_video_detections(&VideoJob::default());
        assert_eq!(result, Err(DetectionError::DetectionFailed("model missing".into())));
        assert_eq!(
            handle.get_generic_detections(&GenericJob::default()),
            Err(DetectionError::UnsupportedDataType)
        );
        assert!(handle.close());

        let log = log.lock().unwrap();
        assert_eq!(log.run_dir.as_deref(), Some(Path::new("/tmp/run")));
        assert_eq!(log.init_calls, 1);
        assert_eq!(log.close_calls, 1);
    }
}

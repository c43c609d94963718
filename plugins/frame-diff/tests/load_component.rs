//! Loads the built cdylib through the executor's component handle.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};

use stream_executor::capture::Frame;
use stream_executor::component::{GenericJob, MediaKind, VideoJob};
use stream_executor::{ComponentHandle, DetectionError};

/// The cdylib is built next to the test binary, in `deps/` or one level up.
fn component_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let name = format!("{}stream_executor_frame_diff", DLL_PREFIX);

    let mut candidates: Vec<PathBuf> = [deps, deps.parent().unwrap_or(deps)]
        .iter()
        .filter_map(|dir| fs::read_dir(dir).ok())
        .flatten()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&name) && n.ends_with(DLL_SUFFIX))
        })
        .collect();
    candidates.sort_by_key(|path| fs::metadata(path).and_then(|m| m.modified()).ok());
    candidates
        .pop()
        .unwrap_or_else(|| panic!("{}*{} not found near {}", name, DLL_SUFFIX, deps.display()))
}

fn job(start_frame: i32, values: &[u8]) -> VideoJob {
    VideoJob {
        job_name: "load-test".to_string(),
        start_frame,
        stop_frame: start_frame + values.len() as i32 - 1,
        frames: values
            .iter()
            .map(|v| Frame {
                data: vec![*v; 12],
                width: 2,
                height: 2,
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn loaded_component_runs_detection() {
    let mut handle = ComponentHandle::load(&component_library()).unwrap();

    handle.set_run_directory(Path::new("/tmp"));
    assert!(handle.init());
    assert_eq!(handle.detection_type(), "MOTION");
    assert!(handle.supports(MediaKind::Video));
    assert!(!handle.supports(MediaKind::Audio));

    let tracks = handle.get_video_detections(&job(0, &[0, 0, 120, 120])).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!((tracks[0].start_frame, tracks[0].stop_frame), (2, 2));
    assert_eq!(
        handle.get_generic_detections(&GenericJob::default()),
        Err(DetectionError::UnsupportedDataType)
    );
    assert!(handle.close());
}

#[test]
fn each_load_gets_its_own_instance() {
    let path = component_library();
    let mut first = ComponentHandle::load(&path).unwrap();
    let mut second = ComponentHandle::load(&path).unwrap();

    // Only the first instance has seen a frame.
    first.get_video_detections(&job(0, &[0])).unwrap();
    assert_eq!(first.get_video_detections(&job(1, &[200])).unwrap().len(), 1);
    assert!(second.get_video_detections(&job(0, &[200])).unwrap().is_empty());

    // Instances are handed back to the library's deleter one at a time.
    drop(first);
    assert_eq!(second.get_video_detections(&job(1, &[0])).unwrap().len(), 1);
    drop(second);
}

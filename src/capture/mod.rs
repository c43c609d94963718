//! Live video source ownership and reconnection.

pub mod ffmpeg;

use std::time::Duration;

use tracing::{info, warn};

use crate::backoff::{self, Clock, SystemClock};
use crate::error::{ExecutorError, ExitCode, Result};

pub use ffmpeg::FfmpegSource;

/// Raw BGR8 frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
}

/// A decoder attached to a video URI.
pub trait VideoSource {
    /// Open (or reopen) the source; `false` when it cannot be reached.
    fn open(&mut self, uri: &str) -> bool;

    /// Read the next frame into `frame`; `false` on any failure.
    fn read(&mut self, frame: &mut Frame) -> bool;

    fn close(&mut self);
}

/// Owns the connection to a live stream and reconnects when reads fail.
pub struct StreamCapture<S: VideoSource, C: Clock = SystemClock> {
    source: S,
    uri: String,
    clock: C,
}

impl<S: VideoSource> StreamCapture<S> {
    pub fn connect(source: S, uri: impl Into<String>) -> Result<Self> {
        Self::connect_with_clock(source, uri, SystemClock)
    }
}

impl<S: VideoSource, C: Clock> StreamCapture<S, C> {
    /// Open `uri` right away. Failing to connect the first time is fatal.
    pub fn connect_with_clock(mut source: S, uri: impl Into<String>, clock: C) -> Result<Self> {
        let uri = uri.into();
        if !source.open(&uri) {
            return Err(ExecutorError::fatal(
                ExitCode::UnableToConnectToStream,
                format!("Unable to connect to stream: {}", uri),
            ));
        }
        info!(uri = %uri, "Connected to video stream");
        Ok(Self { source, uri, clock })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn read(&mut self, frame: &mut Frame) -> bool {
        self.source.read(frame)
    }

    /// Read a frame, reconnecting for as long as it takes.
    pub fn read_with_retry(&mut self, frame: &mut Frame) {
        if self.read(frame) {
            return;
        }
        warn!("Failed to read frame. Will retry forever.");
        self.reconnect_forever(frame);
    }

    /// Reopen and read with unbounded backoff until a frame arrives.
    pub fn reconnect_forever(&mut self, frame: &mut Frame) {
        let Self { source, uri, clock } = self;
        backoff::retry_with_backoff(&*clock, || reopen_and_read(source, uri.as_str(), frame));
    }

    /// Reopen and read with backoff for at most `max_duration`.
    pub fn reconnect_within(&mut self, frame: &mut Frame, max_duration: Duration) -> bool {
        let Self { source, uri, clock } = self;
        backoff::retry_with_backoff_for(&*clock, max_duration, || {
            reopen_and_read(source, uri.as_str(), frame)
        })
    }
}

impl<S: VideoSource, C: Clock> Drop for StreamCapture<S, C> {
    fn drop(&mut self) {
        self.source.close();
    }
}

fn reopen_and_read<S: VideoSource>(source: &mut S, uri: &str, frame: &mut Frame) -> bool {
    source.close();
    if !source.open(uri) {
        warn!(uri = %uri, "Failed to re-connect to video stream.");
        return false;
    }
    warn!(uri = %uri, "Successfully re-connected to video stream.");

    if source.read(frame) {
        warn!("Successfully read frame after re-connecting to video stream.");
        return true;
    }
    warn!("Failed to read frame after successfully re-connecting to video stream.");
    false
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedSource, SourceCall};
    use super::*;
    use crate::backoff::testing::FakeClock;

    use SourceCall::{Close, Open, Read};

    #[test]
    fn initial_connect_failure_is_fatal() {
        let source = ScriptedSource::new(&[false], &[]);
        let result = StreamCapture::connect_with_clock(source.clone(), "rtsp://camera/1", FakeClock::new());

        match result {
            Err(ExecutorError::Fatal { code, message }) => {
                assert_eq!(code, ExitCode::UnableToConnectToStream);
                assert_eq!(message, "Unable to connect to stream: rtsp://camera/1");
            }
            _ => panic!("expected fatal connect error"),
        }
        assert_eq!(source.calls(), vec![Open]);
    }

    #[test]
    fn successful_read_does_not_retry() {
        let source = ScriptedSource::new(&[true], &[true]);
        let clock = FakeClock::new();
        let mut capture = StreamCapture::connect_with_clock(source.clone(), "rtsp://camera/1", &clock).unwrap();

        let mut frame = Frame::default();
        capture.read_with_retry(&mut frame);

        assert_eq!(frame.width, 2);
        assert_eq!(source.calls(), vec![Open, Read]);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn read_failure_reconnects_with_backoff() {
        // plain read fails, first retry cannot reopen, second retry reopens and reads
        let source = ScriptedSource::new(&[true, false, true], &[false, true]);
        let clock = FakeClock::new();
        let mut capture = StreamCapture::connect_with_clock(source.clone(), "rtsp://camera/1", &clock).unwrap();

        let mut frame = Frame::default();
        capture.read_with_retry(&mut frame);

        assert_eq!(
            source.calls(),
            vec![Open, Read, Close, Open, Close, Open, Read]
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1), Duration::from_millis(2)]);
        assert_eq!(frame.data.len(), 12);
    }

    #[test]
    fn read_after_reopen_failure_counts_as_failed_attempt() {
        let source = ScriptedSource::new(&[true], &[false, false, false, true]);
        let clock = FakeClock::new();
        let mut capture = StreamCapture::connect_with_clock(source.clone(), "udp://0.0.0.0:5000", &clock).unwrap();

        let mut frame = Frame::default();
        capture.read_with_retry(&mut frame);

        assert_eq!(
            source.calls(),
            vec![Open, Read, Close, Open, Read, Close, Open, Read, Close, Open, Read]
        );
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(1), Duration::from_millis(2), Duration::from_millis(4)]
        );
    }

    #[test]
    fn bounded_reconnect_gives_up() {
        let source = ScriptedSource::new(&[true, false, false, false, false, false, false, false, false], &[]);
        let clock = FakeClock::new();
        let mut capture = StreamCapture::connect_with_clock(source.clone(), "rtsp://camera/1", &clock).unwrap();

        let mut frame = Frame::default();
        assert!(!capture.reconnect_within(&mut frame, Duration::from_millis(10)));
        // 1 + 2 + 4 + remaining 3
        assert_eq!(clock.sleeps().len(), 4);
        assert_eq!(clock.sleeps().iter().sum::<Duration>(), Duration::from_millis(10));
    }

    #[test]
    fn dropping_capture_closes_source() {
        let source = ScriptedSource::new(&[true], &[]);
        let capture = StreamCapture::connect_with_clock(source.clone(), "rtsp://camera/1", FakeClock::new()).unwrap();
        drop(capture);
        assert_eq!(source.calls(), vec![Open, Close]);
    }
}

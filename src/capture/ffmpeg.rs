//! Video source backed by an `ffmpeg` child process decoding to raw BGR24.
//!
//! Frames are read off the pipe by a decode thread and handed over through a
//! bounded channel, so a stream that goes quiet without closing surfaces as a
//! failed read after `read_timeout` instead of blocking forever.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use super::{Frame, VideoSource};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames decoded ahead of the executor.
const FRAME_QUEUE_CAPACITY: usize = 2;

pub struct FfmpegSource {
    binary: String,
    width: i32,
    height: i32,
    read_timeout: Duration,
    child: Option<Child>,
    frames: Option<Receiver<Vec<u8>>>,
    decoder: Option<JoinHandle<()>>,
    /// First frame, read while opening to prove the stream is live.
    pending: Option<Vec<u8>>,
}

impl FfmpegSource {
    pub fn new(binary: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            binary: binary.into(),
            width,
            height,
            read_timeout: DEFAULT_READ_TIMEOUT,
            child: None,
            frames: None,
            decoder: None,
            pending: None,
        }
    }

    /// Longest wait for a single frame before the read counts as failed.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    fn frame_bytes(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize * 3
    }

    fn command(&self, uri: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(uri)
            .arg("-an")
            .arg("-vf")
            .arg(format!("scale={}:{}", self.width, self.height))
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Start decoding frames from `stdout` on a background thread.
    fn attach<R: Read + Send + 'static>(&mut self, stdout: R) -> std::io::Result<()> {
        let (tx, rx) = bounded(FRAME_QUEUE_CAPACITY);
        let size = self.frame_bytes();
        let decoder = thread::Builder::new()
            .name("ffmpeg-decoder".to_string())
            .spawn(move || decode_frames(stdout, size, tx))?;
        self.frames = Some(rx);
        self.decoder = Some(decoder);
        Ok(())
    }

    fn read_raw(&mut self) -> Option<Vec<u8>> {
        let frames = self.frames.as_ref()?;
        match frames.recv_timeout(self.read_timeout) {
            Ok(data) => Some(data),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "No frame from ffmpeg within the read timeout"
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("ffmpeg stream ended");
                None
            }
        }
    }
}

fn decode_frames<R: Read>(mut stdout: R, size: usize, tx: Sender<Vec<u8>>) {
    loop {
        let mut buffer = vec![0u8; size];
        if let Err(e) = stdout.read_exact(&mut buffer) {
            trace!(error = %e, "ffmpeg decoder stopped");
            return;
        }
        if tx.send(buffer).is_err() {
            return;
        }
    }
}

impl VideoSource for FfmpegSource {
    fn open(&mut self, uri: &str) -> bool {
        self.close();
        if self.frame_bytes() == 0 {
            warn!(width = self.width, height = self.height, "Invalid frame size");
            return false;
        }

        let mut child = match self.command(uri).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(binary = %self.binary, error = %e, "Failed to start ffmpeg");
                return false;
            }
        };
        let stdout = child.stdout.take();
        self.child = Some(child);
        let attached = match stdout {
            Some(stdout) => self.attach(stdout),
            None => Err(std::io::Error::other("ffmpeg stdout was not captured")),
        };
        if let Err(e) = attached {
            warn!(error = %e, "Failed to start ffmpeg decoder thread");
            self.close();
            return false;
        }
        trace!(uri = %uri, "ffmpeg started, waiting for first frame");

        match self.read_raw() {
            Some(first) => {
                self.pending = Some(first);
                true
            }
            None => {
                self.close();
                false
            }
        }
    }

    fn read(&mut self, frame: &mut Frame) -> bool {
        let data = match self.pending.take() {
            Some(data) => data,
            None => match self.read_raw() {
                Some(data) => data,
                None => return false,
            },
        };
        *frame = Frame {
            data,
            width: self.width,
            height: self.height,
        };
        true
    }

    fn close(&mut self) {
        self.pending = None;
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            if let Err(e) = child.wait() {
                warn!(error = %e, "Failed to reap ffmpeg process");
            }
        }
        // The decoder exits on EOF or once the receiver is gone; never wait on it.
        if let Some(decoder) = self.decoder.take() {
            if decoder.is_finished() && decoder.join().is_err() {
                warn!("ffmpeg decoder thread panicked");
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

//! Out-of-band shutdown requests.
//!
//! A background thread reads lines from the control channel (stdin in
//! production). The only command is `quit`; anything else is logged and
//! ignored. Losing the channel before `quit` arrives is fatal, but the failure
//! only surfaces when the executor next polls, at a segment boundary.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, ExitCode, Result};

pub const QUIT_COMMAND: &str = "quit";
pub const CLOSED_BEFORE_QUIT: &str = "Standard in was closed before quit was received.";
const READ_ERROR_PREFIX: &str = "An error occurred while trying to read from standard in";

/// Outcome of polling the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitStatus {
    Continue,
    Quit,
    Fatal(String),
}

/// Flag shared between the watcher thread (writer) and the executor (reader).
///
/// The error message is published before the flag is raised, and readers load
/// the flag before looking at the message.
#[derive(Debug, Default)]
pub struct QuitSignal {
    quit: AtomicBool,
    error: OnceLock<String>,
}

impl QuitSignal {
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    pub fn fail(&self, message: String) {
        // First error wins; the thread stops after setting one anyway.
        let _ = self.error.set(message);
        self.quit.store(true, Ordering::Release);
    }

    pub fn status(&self) -> QuitStatus {
        if !self.quit.load(Ordering::Acquire) {
            return QuitStatus::Continue;
        }
        match self.error.get() {
            Some(message) if !message.is_empty() => QuitStatus::Fatal(message.clone()),
            _ => QuitStatus::Quit,
        }
    }
}

/// Anything the executor can ask for a shutdown decision at a segment boundary.
pub trait QuitPoll {
    fn poll(&self) -> QuitStatus;
}

impl QuitPoll for QuitSignal {
    fn poll(&self) -> QuitStatus {
        self.status()
    }
}

impl QuitPoll for ControlWatcher {
    fn poll(&self) -> QuitStatus {
        self.signal.status()
    }
}

/// Owns the control channel thread. Create exactly one per process.
pub struct ControlWatcher {
    signal: Arc<QuitSignal>,
    thread: Option<JoinHandle<()>>,
}

impl ControlWatcher {
    /// Watch the process's standard input.
    pub fn stdin() -> Result<Self> {
        Self::spawn(io::BufReader::new(io::stdin()))
    }

    pub fn spawn<R>(reader: R) -> Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let signal = Arc::new(QuitSignal::default());
        let thread_signal = Arc::clone(&signal);

        let thread = thread::Builder::new()
            .name("control-watcher".to_string())
            .spawn(move || watch_for_quit(reader, &thread_signal))?;

        debug!("Control watcher started");
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    pub fn poll(&self) -> QuitStatus {
        self.signal.status()
    }

    /// `Ok(true)` once `quit` was received, `Ok(false)` while running, and the
    /// fatal error if the control channel failed.
    pub fn is_time_to_quit(&self) -> Result<bool> {
        match self.poll() {
            QuitStatus::Continue => Ok(false),
            QuitStatus::Quit => Ok(true),
            QuitStatus::Fatal(message) => {
                Err(ExecutorError::fatal(ExitCode::UnableToReadFromStandardIn, message))
            }
        }
    }

    /// Reap the watcher thread if it has already finished. A thread still
    /// blocked on the channel is left behind so it never delays exit.
    pub fn shutdown(mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if !thread.is_finished() {
            debug!("Control watcher still waiting for input, leaving it detached");
            return;
        }
        if thread.join().is_err() {
            error!("Control watcher thread panicked");
        }
    }
}

fn watch_for_quit<R: BufRead>(mut reader: R, signal: &QuitSignal) {
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let message = format!("{}: {}", READ_ERROR_PREFIX, e);
                error!("{}", message);
                signal.fail(message);
                return;
            }
        }

        let command = trim_line_ending(&line);
        if command == QUIT_COMMAND.as_bytes() {
            info!("Received quit command");
            signal.request_quit();
            return;
        }
        warn!(
            "Ignoring unexpected input from standard in: {}",
            String::from_utf8_lossy(command)
        );
    }

    error!("{}", CLOSED_BEFORE_QUIT);
    signal.fail(CLOSED_BEFORE_QUIT.to_string());
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

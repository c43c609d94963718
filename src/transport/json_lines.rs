use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use tracing::trace;

use super::Publisher;
use crate::codec::WireMessage;
use crate::error::{ExecutorError, Result};

#[derive(Serialize)]
struct Line<'a> {
    queue: &'a str,
    message: &'a WireMessage,
}

/// Writes one JSON object per published message.
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
}

impl JsonLinesPublisher<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesPublisher<File> {
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
            ExecutorError::Transport(format!("cannot open {}: {}", path.display(), e))
        })?;
        trace!(path = %path.display(), "Appending messages as JSON lines");
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, queue: &str, message: &WireMessage) -> Result<()> {
        let line = serde_json::to_string(&Line { queue, message })?;
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| ExecutorError::Transport(e.to_string()))
    }
}
